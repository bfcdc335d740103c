//! The conversion bridge used when a host function declares the type of a
//! parameter.

use std::{fmt, rc::Rc, time::Duration};

use crate::{
    diagnostics::{CrawlspaceError, Result},
    value::{Value, ValueKind},
};

/// Parameter types a host function can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    String,
    Duration,
    Address,
    Pointer,
    Array,
    Map,
    Reference,
    Object,
    Function,
}

impl ValueType {
    fn is_nilable(self) -> bool {
        matches!(
            self,
            ValueType::Pointer
                | ValueType::Array
                | ValueType::Map
                | ValueType::Reference
                | ValueType::Object
                | ValueType::Function
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Duration => "duration",
            ValueType::Address => "address",
            ValueType::Pointer => "pointer",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::Reference => "reference",
            ValueType::Object => "object",
            ValueType::Function => "function",
        };
        f.write_str(name)
    }
}

/// Converts `value` so it satisfies `target`.
///
/// Address/pointer crossings are handled explicitly; everything else goes
/// through the generic rules in [`convert_generic`].
pub fn convert(value: &Value, target: ValueType) -> Result<Value> {
    match (value.kind(), target) {
        (ValueKind::Address(addr), ValueType::Pointer) => Ok(Value::pointer(*addr)),
        (ValueKind::Pointer(addr), ValueType::Address) => Ok(Value::address(*addr)),
        _ => convert_generic(value, target),
    }
}

fn convert_generic(value: &Value, target: ValueType) -> Result<Value> {
    if target == ValueType::Any || value.value_type() == Some(target) {
        return Ok(value.clone());
    }
    let converted = match (value.kind(), target) {
        (ValueKind::Nil, ty) if ty.is_nilable() => value.clone(),
        (ValueKind::Int(n), ValueType::Float) => Value::float(*n as f64),
        (ValueKind::Float(n), ValueType::Int) if n.is_finite() => Value::int(*n as i64),
        (ValueKind::Int(n), ValueType::Duration) => {
            let nanos = u64::try_from(*n).map_err(|_| {
                CrawlspaceError::type_mismatch(format!("cannot convert negative {n} to duration"))
            })?;
            Value::duration(Duration::from_nanos(nanos))
        }
        (ValueKind::Duration(d), ValueType::Int) => {
            let nanos = i64::try_from(d.as_nanos()).map_err(|_| {
                CrawlspaceError::type_mismatch(format!("duration {value} overflows int"))
            })?;
            Value::int(nanos)
        }
        (ValueKind::Reference(cell), ValueType::Pointer) => {
            Value::pointer(Rc::as_ptr(cell) as usize)
        }
        _ => {
            return Err(CrawlspaceError::type_mismatch(format!(
                "cannot convert {} to {target}",
                value.describe()
            )));
        }
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_and_pointer_cross_explicitly() {
        let pointer = convert(&Value::address(0x10), ValueType::Pointer).unwrap();
        assert!(matches!(pointer.kind(), ValueKind::Pointer(0x10)));
        let address = convert(&pointer, ValueType::Address).unwrap();
        assert!(matches!(address.kind(), ValueKind::Address(0x10)));
    }

    #[test]
    fn int_widens_to_float_and_duration() {
        let float = convert(&Value::int(3), ValueType::Float).unwrap();
        assert!(matches!(float.kind(), ValueKind::Float(f) if *f == 3.0));
        let dur = convert(&Value::int(1_000), ValueType::Duration).unwrap();
        assert!(matches!(dur.kind(), ValueKind::Duration(d) if d.as_micros() == 1));
    }

    #[test]
    fn reference_lowers_to_pointer_of_its_cell() {
        let reference = Value::reference(Value::int(1));
        let ValueKind::Reference(cell) = reference.kind() else {
            panic!("expected reference");
        };
        let expected = Rc::as_ptr(cell) as usize;
        let pointer = convert(&reference, ValueType::Pointer).unwrap();
        assert!(matches!(pointer.kind(), ValueKind::Pointer(p) if *p == expected));
    }

    #[test]
    fn incompatible_conversion_is_type_mismatch() {
        let err = convert(&Value::string("x"), ValueType::Int).unwrap_err();
        assert_eq!(
            err.kind(),
            Some(crate::diagnostics::DiagnosticKind::TypeMismatch)
        );
        assert!(convert(&Value::nil(), ValueType::Int).is_err());
        assert!(convert(&Value::nil(), ValueType::Object).is_ok());
    }
}
