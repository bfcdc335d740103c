use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

use indexmap::IndexMap;

use crate::{
    convert::{self, ValueType},
    diagnostics::{CrawlspaceError, Result},
    duration,
    environment::{Environment, EnvironmentRef},
};

/// A handle to one runtime value. Cloning the handle never copies the
/// underlying data.
#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn nil() -> Self {
        Self::new(ValueKind::Nil)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ValueKind::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn duration(value: Duration) -> Self {
        Self::new(ValueKind::Duration(value))
    }

    pub fn address(value: usize) -> Self {
        Self::new(ValueKind::Address(value))
    }

    pub fn pointer(value: usize) -> Self {
        Self::new(ValueKind::Pointer(value))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueKind::Array(values))
    }

    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::array(values.into_iter().map(Value::string).collect())
    }

    pub fn map(entries: IndexMap<MapKey, Value>) -> Self {
        Self::new(ValueKind::Map(entries))
    }

    /// Wraps `value` in a fresh shared cell.
    pub fn reference(value: Value) -> Self {
        Self::new(ValueKind::Reference(Rc::new(RefCell::new(value))))
    }

    pub fn object<T: HostObject + 'static>(object: T) -> Self {
        Self::new(ValueKind::Object(Rc::new(object)))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        matches!(&*self.0, ValueKind::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.0 {
            ValueKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &*self.0 {
            ValueKind::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match &*self.0 {
            ValueKind::Nil => "nil",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::String(_) => "string",
            ValueKind::Duration(_) => "duration",
            ValueKind::Address(_) => "address",
            ValueKind::Pointer(_) => "pointer",
            ValueKind::Array(_) => "array",
            ValueKind::Map(_) => "map",
            ValueKind::Reference(_) => "reference",
            ValueKind::Object(object) => object.type_name(),
            ValueKind::Function(_) | ValueKind::Native(_) => "function",
            ValueKind::Namespace(_) => "namespace",
        }
    }

    /// The bridge type this value already satisfies without conversion.
    pub fn value_type(&self) -> Option<ValueType> {
        let ty = match &*self.0 {
            ValueKind::Nil => return None,
            ValueKind::Bool(_) => ValueType::Bool,
            ValueKind::Int(_) => ValueType::Int,
            ValueKind::Float(_) => ValueType::Float,
            ValueKind::String(_) => ValueType::String,
            ValueKind::Duration(_) => ValueType::Duration,
            ValueKind::Address(_) => ValueType::Address,
            ValueKind::Pointer(_) => ValueType::Pointer,
            ValueKind::Array(_) => ValueType::Array,
            ValueKind::Map(_) => ValueType::Map,
            ValueKind::Reference(_) => ValueType::Reference,
            ValueKind::Object(_) | ValueKind::Namespace(_) => ValueType::Object,
            ValueKind::Function(_) | ValueKind::Native(_) => ValueType::Function,
        };
        Some(ty)
    }

    /// `repr (type)`, used in error messages.
    pub fn describe(&self) -> String {
        format!("{self:?} ({})", self.type_name())
    }

    /// Value equality with no implicit coercion. Scalars compare by value,
    /// arrays and maps element-wise, and everything else by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Nil, ValueKind::Nil) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Float(a), ValueKind::Float(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Duration(a), ValueKind::Duration(b)) => a == b,
            (ValueKind::Address(a), ValueKind::Address(b)) => a == b,
            (ValueKind::Pointer(a), ValueKind::Pointer(b)) => a == b,
            (ValueKind::Array(a), ValueKind::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(l, r)| l.equals(r))
            }
            (ValueKind::Map(a), ValueKind::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|rhs| value.equals(rhs)))
            }
            (ValueKind::Reference(a), ValueKind::Reference(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Object(a), ValueKind::Object(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (ValueKind::Function(a), ValueKind::Function(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(&a.callback), Rc::as_ptr(&b.callback))
            }
            (ValueKind::Native(a), ValueKind::Native(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(&a.callback), Rc::as_ptr(&b.callback))
            }
            (ValueKind::Namespace(a), ValueKind::Namespace(b)) => {
                Rc::ptr_eq(&a.members, &b.members)
            }
            _ => false,
        }
    }

    /// Number of elements for sequence-like, map-like and string values.
    pub fn len(&self) -> Option<usize> {
        match &*self.0 {
            ValueKind::String(s) => Some(s.chars().count()),
            ValueKind::Array(values) => Some(values.len()),
            ValueKind::Map(map) => Some(map.len()),
            ValueKind::Object(object) => object.len(),
            _ => None,
        }
    }

    /// Member names reachable by field access, sorted.
    pub fn member_names(&self) -> Vec<String> {
        let mut names = match &*self.0 {
            ValueKind::Object(object) => object.member_names(),
            ValueKind::Namespace(namespace) => namespace.member_names(),
            ValueKind::Reference(cell) => cell.borrow().member_names(),
            _ => Vec::new(),
        };
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Nil => write!(f, "nil"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::Float(n) => write!(f, "{n:?}"),
            ValueKind::String(s) => write!(f, "{s:?}"),
            ValueKind::Duration(d) => write!(f, "{}", duration::format(*d)),
            ValueKind::Address(addr) => write!(f, "address(0x{addr:x})"),
            ValueKind::Pointer(addr) => write!(f, "pointer(0x{addr:x})"),
            ValueKind::Array(values) => f.debug_list().entries(values.iter()).finish(),
            ValueKind::Map(map) => f.debug_map().entries(map.iter()).finish(),
            ValueKind::Reference(cell) => write!(f, "&{:?}", cell.borrow()),
            ValueKind::Object(object) => write!(f, "{}", object.render()),
            ValueKind::Function(fun) => write!(f, "<fn {}{}>", fun.name, fun.signature()),
            ValueKind::Native(fun) => write!(f, "<native fn {}>", fun.name),
            ValueKind::Namespace(namespace) => f
                .debug_struct("Namespace")
                .field("name", &namespace.name)
                .field("members", &namespace.member_names())
                .finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Nil => write!(f, "nil"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::Float(n) => write!(f, "{n}"),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::Duration(d) => write!(f, "{}", duration::format(*d)),
            ValueKind::Address(addr) => write!(f, "0x{addr:x}"),
            ValueKind::Pointer(addr) => write!(f, "0x{addr:x}"),
            ValueKind::Array(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            ValueKind::Map(map) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            ValueKind::Reference(cell) => write!(f, "&{}", cell.borrow()),
            ValueKind::Object(object) => write!(f, "{}", object.render()),
            ValueKind::Function(fun) => write!(f, "<fn {}>", fun.name),
            ValueKind::Native(fun) => write!(f, "<native fn {}>", fun.name),
            ValueKind::Namespace(namespace) => write!(f, "<namespace {}>", namespace.name),
        }
    }
}

pub enum ValueKind {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Duration(Duration),
    /// A raw address held as an unsigned integer.
    Address(usize),
    /// An untyped pointer; only useful as an argument to host functions.
    Pointer(usize),
    Array(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
    Reference(Rc<RefCell<Value>>),
    Object(Rc<dyn HostObject>),
    Function(HostFunction),
    Native(NativeFunction),
    Namespace(Namespace),
}

/// Keys usable in map values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    String(String),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match &*value.0 {
            ValueKind::Bool(b) => Some(MapKey::Bool(*b)),
            ValueKind::Int(n) => Some(MapKey::Int(*n)),
            ValueKind::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::String(value.to_string())
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(n) => write!(f, "{n}"),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

/// Capabilities a host value exposes to expressions.
///
/// `member` resolves both fields and methods; methods are returned as
/// [`HostFunction`] values that have already captured the receiver.
pub trait HostObject {
    fn type_name(&self) -> &str;

    fn member_names(&self) -> Vec<String>;

    fn member(self: Rc<Self>, name: &str) -> Option<Value>;

    /// Index capability. `None` means the value is not indexable.
    fn index(&self, _key: &Value) -> Option<Result<Value>> {
        None
    }

    fn len(&self) -> Option<usize> {
        None
    }

    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

pub type Callback = dyn Fn(Vec<Value>) -> Result<Vec<Value>>;

/// A host callable with a declared signature. Arguments are run through the
/// conversion bridge before the callback sees them.
#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub params: Vec<ValueType>,
    pub variadic: Option<ValueType>,
    callback: Rc<Callback>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, params: Vec<ValueType>, callback: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>> + 'static,
    {
        Self {
            name: name.into(),
            params,
            variadic: None,
            callback: Rc::new(callback),
        }
    }

    pub fn variadic<F>(
        name: impl Into<String>,
        params: Vec<ValueType>,
        rest: ValueType,
        callback: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>> + 'static,
    {
        Self {
            variadic: Some(rest),
            ..Self::new(name, params, callback)
        }
    }

    pub fn into_value(self) -> Value {
        Value::new(ValueKind::Function(self))
    }

    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        if let Some(rest) = self.variadic {
            parts.push(format!("{rest}..."));
        }
        format!("({})", parts.join(", "))
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Vec<Value>> {
        let fixed = self.params.len();
        let arity_ok = match self.variadic {
            Some(_) => args.len() >= fixed,
            None => args.len() == fixed,
        };
        if !arity_ok {
            let at_least = if self.variadic.is_some() { "at least " } else { "" };
            return Err(CrawlspaceError::type_mismatch(format!(
                "function `{}` expected {at_least}{fixed} arguments but received {}",
                self.name,
                args.len()
            )));
        }
        let converted = args
            .iter()
            .enumerate()
            .map(|(idx, arg)| {
                let target = self
                    .params
                    .get(idx)
                    .copied()
                    .or(self.variadic)
                    .unwrap_or(ValueType::Any);
                convert::convert(arg, target).map_err(|err| match err {
                    CrawlspaceError::Diagnostic(diag) => CrawlspaceError::Diagnostic(
                        diag.with_note(format!("argument {} of `{}`", idx + 1, self.name)),
                    ),
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        (self.callback)(converted)
    }
}

/// A callable belonging to the language machinery of one environment. It
/// receives its arguments exactly as evaluated.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    owner: Weak<RefCell<Environment>>,
    callback: Rc<Callback>,
}

impl NativeFunction {
    pub(crate) fn new<F>(name: impl Into<String>, owner: &EnvironmentRef, callback: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>> + 'static,
    {
        Self {
            name: name.into(),
            owner: Rc::downgrade(owner),
            callback: Rc::new(callback),
        }
    }

    pub fn is_bound_to(&self, env: &EnvironmentRef) -> bool {
        self.owner.strong_count() > 0 && std::ptr::eq(self.owner.as_ptr(), Rc::as_ptr(env))
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Vec<Value>> {
        (self.callback)(args)
    }
}

/// A member table belonging to the language machinery of one environment.
#[derive(Clone)]
pub struct Namespace {
    pub name: String,
    owner: Weak<RefCell<Environment>>,
    members: Rc<IndexMap<String, Value>>,
}

impl Namespace {
    pub(crate) fn new(
        name: impl Into<String>,
        owner: &EnvironmentRef,
        members: IndexMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: Rc::downgrade(owner),
            members: Rc::new(members),
        }
    }

    pub fn is_bound_to(&self, env: &EnvironmentRef) -> bool {
        self.owner.strong_count() > 0 && std::ptr::eq(self.owner.as_ptr(), Rc::as_ptr(env))
    }

    pub fn field(&self, name: &str) -> Result<Value> {
        self.members.get(name).cloned().ok_or_else(|| {
            CrawlspaceError::type_mismatch(format!(
                "field {name:?} not found in namespace `{}`",
                self.name
            ))
        })
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }
}
