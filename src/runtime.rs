use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use tracing::{debug, warn};

use crate::{
    ast::{BinaryOp, Expr, ExprKind, UnaryOp},
    diagnostics::{CrawlspaceError, Result},
    environment::{Environment, EnvironmentRef},
    parser,
    value::{MapKey, Value, ValueKind},
};

/// Name that resolves to every result of the previous session line.
pub const LAST_RESULT: &str = "_";

/// Parses `source` and evaluates it against `env`.
pub fn evaluate(source: &str, env: &EnvironmentRef) -> Result<Vec<Value>> {
    let expr = parser::parse(source)?;
    debug!(expression = %expr, "evaluating");
    run(&expr, env)
}

/// Evaluates an already-parsed expression. A panic raised by a host
/// capability is reported as a runtime error.
pub fn run(expr: &Expr, env: &EnvironmentRef) -> Result<Vec<Value>> {
    let evaluator = Evaluator { env };
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(expr))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%message, "recovered panic during evaluation");
            Err(CrawlspaceError::runtime(format!("panic: {message}")).at(expr.position))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// An environment plus the expression history of one session.
pub struct Interpreter {
    env: EnvironmentRef,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_environment(Environment::new())
    }

    pub fn with_environment(env: EnvironmentRef) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &EnvironmentRef {
        &self.env
    }

    /// Evaluates one line and remembers its results as `_`.
    pub fn eval_source(&mut self, source: &str) -> Result<Vec<Value>> {
        let results = evaluate(source, &self.env)?;
        self.env.borrow_mut().set_last_results(results.clone());
        Ok(results)
    }
}

struct Evaluator<'a> {
    env: &'a EnvironmentRef,
}

impl Evaluator<'_> {
    fn evaluate(&self, expr: &Expr) -> Result<Vec<Value>> {
        self.evaluate_kind(expr).map_err(|err| err.at(expr.position))
    }

    fn evaluate_kind(&self, expr: &Expr) -> Result<Vec<Value>> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(vec![literal.to_value()]),
            ExprKind::Identifier(name) => self.identifier(name),
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Field { target, field } => {
                let value = self.single(target)?;
                self.field(value, field)
            }
            ExprKind::Index { target, index } => {
                let value = self.single(target)?;
                let index = self.single(index)?;
                Ok(vec![index_value(&value, &index)?])
            }
            ExprKind::Slice { target, low, high } => {
                let value = self.single(target)?;
                let low_value = self.single(low)?;
                // The low-bound expression runs a second time before the high bound.
                self.single(low)?;
                let high_value = self.single(high)?;
                Ok(vec![slice_value(&value, &low_value, &high_value)?])
            }
            ExprKind::Call { callee, args } => self.call(callee, args),
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Unary { op, expr: operand } => self.unary(*op, operand),
        }
    }

    fn single(&self, expr: &Expr) -> Result<Value> {
        single_value(self.evaluate(expr)?)
    }

    fn identifier(&self, name: &str) -> Result<Vec<Value>> {
        let scope = self.env.borrow();
        if let Some(value) = scope.lookup(name) {
            return Ok(vec![value]);
        }
        if name == LAST_RESULT {
            return Ok(scope.last_results().to_vec());
        }
        Err(CrawlspaceError::unbound(format!("{name:?}")))
    }

    fn field(&self, value: Value, name: &str) -> Result<Vec<Value>> {
        if let ValueKind::Namespace(namespace) = value.kind() {
            if namespace.is_bound_to(self.env) {
                return Ok(vec![namespace.field(name)?]);
            }
        }
        if let Some(member) = member_of(&value, name) {
            return Ok(vec![member]);
        }
        if let ValueKind::Reference(cell) = value.kind() {
            let target = cell.borrow().clone();
            if let Some(member) = member_of(&target, name) {
                return Ok(vec![member]);
            }
        }
        Err(CrawlspaceError::type_mismatch(format!(
            "tried to access field {name:?} on value {}",
            value.describe()
        )))
    }

    fn call(&self, callee: &Expr, args: &[Expr]) -> Result<Vec<Value>> {
        let function = self.single(callee)?;
        // A lone argument may spread a multi-value result into the call.
        let arguments = match args {
            [only] => self.evaluate(only)?,
            _ => args
                .iter()
                .map(|arg| self.single(arg))
                .collect::<Result<Vec<_>>>()?,
        };
        match function.kind() {
            ValueKind::Native(native) if native.is_bound_to(self.env) => native.invoke(arguments),
            ValueKind::Function(host) => host.call(arguments),
            _ => Err(CrawlspaceError::type_mismatch(format!(
                "value {} is not callable",
                function.describe()
            ))),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Vec<Value>> {
        let lhs = self.single(left)?;
        match op {
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let rhs = self.single(right)?;
                let equal = lhs.equals(&rhs);
                Ok(vec![Value::bool(equal == (op == BinaryOp::Equal))])
            }
            BinaryOp::And | BinaryOp::Or => {
                let truth = lhs.as_bool().ok_or_else(|| {
                    CrawlspaceError::type_mismatch(format!(
                        "operator {op} expects a bool, found {}",
                        lhs.describe()
                    ))
                })?;
                if truth == (op == BinaryOp::Or) {
                    return Ok(vec![lhs]);
                }
                Ok(vec![self.single(right)?])
            }
            _ => Err(CrawlspaceError::unknown_operator(format!("{:?}", op.symbol()))),
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Expr) -> Result<Vec<Value>> {
        if op == UnaryOp::Reference {
            if let Some(pointee) = dereferenced(operand) {
                let reference = self.single(pointee)?;
                return match reference.kind() {
                    ValueKind::Reference(_) => Ok(vec![reference]),
                    _ => Err(CrawlspaceError::type_mismatch(format!(
                        "cannot dereference {}",
                        reference.describe()
                    ))),
                };
            }
        }

        let value = self.single(operand)?;
        match op {
            UnaryOp::Not => match value.as_bool() {
                Some(b) => Ok(vec![Value::bool(!b)]),
                None => Err(CrawlspaceError::type_mismatch(format!(
                    "operator ! expects a bool, found {}",
                    value.describe()
                ))),
            },
            UnaryOp::Reference => {
                let addressable = matches!(
                    value.kind(),
                    ValueKind::Array(_)
                        | ValueKind::Map(_)
                        | ValueKind::Object(_)
                        | ValueKind::Reference(_)
                );
                if !addressable {
                    return Err(CrawlspaceError::type_mismatch(format!(
                        "cannot take the address of {}",
                        value.describe()
                    )));
                }
                Ok(vec![Value::reference(value)])
            }
            UnaryOp::Dereference => match value.kind() {
                ValueKind::Reference(cell) => Ok(vec![cell.borrow().clone()]),
                _ => Err(CrawlspaceError::type_mismatch(format!(
                    "cannot dereference {}",
                    value.describe()
                ))),
            },
            UnaryOp::Negate => Err(CrawlspaceError::unknown_operator(format!("{:?}", op.symbol()))),
        }
    }
}

/// Collapses a result list for a position that takes one value. No results
/// read as `nil`.
pub fn single_value(mut results: Vec<Value>) -> Result<Value> {
    match results.len() {
        0 => Ok(Value::nil()),
        1 => Ok(results.remove(0)),
        n => Err(CrawlspaceError::runtime(format!(
            "multivalue result ({n} values) used in single-value context"
        ))),
    }
}

fn dereferenced(expr: &Expr) -> Option<&Expr> {
    match &expr.kind {
        ExprKind::Group(inner) => dereferenced(inner),
        ExprKind::Unary {
            op: UnaryOp::Dereference,
            expr,
        } => Some(expr),
        _ => None,
    }
}

fn member_of(value: &Value, name: &str) -> Option<Value> {
    match value.kind() {
        ValueKind::Object(object) => Rc::clone(object).member(name),
        _ => None,
    }
}

fn index_int(index: &Value) -> Result<i64> {
    index.as_int().ok_or_else(|| {
        CrawlspaceError::type_mismatch(format!("index {} is not an int", index.describe()))
    })
}

fn element_index(index: &Value, len: usize) -> Result<usize> {
    let raw = index_int(index)?;
    usize::try_from(raw)
        .ok()
        .filter(|idx| *idx < len)
        .ok_or_else(|| {
            CrawlspaceError::runtime(format!("index out of range [{raw}] with length {len}"))
        })
}

fn index_value(target: &Value, index: &Value) -> Result<Value> {
    match target.kind() {
        ValueKind::Array(values) => Ok(values[element_index(index, values.len())?].clone()),
        ValueKind::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let idx = element_index(index, chars.len())?;
            Ok(Value::string(chars[idx].to_string()))
        }
        ValueKind::Map(map) => {
            let key = MapKey::from_value(index).ok_or_else(|| {
                CrawlspaceError::type_mismatch(format!(
                    "map key {} must be a bool, int, or string",
                    index.describe()
                ))
            })?;
            Ok(map.get(&key).cloned().unwrap_or_else(Value::nil))
        }
        ValueKind::Object(object) => object.index(index).unwrap_or_else(|| {
            Err(CrawlspaceError::type_mismatch(format!(
                "value {} is not indexable",
                target.describe()
            )))
        }),
        _ => Err(CrawlspaceError::type_mismatch(format!(
            "tried to access index {} on value {}",
            index.describe(),
            target.describe()
        ))),
    }
}

fn slice_value(target: &Value, low: &Value, high: &Value) -> Result<Value> {
    if !matches!(target.kind(), ValueKind::Array(_) | ValueKind::String(_)) {
        return Err(CrawlspaceError::type_mismatch(format!(
            "tried to slice value {}",
            target.describe()
        )));
    }
    let low = index_int(low)?;
    let high = index_int(high)?;
    match target.kind() {
        ValueKind::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (lo, hi) = slice_bounds(low, high, chars.len())?;
            Ok(Value::string(chars[lo..hi].iter().collect::<String>()))
        }
        ValueKind::Array(values) => {
            let (lo, hi) = slice_bounds(low, high, values.len())?;
            Ok(Value::array(values[lo..hi].to_vec()))
        }
        _ => unreachable!("slice target kind checked above"),
    }
}

fn slice_bounds(low: i64, high: i64, len: usize) -> Result<(usize, usize)> {
    match (usize::try_from(low), usize::try_from(high)) {
        (Ok(lo), Ok(hi)) if lo <= hi && hi <= len => Ok((lo, hi)),
        _ => Err(CrawlspaceError::runtime(format!(
            "slice bounds out of range [{low}:{high}] with length {len}"
        ))),
    }
}
