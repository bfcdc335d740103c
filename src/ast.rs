use std::{fmt, time::Duration};

use crate::{diagnostics::SourcePosition, value::Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Duration(Duration),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Int(n) => Value::int(*n),
            Literal::Float(n) => Value::float(*n),
            Literal::String(s) => Value::string(s.clone()),
            Literal::Duration(d) => Value::duration(*d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Add,
    Sub,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Reference,
    Dereference,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::Reference => "&",
            UnaryOp::Dereference => "*",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed expression. Nodes are built once by the parser and only read
/// afterwards; re-evaluation walks the same tree.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub position: SourcePosition,
}

impl Expr {
    pub fn new(kind: ExprKind, position: SourcePosition) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    Field {
        target: Box<Expr>,
        field: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        target: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Group(Box<Expr>),
}

/// Renders the tree fully parenthesized, e.g. `((a == b) && c)`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(Literal::Int(n)) => write!(f, "{n}"),
            ExprKind::Literal(Literal::Float(n)) => write!(f, "{n:?}"),
            ExprKind::Literal(Literal::String(s)) => write!(f, "{s:?}"),
            ExprKind::Literal(Literal::Duration(d)) => {
                write!(f, "{}", crate::duration::format(*d))
            }
            ExprKind::Identifier(name) => write!(f, "{name}"),
            ExprKind::Field { target, field } => write!(f, "{target}.{field}"),
            ExprKind::Index { target, index } => write!(f, "{target}[{index}]"),
            ExprKind::Slice { target, low, high } => write!(f, "{target}[{low}:{high}]"),
            ExprKind::Call { callee, args } => {
                write!(f, "{callee}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprKind::Unary { op, expr } => write!(f, "({op}{expr})"),
            ExprKind::Group(inner) => write!(f, "{inner}"),
        }
    }
}
