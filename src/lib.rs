//! Core library for crawlspace: a small expression language for poking at
//! live host values, plus the interactive session and server around it.

pub mod ast;
pub mod convert;
pub mod diagnostics;
pub mod duration;
pub mod environment;
pub mod introspect;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod server;
pub mod session;
pub mod tools;
pub mod value;

pub use convert::ValueType;
pub use diagnostics::{CrawlspaceError, Diagnostic, DiagnosticKind, SourcePosition};
pub use environment::{Environment, EnvironmentRef};
pub use introspect::{Catalog, Introspector};
pub use repl::Repl;
pub use runtime::{Interpreter, evaluate};
pub use server::DEFAULT_PORT;
pub use session::{Crawlspace, Session};
pub use value::{HostFunction, HostObject, MapKey, Value, ValueKind};
