//! Host symbol lookup for the introspection helpers.
//!
//! Names are fully qualified as `<package path>.<symbol>`, for example
//! `example.com/store/v2.Open`.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    convert::ValueType,
    diagnostics::{CrawlspaceError, Result},
    value::{HostFunction, Value},
};

/// Source of host globals, functions and types. Implementations are shared
/// between sessions and must hand out fresh [`Value`]s on every call.
pub trait Introspector: Send + Sync {
    fn globals(&self) -> Vec<String>;

    fn functions(&self) -> Vec<String>;

    fn types(&self) -> Vec<String>;

    fn global(&self, name: &str) -> Result<Value>;

    fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>>;

    /// Builds a value of type `name` viewing the object stored at `address`.
    fn new_at(&self, name: &str, address: usize) -> Result<Value>;
}

type GlobalFactory = Arc<dyn Fn() -> Value + Send + Sync>;
type FunctionBody = Arc<dyn Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync>;
type TypeFactory = Arc<dyn Fn(usize) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
struct FunctionEntry {
    params: Vec<ValueType>,
    variadic: Option<ValueType>,
    body: FunctionBody,
}

/// An explicit registry of host symbols, filled in by the embedding program.
#[derive(Clone, Default)]
pub struct Catalog {
    globals: IndexMap<String, GlobalFactory>,
    functions: IndexMap<String, FunctionEntry>,
    types: IndexMap<String, TypeFactory>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.globals.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn add_function<F>(
        &mut self,
        name: impl Into<String>,
        params: Vec<ValueType>,
        body: F,
    ) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.insert_function(name.into(), params, None, Arc::new(body))
    }

    pub fn add_variadic_function<F>(
        &mut self,
        name: impl Into<String>,
        params: Vec<ValueType>,
        rest: ValueType,
        body: F,
    ) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.insert_function(name.into(), params, Some(rest), Arc::new(body))
    }

    fn insert_function(
        &mut self,
        name: String,
        params: Vec<ValueType>,
        variadic: Option<ValueType>,
        body: FunctionBody,
    ) -> &mut Self {
        self.functions.insert(
            name,
            FunctionEntry {
                params,
                variadic,
                body,
            },
        );
        self
    }

    /// Registers a type constructor that views an object at a raw address.
    pub fn add_type<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(usize) -> Result<Value> + Send + Sync + 'static,
    {
        self.types.insert(name.into(), Arc::new(factory));
        self
    }
}

fn not_found(what: &str, name: &str) -> CrawlspaceError {
    CrawlspaceError::runtime(format!("{what} {name:?} not found"))
}

impl Introspector for Catalog {
    fn globals(&self) -> Vec<String> {
        self.globals.keys().cloned().collect()
    }

    fn functions(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    fn types(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    fn global(&self, name: &str) -> Result<Value> {
        let factory = self.globals.get(name).ok_or_else(|| not_found("global", name))?;
        Ok(factory())
    }

    fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let entry = self
            .functions
            .get(name)
            .ok_or_else(|| not_found("function", name))?;
        let body = Arc::clone(&entry.body);
        let callback = move |args: Vec<Value>| body(args);
        let function = match entry.variadic {
            Some(rest) => HostFunction::variadic(name, entry.params.clone(), rest, callback),
            None => HostFunction::new(name, entry.params.clone(), callback),
        };
        function.call(args)
    }

    fn new_at(&self, name: &str, address: usize) -> Result<Value> {
        let factory = self.types.get(name).ok_or_else(|| not_found("type", name))?;
        factory(address)
    }
}

/// Splits a qualified symbol into its package path. The package ends at the
/// first `.` after the last `/`.
pub fn package_of(qualified: &str) -> &str {
    let tail_start = qualified.rfind('/').map_or(0, |idx| idx + 1);
    match qualified[tail_start..].find('.') {
        Some(dot) => &qualified[..tail_start + dot],
        None => qualified,
    }
}

/// Symbols of `package`, without the package prefix, sorted.
pub fn members_of(package: &str, names: &[String]) -> Vec<String> {
    let prefix = format!("{package}.");
    let mut members: Vec<String> = names
        .iter()
        .filter_map(|name| name.strip_prefix(&prefix))
        .map(str::to_string)
        .collect();
    members.sort();
    members
}

/// Every package that owns at least one global, function or type, sorted.
pub fn packages(introspector: &dyn Introspector) -> Vec<String> {
    let mut packages: Vec<String> = introspector
        .globals()
        .iter()
        .chain(introspector.functions().iter())
        .chain(introspector.types().iter())
        .map(|name| package_of(name).to_string())
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

/// The name an import path is bound under: the last path element, skipping
/// a `vN` major-version element and trimming `go-`/`-go` style decorations.
pub fn import_name(path: &str) -> String {
    let mut base = base_name(path).to_string();
    if let Some(version) = base.strip_prefix('v') {
        if version.parse::<i64>().is_ok() {
            let dir = dir_name(path);
            if dir != "." {
                base = base_name(dir).to_string();
            }
        }
    }
    for separator in ['.', '-'] {
        let parts: Vec<&str> = base.split(separator).collect();
        if parts.len() == 1 {
            continue;
        }
        base = if parts[0] == "go" {
            parts[1]
        } else if parts[1] == "go" || parts[0].len() > parts[1].len() {
            parts[0]
        } else {
            parts[1]
        }
        .to_string();
    }
    base
}

fn base_name(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn dir_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn import_names_follow_path_conventions() {
        assert_eq!(import_name("fmt"), "fmt");
        assert_eq!(import_name("net/http"), "http");
        assert_eq!(import_name("example.com/store/v2"), "store");
        assert_eq!(import_name("github.com/mattn/go-sqlite3"), "sqlite3");
        assert_eq!(import_name("github.com/acme/yaml-go"), "yaml");
        assert_eq!(import_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(import_name("v2"), "v2");
    }

    #[test]
    fn packages_split_at_first_dot_after_last_slash() {
        assert_eq!(package_of("net/http.DefaultClient"), "net/http");
        assert_eq!(package_of("gopkg.in/yaml.v3.Marshal"), "gopkg.in/yaml");
        assert_eq!(package_of("main.counter"), "main");
        assert_eq!(package_of("orphan"), "orphan");
    }

    #[test]
    fn catalog_converts_arguments_before_calling() {
        let mut catalog = Catalog::new();
        catalog.add_function("math.Half", vec![ValueType::Float], |args| {
            let ValueKind::Float(n) = args[0].kind() else {
                unreachable!("argument converted to float")
            };
            Ok(vec![Value::float(n / 2.0)])
        });
        let results = catalog.call("math.Half", vec![Value::int(3)]).unwrap();
        assert!(results[0].equals(&Value::float(1.5)));
        assert!(catalog.call("math.Double", Vec::new()).is_err());
    }
}
