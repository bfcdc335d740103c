use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use indexmap::{IndexMap, IndexSet};

use crate::{
    diagnostics::{CrawlspaceError, Result},
    value::{Namespace, NativeFunction, Value, ValueKind},
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// The mutable namespace one session evaluates against.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: IndexMap<String, Value>,
    reserved: IndexSet<String>,
    last_results: Vec<Value>,
}

impl Environment {
    /// An environment seeded with `nil`, `true`, `false`, `define`, `mutate`
    /// and `len`.
    pub fn new() -> EnvironmentRef {
        let env = Self::empty();
        {
            let mut scope = env.borrow_mut();
            scope.reserve("nil", Value::nil());
            scope.reserve("true", Value::bool(true));
            scope.reserve("false", Value::bool(false));
        }
        install_builtins(&env);
        env
    }

    /// An environment with no bindings at all.
    pub fn empty() -> EnvironmentRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Binds `name` unconditionally. Used by embedders to seed bindings.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Binds `name` and protects it from `define` and `mutate`.
    pub fn reserve(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.reserved.insert(name.clone());
        self.bindings.insert(name, value);
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn last_results(&self) -> &[Value] {
        &self.last_results
    }

    pub fn set_last_results(&mut self, results: Vec<Value>) {
        self.last_results = results;
    }

    /// Binds a new name; fails if the name is reserved or already bound.
    pub fn define(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        self.check_binding(BindingMode::Define, &name)?;
        self.bindings.insert(name, value);
        Ok(())
    }

    /// Rebinds an existing name; fails if the name is reserved or unbound.
    pub fn mutate(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        self.check_binding(BindingMode::Mutate, &name)?;
        self.bindings.insert(name, value);
        Ok(())
    }

    fn check_binding(&self, mode: BindingMode, name: &str) -> Result<()> {
        if self.is_reserved(name) {
            return Err(CrawlspaceError::runtime(format!(
                "variable {name:?} is reserved"
            )));
        }
        match mode {
            BindingMode::Define if self.contains(name) => Err(CrawlspaceError::runtime(format!(
                "variable {name:?} already exists"
            ))),
            BindingMode::Mutate if !self.contains(name) => Err(CrawlspaceError::unbound(
                format!("variable {name:?} does not exist"),
            )),
            _ => Ok(()),
        }
    }

    /// Wraps `callback` as a callable owned by `env`. Calls to it from
    /// expressions evaluated against `env` receive the raw argument list.
    pub fn native<F>(env: &EnvironmentRef, name: impl Into<String>, callback: F) -> Value
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>> + 'static,
    {
        Value::new(ValueKind::Native(NativeFunction::new(name, env, callback)))
    }

    /// Wraps `members` as a namespace owned by `env`, reachable with field
    /// access from expressions evaluated against `env`.
    pub fn namespace(
        env: &EnvironmentRef,
        name: impl Into<String>,
        members: IndexMap<String, Value>,
    ) -> Value {
        Value::new(ValueKind::Namespace(Namespace::new(name, env, members)))
    }
}

pub(crate) fn upgrade(owner: &Weak<RefCell<Environment>>) -> Result<EnvironmentRef> {
    owner
        .upgrade()
        .ok_or_else(|| CrawlspaceError::runtime("environment has been discarded"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingMode {
    Define,
    Mutate,
}

impl BindingMode {
    fn name(self) -> &'static str {
        match self {
            BindingMode::Define => "define",
            BindingMode::Mutate => "mutate",
        }
    }
}

fn install_builtins(env: &EnvironmentRef) {
    let define = binding_operator(env, BindingMode::Define);
    let mutate = binding_operator(env, BindingMode::Mutate);
    let len = Environment::native(env, "len", builtin_len);

    let mut scope = env.borrow_mut();
    scope.insert("define", define);
    scope.insert("mutate", mutate);
    scope.insert("len", len);
}

/// `define("a", "b")(1, 2)`: the first call validates the names, the second
/// binds one value per name.
fn binding_operator(env: &EnvironmentRef, mode: BindingMode) -> Value {
    let owner = Rc::downgrade(env);
    Environment::native(env, mode.name(), move |args| {
        let env = upgrade(&owner)?;
        let names = args
            .iter()
            .map(|arg| {
                arg.as_str().map(str::to_string).ok_or_else(|| {
                    CrawlspaceError::type_mismatch(format!(
                        "{} expects variable names as strings, found {}",
                        mode.name(),
                        arg.describe()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if names.is_empty() {
            return Err(CrawlspaceError::type_mismatch(format!(
                "{} expects at least one variable name",
                mode.name()
            )));
        }
        {
            let scope = env.borrow();
            for (idx, name) in names.iter().enumerate() {
                if names[..idx].contains(name) {
                    return Err(CrawlspaceError::runtime(format!(
                        "variable {name:?} named more than once"
                    )));
                }
                scope.check_binding(mode, name)?;
            }
        }

        let label = format!("{}({})", mode.name(), names.join(", "));
        let owner = owner.clone();
        let assign = Environment::native(&env, label, move |values| {
            let env = upgrade(&owner)?;
            if values.len() != names.len() {
                return Err(CrawlspaceError::type_mismatch(format!(
                    "variable definition expected a variable for each value ({} != {})",
                    names.len(),
                    values.len()
                )));
            }
            let mut scope = env.borrow_mut();
            for name in &names {
                scope.check_binding(mode, name)?;
            }
            for (name, value) in names.iter().zip(values) {
                scope.insert(name.clone(), value);
            }
            Ok(Vec::new())
        });
        Ok(vec![assign])
    })
}

fn builtin_len(args: Vec<Value>) -> Result<Vec<Value>> {
    let [value] = args.as_slice() else {
        return Err(CrawlspaceError::type_mismatch(format!(
            "len expected 1 argument but received {}",
            args.len()
        )));
    };
    let len = value.len().ok_or_else(|| {
        CrawlspaceError::type_mismatch(format!(
            "len expects a string, array, or map, found {}",
            value.describe()
        ))
    })?;
    Ok(vec![Value::int(len as i64)])
}
