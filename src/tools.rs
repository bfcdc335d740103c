//! Helpers installed into every interactive session.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    convert::ValueType,
    diagnostics::{CrawlspaceError, Result},
    environment::{self, Environment, EnvironmentRef},
    introspect::{self, Introspector},
    value::{HostFunction, Value, ValueKind},
};

/// Names every session binds itself; registrations may not use them.
pub const RESERVED: &[&str] = &["quit", "print", "repr"];

/// Output buffer and quit flag shared between a session and its helpers.
#[derive(Clone, Default)]
pub struct Console {
    transcript: Rc<RefCell<String>>,
    quit: Rc<Cell<bool>>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, text: &str) {
        self.transcript.borrow_mut().push_str(text);
    }

    pub fn write_line(&self, line: &str) {
        let mut transcript = self.transcript.borrow_mut();
        transcript.push_str(line);
        transcript.push('\n');
    }

    /// Drains everything the helpers printed since the last call.
    pub fn take_output(&self) -> String {
        self.transcript.take()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.get()
    }
}

pub fn install(
    env: &EnvironmentRef,
    console: &Console,
    introspector: Option<Arc<dyn Introspector>>,
) {
    let owner = Rc::downgrade(env);
    let mut helpers: IndexMap<&str, Value> = IndexMap::new();

    let quit = Rc::clone(&console.quit);
    helpers.insert(
        "quit",
        HostFunction::new("quit", Vec::new(), move |_| {
            quit.set(true);
            Ok(Vec::new())
        })
        .into_value(),
    );
    helpers.insert("print", printer("print", console, |value| value.to_string()));
    helpers.insert("repr", printer("repr", console, |value| format!("{value:?}")));
    helpers.insert("printf", printf(console));
    helpers.insert("dir", dir(owner.clone()));
    helpers.insert(
        "filter",
        HostFunction::new(
            "filter",
            vec![ValueType::Array, ValueType::String],
            |args| Ok(vec![filter(&args[0], &args[1])?]),
        )
        .into_value(),
    );
    helpers.insert(
        "catch",
        HostFunction::variadic("catch", Vec::new(), ValueType::Any, |args| {
            Ok(vec![Value::array(args)])
        })
        .into_value(),
    );
    helpers.insert(
        "def",
        binder("def", owner.clone(), |scope, name, value| scope.define(name, value)),
    );
    helpers.insert(
        "mut",
        binder("mut", owner.clone(), |scope, name, value| scope.mutate(name, value)),
    );

    if let Some(introspector) = introspector {
        install_introspection(&mut helpers, env, owner, introspector);
    }

    let mut scope = env.borrow_mut();
    for (name, value) in helpers {
        if RESERVED.contains(&name) {
            scope.reserve(name, value);
        } else {
            scope.insert(name, value);
        }
    }
}

fn printer(name: &'static str, console: &Console, render: fn(&Value) -> String) -> Value {
    let console = console.clone();
    HostFunction::variadic(name, Vec::new(), ValueType::Any, move |args| {
        let line: Vec<String> = args.iter().map(render).collect();
        console.write_line(&line.join(" "));
        Ok(Vec::new())
    })
    .into_value()
}

/// `printf(format, args...)` writes `format` with each verb replaced by the
/// next argument. `%v %s %d %t` print, `%q` reprs, `%%` is a literal percent.
fn printf(console: &Console) -> Value {
    let console = console.clone();
    HostFunction::variadic(
        "printf",
        vec![ValueType::String],
        ValueType::Any,
        move |args| {
            let (format, args) = args.split_first().ok_or_else(|| {
                CrawlspaceError::type_mismatch("printf expected a format string")
            })?;
            console.write(&format_values(format.as_str().unwrap_or_default(), args));
            Ok(Vec::new())
        },
    )
    .into_value()
}

fn format_values(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        match (verb, args.next()) {
            (_, None) => out.push_str(&format!("%!{verb}(MISSING)")),
            ('v' | 's' | 'd' | 't', Some(value)) => out.push_str(&value.to_string()),
            ('q', Some(value)) => out.push_str(&format!("{value:?}")),
            (_, Some(value)) => out.push_str(&format!("%!{verb}({value})")),
        }
    }
    let extra: Vec<String> = args.map(|value| format!("{value:?}")).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

/// `dir()` lists the session's bindings, `dir(v)` the members of `v`.
fn dir(owner: Weak<RefCell<Environment>>) -> Value {
    HostFunction::variadic("dir", Vec::new(), ValueType::Any, move |args| {
        let names = match args.as_slice() {
            [] => environment::upgrade(&owner)?.borrow().names(),
            [value] => value.member_names(),
            _ => {
                return Err(CrawlspaceError::type_mismatch(format!(
                    "dir expected at most 1 argument but received {}",
                    args.len()
                )));
            }
        };
        Ok(vec![Value::strings(names)])
    })
    .into_value()
}

fn filter(haystack: &Value, needle: &Value) -> Result<Value> {
    let ValueKind::Array(values) = haystack.kind() else {
        return Err(CrawlspaceError::type_mismatch(format!(
            "filter expected an array, found {}",
            haystack.describe()
        )));
    };
    let needle = needle.as_str().unwrap_or_default();
    let mut matches = Vec::new();
    for value in values {
        let text = value.as_str().ok_or_else(|| {
            CrawlspaceError::type_mismatch(format!(
                "filter expected an array of strings, found {}",
                value.describe()
            ))
        })?;
        if text.contains(needle) {
            matches.push(value.clone());
        }
    }
    Ok(Value::array(matches))
}

/// Two-argument `def(name, value)` / `mut(name, value)`.
fn binder(
    name: &'static str,
    owner: Weak<RefCell<Environment>>,
    bind: fn(&mut Environment, String, Value) -> Result<()>,
) -> Value {
    HostFunction::new(name, vec![ValueType::String, ValueType::Any], move |args| {
        let env = environment::upgrade(&owner)?;
        let mut args = args.into_iter();
        let (Some(key), Some(value)) = (args.next(), args.next()) else {
            return Err(CrawlspaceError::type_mismatch(format!(
                "{name} expected 2 arguments"
            )));
        };
        let key = key.as_str().unwrap_or_default().to_string();
        bind(&mut env.borrow_mut(), key, value)?;
        Ok(Vec::new())
    })
    .into_value()
}

fn install_introspection(
    helpers: &mut IndexMap<&str, Value>,
    env: &EnvironmentRef,
    owner: Weak<RefCell<Environment>>,
    introspector: Arc<dyn Introspector>,
) {
    let source = Arc::clone(&introspector);
    helpers.insert(
        "packages",
        HostFunction::new("packages", Vec::new(), move |_| {
            Ok(vec![Value::strings(introspect::packages(source.as_ref()))])
        })
        .into_value(),
    );

    let source = Arc::clone(&introspector);
    helpers.insert(
        "globals",
        HostFunction::new("globals", vec![ValueType::String], move |args| {
            let package = args[0].as_str().unwrap_or_default();
            Ok(vec![Value::strings(introspect::members_of(
                package,
                &source.globals(),
            ))])
        })
        .into_value(),
    );

    let source = Arc::clone(&introspector);
    helpers.insert(
        "functions",
        HostFunction::new("functions", vec![ValueType::String], move |args| {
            let package = args[0].as_str().unwrap_or_default();
            Ok(vec![Value::strings(introspect::members_of(
                package,
                &source.functions(),
            ))])
        })
        .into_value(),
    );

    let source = Arc::clone(&introspector);
    helpers.insert(
        "types",
        HostFunction::new("types", vec![ValueType::String], move |args| {
            let package = args[0].as_str().unwrap_or_default();
            let mut names: Vec<String> = source
                .types()
                .into_iter()
                .filter(|name| introspect::package_of(name) == package)
                .filter_map(|name| {
                    name.strip_prefix(&format!("{package}."))
                        .map(str::to_string)
                })
                .collect();
            names.sort();
            Ok(vec![Value::strings(names)])
        })
        .into_value(),
    );

    let source = Arc::clone(&introspector);
    helpers.insert(
        "global",
        Environment::native(env, "global", move |args| {
            let [package, name] = string_args::<2>("global", &args)?;
            Ok(vec![source.global(&format!("{package}.{name}"))?])
        }),
    );

    let source = Arc::clone(&introspector);
    helpers.insert(
        "call",
        Environment::native(env, "call", move |mut args| {
            if args.len() < 2 {
                return Err(CrawlspaceError::type_mismatch(
                    "call expected at least 2 arguments",
                ));
            }
            let rest = args.split_off(2);
            let [package, name] = string_args::<2>("call", &args)?;
            source.call(&format!("{package}.{name}"), rest)
        }),
    );

    let source = Arc::clone(&introspector);
    helpers.insert(
        "newAt",
        Environment::native(env, "newAt", move |mut args| {
            if args.len() != 3 {
                return Err(CrawlspaceError::type_mismatch(format!(
                    "newAt expected 3 arguments but received {}",
                    args.len()
                )));
            }
            let address = args.pop().unwrap_or_else(Value::nil);
            let [package, name] = string_args::<2>("newAt", &args)?;
            let address = address_of(&address).ok_or_else(|| {
                CrawlspaceError::type_mismatch(format!(
                    "newAt expected the third argument to be an address, found {}",
                    address.describe()
                ))
            })?;
            Ok(vec![source.new_at(&format!("{package}.{name}"), address)?])
        }),
    );

    let source = introspector;
    helpers.insert(
        "import",
        Environment::native(env, "import", move |args| {
            let [path] = string_args::<1>("import", &args)?;
            let env = environment::upgrade(&owner)?;
            let namespace = import(&env, source.clone(), &path)?;
            env.borrow_mut().define(introspect::import_name(&path), namespace)?;
            Ok(Vec::new())
        }),
    );
}

/// Builds a namespace holding the globals and functions of `path`.
fn import(env: &EnvironmentRef, source: Arc<dyn Introspector>, path: &str) -> Result<Value> {
    let mut members = IndexMap::new();
    for name in introspect::members_of(path, &source.globals()) {
        let value = source.global(&format!("{path}.{name}"))?;
        members.insert(name, value);
    }
    for name in introspect::members_of(path, &source.functions()) {
        let qualified = format!("{path}.{name}");
        let source = Arc::clone(&source);
        let function = HostFunction::variadic(
            qualified.clone(),
            Vec::new(),
            ValueType::Any,
            move |args| source.call(&qualified, args),
        );
        members.insert(name, function.into_value());
    }
    if members.is_empty() {
        return Err(CrawlspaceError::runtime(format!(
            "package {path:?} has no globals or functions"
        )));
    }
    Ok(Environment::namespace(env, introspect::import_name(path), members))
}

fn string_args<const N: usize>(helper: &str, args: &[Value]) -> Result<[String; N]> {
    if args.len() != N {
        return Err(CrawlspaceError::type_mismatch(format!(
            "{helper} expected {N} arguments but received {}",
            args.len()
        )));
    }
    let mut strings: [String; N] = std::array::from_fn(|_| String::new());
    for (slot, arg) in strings.iter_mut().zip(args) {
        *slot = arg
            .as_str()
            .ok_or_else(|| {
                CrawlspaceError::type_mismatch(format!(
                    "{helper} expected string arguments, found {}",
                    arg.describe()
                ))
            })?
            .to_string();
    }
    Ok(strings)
}

fn address_of(value: &Value) -> Option<usize> {
    match value.kind() {
        ValueKind::Int(n) => usize::try_from(*n).ok(),
        ValueKind::Address(addr) | ValueKind::Pointer(addr) => Some(*addr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_values_substitutes_verbs_in_order() {
        let args = [Value::string("db"), Value::int(3), Value::bool(true)];
        assert_eq!(
            format_values("%s has %d rows (%t) 100%%", &args),
            "db has 3 rows (true) 100%"
        );
        assert_eq!(format_values("%q", &args[..1]), "\"db\"");
    }

    #[test]
    fn format_values_flags_missing_and_extra_arguments() {
        assert_eq!(format_values("%v and %v", &[Value::int(1)]), "1 and %!v(MISSING)");
        assert_eq!(
            format_values("%v", &[Value::int(1), Value::string("x")]),
            "1%!(EXTRA \"x\")"
        );
        assert_eq!(format_values("%x", &[Value::int(1)]), "%!x(1)");
        assert_eq!(format_values("50%", &[]), "50%!(NOVERB)");
    }
}
