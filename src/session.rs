//! The registry of host values exposed to interactive sessions, and the
//! line protocol those sessions speak.

use std::{
    io::{BufRead, BufReader, Read, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    diagnostics::{CrawlspaceError, Result},
    environment::{Environment, EnvironmentRef},
    introspect::Introspector,
    runtime::Interpreter,
    tools::{self, Console},
    value::{HostFunction, Value},
};

type Registration = Arc<dyn Fn(&EnvironmentRef) -> Value + Send + Sync>;

/// Host values exposed to remote or local sessions. Registrations apply to
/// sessions started after the call, never to ones already running.
#[derive(Default)]
pub struct Crawlspace {
    registrations: Mutex<IndexMap<String, Registration>>,
    introspector: Option<Arc<dyn Introspector>>,
}

impl Crawlspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `packages`, `globals`, `call`, `import` and the other
    /// introspection helpers in new sessions.
    pub fn with_introspector(mut self, introspector: Arc<dyn Introspector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    /// Exposes the value built by `factory` as the global `name`. The factory
    /// runs once per session.
    pub fn register_val<F>(&self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.register(name.into(), Arc::new(move |_: &EnvironmentRef| factory()))
    }

    /// Exposes a type as a namespace `name` whose `new()` builds a fresh
    /// instance with `constructor`.
    pub fn register_type<F>(&self, name: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let type_name = name.clone();
        let constructor = Arc::new(constructor);
        self.register(
            name,
            Arc::new(move |env: &EnvironmentRef| {
                let constructor = Arc::clone(&constructor);
                let new = HostFunction::new(format!("{type_name}.new"), Vec::new(), move |_| {
                    Ok(vec![constructor()])
                });
                let mut members = IndexMap::new();
                members.insert("new".to_string(), new.into_value());
                Environment::namespace(env, type_name.clone(), members)
            }),
        )
    }

    /// Removes `name` from future sessions.
    pub fn unregister(&self, name: &str) {
        self.lock().shift_remove(name);
    }

    fn register(&self, name: String, registration: Registration) -> Result<()> {
        if self.builtin_names().contains(&name) {
            return Err(CrawlspaceError::runtime(format!(
                "registration {name:?} is reserved"
            )));
        }
        let mut registrations = self.lock();
        if registrations.contains_key(&name) {
            return Err(CrawlspaceError::runtime(format!(
                "registration {name:?} already exists"
            )));
        }
        debug!(%name, "registered");
        registrations.insert(name, registration);
        Ok(())
    }

    /// Names a fresh session binds before any registration: the constants,
    /// `define`/`mutate`/`len`, and the session helpers.
    fn builtin_names(&self) -> Vec<String> {
        self.builtin_environment(&Console::new()).borrow().names()
    }

    fn builtin_environment(&self, console: &Console) -> EnvironmentRef {
        let env = Environment::new();
        tools::install(&env, console, self.introspector.clone());
        env
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a session holding every current registration.
    pub fn session(&self) -> Session {
        let registrations: Vec<(String, Registration)> = self
            .lock()
            .iter()
            .map(|(name, registration)| (name.clone(), Arc::clone(registration)))
            .collect();

        let console = Console::new();
        let env = self.builtin_environment(&console);

        let mut names: Vec<String> = tools::RESERVED.iter().map(|name| name.to_string()).collect();
        for (name, registration) in registrations {
            if env.borrow().contains(&name) {
                warn!(%name, "registration shadows a built-in, skipped");
                continue;
            }
            let value = registration(&env);
            env.borrow_mut().insert(name.clone(), value);
            names.push(name);
        }
        names.sort();

        Session {
            interpreter: Interpreter::with_environment(env),
            console,
            names,
        }
    }

    /// Runs one session over `input`/`output` until end of input or `quit()`.
    pub fn interact<R: Read, W: Write>(&self, input: R, mut output: W) -> Result<()> {
        let mut session = self.session();
        writeln!(
            output,
            "crawlspace registrations:\n{}",
            session.registrations().join(", ")
        )?;

        let mut input = BufReader::new(input);
        let mut line = String::new();
        while !session.quit_requested() {
            write!(output, "> ")?;
            output.flush()?;
            let source = loop {
                line.clear();
                if input.read_line(&mut line)? == 0 {
                    info!("session reached end of input");
                    return Ok(());
                }
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    break trimmed;
                }
            };

            let outcome = session.eval_line(source);
            output.write_all(session.take_output().as_bytes())?;
            match outcome {
                Ok(results) => {
                    for value in results {
                        writeln!(output, "{value:?}")?;
                    }
                }
                Err(err) => writeln!(output, "{err}")?,
            }
        }
        output.flush()?;
        Ok(())
    }
}

/// One live session: its environment, helper output, and quit flag.
pub struct Session {
    interpreter: Interpreter,
    console: Console,
    names: Vec<String>,
}

impl Session {
    /// Registered and reserved names, sorted.
    pub fn registrations(&self) -> &[String] {
        &self.names
    }

    pub fn env(&self) -> &EnvironmentRef {
        self.interpreter.env()
    }

    pub fn eval_line(&mut self, line: &str) -> Result<Vec<Value>> {
        self.interpreter.eval_source(line)
    }

    /// Text printed by `print`/`repr` since the last call.
    pub fn take_output(&self) -> String {
        self.console.take_output()
    }

    pub fn quit_requested(&self) -> bool {
        self.console.quit_requested()
    }
}
