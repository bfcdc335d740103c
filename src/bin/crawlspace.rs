use std::{cell::Cell, process::ExitCode, rc::Rc, sync::Arc};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crawlspace::{
    Catalog, Crawlspace, CrawlspaceError, DEFAULT_PORT, HostFunction, HostObject, Repl, Value,
    ValueKind, ValueType,
};

#[derive(Parser)]
#[command(author, version, about = "Expression shell for inspecting a running process")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive local session
    Repl,
    /// Serve sessions over TCP on localhost
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Evaluate one expression and print its results
    Eval { source: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crawlspace=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CrawlspaceError> {
    let crawlspace = Arc::new(demo_crawlspace()?);
    match args.command.unwrap_or(Command::Repl) {
        Command::Repl => Repl::new(&crawlspace).run(),
        Command::Serve { port } => crawlspace.listen_and_serve(port),
        Command::Eval { source } => {
            let mut session = crawlspace.session();
            let results = session.eval_line(&source)?;
            print!("{}", session.take_output());
            for value in results {
                println!("{value:?}");
            }
            Ok(())
        }
    }
}

fn demo_crawlspace() -> Result<Crawlspace, CrawlspaceError> {
    let mut catalog = Catalog::new();
    catalog
        .add_global("demo/stats.Version", || Value::string(env!("CARGO_PKG_VERSION")))
        .add_variadic_function("demo/stats.Sum", Vec::new(), ValueType::Int, |args| {
            let total = args.iter().filter_map(Value::as_int).sum::<i64>();
            Ok(vec![Value::int(total)])
        })
        .add_function("demo/stats.MinMax", vec![ValueType::Array], |args| {
            let ValueKind::Array(values) = args[0].kind() else {
                return Ok(vec![Value::nil(), Value::nil()]);
            };
            let ints: Vec<i64> = values.iter().filter_map(Value::as_int).collect();
            let min = ints.iter().min().map_or_else(Value::nil, |n| Value::int(*n));
            let max = ints.iter().max().map_or_else(Value::nil, |n| Value::int(*n));
            Ok(vec![min, max])
        })
        .add_type("demo/stats.Slot", |address| Ok(Value::object(Slot { address })));

    let crawlspace = Crawlspace::new().with_introspector(Arc::new(catalog));
    crawlspace.register_type("Counter", || Value::object(Counter::default()))?;
    crawlspace.register_val("counter", || Value::object(Counter::default()))?;
    Ok(crawlspace)
}

#[derive(Default)]
struct Counter {
    count: Cell<i64>,
}

impl HostObject for Counter {
    fn type_name(&self) -> &str {
        "Counter"
    }

    fn member_names(&self) -> Vec<String> {
        vec!["Get".to_string(), "Set".to_string()]
    }

    fn member(self: Rc<Self>, name: &str) -> Option<Value> {
        let method = match name {
            "Get" => HostFunction::new("Get", Vec::new(), move |_| {
                Ok(vec![Value::int(self.count.get())])
            }),
            "Set" => HostFunction::new("Set", vec![ValueType::Int], move |args| {
                self.count.set(args[0].as_int().unwrap_or_default());
                Ok(Vec::new())
            }),
            _ => return None,
        };
        Some(method.into_value())
    }

    fn render(&self) -> String {
        format!("Counter{{count: {}}}", self.count.get())
    }
}

struct Slot {
    address: usize,
}

impl HostObject for Slot {
    fn type_name(&self) -> &str {
        "Slot"
    }

    fn member_names(&self) -> Vec<String> {
        vec!["Address".to_string()]
    }

    fn member(self: Rc<Self>, name: &str) -> Option<Value> {
        (name == "Address").then(|| Value::address(self.address))
    }

    fn render(&self) -> String {
        format!("Slot@0x{:x}", self.address)
    }
}
