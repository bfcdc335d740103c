use std::sync::Arc;

use crawlspace::{Catalog, Crawlspace, Value, ValueType};

fn transcript(crawlspace: &Crawlspace, input: &str) -> String {
    let mut output = Vec::new();
    crawlspace
        .interact(input.as_bytes(), &mut output)
        .expect("session runs to completion");
    String::from_utf8(output).expect("utf-8 transcript")
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .add_global("example.com/store/v2.Limit", || Value::int(64))
        .add_function("example.com/store/v2.Open", vec![ValueType::String], |args| {
            Ok(vec![args[0].clone(), Value::bool(true)])
        })
        .add_function("net/http.Get", vec![ValueType::String], |_| Ok(Vec::new()))
        .add_type("example.com/store/v2.Handle", |address| {
            Ok(Value::address(address))
        });
    catalog
}

#[test]
fn header_lists_registrations_and_reserved_names() {
    let crawlspace = Crawlspace::new();
    crawlspace
        .register_val("zeta", || Value::int(1))
        .expect("register zeta");
    crawlspace
        .register_val("alpha", || Value::int(2))
        .expect("register alpha");

    let output = transcript(&crawlspace, "");
    assert!(
        output.starts_with("crawlspace registrations:\nalpha, print, quit, repr, zeta\n> "),
        "{output}"
    );
}

#[test]
fn results_print_one_per_line_and_errors_do_not_end_the_session() {
    let crawlspace = Crawlspace::new();
    let output = transcript(&crawlspace, "1 == 1\n\n   \nmissing\n\"hi\"\n");
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[2], "> true");
    assert!(lines[3].starts_with("> unbound variable"), "{output}");
    assert_eq!(lines[4], "> \"hi\"");
}

#[test]
fn print_and_repr_write_to_the_session() {
    let crawlspace = Crawlspace::new();
    let output = transcript(&crawlspace, "print(\"a\", 1, true)\nrepr(\"a\", 1)\n");
    assert!(output.contains("> a 1 true\n"), "{output}");
    assert!(output.contains("> \"a\" 1\n"), "{output}");
}

#[test]
fn quit_stops_reading_input() {
    let crawlspace = Crawlspace::new();
    let output = transcript(&crawlspace, "quit()\nprint(\"after\")\n");
    assert!(!output.contains("after"), "{output}");
}

#[test]
fn final_line_without_newline_is_evaluated() {
    let crawlspace = Crawlspace::new();
    let output = transcript(&crawlspace, "print(\"last\")");
    assert!(output.contains("last\n"), "{output}");
}

#[test]
fn last_results_are_bound_to_underscore() {
    let crawlspace = Crawlspace::new();
    let output = transcript(&crawlspace, "\"first\"\ncatch(_)\n");
    assert!(output.contains("> [\"first\"]\n"), "{output}");
}

#[test]
fn registrations_apply_to_new_sessions_only() {
    let crawlspace = Crawlspace::new();
    crawlspace
        .register_val("answer", || Value::int(42))
        .expect("register answer");
    let mut session = crawlspace.session();

    crawlspace.unregister("answer");
    let value = session.eval_line("answer").expect("still bound");
    assert!(value[0].equals(&Value::int(42)));

    let mut fresh = crawlspace.session();
    assert!(fresh.eval_line("answer").is_err());
}

#[test]
fn duplicate_and_reserved_registrations_are_rejected() {
    let crawlspace = Crawlspace::new();
    crawlspace
        .register_val("x", || Value::nil())
        .expect("first registration");
    assert!(crawlspace.register_val("x", || Value::nil()).is_err());
    assert!(crawlspace.register_val("print", || Value::nil()).is_err());
    assert!(crawlspace.register_type("quit", || Value::nil()).is_err());
}

#[test]
fn registrations_cannot_shadow_constants_or_builtins() {
    let crawlspace = Crawlspace::new().with_introspector(Arc::new(catalog()));
    for name in ["true", "nil", "define", "mutate", "len", "dir", "def", "printf", "import"] {
        let err = crawlspace.register_val(name, || Value::int(7)).unwrap_err();
        assert!(err.to_string().contains("reserved"), "{name}: {err}");
    }

    let mut session = crawlspace.session();
    let value = session.eval_line("true").expect("constant");
    assert!(value[0].equals(&Value::bool(true)));
    session.eval_line("define(\"a\")(1)").expect("define still binds");
}

#[test]
fn registrations_made_before_enabling_introspection_do_not_shadow_helpers() {
    let crawlspace = Crawlspace::new();
    crawlspace
        .register_val("packages", || Value::int(7))
        .expect("not yet a helper");
    let crawlspace = crawlspace.with_introspector(Arc::new(catalog()));

    let mut session = crawlspace.session();
    assert!(!session.registrations().contains(&"packages".to_string()));
    let packages = session.eval_line("len(packages())").expect("helper kept");
    assert!(packages[0].equals(&Value::int(2)));
}

#[test]
fn printf_formats_without_a_trailing_newline() {
    let crawlspace = Crawlspace::new();
    let output = transcript(
        &crawlspace,
        "printf(\"%s=%d %q\\n\", \"limit\", 64, \"x\")\nprintf(\"%v\")\n",
    );
    assert!(output.contains("> limit=64 \"x\"\n"), "{output}");
    assert!(output.contains("> %!v(MISSING)> "), "{output}");
}

#[test]
fn registered_types_construct_with_new() {
    let crawlspace = Crawlspace::new();
    crawlspace
        .register_type("Pair", || Value::strings(["l", "r"]))
        .expect("register Pair");
    let mut session = crawlspace.session();
    let value = session.eval_line("len(Pair.new())").expect("construct");
    assert!(value[0].equals(&Value::int(2)));
}

#[test]
fn reserved_session_names_cannot_be_redefined() {
    let crawlspace = Crawlspace::new();
    let mut session = crawlspace.session();
    let err = session.eval_line("define(\"quit\")(1)").unwrap_err();
    assert!(err.to_string().contains("reserved"), "{err}");
    let err = session.eval_line("def(\"print\", 1)").unwrap_err();
    assert!(err.to_string().contains("reserved"), "{err}");
}

#[test]
fn def_mut_and_dir_manage_bindings() {
    let crawlspace = Crawlspace::new();
    let mut session = crawlspace.session();
    session.eval_line("def(\"answer\", 41)").expect("def");
    session.eval_line("mut(\"answer\", 42)").expect("mut");
    let value = session.eval_line("answer").expect("lookup");
    assert!(value[0].equals(&Value::int(42)));

    let names = session.eval_line("filter(dir(), \"ans\")").expect("dir");
    assert!(names[0].equals(&Value::strings(["answer"])));
    assert!(session.eval_line("mut(\"other\", 1)").is_err());
}

#[test]
fn introspection_helpers_list_and_call_symbols() {
    let crawlspace = Crawlspace::new().with_introspector(Arc::new(catalog()));
    let mut session = crawlspace.session();

    let packages = session.eval_line("packages()").expect("packages");
    assert!(packages[0].equals(&Value::strings(["example.com/store/v2", "net/http"])));

    let functions = session
        .eval_line("functions(\"example.com/store/v2\")")
        .expect("functions");
    assert!(functions[0].equals(&Value::strings(["Open"])));

    let types = session.eval_line("types(\"example.com/store/v2\")").expect("types");
    assert!(types[0].equals(&Value::strings(["Handle"])));

    let limit = session
        .eval_line("global(\"example.com/store/v2\", \"Limit\")")
        .expect("global");
    assert!(limit[0].equals(&Value::int(64)));

    let opened = session
        .eval_line("call(\"example.com/store/v2\", \"Open\", \"db\")")
        .expect("call");
    assert_eq!(opened.len(), 2);

    let handle = session
        .eval_line("newAt(\"example.com/store/v2\", \"Handle\", 4096)")
        .expect("newAt");
    assert!(handle[0].equals(&Value::address(4096)));

    assert!(session.eval_line("global(\"net/http\", \"Nope\")").is_err());
}

#[test]
fn import_binds_a_namespace_under_the_short_name() {
    let crawlspace = Crawlspace::new().with_introspector(Arc::new(catalog()));
    let mut session = crawlspace.session();

    session
        .eval_line("import(\"example.com/store/v2\")")
        .expect("import");
    let limit = session.eval_line("store.Limit").expect("global member");
    assert!(limit[0].equals(&Value::int(64)));
    let opened = session
        .eval_line("catch(store.Open(\"db\"))")
        .expect("function member");
    assert!(opened[0].equals(&Value::array(vec![Value::string("db"), Value::bool(true)])));

    let err = session
        .eval_line("import(\"example.com/store/v2\")")
        .unwrap_err();
    assert!(err.to_string().contains("already exists"), "{err}");
}
