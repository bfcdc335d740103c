use crawlspace::{diagnostics::DiagnosticKind, parser::parse};
use rstest::rstest;

fn render(source: &str) -> String {
    parse(source)
        .unwrap_or_else(|err| panic!("parsing {source:?} failed: {err}"))
        .to_string()
}

#[rstest]
#[case("a || b && c", "(a || (b && c))")]
#[case("a && b || c", "((a && b) || c)")]
#[case("a || b || c", "((a || b) || c)")]
#[case("!a == b", "(!(a == b))")]
#[case("!!a", "(!(!a))")]
#[case("a == b && c != d", "((a == b) && (c != d))")]
#[case("a + b * c", "(a + (b * c))")]
#[case("a - b - c", "((a - b) - c)")]
#[case("a * b / c", "((a * b) / c)")]
#[case("a < b + c", "(a < (b + c))")]
#[case("-a * b", "((-a) * b)")]
#[case("&*p", "(&(*p))")]
#[case("- -a", "(-(-a))")]
#[case("a <> b", "(a != b)")]
#[case("a ~= b", "(a != b)")]
#[case("(a || b) && c", "((a || b) && c)")]
fn operators_bind_by_precedence(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source), expected);
}

#[rstest]
#[case("x.y.z", "x.y.z")]
#[case("f(1, \"two\", 3.5)", "f(1, \"two\", 3.5)")]
#[case("f()", "f()")]
#[case("define(\"a\")(1)", "define(\"a\")(1)")]
#[case("a[1][2]", "a[1][2]")]
#[case("a[1:3]", "a[1:3]")]
#[case("x.Get()[0].y", "x.Get()[0].y")]
#[case("*x.y", "(*x.y)")]
#[case("150ms", "150ms")]
#[case("0b101", "5")]
fn postfix_chains_and_literals(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source), expected);
}

#[rstest]
#[case("  a  // trailing comment", "a")]
#[case("/* lead */ a /* mid */ == /* tail */ b", "(a == b)")]
#[case("a\n&&\nb", "(a && b)")]
fn whitespace_and_comments_are_trivia(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source), expected);
}

#[test]
fn comparisons_do_not_chain() {
    let err = parse("a < b < c").unwrap_err();
    assert_eq!(err.kind(), Some(DiagnosticKind::Parser));
    assert!(err.to_string().contains("unparsed input"), "{err}");
}

#[test]
fn keywords_need_token_boundaries() {
    assert_eq!(render("trueish"), "trueish");
    assert_eq!(render("nil_value"), "nil_value");
}

#[test]
fn dangling_operator_is_left_unparsed() {
    let err = parse("a -").unwrap_err();
    assert!(err.to_string().contains("unparsed input: \"-\""), "{err}");
}

#[rstest]
#[case("", "nothing parsed")]
#[case("f(1,", "unexpected missing argument")]
#[case("f(1 2)", "unexpected character")]
#[case("(a", "subexpression ended unexpectedly")]
#[case("()", "missing subexpression")]
#[case("a[]", "expected index expression")]
#[case("a[1:]", "expected slice bound")]
#[case("a[1", "expected end of array access")]
#[case("\"open", "unterminated string literal")]
#[case("\"bad\\q\"", "unexpected escape code")]
#[case("99999999999999999999", "out of range")]
fn malformed_input_is_a_parser_error(#[case] source: &str, #[case] message: &str) {
    let err = parse(source).unwrap_err();
    assert_eq!(err.kind(), Some(DiagnosticKind::Parser), "{err}");
    assert!(err.to_string().contains(message), "{source:?}: {err}");
}

#[test]
fn errors_carry_line_and_column() {
    let err = parse("a ==\n  (b").unwrap_err();
    assert!(err.to_string().contains("line 2, column 5"), "{err}");
}
