use crate::{
    ast::{BinaryOp, Expr, ExprKind, UnaryOp},
    diagnostics::{Result, SourcePosition},
    lexer::Lexer,
};

/// Parses a complete expression. Trailing input that is not whitespace or a
/// comment is an error.
pub fn parse(source: &str) -> Result<Expr> {
    Parser::new(source).parse()
}

type ParseFn = fn(&mut Parser) -> Result<Option<Expr>>;

const DISJUNCTION: &[(BinaryOp, &[&str])] = &[(BinaryOp::Or, &["||"])];
const CONJUNCTION: &[(BinaryOp, &[&str])] = &[(BinaryOp::And, &["&&"])];
const BOOL_NEGATION: &[(UnaryOp, &[&str])] = &[(UnaryOp::Not, &["!"])];
// Longer symbols come first so `<=` and `<>` win over `<`.
const COMPARISON: &[(BinaryOp, &[&str])] = &[
    (BinaryOp::LessEqual, &["<="]),
    (BinaryOp::GreaterEqual, &[">="]),
    (BinaryOp::Equal, &["=="]),
    (BinaryOp::NotEqual, &["!=", "~=", "<>"]),
    (BinaryOp::Less, &["<"]),
    (BinaryOp::Greater, &[">"]),
];
const ADDITIVE: &[(BinaryOp, &[&str])] = &[(BinaryOp::Add, &["+"]), (BinaryOp::Sub, &["-"])];
const MULTIPLICATIVE: &[(BinaryOp, &[&str])] =
    &[(BinaryOp::Mul, &["*"]), (BinaryOp::Div, &["/"])];
const PREFIX: &[(UnaryOp, &[&str])] = &[
    (UnaryOp::Negate, &["-"]),
    (UnaryOp::Reference, &["&"]),
    (UnaryOp::Dereference, &["*"]),
];

struct Parser {
    lexer: Lexer,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    fn parse(mut self) -> Result<Expr> {
        self.lexer.skip_trivia();
        let expr = self.parse_expression()?;
        if !self.lexer.is_eof() {
            return Err(self
                .lexer
                .error(format!("unparsed input: {:?}", self.lexer.remaining())));
        }
        expr.ok_or_else(|| self.lexer.error("nothing parsed"))
    }

    fn parse_expression(&mut self) -> Result<Option<Expr>> {
        self.parse_disjunction()
    }

    fn parse_disjunction(&mut self) -> Result<Option<Expr>> {
        self.parse_operation(Self::parse_conjunction, DISJUNCTION)
    }

    fn parse_conjunction(&mut self) -> Result<Option<Expr>> {
        self.parse_operation(Self::parse_bool_negation, CONJUNCTION)
    }

    fn parse_bool_negation(&mut self) -> Result<Option<Expr>> {
        self.parse_modifier(Self::parse_comparison, Self::parse_bool_negation, BOOL_NEGATION)
    }

    /// Comparisons do not chain: `a < b < c` leaves `< c` unparsed.
    fn parse_comparison(&mut self) -> Result<Option<Expr>> {
        let Some(left) = self.parse_additive()? else {
            return Ok(None);
        };
        let position = self.lexer.checkpoint();
        match self.operator_and_operand(Self::parse_additive, COMPARISON)? {
            Some((op, right)) => Ok(Some(binary(op, left, right, position))),
            None => Ok(Some(left)),
        }
    }

    fn parse_additive(&mut self) -> Result<Option<Expr>> {
        self.parse_operation(Self::parse_multiplicative, ADDITIVE)
    }

    fn parse_multiplicative(&mut self) -> Result<Option<Expr>> {
        self.parse_operation(Self::parse_prefix, MULTIPLICATIVE)
    }

    fn parse_prefix(&mut self) -> Result<Option<Expr>> {
        self.parse_modifier(Self::parse_postfix, Self::parse_prefix, PREFIX)
    }

    fn parse_postfix(&mut self) -> Result<Option<Expr>> {
        let Some(mut expr) = self.parse_atom()? else {
            return Ok(None);
        };
        loop {
            let position = self.lexer.checkpoint();
            match self.lexer.peek() {
                Some('.') => {
                    self.lexer.eat_symbol(".");
                    let Some(field) = self.lexer.identifier() else {
                        self.lexer.restore(position);
                        return Ok(Some(expr));
                    };
                    expr = Expr::new(
                        ExprKind::Field {
                            target: Box::new(expr),
                            field,
                        },
                        position,
                    );
                }
                Some('[') => expr = self.parse_index(expr)?,
                Some('(') => {
                    let args = self.parse_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        position,
                    );
                }
                _ => return Ok(Some(expr)),
            }
        }
    }

    fn parse_index(&mut self, target: Expr) -> Result<Expr> {
        let position = self.lexer.checkpoint();
        self.lexer.eat_symbol("[");
        let low = self
            .parse_expression()?
            .ok_or_else(|| self.lexer.error("expected index expression"))?;
        let kind = if self.lexer.eat_symbol(":") {
            let high = self
                .parse_expression()?
                .ok_or_else(|| self.lexer.error("expected slice bound"))?;
            ExprKind::Slice {
                target: Box::new(target),
                low: Box::new(low),
                high: Box::new(high),
            }
        } else {
            ExprKind::Index {
                target: Box::new(target),
                index: Box::new(low),
            }
        };
        if !self.lexer.eat_symbol("]") {
            return Err(self.lexer.error("expected end of array access"));
        }
        Ok(Expr::new(kind, position))
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.lexer.eat_symbol("(");
        let mut args = Vec::new();
        if self.lexer.eat_symbol(")") {
            return Ok(args);
        }
        loop {
            let arg = self
                .parse_expression()?
                .ok_or_else(|| self.lexer.error("unexpected missing argument"))?;
            args.push(arg);
            if self.lexer.eat_symbol(")") {
                return Ok(args);
            }
            if !self.lexer.eat_symbol(",") {
                return Err(self.lexer.error(format!(
                    "unexpected character {}",
                    describe_char(self.lexer.peek())
                )));
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Option<Expr>> {
        let position = self.lexer.checkpoint();
        if self.lexer.eat_symbol("(") {
            let inner = self
                .parse_expression()?
                .ok_or_else(|| self.lexer.error("missing subexpression"))?;
            if !self.lexer.eat_symbol(")") {
                return Err(self.lexer.error(format!(
                    "subexpression ended unexpectedly, found {}",
                    describe_char(self.lexer.peek())
                )));
            }
            return Ok(Some(Expr::new(ExprKind::Group(Box::new(inner)), position)));
        }
        if let Some(literal) = self.lexer.string()? {
            return Ok(Some(Expr::new(ExprKind::Literal(literal), position)));
        }
        if let Some(name) = self.lexer.identifier() {
            return Ok(Some(Expr::new(ExprKind::Identifier(name), position)));
        }
        if let Some(literal) = self.lexer.number()? {
            return Ok(Some(Expr::new(ExprKind::Literal(literal), position)));
        }
        Ok(None)
    }

    /// Left-associative chain of `operand (op operand)*`.
    fn parse_operation(
        &mut self,
        operand: ParseFn,
        operators: &[(BinaryOp, &[&str])],
    ) -> Result<Option<Expr>> {
        let Some(mut left) = operand(self)? else {
            return Ok(None);
        };
        loop {
            if self.lexer.is_eof() {
                return Ok(Some(left));
            }
            let position = self.lexer.checkpoint();
            match self.operator_and_operand(operand, operators)? {
                Some((op, right)) => left = binary(op, left, right, position),
                None => return Ok(Some(left)),
            }
        }
    }

    /// A prefix operator applied to `this` level, or else a plain `operand`.
    fn parse_modifier(
        &mut self,
        operand: ParseFn,
        this: ParseFn,
        operators: &[(UnaryOp, &[&str])],
    ) -> Result<Option<Expr>> {
        let position = self.lexer.checkpoint();
        if let Some((op, expr)) = self.operator_and_operand(this, operators)? {
            return Ok(Some(Expr::new(
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                position,
            )));
        }
        operand(self)
    }

    /// Tries each operator symbol in turn. A symbol that matches but is not
    /// followed by an operand is backed out, so `a -` leaves `-` unparsed.
    fn operator_and_operand<Op: Copy>(
        &mut self,
        operand: ParseFn,
        operators: &[(Op, &[&str])],
    ) -> Result<Option<(Op, Expr)>> {
        let checkpoint = self.lexer.checkpoint();
        for (op, symbols) in operators {
            for symbol in *symbols {
                if !self.lexer.eat_symbol(symbol) {
                    continue;
                }
                if let Some(rhs) = operand(self)? {
                    return Ok(Some((*op, rhs)));
                }
                self.lexer.restore(checkpoint);
            }
        }
        Ok(None)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, position: SourcePosition) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        position,
    )
}

fn describe_char(ch: Option<char>) -> String {
    match ch {
        Some(ch) => format!("{ch:?}"),
        None => "eof".to_string(),
    }
}
