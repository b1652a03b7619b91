//! nom grammar for query text.
//!
//! Statements end at `;` or at a newline outside parentheses. Inside
//! parentheses a newline is plain whitespace. `#` comments run to the end of
//! the line.

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, tag, take_till, take_while, take_while1};
use nom::character::complete::{alpha1, char, digit1, one_of};
use nom::combinator::{all_consuming, cut, eof, map, not, opt, recognize, value};
use nom::error::{VerboseError, VerboseErrorKind, context};
use nom::multi::{many0, separated_list0};
use nom::sequence::{pair, preceded, terminated};

use crate::error::{ParseError, Position};
use crate::query::ast::{AssignOp, ExprKind, Expression, ParseTree, Statement, Variable};
use crate::types::{TypedValue, ValueKind};

type IResult<'a, O> = nom::IResult<&'a str, O, VerboseError<&'a str>>;

/// Deepest parenthesis nesting accepted.
const MAX_NESTING: usize = 64;
/// Tallest expression tree accepted; long operator and method chains count.
const MAX_HEIGHT: usize = 256;

const TOO_NESTED: &str = "at most 64 nested parentheses";
const TOO_TALL: &str = "an expression at most 256 operations deep";

/// Parse query text into a [`ParseTree`], failing on the first syntax error.
pub fn parse(source: &str) -> Result<ParseTree, ParseError> {
    let grammar = Grammar::new(source);
    match all_consuming(|i| grammar.program(i))(source) {
        Ok((_, statements)) => Ok(ParseTree { statements }),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(grammar.convert(err)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::new(
            grammar.position(""),
            "unexpected end of input",
        )),
    }
}

#[derive(Clone, Copy)]
struct Nesting {
    depth: usize,
    multiline: bool,
}

impl Nesting {
    const TOP: Nesting = Nesting {
        depth: 0,
        multiline: false,
    };

    fn enter<'a>(self, input: &'a str) -> Result<Nesting, nom::Err<VerboseError<&'a str>>> {
        if self.depth >= MAX_NESTING {
            return Err(too_deep(input, TOO_NESTED));
        }
        Ok(Nesting {
            depth: self.depth + 1,
            multiline: true,
        })
    }
}

/// Expression plus the height of its tree.
struct Node {
    expr: Expression,
    height: usize,
}

impl Node {
    fn leaf(position: Position, kind: ExprKind) -> Self {
        Node {
            expr: Expression::new(position, kind),
            height: 1,
        }
    }

    fn operation<'a>(
        input: &'a str,
        position: Position,
        subject: Option<Node>,
        operator: impl Into<String>,
        operands: Vec<Node>,
    ) -> Result<Node, nom::Err<VerboseError<&'a str>>> {
        let height = 1 + subject
            .iter()
            .chain(&operands)
            .map(|node| node.height)
            .max()
            .unwrap_or(0);
        if height > MAX_HEIGHT {
            return Err(too_deep(input, TOO_TALL));
        }
        Ok(Node {
            expr: Expression::new(
                position,
                ExprKind::Operation {
                    subject: subject.map(|node| Box::new(node.expr)),
                    operator: operator.into(),
                    operands: operands.into_iter().map(|node| node.expr).collect(),
                },
            ),
            height,
        })
    }
}

struct Grammar<'s> {
    source: &'s str,
    lines: Vec<Line>,
}

/// Byte offset where a source line starts; ASCII lines map bytes to columns.
struct Line {
    start: usize,
    ascii: bool,
}

impl<'s> Grammar<'s> {
    fn new(source: &'s str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for text in source.split('\n') {
            lines.push(Line {
                start,
                ascii: text.is_ascii(),
            });
            start += text.len() + 1;
        }
        Grammar { source, lines }
    }

    fn position(&self, input: &'s str) -> Position {
        let offset = self.source.len().saturating_sub(input.len());
        let index = self
            .lines
            .partition_point(|line| line.start <= offset)
            .saturating_sub(1);
        let Some(line) = self.lines.get(index) else {
            return Position::new(1, 1);
        };
        let column = if line.ascii {
            offset - line.start
        } else {
            self.source
                .get(line.start..offset)
                .map_or(0, |text| text.chars().count())
        };
        Position::new(index + 1, column + 1)
    }

    /// The deepest failure gives the position; the innermost context names
    /// what was expected there.
    fn convert(&self, err: VerboseError<&'s str>) -> ParseError {
        let Some(&(at, _)) = err.errors.first() else {
            return ParseError::new(Position::new(1, 1), "invalid query");
        };
        let expected = err
            .errors
            .iter()
            .find_map(|(_, kind)| match kind {
                VerboseErrorKind::Context(what) => Some((*what).to_string()),
                _ => None,
            })
            .or_else(|| {
                err.errors.iter().find_map(|(_, kind)| match kind {
                    VerboseErrorKind::Char(c) => Some(format!("`{c}`")),
                    _ => None,
                })
            })
            .unwrap_or_else(|| "valid syntax".to_string());
        ParseError::new(
            self.position(at),
            format!("expected {expected}, found {}", describe(at)),
        )
    }

    fn program(&self, input: &'s str) -> IResult<'s, Vec<Statement>> {
        let mut statements = Vec::new();
        let (mut input, _) = separators(input)?;
        while !input.is_empty() {
            let (rest, statement) = cut(|i| self.statement(i))(input)?;
            statements.push(statement);
            let (rest, _) = cut(context(
                "end of statement",
                preceded(blank(false), alt((eof, tag("\n"), tag(";")))),
            ))(rest)?;
            let (rest, _) = separators(rest)?;
            input = rest;
        }
        Ok((input, statements))
    }

    fn statement(&self, input: &'s str) -> IResult<'s, Statement> {
        let position = self.position(input);
        context(
            "variable assignment or command",
            alt((
                |i| self.assignment(position, i),
                |i| self.command(position, i),
            )),
        )(input)
    }

    fn assignment(&self, position: Position, input: &'s str) -> IResult<'s, Statement> {
        let (input, target) = variable(input)?;
        let (input, operator) =
            cut(context("assignment operator", ws(Nesting::TOP, assign_op)))(input)?;
        let (input, value) = cut(|i| self.expression(Nesting::TOP, i))(input)?;
        Ok((
            input,
            Statement::Assignment {
                position,
                target,
                operator,
                value: value.expr,
            },
        ))
    }

    /// `name arg arg, arg`: commas between arguments are optional.
    fn command(&self, position: Position, input: &'s str) -> IResult<'s, Statement> {
        let (input, name) = identifier(input)?;
        let (input, first) = opt(|i| self.expression(Nesting::TOP, i))(input)?;
        let (input, rest) = match first {
            Some(_) => many0(preceded(opt(ws(Nesting::TOP, char(','))), |i| {
                self.expression(Nesting::TOP, i)
            }))(input)?,
            None => (input, Vec::new()),
        };
        let arguments = first
            .into_iter()
            .chain(rest)
            .map(|node| node.expr)
            .collect();
        Ok((
            input,
            Statement::Command {
                position,
                name: name.to_string(),
                arguments,
            },
        ))
    }

    /// Lowest precedence: `+` and `-`, left associative.
    fn expression(&self, nesting: Nesting, input: &'s str) -> IResult<'s, Node> {
        let (input, first) = self.intersection(nesting, input)?;
        let (input, rest) = many0(pair(
            |i| self.operator(nesting, "+-", i),
            cut(|i| self.intersection(nesting, i)),
        ))(input)?;
        let node = fold_binary(input, first, rest)?;
        Ok((input, node))
    }

    fn intersection(&self, nesting: Nesting, input: &'s str) -> IResult<'s, Node> {
        let (input, first) = self.postfix(nesting, input)?;
        let (input, rest) = many0(pair(
            |i| self.operator(nesting, "&", i),
            cut(|i| self.postfix(nesting, i)),
        ))(input)?;
        let node = fold_binary(input, first, rest)?;
        Ok((input, node))
    }

    fn operator(
        &self,
        nesting: Nesting,
        symbols: &'static str,
        input: &'s str,
    ) -> IResult<'s, (Position, char)> {
        let (input, _) = blank(nesting.multiline)(input)?;
        let position = self.position(input);
        let (input, symbol) = terminated(one_of(symbols), not(char('=')))(input)?;
        Ok((input, (position, symbol)))
    }

    fn postfix(&self, nesting: Nesting, input: &'s str) -> IResult<'s, Node> {
        let (input, subject) = self.primary(nesting, input)?;
        let (input, calls) = many0(preceded(
            ws(nesting, char('.')),
            cut(|i| self.method_call(nesting, i)),
        ))(input)?;
        let node = calls
            .into_iter()
            .try_fold(subject, |subject, (position, method, operands)| {
                Node::operation(input, position, Some(subject), method, operands)
            })?;
        Ok((input, node))
    }

    fn method_call(
        &self,
        nesting: Nesting,
        input: &'s str,
    ) -> IResult<'s, (Position, String, Vec<Node>)> {
        let (input, _) = blank(nesting.multiline)(input)?;
        let position = self.position(input);
        let (input, name) = context("method name", identifier)(input)?;
        let (input, operands) = self.call_arguments(nesting, input)?;
        Ok((input, (position, name.to_string(), operands)))
    }

    fn primary(&self, nesting: Nesting, input: &'s str) -> IResult<'s, Node> {
        let (input, _) = blank(nesting.multiline)(input)?;
        let position = self.position(input);
        context(
            "expression",
            alt((
                map(variable, move |v| Node::leaf(position, ExprKind::Variable(v))),
                map(integer, move |n| {
                    Node::leaf(position, ExprKind::Literal(TypedValue::Integer(n)))
                }),
                map(string_literal, move |s| {
                    Node::leaf(position, ExprKind::Literal(TypedValue::String(s)))
                }),
                |i| self.call_or_name(nesting, position, i),
                |i| self.group(nesting, i),
            )),
        )(input)
    }

    /// `name(args)` is a function call; a bare `name` is a keyword.
    fn call_or_name(
        &self,
        nesting: Nesting,
        position: Position,
        input: &'s str,
    ) -> IResult<'s, Node> {
        let (input, name) = identifier(input)?;
        let (input, operands) = opt(|i| self.call_arguments(nesting, i))(input)?;
        let node = match operands {
            Some(operands) => Node::operation(input, position, None, name, operands)?,
            None => Node::leaf(position, ExprKind::Name(name.to_string())),
        };
        Ok((input, node))
    }

    fn call_arguments(&self, nesting: Nesting, input: &'s str) -> IResult<'s, Vec<Node>> {
        let (input, _) = ws(nesting, char('('))(input)?;
        let inner = nesting.enter(input)?;
        cut(terminated(
            separated_list0(ws(inner, char(',')), |i| self.expression(inner, i)),
            context("`,` or `)`", ws(inner, char(')'))),
        ))(input)
    }

    fn group(&self, nesting: Nesting, input: &'s str) -> IResult<'s, Node> {
        let (input, _) = char('(')(input)?;
        let inner = nesting.enter(input)?;
        cut(terminated(
            |i| self.expression(inner, i),
            context("`)`", ws(inner, char(')'))),
        ))(input)
    }
}

fn fold_binary<'a>(
    input: &'a str,
    first: Node,
    rest: Vec<((Position, char), Node)>,
) -> Result<Node, nom::Err<VerboseError<&'a str>>> {
    rest.into_iter()
        .try_fold(first, |lhs, ((position, operator), rhs)| {
            Node::operation(input, position, Some(lhs), operator.to_string(), vec![rhs])
        })
}

fn too_deep<'a>(input: &'a str, what: &'static str) -> nom::Err<VerboseError<&'a str>> {
    nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(what))],
    })
}

fn describe(input: &str) -> String {
    match input.chars().next() {
        None => "end of input".to_string(),
        Some('\n') => "end of line".to_string(),
        Some(c) => format!("`{c}`"),
    }
}

fn blank_run<'a>(multiline: bool) -> impl FnMut(&'a str) -> IResult<'a, &'a str> {
    alt((
        take_while1(move |c: char| c.is_whitespace() && (multiline || c != '\n')),
        preceded(char('#'), take_till(|c: char| c == '\n')),
    ))
}

/// Whitespace and comments; newlines only when `multiline`.
fn blank<'a>(multiline: bool) -> impl FnMut(&'a str) -> IResult<'a, ()> {
    value((), many0(blank_run(multiline)))
}

fn ws<'a, F, O>(nesting: Nesting, inner: F) -> impl FnMut(&'a str) -> IResult<'a, O>
where
    F: FnMut(&'a str) -> IResult<'a, O>,
{
    preceded(blank(nesting.multiline), inner)
}

/// Blank lines, comments and `;` between statements.
fn separators(input: &str) -> IResult<()> {
    value((), many0(alt((blank_run(true), tag(";")))))(input)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> IResult<&str> {
    recognize(pair(alt((alpha1, tag("_"))), take_while(is_name_char)))(input)
}

fn variable(input: &str) -> IResult<Variable> {
    let (rest, (sigil, name)) = pair(one_of("$@"), take_while1(is_name_char))(input)?;
    let kind = ValueKind::from_sigil(sigil).unwrap_or(ValueKind::Graph);
    Ok((
        rest,
        Variable {
            name: format!("{sigil}{name}"),
            kind,
        },
    ))
}

fn assign_op(input: &str) -> IResult<AssignOp> {
    alt((
        value(AssignOp::Union, tag("+=")),
        value(AssignOp::Subtract, tag("-=")),
        value(AssignOp::Intersect, tag("&=")),
        value(AssignOp::Assign, tag("=")),
    ))(input)
}

fn integer(input: &str) -> IResult<i64> {
    let (rest, digits) = digit1(input)?;
    match digits.parse() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Failure(VerboseError {
            errors: vec![(
                input,
                VerboseErrorKind::Context("integer within the 64-bit range"),
            )],
        })),
    }
}

fn escape(input: &str) -> IResult<char> {
    cut(context(
        "escape sequence",
        alt((
            value('\n', char('n')),
            value('\t', char('t')),
            value('\r', char('r')),
            value('\\', char('\\')),
            value('\'', char('\'')),
            value('"', char('"')),
        )),
    ))(input)
}

fn quoted<'a>(delimiter: char) -> impl FnMut(&'a str) -> IResult<'a, String> {
    move |input: &'a str| {
        let (input, _) = char(delimiter)(input)?;
        let body = escaped_transform(
            take_while1(move |c: char| c != delimiter && c != '\\'),
            '\\',
            escape,
        );
        cut(terminated(
            map(opt(body), Option::unwrap_or_default),
            context("closing quote", char(delimiter)),
        ))(input)
    }
}

fn string_literal(input: &str) -> IResult<String> {
    alt((quoted('\''), quoted('"')))(input)
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};

    use super::*;

    fn single(src: &str) -> Result<Statement> {
        let tree = parse(src)?;
        match <[Statement; 1]>::try_from(tree.statements) {
            Ok([statement]) => Ok(statement),
            Err(statements) => bail!("expected one statement, got {}", statements.len()),
        }
    }

    fn operation(expr: &Expression) -> Result<(Option<&Expression>, &str, &[Expression])> {
        match &expr.kind {
            ExprKind::Operation {
                subject,
                operator,
                operands,
            } => Ok((subject.as_deref(), operator, operands)),
            other => bail!("expected operation, got {other:?}"),
        }
    }

    #[test]
    fn intersection_binds_tighter_than_union() -> Result<()> {
        let Statement::Assignment { value, .. } = single("$r = $a + $b & $c")? else {
            bail!("expected assignment");
        };
        let (subject, operator, operands) = operation(&value)?;
        assert_eq!(operator, "+");
        assert!(matches!(subject.map(|e| &e.kind), Some(ExprKind::Variable(_))));
        assert_eq!(operation(&operands[0])?.1, "&");
        Ok(())
    }

    #[test]
    fn method_chain_nests_left_to_right() -> Result<()> {
        let Statement::Assignment { value, .. } =
            single("$r = $base.getLineage($s, 2, 'd').limit(10)")?
        else {
            bail!("expected assignment");
        };
        let (subject, operator, operands) = operation(&value)?;
        assert_eq!(operator, "limit");
        assert_eq!(operands.len(), 1);
        let Some(inner) = subject else {
            bail!("method call without subject");
        };
        let (_, operator, operands) = operation(inner)?;
        assert_eq!(operator, "getLineage");
        assert_eq!(operands.len(), 3);
        assert_eq!(inner.position, Position::new(1, 12));
        Ok(())
    }

    #[test]
    fn commands_take_optional_commas() -> Result<()> {
        let tree = parse("dump force $x\nexport $x, 'out.dot'; stat $x")?;
        assert_eq!(tree.statements.len(), 3);
        let Statement::Command {
            name, arguments, ..
        } = &tree.statements[1]
        else {
            bail!("expected command");
        };
        assert_eq!(name, "export");
        assert_eq!(arguments.len(), 2);
        let Statement::Command { arguments, .. } = &tree.statements[0] else {
            bail!("expected command");
        };
        assert_eq!(arguments[0].as_name(), Some("force"));
        assert_eq!(arguments.len(), 2);
        Ok(())
    }

    #[test]
    fn compound_assignment_operators() -> Result<()> {
        let Statement::Assignment {
            target, operator, ..
        } = single("@m += @n")?
        else {
            bail!("expected assignment");
        };
        assert_eq!(target.name, "@m");
        assert_eq!(target.kind, ValueKind::GraphMetadata);
        assert_eq!(operator, AssignOp::Union);
        Ok(())
    }

    #[test]
    fn newlines_inside_parens_are_whitespace() -> Result<()> {
        let tree = parse("$a = vertices(1,\n  2) + (\n$b)\nstat $a # trailing")?;
        assert_eq!(tree.statements.len(), 2);
        let Statement::Assignment { value, .. } = &tree.statements[0] else {
            bail!("expected assignment");
        };
        let (subject, operator, operands) = operation(value)?;
        assert_eq!(operator, "+");
        assert!(matches!(operands[0].kind, ExprKind::Variable(_)));
        let Some(call) = subject else {
            bail!("union without left side");
        };
        assert_eq!(operation(call)?.2.len(), 2);
        let Statement::Command { position, .. } = &tree.statements[1] else {
            bail!("expected command");
        };
        assert_eq!(*position, Position::new(4, 1));
        Ok(())
    }

    #[test]
    fn newline_outside_parens_ends_the_statement() {
        let err = parse("$a = $b\n+ $c").unwrap_err();
        assert_eq!(err.position, Position::new(2, 1));
    }

    #[test]
    fn string_escapes() -> Result<()> {
        let Statement::Assignment { value, .. } =
            single(r#"@m = $base.setMetadata('it\'s', "a\tb\\")"#)?
        else {
            bail!("expected assignment");
        };
        let mut literals = Vec::new();
        for operand in operation(&value)?.2 {
            match &operand.kind {
                ExprKind::Literal(TypedValue::String(s)) => literals.push(s.as_str()),
                other => bail!("expected string, got {other:?}"),
            }
        }
        assert_eq!(literals, vec!["it's", "a\tb\\"]);

        let Statement::Command { arguments, .. } = single("native ''")? else {
            bail!("expected command");
        };
        assert_eq!(
            arguments[0].kind,
            ExprKind::Literal(TypedValue::String(String::new()))
        );
        Ok(())
    }

    #[test]
    fn syntax_errors_abort_with_position() {
        let err = parse("$a = vertices(1, 2\nstat $a").unwrap_err();
        assert!(err.message.contains("expected `,` or `)`"), "{err}");
        assert_eq!(err.position, Position::new(2, 1));

        let err = parse("$a = ").unwrap_err();
        assert_eq!(err.position.line, 1);
        assert!(err.message.contains("end of input"), "{err}");

        let err = parse("$a $b").unwrap_err();
        assert!(err.message.contains("assignment operator"), "{err}");

        let err = parse("= $b").unwrap_err();
        assert_eq!(err.position, Position::new(1, 1));

        let err = parse("$a = 1\n  ?").unwrap_err();
        assert_eq!(err.position, Position::new(2, 3));

        let err = parse("stat 'é' ?").unwrap_err();
        assert_eq!(err.position, Position::new(1, 10));

        let err = parse("$ = 1").unwrap_err();
        assert_eq!(err.position, Position::new(1, 1));

        let err = parse("$a = 'open").unwrap_err();
        assert!(err.message.contains("closing quote"), "{err}");
        assert!(err.message.contains("end of input"), "{err}");

        let err = parse(r"@m = $base.setMetadata('k', 'a\qb')").unwrap_err();
        assert!(err.message.contains("escape sequence"), "{err}");

        let err = parse("$a = vertices(99999999999999999999)").unwrap_err();
        assert!(err.message.contains("64-bit"), "{err}");
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let depth = 100_000;
        let query = format!("$a = {}vertices(1){}", "(".repeat(depth), ")".repeat(depth));
        let err = parse(&query).unwrap_err();
        assert!(err.message.contains("nested parentheses"), "{err}");
        assert_eq!(err.position.line, 1);

        let calls = format!("$a = {}1{}", "vertices(".repeat(depth), ")".repeat(depth));
        let err = parse(&calls).unwrap_err();
        assert!(err.message.contains("nested parentheses"), "{err}");

        let fine = format!("$a = {}vertices(1){}", "(".repeat(60), ")".repeat(60));
        assert!(parse(&fine).is_ok());
    }

    #[test]
    fn long_chains_are_capped() {
        let methods = format!("$a = $base{}", ".distinct()".repeat(100_000));
        let err = parse(&methods).unwrap_err();
        assert!(err.message.contains("operations deep"), "{err}");

        let unions = format!("$a = $b{}", " + $b".repeat(100_000));
        let err = parse(&unions).unwrap_err();
        assert!(err.message.contains("operations deep"), "{err}");

        let fine = format!("$a = $b{}", " + $b".repeat(200));
        assert!(parse(&fine).is_ok());
    }

    #[test]
    fn empty_and_comment_only_queries_have_no_statements() -> Result<()> {
        assert!(parse("")?.statements.is_empty());
        assert!(parse("# nothing\n;;\n")?.statements.is_empty());
        Ok(())
    }
}
