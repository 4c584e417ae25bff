//! Hand-written scanner for the engine's textual command syntax.
//!
//! A program is a whitespace-separated sequence of commands. Each command is
//! a literal followed by a terminator (`.` assert, `?` query, `~` retract),
//! or a rule `head :- body, body.` which may also end in `~` so that logged
//! rule retractions replay. `%` comments run to end of line.

use crate::logic::Term;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Assert,
    Query,
    Retract,
}

/// A literal as written, before its predicate is interned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralDef {
    pub predicate: Box<str>,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub head: LiteralDef,
    pub body: Vec<LiteralDef>,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    Unexpected { expected: Box<str>, found: char },
    UnexpectedEof { expected: Box<str> },
}

/// Malformed input. Fatal for the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::Unexpected { expected, found } => write!(
                f,
                "parse error at {}:{}: expected {}, found '{}'",
                self.line, self.col, expected, found
            ),
            ParseErrorKind::UnexpectedEof { expected } => write!(
                f,
                "parse error at {}:{}: expected {}, found end of input",
                self.line, self.col, expected
            ),
        }
    }
}

impl std::error::Error for ParseError {}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn is_terminator(ch: char) -> bool {
    ch == '.' || ch == '?' || ch == '~'
}

pub struct CommandParser<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> CommandParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    #[inline]
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn error(&self, expected: &str) -> ParseError {
        let kind = match self.chars.clone().next() {
            Some(found) => ParseErrorKind::Unexpected {
                expected: expected.into(),
                found,
            },
            None => ParseErrorKind::UnexpectedEof {
                expected: expected.into(),
            },
        };
        ParseError {
            line: self.line,
            col: self.col,
            kind,
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(ch) if ch == wanted => {
                self.bump();
                Ok(())
            }
            _ => Err(self.error(&format!("'{wanted}'"))),
        }
    }

    fn skip_ws_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.bump();
            } else if ch == '%' {
                while let Some(ch) = self.bump() {
                    if ch == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn scan_identifier(&mut self) -> Result<Box<str>, ParseError> {
        match self.peek() {
            Some(ch) if is_identifier_start(ch) => {}
            _ => return Err(self.error("an identifier")),
        }
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if !is_identifier_part(ch) {
                break;
            }
            name.push(ch);
            self.bump();
        }
        Ok(name.into())
    }

    // Identifiers starting uppercase are variables, everything else is a
    // constant.
    fn scan_term(&mut self) -> Result<Term, ParseError> {
        let name = self.scan_identifier()?;
        let leading = name.chars().next().unwrap_or('\0');
        if leading.is_ascii_uppercase() {
            Ok(Term::Variable(name))
        } else {
            Ok(Term::Constant(name))
        }
    }

    fn scan_literal(&mut self) -> Result<LiteralDef, ParseError> {
        let predicate = self.scan_identifier()?;
        self.skip_ws_and_comments();

        // No parenthesis means arity zero.
        if self.peek() != Some('(') {
            return Ok(LiteralDef {
                predicate,
                terms: Vec::new(),
            });
        }
        self.bump();

        let mut terms = Vec::new();
        loop {
            self.skip_ws_and_comments();
            terms.push(self.scan_term()?);
            self.skip_ws_and_comments();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    break;
                }
                Some(',') => {
                    self.bump();
                }
                _ => return Err(self.error("',' or ')'")),
            }
        }
        Ok(LiteralDef { predicate, terms })
    }

    fn scan_command(&mut self) -> Result<Command, ParseError> {
        let head = self.scan_literal()?;
        self.skip_ws_and_comments();

        match self.peek() {
            Some(ch) if is_terminator(ch) => {
                self.bump();
                let kind = match ch {
                    '.' => CommandKind::Assert,
                    '?' => CommandKind::Query,
                    _ => CommandKind::Retract,
                };
                return Ok(Command {
                    head,
                    body: Vec::new(),
                    kind,
                });
            }
            Some(':') => {
                self.bump();
                self.expect('-')?;
            }
            _ => return Err(self.error("'.', '?', '~' or ':-'")),
        }

        // Rule body: comma-separated literals. Queries cannot carry a body,
        // so only '.' and '~' close it.
        let mut body = Vec::new();
        loop {
            self.skip_ws_and_comments();
            body.push(self.scan_literal()?);
            self.skip_ws_and_comments();
            match self.peek() {
                Some('.') => {
                    self.bump();
                    return Ok(Command {
                        head,
                        body,
                        kind: CommandKind::Assert,
                    });
                }
                Some('~') => {
                    self.bump();
                    return Ok(Command {
                        head,
                        body,
                        kind: CommandKind::Retract,
                    });
                }
                Some(',') => {
                    self.bump();
                }
                _ => return Err(self.error("'.', '~' or ','")),
            }
        }
    }

    /// Next command from the stream, or `None` at end of input.
    pub fn next_command(&mut self) -> Result<Option<Command>, ParseError> {
        self.skip_ws_and_comments();
        if self.peek().is_none() {
            return Ok(None);
        }
        self.scan_command().map(Some)
    }

    pub fn parse_all(&mut self) -> Result<Vec<Command>, ParseError> {
        let mut commands = Vec::new();
        while let Some(cmd) = self.next_command()? {
            commands.push(cmd);
        }
        Ok(commands)
    }
}

/// Parse a complete program in one call.
pub fn parse_program(input: &str) -> Result<Vec<Command>, ParseError> {
    CommandParser::new(input).parse_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(n: &str) -> Term {
        Term::Variable(n.into())
    }

    fn cst(n: &str) -> Term {
        Term::Constant(n.into())
    }

    #[test]
    fn parse_fact() {
        let cmds = parse_program("foo(bar,baz).").unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, CommandKind::Assert);
        assert_eq!(cmds[0].head.predicate.as_ref(), "foo");
        assert_eq!(cmds[0].head.terms, vec![cst("bar"), cst("baz")]);
        assert!(cmds[0].body.is_empty());
    }

    #[test]
    fn missing_terminator_fails() {
        assert!(parse_program("foo(bar,baz)").is_err());
    }

    #[test]
    fn parse_retract() {
        let cmds = parse_program("foo(bar,baz)~").unwrap();
        assert_eq!(cmds[0].kind, CommandKind::Retract);
    }

    #[test]
    fn parse_queries() {
        for src in ["foo(bar,baz)?", "foo(bar,X)?", "foo(X,bar)?", "foo(X)?"] {
            let cmds = parse_program(src).unwrap();
            assert_eq!(cmds.len(), 1, "{src}");
            assert_eq!(cmds[0].kind, CommandKind::Query, "{src}");
        }
    }

    #[test]
    fn parse_rule() {
        let cmds = parse_program("foo(bar,baz) :- quux(bar, baz), woz(bar).").unwrap();
        assert_eq!(cmds[0].kind, CommandKind::Assert);
        assert_eq!(cmds[0].body.len(), 2);
        assert_eq!(cmds[0].body[1].predicate.as_ref(), "woz");
    }

    #[test]
    fn rule_cannot_be_a_query() {
        assert!(parse_program("foo(bar,baz) :- quux(bar, baz), woz(bar)?").is_err());
    }

    #[test]
    fn rule_retraction_is_accepted() {
        let cmds = parse_program("foo(X) :- bar(X)~").unwrap();
        assert_eq!(cmds[0].kind, CommandKind::Retract);
        assert_eq!(cmds[0].body.len(), 1);
    }

    #[test]
    fn several_commands() {
        let cmds = parse_program("foo(bar).foo(baz).quux(bar,baz).").unwrap();
        assert_eq!(cmds.len(), 3);
    }

    #[test]
    fn whitespace_everywhere() {
        let cmds = parse_program("               \t\tfoo(X) :-    baz ( X )   .").unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].head.terms, vec![var("X")]);
        assert_eq!(cmds[0].body[0].terms, vec![var("X")]);
    }

    #[test]
    fn trailing_newline_is_fine() {
        let cmds = parse_program("foo(bar,baz). \n").unwrap();
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn zero_arity_literals() {
        let cmds = parse_program("true.  true?").unwrap();
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].head.terms.is_empty());
        assert_eq!(cmds[1].kind, CommandKind::Query);
    }

    #[test]
    fn zero_arity_rule_head() {
        let cmds = parse_program("ok :- edge(a, b).").unwrap();
        assert!(cmds[0].head.terms.is_empty());
        assert_eq!(cmds[0].body.len(), 1);
    }

    #[test]
    fn empty_parens_are_rejected() {
        assert!(parse_program("foo().").is_err());
    }

    #[test]
    fn comments_are_skipped() {
        let src = "% leading comment\nfoo(bar). % trailing\n% another\nfoo(X)?";
        let cmds = parse_program(src).unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn identifiers_may_start_with_digits_and_contain_dashes() {
        let cmds = parse_program("contains(ca, store, rams_couch, rams-1). 9lives(cat)?").unwrap();
        assert_eq!(cmds[0].head.terms[3], cst("rams-1"));
        assert_eq!(cmds[1].head.predicate.as_ref(), "9lives");
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse_program("foo(bar).\n  bad(").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEof { .. }));

        let err = parse_program("foo(bar)!").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.col, 9);
        match err.kind {
            ParseErrorKind::Unexpected { found, .. } => assert_eq!(found, '!'),
            other => panic!("expected Unexpected, got {other:?}"),
        }
    }

    #[test]
    fn streaming_interface_yields_commands_in_order() {
        let mut p = CommandParser::new("a(x). b(y)? ");
        let first = p.next_command().unwrap().unwrap();
        assert_eq!(first.head.predicate.as_ref(), "a");
        let second = p.next_command().unwrap().unwrap();
        assert_eq!(second.kind, CommandKind::Query);
        assert!(p.next_command().unwrap().is_none());
    }
}
