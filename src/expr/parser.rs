//! Expression parser
//!
//! Turns transformation text into an [`Expr`] tree. The grammar only knows
//! field paths, string/integer literals, calls and `[n]` indexing, so nothing
//! in the source text can reach host code.
//!
//! ```text
//! expression := primary ( "[" integer "]" )*
//! primary    := string | integer | call | path
//! call       := ident "(" [ expression ( "," expression )* ] ")"
//! path       := segment ( "." segment )*
//! segment    := ident | "`" any key text "`"
//! ```
//!
//! Backquoted segments reach keys that are not identifiers, such as
//! `` `first-name` `` or `` `2fa` ``.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Nesting limit for calls and index chains
const MAX_DEPTH: usize = 64;

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted field path, e.g. `address.city`
    Field(Vec<String>),
    /// String or integer literal
    Literal(Value),
    /// Built-in function call
    Call { function: String, args: Vec<Expr> },
    /// Array element access, e.g. `split(name, " ")[0]`
    Index { target: Box<Expr>, index: u64 },
}

impl Expr {
    /// The path of a bare field reference, `None` for anything else
    pub fn field_path(&self) -> Option<&[String]> {
        match self {
            Expr::Field(path) => Some(path),
            _ => None,
        }
    }

    /// Visit every call node, outermost first
    pub fn visit_calls<'a>(
        &'a self,
        visit: &mut dyn FnMut(&'a str, usize) -> Result<()>,
    ) -> Result<()> {
        match self {
            Expr::Field(_) | Expr::Literal(_) => Ok(()),
            Expr::Index { target, .. } => target.visit_calls(visit),
            Expr::Call { function, args } => {
                visit(function, args.len())?;
                args.iter().try_for_each(|arg| arg.visit_calls(visit))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Field(path) => {
                for (i, segment) in path.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write_segment(f, segment)?;
                }
                Ok(())
            }
            Expr::Literal(Value::String(text)) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Expr::Literal(other) => write!(f, "{}", other),
            Expr::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Index { target, index } => write!(f, "{}[{}]", target, index),
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn write_segment(f: &mut fmt::Formatter<'_>, segment: &str) -> fmt::Result {
    if is_identifier(segment) {
        return f.write_str(segment);
    }
    f.write_str("`")?;
    for c in segment.chars() {
        match c {
            '`' => f.write_str("\\`")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("`")
}

/// Parse expression text into a tree
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(syntax_error(source, 0, "empty expression"));
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;

    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(syntax_error(
            source,
            extra.position,
            format!("unexpected {} after expression", extra.token),
        ));
    }

    Ok(expr)
}

fn syntax_error(source: &str, position: usize, message: impl Into<String>) -> SchemaError {
    SchemaError::ExpressionSyntax {
        expression: source.to_string(),
        position,
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    /// Backquoted field name
    Quoted(String),
    Str(String),
    Int(u64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Quoted(name) => write!(f, "field name `{}`", name),
            Token::Str(_) => f.write_str("string literal"),
            Token::Int(n) => write!(f, "integer {}", n),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
            Token::Dot => f.write_str("'.'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn tokenize(source: &str) -> Result<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' | ')' | '[' | ']' | ',' | '.' => {
                chars.next();
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    _ => Token::Dot,
                }
            }
            '"' | '\'' => {
                chars.next();
                Token::Str(read_string(source, &mut chars, c, position)?)
            }
            '`' => {
                chars.next();
                Token::Quoted(read_string(source, &mut chars, c, position)?)
            }
            c if c.is_ascii_digit() => {
                let digits = take_while(&mut chars, |c| c.is_ascii_digit());
                let value = digits
                    .parse::<u64>()
                    .map_err(|_| syntax_error(source, position, "integer literal out of range"))?;
                Token::Int(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                Token::Ident(take_while(&mut chars, |c| c.is_alphanumeric() || c == '_'))
            }
            other => {
                return Err(syntax_error(
                    source,
                    position,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        tokens.push(Spanned { token, position });
    }

    Ok(tokens)
}

fn take_while(chars: &mut Peekable<CharIndices<'_>>, keep: impl Fn(char) -> bool) -> String {
    let mut text = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !keep(c) {
            break;
        }
        text.push(c);
        chars.next();
    }
    text
}

fn read_string(
    source: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String> {
    let mut text = String::new();
    loop {
        match chars.next() {
            None => return Err(syntax_error(source, start, "unterminated string literal")),
            Some((_, c)) if c == quote => return Ok(text),
            Some((at, '\\')) => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, c @ ('\\' | '"' | '\'' | '`'))) => text.push(c),
                Some((_, other)) => {
                    return Err(syntax_error(source, at, format!("unknown escape '\\{}'", other)))
                }
                None => return Err(syntax_error(source, start, "unterminated string literal")),
            },
            Some((_, c)) => text.push(c),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn parse_expression(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let position = self.current_position();
            return Err(syntax_error(self.source, position, "expression nested too deeply"));
        }

        let mut expr = self.parse_primary()?;
        while self.eat(&Token::LBracket) {
            let index = match self.advance() {
                Some(Spanned { token: Token::Int(n), .. }) => n,
                Some(other) => {
                    return Err(syntax_error(
                        self.source,
                        other.position,
                        format!("expected integer index, found {}", other.token),
                    ))
                }
                None => return Err(self.end_of_input()),
            };
            self.expect(&Token::RBracket)?;
            expr = Expr::Index {
                target: Box::new(expr),
                index,
            };
        }

        self.depth -= 1;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(spanned) = self.advance() else {
            return Err(self.end_of_input());
        };

        match spanned.token {
            Token::Str(text) => Ok(Expr::Literal(Value::String(text))),
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call {
                        function: name,
                        args,
                    });
                }

                self.parse_path(name)
            }
            Token::Quoted(name) => self.parse_path(name),
            other => Err(syntax_error(
                self.source,
                spanned.position,
                format!("unexpected {}", other),
            )),
        }
    }

    fn parse_path(&mut self, first: String) -> Result<Expr> {
        let mut path = vec![first];
        while self.eat(&Token::Dot) {
            match self.advance() {
                Some(Spanned {
                    token: Token::Ident(segment) | Token::Quoted(segment),
                    ..
                }) => path.push(segment),
                Some(other) => {
                    return Err(syntax_error(
                        self.source,
                        other.position,
                        format!("expected field name after '.', found {}", other.token),
                    ))
                }
                None => return Err(self.end_of_input()),
            }
        }
        Ok(Expr::Field(path))
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen)?;
            return Ok(args);
        }
    }

    fn advance(&mut self) -> Option<Spanned> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn eat(&mut self, token: &Token) -> bool {
        match self.tokens.get(self.pos) {
            Some(spanned) if spanned.token == *token => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        match self.advance() {
            Some(spanned) if spanned.token == *token => Ok(()),
            Some(other) => Err(syntax_error(
                self.source,
                other.position,
                format!("expected {}, found {}", token, other.token),
            )),
            None => Err(self.end_of_input()),
        }
    }

    fn current_position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.position)
            .unwrap_or(self.source.len())
    }

    fn end_of_input(&self) -> SchemaError {
        syntax_error(self.source, self.source.len(), "unexpected end of expression")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &[&str]) -> Expr {
        Expr::Field(path.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_parse_field_path() {
        assert_eq!(parse("user.address.city").unwrap(), field(&["user", "address", "city"]));
        assert_eq!(parse("  name ").unwrap(), field(&["name"]));
    }

    #[test]
    fn test_parse_call_with_index() {
        let expr = parse("split(name, \" \")[1]").unwrap();
        assert_eq!(
            expr,
            Expr::Index {
                target: Box::new(Expr::Call {
                    function: "split".into(),
                    args: vec![field(&["name"]), Expr::Literal(Value::String(" ".into()))],
                }),
                index: 1,
            }
        );
    }

    #[test]
    fn test_single_and_double_quotes() {
        let single = parse("concat(first, ' ', last)").unwrap();
        let double = parse("concat(first, \" \", last)").unwrap();
        assert_eq!(single, double);
    }

    #[test]
    fn test_escapes() {
        let expr = parse(r#"concat(a, "say \"hi\"\n")"#).unwrap();
        match expr {
            Expr::Call { args, .. } => {
                assert_eq!(args[1], Expr::Literal(Value::String("say \"hi\"\n".into())));
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_display_round_trips() {
        let source = r#"concat(upper(user.name), "-", split(tag, ",")[0])"#;
        let expr = parse(source).unwrap();
        assert_eq!(expr.to_string(), source);
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_quoted_segments() {
        assert_eq!(parse("`first-name`").unwrap(), field(&["first-name"]));
        assert_eq!(parse("user.`2fa`.enabled").unwrap(), field(&["user", "2fa", "enabled"]));
        assert_eq!(parse("prénom").unwrap(), field(&["prénom"]));
        assert_eq!(parse(r"`a\`b`").unwrap(), field(&["a`b"]));
        assert!(matches!(
            parse("`open"),
            Err(SchemaError::ExpressionSyntax { position: 0, .. })
        ));
        // Quoting never turns a name into a call
        assert!(parse("`upper`(name)").is_err());
    }

    #[test]
    fn test_quoted_segments_display_round_trip() {
        let sources = [
            "`first-name`",
            "user.`2fa`.enabled",
            "prénom",
            r"`a\`b`",
            "upper(`x y`)",
        ];
        for source in sources {
            let expr = parse(source).unwrap();
            assert_eq!(expr.to_string(), source);
            assert_eq!(parse(&expr.to_string()).unwrap(), expr);
        }
        assert_eq!(field(&["plain", "with space"]).to_string(), "plain.`with space`");
    }

    #[test]
    fn test_syntax_errors_carry_position() {
        match parse("split(name, ").unwrap_err() {
            SchemaError::ExpressionSyntax { position, .. } => assert_eq!(position, 12),
            other => panic!("Expected ExpressionSyntax, got {:?}", other),
        }

        match parse("name; rm -rf").unwrap_err() {
            SchemaError::ExpressionSyntax { position, message, .. } => {
                assert_eq!(position, 4);
                assert!(message.contains("';'"));
            }
            other => panic!("Expected ExpressionSyntax, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_input() {
        for source in ["", "   ", "'open", "a.", "f(a b)", "a[x]", "a[1", "1 2", "a.(b)"] {
            assert!(
                matches!(parse(source), Err(SchemaError::ExpressionSyntax { .. })),
                "expected syntax error for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_depth_limit() {
        let source = format!("{}x{}", "f(".repeat(100), ")".repeat(100));
        assert!(matches!(parse(&source), Err(SchemaError::ExpressionSyntax { .. })));
    }

    #[test]
    fn test_visit_calls() {
        let expr = parse("concat(lower(a), split(b, ',')[0])").unwrap();
        let mut seen = Vec::new();
        expr.visit_calls(&mut |name, arity| {
            seen.push((name.to_string(), arity));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![("concat".into(), 2), ("lower".into(), 1), ("split".into(), 2)]
        );
    }
}
