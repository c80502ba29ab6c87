use std::fmt;

use crate::error::TreeError;
use crate::source::Position;

/// A type as written in source, before names are resolved to shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    Named { name: String, args: Vec<TypeExpr> },
    Nullable(Box<TypeExpr>),
    Union(Vec<TypeExpr>),
    Function {
        params: Vec<TypeExpr>,
        rest: Option<Box<TypeExpr>>,
        ret: Box<TypeExpr>,
    },
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: TypeExprKind::Named {
                name: name.into(),
                args: Vec::new(),
            },
            pos: Position::default(),
        }
    }

    pub fn at(mut self, pos: Position) -> Self {
        self.pos = pos;
        self
    }

    /// Parses forms like `Int`, `List<String>?`, `A | B` and `fn (Int, ...String): Boolean`.
    pub fn parse(text: &str) -> Result<Self, TreeError> {
        let mut parser = TypeExprParser {
            text,
            tokens: tokenize(text),
            index: 0,
        };
        let parsed = parser.parse_union()?;
        if parser.index != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(parsed)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.kind {
            TypeExprKind::Named { name, args } => {
                out.push(name);
                for arg in args {
                    arg.collect_names(out);
                }
            }
            TypeExprKind::Nullable(inner) => inner.collect_names(out),
            TypeExprKind::Union(members) => {
                for member in members {
                    member.collect_names(out);
                }
            }
            TypeExprKind::Function { params, rest, ret } => {
                for param in params {
                    param.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
                ret.collect_names(out);
            }
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeExprKind::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    let joined = args
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "<{joined}>")?;
                }
                Ok(())
            }
            TypeExprKind::Nullable(inner) => write!(f, "{inner}?"),
            TypeExprKind::Union(members) => {
                let joined = members
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" | ");
                f.write_str(&joined)
            }
            TypeExprKind::Function { params, rest, ret } => {
                let mut parts = params.iter().map(ToString::to_string).collect::<Vec<_>>();
                if let Some(rest) = rest {
                    parts.push(format!("...{rest}"));
                }
                write!(f, "fn ({}): {ret}", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Punct(&'static str),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some((index, next)) = chars.peek().copied() {
                if next.is_alphanumeric() || next == '_' {
                    end = index + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(text[start..end].to_string()));
            continue;
        }
        if c == '.' && text[start..].starts_with("...") {
            chars.next();
            chars.next();
            tokens.push(Token::Punct("..."));
            continue;
        }
        let punct = match c {
            '<' => "<",
            '>' => ">",
            '(' => "(",
            ')' => ")",
            ',' => ",",
            ':' => ":",
            '?' => "?",
            '|' => "|",
            _ => "",
        };
        tokens.push(if punct.is_empty() {
            Token::Ident(c.to_string())
        } else {
            Token::Punct(punct)
        });
    }
    tokens
}

struct TypeExprParser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    index: usize,
}

impl TypeExprParser<'_> {
    fn error(&self, reason: &str) -> TreeError {
        TreeError::BadTypeExpression {
            text: self.text.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek_punct(&self, punct: &str) -> bool {
        matches!(self.tokens.get(self.index), Some(Token::Punct(p)) if *p == punct)
    }

    fn expect(&mut self, punct: &str) -> Result<(), TreeError> {
        if self.peek_punct(punct) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{punct}`")))
        }
    }

    fn parse_union(&mut self) -> Result<TypeExpr, TreeError> {
        let mut members = vec![self.parse_postfix()?];
        while self.peek_punct("|") {
            self.index += 1;
            members.push(self.parse_postfix()?);
        }
        if members.len() == 1 {
            return Ok(members.remove(0));
        }
        Ok(TypeExpr {
            kind: TypeExprKind::Union(members),
            pos: Position::default(),
        })
    }

    fn parse_postfix(&mut self) -> Result<TypeExpr, TreeError> {
        let mut ty = self.parse_primary()?;
        while self.peek_punct("?") {
            self.index += 1;
            ty = TypeExpr {
                kind: TypeExprKind::Nullable(Box::new(ty)),
                pos: Position::default(),
            };
        }
        Ok(ty)
    }

    fn parse_primary(&mut self) -> Result<TypeExpr, TreeError> {
        if self.peek_punct("(") {
            self.index += 1;
            let inner = self.parse_union()?;
            self.expect(")")?;
            return Ok(inner);
        }
        let name = match self.tokens.get(self.index) {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(self.error("expected a type name")),
        };
        self.index += 1;

        if name == "fn" {
            return self.parse_function();
        }

        let mut args = Vec::new();
        if self.peek_punct("<") {
            self.index += 1;
            loop {
                args.push(self.parse_union()?);
                if self.peek_punct(",") {
                    self.index += 1;
                    continue;
                }
                self.expect(">")?;
                break;
            }
        }
        Ok(TypeExpr {
            kind: TypeExprKind::Named { name, args },
            pos: Position::default(),
        })
    }

    fn parse_function(&mut self) -> Result<TypeExpr, TreeError> {
        self.expect("(")?;
        let mut params = Vec::new();
        let mut rest = None;
        if !self.peek_punct(")") {
            loop {
                if self.peek_punct("...") {
                    self.index += 1;
                    rest = Some(Box::new(self.parse_union()?));
                } else if rest.is_some() {
                    return Err(self.error("rest parameter must come last"));
                } else {
                    params.push(self.parse_union()?);
                }
                if self.peek_punct(",") {
                    self.index += 1;
                    continue;
                }
                break;
            }
        }
        self.expect(")")?;
        self.expect(":")?;
        let ret = self.parse_postfix()?;
        Ok(TypeExpr {
            kind: TypeExprKind::Function {
                params,
                rest,
                ret: Box::new(ret),
            },
            pos: Position::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_generics_and_nullables() {
        let parsed = TypeExpr::parse("List<Map<String, Int>?>?").expect("parse");
        assert_eq!(parsed.to_string(), "List<Map<String, Int>?>?");
    }

    #[test]
    fn parses_function_types_with_rest() {
        let parsed = TypeExpr::parse("fn (Int, ...String): Boolean").expect("parse");
        assert_eq!(parsed.to_string(), "fn (Int, ...String): Boolean");
    }

    #[test]
    fn rejects_unclosed_arguments() {
        assert!(matches!(
            TypeExpr::parse("List<Int"),
            Err(TreeError::BadTypeExpression { .. })
        ));
    }
}
