//! Parser: token stream → [`Clause`].

use crate::error::{Error, Pos, Result};
use crate::lexer::{tokenize, LiteralKind, Token, TokenKind};

/// Which placeholder syntax a template commits to. A template may use only
/// one style; mixing `$N` and `?` in the same raw string is a syntax error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindVarStyle {
    Dollar,
    Question,
}

/// One literal argument to a `#name(...)` call.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Nil,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlainExpr {
    pub text: String,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindVarExpr {
    pub style: BindVarStyle,
    pub index: i64,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncCallExpr {
    pub name: String,
    pub args: Vec<Literal>,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncExpr {
    pub name: String,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Plain(PlainExpr),
    BindVar(BindVarExpr),
    FuncCall(FuncCallExpr),
    Func(FuncExpr),
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Plain(e) => e.pos,
            Expr::BindVar(e) => e.pos,
            Expr::FuncCall(e) => e.pos,
            Expr::Func(e) => e.pos,
        }
    }
}

/// The parsed form of one raw template: an ordered list of expressions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Clause {
    pub exprs: Vec<Expr>,
}

struct Parser<'a> {
    raw: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ref_count: i64,
    style: Option<BindVarStyle>,
}

fn syntax_error(raw: &str, pos: Pos, message: impl Into<String>) -> Error {
    Error::syntax(raw, pos, message)
}

impl<'a> Parser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            tokens: tokenize(raw),
            pos: 0,
            ref_count: 0,
            style: None,
        }
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, pos: Pos, message: impl Into<String>) -> Error {
        syntax_error(self.raw, pos, message)
    }

    fn parse(mut self) -> Result<Clause> {
        let mut exprs = Vec::new();
        loop {
            let tok = self.bump();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Plain => exprs.push(Expr::Plain(PlainExpr {
                    text: tok.text,
                    pos: tok.pos,
                })),
                TokenKind::Ref => {
                    let e = self.bind_var_expr(&tok)?;
                    exprs.push(e);
                }
                TokenKind::Hash => self.func_expr(&tok, &mut exprs)?,
                other => {
                    return Err(self.err(tok.pos, format!("unexpected token {:?}", other)));
                }
            }
        }
        Ok(Clause { exprs })
    }

    fn bind_var_expr(&mut self, tok: &Token) -> Result<Expr> {
        let style = match tok.text.as_str() {
            "$" => BindVarStyle::Dollar,
            "?" => BindVarStyle::Question,
            _ => unreachable!("lexer only emits Ref for $ or ?"),
        };
        self.ref_count += 1;
        match self.style {
            None => self.style = Some(style),
            Some(s) if s != style => {
                return Err(self.err(tok.pos, "mixed bindvar styles in one template"));
            }
            _ => {}
        }
        let index = if style == BindVarStyle::Question {
            self.ref_count
        } else {
            let lit = self.bump();
            if lit.kind != TokenKind::Literal || lit.lit_kind != LiteralKind::Number {
                return Err(self.err(
                    lit.pos,
                    format!("unexpected '{}', want bindvar index", lit.text),
                ));
            }
            lit.text
                .parse::<i64>()
                .map_err(|e| self.err(lit.pos, e.to_string()))?
        };
        Ok(Expr::BindVar(BindVarExpr {
            style,
            index,
            pos: tok.pos,
        }))
    }

    fn literal_from_token(&self, tok: &Token) -> Result<Literal> {
        match tok.lit_kind {
            LiteralKind::Nil => Ok(Literal::Nil),
            LiteralKind::Bool => Ok(Literal::Bool(tok.text == "true")),
            LiteralKind::Number => tok
                .text
                .parse::<f64>()
                .map(Literal::Number)
                .map_err(|e| self.err(tok.pos, e.to_string())),
            LiteralKind::Str => {
                let inner = &tok.text[1..tok.text.len() - 1];
                Ok(Literal::Str(inner.replace("''", "'")))
            }
            LiteralKind::None => unreachable!("only Literal tokens reach here"),
        }
    }

    fn func_expr(&mut self, hash_tok: &Token, exprs: &mut Vec<Expr>) -> Result<()> {
        let pos = hash_tok.pos;
        let name_tok = self.bump();
        if name_tok.kind != TokenKind::Name {
            return Err(self.err(
                name_tok.pos,
                format!("unexpected {:?}, want function name", name_tok.kind),
            ));
        }
        let name = name_tok.text;
        let next = self.bump();
        match next.kind {
            TokenKind::LParen => {
                let args = self.func_call_args()?;
                exprs.push(Expr::FuncCall(FuncCallExpr { name, args, pos }));
            }
            TokenKind::Literal if next.lit_kind == LiteralKind::Number => {
                let n: f64 = next
                    .text
                    .parse()
                    .map_err(|e: std::num::ParseFloatError| self.err(next.pos, e.to_string()))?;
                exprs.push(Expr::FuncCall(FuncCallExpr {
                    name,
                    args: vec![Literal::Number(n)],
                    pos,
                }));
            }
            TokenKind::Literal => {
                return Err(self.err(next.pos, format!("unexpected '{}', want index", next.text)));
            }
            TokenKind::Eof => {
                exprs.push(Expr::Func(FuncExpr { name, pos }));
            }
            TokenKind::Plain => {
                exprs.push(Expr::Func(FuncExpr { name, pos }));
                exprs.push(Expr::Plain(PlainExpr {
                    text: next.text,
                    pos: next.pos,
                }));
            }
            other => {
                return Err(self.err(
                    next.pos,
                    format!("unexpected {:?} after bare function name, forgot to call it?", other),
                ));
            }
        }
        Ok(())
    }

    fn func_call_args(&mut self) -> Result<Vec<Literal>> {
        let mut args = Vec::new();
        loop {
            let tok = self.bump();
            if tok.kind != TokenKind::Literal {
                if tok.kind == TokenKind::RParen {
                    break;
                }
                return Err(self.err(tok.pos, format!("unexpected token {:?}, want args", tok.kind)));
            }
            if tok.bad {
                return Err(self.err(tok.pos, format!("bad argument: {}", tok.text)));
            }
            args.push(self.literal_from_token(&tok)?);
            let sep = self.bump();
            if sep.kind != TokenKind::Comma {
                if sep.kind != TokenKind::RParen {
                    return Err(self.err(sep.pos, format!("unexpected token {:?}, want )", sep.kind)));
                }
                break;
            }
        }
        Ok(args)
    }
}

/// Parses a raw template into a [`Clause`]. Deterministic: the same input
/// always produces an identical `Clause`.
pub fn parse(raw: &str) -> Result<Clause> {
    Parser::new(raw).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_only() {
        let c = parse("select 1").unwrap();
        assert_eq!(c.exprs.len(), 1);
        assert!(matches!(&c.exprs[0], Expr::Plain(p) if p.text == "select 1"));
    }

    #[test]
    fn dollar_bindvar() {
        let c = parse("a = $2").unwrap();
        assert!(matches!(
            &c.exprs[1],
            Expr::BindVar(b) if b.style == BindVarStyle::Dollar && b.index == 2
        ));
    }

    #[test]
    fn question_bindvar_counts_occurrences() {
        let c = parse("a = ? AND b = ?").unwrap();
        let indexes: Vec<i64> = c
            .exprs
            .iter()
            .filter_map(|e| match e {
                Expr::BindVar(b) => Some(b.index),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![1, 2]);
    }

    #[test]
    fn mixed_styles_is_syntax_error() {
        let err = parse("a = $1 AND b = ?").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn func_call_with_args() {
        let c = parse("#join('#arg', ', ', 2)").unwrap();
        match &c.exprs[0] {
            Expr::FuncCall(f) => {
                assert_eq!(f.name, "join");
                assert_eq!(
                    f.args,
                    vec![
                        Literal::Str("#arg".into()),
                        Literal::Str(", ".into()),
                        Literal::Number(2.0),
                    ]
                );
            }
            other => panic!("expected FuncCall, got {:?}", other),
        }
    }

    #[test]
    fn func_shorthand_digits() {
        let c = parse("#arg3").unwrap();
        match &c.exprs[0] {
            Expr::FuncCall(f) => {
                assert_eq!(f.name, "arg");
                assert_eq!(f.args, vec![Literal::Number(3.0)]);
            }
            other => panic!("expected FuncCall, got {:?}", other),
        }
    }

    #[test]
    fn bare_func_followed_by_plain() {
        let c = parse("#arg, rest").unwrap();
        assert!(matches!(&c.exprs[0], Expr::Func(f) if f.name == "arg"));
        assert!(matches!(&c.exprs[1], Expr::Plain(p) if p.text == ", rest"));
    }

    #[test]
    fn bare_func_at_end_is_just_func_expr() {
        let c = parse("#arg").unwrap();
        assert_eq!(c.exprs.len(), 1);
        assert!(matches!(&c.exprs[0], Expr::Func(f) if f.name == "arg"));
    }

    #[test]
    fn string_literal_unescapes_doubled_quote() {
        let c = parse("#f('it''s')").unwrap();
        match &c.exprs[0] {
            Expr::FuncCall(f) => assert_eq!(f.args, vec![Literal::Str("it's".into())]),
            other => panic!("expected FuncCall, got {:?}", other),
        }
    }

    #[test]
    fn bad_argument_is_syntax_error() {
        let err = parse("#f(abc)").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn determinism() {
        let raw = "SELECT * FROM foo WHERE #join('#fragment', ' AND ')";
        assert_eq!(parse(raw).unwrap(), parse(raw).unwrap());
    }
}
