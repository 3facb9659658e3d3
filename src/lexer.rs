//! Single-pass lexer for the `#`-preprocessing template mini-language.
//!
//! The lexer never interprets SQL itself. Embedded string literals
//! (`'...'`, `"..."`, `` `...` ``) are scanned and folded straight into the
//! surrounding `Plain` text, so the parser never sees them as anything but
//! inert bytes.

use crate::error::Pos;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// A run of text to copy verbatim into the output, including any
    /// embedded SQL string literals.
    Plain,
    /// `$` or `?`, the start of a bind-var reference. `text` is `"$"` or
    /// `"?"`.
    Ref,
    /// One literal value inside a `#name(...)` argument list, or the
    /// numeric index following `$`/`?`/`#name`. See [`LiteralKind`].
    Literal,
    /// `#`.
    Hash,
    /// A function name (letters and underscores only).
    Name,
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiteralKind {
    /// Not a literal token.
    None,
    Number,
    Str,
    Bool,
    Nil,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lit_kind: LiteralKind,
    /// Raw source text of the token. For `Str` literals this still includes
    /// the surrounding quotes; the parser strips and unescapes them.
    pub text: String,
    pub pos: Pos,
    /// Set when the token is malformed (unterminated quote, bad argument).
    /// Emitted anyway so the parser can report a precise error.
    pub bad: bool,
}

impl Token {
    fn new(kind: TokenKind, lit_kind: LiteralKind, text: impl Into<String>, pos: Pos) -> Self {
        Self {
            kind,
            lit_kind,
            text: text.into(),
            pos,
            bad: false,
        }
    }

    fn bad(mut self) -> Self {
        self.bad = true;
        self
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Cursor {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Scans a quoted run starting at the opening quote (`'`, `"`, or `` ` ``)
/// and returns its full source text (quotes included) plus whether it was
/// left unterminated (`bad`). A doubled `''` only escapes inside
/// single-quoted runs.
fn scan_quoted(c: &mut Cursor) -> (String, bool) {
    let quote = c.bump().expect("caller checked a quote is present");
    let mut text = String::new();
    text.push(quote);
    loop {
        match c.bump() {
            None => return (text, true),
            Some(ch) => {
                text.push(ch);
                if ch == quote {
                    if quote == '\'' && c.peek() == Some('\'') {
                        text.push(c.bump().unwrap());
                        continue;
                    }
                    return (text, false);
                }
            }
        }
    }
}

fn scan_plain_run(c: &mut Cursor, out: &mut Vec<Token>) {
    let start = c.here();
    let mut text = String::new();
    loop {
        match c.peek() {
            None => break,
            Some('#') => break,
            Some(r @ ('$' | '?')) => {
                if c.peek2() == Some(r) {
                    text.push(c.bump().unwrap());
                    text.push(c.bump().unwrap());
                    continue;
                }
                break;
            }
            Some(q @ ('\'' | '"' | '`')) => {
                let _ = q;
                let (qtext, bad) = scan_quoted(c);
                text.push_str(&qtext);
                if bad {
                    out.push(Token::new(TokenKind::Plain, LiteralKind::None, text, start).bad());
                    return;
                }
                continue;
            }
            Some(ch) => {
                text.push(ch);
                c.bump();
            }
        }
    }
    if !text.is_empty() {
        out.push(Token::new(TokenKind::Plain, LiteralKind::None, text, start));
    }
}

fn scan_digits(c: &mut Cursor) -> (Pos, String) {
    let pos = c.here();
    let mut digits = String::new();
    while let Some(d) = c.peek() {
        if d.is_ascii_digit() {
            digits.push(d);
            c.bump();
        } else {
            break;
        }
    }
    (pos, digits)
}

fn scan_ref(c: &mut Cursor, out: &mut Vec<Token>) {
    let pos = c.here();
    let ch = c.bump().expect("caller checked $ or ? is present");
    out.push(Token::new(TokenKind::Ref, LiteralKind::None, ch.to_string(), pos));
    let (dpos, digits) = scan_digits(c);
    if !digits.is_empty() {
        out.push(Token::new(TokenKind::Literal, LiteralKind::Number, digits, dpos));
    }
}

fn scan_func_args(c: &mut Cursor, out: &mut Vec<Token>) {
    loop {
        while c.peek().is_some_and(|ch| ch.is_whitespace()) {
            c.bump();
        }
        let pos = c.here();
        match c.peek() {
            None => return,
            Some(',') => {
                c.bump();
                out.push(Token::new(TokenKind::Comma, LiteralKind::None, ",", pos));
                continue;
            }
            Some(')') => {
                c.bump();
                out.push(Token::new(TokenKind::RParen, LiteralKind::None, ")", pos));
                return;
            }
            Some('\'') => {
                let (text, bad) = scan_quoted(c);
                let mut tok = Token::new(TokenKind::Literal, LiteralKind::Str, text, pos);
                tok.bad = bad;
                out.push(tok);
                continue;
            }
            Some(_) => {
                let mut frag = String::new();
                while let Some(ch) = c.peek() {
                    if ch == ',' || ch == ')' {
                        break;
                    }
                    frag.push(ch);
                    c.bump();
                }
                let trimmed = frag.trim();
                match trimmed {
                    "true" | "false" => {
                        out.push(Token::new(TokenKind::Literal, LiteralKind::Bool, trimmed, pos))
                    }
                    "null" | "nil" => {
                        out.push(Token::new(TokenKind::Literal, LiteralKind::Nil, trimmed, pos))
                    }
                    _ if trimmed.parse::<f64>().is_ok() => {
                        out.push(Token::new(TokenKind::Literal, LiteralKind::Number, trimmed, pos))
                    }
                    _ => out.push(
                        Token::new(TokenKind::Name, LiteralKind::None, frag, pos).bad(),
                    ),
                }
            }
        }
    }
}

fn scan_func_name(c: &mut Cursor, out: &mut Vec<Token>) {
    let pos = c.here();
    let mut name = String::new();
    while let Some(ch) = c.peek() {
        if is_letter(ch) {
            name.push(ch);
            c.bump();
        } else {
            break;
        }
    }
    if name.is_empty() {
        // No identifier followed `#`; the parser reports this as a syntax
        // error (a bare `#` is never valid).
        return;
    }
    out.push(Token::new(TokenKind::Name, LiteralKind::None, name, pos));

    let (dpos, digits) = scan_digits(c);
    if !digits.is_empty() {
        out.push(Token::new(TokenKind::Literal, LiteralKind::Number, digits, dpos));
        return;
    }
    if c.peek() == Some('(') {
        let lp = c.here();
        c.bump();
        out.push(Token::new(TokenKind::LParen, LiteralKind::None, "(", lp));
        scan_func_args(c, out);
    }
}

fn scan_func(c: &mut Cursor, out: &mut Vec<Token>) {
    let pos = c.here();
    c.bump();
    out.push(Token::new(TokenKind::Hash, LiteralKind::None, "#", pos));
    scan_func_name(c, out);
}

/// Tokenizes a raw template. Always terminates with one `Eof` token.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut c = Cursor::new(input);
    let mut out = Vec::new();
    loop {
        scan_plain_run(&mut c, &mut out);
        match c.peek() {
            None => {
                out.push(Token::new(TokenKind::Eof, LiteralKind::None, "", c.here()));
                return out;
            }
            Some('#') => scan_func(&mut c, &mut out),
            Some('$') | Some('?') => scan_ref(&mut c, &mut out),
            Some(_) => unreachable!("scan_plain_run stops only at #, $, ?, or EOF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn plain_text_only() {
        let tokens = tokenize("SELECT 1");
        assert_eq!(kinds(&tokens), vec![TokenKind::Plain, TokenKind::Eof]);
        assert_eq!(tokens[0].text, "SELECT 1");
    }

    #[test]
    fn dollar_ref_with_index() {
        let tokens = tokenize("a = $12 b");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Plain,
                TokenKind::Ref,
                TokenKind::Literal,
                TokenKind::Plain,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].text, "$");
        assert_eq!(tokens[2].text, "12");
    }

    #[test]
    fn question_ref_has_no_index_literal() {
        let tokens = tokenize("a = ?");
        assert_eq!(kinds(&tokens), vec![TokenKind::Plain, TokenKind::Ref, TokenKind::Eof]);
    }

    #[test]
    fn doubled_markers_stay_plain() {
        let tokens = tokenize("price $$5 and ??");
        assert_eq!(kinds(&tokens), vec![TokenKind::Plain, TokenKind::Eof]);
        assert_eq!(tokens[0].text, "price $$5 and ??");
    }

    #[test]
    fn embedded_single_quote_literal_merges_into_plain() {
        let tokens = tokenize("name = 'it''s $1'");
        assert_eq!(kinds(&tokens), vec![TokenKind::Plain, TokenKind::Eof]);
        assert_eq!(tokens[0].text, "name = 'it''s $1'");
    }

    #[test]
    fn unterminated_quote_is_marked_bad() {
        let tokens = tokenize("a = 'oops");
        assert_eq!(tokens[0].kind, TokenKind::Plain);
        assert!(tokens[0].bad);
    }

    #[test]
    fn func_shorthand_call() {
        let tokens = tokenize("#arg3");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Hash, TokenKind::Name, TokenKind::Literal, TokenKind::Eof]
        );
        assert_eq!(tokens[1].text, "arg");
        assert_eq!(tokens[2].text, "3");
    }

    #[test]
    fn bare_func_name() {
        let tokens = tokenize("#join('#arg', ',')");
        // outer call
        assert_eq!(tokens[0].kind, TokenKind::Hash);
        assert_eq!(tokens[1].text, "join");
        assert_eq!(tokens[2].kind, TokenKind::LParen);
        assert_eq!(tokens[3].kind, TokenKind::Literal);
        assert_eq!(tokens[3].lit_kind, LiteralKind::Str);
        assert_eq!(tokens[3].text, "'#arg'");
    }

    #[test]
    fn func_call_with_literal_args() {
        let tokens = tokenize("#join('#f', ', ', 2, 4)");
        let lits: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Literal)
            .collect();
        assert_eq!(lits.len(), 4);
        assert_eq!(lits[2].text, "2");
        assert_eq!(lits[3].text, "4");
    }

    #[test]
    fn bool_and_nil_literals() {
        let tokens = tokenize("#f(true, false, null, nil)");
        let lits: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Literal)
            .map(|t| t.lit_kind)
            .collect();
        assert_eq!(
            lits,
            vec![
                LiteralKind::Bool,
                LiteralKind::Bool,
                LiteralKind::Nil,
                LiteralKind::Nil
            ]
        );
    }

    #[test]
    fn bad_argument_fragment() {
        let tokens = tokenize("#f(abc)");
        let bad = tokens.iter().find(|t| t.bad).expect("one bad token");
        assert_eq!(bad.kind, TokenKind::Name);
        assert_eq!(bad.text, "abc");
    }

    #[test]
    fn bare_hash_with_no_name_emits_no_name_token() {
        let tokens = tokenize("# rest");
        assert_eq!(kinds(&tokens), vec![TokenKind::Hash, TokenKind::Plain, TokenKind::Eof]);
    }
}
