//! Tokenizer for the scripting language.
//!
//! Produces the whole token stream up front, including the `Indent`,
//! `Dedent` and `Newline` tokens that encode block structure. Newlines inside
//! brackets are not significant.

use std::fmt;

use crate::span::{Pos, Span};

/// A token paired with its location in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),

    // keywords
    Def,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Return,
    Import,
    Raise,
    Pass,
    Break,
    Continue,
    And,
    Or,
    Not,
    True,
    False,
    None,

    // operators and punctuation
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,

    Newline,
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Name(name) => return write!(f, "name `{name}`"),
            TokenKind::Int(value) => return write!(f, "integer `{value}`"),
            TokenKind::Float(value) => return write!(f, "float `{value}`"),
            TokenKind::Str(_) => "string literal",
            TokenKind::Def => "`def`",
            TokenKind::If => "`if`",
            TokenKind::Elif => "`elif`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::For => "`for`",
            TokenKind::In => "`in`",
            TokenKind::Return => "`return`",
            TokenKind::Import => "`import`",
            TokenKind::Raise => "`raise`",
            TokenKind::Pass => "`pass`",
            TokenKind::Break => "`break`",
            TokenKind::Continue => "`continue`",
            TokenKind::And => "`and`",
            TokenKind::Or => "`or`",
            TokenKind::Not => "`not`",
            TokenKind::True => "`True`",
            TokenKind::False => "`False`",
            TokenKind::None => "`None`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::DoubleStar => "`**`",
            TokenKind::Slash => "`/`",
            TokenKind::DoubleSlash => "`//`",
            TokenKind::Percent => "`%`",
            TokenKind::Assign => "`=`",
            TokenKind::PlusAssign => "`+=`",
            TokenKind::MinusAssign => "`-=`",
            TokenKind::StarAssign => "`*=`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::LtE => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::GtE => "`>=`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Dot => "`.`",
            TokenKind::Newline => "end of line",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Eof => "end of file",
        };
        f.write_str(text)
    }
}

/// Lexing or parsing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}, column {})",
            self.message, self.pos.line, self.pos.col
        )
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

const TAB_WIDTH: usize = 8;

/// Tokenize `source`.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
    line: u32,
    line_start: usize,
    indents: Vec<usize>,
    bracket_depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            line: 1,
            line_start: 0,
            indents: vec![0],
            bracket_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> ParseResult<Vec<Token>> {
        loop {
            if self.at_line_start && self.bracket_depth == 0 && !self.lex_indentation()? {
                break;
            }

            self.skip_trivia()?;

            let Some(ch) = self.peek_char() else {
                break;
            };

            match ch {
                '\n' | '\r' => {
                    if self.bracket_depth == 0 {
                        let start = self.pos();
                        self.push(TokenKind::Newline, start, Pos::new(start.line, start.col + 1));
                        self.at_line_start = true;
                    }
                    self.bump_newline();
                }
                c if is_ident_start(c) => self.lex_name(),
                c if c.is_ascii_digit() => self.lex_number()?,
                '"' | '\'' => self.lex_string(ch)?,
                _ => self.lex_symbol()?,
            }
        }

        let eof = self.pos();
        if self.bracket_depth > 0 {
            return Err(ParseError::new("unexpected end of file inside brackets", eof));
        }
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        ) {
            self.push(TokenKind::Newline, eof, eof);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, eof, eof);
        }
        self.push(TokenKind::Eof, eof, eof);

        Ok(self.tokens)
    }

    /// Measure the indentation of the next logical line and emit
    /// `Indent`/`Dedent` tokens. Blank and comment-only lines are skipped.
    /// Returns false at end of input.
    fn lex_indentation(&mut self) -> ParseResult<bool> {
        loop {
            let mut width = 0;
            while let Some(ch) = self.peek_char() {
                match ch {
                    ' ' => width += 1,
                    '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\x0c' => width = 0,
                    _ => break,
                }
                self.bump_char();
            }

            match self.peek_char() {
                None => return Ok(false),
                Some('\n' | '\r') => {
                    self.bump_newline();
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    if self.peek_char().is_none() {
                        return Ok(false);
                    }
                    self.bump_newline();
                    continue;
                }
                Some(_) => {}
            }

            let here = self.pos();
            let current = self.indents.last().copied().unwrap_or(0);
            if width > current {
                self.indents.push(width);
                self.push(TokenKind::Indent, Pos::new(here.line, 0), here);
            } else {
                while width < self.indents.last().copied().unwrap_or(0) {
                    self.indents.pop();
                    self.push(TokenKind::Dedent, here, here);
                }
                if width != self.indents.last().copied().unwrap_or(0) {
                    return Err(ParseError::new(
                        "unindent does not match any outer indentation level",
                        here,
                    ));
                }
            }

            self.at_line_start = false;
            return Ok(true);
        }
    }

    /// Skip spaces, comments and explicit line continuations.
    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            match self.peek_char() {
                Some(' ' | '\t' | '\x0c') => {
                    self.bump_char();
                }
                Some('#') => self.skip_comment(),
                Some('\\') => {
                    let start = self.pos();
                    self.bump_char();
                    match self.peek_char() {
                        Some('\n' | '\r') => self.bump_newline(),
                        _ => {
                            return Err(ParseError::new(
                                "unexpected character after line continuation",
                                start,
                            ));
                        }
                    }
                }
                Some('\n' | '\r') if self.bracket_depth > 0 => self.bump_newline(),
                _ => return Ok(()),
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' || ch == '\r' {
                break;
            }
            self.bump_char();
        }
    }

    fn lex_name(&mut self) {
        let start = self.pos();
        let begin = self.cursor;
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.bump_char();
            } else {
                break;
            }
        }

        let kind = match &self.source[begin..self.cursor] {
            "def" => TokenKind::Def,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "return" => TokenKind::Return,
            "import" => TokenKind::Import,
            "raise" => TokenKind::Raise,
            "pass" => TokenKind::Pass,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            ident => TokenKind::Name(ident.to_string()),
        };

        let end = self.pos();
        self.push(kind, start, end);
    }

    fn lex_number(&mut self) -> ParseResult<()> {
        let start = self.pos();
        let begin = self.cursor;
        self.consume_digits();

        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.peek_next_char().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.bump_char();
            self.consume_digits();
        }

        let literal = &self.source[begin..self.cursor];
        let kind = if is_float {
            literal
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| ParseError::new(format!("invalid float literal `{literal}`"), start))?
        } else {
            literal.parse::<i64>().map(TokenKind::Int).map_err(|_| {
                ParseError::new(format!("integer literal `{literal}` is too large"), start)
            })?
        };

        let end = self.pos();
        self.push(kind, start, end);
        Ok(())
    }

    fn consume_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump_char();
        }
    }

    fn lex_string(&mut self, quote: char) -> ParseResult<()> {
        let start = self.pos();
        self.bump_char();

        let mut value = String::new();
        loop {
            let Some(ch) = self.peek_char() else {
                return Err(ParseError::new("unterminated string literal", start));
            };
            match ch {
                '\n' | '\r' => {
                    return Err(ParseError::new("unterminated string literal", start));
                }
                c if c == quote => {
                    self.bump_char();
                    break;
                }
                '\\' => {
                    self.bump_char();
                    let Some(escaped) = self.peek_char() else {
                        return Err(ParseError::new("unterminated string literal", start));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(escaped),
                        '\n' | '\r' => {
                            return Err(ParseError::new("unterminated string literal", start));
                        }
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                    self.bump_char();
                }
                other => {
                    value.push(other);
                    self.bump_char();
                }
            }
        }

        let end = self.pos();
        self.push(TokenKind::Str(value), start, end);
        Ok(())
    }

    fn lex_symbol(&mut self) -> ParseResult<()> {
        let start = self.pos();
        let rest = &self.source[self.cursor..];

        const TWO: [(&str, TokenKind); 9] = [
            ("**", TokenKind::DoubleStar),
            ("//", TokenKind::DoubleSlash),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::LtE),
            (">=", TokenKind::GtE),
            ("+=", TokenKind::PlusAssign),
            ("-=", TokenKind::MinusAssign),
            ("*=", TokenKind::StarAssign),
        ];

        for (text, kind) in TWO {
            if rest.starts_with(text) {
                self.bump_char();
                self.bump_char();
                let end = self.pos();
                self.push(kind, start, end);
                return Ok(());
            }
        }

        let ch = self.peek_char().unwrap_or('\0');
        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '(' | '[' => {
                self.bracket_depth += 1;
                if ch == '(' {
                    TokenKind::LParen
                } else {
                    TokenKind::LBracket
                }
            }
            ')' | ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                if ch == ')' {
                    TokenKind::RParen
                } else {
                    TokenKind::RBracket
                }
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character {other:?}"),
                    start,
                ));
            }
        };

        self.bump_char();
        let end = self.pos();
        self.push(kind, start, end);
        Ok(())
    }

    fn push(&mut self, kind: TokenKind, start: Pos, end: Pos) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, (self.cursor - self.line_start) as u32)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.cursor..].chars().next()
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut chars = self.source[self.cursor..].chars();
        chars.next();
        chars.next()
    }

    fn bump_char(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.cursor += ch.len_utf8();
        }
    }

    /// Consume `\n`, `\r\n` or a lone `\r` and start a new line.
    fn bump_newline(&mut self) {
        if self.source[self.cursor..].starts_with("\r\n") {
            self.cursor += 2;
        } else {
            self.bump_char();
        }
        self.line += 1;
        self.line_start = self.cursor;
    }
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("source should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn indentation_produces_block_tokens() {
        let kinds = kinds("if x:\n    y\nz\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::If,
                TokenKind::Name("x".into()),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("y".into()),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("z".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let kinds = kinds("a\n\n   # note\nb");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Newline,
                TokenKind::Name("b".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let kinds = kinds("f(a,\n  b)\n");
        assert!(!kinds[..kinds.len() - 2].contains(&TokenKind::Newline));
    }

    #[test]
    fn columns_are_byte_offsets() {
        let tokens = tokenize("é = 'ü' or b").unwrap();
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Name("b".into()))
            .unwrap();
        // `é` and `ü` are two bytes each
        assert_eq!(b.span.start, Pos::new(1, 13));
        assert_eq!(b.span.end, Pos::new(1, 14));
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = tokenize("if x:\n    y\n  z\n").unwrap_err();
        assert!(err.message.contains("unindent"));
        assert_eq!(err.pos.line, 3);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.pos, Pos::new(1, 4));
    }
}
