//! SQL tokenizer
//!
//! Converts SQL text into a lazy stream of positioned tokens. The lexer is
//! an iterator: it yields exactly one `Eof` token and then stops, and it
//! cannot be rewound. Create a new lexer to scan the text again.

use crate::token::{Keyword, Position, Token, TokenKind};

/// SQL lexer over UTF-8 source text
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            done: false,
        }
    }

    /// Tokenize the entire input, including the trailing `Eof`
    pub fn tokenize(source: &str) -> Vec<Token> {
        Lexer::new(source).collect()
    }

    /// Produce the next token. Returns `Eof` forever once input is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.cursor_position();
        let Some(ch) = self.peek() else {
            return Token::new(TokenKind::Eof, "", start);
        };

        match ch {
            b'\'' => self.lex_quoted(b'\'', TokenKind::String, start),
            b'"' => self.lex_quoted(b'"', TokenKind::QuotedIdent, start),
            b'`' => self.lex_quoted(b'`', TokenKind::QuotedIdent, start),
            b'0'..=b'9' => self.lex_number(start),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start),
            c if is_ident_start(c) => self.lex_word(start),
            _ => self.lex_symbol(start),
        }
    }

    fn cursor_position(&self) -> Position {
        Position::new(self.line, self.col, self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += 1;
            if ch == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    /// Skip whitespace, `--` line comments and `/* */` block comments.
    /// An unterminated block comment runs to the end of input.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => self.advance(),
                (Some(b'-'), Some(b'-')) => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => self.advance(),
                            (None, _) => break,
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Lex a quoted string or identifier. A doubled quote character
    /// stands for one literal quote.
    fn lex_quoted(&mut self, quote: u8, kind: TokenKind, start: Position) -> Token {
        self.advance();
        let mut value = String::new();
        let mut segment_start = self.pos;

        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    value.push_str(&self.src[segment_start..self.pos]);
                    self.advance();
                    if self.peek() == Some(quote) {
                        value.push(quote as char);
                        self.advance();
                        segment_start = self.pos;
                    } else {
                        return Token::new(kind, value, start);
                    }
                }
                Some(_) => self.advance(),
                None => {
                    let text = &self.src[start.offset..];
                    return Token::new(TokenKind::Illegal, text, start);
                }
            }
        }
    }

    /// Integer, decimal, or scientific notation
    fn lex_number(&mut self, start: Position) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            let has_exponent = match self.peek_at(1) {
                Some(b'+' | b'-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if has_exponent {
                self.advance();
                if matches!(self.peek(), Some(b'+' | b'-')) {
                    self.advance();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        Token::new(TokenKind::Number, &self.src[start.offset..self.pos], start)
    }

    fn lex_word(&mut self, start: Position) -> Token {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }

        let word = &self.src[start.offset..self.pos];
        let kind = match Keyword::lookup(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident,
        };
        Token::new(kind, word, start)
    }

    fn lex_symbol(&mut self, start: Position) -> Token {
        let two = (self.peek(), self.peek_at(1));
        let (kind, len) = match two {
            (Some(b':'), Some(b':')) => (TokenKind::DoubleColon, 2),
            (Some(b'-'), Some(b'>')) => (TokenKind::Arrow, 2),
            (Some(b'|'), Some(b'|')) => (TokenKind::Concat, 2),
            (Some(b'<'), Some(b'>')) => (TokenKind::Neq, 2),
            (Some(b'!'), Some(b'=')) => (TokenKind::Neq, 2),
            (Some(b'<'), Some(b'=')) => (TokenKind::Lte, 2),
            (Some(b'>'), Some(b'=')) => (TokenKind::Gte, 2),
            (Some(b'='), Some(b'=')) => (TokenKind::Eq, 2),
            (Some(b','), _) => (TokenKind::Comma, 1),
            (Some(b'.'), _) => (TokenKind::Dot, 1),
            (Some(b';'), _) => (TokenKind::Semicolon, 1),
            (Some(b'('), _) => (TokenKind::LParen, 1),
            (Some(b')'), _) => (TokenKind::RParen, 1),
            (Some(b'['), _) => (TokenKind::LBracket, 1),
            (Some(b']'), _) => (TokenKind::RBracket, 1),
            (Some(b'{'), _) => (TokenKind::LBrace, 1),
            (Some(b'}'), _) => (TokenKind::RBrace, 1),
            (Some(b':'), _) => (TokenKind::Colon, 1),
            (Some(b'+'), _) => (TokenKind::Plus, 1),
            (Some(b'-'), _) => (TokenKind::Minus, 1),
            (Some(b'*'), _) => (TokenKind::Star, 1),
            (Some(b'/'), _) => (TokenKind::Slash, 1),
            (Some(b'%'), _) => (TokenKind::Percent, 1),
            (Some(b'='), _) => (TokenKind::Eq, 1),
            (Some(b'<'), _) => (TokenKind::Lt, 1),
            (Some(b'>'), _) => (TokenKind::Gt, 1),
            _ => (TokenKind::Illegal, self.char_len()),
        };

        for _ in 0..len {
            self.advance();
        }
        Token::new(kind, &self.src[start.offset..self.pos], start)
    }

    /// Byte length of the UTF-8 character at the cursor
    fn char_len(&self) -> usize {
        self.src[self.pos..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.done = true;
        }
        Some(token)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}
