//! SQL token types
//!
//! Tokens carry their literal text and the position where they start.
//! Keywords are their own variants so the parser can match them directly.

use std::fmt;

/// Position of a token in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, in bytes)
    pub column: usize,
    /// Byte offset from the start of the input
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A single token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text; unescaped for strings and quoted identifiers
    pub literal: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            pos,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    /// Describe the token for error messages
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::String => format!("string '{}'", self.literal),
            TokenKind::Illegal => format!("illegal token '{}'", self.literal),
            TokenKind::Keyword(kw) => kw.as_str().to_string(),
            _ => format!("'{}'", self.literal),
        }
    }
}

/// Token discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Illegal,

    // Literals and names
    Ident,
    QuotedIdent,
    Number,
    String,

    // Punctuation
    Comma,
    Dot,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    DoubleColon,
    Arrow,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,

    Keyword(Keyword),
}

impl TokenKind {
    /// Symbol text for punctuation and operators
    pub fn symbol(&self) -> Option<&'static str> {
        let s = match self {
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Semicolon => ";",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Colon => ":",
            Self::DoubleColon => "::",
            Self::Arrow => "->",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Concat => "||",
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            _ => return None,
        };
        Some(s)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "end of input"),
            Self::Illegal => write!(f, "illegal token"),
            Self::Ident | Self::QuotedIdent => write!(f, "identifier"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Keyword(kw) => write!(f, "{}", kw.as_str()),
            other => write!(f, "'{}'", other.symbol().unwrap_or("?")),
        }
    }
}

macro_rules! keywords {
    ($($variant:ident => $text:literal,)*) => {
        /// SQL keywords recognized by the lexer
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Case-insensitive keyword lookup
            pub fn lookup(word: &str) -> Option<Keyword> {
                if word.len() > 12 {
                    return None;
                }
                let upper = word.to_ascii_uppercase();
                match upper.as_str() {
                    $($text => Some(Keyword::$variant),)*
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }
        }
    };
}

keywords! {
    All => "ALL",
    And => "AND",
    As => "AS",
    Asc => "ASC",
    Between => "BETWEEN",
    By => "BY",
    Case => "CASE",
    Cast => "CAST",
    Cross => "CROSS",
    Current => "CURRENT",
    Desc => "DESC",
    Distinct => "DISTINCT",
    Else => "ELSE",
    End => "END",
    Escape => "ESCAPE",
    Except => "EXCEPT",
    Exists => "EXISTS",
    False => "FALSE",
    Filter => "FILTER",
    First => "FIRST",
    Following => "FOLLOWING",
    From => "FROM",
    Full => "FULL",
    Group => "GROUP",
    Groups => "GROUPS",
    Having => "HAVING",
    ILike => "ILIKE",
    In => "IN",
    Inner => "INNER",
    Intersect => "INTERSECT",
    Interval => "INTERVAL",
    Is => "IS",
    Join => "JOIN",
    Last => "LAST",
    Lateral => "LATERAL",
    Left => "LEFT",
    Like => "LIKE",
    Limit => "LIMIT",
    Materialized => "MATERIALIZED",
    Natural => "NATURAL",
    Not => "NOT",
    Null => "NULL",
    Nulls => "NULLS",
    Offset => "OFFSET",
    On => "ON",
    Or => "OR",
    Order => "ORDER",
    Outer => "OUTER",
    Over => "OVER",
    Partition => "PARTITION",
    Preceding => "PRECEDING",
    Qualify => "QUALIFY",
    Range => "RANGE",
    Recursive => "RECURSIVE",
    Right => "RIGHT",
    Row => "ROW",
    Rows => "ROWS",
    Select => "SELECT",
    Then => "THEN",
    True => "TRUE",
    TryCast => "TRY_CAST",
    Unbounded => "UNBOUNDED",
    Union => "UNION",
    Using => "USING",
    When => "WHEN",
    Where => "WHERE",
    Window => "WINDOW",
    With => "WITH",
}

impl Keyword {
    /// Non-reserved keywords may also be used as plain identifiers
    pub fn is_reserved(&self) -> bool {
        !matches!(
            self,
            Keyword::Current
                | Keyword::Escape
                | Keyword::Filter
                | Keyword::First
                | Keyword::Following
                | Keyword::Groups
                | Keyword::Last
                | Keyword::Materialized
                | Keyword::Nulls
                | Keyword::Preceding
                | Keyword::Range
                | Keyword::Row
                | Keyword::Rows
                | Keyword::Unbounded
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
