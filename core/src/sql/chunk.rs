use std::borrow::Cow;

use compact_str::CompactString;

use crate::command::ParamSlot;
use crate::sql::tokens::Token;

/// A SQL chunk represents a part of an SQL statement.
///
/// - `Token` - SQL keywords and operators (SELECT, FROM, =, etc.)
/// - `Ident` - Quoted identifiers ("table_name", "column_name")
/// - `Raw` - Unquoted raw SQL text
/// - `Func` - Function name, rendered flush against its argument list
/// - `Number` - Structural integer literal (never user data)
/// - `Param` - Parameter placeholder carrying its value slot
#[derive(Debug, Clone, PartialEq)]
pub enum SqlChunk {
    /// SQL keywords and operators: SELECT, FROM, WHERE, =, AND, etc.
    Token(Token),

    /// Quoted identifier for table, column and alias names
    Ident(CompactString),

    /// Raw SQL text (unquoted)
    Raw(Cow<'static, str>),

    /// Function name: `COUNT`, `instr`, ...
    Func(&'static str),

    /// Integer literal emitted by the generator itself (`1 = 0`, `LIMIT -1`)
    Number(i64),

    /// Placeholder; `?` or `$n` depending on dialect
    Param(ParamSlot),
}

impl SqlChunk {
    // ==================== const constructors ====================

    /// Creates a token chunk - const
    #[inline]
    pub const fn token(t: Token) -> Self {
        Self::Token(t)
    }

    /// Creates raw SQL text from a static string - const
    #[inline]
    pub const fn raw_static(text: &'static str) -> Self {
        Self::Raw(Cow::Borrowed(text))
    }

    // ==================== non-const constructors ====================

    /// Creates a quoted identifier from a runtime string
    #[inline]
    pub fn ident(name: impl Into<CompactString>) -> Self {
        Self::Ident(name.into())
    }

    // ==================== write implementation ====================

    /// Write chunk content to buffer. Parameters are written by the caller,
    /// which owns the placeholder counter.
    pub(crate) fn write(&self, buf: &mut impl core::fmt::Write) {
        match self {
            SqlChunk::Token(token) => {
                let _ = buf.write_str(token.as_str());
            }
            SqlChunk::Ident(name) => {
                let _ = buf.write_char('"');
                for c in name.chars() {
                    if c == '"' {
                        let _ = buf.write_char('"');
                    }
                    let _ = buf.write_char(c);
                }
                let _ = buf.write_char('"');
            }
            SqlChunk::Raw(text) => {
                let _ = buf.write_str(text);
            }
            SqlChunk::Func(name) => {
                let _ = buf.write_str(name);
            }
            SqlChunk::Number(n) => {
                let _ = write!(buf, "{n}");
            }
            SqlChunk::Param(_) => {
                let _ = buf.write_char('?');
            }
        }
    }

    /// Check if this chunk is "word-like" (needs space separation from other word-like chunks)
    #[inline]
    pub(crate) const fn is_word_like(&self) -> bool {
        match self {
            SqlChunk::Token(t) => !matches!(
                t,
                Token::LPAREN
                    | Token::RPAREN
                    | Token::COMMA
                    | Token::DOT
                    | Token::EQ
                    | Token::NE
                    | Token::LT
                    | Token::GT
                    | Token::LE
                    | Token::GE
            ),
            SqlChunk::Ident(_)
            | SqlChunk::Raw(_)
            | SqlChunk::Func(_)
            | SqlChunk::Number(_)
            | SqlChunk::Param(_) => true,
        }
    }
}

// ==================== From implementations ====================

impl From<Token> for SqlChunk {
    #[inline]
    fn from(value: Token) -> Self {
        Self::Token(value)
    }
}

impl From<ParamSlot> for SqlChunk {
    #[inline]
    fn from(value: ParamSlot) -> Self {
        Self::Param(value)
    }
}
