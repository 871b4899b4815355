/// SQL keywords, operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Token {
    // keywords
    SELECT,
    DISTINCT,
    FROM,
    WHERE,
    ORDER,
    BY,
    ASC,
    DESC,
    LIMIT,
    OFFSET,
    AS,
    AND,
    OR,
    NOT,
    IS,
    NULL,
    IN,
    EXISTS,
    CASE,
    WHEN,
    THEN,
    ELSE,
    END,
    INNER,
    CROSS,
    JOIN,
    ON,
    // punctuation
    LPAREN,
    RPAREN,
    COMMA,
    DOT,
    STAR,
    // operators
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
    PLUS,
    MINUS,
    SLASH,
}

impl Token {
    pub const fn as_str(self) -> &'static str {
        match self {
            Token::SELECT => "SELECT",
            Token::DISTINCT => "DISTINCT",
            Token::FROM => "FROM",
            Token::WHERE => "WHERE",
            Token::ORDER => "ORDER",
            Token::BY => "BY",
            Token::ASC => "ASC",
            Token::DESC => "DESC",
            Token::LIMIT => "LIMIT",
            Token::OFFSET => "OFFSET",
            Token::AS => "AS",
            Token::AND => "AND",
            Token::OR => "OR",
            Token::NOT => "NOT",
            Token::IS => "IS",
            Token::NULL => "NULL",
            Token::IN => "IN",
            Token::EXISTS => "EXISTS",
            Token::CASE => "CASE",
            Token::WHEN => "WHEN",
            Token::THEN => "THEN",
            Token::ELSE => "ELSE",
            Token::END => "END",
            Token::INNER => "INNER",
            Token::CROSS => "CROSS",
            Token::JOIN => "JOIN",
            Token::ON => "ON",
            Token::LPAREN => "(",
            Token::RPAREN => ")",
            Token::COMMA => ",",
            Token::DOT => ".",
            Token::STAR => "*",
            Token::EQ => "=",
            Token::NE => "<>",
            Token::LT => "<",
            Token::LE => "<=",
            Token::GT => ">",
            Token::GE => ">=",
            Token::PLUS => "+",
            Token::MINUS => "-",
            Token::SLASH => "/",
        }
    }

    /// Binary operators rendered with surrounding spaces.
    pub const fn is_operator(self) -> bool {
        matches!(
            self,
            Token::EQ
                | Token::NE
                | Token::LT
                | Token::LE
                | Token::GT
                | Token::GE
                | Token::PLUS
                | Token::MINUS
                | Token::SLASH
                | Token::STAR
        )
    }
}
