use std::fmt::{self, Display};

/// Represents the different kinds of tokens that the lexer can produce.
/// Each token is a meaningful unit of the entity map syntax.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Special Tokens ==
    /// Represents the end of the input.
    Eof,
    /// A run of whitespace characters (spaces, tabs, newlines).
    Whitespace,
    /// A `// line` or `/* block */` comment. Holds the trimmed comment text.
    Comment(String),
    /// A `/*` comment with no closing `*/`.
    UnclosedComment,
    /// Represents a token that could not be recognized by the lexer.
    Unknown,

    // == Literals ==
    /// Class names, field names, aliases. Dots and dashes are allowed after
    /// the first character, so `com.example.Member` is one identifier.
    Identifier(String),
    /// A single- or double-quoted string. Holds the text between the quotes.
    StringLiteral(String),
    /// Digits only. Kept as text so the parser can report out-of-range values.
    IntegerLiteral(String),
    /// `[digits] "." digits`.
    DecimalLiteral(String),

    // == Keywords ==
    // Keywords are only recognised when followed by whitespace, so a field
    // may still be called `final` or `join` when followed by punctuation.
    Alias,
    As,
    ReadOnly,
    Final,
    CreateOnly,
    WriteOnly,
    Sensitive,
    Exclusive,
    Lazy,
    Eager,
    Merge,
    Join,
    Indexed,
    By,
    Optional,
    Using,
    Subclass,
    Flattened,
    With,
    Unlocalised,
    /// `cascade-update`, also recognised directly before `]`.
    CascadeUpdate,
    CascadeDelete,
    CascadeAll,
    /// `true`, also recognised directly before `,` or `}`.
    True,
    False,

    // == Punctuation & Operators ==
    /// Left Brace: `{`
    LBrace,
    /// Right Brace: `}`
    RBrace,
    /// Left Bracket: `[`
    LBracket,
    /// Right Bracket: `]`
    RBracket,
    /// Reflection: `<>` (map every persistent field of the enclosing class)
    Reflection,
    /// Reference: `->` (separates the foreign key from the parent key in a join)
    Reference,
    /// Left Angle Bracket: `<`
    LAngle,
    /// Right Angle Bracket: `>`
    RAngle,
    /// Left Parenthesis: `(`
    LParen,
    /// Right Parenthesis: `)`
    RParen,
    /// Comma: `,`
    Comma,
    /// Colon: `:`
    Colon,
    /// Equals: `=` (introduces a default value)
    Equals,
    /// Semicolon: `;` (terminates an alias declaration)
    Semicolon,
    /// Or Bar: `|` (separates variant classes)
    OrBar,
    /// At: `@` (introduces a plugin attribute field)
    At,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            TokenType::Eof => "end of input",
            TokenType::Whitespace => "whitespace",
            TokenType::Comment(_) | TokenType::UnclosedComment => "comment",
            TokenType::Unknown => "unknown",
            TokenType::Identifier(_) => "identifier",
            TokenType::StringLiteral(_) => "string-literal",
            TokenType::IntegerLiteral(_) => "integer-literal",
            TokenType::DecimalLiteral(_) => "decimal-literal",
            TokenType::Alias => "alias",
            TokenType::As => "as",
            TokenType::ReadOnly => "readonly",
            TokenType::Final => "final",
            TokenType::CreateOnly => "createonly",
            TokenType::WriteOnly => "writeonly",
            TokenType::Sensitive => "sensitive",
            TokenType::Exclusive => "exclusive",
            TokenType::Lazy => "lazy",
            TokenType::Eager => "eager",
            TokenType::Merge => "merge",
            TokenType::Join => "join",
            TokenType::Indexed => "indexed",
            TokenType::By => "by",
            TokenType::Optional => "optional",
            TokenType::Using => "using",
            TokenType::Subclass => "subclass",
            TokenType::Flattened => "flattened",
            TokenType::With => "with",
            TokenType::Unlocalised => "unlocalised",
            TokenType::CascadeUpdate => "cascade-update",
            TokenType::CascadeDelete => "cascade-delete",
            TokenType::CascadeAll => "cascade-all",
            TokenType::True => "true",
            TokenType::False => "false",
            TokenType::LBrace => "open-brace",
            TokenType::RBrace => "close-brace",
            TokenType::LBracket => "open-square-bracket",
            TokenType::RBracket => "close-square-bracket",
            TokenType::Reflection => "reflection-operator",
            TokenType::Reference => "reference-operator",
            TokenType::LAngle => "open-angle-bracket",
            TokenType::RAngle => "close-angle-bracket",
            TokenType::LParen => "open-parenthesis",
            TokenType::RParen => "close-parenthesis",
            TokenType::Comma => "comma",
            TokenType::Colon => "colon",
            TokenType::Equals => "equals",
            TokenType::Semicolon => "semicolon",
            TokenType::OrBar => "or-bar",
            TokenType::At => "attribute-indicator",
        };
        write!(f, "{}", description)
    }
}

/// A token with its type and position
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        let start_pos = self.position;

        let ttype = if let Some(char) = self.advance() {
            match char {
                '{' => TokenType::LBrace,
                '}' => TokenType::RBrace,
                '[' => TokenType::LBracket,
                ']' => TokenType::RBracket,
                '(' => TokenType::LParen,
                ')' => TokenType::RParen,
                ',' => TokenType::Comma,
                ':' => TokenType::Colon,
                '=' => TokenType::Equals,
                ';' => TokenType::Semicolon,
                '|' => TokenType::OrBar,
                '@' => TokenType::At,
                '>' => TokenType::RAngle,

                '<' => {
                    if self.peek() == Some(&'>') {
                        self.advance();
                        TokenType::Reflection
                    } else {
                        TokenType::LAngle
                    }
                }
                '-' => {
                    if self.peek() == Some(&'>') {
                        self.advance();
                        TokenType::Reference
                    } else {
                        TokenType::Unknown
                    }
                }
                '/' => match self.peek() {
                    Some('/') => self.read_line_comment(),
                    Some('*') => self.read_block_comment(),
                    _ => TokenType::Unknown,
                },
                '"' | '\'' => self.read_string(char),
                c if c.is_whitespace() => self.read_whitespace(),
                c if c.is_ascii_alphabetic() || c == '_' => self.read_word(c),
                c if c.is_ascii_digit() || (c == '.' && self.peek().is_some_and(|n| n.is_ascii_digit())) => {
                    self.read_number(c)
                }

                _ => TokenType::Unknown,
            }
        } else {
            TokenType::Eof
        };

        Token::new(ttype, start_pos, self.position)
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            self.position += c.len_utf8();
        }
        char
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn read_whitespace(&mut self) -> TokenType {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        TokenType::Whitespace
    }

    fn read_line_comment(&mut self) -> TokenType {
        self.advance(); // Consume the second '/'
        let start = self.position;
        while let Some(c) = self.peek() {
            if *c == '\n' {
                break;
            }
            self.advance();
        }
        TokenType::Comment(self.input[start..self.position].trim().to_string())
    }

    fn read_block_comment(&mut self) -> TokenType {
        self.advance(); // Consume the '*'
        let start = self.position;
        match self.rest().find("*/") {
            Some(len) => {
                while self.position < start + len + 2 {
                    self.advance();
                }
                TokenType::Comment(self.input[start..start + len].trim().to_string())
            }
            None => {
                while self.advance().is_some() {}
                TokenType::UnclosedComment
            }
        }
    }

    /// No escapes: a string ends at the next matching quote.
    fn read_string(&mut self, quote: char) -> TokenType {
        let start = self.position;
        while let Some(c) = self.advance() {
            if c == quote {
                return TokenType::StringLiteral(self.input[start..self.position - 1].to_string());
            }
        }
        TokenType::Unknown // Unclosed string
    }

    fn read_word(&mut self, first_char: char) -> TokenType {
        let mut word = String::new();
        word.push(first_char);

        while let Some(&c) = self.peek() {
            let continues = c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$') || (c == '-' && !self.rest().starts_with("->"));
            if !continues {
                break;
            }
            word.push(c);
            self.advance();
        }

        let next = self.peek().copied();
        let spaced = next.is_some_and(char::is_whitespace);
        let before_bracket = spaced || next == Some(']');
        let before_separator = spaced || matches!(next, Some(',') | Some('}'));

        match word.as_str() {
            "alias" if spaced => TokenType::Alias,
            "as" if spaced => TokenType::As,
            "readonly" if spaced => TokenType::ReadOnly,
            "final" if spaced => TokenType::Final,
            "createonly" if spaced => TokenType::CreateOnly,
            "writeonly" if spaced => TokenType::WriteOnly,
            "sensitive" if spaced => TokenType::Sensitive,
            "exclusive" if spaced => TokenType::Exclusive,
            "lazy" if spaced => TokenType::Lazy,
            "eager" if spaced => TokenType::Eager,
            "merge" if spaced => TokenType::Merge,
            "join" if spaced => TokenType::Join,
            "indexed" if spaced => TokenType::Indexed,
            "by" if spaced => TokenType::By,
            "optional" if spaced => TokenType::Optional,
            "using" if spaced => TokenType::Using,
            "subclass" if spaced => TokenType::Subclass,
            "flattened" if spaced => TokenType::Flattened,
            "with" if spaced => TokenType::With,
            "unlocalised" if spaced => TokenType::Unlocalised,
            "cascade-update" if before_bracket => TokenType::CascadeUpdate,
            "cascade-delete" if before_bracket => TokenType::CascadeDelete,
            "cascade-all" if before_bracket => TokenType::CascadeAll,
            "true" if before_separator => TokenType::True,
            "false" if before_separator => TokenType::False,
            _ => TokenType::Identifier(word),
        }
    }

    fn read_number(&mut self, first_char: char) -> TokenType {
        let mut number_str = String::new();
        number_str.push(first_char);
        let mut has_dot = first_char == '.';

        while let Some(&c) = self.peek() {
            if c.is_ascii_digit() {
                number_str.push(c);
                self.advance();
            } else if c == '.' && !has_dot && self.rest()[1..].starts_with(|n: char| n.is_ascii_digit()) {
                has_dot = true;
                number_str.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if has_dot {
            TokenType::DecimalLiteral(number_str)
        } else {
            TokenType::IntegerLiteral(number_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tokens(input: &str, expected: Vec<TokenType>) {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.lex();
        let token_types: Vec<TokenType> = tokens.into_iter().map(|t| t.ttype).collect();

        // Filter out whitespace and comments for most tests
        let filtered_tokens: Vec<TokenType> = token_types
            .into_iter()
            .filter(|t| !matches!(t, TokenType::Whitespace | TokenType::Comment(_)))
            .collect();

        assert_eq!(filtered_tokens, expected);
    }

    fn ident(s: &str) -> TokenType {
        TokenType::Identifier(s.to_string())
    }

    #[test]
    fn test_eof() {
        assert_tokens("", vec![TokenType::Eof]);
    }

    #[test]
    fn test_punctuation() {
        let input = "{}[]<>-><>(),:=;|@";
        let expected = vec![
            TokenType::LBrace,
            TokenType::RBrace,
            TokenType::LBracket,
            TokenType::RBracket,
            TokenType::Reflection,
            TokenType::Reference,
            TokenType::Reflection,
            TokenType::LParen,
            TokenType::RParen,
            TokenType::Comma,
            TokenType::Colon,
            TokenType::Equals,
            TokenType::Semicolon,
            TokenType::OrBar,
            TokenType::At,
            TokenType::Eof,
        ];
        assert_tokens(input, expected);
    }

    #[test]
    fn test_angle_brackets_around_class() {
        assert_tokens(
            "<test.Member>",
            vec![TokenType::LAngle, ident("test.Member"), TokenType::RAngle, TokenType::Eof],
        );
    }

    #[test]
    fn test_keywords_need_trailing_whitespace() {
        let input = "readonly name, final: x, join ";
        let expected = vec![
            TokenType::ReadOnly,
            ident("name"),
            TokenType::Comma,
            ident("final"),
            TokenType::Colon,
            ident("x"),
            TokenType::Comma,
            TokenType::Join,
            TokenType::Eof,
        ];
        assert_tokens(input, expected);
    }

    #[test]
    fn test_cascade_and_booleans() {
        let input = "with cascade-update] true, false} true;";
        let expected = vec![
            TokenType::With,
            TokenType::CascadeUpdate,
            TokenType::RBracket,
            TokenType::True,
            TokenType::Comma,
            TokenType::False,
            TokenType::RBrace,
            ident("true"),
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_tokens(input, expected);
    }

    #[test]
    fn test_identifier_stops_before_reference() {
        let input = "member-id->id";
        let expected = vec![ident("member-id"), TokenType::Reference, ident("id"), TokenType::Eof];
        assert_tokens(input, expected);
    }

    #[test]
    fn test_numbers() {
        let input = "123 45.67 .5 7";
        let expected = vec![
            TokenType::IntegerLiteral("123".to_string()),
            TokenType::DecimalLiteral("45.67".to_string()),
            TokenType::DecimalLiteral(".5".to_string()),
            TokenType::IntegerLiteral("7".to_string()),
            TokenType::Eof,
        ];
        assert_tokens(input, expected);
    }

    #[test]
    fn test_strings() {
        let input = r#""hello world" '' 'it"s'"#;
        let expected = vec![
            TokenType::StringLiteral("hello world".to_string()),
            TokenType::StringLiteral("".to_string()),
            TokenType::StringLiteral("it\"s".to_string()),
            TokenType::Eof,
        ];
        assert_tokens(input, expected);
    }

    #[test]
    fn test_unclosed_string_is_unknown() {
        assert_tokens("\"open", vec![TokenType::Unknown, TokenType::Eof]);
    }

    #[test]
    fn test_comments_and_whitespace() {
        let input = "/* header */ name // trailing";
        let mut lexer = Lexer::new(input);
        let tokens = lexer.lex();
        let token_types: Vec<TokenType> = tokens.into_iter().map(|t| t.ttype).collect();

        let expected = vec![
            TokenType::Comment("header".to_string()),
            TokenType::Whitespace,
            ident("name"),
            TokenType::Whitespace,
            TokenType::Comment("trailing".to_string()),
            TokenType::Eof,
        ];

        assert_eq!(token_types, expected);
    }

    #[test]
    fn test_unclosed_block_comment() {
        assert_tokens("name /* open", vec![ident("name"), TokenType::UnclosedComment, TokenType::Eof]);
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("  (id)");
        let tokens = lexer.lex();
        let id = &tokens[2];
        assert_eq!(id.ttype, ident("id"));
        assert_eq!((id.pos_start, id.pos_end), (3, 5));
    }

    #[test]
    fn test_complex_mapping() {
        let input = r#"
alias test.Member as Member;
Member (Admin|Guest as kind) {
    (id),
    sensitive password = '******',
    phones: [eager test.Phone join memberId -> id with cascade-all] { number }
}
"#;
        let expected = vec![
            TokenType::Alias,
            ident("test.Member"),
            TokenType::As,
            ident("Member"),
            TokenType::Semicolon,
            ident("Member"),
            TokenType::LParen,
            ident("Admin"),
            TokenType::OrBar,
            ident("Guest"),
            TokenType::As,
            ident("kind"),
            TokenType::RParen,
            TokenType::LBrace,
            TokenType::LParen,
            ident("id"),
            TokenType::RParen,
            TokenType::Comma,
            TokenType::Sensitive,
            ident("password"),
            TokenType::Equals,
            TokenType::StringLiteral("******".to_string()),
            TokenType::Comma,
            ident("phones"),
            TokenType::Colon,
            TokenType::LBracket,
            TokenType::Eager,
            ident("test.Phone"),
            TokenType::Join,
            ident("memberId"),
            TokenType::Reference,
            ident("id"),
            TokenType::With,
            TokenType::CascadeAll,
            TokenType::RBracket,
            TokenType::LBrace,
            ident("number"),
            TokenType::RBrace,
            TokenType::Eof,
        ];
        assert_tokens(input, expected);
    }
}
