//! Lexer for DC source text
//!
//! Turns a character buffer into a flat, random-access token sequence.
//! Tokens keep their original spelling (string and char literals include
//! their quotes) plus the 1-based source line they started on. The prelude
//! is prepended to user input, so the starting line may be negative; user
//! source then still begins at line 1.

/// Statement keywords of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Extern,
    Context,
    Declare,
    Assign,
    Deref,
    If,
    Fi,
    Else,
    Elif,
    Array,
    Return,
}

impl Keyword {
    fn from_text(text: &str) -> Option<Keyword> {
        match text {
            "extern" => Some(Keyword::Extern),
            "context" => Some(Keyword::Context),
            "declare" => Some(Keyword::Declare),
            "assign" => Some(Keyword::Assign),
            "deref" => Some(Keyword::Deref),
            "if" => Some(Keyword::If),
            "fi" => Some(Keyword::Fi),
            "else" => Some(Keyword::Else),
            "elif" => Some(Keyword::Elif),
            "array" => Some(Keyword::Array),
            "return" => Some(Keyword::Return),
            _ => None,
        }
    }
}

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    /// A type name, possibly with trailing `*`s (`i8`, `i32**`, `str`).
    Type,
    Identifier,
    /// Numeric or char literal.
    Literal,
    StringLiteral,
    Operator,
    Semicolon,
    Arrow,
    LParen,
    RParen,
    Comma,
    Unknown,
    End,
}

/// One token of DC source.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Original spelling. Char and string literals include their quotes.
    pub text: String,
    /// Number of `*`s in a type name; 0 for everything else.
    pub pointer_count: usize,
    /// 1-based source line (non-positive inside the prelude).
    pub line: i32,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, pointer_count: usize, line: i32) -> Token {
        Token {
            kind,
            text: text.into(),
            pointer_count,
            line,
        }
    }

    fn end(line: i32) -> Token {
        Token::new(TokenKind::End, "", 0, line)
    }

    pub fn is_end(&self) -> bool {
        self.kind == TokenKind::End
    }
}

/// Random-access token sequence with a mutable cursor.
///
/// Reads past the end yield the trailing end-of-stream token, so callers
/// never observe an out-of-range position.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> TokenStream {
        debug_assert!(matches!(tokens.last(), Some(t) if t.is_end()));
        TokenStream { tokens, pos: 0 }
    }

    /// Read the next token and advance the cursor.
    pub fn next(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        self.pos += 1;
        token
    }

    /// Read the next token without advancing.
    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Current cursor index, usable with [`TokenStream::rewind`].
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reset the cursor to a previously saved index.
    pub fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// All tokens, in scan order (the trailing end token included).
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// Tokenize a source buffer.
///
/// `start_line` is the line number of the first line of `source`; the
/// driver passes a non-positive value when the prelude is prepended so that
/// user source keeps 1-based lines.
pub fn tokenize(source: &str, start_line: i32) -> TokenStream {
    let mut scanner = Scanner {
        src: source.as_bytes(),
        pos: 0,
        line: start_line,
        tokens: Vec::new(),
    };
    scanner.run();
    TokenStream::new(scanner.tokens)
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    line: i32,
    tokens: Vec<Token>,
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'#'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'*' || c == b'#'
}

/// Base type names; stars are stripped before the lookup.
fn is_type_name(text: &str) -> bool {
    let base: String = text.chars().filter(|&c| c != '*').collect();
    matches!(base.as_str(), "i64" | "i32" | "i16" | "i8" | "str" | "ptr")
}

impl Scanner<'_> {
    fn run(&mut self) {
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            match c {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                _ if c.is_ascii_whitespace() => self.pos += 1,
                // A lone star is the multiplication operator; stars bind to
                // type names only as part of an identifier already underway.
                b'*' => self.single(TokenKind::Operator, "*"),
                _ if is_ident_start(c) => self.identifier(),
                _ if c.is_ascii_digit() => self.number(),
                b'\'' => self.quoted(b'\''),
                b'"' => self.quoted(b'"'),
                b';' => self.single(TokenKind::Semicolon, ";"),
                b'-' => {
                    if self.src.get(self.pos + 1) == Some(&b'>') {
                        self.double(TokenKind::Arrow, "->");
                    } else {
                        self.single(TokenKind::Operator, "-");
                    }
                }
                b'+' => self.single(TokenKind::Operator, "+"),
                b'/' => self.single(TokenKind::Operator, "/"),
                b'%' => self.single(TokenKind::Operator, "%"),
                b'=' | b'<' | b'>' => {
                    if self.src.get(self.pos + 1) == Some(&b'=') {
                        let text = format!("{}=", c as char);
                        self.double(TokenKind::Operator, &text);
                    } else {
                        let text = (c as char).to_string();
                        self.single(TokenKind::Operator, &text);
                    }
                }
                b'!' => {
                    if self.src.get(self.pos + 1) == Some(&b'=') {
                        self.double(TokenKind::Operator, "!=");
                    } else {
                        self.single(TokenKind::Unknown, "!");
                    }
                }
                b'(' => self.single(TokenKind::LParen, "("),
                b')' => self.single(TokenKind::RParen, ")"),
                b',' => self.single(TokenKind::Comma, ","),
                _ => {
                    let text = (c as char).to_string();
                    self.single(TokenKind::Unknown, &text);
                }
            }
        }
        self.tokens.push(Token::end(self.line));
    }

    fn single(&mut self, kind: TokenKind, text: &str) {
        self.tokens.push(Token::new(kind, text, 0, self.line));
        self.pos += 1;
    }

    fn double(&mut self, kind: TokenKind, text: &str) {
        self.tokens.push(Token::new(kind, text, 0, self.line));
        self.pos += 2;
    }

    fn identifier(&mut self) {
        let start = self.pos;
        while self.pos < self.src.len() && is_ident_continue(self.src[self.pos]) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        let token = if let Some(kw) = Keyword::from_text(&text) {
            Token::new(TokenKind::Keyword(kw), text, 0, self.line)
        } else if is_type_name(&text) {
            let stars = text.chars().filter(|&c| c == '*').count();
            Token::new(TokenKind::Type, text, stars, self.line)
        } else {
            Token::new(TokenKind::Identifier, text, 0, self.line)
        };
        self.tokens.push(token);
    }

    fn number(&mut self) {
        let start = self.pos;
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.tokens
            .push(Token::new(TokenKind::Literal, text, 0, self.line));
    }

    /// Char and string literals: scan to the closing quote, keeping the
    /// quotes in the token text. An unterminated literal runs to the end of
    /// the buffer.
    fn quoted(&mut self, quote: u8) {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.src.len() && self.src[self.pos] != quote {
            if self.src[self.pos] == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        self.pos = (self.pos + 1).min(self.src.len());
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        let kind = if quote == b'"' {
            TokenKind::StringLiteral
        } else {
            TokenKind::Literal
        };
        self.tokens.push(Token::new(kind, text, 0, self.line));
    }
}
