use crate::diagnostic::{DiagnosticEngine, ParseError};
use crate::intern::{StringId, intern};
use crate::source_manager::{SourceId, SourceSpan};

/// Resolved type of an integer constant, determined by suffix and magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLitKind {
    Int,
    UInt,
    Long,
    ULong,
}

/// Token kinds for the lexical analyzer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    // === LITERALS ===
    IntegerConstant { value: u64, kind: IntLitKind },
    FloatConstant { value: f64, is_float: bool },
    CharacterConstant(u8), // Byte value of character constant
    /// String literal, interned with its source spelling (escapes kept).
    StringLiteral(StringId),

    // === IDENTIFIERS ===
    Identifier(StringId), // Interned identifier

    // === KEYWORDS ===
    // Storage class specifiers
    Auto,
    Extern,
    Register,
    Static,
    Typedef,

    // Type qualifiers
    Const,
    Restrict,
    Volatile,

    // Type specifiers
    Bool,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Signed,
    Unsigned,
    Void,

    // Tagged type specifiers
    Struct,
    Union,
    Enum,

    // Control flow
    Break,
    Case,
    Continue,
    Default,
    Do,
    Else,
    For,
    Goto,
    If,
    Return,
    Switch,
    While,

    // Other keywords
    Inline,
    Sizeof,

    // === OPERATORS ===
    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Increment,
    Decrement,

    // Bitwise operators
    And,
    Or,
    Xor,
    Tilde,
    LeftShift,
    RightShift,

    // Comparison operators
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,

    // Assignment operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    LeftShiftAssign,
    RightShiftAssign,

    // Logical operators
    Not,
    LogicAnd,
    LogicOr,

    // Member access
    Arrow,
    Dot,

    // Ternary operator
    Question,
    Colon,

    // === PUNCTUATION ===
    Comma,
    Semicolon,
    Ellipsis,

    // Brackets and parentheses
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    // === SPECIAL TOKENS ===
    EndOfFile,
    Unknown,
}

impl TokenKind {
    /// Check if the token is a storage class specifier
    pub fn is_storage_class_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Typedef | TokenKind::Extern | TokenKind::Static | TokenKind::Auto | TokenKind::Register
        )
    }

    /// Check if the token is a type specifier
    pub fn is_type_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Bool
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
        )
    }

    /// Check if the token is a type qualifier
    pub fn is_type_qualifier(&self) -> bool {
        matches!(self, TokenKind::Const | TokenKind::Restrict | TokenKind::Volatile)
    }

    /// Check if the token is a function specifier
    pub fn is_function_specifier(&self) -> bool {
        matches!(self, TokenKind::Inline)
    }

    /// Check if the token can start a declaration specifier
    pub fn is_declaration_specifier_start(&self) -> bool {
        self.is_storage_class_specifier()
            || self.is_type_specifier()
            || self.is_type_qualifier()
            || self.is_function_specifier()
    }

    /// Check if the token can start a declaration (including typedef names)
    pub fn is_declaration_start(&self, is_typedef: bool) -> bool {
        if self.is_declaration_specifier_start() {
            return true;
        }

        if let TokenKind::Identifier(_) = self {
            return is_typedef;
        }

        false
    }

    /// Check if the token is an assignment operator
    pub fn is_assignment_op(&self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::DivAssign
                | TokenKind::ModAssign
                | TokenKind::AndAssign
                | TokenKind::OrAssign
                | TokenKind::XorAssign
                | TokenKind::LeftShiftAssign
                | TokenKind::RightShiftAssign
        )
    }
}

/// Token with source span for the parser
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

/// Check if a symbol is a keyword.
///
/// Keywords are pre-interned into a lazily-initialized map, so the lookup
/// is an integer comparison rather than a string comparison.
pub fn is_keyword(symbol: StringId) -> Option<TokenKind> {
    keyword_map().get(&symbol).copied()
}

fn keyword_map() -> &'static hashbrown::HashMap<StringId, TokenKind> {
    static KEYWORDS: std::sync::OnceLock<hashbrown::HashMap<StringId, TokenKind>> = std::sync::OnceLock::new();
    KEYWORDS.get_or_init(|| {
        let mut m = hashbrown::HashMap::new();
        m.insert(StringId::new("auto"), TokenKind::Auto);
        m.insert(StringId::new("break"), TokenKind::Break);
        m.insert(StringId::new("case"), TokenKind::Case);
        m.insert(StringId::new("char"), TokenKind::Char);
        m.insert(StringId::new("const"), TokenKind::Const);
        m.insert(StringId::new("continue"), TokenKind::Continue);
        m.insert(StringId::new("default"), TokenKind::Default);
        m.insert(StringId::new("do"), TokenKind::Do);
        m.insert(StringId::new("double"), TokenKind::Double);
        m.insert(StringId::new("else"), TokenKind::Else);
        m.insert(StringId::new("enum"), TokenKind::Enum);
        m.insert(StringId::new("extern"), TokenKind::Extern);
        m.insert(StringId::new("float"), TokenKind::Float);
        m.insert(StringId::new("for"), TokenKind::For);
        m.insert(StringId::new("goto"), TokenKind::Goto);
        m.insert(StringId::new("if"), TokenKind::If);
        m.insert(StringId::new("inline"), TokenKind::Inline);
        m.insert(StringId::new("int"), TokenKind::Int);
        m.insert(StringId::new("long"), TokenKind::Long);
        m.insert(StringId::new("register"), TokenKind::Register);
        m.insert(StringId::new("restrict"), TokenKind::Restrict);
        m.insert(StringId::new("return"), TokenKind::Return);
        m.insert(StringId::new("short"), TokenKind::Short);
        m.insert(StringId::new("signed"), TokenKind::Signed);
        m.insert(StringId::new("sizeof"), TokenKind::Sizeof);
        m.insert(StringId::new("static"), TokenKind::Static);
        m.insert(StringId::new("struct"), TokenKind::Struct);
        m.insert(StringId::new("switch"), TokenKind::Switch);
        m.insert(StringId::new("typedef"), TokenKind::Typedef);
        m.insert(StringId::new("union"), TokenKind::Union);
        m.insert(StringId::new("unsigned"), TokenKind::Unsigned);
        m.insert(StringId::new("void"), TokenKind::Void);
        m.insert(StringId::new("volatile"), TokenKind::Volatile);
        m.insert(StringId::new("while"), TokenKind::While);
        m.insert(StringId::new("_Bool"), TokenKind::Bool);
        m
    })
}

/// Byte-level scanner producing the full token stream for one file.
///
/// The input is already preprocessed C; a `#` anywhere is reported with a
/// hint to run a preprocessor first.
pub struct Lexer<'src> {
    buffer: &'src [u8],
    pos: usize,
    source_id: SourceId,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    pub fn new(buffer: &'src [u8], source_id: SourceId) -> Self {
        Lexer {
            buffer,
            pos: 0,
            source_id,
            tokens: Vec::new(),
        }
    }

    /// Scan the whole buffer. Lexical errors go to `diag`; scanning
    /// continues past them so later phases see as much as possible.
    pub fn tokenize(mut self, diag: &mut DiagnosticEngine) -> Vec<Token> {
        loop {
            if diag.is_over_limit() {
                break;
            }
            self.skip_whitespace_and_comments(diag);
            let start = self.pos;
            let Some(byte) = self.peek() else {
                break;
            };
            match self.scan_token(byte, diag) {
                Some(kind) => {
                    let span = self.span_from(start);
                    self.tokens.push(Token { kind, span });
                }
                None => {
                    // Error already reported, make sure we advance.
                    if self.pos == start {
                        self.pos += 1;
                    }
                }
            }
        }
        let eof_span = self.span_from(self.buffer.len().min(self.pos));
        self.tokens.push(Token {
            kind: TokenKind::EndOfFile,
            span: eof_span,
        });
        self.tokens
    }

    fn peek(&self) -> Option<u8> {
        self.buffer.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.buffer.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Consume `byte` if it is next, returning whether it was.
    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn span_from(&self, start: usize) -> SourceSpan {
        SourceSpan::new_with_length(self.source_id, start as u32, (self.pos - start) as u32)
    }

    fn skip_whitespace_and_comments(&mut self, diag: &mut DiagnosticEngine) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(0x0b) | Some(0x0c) => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut closed = false;
                    while let Some(b) = self.bump() {
                        if b == b'*' && self.eat(b'/') {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        diag.report_parse_error(ParseError::UnterminatedComment {
                            location: self.span_from(start),
                        });
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_token(&mut self, byte: u8, diag: &mut DiagnosticEngine) -> Option<TokenKind> {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Some(self.scan_identifier()),
            b'0'..=b'9' => self.scan_number(diag),
            b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.scan_number(diag),
            b'\'' => self.scan_char_constant(diag),
            b'"' => self.scan_string_literal(diag),
            b'#' => {
                let start = self.pos;
                // Skip the rest of the line so one directive yields one error.
                while let Some(b) = self.peek() {
                    if b == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                diag.report_error_with_hint(
                    "preprocessor directives are not supported".to_string(),
                    self.span_from(start),
                    "run the source through a C preprocessor first".to_string(),
                );
                None
            }
            _ => self.scan_punctuation(diag),
        }
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = unsafe { std::str::from_utf8_unchecked(&self.buffer[start..self.pos]) };
        let symbol = intern(text);
        is_keyword(symbol).unwrap_or(TokenKind::Identifier(symbol))
    }

    /// Scan a pp-number: the maximal run of digits, letters, dots, and
    /// exponent signs. Classification into integer or float happens after.
    fn scan_number(&mut self, diag: &mut DiagnosticEngine) -> Option<TokenKind> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'.' => {
                    self.pos += 1;
                    // Exponent signs only count after e/E (or p/P in hex floats)
                    if matches!(b, b'e' | b'E' | b'p' | b'P') && matches!(self.peek(), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = unsafe { std::str::from_utf8_unchecked(&self.buffer[start..self.pos]) };
        let span = self.span_from(start);

        let is_hex = text.starts_with("0x") || text.starts_with("0X");
        let is_float = if is_hex {
            text.contains(['p', 'P'])
        } else {
            text.contains('.') || text.contains(['e', 'E'])
        };

        if is_float {
            match parse_float_literal(text) {
                Some((value, is_f32)) => Some(TokenKind::FloatConstant {
                    value,
                    is_float: is_f32,
                }),
                None => {
                    diag.report_parse_error(ParseError::InvalidFloatConstant {
                        text: text.to_string(),
                        location: span,
                    });
                    None
                }
            }
        } else {
            match parse_integer_literal(text) {
                Some((value, kind)) => Some(TokenKind::IntegerConstant { value, kind }),
                None => {
                    diag.report_parse_error(ParseError::InvalidIntegerConstant {
                        text: text.to_string(),
                        location: span,
                    });
                    None
                }
            }
        }
    }

    fn scan_char_constant(&mut self, diag: &mut DiagnosticEngine) -> Option<TokenKind> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut value: Option<u8> = None;
        let mut count = 0usize;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    diag.report_parse_error(ParseError::UnterminatedChar {
                        location: self.span_from(start),
                    });
                    return None;
                }
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let byte = self.scan_escape(diag)?;
                    if value.is_none() {
                        value = Some(byte);
                    }
                    count += 1;
                }
                Some(b) => {
                    self.pos += 1;
                    if value.is_none() {
                        value = Some(b);
                    }
                    count += 1;
                }
            }
        }
        match count {
            0 => {
                diag.report_parse_error(ParseError::SyntaxError {
                    message: "empty character constant".to_string(),
                    location: self.span_from(start),
                });
                None
            }
            1 => Some(TokenKind::CharacterConstant(value.unwrap())),
            _ => {
                diag.report_parse_error(ParseError::SyntaxError {
                    message: "multi-character character constant".to_string(),
                    location: self.span_from(start),
                });
                None
            }
        }
    }

    fn scan_string_literal(&mut self, diag: &mut DiagnosticEngine) -> Option<TokenKind> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let content_start = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    diag.report_parse_error(ParseError::UnterminatedString {
                        location: self.span_from(start),
                    });
                    return None;
                }
                Some(b'"') => {
                    let content_end = self.pos;
                    self.pos += 1;
                    // The spelling keeps escapes unprocessed; the assembler
                    // understands the same escape syntax when this is emitted.
                    let text = unsafe { std::str::from_utf8_unchecked(&self.buffer[content_start..content_end]) };
                    return Some(TokenKind::StringLiteral(intern(text)));
                }
                Some(b'\\') => {
                    // Validate the escape but keep the raw spelling.
                    self.scan_escape(diag)?;
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
    }

    /// Consume one escape sequence (the leading backslash is next) and
    /// return its byte value.
    fn scan_escape(&mut self, diag: &mut DiagnosticEngine) -> Option<u8> {
        let start = self.pos;
        self.pos += 1; // backslash
        let Some(byte) = self.bump() else {
            diag.report_parse_error(ParseError::UnexpectedEof {
                location: self.span_from(start),
            });
            return None;
        };
        let value = match byte {
            b'\'' => b'\'',
            b'"' => b'"',
            b'?' => b'?',
            b'\\' => b'\\',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'0'..=b'7' => {
                let mut value = (byte - b'0') as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                value as u8
            }
            b'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while let Some(d) = self.peek() {
                    if let Some(hex) = (d as char).to_digit(16) {
                        value = value.wrapping_mul(16).wrapping_add(hex);
                        digits += 1;
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                if digits == 0 {
                    diag.report_parse_error(ParseError::SyntaxError {
                        message: "\\x used with no following hex digits".to_string(),
                        location: self.span_from(start),
                    });
                    return None;
                }
                value as u8
            }
            other => {
                diag.report_parse_error(ParseError::SyntaxError {
                    message: format!("unknown escape sequence '\\{}'", other as char),
                    location: self.span_from(start),
                });
                return None;
            }
        };
        Some(value)
    }

    fn scan_punctuation(&mut self, diag: &mut DiagnosticEngine) -> Option<TokenKind> {
        let start = self.pos;
        let byte = self.bump()?;
        let kind = match byte {
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'~' => TokenKind::Tilde,
            b'?' => TokenKind::Question,
            b':' => TokenKind::Colon,
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            b'+' => {
                if self.eat(b'+') {
                    TokenKind::Increment
                } else if self.eat(b'=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.eat(b'-') {
                    TokenKind::Decrement
                } else if self.eat(b'=') {
                    TokenKind::MinusAssign
                } else if self.eat(b'>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => {
                if self.eat(b'=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            b'/' => {
                if self.eat(b'=') {
                    TokenKind::DivAssign
                } else {
                    TokenKind::Slash
                }
            }
            b'%' => {
                if self.eat(b'=') {
                    TokenKind::ModAssign
                } else {
                    TokenKind::Percent
                }
            }
            b'^' => {
                if self.eat(b'=') {
                    TokenKind::XorAssign
                } else {
                    TokenKind::Xor
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    TokenKind::Equal
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Not
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    TokenKind::LogicAnd
                } else if self.eat(b'=') {
                    TokenKind::AndAssign
                } else {
                    TokenKind::And
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    TokenKind::LogicOr
                } else if self.eat(b'=') {
                    TokenKind::OrAssign
                } else {
                    TokenKind::Or
                }
            }
            b'<' => {
                if self.eat(b'<') {
                    if self.eat(b'=') {
                        TokenKind::LeftShiftAssign
                    } else {
                        TokenKind::LeftShift
                    }
                } else if self.eat(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.eat(b'>') {
                    if self.eat(b'=') {
                        TokenKind::RightShiftAssign
                    } else {
                        TokenKind::RightShift
                    }
                } else if self.eat(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            other => {
                diag.report_parse_error(ParseError::UnknownCharacter {
                    ch: other as char,
                    location: self.span_from(start),
                });
                return None;
            }
        };
        Some(kind)
    }
}

/// Parse an integer literal, returning its value and resolved type.
///
/// Decimal constants without a `u` suffix stay signed (int, then long);
/// octal and hex constants may fall into the unsigned types as well.
fn parse_integer_literal(text: &str) -> Option<(u64, IntLitKind)> {
    let (digits, has_u, has_l) = strip_integer_suffix(text)?;

    let (base, digits) = if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, rest)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if digits.is_empty() {
        return None;
    }

    let mut value: u64 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(base)?;
        value = value.checked_mul(base as u64)?;
        value = value.checked_add(digit as u64)?;
    }

    let fits_int = value <= i32::MAX as u64;
    let fits_uint = value <= u32::MAX as u64;
    let fits_long = value <= i64::MAX as u64;

    let kind = match (has_u, has_l) {
        (true, true) => IntLitKind::ULong,
        (true, false) => {
            if fits_uint {
                IntLitKind::UInt
            } else {
                IntLitKind::ULong
            }
        }
        (false, true) => {
            if fits_long {
                IntLitKind::Long
            } else {
                IntLitKind::ULong
            }
        }
        (false, false) => {
            if fits_int {
                IntLitKind::Int
            } else if base != 10 && fits_uint {
                IntLitKind::UInt
            } else if fits_long {
                IntLitKind::Long
            } else if base != 10 {
                IntLitKind::ULong
            } else {
                // Decimal constant too large for long
                return None;
            }
        }
    };
    Some((value, kind))
}

/// Strip the integer suffix, returning (digits, has_u, has_l).
fn strip_integer_suffix(text: &str) -> Option<(&str, bool, bool)> {
    let bytes = text.as_bytes();
    let mut end = bytes.len();
    let mut has_u = false;
    let mut l_count = 0;

    while end > 0 {
        match bytes[end - 1].to_ascii_lowercase() {
            b'u' => {
                if has_u {
                    return None;
                }
                has_u = true;
                end -= 1;
            }
            b'l' => {
                l_count += 1;
                if l_count > 2 {
                    return None;
                }
                end -= 1;
            }
            _ => break,
        }
    }

    // "ll" must be two adjacent same-case characters, but since we treat
    // long and long long identically the distinction does not matter here.
    Some((&text[..end], has_u, l_count > 0))
}

/// Parse a floating constant, returning (value, is_float).
fn parse_float_literal(text: &str) -> Option<(f64, bool)> {
    let mut digits = text;
    let mut is_float = false;
    if let Some(last) = digits.chars().last() {
        match last {
            'f' | 'F' => {
                is_float = true;
                digits = &digits[..digits.len() - 1];
            }
            'l' | 'L' => {
                // long double is treated as double
                digits = &digits[..digits.len() - 1];
            }
            _ => {}
        }
    }
    let value = if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        parse_hex_float(rest)?
    } else {
        digits.parse().ok()?
    };
    Some((value, is_float))
}

/// Parse the mantissa and binary exponent of a hexadecimal float,
/// without the `0x` prefix. `f64::from_str` does not accept these.
fn parse_hex_float(text: &str) -> Option<f64> {
    let (mantissa_text, exp_text) = match text.split_once(['p', 'P']) {
        Some(parts) => parts,
        // A binary exponent is mandatory in hex floats
        None => return None,
    };

    let mut result = 0.0f64;
    let mut fraction_digits = 0i32;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in mantissa_text.chars() {
        if c == '.' {
            if seen_dot {
                return None;
            }
            seen_dot = true;
            continue;
        }
        let digit = c.to_digit(16)?;
        result = result * 16.0 + digit as f64;
        if seen_dot {
            fraction_digits += 1;
        }
        seen_digit = true;
    }
    if !seen_digit {
        return None;
    }

    let exponent: i32 = exp_text.parse().ok()?;

    // Apply fractional adjustment
    if fraction_digits > 0 {
        result /= 16.0f64.powi(fraction_digits);
    }

    // Apply binary exponent
    if exponent != 0 {
        result *= 2.0f64.powi(exponent);
    }

    Some(result)
}

/// Decode a string literal spelling into its byte values. The spelling is
/// stored with the surrounding quotes stripped and escape sequences left
/// unprocessed; the lexer has already rejected malformed escapes, so any
/// backslash here starts a valid sequence.
pub(crate) fn decode_string_spelling(spelling: &str) -> Vec<u8> {
    let bytes = spelling.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        let Some(escape) = bytes.get(i).copied() else {
            break;
        };
        i += 1;
        let value = match escape {
            b'\'' => b'\'',
            b'"' => b'"',
            b'?' => b'?',
            b'\\' => b'\\',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'0'..=b'7' => {
                let mut octal = (escape - b'0') as u32;
                let mut digits = 1;
                while digits < 3 {
                    match bytes.get(i).copied() {
                        Some(d @ b'0'..=b'7') => {
                            octal = octal * 8 + (d - b'0') as u32;
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                octal as u8
            }
            b'x' => {
                let mut hex = 0u32;
                while let Some(digit) =
                    bytes.get(i).and_then(|b| (*b as char).to_digit(16))
                {
                    hex = hex.wrapping_mul(16).wrapping_add(digit);
                    i += 1;
                }
                hex as u8
            }
            other => other,
        };
        decoded.push(value);
    }
    decoded
}

#[cfg(test)]
mod tests_lexer;
