use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

static OPERAND_LEXEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"0[xX][0-9a-fA-F]+|[0-9]+|[A-Za-z_.][A-Za-z0-9_.]*|\s+|.").expect("valid regex")
});

/// Size keywords of intel syntax memory operands.
const SIZE_KEYWORDS: [&str; 9] = [
    "byte", "word", "dword", "qword", "tbyte", "xmmword", "ymmword", "zmmword", "ptr",
];

/// Lowest value treated as a possible address rather than a plain integer.
const MIN_ADDRESS: u64 = 0x1000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Text,
    Tag,
    AddressDisplay,
    Mnemonic,
    Register,
    Integer,
    PossibleAddress,
    Separator,
    BeginMemoryOperand,
    EndMemoryOperand,
}

/// Piece of a disassembly line.
#[derive(Clone, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Numeric value for integer and address tokens, zero otherwise.
    pub value: u64,
    /// Width of `value` in bytes, zero if token carries no value.
    pub size: usize,
    /// Display width in columns.
    pub width: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            kind,
            width: text.chars().count(),
            text,
            value: 0,
            size: 0,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Text, text)
    }

    /// Icon like token with fixed column width.
    pub fn tag(text: impl Into<String>, width: usize) -> Self {
        Self {
            width,
            ..Self::new(TokenKind::Tag, text)
        }
    }

    /// Address column of a listing line.
    pub fn address_display(addr: u64) -> Self {
        Self {
            value: addr,
            ..Self::new(TokenKind::AddressDisplay, format!("{addr:x}"))
        }
    }

    pub fn mnemonic(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Mnemonic, text)
    }

    fn number(text: &str, value: u64, address_size: usize) -> Self {
        if value >= MIN_ADDRESS {
            Self {
                value,
                size: address_size,
                ..Self::new(TokenKind::PossibleAddress, text)
            }
        } else {
            Self {
                value,
                ..Self::new(TokenKind::Integer, text)
            }
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Split capstone mnemonic and operand string into typed tokens.
pub fn tokenize(mnemonic: &str, operands: &str, address_size: usize) -> Vec<Token> {
    let mut tokens = vec![Token::mnemonic(mnemonic)];
    if operands.is_empty() {
        return tokens;
    }
    tokens.push(Token::text(" "));

    for lexem in OPERAND_LEXEM.find_iter(operands).map(|m| m.as_str()) {
        let token = if let Some(hex) = lexem
            .strip_prefix("0x")
            .or_else(|| lexem.strip_prefix("0X"))
        {
            match u64::from_str_radix(hex, 16) {
                Ok(value) => Token::number(lexem, value, address_size),
                Err(_) => Token::text(lexem),
            }
        } else if lexem.starts_with(|c: char| c.is_ascii_digit()) {
            match lexem.parse::<u64>() {
                Ok(value) => Token::number(lexem, value, address_size),
                Err(_) => Token::text(lexem),
            }
        } else if lexem.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            if SIZE_KEYWORDS.contains(&lexem) {
                Token::text(lexem)
            } else {
                Token::new(TokenKind::Register, lexem)
            }
        } else {
            match lexem {
                "," => Token::new(TokenKind::Separator, lexem),
                "[" | "(" => Token::new(TokenKind::BeginMemoryOperand, lexem),
                "]" | ")" => Token::new(TokenKind::EndMemoryOperand, lexem),
                _ => Token::text(lexem),
            }
        };
        tokens.push(token);
    }
    tokens
}
