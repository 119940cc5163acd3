//! Lexical tokens produced by the lexer from preprocessed text.

use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Decimal,
    Octal,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntSuffix {
    pub unsigned: bool,
    /// 0 = int, 1 = long, 2 = long long.
    pub long_count: u8,
    pub imaginary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloatSuffix {
    pub is_float: bool,
    pub is_long_double: bool,
    pub imaginary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral { text: String, radix: Radix, suffix: IntSuffix },
    FloatLiteral { text: String, suffix: FloatSuffix },
    CharLiteral(char),
    WideCharLiteral(u32),
    StringLiteral(String),
    WideStringLiteral(Vec<u32>),

    Ident(String),
    Keyword(Keyword),

    // Punctuation (kept as a flat enum so the parser can match on it directly)
    Punct(Punct),

    /// Malformed segment the lexer could not classify; lexing continues.
    Unknown(String),

    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Void, Bool, Char, Short, Int, Long, Float, Double, Signed, Unsigned,
    Struct, Union, Enum, Typedef,
    Const, Volatile, Restrict, Inline,
    Static, Extern, Auto, Register,
    If, Else, Switch, Case, Default,
    While, Do, For, Break, Continue, Goto, Return,
    Sizeof, StaticAssert, Complex,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s {
            "void" => Void, "_Bool" => Bool, "char" => Char, "short" => Short,
            "int" => Int, "long" => Long, "float" => Float, "double" => Double,
            "signed" => Signed, "unsigned" => Unsigned,
            "struct" => Struct, "union" => Union, "enum" => Enum, "typedef" => Typedef,
            "const" => Const, "volatile" => Volatile, "restrict" => Restrict, "inline" => Inline,
            "static" => Static, "extern" => Extern, "auto" => Auto, "register" => Register,
            "if" => If, "else" => Else, "switch" => Switch, "case" => Case, "default" => Default,
            "while" => While, "do" => Do, "for" => For, "break" => Break, "continue" => Continue,
            "goto" => Goto, "return" => Return,
            "sizeof" => Sizeof, "_Static_assert" => StaticAssert, "_Complex" => Complex,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen, RParen, LBrace, RBrace, LBracket, RBracket,
    Semi, Comma, Colon, Question, Dot, Arrow, Ellipsis,
    Plus, Minus, Star, Slash, Percent,
    Amp, Pipe, Caret, Tilde, Bang,
    Shl, Shr,
    Lt, Gt, Le, Ge, EqEq, Ne,
    AmpAmp, PipePipe,
    Assign, PlusEq, MinusEq, StarEq, SlashEq, PercentEq,
    AmpEq, PipeEq, CaretEq, ShlEq, ShrEq,
    PlusPlus, MinusMinus,
}

/// Punctuators in longest-match-first order, as the lexer scans them.
pub const PUNCT_TABLE: &[(&str, Punct)] = &[
    ("...", Punct::Ellipsis),
    ("<<=", Punct::ShlEq), (">>=", Punct::ShrEq),
    ("==", Punct::EqEq), ("!=", Punct::Ne),
    ("&&", Punct::AmpAmp), ("||", Punct::PipePipe),
    ("<<", Punct::Shl), (">>", Punct::Shr),
    ("<=", Punct::Le), (">=", Punct::Ge),
    ("->", Punct::Arrow), ("++", Punct::PlusPlus), ("--", Punct::MinusMinus),
    ("+=", Punct::PlusEq), ("-=", Punct::MinusEq), ("*=", Punct::StarEq),
    ("/=", Punct::SlashEq), ("%=", Punct::PercentEq),
    ("&=", Punct::AmpEq), ("|=", Punct::PipeEq), ("^=", Punct::CaretEq),
    ("(", Punct::LParen), (")", Punct::RParen),
    ("{", Punct::LBrace), ("}", Punct::RBrace),
    ("[", Punct::LBracket), ("]", Punct::RBracket),
    (";", Punct::Semi), (",", Punct::Comma), (":", Punct::Colon), ("?", Punct::Question),
    (".", Punct::Dot),
    ("+", Punct::Plus), ("-", Punct::Minus), ("*", Punct::Star), ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("&", Punct::Amp), ("|", Punct::Pipe), ("^", Punct::Caret), ("~", Punct::Tilde),
    ("!", Punct::Bang),
    ("<", Punct::Lt), (">", Punct::Gt),
    ("=", Punct::Assign),
];

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub file: Rc<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_punct(&self, p: Punct) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn is_keyword(&self, k: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(q) if *q == k)
    }

    pub fn ident_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    /// `<kind> <lexeme> <file>:<line>:<column>` per SPEC_FULL.md §6 token dump.
    pub fn dump_line(&self) -> String {
        let kind = match &self.kind {
            TokenKind::IntLiteral { .. } => "INT",
            TokenKind::FloatLiteral { .. } => "FLOAT",
            TokenKind::CharLiteral(_) => "CHAR",
            TokenKind::WideCharLiteral(_) => "WCHAR",
            TokenKind::StringLiteral(_) => "STRING",
            TokenKind::WideStringLiteral(_) => "WSTRING",
            TokenKind::Ident(_) => "IDENT",
            TokenKind::Keyword(_) => "KEYWORD",
            TokenKind::Punct(_) => "PUNCT",
            TokenKind::Unknown(_) => "UNKNOWN",
            TokenKind::Eof => "EOF",
        };
        format!(
            "{} {} {}:{}:{}",
            kind,
            self.lexeme,
            self.file.display(),
            self.line + 1,
            self.column + 1
        )
    }
}
