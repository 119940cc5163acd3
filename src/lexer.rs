//! Converts preprocessed text into a flat token stream (SPEC_FULL.md §4.2).
//!
//! The lexer never re-derives macro expansion; its input already went
//! through `Preprocessor::process_main_file`. It still understands
//! `# <n> "file"` line markers so text produced by an external cpp (or
//! fixtures written by hand) carries correct diagnostic locations.

use crate::diagnostics::Kind;
use crate::session::Session;
use crate::token::{FloatSuffix, IntSuffix, Keyword, Punct, Radix, Token, TokenKind, PUNCT_TABLE};
use std::path::PathBuf;
use std::rc::Rc;

pub struct Lexer<'s> {
    session: &'s mut Session,
    chars: Vec<char>,
    pos: usize,
    file: Rc<PathBuf>,
    line: usize,
    column: usize,
}

impl<'s> Lexer<'s> {
    pub fn new(session: &'s mut Session, source: &str, file: PathBuf) -> Self {
        Lexer {
            session,
            chars: source.chars().collect(),
            pos: 0,
            file: Rc::new(file),
            line: 0,
            column: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Tokenizes the entire input, always terminating in exactly one `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_insignificant();
            let start_line = self.line;
            let start_col = self.column;
            let Some(c) = self.peek() else {
                tokens.push(self.make(TokenKind::Eof, String::new(), start_line, start_col));
                break;
            };

            if c == '#' && self.column == 0 {
                if self.looking_at("#pragma pack ") {
                    self.consume_pack_marker();
                } else {
                    self.consume_line_marker();
                }
                continue;
            }

            if c.is_ascii_digit() || (c == '.' && self.peek_at(1).map(|d| d.is_ascii_digit()).unwrap_or(false)) {
                tokens.push(self.lex_number(start_line, start_col));
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                tokens.push(self.lex_ident(start_line, start_col));
                continue;
            }
            if c == '"' {
                tokens.push(self.lex_string(start_line, start_col, false));
                continue;
            }
            if c == '\'' {
                tokens.push(self.lex_char(start_line, start_col, false));
                continue;
            }
            if c == 'L' && matches!(self.peek_at(1), Some('"') | Some('\'')) {
                self.advance();
                let wide_char = self.peek() == Some('\'');
                tokens.push(if wide_char {
                    self.lex_char(start_line, start_col, true)
                } else {
                    self.lex_string(start_line, start_col, true)
                });
                continue;
            }
            if let Some(tok) = self.lex_punct(start_line, start_col) {
                tokens.push(tok);
                continue;
            }

            let bad = self.advance().unwrap();
            self.session.diagnostics.error(
                Kind::Lex,
                self.file.as_ref().clone(),
                start_line,
                start_col,
                format!("unexpected character '{bad}'"),
            );
            tokens.push(self.make(TokenKind::Unknown(bad.to_string()), bad.to_string(), start_line, start_col));
        }
        tokens
    }

    fn make(&self, kind: TokenKind, lexeme: String, line: usize, column: usize) -> Token {
        Token {
            kind,
            lexeme,
            file: self.file.clone(),
            line,
            column,
        }
    }

    /// Skips whitespace and `//`/`/* */` comments that survived preprocessing
    /// (the stand-alone lexer test fixtures feed raw text without having gone
    /// through `Preprocessor`, so comment handling is duplicated defensively).
    fn skip_insignificant(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while self.peek().is_some() && !(self.peek() == Some('*') && self.peek_at(1) == Some('/')) {
                        self.advance();
                    }
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn looking_at(&self, s: &str) -> bool {
        let remaining: String = self.chars[self.pos..].iter().take(s.chars().count()).collect();
        remaining == s
    }

    /// Synthetic `#pragma pack N` marker the preprocessor leaves behind so
    /// the struct-layout pack ceiling survives into the token stream (the
    /// preprocessor and parser each see the source exactly once, so this is
    /// the only place the value can cross the phase boundary). Never itself
    /// emitted as a token.
    fn consume_pack_marker(&mut self) {
        for _ in "#pragma pack ".chars() {
            self.advance();
        }
        let digit_start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        let number: String = self.chars[digit_start..self.pos].iter().collect();
        if let Ok(n) = number.parse::<u32>() {
            self.session.pack_alignment = n;
        }
        while self.peek().is_some() && self.peek() != Some('\n') {
            self.advance();
        }
    }

    /// `# <n> "file" [flags]` — GNU line marker. Never itself emitted as a
    /// token; instead it retargets subsequent line/file bookkeeping.
    fn consume_line_marker(&mut self) {
        let save = self.pos;
        self.advance(); // '#'
        while self.peek() == Some(' ') {
            self.advance();
        }
        let digit_start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        if self.pos == digit_start {
            // Not actually a line marker (e.g. a directive survived
            // preprocessing unexpectedly); rewind and let the main loop
            // report it as unknown punctuation instead of silently eating it.
            self.pos = save;
            self.advance();
            return;
        }
        let number: String = self.chars[digit_start..self.pos].iter().collect();
        while self.peek() == Some(' ') {
            self.advance();
        }
        let mut new_file = None;
        if self.peek() == Some('"') {
            self.advance();
            let name_start = self.pos;
            while self.peek().is_some() && self.peek() != Some('"') {
                self.advance();
            }
            new_file = Some(self.chars[name_start..self.pos].iter().collect::<String>());
            self.advance();
        }
        while self.peek().is_some() && self.peek() != Some('\n') {
            self.advance();
        }
        if let Some(name) = new_file {
            self.file = Rc::new(PathBuf::from(name));
        }
        if let Ok(n) = number.parse::<usize>() {
            self.line = n.saturating_sub(1);
        }
    }

    fn lex_ident(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        while self.peek().map(|c| c.is_alphanumeric() || c == '_').unwrap_or(false) {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = match Keyword::from_str(&text) {
            Some(k) => TokenKind::Keyword(k),
            None => TokenKind::Ident(text.clone()),
        };
        self.make(kind, text, line, column)
    }

    fn lex_number(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        let mut radix = Radix::Decimal;
        let mut is_float = false;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            radix = Radix::Hex;
            self.advance();
            self.advance();
            while self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                self.advance();
            }
            // Hex float: p/P exponent.
            if matches!(self.peek(), Some('p') | Some('P')) {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            }
        } else {
            if self.peek() == Some('0') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                radix = Radix::Octal;
            }
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
            if self.peek() == Some('.') {
                is_float = true;
                radix = Radix::Decimal;
                self.advance();
                while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                is_float = true;
                radix = Radix::Decimal;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            }
        }

        if is_float {
            let mut suffix = FloatSuffix::default();
            match self.peek() {
                Some('f') | Some('F') => {
                    suffix.is_float = true;
                    self.advance();
                }
                Some('l') | Some('L') => {
                    suffix.is_long_double = true;
                    self.advance();
                }
                _ => {}
            }
            if matches!(self.peek(), Some('i') | Some('I') | Some('j') | Some('J')) {
                suffix.imaginary = true;
                self.advance();
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            return self.make(TokenKind::FloatLiteral { text: text.clone(), suffix }, text, line, column);
        }

        let mut suffix = IntSuffix::default();
        loop {
            match self.peek() {
                Some('u') | Some('U') if !suffix.unsigned => {
                    suffix.unsigned = true;
                    self.advance();
                }
                Some('l') | Some('L') if suffix.long_count < 2 => {
                    suffix.long_count += 1;
                    self.advance();
                }
                Some('i') | Some('I') | Some('j') | Some('J') if !suffix.imaginary => {
                    suffix.imaginary = true;
                    self.advance();
                }
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.make(TokenKind::IntLiteral { text: text.clone(), radix, suffix }, text, line, column)
    }

    fn read_escape(&mut self) -> Option<u32> {
        self.advance(); // consume '\\'
        let c = self.advance()?;
        Some(match c {
            'n' => b'\n' as u32,
            't' => b'\t' as u32,
            'r' => b'\r' as u32,
            'b' => 0x08,
            'f' => 0x0c,
            'v' => 0x0b,
            'a' => 0x07,
            '0'..='7' => {
                let mut digits = String::from(c);
                for _ in 0..2 {
                    if matches!(self.peek(), Some('0'..='7')) {
                        digits.push(self.advance().unwrap());
                    } else {
                        break;
                    }
                }
                let value = u32::from_str_radix(&digits, 8).unwrap_or(0);
                if value > 0xff {
                    self.session.diagnostics.warning(
                        Kind::Lex,
                        self.file.as_ref().clone(),
                        self.line,
                        self.column,
                        format!("octal escape '\\{digits}' out of range, clamped to 0xff"),
                    );
                }
                value & 0xff
            }
            'x' => {
                let mut digits = String::new();
                while self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                    digits.push(self.advance().unwrap());
                }
                u32::from_str_radix(&digits, 16).unwrap_or(0)
            }
            '\\' => b'\\' as u32,
            '\'' => b'\'' as u32,
            '"' => b'"' as u32,
            '?' => b'?' as u32,
            other => other as u32,
        })
    }

    fn lex_char(&mut self, line: usize, column: usize, wide: bool) -> Token {
        let start = self.pos;
        self.advance(); // opening quote
        let value = if self.peek() == Some('\\') {
            self.read_escape().unwrap_or(0)
        } else {
            self.advance().map(|c| c as u32).unwrap_or(0)
        };
        if self.peek() == Some('\'') {
            self.advance();
        } else {
            self.session.diagnostics.error(
                Kind::Lex,
                self.file.as_ref().clone(),
                line,
                column,
                "unterminated character constant",
            );
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if wide {
            self.make(TokenKind::WideCharLiteral(value), text, line, column)
        } else {
            let c = char::from_u32(value).unwrap_or('\u{fffd}');
            self.make(TokenKind::CharLiteral(c), text, line, column)
        }
    }

    fn lex_string(&mut self, line: usize, column: usize, wide: bool) -> Token {
        let start = self.pos;
        self.advance(); // opening quote
        let mut codepoints = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.session.diagnostics.error(
                        Kind::Lex,
                        self.file.as_ref().clone(),
                        line,
                        column,
                        "unterminated string literal",
                    );
                    break;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    codepoints.push(self.read_escape().unwrap_or(0));
                }
                Some(c) => {
                    codepoints.push(c as u32);
                    self.advance();
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if wide {
            self.make(TokenKind::WideStringLiteral(codepoints), text, line, column)
        } else {
            let s: String = codepoints.into_iter().filter_map(char::from_u32).collect();
            self.make(TokenKind::StringLiteral(s), text, line, column)
        }
    }

    fn lex_punct(&mut self, line: usize, column: usize) -> Option<Token> {
        let remaining: String = self.chars[self.pos..].iter().take(3).collect();
        for (spelling, punct) in PUNCT_TABLE {
            if remaining.starts_with(spelling) {
                for _ in 0..spelling.chars().count() {
                    self.advance();
                }
                return Some(self.make(TokenKind::Punct(*punct), spelling.to_string(), line, column));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    fn lex(src: &str) -> Vec<Token> {
        let mut session = Session::new(CompilerConfig::default());
        let lexer = Lexer::new(&mut session, src, PathBuf::from("test.c"));
        lexer.tokenize()
    }

    #[test]
    fn keywords_and_identifiers() {
        let toks = lex("int foo_bar return");
        assert!(toks[0].is_keyword(Keyword::Int));
        assert_eq!(toks[1].ident_name(), Some("foo_bar"));
        assert!(toks[2].is_keyword(Keyword::Return));
        assert!(toks[3].is_eof());
    }

    #[test]
    fn integer_suffixes() {
        let toks = lex("123UL 0x1Fu 010");
        match &toks[0].kind {
            TokenKind::IntLiteral { suffix, .. } => {
                assert!(suffix.unsigned);
                assert_eq!(suffix.long_count, 1);
            }
            other => panic!("expected int literal, got {other:?}"),
        }
        match &toks[1].kind {
            TokenKind::IntLiteral { radix, suffix, .. } => {
                assert_eq!(*radix, Radix::Hex);
                assert!(suffix.unsigned);
            }
            other => panic!("expected hex literal, got {other:?}"),
        }
        match &toks[2].kind {
            TokenKind::IntLiteral { radix, .. } => assert_eq!(*radix, Radix::Octal),
            other => panic!("expected octal literal, got {other:?}"),
        }
    }

    #[test]
    fn float_literals() {
        let toks = lex("3.14 2e10 1.5f");
        assert!(matches!(toks[0].kind, TokenKind::FloatLiteral { .. }));
        assert!(matches!(toks[1].kind, TokenKind::FloatLiteral { .. }));
        match &toks[2].kind {
            TokenKind::FloatLiteral { suffix, .. } => assert!(suffix.is_float),
            other => panic!("expected float literal, got {other:?}"),
        }
    }

    #[test]
    fn string_and_char_escapes() {
        let toks = lex(r#" "a\nb" 'x' '\t' "#);
        match &toks[0].kind {
            TokenKind::StringLiteral(s) => assert_eq!(s, "a\nb"),
            other => panic!("expected string literal, got {other:?}"),
        }
        match &toks[1].kind {
            TokenKind::CharLiteral(c) => assert_eq!(*c, 'x'),
            other => panic!("expected char literal, got {other:?}"),
        }
        match &toks[2].kind {
            TokenKind::CharLiteral(c) => assert_eq!(*c, '\t'),
            other => panic!("expected char literal, got {other:?}"),
        }
    }

    #[test]
    fn punctuation_longest_match() {
        let toks = lex("a <<= b; a<<b; a<=b;");
        assert!(toks[1].is_punct(Punct::ShlEq));
        assert!(toks[6].is_punct(Punct::Shl));
    }

    #[test]
    fn comments_are_skipped() {
        let toks = lex("int /* c */ x; // trailing\nint y;");
        assert!(toks[0].is_keyword(Keyword::Int));
        assert_eq!(toks[1].ident_name(), Some("x"));
    }

    #[test]
    fn unknown_character_recovers() {
        let toks = lex("int x = 1 @ 2;");
        assert!(toks.iter().any(|t| matches!(t.kind, TokenKind::Unknown(_))));
        // Lexing continues past the bad character instead of aborting.
        assert!(toks.iter().any(|t| matches!(&t.kind, TokenKind::IntLiteral { text, .. } if text == "2")));
    }
}
