//! Integer constant-expression evaluator for `#if`/`#elif`.
//!
//! Integer-only, 64-bit signed, per SPEC_FULL.md §4.1. `defined(X)` is
//! resolved against the macro table before the rest of the expression is
//! evaluated so later arithmetic never sees the operator.

use super::macros::MacroTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    DivisionByZero,
    MalformedNumber,
    UnexpectedToken,
    UnexpectedEnd,
}

fn tokenize(expr: &str) -> Vec<String> {
    let mut toks = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            toks.push(chars[start..i].iter().collect());
            continue;
        }
        if c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1; // closing quote
            toks.push(chars[start..i.min(chars.len())].iter().collect());
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            toks.push(chars[start..i].iter().collect());
            continue;
        }
        // multi-char operators, longest first
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let three: String = chars[i..(i + 3).min(chars.len())].iter().collect();
        if three == "<<=" || three == ">>=" {
            toks.push(three);
            i += 3;
            continue;
        }
        if matches!(
            two.as_str(),
            "<<" | ">>" | "<=" | ">=" | "==" | "!=" | "&&" | "||"
        ) {
            toks.push(two);
            i += 2;
            continue;
        }
        toks.push(c.to_string());
        i += 1;
    }
    toks
}

fn parse_char_const(lit: &str) -> Result<i64, EvalError> {
    let inner = lit.trim_start_matches('\'').trim_end_matches('\'');
    let chars: Vec<char> = inner.chars().collect();
    if chars.is_empty() {
        return Err(EvalError::MalformedNumber);
    }
    if chars[0] != '\\' {
        return Ok(chars[0] as i64);
    }
    let value = match chars.get(1) {
        Some('n') => b'\n',
        Some('t') => b'\t',
        Some('r') => b'\r',
        Some('b') => 0x08,
        Some('f') => 0x0c,
        Some('v') => 0x0b,
        Some('\\') => b'\\',
        Some('\'') => b'\'',
        Some('"') => b'"',
        Some('0') => {
            let octal: String = chars[1..].iter().take_while(|c| c.is_digit(8)).collect();
            let v = u32::from_str_radix(&octal, 8).unwrap_or(0).min(255);
            return Ok(v as i64);
        }
        Some('x') => {
            let hex: String = chars[2..].iter().take_while(|c| c.is_ascii_hexdigit()).collect();
            let v = u32::from_str_radix(&hex, 16).unwrap_or(0);
            return Ok((v & 0xff) as i64);
        }
        _ => return Err(EvalError::MalformedNumber),
    };
    Ok(value as i64)
}

fn parse_int_literal(lit: &str) -> Result<i64, EvalError> {
    let lower = lit.to_ascii_lowercase();
    let trimmed: String = lower
        .chars()
        .take_while(|c| !matches!(c, 'u' | 'l'))
        .collect();
    let value = if let Some(hex) = trimmed.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).map_err(|_| EvalError::MalformedNumber)?
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        i64::from_str_radix(&trimmed[1..], 8).map_err(|_| EvalError::MalformedNumber)?
    } else {
        trimmed.parse::<i64>().map_err(|_| EvalError::MalformedNumber)?
    };
    Ok(value)
}

/// Recursive-descent evaluator mirroring the C conditional-expression
/// grammar (ternary at the top, down through logical/bitwise/relational to
/// unary and primary).
struct Evaluator<'a> {
    toks: Vec<String>,
    pos: usize,
    macros: &'a MacroTable,
    /// When `false`, division/modulo by zero is tolerated and yields 0
    /// (inactive-branch tolerance per SPEC_FULL.md §4.1).
    active: bool,
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<&str> {
        self.toks.get(self.pos).map(|s| s.as_str())
    }

    fn advance(&mut self) -> Option<String> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, s: &str) -> Result<(), EvalError> {
        match self.advance() {
            Some(t) if t == s => Ok(()),
            Some(_) => Err(EvalError::UnexpectedToken),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn parse_ternary(&mut self) -> Result<i64, EvalError> {
        let cond = self.parse_logor()?;
        if self.peek() == Some("?") {
            self.advance();
            let then_val = self.parse_ternary()?;
            self.expect(":")?;
            let else_val = self.parse_ternary()?;
            Ok(if cond != 0 { then_val } else { else_val })
        } else {
            Ok(cond)
        }
    }

    fn parse_logor(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_logand()?;
        while self.peek() == Some("||") {
            self.advance();
            let rhs = self.parse_logand()?;
            lhs = ((lhs != 0) || (rhs != 0)) as i64;
        }
        Ok(lhs)
    }

    fn parse_logand(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_bitor()?;
        while self.peek() == Some("&&") {
            self.advance();
            let rhs = self.parse_bitor()?;
            lhs = ((lhs != 0) && (rhs != 0)) as i64;
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_bitxor()?;
        while self.peek() == Some("|") {
            self.advance();
            lhs |= self.parse_bitxor()?;
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_bitand()?;
        while self.peek() == Some("^") {
            self.advance();
            lhs ^= self.parse_bitand()?;
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some("&") {
            self.advance();
            lhs &= self.parse_equality()?;
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_relational()?;
        loop {
            match self.peek() {
                Some("==") => {
                    self.advance();
                    lhs = (lhs == self.parse_relational()?) as i64;
                }
                Some("!=") => {
                    self.advance();
                    lhs = (lhs != self.parse_relational()?) as i64;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_shift()?;
        loop {
            match self.peek() {
                Some("<") => { self.advance(); lhs = (lhs < self.parse_shift()?) as i64; }
                Some(">") => { self.advance(); lhs = (lhs > self.parse_shift()?) as i64; }
                Some("<=") => { self.advance(); lhs = (lhs <= self.parse_shift()?) as i64; }
                Some(">=") => { self.advance(); lhs = (lhs >= self.parse_shift()?) as i64; }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_additive()?;
        loop {
            match self.peek() {
                Some("<<") => { self.advance(); lhs <<= self.parse_additive()?; }
                Some(">>") => { self.advance(); lhs >>= self.parse_additive()?; }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some("+") => { self.advance(); lhs = lhs.wrapping_add(self.parse_multiplicative()?); }
                Some("-") => { self.advance(); lhs = lhs.wrapping_sub(self.parse_multiplicative()?); }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some("*") => { self.advance(); lhs = lhs.wrapping_mul(self.parse_unary()?); }
                Some("/") => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        if self.active {
                            return Err(EvalError::DivisionByZero);
                        }
                        lhs = 0;
                    } else {
                        lhs = lhs.wrapping_div(rhs);
                    }
                }
                Some("%") => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        if self.active {
                            return Err(EvalError::DivisionByZero);
                        }
                        lhs = 0;
                    } else {
                        lhs = lhs.wrapping_rem(rhs);
                    }
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<i64, EvalError> {
        match self.peek() {
            Some("+") => { self.advance(); self.parse_unary() }
            Some("-") => { self.advance(); Ok(self.parse_unary()?.wrapping_neg()) }
            Some("!") => { self.advance(); Ok((self.parse_unary()? == 0) as i64) }
            Some("~") => { self.advance(); Ok(!self.parse_unary()?) }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<i64, EvalError> {
        let tok = self.advance().ok_or(EvalError::UnexpectedEnd)?;
        if tok == "(" {
            let v = self.parse_ternary()?;
            self.expect(")")?;
            return Ok(v);
        }
        if tok == "defined" {
            let paren = self.peek() == Some("(");
            if paren {
                self.advance();
            }
            let name = self.advance().ok_or(EvalError::UnexpectedEnd)?;
            if paren {
                self.expect(")")?;
            }
            return Ok(self.macros.is_defined(&name) as i64);
        }
        if tok.starts_with('\'') {
            return parse_char_const(&tok);
        }
        if tok.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            return parse_int_literal(&tok);
        }
        if tok.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false) {
            // Undefined identifiers evaluate to 0 (SPEC_FULL.md §4.1), which
            // also covers `true`/`false` not being keywords at this layer.
            return Ok(0);
        }
        Err(EvalError::UnexpectedToken)
    }
}

/// Evaluates a `#if`/`#elif` controlling expression. `active` controls
/// whether division/modulo by zero is fatal (true) or tolerated as 0 (false,
/// used while scanning an already-elided branch just to balance nesting).
pub fn eval(expr: &str, macros: &MacroTable, active: bool) -> Result<i64, EvalError> {
    let toks = tokenize(expr);
    let mut evaluator = Evaluator {
        toks,
        pos: 0,
        macros,
        active,
    };
    if evaluator.toks.is_empty() {
        return Err(EvalError::UnexpectedEnd);
    }
    let value = evaluator.parse_ternary()?;
    if evaluator.pos != evaluator.toks.len() {
        return Err(EvalError::UnexpectedToken);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_macros() -> MacroTable {
        MacroTable::new()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3", &empty_macros(), true).unwrap(), 7);
    }

    #[test]
    fn ternary_and_comparison() {
        assert_eq!(eval("1 < 2 ? 10 : 20", &empty_macros(), true).unwrap(), 10);
    }

    #[test]
    fn defined_operator() {
        let mut macros = MacroTable::new();
        macros
            .define(super::super::macros::Macro {
                name: "FOO".into(),
                params: vec![],
                variadic: false,
                object_like: true,
                body: "1".into(),
            })
            .unwrap();
        assert_eq!(eval("defined(FOO)", &macros, true).unwrap(), 1);
        assert_eq!(eval("defined BAR", &macros, true).unwrap(), 0);
    }

    #[test]
    fn undefined_identifier_is_zero() {
        assert_eq!(eval("UNDEFINED_THING + 1", &empty_macros(), true).unwrap(), 1);
    }

    #[test]
    fn division_by_zero_is_fatal_when_active() {
        assert_eq!(
            eval("1 / 0", &empty_macros(), true),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn division_by_zero_tolerated_when_inactive() {
        assert_eq!(eval("1 / 0", &empty_macros(), false).unwrap(), 0);
    }

    #[test]
    fn hex_and_octal_literals() {
        assert_eq!(eval("0x10", &empty_macros(), true).unwrap(), 16);
        assert_eq!(eval("010", &empty_macros(), true).unwrap(), 8);
    }

    #[test]
    fn char_constant_escape() {
        assert_eq!(eval("'\\n'", &empty_macros(), true).unwrap(), 10);
    }
}
