//! Macro table and textual expansion.
//!
//! Expansion here is deliberately textual, not token-based: the preprocessor
//! never tokenizes C (SPEC_FULL.md §4.1). Identifier boundaries are found by
//! scanning characters directly.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub params: Vec<String>,
    pub variadic: bool,
    pub object_like: bool,
    pub body: String,
}

impl Macro {
    fn normalized_body(&self) -> String {
        self.body.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Two macros are "the same" for silent-redefinition purposes when their
    /// parameter lists and whitespace-normalized bodies match exactly.
    fn same_definition(&self, other: &Macro) -> bool {
        self.object_like == other.object_like
            && self.variadic == other.variadic
            && self.params == other.params
            && self.normalized_body() == other.normalized_body()
    }
}

/// Insertion-ordered macro table: a `Vec` holds definitions in the order
/// they were added (visible to `--dump-*` style tooling), a side index gives
/// O(1) lookup by name.
#[derive(Debug, Default)]
pub struct MacroTable {
    order: Vec<String>,
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Defines `name`; returns `Err` with a diagnostic message when this is
    /// an incompatible redefinition (different params or body). Returns
    /// `Ok(true)` when the macro was newly added or silently re-confirmed,
    /// `Ok(false)` is never produced (kept `Result` for symmetry with other
    /// phase entry points).
    pub fn define(&mut self, new_macro: Macro) -> Result<(), String> {
        if let Some(existing) = self.macros.get(&new_macro.name) {
            if existing.same_definition(&new_macro) {
                return Ok(());
            }
            return Err(format!(
                "\"{}\" redefined incompatibly with its previous definition",
                new_macro.name
            ));
        }
        self.order.push(new_macro.name.clone());
        self.macros.insert(new_macro.name.clone(), new_macro);
        Ok(())
    }

    pub fn undef(&mut self, name: &str) {
        if self.macros.remove(name).is_some() {
            self.order.retain(|n| n != name);
        }
    }

    pub fn iter_in_order(&self) -> impl Iterator<Item = &Macro> {
        self.order.iter().filter_map(move |n| self.macros.get(n))
    }
}

/// Splits a function-like macro invocation's argument text on top-level
/// commas, respecting nesting of `()`, `[]`, `{}` and string/char literals.
pub fn split_arguments(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            current.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Finds the matching `(...)` immediately following (modulo whitespace and
/// newlines) position `start`. Returns `(args_text, end_index)` where
/// `end_index` is the index just past the closing `)`.
pub fn scan_call_parens(text: &str, start: usize) -> Option<(String, usize)> {
    let char_indices: Vec<(usize, char)> = text.char_indices().collect();
    let mut k = char_indices.iter().position(|(b, _)| *b >= start)?;
    while k < char_indices.len() && char_indices[k].1.is_whitespace() {
        k += 1;
    }
    if k >= char_indices.len() || char_indices[k].1 != '(' {
        return None;
    }
    let arg_start = char_indices[k].0 + 1;
    let mut depth = 1i32;
    let mut in_string: Option<char> = None;
    k += 1;
    while k < char_indices.len() {
        let (byte_idx, c) = char_indices[k];
        if let Some(quote) = in_string {
            if c == '\\' {
                k += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
            k += 1;
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((text[arg_start..byte_idx].to_string(), byte_idx + 1));
                }
            }
            _ => {}
        }
        k += 1;
    }
    None
}

/// `#param` → stringized literal contents: backslash-escape `"` and `\`,
/// collapse surrounding whitespace, internal whitespace runs collapse to a
/// single space (closely matches `#x` producing `"a, b"` from `a,   b`).
pub fn stringize(arg_text: &str) -> String {
    let collapsed = arg_text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::from("\"");
    for c in collapsed.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_arguments_respects_nesting() {
        let args = split_arguments("a, (b, c), \"d, e\"");
        assert_eq!(args, vec!["a", "(b, c)", "\"d, e\""]);
    }

    #[test]
    fn split_arguments_empty_call_has_no_args() {
        assert!(split_arguments("").is_empty());
    }

    #[test]
    fn stringize_escapes_quotes_and_backslashes() {
        assert_eq!(stringize(r#"a "b" c"#), r#""a \"b\" c""#);
    }

    #[test]
    fn stringize_collapses_whitespace() {
        assert_eq!(stringize("a,   b"), "\"a, b\"");
    }

    #[test]
    fn macro_table_silent_on_identical_redefinition() {
        let mut table = MacroTable::new();
        let m = Macro {
            name: "FOO".into(),
            params: vec![],
            variadic: false,
            object_like: true,
            body: "1".into(),
        };
        table.define(m.clone()).unwrap();
        assert!(table.define(m).is_ok());
    }

    #[test]
    fn macro_table_errors_on_incompatible_redefinition() {
        let mut table = MacroTable::new();
        table
            .define(Macro {
                name: "FOO".into(),
                params: vec![],
                variadic: false,
                object_like: true,
                body: "1".into(),
            })
            .unwrap();
        let err = table.define(Macro {
            name: "FOO".into(),
            params: vec![],
            variadic: false,
            object_like: true,
            body: "2".into(),
        });
        assert!(err.is_err());
    }

    #[test]
    fn scan_call_parens_finds_matching_close() {
        let (args, end) = scan_call_parens("(a, (b), c) rest", 0).unwrap();
        assert_eq!(args, "a, (b), c");
        assert_eq!(&"(a, (b), c) rest"[end..], " rest");
    }
}
