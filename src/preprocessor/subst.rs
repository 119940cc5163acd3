//! Function-like macro body substitution: `#param` stringizing, `a ## b`
//! pasting, and plain parameter substitution (expanded unless it is the
//! operand of `#`/`##`), per SPEC_FULL.md §4.1.

use super::macros::{stringize, Macro};
use std::collections::HashMap;

/// Splits a macro body into atoms: runs of identifier/digit characters,
/// single whitespace markers (any run of whitespace collapses to one `" "`
/// atom), `#`, `##`, string/char literals (kept whole, including quotes),
/// and individual punctuation characters otherwise.
fn lex_body(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut atoms = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            atoms.push(" ".to_string());
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            atoms.push(chars[start..i].iter().collect());
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != quote {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            atoms.push(chars[start..i].iter().collect());
            continue;
        }
        if c == '#' {
            if chars.get(i + 1) == Some(&'#') {
                atoms.push("##".to_string());
                i += 2;
            } else {
                atoms.push("#".to_string());
                i += 1;
            }
            continue;
        }
        atoms.push(c.to_string());
        i += 1;
    }
    atoms
}

fn is_ident_atom(atom: &str) -> bool {
    atom.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
}

/// Resolved per-parameter argument text, both forms.
struct ArgPair {
    raw: String,
    expanded: String,
}

/// Substitutes `mac`'s body given already-split argument texts (unexpanded)
/// and a callback used to expand an argument the first time it is needed in
/// a non-`#`/`##` position. `args` has exactly `mac.params.len()` entries
/// when not variadic; when variadic, trailing arguments beyond the fixed
/// parameter count have already been joined with `,` by the caller and
/// passed as the final element representing `__VA_ARGS__`.
pub fn substitute(mac: &Macro, args: &[String], mut expand: impl FnMut(&str) -> String) -> String {
    let mut lookup: HashMap<&str, ArgPair> = HashMap::new();
    for (i, name) in mac.params.iter().enumerate() {
        let raw = args.get(i).cloned().unwrap_or_default();
        let expanded = expand(&raw);
        lookup.insert(name.as_str(), ArgPair { raw, expanded });
    }
    if mac.variadic {
        let raw = args.get(mac.params.len()).cloned().unwrap_or_default();
        let expanded = expand(&raw);
        lookup.insert("__VA_ARGS__", ArgPair { raw, expanded });
    }

    let atoms = lex_body(&mac.body);
    let raw_form = |atom: &str| -> String {
        lookup.get(atom).map(|p| p.raw.clone()).unwrap_or_else(|| atom.to_string())
    };
    let expanded_form = |atom: &str| -> String {
        lookup.get(atom).map(|p| p.expanded.clone()).unwrap_or_else(|| atom.to_string())
    };

    let mut out = String::new();
    let mut idx = 0usize;
    while idx < atoms.len() {
        let atom = atoms[idx].as_str();

        if atom == "#" {
            let mut j = idx + 1;
            if atoms.get(j).map(|s| s.as_str()) == Some(" ") {
                j += 1;
            }
            if let Some(param) = atoms.get(j) {
                if lookup.contains_key(param.as_str()) {
                    out.push_str(&stringize(&raw_form(param)));
                    idx = j + 1;
                    continue;
                }
            }
            out.push('#');
            idx += 1;
            continue;
        }

        if atom == " " {
            out.push(' ');
            idx += 1;
            continue;
        }

        // Look ahead for a `##` chain starting at this atom.
        let mut chain = vec![idx];
        let mut pos = idx + 1;
        loop {
            let mut p = pos;
            if atoms.get(p).map(|s| s.as_str()) == Some(" ") {
                p += 1;
            }
            if atoms.get(p).map(|s| s.as_str()) == Some("##") {
                let mut next = p + 1;
                if atoms.get(next).map(|s| s.as_str()) == Some(" ") {
                    next += 1;
                }
                if next < atoms.len() {
                    chain.push(next);
                    pos = next + 1;
                    continue;
                }
            }
            break;
        }

        if chain.len() > 1 {
            let mut combined = String::new();
            for &atom_idx in &chain {
                combined.push_str(&raw_form(&atoms[atom_idx]));
            }
            out.push_str(&combined);
            idx = pos;
            continue;
        }

        if is_ident_atom(atom) && lookup.contains_key(atom) {
            out.push_str(&expanded_form(atom));
        } else {
            out.push_str(atom);
        }
        idx += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(params: &[&str], variadic: bool, body: &str) -> Macro {
        Macro {
            name: "M".into(),
            params: params.iter().map(|s| s.to_string()).collect(),
            variadic,
            object_like: false,
            body: body.to_string(),
        }
    }

    #[test]
    fn plain_parameter_uses_expanded_form() {
        let m = mac(&["x"], false, "((x)*(x))");
        let out = substitute(&m, &["a+1".to_string()], |s| s.to_string());
        assert_eq!(out, "((a+1)*(a+1))");
    }

    #[test]
    fn stringize_uses_raw_unexpanded_argument() {
        let m = mac(&["x"], false, "#x");
        let out = substitute(&m, &["a, b".to_string()], |s| format!("EXPANDED({s})"));
        assert_eq!(out, "\"a, b\"");
    }

    #[test]
    fn paste_concatenates_raw_operands() {
        let m = mac(&["a", "b"], false, "a ## b");
        let out = substitute(
            &m,
            &["foo".to_string(), "bar".to_string()],
            |s| format!("EXPANDED({s})"),
        );
        assert_eq!(out, "foobar");
    }

    #[test]
    fn variadic_joins_trailing_args() {
        let m = mac(&["fmt"], true, "printf(fmt, __VA_ARGS__)");
        let out = substitute(
            &m,
            &["\"%d\"".to_string(), "1, 2".to_string()],
            |s| s.to_string(),
        );
        assert_eq!(out, "printf(\"%d\", 1, 2)");
    }
}
