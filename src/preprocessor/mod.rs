//! Tokenless, line-driven macro preprocessor (SPEC_FULL.md §4.1).
//!
//! Expansion is textual throughout: the preprocessor never builds a C token
//! stream. `Lexer` (src/lexer.rs) consumes the text this module produces.

pub mod condexpr;
pub mod include;
pub mod macros;
pub mod subst;

use crate::diagnostics::Kind;
use crate::session::Session;
use include::SearchPath;
use macros::{split_arguments, Macro, MacroTable};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
struct CondFrame {
    taking: bool,
    taken_any: bool,
    frozen: bool,
    saw_else: bool,
}

/// Preprocesses one translation unit into a single expanded text stream.
pub struct Preprocessor<'s> {
    session: &'s mut Session,
    macros: MacroTable,
    search: SearchPath,
    include_stack: Vec<PathBuf>,
    cond_stack: Vec<CondFrame>,
    pack_stack: Vec<u32>,
    pack_current: u32,
    current_function: String,
}

impl<'s> Preprocessor<'s> {
    pub fn new(session: &'s mut Session, search: SearchPath) -> Self {
        let mut macros = MacroTable::new();
        let defines = session.config.predefined_macros.clone();
        for entry in defines {
            match entry {
                crate::config::PredefinedMacro::Define { name, value } => {
                    let _ = macros.define(Macro {
                        name,
                        params: vec![],
                        variadic: false,
                        object_like: true,
                        body: value.unwrap_or_else(|| "1".to_string()),
                    });
                }
                crate::config::PredefinedMacro::Undefine { name } => {
                    macros.undef(&name);
                }
            }
        }
        Preprocessor {
            session,
            macros,
            search,
            include_stack: Vec::new(),
            cond_stack: Vec::new(),
            pack_stack: Vec::new(),
            pack_current: 0,
            current_function: String::new(),
        }
    }

    pub fn pack_alignment(&self) -> u32 {
        self.pack_current
    }

    fn is_active(&self) -> bool {
        self.cond_stack.iter().all(|f| f.taking)
    }

    /// Entry point: preprocesses `path` and every file it transitively
    /// includes into a single text stream.
    pub fn process_main_file(&mut self, path: &Path) -> Option<String> {
        self.session.base_file = Some(path.to_path_buf());
        let mut out = String::new();
        let ok = self.process_file(path, 0, &mut out);
        if ok {
            Some(out)
        } else {
            None
        }
    }

    fn process_file(&mut self, path: &Path, include_level: usize, out: &mut String) -> bool {
        if include_level > self.session.config.max_include_depth {
            self.session.diagnostics.error(
                Kind::Preprocess,
                path,
                0,
                0,
                format!(
                    "#include nested too deeply (max {})",
                    self.session.config.max_include_depth
                ),
            );
            return false;
        }

        let canonical = include::canonicalize(path).unwrap_or_else(|| path.to_path_buf());
        if self.include_stack.contains(&canonical) {
            self.session.diagnostics.error(
                Kind::Preprocess,
                path,
                0,
                0,
                format!("#include cycle detected: {}", path.display()),
            );
            return false;
        }
        if self.session.pragma_once_seen.contains(&canonical) {
            return true;
        }

        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                self.session
                    .diagnostics
                    .push(crate::diagnostics::io_error(path, &e));
                return false;
            }
        };
        if self.session.config.track_dependencies {
            self.session.dependencies.insert(canonical.clone());
        }
        if self.session.config.verbose_includes {
            eprintln!(". {}", path.display());
        }

        self.include_stack.push(canonical.clone());
        let lines = splice_and_split(&source);
        let mut line_no = 0usize;
        let mut ok = true;
        while line_no < lines.len() {
            let raw_line = &lines[line_no];
            let trimmed_start = raw_line.trim_start();
            if trimmed_start.starts_with('#') {
                let directive_text = trimmed_start[1..].trim_start();
                match self.handle_directive(directive_text, path, line_no, include_level, out) {
                    DirectiveOutcome::Continue => {}
                    DirectiveOutcome::Fatal => {
                        ok = false;
                        break;
                    }
                }
            } else if self.is_active() {
                let stripped = strip_line_comment(raw_line);
                let expanded = self.expand_text(&stripped, path, line_no);
                out.push_str(&expanded);
                out.push('\n');
            }
            line_no += 1;
        }
        self.include_stack.pop();

        if ok && !self.cond_stack.is_empty() {
            self.session.diagnostics.error(
                Kind::Preprocess,
                path,
                lines.len(),
                0,
                "unterminated #if at end of file",
            );
            ok = false;
        }
        ok
    }

    fn handle_directive(
        &mut self,
        text: &str,
        file: &Path,
        line: usize,
        include_level: usize,
        out: &mut String,
    ) -> DirectiveOutcome {
        let (keyword, rest) = split_first_word(text);
        let active = self.is_active();
        match keyword {
            "define" if active => self.do_define(rest, file, line),
            "undef" if active => {
                let (name, _) = split_first_word(rest);
                self.macros.undef(name);
            }
            "ifdef" => {
                let (name, _) = split_first_word(rest);
                let cond = active && (self.macros.is_defined(name) || is_builtin_name(name));
                self.push_cond(cond, active);
            }
            "ifndef" => {
                let (name, _) = split_first_word(rest);
                let cond = active && !(self.macros.is_defined(name) || is_builtin_name(name));
                self.push_cond(cond, active);
            }
            "if" => {
                let cond = if active {
                    self.eval_directive_expr(rest, file, line)
                } else {
                    false
                };
                self.push_cond(cond, active);
            }
            "elif" => {
                if let Some(frame) = self.cond_stack.last().copied() {
                    let parent_active = self.cond_stack[..self.cond_stack.len() - 1]
                        .iter()
                        .all(|f| f.taking);
                    let new_taking = if frame.frozen || frame.taken_any || !parent_active {
                        false
                    } else {
                        self.eval_directive_expr(rest, file, line)
                    };
                    let top = self.cond_stack.last_mut().unwrap();
                    top.taking = new_taking;
                    if new_taking {
                        top.taken_any = true;
                    }
                } else {
                    self.session
                        .diagnostics
                        .error(Kind::Preprocess, file, line, 0, "#elif without #if");
                    return DirectiveOutcome::Fatal;
                }
            }
            "else" => {
                if let Some(frame) = self.cond_stack.last_mut() {
                    if frame.saw_else {
                        self.session
                            .diagnostics
                            .error(Kind::Preprocess, file, line, 0, "#else after #else");
                        return DirectiveOutcome::Fatal;
                    }
                    frame.saw_else = true;
                    frame.taking = !frame.taken_any && !frame.frozen;
                    if frame.taking {
                        frame.taken_any = true;
                    }
                } else {
                    self.session
                        .diagnostics
                        .error(Kind::Preprocess, file, line, 0, "#else without #if");
                    return DirectiveOutcome::Fatal;
                }
            }
            "endif" => {
                if self.cond_stack.pop().is_none() {
                    self.session
                        .diagnostics
                        .error(Kind::Preprocess, file, line, 0, "#endif without #if");
                    return DirectiveOutcome::Fatal;
                }
            }
            "include" | "include_next" if active => {
                return self.do_include(rest, file, include_level, keyword == "include_next", out);
            }
            "line" if active => { /* accepted, line/column tracking best-effort */ }
            "error" if active => {
                self.session
                    .diagnostics
                    .error(Kind::Preprocess, file, line, 0, format!("#error {}", rest.trim()));
                return DirectiveOutcome::Fatal;
            }
            "warning" if active => {
                self.session
                    .diagnostics
                    .warning(Kind::Preprocess, file, line, 0, format!("#warning {}", rest.trim()));
            }
            "pragma" if active => self.do_pragma(rest, out),
            _ if active && keyword.starts_with("pragma") => {}
            _ => {}
        }
        DirectiveOutcome::Continue
    }

    fn push_cond(&mut self, taking: bool, parent_active: bool) {
        self.cond_stack.push(CondFrame {
            taking: taking && parent_active,
            taken_any: taking && parent_active,
            frozen: !parent_active,
            saw_else: false,
        });
    }

    fn eval_directive_expr(&mut self, expr_text: &str, file: &Path, line: usize) -> bool {
        let expanded = self.expand_text(expr_text, file, line);
        match condexpr::eval(&expanded, &self.macros, true) {
            Ok(v) => v != 0,
            Err(e) => {
                self.session.diagnostics.error(
                    Kind::Preprocess,
                    file,
                    line,
                    0,
                    format!("invalid #if expression: {:?}", e),
                );
                false
            }
        }
    }

    fn do_define(&mut self, rest: &str, file: &Path, line: usize) {
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_string();
        if name.is_empty() {
            self.session
                .diagnostics
                .error(Kind::Preprocess, file, line, 0, "malformed #define: missing macro name");
            return;
        }
        let after_name = &rest[name_end..];
        let (params, variadic, body) = if after_name.starts_with('(') {
            let close = match after_name.find(')') {
                Some(i) => i,
                None => {
                    self.session
                        .diagnostics
                        .error(Kind::Preprocess, file, line, 0, "malformed macro parameter list");
                    return;
                }
            };
            let param_text = &after_name[1..close];
            let mut variadic = false;
            let mut params = Vec::new();
            for p in param_text.split(',') {
                let p = p.trim();
                if p.is_empty() {
                    continue;
                }
                if p == "..." {
                    variadic = true;
                } else {
                    params.push(p.to_string());
                }
            }
            (params, variadic, after_name[close + 1..].trim_start().to_string())
        } else {
            (Vec::new(), false, after_name.trim_start().to_string())
        };
        let object_like = params.is_empty() && !after_name.starts_with('(') && !variadic;
        let m = Macro {
            name: name.clone(),
            params,
            variadic,
            object_like,
            body,
        };
        if let Err(msg) = self.macros.define(m) {
            self.session.diagnostics.error(Kind::Preprocess, file, line, 0, msg);
        }
    }

    fn do_pragma(&mut self, rest: &str, out: &mut String) {
        let rest = rest.trim();
        if rest == "once" {
            // Marked lazily: the *including* file's canonical path is
            // recorded once process_file finishes reading it successfully;
            // here we just note intent against the current top of stack.
            if let Some(top) = self.include_stack.last().cloned() {
                self.session.pragma_once_seen.insert(top);
            }
            return;
        }
        if let Some(inner) = rest.strip_prefix("pack").map(|s| s.trim()) {
            let inner = inner.trim_start_matches('(').trim_end_matches(')').trim();
            if inner.is_empty() {
                self.pack_current = 0;
            } else if inner == "pop" {
                self.pack_current = self.pack_stack.pop().unwrap_or(0);
            } else if let Some(arg) = inner.strip_prefix("push") {
                self.pack_stack.push(self.pack_current);
                let arg = arg.trim().trim_start_matches(',').trim();
                if !arg.is_empty() {
                    self.pack_current = arg.parse().unwrap_or(self.pack_current);
                }
            } else if let Ok(n) = inner.parse::<u32>() {
                self.pack_current = n;
            }
            out.push_str(&format!("#pragma pack {}\n", self.pack_current));
            return;
        }
        // Unknown pragma: warn and continue, per SPEC_FULL.md §4.1.
        self.session.diagnostics.warning(
            Kind::Preprocess,
            self.include_stack.last().cloned().unwrap_or_default(),
            0,
            0,
            format!("unknown pragma ignored: {rest}"),
        );
    }

    fn do_include(
        &mut self,
        rest: &str,
        file: &Path,
        include_level: usize,
        is_next: bool,
        out: &mut String,
    ) -> DirectiveOutcome {
        let expanded = self.expand_text(rest, file, include_level);
        let trimmed = expanded.trim();
        let (name, quoted) = if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            (inner.to_string(), true)
        } else if let Some(inner) = trimmed.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            (inner.to_string(), false)
        } else {
            self.session.diagnostics.error(
                Kind::Preprocess,
                file,
                0,
                0,
                format!("malformed #include directive: {trimmed}"),
            );
            return DirectiveOutcome::Fatal;
        };

        let resolved = if is_next {
            let idx = self.search.index_of_provider(file).unwrap_or(0);
            self.search.resolve_next(&name, idx)
        } else if quoted {
            self.search.resolve_quoted(&name, file)
        } else {
            self.search.resolve_angled(&name)
        };

        match resolved {
            Some(path) => {
                if !self.process_file(&path, include_level + 1, out) {
                    return DirectiveOutcome::Fatal;
                }
                DirectiveOutcome::Continue
            }
            None => {
                self.session.diagnostics.error(
                    Kind::Io,
                    file,
                    0,
                    0,
                    format!("{name}: no such file or directory"),
                );
                DirectiveOutcome::Fatal
            }
        }
    }

    /// Recursively expands macros and builtins in `text`. Fresh
    /// "in-progress" set per top-level call, per the in-progress macro set
    /// invariant (SPEC_FULL.md Glossary / §8 termination property).
    fn expand_text(&mut self, text: &str, file: &Path, line: usize) -> String {
        let mut in_progress = HashSet::new();
        self.expand_inner(text, file, line, &mut in_progress)
    }

    fn expand_inner(
        &mut self,
        text: &str,
        file: &Path,
        line: usize,
        in_progress: &mut HashSet<String>,
    ) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
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
                out.extend(&chars[start..i]);
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();

                if let Some(builtin) = self.expand_builtin(&ident, file, line) {
                    out.push_str(&builtin);
                    continue;
                }

                if in_progress.contains(&ident) {
                    out.push_str(&ident);
                    continue;
                }

                let Some(found) = self.macros.get(&ident).cloned() else {
                    out.push_str(&ident);
                    continue;
                };

                if found.object_like {
                    let mut next_in_progress = in_progress.clone();
                    next_in_progress.insert(ident.clone());
                    let expanded = self.expand_inner(&found.body, file, line, &mut next_in_progress);
                    out.push_str(&expanded);
                    continue;
                }

                // Function-like: only expands if a `(` follows (scanning
                // through whitespace, matching SPEC_FULL.md §4.1).
                let rest: String = chars[i..].iter().collect();
                if let Some((args_text, consumed)) = macros::scan_call_parens(&rest, 0) {
                    let args = split_arguments(&args_text);
                    let min_required = found.params.len();
                    let arity_ok = if found.variadic {
                        args.len() >= min_required
                    } else {
                        args.len() == min_required || (min_required == 0 && args_text.trim().is_empty() && args.is_empty())
                    };
                    if !arity_ok {
                        self.session.diagnostics.error(
                            Kind::Preprocess,
                            file,
                            line,
                            0,
                            format!(
                                "macro \"{}\" requires {} argument(s), {} given",
                                ident,
                                min_required,
                                args.len()
                            ),
                        );
                        out.push_str(&ident);
                        continue;
                    }
                    let args = normalize_variadic_args(&found, args);
                    let mut next_in_progress = in_progress.clone();
                    next_in_progress.insert(ident.clone());
                    let mut expand_arg = |raw: &str| -> String {
                        // args are expanded independently of the enclosing
                        // in-progress set (fresh recursion), matching GCC's
                        // argument-prescan semantics closely enough for this
                        // implementation's goals.
                        let mut scratch = HashSet::new();
                        Self::expand_inner_static(raw, &mut scratch, &self.macros)
                    };
                    let substituted = subst::substitute(&found, &args, &mut expand_arg);
                    let expanded = self.expand_inner(&substituted, file, line, &mut next_in_progress);
                    out.push_str(&expanded);
                    i += rest[..consumed].chars().count();
                    continue;
                }

                out.push_str(&ident);
                continue;
            }
            out.push(c);
            i += 1;
        }
        out
    }

    /// Helper used for the (non-recursive-method) argument pre-expansion
    /// closure above, since `self` is already mutably borrowed.
    fn expand_inner_static(text: &str, in_progress: &mut HashSet<String>, macros: &MacroTable) -> String {
        // A reduced expander used only for macro arguments: object-like
        // macros and builtins unavailable here expand fully; function-like
        // calls within an argument are still honored via the same table.
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if in_progress.contains(&ident) {
                    out.push_str(&ident);
                    continue;
                }
                if let Some(found) = macros.get(&ident).cloned() {
                    if found.object_like {
                        let mut next = in_progress.clone();
                        next.insert(ident.clone());
                        out.push_str(&Self::expand_inner_static(&found.body, &mut next, macros));
                        continue;
                    }
                    let rest: String = chars[i..].iter().collect();
                    if let Some((args_text, consumed)) = macros::scan_call_parens(&rest, 0) {
                        let args = split_arguments(&args_text);
                        let args = normalize_variadic_args(&found, args);
                        let mut next = in_progress.clone();
                        next.insert(ident.clone());
                        let mut expand_arg = |raw: &str| -> String {
                            let mut s = HashSet::new();
                            Self::expand_inner_static(raw, &mut s, macros)
                        };
                        let substituted = subst::substitute(&found, &args, &mut expand_arg);
                        out.push_str(&Self::expand_inner_static(&substituted, &mut next, macros));
                        i += rest[..consumed].chars().count();
                        continue;
                    }
                }
                out.push_str(&ident);
                continue;
            }
            out.push(c);
            i += 1;
        }
        out
    }

    fn expand_builtin(&mut self, ident: &str, file: &Path, line: usize) -> Option<String> {
        Some(match ident {
            "__FILE__" => format!("\"{}\"", file.display()),
            "__LINE__" => (line + 1).to_string(),
            "__DATE__" => "\"Jan  1 1970\"".to_string(),
            "__TIME__" => "\"00:00:00\"".to_string(),
            "__STDC__" => "1".to_string(),
            "__STDC_VERSION__" => "199901L".to_string(),
            "__func__" => format!("\"{}\"", self.current_function),
            "__BASE_FILE__" => format!(
                "\"{}\"",
                self.session
                    .base_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            "__COUNTER__" => match self.session.counters.bump_builtin_counter() {
                Some(v) => v.to_string(),
                None => {
                    self.session
                        .diagnostics
                        .error(Kind::Preprocess, file, line, 0, "__COUNTER__ overflow");
                    "0".to_string()
                }
            },
            "__INCLUDE_LEVEL__" => self.include_stack.len().saturating_sub(1).to_string(),
            _ => return None,
        })
    }
}

enum DirectiveOutcome {
    Continue,
    Fatal,
}

/// Joins trailing variadic arguments with `,` into a single pseudo-argument
/// so `subst::substitute` sees exactly `params.len() + variadic` entries.
fn normalize_variadic_args(mac: &Macro, args: Vec<String>) -> Vec<String> {
    if !mac.variadic {
        return args;
    }
    let fixed = mac.params.len();
    if args.len() <= fixed {
        let mut args = args;
        args.resize(fixed + 1, String::new());
        return args;
    }
    let mut out: Vec<String> = args[..fixed].to_vec();
    out.push(args[fixed..].join(", "));
    out
}

/// Names `expand_builtin` recognizes, so `#ifdef`/`#ifndef` see them as
/// defined even though they never occupy a slot in the macro table.
fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "__FILE__"
            | "__LINE__"
            | "__DATE__"
            | "__TIME__"
            | "__STDC__"
            | "__STDC_VERSION__"
            | "__func__"
            | "__BASE_FILE__"
            | "__COUNTER__"
            | "__INCLUDE_LEVEL__"
    )
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(|c: char| c.is_whitespace()) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Strips a trailing `//` line comment and any `/* ... */` block comments
/// contained entirely within a single logical line, honoring string/char
/// literal boundaries. Multi-line block comments are handled by the caller
/// collapsing their body to whitespace during line splicing (see
/// `splice_and_split`).
fn strip_line_comment(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    let mut in_string: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            in_string = Some(c);
            out.push(c);
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            break;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            if let Some(end) = line[i..].find("*/") {
                i += end + 2;
                out.push(' ');
                continue;
            } else {
                // Unterminated on this line; caller already joined
                // multi-line block comments during splicing, so this is
                // genuinely unterminated at EOF.
                break;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Splices backslash-newline continuations and folds multi-line `/* */`
/// comments into whitespace so every element of the returned vector is one
/// logical line available to the directive/expansion pass.
fn splice_and_split(source: &str) -> Vec<String> {
    let spliced = source.replace("\\\r\n", "").replace("\\\n", "");
    let mut lines: Vec<String> = Vec::new();
    let mut in_block_comment = false;
    for raw in spliced.lines() {
        if in_block_comment {
            if let Some(end) = raw.find("*/") {
                lines.push(" ".to_string() + &raw[end + 2..]);
                in_block_comment = false;
            } else {
                lines.push(String::new());
            }
            continue;
        }
        // Detect a block comment opening without a close on the same
        // physical line, being careful not to match `/*` inside a string.
        if let Some(open) = find_unquoted(raw, "/*") {
            if find_unquoted(&raw[open + 2..], "*/").is_none() {
                lines.push(raw[..open].to_string());
                in_block_comment = true;
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

fn find_unquoted(s: &str, needle: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                in_string = None;
            }
            i += 1;
            continue;
        }
        if c == b'"' || c == b'\'' {
            in_string = Some(c);
            i += 1;
            continue;
        }
        if s[i..].starts_with(needle) {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    fn run(source: &str) -> (String, bool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.c");
        std::fs::write(&path, source).unwrap();
        let mut session = Session::new(CompilerConfig::default());
        let mut pp = Preprocessor::new(&mut session, SearchPath::new());
        let out = pp.process_main_file(&path);
        (out.unwrap_or_default(), !session.has_errors())
    }

    #[test]
    fn object_like_macro_expands() {
        let (out, ok) = run("#define N 42\nint x = N;\n");
        assert!(ok);
        assert!(out.contains("int x = 42;"));
    }

    #[test]
    fn function_like_macro_with_nested_parens() {
        let (out, ok) = run("#define SQ(x) ((x)*(x))\nint f(int a){return SQ(a+1);}\n");
        assert!(ok);
        assert!(out.contains("((a+1)*(a+1))"));
    }

    #[test]
    fn stringize_directive_example() {
        let (out, ok) = run("#define STR(x) #x\nchar *s=STR(a, b);\n");
        assert!(ok);
        assert!(out.contains("s=\"a, b\";"));
    }

    #[test]
    fn conditional_compilation_elides_inactive_branch() {
        let (out, ok) = run("#if 0\nint dead;\n#else\nint alive;\n#endif\n");
        assert!(ok);
        assert!(!out.contains("dead"));
        assert!(out.contains("alive"));
    }

    #[test]
    fn ifdef_and_undef() {
        let (out, ok) = run("#define A\n#ifdef A\nint a;\n#endif\n#undef A\n#ifdef A\nint b;\n#endif\n");
        assert!(ok);
        assert!(out.contains("int a;"));
        assert!(!out.contains("int b;"));
    }

    #[test]
    fn self_referential_macro_terminates() {
        let (out, ok) = run("#define X X + 1\nint y = X;\n");
        assert!(ok);
        assert!(out.contains("y = X + 1;"));
    }

    #[test]
    fn redefinition_with_same_body_is_silent() {
        let (_, ok) = run("#define N 1\n#define N 1\nint x;\n");
        assert!(ok);
    }

    #[test]
    fn incompatible_redefinition_is_an_error() {
        let (_, ok) = run("#define N 1\n#define N 2\nint x;\n");
        assert!(!ok);
    }

    #[test]
    fn line_and_counter_builtins() {
        let (out, ok) = run("int a = __LINE__;\nint b = __COUNTER__;\nint c = __COUNTER__;\n");
        assert!(ok);
        assert!(out.contains("int a = 1;"));
        assert!(out.contains("int b = 0;"));
        assert!(out.contains("int c = 1;"));
    }

    #[test]
    fn block_comment_spanning_lines_is_elided() {
        let (out, ok) = run("int a /* comment\nspans lines */ = 1;\n");
        assert!(ok);
        assert!(out.contains("int a") && out.contains("= 1;"));
        assert!(!out.contains("spans"));
    }
}
