//! Ahead-of-time compiler for a pragmatic subset of C99 targeting x86
//! assembly: preprocessor, lexer, parser, semantic analysis and IR
//! construction, optimizer, register allocator, and code generator.
//!
//! Mirrors the teacher crate's shape: a thin `main.rs` delegates entirely to
//! library entry points, the pipeline never touches `std::env`/argv
//! directly, and every phase threads an explicit [`Session`] rather than
//! relying on process-wide state.

pub mod arena;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod ir;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod preprocessor;
pub mod regalloc;
pub mod sema;
pub mod session;
pub mod symbol;
pub mod token;
pub mod types;

use std::path::{Path, PathBuf};

pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, DiagnosticSink};
pub use session::Session;

use preprocessor::include::SearchPath;
use preprocessor::Preprocessor;

/// The outcome of running every phase up to and including code generation
/// for one translation unit.
#[derive(Debug)]
pub struct CompileOutput {
    pub assembly: String,
    pub session: Session,
}

fn search_path(session: &Session) -> SearchPath {
    let mut search = SearchPath::new();
    for dir in &session.config.include_dirs {
        search.push(dir.clone());
    }
    if let Some(root) = &session.config.vc_sysinclude {
        search.push(root.clone());
    }
    search
}

/// Runs only the preprocessor over in-memory source text, returning the
/// expanded text. Used by `--preprocess-only` (`-E`) so the CLI never has to
/// duplicate phase-ordering logic to stop early.
pub fn preprocess_source(config: CompilerConfig, source: &str, file_name: impl Into<PathBuf>) -> Result<(String, Session), Session> {
    let file_name = file_name.into();
    let mut session = Session::new(config);
    session.base_file = Some(file_name.clone());
    let search = search_path(&session);
    let preprocessed = {
        let mut pp = Preprocessor::new(&mut session, search);
        pp.process_main_file(&file_name)
    };
    match preprocessed {
        Some(text) if !session.has_errors() => Ok((text, session)),
        _ => Err(session),
    }
}

/// Runs preprocessing, lexing and parsing, returning the AST. Used by
/// `--dump-ast`.
pub fn parse_source(config: CompilerConfig, source: &str, file_name: impl Into<PathBuf>) -> Result<(ast::Ast, Session), Session> {
    let file_name = file_name.into();
    let (preprocessed, mut session) = preprocess_source(config, source, file_name.clone())?;
    let tokens = {
        let lexer = lexer::Lexer::new(&mut session, &preprocessed, file_name);
        lexer.tokenize()
    };
    if session.has_errors() {
        return Err(session);
    }
    let ast = {
        let parser = parser::Parser::new(&mut session, tokens);
        parser.parse()
    };
    if session.has_errors() {
        return Err(session);
    }
    Ok((ast, session))
}

/// Runs preprocessing and lexing only, returning the token stream. Used by
/// `--dump-tokens`.
pub fn tokens_source(config: CompilerConfig, source: &str, file_name: impl Into<PathBuf>) -> Result<(Vec<token::Token>, Session), Session> {
    let file_name = file_name.into();
    let (preprocessed, mut session) = preprocess_source(config, source, file_name.clone())?;
    let tokens = {
        let lexer = lexer::Lexer::new(&mut session, &preprocessed, file_name);
        lexer.tokenize()
    };
    if session.has_errors() {
        return Err(session);
    }
    Ok((tokens, session))
}

/// Runs the pipeline through IR construction and optimization, without
/// generating assembly. Used by `--dump-ir`.
pub fn ir_source(config: CompilerConfig, source: &str, file_name: impl Into<PathBuf>) -> Result<(ir::IrBuilder, Session), Session> {
    let (ast, mut session) = parse_source(config, source, file_name)?;
    let mut built = sema::lower_translation_unit(&mut session, ast);
    if session.has_errors() {
        return Err(session);
    }
    optimizer::optimize(&session, &mut built);
    Ok((built, session))
}

/// Runs the whole pipeline over in-memory source text, attributing
/// diagnostics to `file_name`. Returns `Err` once any phase records an
/// error; the returned `Session` carries every diagnostic produced before
/// the failure.
pub fn compile_source(config: CompilerConfig, source: &str, file_name: impl Into<PathBuf>) -> Result<CompileOutput, Session> {
    let (ir, session) = ir_source(config, source, file_name)?;
    let assembly = codegen::generate(&session.config, &ir);
    if session.has_errors() {
        return Err(session);
    }
    Ok(CompileOutput { assembly, session })
}

/// Reads `path` from disk and runs [`compile_source`] over its contents.
pub fn compile_file(config: CompilerConfig, path: &Path) -> Result<CompileOutput, Session> {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let mut session = Session::new(config);
            session.diagnostics.push(diagnostics::io_error(path, &e));
            return Err(session);
        }
    };
    compile_source(config, &source, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::CompilerConfig;

    #[test]
    fn compiles_a_trivial_return_statement() {
        let config = CompilerConfig::default();
        let result = compile_source(config, "int main(void) { return 1 + 2 * 3; }\n", "t.c");
        let output = result.unwrap_or_else(|s| panic!("{}", s.diagnostics.format_all(Some(false))));
        assert!(output.assembly.contains("main:"));
    }

    #[test]
    fn reports_a_parse_error_instead_of_panicking() {
        let config = CompilerConfig::default();
        let result = compile_source(config, "int main(void) { return ; }\n", "t.c");
        assert!(result.is_err());
    }
}
