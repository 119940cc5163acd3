//! Compile request configuration.
//!
//! Mirrors the teacher's `CompilerConfig` builder (`with_builtin`,
//! `with_library`, …): a plain data record built with chained `with_*`
//! methods, consumed by the library entry points. The CLI (`main.rs`) is the
//! only thing that constructs one from `std::env`/`clap`; the core pipeline
//! never reads the environment or argv directly.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
    O3,
}

impl OptimizationLevel {
    pub fn from_flag(n: u8) -> Self {
        match n {
            0 => OptimizationLevel::O0,
            1 => OptimizationLevel::O1,
            2 => OptimizationLevel::O2,
            _ => OptimizationLevel::O3,
        }
    }

    pub fn fold_enabled(self) -> bool {
        self >= OptimizationLevel::O1
    }
    pub fn dce_enabled(self) -> bool {
        self >= OptimizationLevel::O1
    }
    pub fn cprop_enabled(self) -> bool {
        self >= OptimizationLevel::O2
    }
    pub fn unreachable_enabled(self) -> bool {
        self >= OptimizationLevel::O2
    }
    pub fn inline_enabled(self) -> bool {
        self >= OptimizationLevel::O3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    X86_32,
    X86_64,
}

impl Target {
    pub fn word_size(self) -> u32 {
        match self {
            Target::X86_32 => 4,
            Target::X86_64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Att,
    Intel,
}

/// A single `-D name[=value]` / `-U name` entry, applied in command-line order.
#[derive(Debug, Clone)]
pub enum PredefinedMacro {
    Define { name: String, value: Option<String> },
    Undefine { name: String },
}

/// Per-pass optimizer toggles, individually overridable via `--no-{fold,dce,cprop,inline,...}`
/// independent of the blanket `-O` level.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerToggles {
    pub fold: bool,
    pub dce: bool,
    pub cprop: bool,
    pub inlining: bool,
    pub unreachable: bool,
}

impl OptimizerToggles {
    pub fn from_level(level: OptimizationLevel) -> Self {
        OptimizerToggles {
            fold: level.fold_enabled(),
            dce: level.dce_enabled(),
            cprop: level.cprop_enabled(),
            inlining: level.inline_enabled(),
            unreachable: level.unreachable_enabled(),
        }
    }
}

/// A fully resolved compile request: everything a pipeline run needs, with
/// no further lookups into the environment.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub include_dirs: Vec<PathBuf>,
    pub predefined_macros: Vec<PredefinedMacro>,
    pub optimization: OptimizationLevel,
    pub optimizer_toggles: OptimizerToggles,
    pub target: Target,
    pub syntax: Syntax,
    pub max_include_depth: usize,
    pub track_dependencies: bool,
    pub verbose_includes: bool,
    pub named_locals: bool,
    pub color: Option<bool>,
    pub sysroot: Option<PathBuf>,
    pub vc_sysinclude: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            include_dirs: Vec::new(),
            predefined_macros: Vec::new(),
            optimization: OptimizationLevel::O0,
            optimizer_toggles: OptimizerToggles::from_level(OptimizationLevel::O0),
            target: Target::X86_64,
            syntax: Syntax::Att,
            max_include_depth: 1024,
            track_dependencies: false,
            verbose_includes: false,
            named_locals: false,
            color: None,
            sysroot: None,
            vc_sysinclude: None,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.predefined_macros.push(PredefinedMacro::Define {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_undefine(mut self, name: impl Into<String>) -> Self {
        self.predefined_macros
            .push(PredefinedMacro::Undefine { name: name.into() });
        self
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization = level;
        self.optimizer_toggles = OptimizerToggles::from_level(level);
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimization_level_enables_expected_passes() {
        assert!(!OptimizationLevel::O0.fold_enabled());
        assert!(OptimizationLevel::O1.fold_enabled());
        assert!(!OptimizationLevel::O1.cprop_enabled());
        assert!(OptimizationLevel::O2.cprop_enabled());
        assert!(!OptimizationLevel::O2.inline_enabled());
        assert!(OptimizationLevel::O3.inline_enabled());
    }

    #[test]
    fn config_builder_accumulates_defines() {
        let config = CompilerConfig::new()
            .with_define("FOO", Some("1".to_string()))
            .with_define("BAR", None)
            .with_include_dir("/usr/include");

        assert_eq!(config.predefined_macros.len(), 2);
        assert_eq!(config.include_dirs, vec![PathBuf::from("/usr/include")]);
    }

    #[test]
    fn from_flag_clamps_above_three() {
        assert_eq!(OptimizationLevel::from_flag(9), OptimizationLevel::O3);
    }
}
