//! Semantic analysis and AST-to-IR lowering (SPEC_FULL.md §4.4).

pub mod constexpr;
pub mod lower;

pub use lower::lower_translation_unit;
