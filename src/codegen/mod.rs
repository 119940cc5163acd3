//! Code generator (SPEC_FULL.md §4.7): walks the optimized, register-allocated
//! IR once and renders x86 assembly text, selecting 32-bit/64-bit addressing
//! and AT&T/Intel syntax from `CompilerConfig`.

mod emit;
mod globals;
mod prologue;
mod x86;

use crate::config::{CompilerConfig, Syntax};
use crate::ir::IrBuilder;
use crate::regalloc::function_spans;

/// Renders a full translation unit's IR to assembly text: a `.data` section
/// for every global, followed by a `.text` section with one label block per
/// function in source order.
pub fn generate(config: &CompilerConfig, ir: &IrBuilder) -> String {
    let mut out = String::new();
    if let Syntax::Intel = config.syntax {
        out.push_str(".intel_syntax noprefix\n");
    }
    out.push_str(&globals::emit_globals(ir, config.target.word_size()));
    out.push_str(".text\n");
    for (begin, end) in function_spans(ir) {
        let name = ir.instructions[begin].name.clone().unwrap_or_default();
        out.push_str(&format!(".globl {name}\n"));
        out.push_str(&emit::emit_function(config, ir, begin, end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use crate::ir::Op;
    use crate::types::Type;

    fn int() -> Type {
        Type::Int { unsigned: false }
    }

    #[test]
    fn generate_emits_one_label_per_function() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("main", false, 0, 0);
        let c = ir.emit_const(7, int(), 0, 0);
        ir.emit_return(Some(c), int(), 0, 0);
        ir.emit_func_end(0, 0);

        let config = CompilerConfig::default();
        let text = generate(&config, &ir);
        assert!(text.contains("main:"));
        assert!(text.contains(".text"));
        assert!(text.contains("ret"));
    }

    #[test]
    fn generate_places_globals_before_text() {
        let mut ir = IrBuilder::new();
        ir.emit_glob_data(Op::GlobString, "Lstr0", b"hi\0".to_vec(), Type::Char { unsigned: false }, 0, 0);
        ir.emit_func_begin("main", false, 0, 0);
        ir.emit_return(None, Type::Void, 0, 0);
        ir.emit_func_end(0, 0);

        let config = CompilerConfig::default();
        let text = generate(&config, &ir);
        let data_pos = text.find(".data").unwrap();
        let text_pos = text.find(".text").unwrap();
        assert!(data_pos < text_pos);
    }

    #[test]
    fn complex_multiplication_emits_the_four_multiply_formula() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let cplx = Type::DoubleComplex;
        let a = ir.emit_cplx_const(vec![0u8; 16], cplx.clone(), 0, 0);
        let b = ir.emit_cplx_const(vec![0u8; 16], cplx.clone(), 0, 0);
        let r = ir.emit_binary(Op::CplxMul, a, b, cplx.clone(), 0, 0);
        ir.emit_return(Some(r), cplx, 0, 0);
        ir.emit_func_end(0, 0);

        let config = CompilerConfig::default();
        let text = generate(&config, &ir);
        assert!(text.contains("mulsd"));
        assert!(text.contains("subsd"));
        assert!(text.contains("addsd"));
    }

    #[test]
    fn intel_syntax_prefixes_the_output() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        ir.emit_return(None, Type::Void, 0, 0);
        ir.emit_func_end(0, 0);

        let mut config = CompilerConfig::default();
        config.target = Target::X86_64;
        config.syntax = Syntax::Intel;
        let text = generate(&config, &ir);
        assert!(text.starts_with(".intel_syntax noprefix"));
    }
}
