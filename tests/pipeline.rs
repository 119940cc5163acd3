//! End-to-end pipeline scenarios exercising `vc`'s public library entry
//! points from raw source text through assembly, one per pipeline stage
//! this crate is expected to get right (SPEC_FULL.md §8).

use vc::config::{CompilerConfig, OptimizationLevel};
use vc::ir::Op;
use vc::{compile_source, ir_source, preprocess_source};

fn op_count(ir: &vc::ir::IrBuilder, op: Op) -> usize {
    ir.instructions.iter().filter(|i| i.op == op).count()
}

#[test]
fn folds_a_constant_arithmetic_return_into_a_single_mov() {
    let config = CompilerConfig::new().with_optimization(OptimizationLevel::O1);
    let result = compile_source(config, "int main(void) { return 1 + 2 * 3; }\n", "t.c");
    let output = result.unwrap_or_else(|s| panic!("{}", s.diagnostics.format_all(Some(false))));

    let main_body: String = output
        .assembly
        .lines()
        .skip_while(|l| !l.starts_with("main:"))
        .take_while(|l| !l.trim_end().ends_with("ret"))
        .collect::<Vec<_>>()
        .join("\n");
    assert!(main_body.contains("7"), "expected a folded literal 7 in:\n{main_body}");
    assert!(!main_body.contains("imul") && !main_body.contains("mul"), "multiplication should have been folded away:\n{main_body}");
}

#[test]
fn object_like_and_function_like_macros_expand_before_lexing() {
    let config = CompilerConfig::new();
    let (expanded, _) = preprocess_source(
        config,
        "#define SQ(x) ((x)*(x))\nint f(int a){return SQ(a+1);}\n",
        "t.c",
    )
    .unwrap();
    assert!(expanded.contains("((a+1)*(a+1))"));

    let config = CompilerConfig::new();
    let (ir, _) = ir_source(config, "#define SQ(x) ((x)*(x))\nint f(int a){return SQ(a+1);}\n", "t.c").unwrap();
    assert_eq!(op_count(&ir, Op::Add), 1);
    assert_eq!(op_count(&ir, Op::Mul), 1);
    let mul = ir.instructions.iter().find(|i| i.op == Op::Mul).unwrap();
    let ret = ir.instructions.iter().find(|i| i.op == Op::Return).unwrap();
    assert_eq!(mul.dest, ret.src1);
}

#[test]
fn stringize_joins_a_multi_argument_call_into_one_string_literal() {
    let config = CompilerConfig::new();
    let (expanded, _) = preprocess_source(config, "#define STR(x) #x\nchar *s=STR(a, b);\n", "t.c").unwrap();
    assert!(expanded.contains("s=\"a, b\";"));

    let config = CompilerConfig::new();
    let (ir, _) = ir_source(config, "#define STR(x) #x\nchar *s=STR(a, b);\n", "t.c").unwrap();
    assert_eq!(op_count(&ir, Op::GlobString), 1);
    let glob = ir.instructions.iter().find(|i| i.op == Op::GlobString).unwrap();
    let data = glob.data.as_ref().unwrap();
    assert_eq!(&data[..data.len() - 1], b"a, b");
}

#[test]
fn enumerator_after_an_explicit_gap_continues_from_it() {
    let config = CompilerConfig::new();
    let (ir, _) = ir_source(config, "enum{A=1,B,C=5,D}; int x=D;\n", "t.c").unwrap();
    let store = ir.instructions.iter().find(|i| i.op == Op::Store && i.name.as_deref() == Some("x")).unwrap();
    let value = ir.instructions.iter().find(|i| i.dest == store.src1).unwrap();
    assert_eq!(value.op, Op::Const);
    assert_eq!(value.imm, 6);
}

#[test]
fn switch_with_a_default_lowers_to_paired_compares_and_a_fallthrough_branch() {
    let config = CompilerConfig::new();
    let src = "int f(int x){switch(x){case 1:return 1;case 2:return 2;default:return 0;}}\n";
    let (ir, _) = ir_source(config, src, "t.c").unwrap();

    assert_eq!(op_count(&ir, Op::CmpEq), 2);
    assert_eq!(op_count(&ir, Op::BCond), 2);
    assert!(op_count(&ir, Op::Br) >= 1);
    assert_eq!(op_count(&ir, Op::Return), 3);
}

#[test]
fn an_inlined_two_parameter_call_site_loses_its_arg_and_call_instructions() {
    let config = CompilerConfig::new().with_optimization(OptimizationLevel::O3);
    let src = "inline int add(int a,int b){return a+b;}\nint main(void){return add(3,4);}\n";
    let (ir, _) = ir_source(config, src, "t.c").unwrap();

    assert_eq!(op_count(&ir, Op::Call), 0);
    assert_eq!(op_count(&ir, Op::CallNr), 0);
    assert_eq!(op_count(&ir, Op::Arg), 0);

    let main_start = ir
        .instructions
        .iter()
        .position(|i| i.op == Op::FuncBegin && i.name.as_deref() == Some("main"))
        .unwrap();
    let adds_in_main = ir.instructions[main_start..]
        .iter()
        .take_while(|i| i.op != Op::FuncEnd)
        .filter(|i| i.op == Op::Add)
        .count();
    assert_eq!(adds_in_main, 1);
}

#[test]
fn a_diagnosed_parse_error_never_panics_and_carries_a_message() {
    let config = CompilerConfig::new();
    let result = compile_source(config, "int main(void) { return ; }\n", "t.c");
    let session = result.unwrap_err();
    assert!(session.has_errors());
    assert!(!session.diagnostics.format_all(Some(false)).is_empty());
}
