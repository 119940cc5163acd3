//! The fixed-order optimizer pipeline (SPEC_FULL.md §4.5): constant folding,
//! constant propagation, dead-code elimination, inline expansion, and
//! unreachable-block elimination, each independently gated by
//! `OptimizerToggles` and run at most once in that order. Every pass
//! preserves the IR invariants of §3 and is idempotent on its own.

use crate::ir::{Instruction, IrBuilder, Op, ValueId};
use crate::session::Session;
use std::collections::{HashMap, HashSet};

pub fn optimize(session: &Session, ir: &mut IrBuilder) {
    let toggles = session.config.optimizer_toggles;
    let word_size = session.config.target.word_size();
    if toggles.fold {
        fold_constants(ir, word_size);
    }
    if toggles.cprop {
        propagate_constants(ir);
    }
    if toggles.dce {
        eliminate_dead_code(ir);
    }
    if toggles.inlining {
        inline_expand(ir, &session.inline_candidates);
    }
    if toggles.unreachable {
        eliminate_unreachable(ir);
    }
}

fn is_compare(op: Op) -> bool {
    matches!(op, Op::CmpEq | Op::CmpNe | Op::CmpLt | Op::CmpGt | Op::CmpLe | Op::CmpGe)
}

fn is_arithmetic_binary(op: Op) -> bool {
    matches!(
        op,
        Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Shl
            | Op::Shr
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::FAdd
            | Op::FSub
            | Op::FMul
            | Op::FDiv
            | Op::LfAdd
            | Op::LfSub
            | Op::LfMul
            | Op::LfDiv
    ) || is_compare(op)
}

/// Truncates a wrapped i64 result to the byte width a target type actually
/// stores, matching two's-complement for signed and modular for unsigned.
fn mask_to_width(value: i64, bytes: u32, unsigned: bool) -> i64 {
    match bytes {
        1 if unsigned => value as u8 as i64,
        1 => value as i8 as i64,
        2 if unsigned => value as u16 as i64,
        2 => value as i16 as i64,
        4 if unsigned => value as u32 as i64,
        4 => value as i32 as i64,
        _ => value,
    }
}

fn fold_int_binary(op: Op, a: i64, b: i64, unsigned: bool) -> Option<i64> {
    match op {
        Op::Add => Some(a.wrapping_add(b)),
        Op::Sub => Some(a.wrapping_sub(b)),
        Op::Mul => Some(a.wrapping_mul(b)),
        Op::Div if b == 0 => None,
        Op::Div if unsigned => Some((a as u64).wrapping_div(b as u64) as i64),
        Op::Div => Some(a.wrapping_div(b)),
        Op::Mod if b == 0 => None,
        Op::Mod if unsigned => Some((a as u64).wrapping_rem(b as u64) as i64),
        Op::Mod => Some(a.wrapping_rem(b)),
        Op::Shl => Some(a.wrapping_shl(b as u32)),
        Op::Shr if unsigned => Some(((a as u64) >> (b as u32 & 63)) as i64),
        Op::Shr => Some(a >> (b & 63)),
        Op::And => Some(a & b),
        Op::Or => Some(a | b),
        Op::Xor => Some(a ^ b),
        Op::CmpEq => Some((a == b) as i64),
        Op::CmpNe => Some((a != b) as i64),
        Op::CmpLt if unsigned => Some(((a as u64) < (b as u64)) as i64),
        Op::CmpLt => Some((a < b) as i64),
        Op::CmpGt if unsigned => Some(((a as u64) > (b as u64)) as i64),
        Op::CmpGt => Some((a > b) as i64),
        Op::CmpLe if unsigned => Some(((a as u64) <= (b as u64)) as i64),
        Op::CmpLe => Some((a <= b) as i64),
        Op::CmpGe if unsigned => Some(((a as u64) >= (b as u64)) as i64),
        Op::CmpGe => Some((a >= b) as i64),
        _ => None,
    }
}

/// Pass 1: replaces any integer binary/compare op whose operands are both
/// `CONST` with a single `CONST`, wrapping per the instruction's own type.
/// Float, double, long-double and complex arithmetic are left untouched —
/// their constant materialization is a code generator concern (SPEC_FULL.md
/// §4.7), not folded here.
fn fold_constants(ir: &mut IrBuilder, word_size: u32) {
    let mut consts: HashMap<ValueId, i64> = HashMap::new();
    for idx in 0..ir.instructions.len() {
        let op = ir.instructions[idx].op;
        if op == Op::Const {
            consts.insert(ir.instructions[idx].dest, ir.instructions[idx].imm);
            continue;
        }
        let src1 = ir.instructions[idx].src1;
        let src2 = ir.instructions[idx].src2;
        let (a, b) = match (consts.get(&src1).copied(), consts.get(&src2).copied()) {
            (Some(a), Some(b)) => (a, b),
            _ => continue,
        };
        let cmp = is_compare(op);
        let ty = ir.instructions[idx].ty.clone();
        if !ty.is_integer() && !cmp {
            continue;
        }
        let unsigned = ty.is_unsigned();
        let folded = match fold_int_binary(op, a, b, unsigned) {
            Some(v) => v,
            None => continue,
        };
        let (mask_bytes, mask_unsigned) = if cmp { (4, false) } else { (ty.size_of(word_size), unsigned) };
        let result = mask_to_width(folded, mask_bytes, mask_unsigned);
        let dest = ir.instructions[idx].dest;
        {
            let instr = &mut ir.instructions[idx];
            instr.op = Op::Const;
            instr.imm = result;
            instr.src1 = 0;
            instr.src2 = 0;
        }
        consts.insert(dest, result);
    }
}

/// Pass 2: forwards a known constant through a `STORE` into every `LOAD` of
/// the same name that precedes any instruction which could invalidate it
/// (a write through an unrelated pointer, a call, or the name's address
/// being taken). Each forwarded `LOAD` becomes a `CONST`, leaving its
/// original defining `CONST`/`STORE` pair as dead-code-elimination bait.
fn propagate_constants(ir: &mut IrBuilder) {
    let mut value_consts: HashMap<ValueId, i64> = HashMap::new();
    let mut slot_consts: HashMap<String, i64> = HashMap::new();
    for idx in 0..ir.instructions.len() {
        let op = ir.instructions[idx].op;
        match op {
            Op::Const => {
                value_consts.insert(ir.instructions[idx].dest, ir.instructions[idx].imm);
            }
            Op::FuncBegin => {
                slot_consts.clear();
            }
            Op::Store => {
                let name = ir.instructions[idx].name.clone();
                let src1 = ir.instructions[idx].src1;
                if let Some(name) = name {
                    match value_consts.get(&src1).copied() {
                        Some(c) => {
                            slot_consts.insert(name, c);
                        }
                        None => {
                            slot_consts.remove(&name);
                        }
                    }
                }
            }
            Op::Load => {
                let name = ir.instructions[idx].name.clone();
                if let Some(name) = name {
                    if let Some(c) = slot_consts.get(&name).copied() {
                        let dest = ir.instructions[idx].dest;
                        {
                            let instr = &mut ir.instructions[idx];
                            instr.op = Op::Const;
                            instr.imm = c;
                            instr.name = None;
                        }
                        value_consts.insert(dest, c);
                    }
                }
            }
            Op::Addr | Op::Call | Op::CallNr | Op::CallPtr | Op::CallPtrNr | Op::StorePtr | Op::Alloca => {
                slot_consts.clear();
            }
            _ => {}
        }
    }
}

/// Pass 3: drops any instruction with a destination, no side effects, and no
/// remaining reader. Runs to a fixpoint since removing one dead definition
/// can strand the instruction that fed it.
fn eliminate_dead_code(ir: &mut IrBuilder) {
    loop {
        let mut used: HashSet<ValueId> = HashSet::new();
        for instr in &ir.instructions {
            if instr.src1 != 0 {
                used.insert(instr.src1);
            }
            if instr.src2 != 0 {
                used.insert(instr.src2);
            }
            // StoreIdx has no destination of its own; its `dest` field
            // carries the stored value instead, which is a use.
            if instr.op == Op::StoreIdx && instr.dest != 0 {
                used.insert(instr.dest);
            }
        }
        let before = ir.instructions.len();
        ir.instructions.retain(|instr| {
            if instr.op.has_side_effects() || instr.dest == 0 {
                return true;
            }
            used.contains(&instr.dest)
        });
        if ir.instructions.len() == before {
            break;
        }
    }
}

struct Template {
    op: Op,
}

/// Recognizes functions in `candidates` whose body is exactly
/// `LOAD_PARAM 0`, `LOAD_PARAM 1`, one arithmetic op over those two values,
/// `RETURN` — the only shape the inliner is willing to substitute.
fn collect_templates(ir: &IrBuilder, candidates: &HashSet<String>) -> HashMap<String, Template> {
    let mut templates = HashMap::new();
    let instrs = &ir.instructions;
    for i in 0..instrs.len() {
        if instrs[i].op != Op::FuncBegin {
            continue;
        }
        let name = match &instrs[i].name {
            Some(n) if candidates.contains(n) => n.clone(),
            _ => continue,
        };
        if i + 5 >= instrs.len() {
            continue;
        }
        let p0 = &instrs[i + 1];
        let p1 = &instrs[i + 2];
        let arith = &instrs[i + 3];
        let ret = &instrs[i + 4];
        let end = &instrs[i + 5];
        let matches_shape = p0.op == Op::LoadParam
            && p0.imm == 0
            && p1.op == Op::LoadParam
            && p1.imm == 1
            && is_arithmetic_binary(arith.op)
            && ((arith.src1 == p0.dest && arith.src2 == p1.dest) || (arith.src1 == p1.dest && arith.src2 == p0.dest))
            && ret.op == Op::Return
            && ret.src1 == arith.dest
            && end.op == Op::FuncEnd;
        if matches_shape {
            templates.insert(name, Template { op: arith.op });
        }
    }
    templates
}

/// Pass 4: at each call site passing exactly two arguments to a templated
/// inline candidate, replaces the `ARG`, `ARG`, `CALL` triplet with the
/// template's op applied directly to the argument values, reusing the
/// call's own destination value id.
fn inline_expand(ir: &mut IrBuilder, candidates: &HashSet<String>) {
    let templates = collect_templates(ir, candidates);
    if templates.is_empty() {
        return;
    }
    let instrs = std::mem::take(&mut ir.instructions);
    let mut out = Vec::with_capacity(instrs.len());
    let mut i = 0;
    while i < instrs.len() {
        if i + 2 < instrs.len() && instrs[i].op == Op::Arg && instrs[i + 1].op == Op::Arg && instrs[i + 2].op == Op::Call {
            let call = &instrs[i + 2];
            if let Some(tpl) = call.name.as_ref().and_then(|n| templates.get(n)) {
                out.push(Instruction {
                    op: tpl.op,
                    dest: call.dest,
                    src1: instrs[i].src1,
                    src2: instrs[i + 1].src1,
                    imm: 0,
                    name: None,
                    data: None,
                    ty: call.ty.clone(),
                    is_volatile: false,
                    line: call.line,
                    column: call.column,
                });
                i += 3;
                continue;
            }
        }
        out.push(instrs[i].clone());
        i += 1;
    }
    ir.instructions = out;
}

/// Pass 5: after an unconditional `BR`/`RETURN`/`RETURN_AGG`, drops
/// instructions until a `LABEL` that is an actual branch target; labels
/// encountered along the way that are never targeted are dropped too.
fn eliminate_unreachable(ir: &mut IrBuilder) {
    let targets: HashSet<String> = ir
        .instructions
        .iter()
        .filter_map(|i| match i.op {
            Op::Br | Op::BCond => i.name.clone(),
            _ => None,
        })
        .collect();

    let instrs = std::mem::take(&mut ir.instructions);
    let mut out = Vec::with_capacity(instrs.len());
    let mut skipping = false;
    for instr in instrs {
        match instr.op {
            Op::FuncBegin | Op::FuncEnd => {
                skipping = false;
                out.push(instr);
            }
            Op::Label => {
                let is_target = instr.name.as_deref().map(|n| targets.contains(n)).unwrap_or(false);
                if !skipping || is_target {
                    skipping = false;
                    out.push(instr);
                }
            }
            _ => {
                if !skipping {
                    let terminal = matches!(instr.op, Op::Br | Op::Return | Op::ReturnAgg);
                    out.push(instr);
                    if terminal {
                        skipping = true;
                    }
                }
            }
        }
    }
    ir.instructions = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn int() -> Type {
        Type::Int { unsigned: false }
    }

    fn count(ir: &IrBuilder, op: Op) -> usize {
        ir.instructions.iter().filter(|i| i.op == op).count()
    }

    #[test]
    fn constant_chain_folds_to_a_single_const() {
        let mut ir = IrBuilder::new();
        let two = ir.emit_const(2, int(), 0, 0);
        let three = ir.emit_const(3, int(), 0, 0);
        let mul = ir.emit_binary(Op::Mul, two, three, int(), 0, 0);
        let one = ir.emit_const(1, int(), 0, 0);
        let add = ir.emit_binary(Op::Add, one, mul, int(), 0, 0);
        fold_constants(&mut ir, 8);
        let add_instr = ir.instructions.iter().find(|i| i.dest == add).unwrap();
        assert_eq!(add_instr.op, Op::Const);
        assert_eq!(add_instr.imm, 7);
    }

    #[test]
    fn unsigned_division_wraps_without_sign_extension() {
        let mut ir = IrBuilder::new();
        let ty = Type::Int { unsigned: true };
        let a = ir.emit_const(-1i64 & 0xFFFF_FFFF, ty.clone(), 0, 0);
        let b = ir.emit_const(2, ty.clone(), 0, 0);
        let div = ir.emit_binary(Op::Div, a, b, ty, 0, 0);
        fold_constants(&mut ir, 8);
        let instr = ir.instructions.iter().find(|i| i.dest == div).unwrap();
        assert_eq!(instr.op, Op::Const);
        assert_eq!(instr.imm, 0x7FFF_FFFF);
    }

    #[test]
    fn stored_constant_is_forwarded_into_a_later_load() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let five = ir.emit_const(5, int(), 0, 0);
        ir.emit_store("x", five, int(), 0, 0);
        let loaded = ir.emit_load("x", int(), 0, 0);
        ir.emit_return(Some(loaded), int(), 0, 0);
        ir.emit_func_end(0, 0);

        propagate_constants(&mut ir);

        let load_instr = ir.instructions.iter().find(|i| i.dest == loaded).unwrap();
        assert_eq!(load_instr.op, Op::Const);
        assert_eq!(load_instr.imm, 5);
    }

    #[test]
    fn address_taken_invalidates_forwarding() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let five = ir.emit_const(5, int(), 0, 0);
        ir.emit_store("x", five, int(), 0, 0);
        ir.emit_addr("x", int().ptr_to(), 0, 0);
        let loaded = ir.emit_load("x", int(), 0, 0);
        ir.emit_return(Some(loaded), int(), 0, 0);
        ir.emit_func_end(0, 0);

        propagate_constants(&mut ir);

        let load_instr = ir.instructions.iter().find(|i| i.dest == loaded).unwrap();
        assert_eq!(load_instr.op, Op::Load);
    }

    #[test]
    fn unused_computation_is_removed_and_its_inputs_follow() {
        let mut ir = IrBuilder::new();
        let a = ir.emit_const(1, int(), 0, 0);
        let b = ir.emit_const(2, int(), 0, 0);
        let _unused = ir.emit_binary(Op::Add, a, b, int(), 0, 0);
        let keep = ir.emit_binary(Op::Add, a, a, int(), 0, 0);
        ir.emit_return(Some(keep), int(), 0, 0);

        eliminate_dead_code(&mut ir);

        assert_eq!(count(&ir, Op::Const), 1);
        assert_eq!(count(&ir, Op::Add), 1);
    }

    #[test]
    fn store_idx_value_operand_is_not_mistaken_for_dead() {
        let mut ir = IrBuilder::new();
        let base = ir.emit_alloca("arr", 40, int(), 0, 0);
        let idx = ir.emit_const(0, int(), 0, 0);
        let val = ir.emit_const(9, int(), 0, 0);
        ir.emit_store_idx(base, idx, val, 4, int(), 0, 0);

        eliminate_dead_code(&mut ir);

        assert!(ir.instructions.iter().any(|i| i.dest == val));
    }

    #[test]
    fn two_param_inline_candidate_collapses_call_site_to_one_op() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("add", true, 0, 0);
        let p0 = ir.emit_load_param(0, "a", int(), 0, 0);
        let p1 = ir.emit_load_param(1, "b", int(), 0, 0);
        let sum = ir.emit_binary(Op::Add, p0, p1, int(), 0, 0);
        ir.emit_return(Some(sum), int(), 0, 0);
        ir.emit_func_end(0, 0);

        ir.emit_func_begin("main", false, 0, 0);
        let x = ir.emit_const(3, int(), 0, 0);
        let y = ir.emit_const(4, int(), 0, 0);
        ir.emit_arg(x, int(), 0, 0);
        ir.emit_arg(y, int(), 0, 0);
        let call_dest = ir.emit_call("add", false, int(), 0, 0);
        ir.emit_return(Some(call_dest), int(), 0, 0);
        ir.emit_func_end(0, 0);

        let mut candidates = HashSet::new();
        candidates.insert("add".to_string());
        inline_expand(&mut ir, &candidates);

        assert_eq!(count(&ir, Op::Call), 0);
        assert_eq!(count(&ir, Op::Arg), 0);
        let replaced = ir.instructions.iter().find(|i| i.dest == call_dest).unwrap();
        assert_eq!(replaced.op, Op::Add);
        assert_eq!(replaced.src1, x);
        assert_eq!(replaced.src2, y);
    }

    #[test]
    fn code_after_unconditional_branch_is_dropped_until_targeted_label() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        ir.emit_br("end", 0, 0);
        let dead = ir.emit_const(99, int(), 0, 0);
        ir.emit_label("untargeted", 0, 0);
        ir.emit_label("end", 0, 0);
        ir.emit_return(None, Type::Void, 0, 0);
        ir.emit_func_end(0, 0);

        eliminate_unreachable(&mut ir);

        assert!(!ir.instructions.iter().any(|i| i.dest == dead));
        assert!(!ir.instructions.iter().any(|i| i.name.as_deref() == Some("untargeted")));
        assert!(ir.instructions.iter().any(|i| i.op == Op::Label && i.name.as_deref() == Some("end")));
    }

    #[test]
    fn optimizer_passes_are_idempotent() {
        let mut ir = IrBuilder::new();
        let a = ir.emit_const(2, int(), 0, 0);
        let b = ir.emit_const(3, int(), 0, 0);
        ir.emit_binary(Op::Add, a, b, int(), 0, 0);
        fold_constants(&mut ir, 8);
        let first_pass = ir.instructions.len();
        fold_constants(&mut ir, 8);
        assert_eq!(ir.instructions.len(), first_pass);
    }
}
