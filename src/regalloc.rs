//! Linear-scan register allocator (SPEC_FULL.md §4.6).
//!
//! Integer/pointer-class values get a genuine register or a permanent spill
//! slot, computed ahead of time by one forward scan per function.
//! Floating-point and complex values are always homed to a dedicated memory
//! slot and reach a register only transiently during code generation, via
//! the disjoint `XmmPool` acquire/release API below — this mirrors the way
//! the code generator borrows and restores an XMM register around a single
//! instruction rather than keeping one assigned across a value's lifetime.

use crate::ir::{IrBuilder, Op, ValueId};
use crate::types::Type;
use std::collections::HashMap;

/// Registers 0 and 1 are permanently excluded from the pool; the code
/// generator uses them to materialize spilled operands for one instruction.
pub const SCRATCH_REGISTERS: [u8; 2] = [0, 1];
const GP_POOL: [u8; 6] = [2, 3, 4, 5, 6, 7];
const XMM_POOL: [u8; 6] = [2, 3, 4, 5, 6, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    /// Allocatable general-purpose register, index into the fixed table the
    /// code generator names per §4.7.
    Reg(u8),
    /// Spilled integer/pointer value, at frame offset `-(n * word_size)`.
    Slot(u32),
    /// Float/double/long-double/complex value, permanently homed to memory.
    FloatSlot(u32),
}

#[derive(Debug, Default)]
pub struct RegAlloc {
    pub loc: HashMap<ValueId, Loc>,
    pub stack_slots: u32,
    pub float_slots: u32,
}

/// `[begin, end]` index ranges (inclusive of `FUNC_BEGIN`/`FUNC_END`) for
/// every function present in one translation unit's IR, in source order.
pub fn function_spans(ir: &IrBuilder) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, instr) in ir.instructions.iter().enumerate() {
        match instr.op {
            Op::FuncBegin => start = Some(i),
            Op::FuncEnd => {
                if let Some(s) = start.take() {
                    spans.push((s, i));
                }
            }
            _ => {}
        }
    }
    spans
}

fn is_float_class(ty: &Type) -> bool {
    ty.is_float() || ty.is_complex()
}

/// Runs linear-scan allocation over the instructions `ir.instructions[begin..=end]`.
///
/// 1. One forward pass records, for every value id, the last instruction
///    index at which it is read as `src1`/`src2` (or, for `STORE_IDX`, as the
///    stored value carried in `dest`).
/// 2. A second forward pass assigns each freshly-defined value a register
///    (LIFO from the high end of the pool) or, once the pool is empty, the
///    next stack slot; an operand's register returns to the pool the moment
///    the current index reaches its recorded last use.
///
/// Given identical IR this always produces byte-identical output: both
/// passes are plain forward scans with no iteration-order-dependent choice.
pub fn allocate(ir: &IrBuilder, begin: usize, end: usize) -> RegAlloc {
    let instrs = &ir.instructions[begin..=end];

    let mut last_use: HashMap<ValueId, usize> = HashMap::new();
    for (i, instr) in instrs.iter().enumerate() {
        if instr.src1 != 0 {
            last_use.insert(instr.src1, i);
        }
        if instr.src2 != 0 {
            last_use.insert(instr.src2, i);
        }
        if instr.op == Op::StoreIdx && instr.dest != 0 {
            last_use.insert(instr.dest, i);
        }
    }

    let mut value_ty: HashMap<ValueId, Type> = HashMap::new();
    for instr in instrs {
        if instr.dest != 0 && instr.op != Op::StoreIdx {
            value_ty.insert(instr.dest, instr.ty.clone());
        }
    }

    let mut free_gp: Vec<u8> = GP_POOL.to_vec();
    let mut stack_slots = 0u32;
    let mut float_slots = 0u32;
    let mut loc: HashMap<ValueId, Loc> = HashMap::new();

    for (i, instr) in instrs.iter().enumerate() {
        if instr.dest != 0 && instr.op != Op::StoreIdx && !loc.contains_key(&instr.dest) {
            let float_class = value_ty.get(&instr.dest).map(is_float_class).unwrap_or(false);
            let assigned = if float_class {
                float_slots += 1;
                Loc::FloatSlot(float_slots)
            } else {
                match free_gp.pop() {
                    Some(r) => Loc::Reg(r),
                    None => {
                        stack_slots += 1;
                        Loc::Slot(stack_slots)
                    }
                }
            };
            loc.insert(instr.dest, assigned);
        }

        // `dest` is a use for STORE_IDX (the stored value) and the
        // just-assigned definition for everything else; either way its
        // register is eligible for release the moment its last use expires.
        let operands = [instr.src1, instr.src2, instr.dest];
        for v in operands {
            if v == 0 || last_use.get(&v) != Some(&i) {
                continue;
            }
            if let Some(Loc::Reg(r)) = loc.get(&v).copied() {
                free_gp.push(r);
            }
        }
    }

    RegAlloc { loc, stack_slots, float_slots }
}

/// Live, codegen-driven pool for XMM registers: acquired for the duration of
/// emitting one instruction (or one sub-expression of a complex-arithmetic
/// expansion) and released immediately after. When empty, the code generator
/// spills an in-use XMM register to a 16-byte stack slot, performs the
/// borrowed use, and restores it — `XmmPool` itself only tracks which
/// indices are currently lent out.
pub struct XmmPool {
    free: Vec<u8>,
}

impl XmmPool {
    pub fn new() -> Self {
        XmmPool { free: XMM_POOL.to_vec() }
    }

    pub fn acquire(&mut self) -> Option<u8> {
        self.free.pop()
    }

    pub fn release(&mut self, reg: u8) {
        debug_assert!(!self.free.contains(&reg));
        self.free.push(reg);
    }
}

impl Default for XmmPool {
    fn default() -> Self {
        XmmPool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn int() -> Type {
        Type::Int { unsigned: false }
    }

    #[test]
    fn registers_are_assigned_lifo_from_the_high_end() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let a = ir.emit_const(1, int(), 0, 0);
        let b = ir.emit_const(2, int(), 0, 0);
        ir.emit_return(Some(b), int(), 0, 0);
        ir.emit_func_end(0, 0);
        let (begin, end) = function_spans(&ir)[0];
        let alloc = allocate(&ir, begin, end);
        assert_eq!(alloc.loc[&a], Loc::Reg(7));
        assert_eq!(alloc.loc[&b], Loc::Reg(6));
    }

    #[test]
    fn a_released_register_is_reused_by_the_next_definition() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let a = ir.emit_const(1, int(), 0, 0);
        // a's only use is here; its register should free up immediately after.
        let b = ir.emit_binary(Op::Add, a, a, int(), 0, 0);
        let c = ir.emit_const(2, int(), 0, 0);
        let d = ir.emit_binary(Op::Add, b, c, int(), 0, 0);
        ir.emit_return(Some(d), int(), 0, 0);
        ir.emit_func_end(0, 0);
        let (begin, end) = function_spans(&ir)[0];
        let alloc = allocate(&ir, begin, end);
        // a occupied reg 7; once freed after its use in `b`'s definition, c reuses it.
        assert_eq!(alloc.loc[&a], Loc::Reg(7));
        assert_eq!(alloc.loc[&c], Loc::Reg(7));
    }

    #[test]
    fn seventh_concurrently_live_value_spills_to_a_stack_slot() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let mut values = Vec::new();
        for n in 0..7 {
            values.push(ir.emit_const(n, int(), 0, 0));
        }
        let sum = values.iter().skip(1).fold(values[0], |acc, &v| ir.emit_binary(Op::Add, acc, v, int(), 0, 0));
        ir.emit_return(Some(sum), int(), 0, 0);
        ir.emit_func_end(0, 0);
        let (begin, end) = function_spans(&ir)[0];
        let alloc = allocate(&ir, begin, end);
        let spilled = values.iter().filter(|v| matches!(alloc.loc[v], Loc::Slot(_))).count();
        assert!(spilled >= 1);
        assert!(alloc.stack_slots >= 1);
    }

    #[test]
    fn float_values_are_homed_to_a_float_slot_never_a_register() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let a = ir.emit_const(0, Type::Double, 0, 0);
        ir.emit_return(Some(a), Type::Double, 0, 0);
        ir.emit_func_end(0, 0);
        let (begin, end) = function_spans(&ir)[0];
        let alloc = allocate(&ir, begin, end);
        assert!(matches!(alloc.loc[&a], Loc::FloatSlot(_)));
    }

    #[test]
    fn allocation_is_deterministic_across_runs() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("f", false, 0, 0);
        let a = ir.emit_const(1, int(), 0, 0);
        let b = ir.emit_const(2, int(), 0, 0);
        let c = ir.emit_binary(Op::Add, a, b, int(), 0, 0);
        ir.emit_return(Some(c), int(), 0, 0);
        ir.emit_func_end(0, 0);
        let (begin, end) = function_spans(&ir)[0];
        let first = allocate(&ir, begin, end);
        let second = allocate(&ir, begin, end);
        assert_eq!(first.loc, second.loc);
        assert_eq!(first.stack_slots, second.stack_slots);
    }

    #[test]
    fn function_spans_finds_every_function_in_order() {
        let mut ir = IrBuilder::new();
        ir.emit_func_begin("a", false, 0, 0);
        ir.emit_func_end(0, 0);
        ir.emit_func_begin("b", false, 0, 0);
        ir.emit_func_end(0, 0);
        let spans = function_spans(&ir);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].1 < spans[1].0);
    }

    #[test]
    fn xmm_pool_acquire_release_round_trips() {
        let mut pool = XmmPool::new();
        let r1 = pool.acquire().unwrap();
        let r2 = pool.acquire().unwrap();
        assert_ne!(r1, r2);
        pool.release(r1);
        let r3 = pool.acquire().unwrap();
        assert_eq!(r1, r3);
    }
}
