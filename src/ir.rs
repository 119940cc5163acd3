//! Linear three-address IR (SPEC_FULL.md §3 Data Model).
//!
//! Per the Redesign Flags / Design Notes, the opcode dispatcher is a plain
//! `Op` sum type matched exhaustively rather than a function-pointer table —
//! the compiler building `vc` checks exhaustiveness for us.

use crate::types::Type;

pub type ValueId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Const,
    CplxConst,
    CplxAdd, CplxSub, CplxMul, CplxDiv,
    GlobString,
    GlobWString,
    GlobVar,
    GlobArray,
    GlobStruct,
    GlobUnion,

    Load,
    Store,
    LoadParam,
    StoreParam,
    Addr,
    LoadPtr,
    StorePtr,
    LoadIdx,
    StoreIdx,
    BfLoad,
    BfStore,
    Alloca,

    Add, Sub, Mul, Div, Mod,
    Shl, Shr, And, Or, Xor,

    PtrAdd, PtrDiff,

    FAdd, FSub, FMul, FDiv,
    LfAdd, LfSub, LfMul, LfDiv,

    CmpEq, CmpNe, CmpLt, CmpGt, CmpLe, CmpGe,

    LogAnd, LogOr,

    Cast,

    Arg,
    Call,
    CallNr,
    CallPtr,
    CallPtrNr,
    Return,
    ReturnAgg,
    FuncBegin,
    FuncEnd,
    Br,
    BCond,
    Label,
}

impl Op {
    /// Opcodes that must never be removed by dead-code elimination even when
    /// their destination (if any) is unused.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Op::Store
                | Op::StoreParam
                | Op::StorePtr
                | Op::StoreIdx
                | Op::BfStore
                | Op::Call
                | Op::CallNr
                | Op::CallPtr
                | Op::CallPtrNr
                | Op::Return
                | Op::ReturnAgg
                | Op::FuncBegin
                | Op::FuncEnd
                | Op::Br
                | Op::BCond
                | Op::Label
                | Op::Arg
                | Op::Alloca
        )
    }
}

/// One IR instruction. Unused operand slots are `0` (no value id is ever
/// allocated as 0; ids start at 1).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: Op,
    pub dest: ValueId,
    pub src1: ValueId,
    pub src2: ValueId,
    pub imm: i64,
    pub name: Option<String>,
    pub data: Option<Vec<u8>>,
    pub ty: Type,
    pub is_volatile: bool,
    pub line: usize,
    pub column: usize,
}

impl Instruction {
    fn blank(op: Op, ty: Type, line: usize, column: usize) -> Self {
        Instruction {
            op,
            dest: 0,
            src1: 0,
            src2: 0,
            imm: 0,
            name: None,
            data: None,
            ty,
            is_volatile: false,
            line,
            column,
        }
    }
}

/// Owns the instruction sequence for one translation unit and the
/// monotonically-increasing value-id allocator.
#[derive(Debug, Default)]
pub struct IrBuilder {
    pub instructions: Vec<Instruction>,
    next_value: ValueId,
}

impl IrBuilder {
    pub fn new() -> Self {
        IrBuilder::default()
    }

    fn fresh_value(&mut self) -> ValueId {
        self.next_value += 1;
        self.next_value
    }

    fn push(&mut self, instr: Instruction) -> ValueId {
        let dest = instr.dest;
        self.instructions.push(instr);
        dest
    }

    pub fn emit_const(&mut self, imm: i64, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::Const, ty, line, column);
        i.dest = dest;
        i.imm = imm;
        self.push(i)
    }

    pub fn emit_binary(&mut self, op: Op, src1: ValueId, src2: ValueId, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(op, ty, line, column);
        i.dest = dest;
        i.src1 = src1;
        i.src2 = src2;
        self.push(i)
    }

    pub fn emit_unary(&mut self, op: Op, src1: ValueId, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(op, ty, line, column);
        i.dest = dest;
        i.src1 = src1;
        self.push(i)
    }

    pub fn emit_named(&mut self, op: Op, name: impl Into<String>, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(op, ty, line, column);
        i.dest = dest;
        i.name = Some(name.into());
        self.push(i)
    }

    pub fn emit_load(&mut self, name: impl Into<String>, ty: Type, line: usize, column: usize) -> ValueId {
        self.emit_named(Op::Load, name, ty, line, column)
    }

    pub fn emit_store(&mut self, name: impl Into<String>, value: ValueId, ty: Type, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::Store, ty, line, column);
        i.src1 = value;
        i.name = Some(name.into());
        self.instructions.push(i);
    }

    pub fn emit_label(&mut self, name: impl Into<String>, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::Label, Type::Void, line, column);
        i.name = Some(name.into());
        self.instructions.push(i);
    }

    pub fn emit_br(&mut self, target: impl Into<String>, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::Br, Type::Void, line, column);
        i.name = Some(target.into());
        self.instructions.push(i);
    }

    pub fn emit_bcond(&mut self, cond: ValueId, target: impl Into<String>, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::BCond, Type::Void, line, column);
        i.src1 = cond;
        i.name = Some(target.into());
        self.instructions.push(i);
    }

    pub fn emit_return(&mut self, value: Option<ValueId>, ty: Type, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::Return, ty, line, column);
        i.src1 = value.unwrap_or(0);
        self.instructions.push(i);
    }

    pub fn emit_func_begin(&mut self, name: impl Into<String>, is_inline: bool, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::FuncBegin, Type::Void, line, column);
        i.name = Some(name.into());
        i.imm = is_inline as i64;
        self.instructions.push(i);
    }

    pub fn emit_func_end(&mut self, line: usize, column: usize) {
        self.instructions.push(Instruction::blank(Op::FuncEnd, Type::Void, line, column));
    }

    pub fn emit_arg(&mut self, value: ValueId, ty: Type, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::Arg, ty, line, column);
        i.src1 = value;
        self.instructions.push(i);
    }

    pub fn emit_call(&mut self, name: impl Into<String>, nr: bool, ty: Type, line: usize, column: usize) -> ValueId {
        let op = if nr { Op::CallNr } else { Op::Call };
        let dest = if nr { 0 } else { self.fresh_value() };
        let mut i = Instruction::blank(op, ty, line, column);
        i.dest = dest;
        i.name = Some(name.into());
        self.instructions.push(i);
        dest
    }

    pub fn emit_call_ptr(&mut self, callee: ValueId, nr: bool, ty: Type, line: usize, column: usize) -> ValueId {
        let op = if nr { Op::CallPtrNr } else { Op::CallPtr };
        let dest = if nr { 0 } else { self.fresh_value() };
        let mut i = Instruction::blank(op, ty, line, column);
        i.dest = dest;
        i.src1 = callee;
        self.instructions.push(i);
        dest
    }

    pub fn emit_return_agg(&mut self, addr: ValueId, ty: Type, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::ReturnAgg, ty, line, column);
        i.src1 = addr;
        self.instructions.push(i);
    }

    pub fn emit_load_param(&mut self, index: i64, name: impl Into<String>, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::LoadParam, ty, line, column);
        i.dest = dest;
        i.imm = index;
        i.name = Some(name.into());
        self.push(i)
    }

    pub fn emit_alloca(&mut self, name: impl Into<String>, size: i64, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::Alloca, ty, line, column);
        i.dest = dest;
        i.imm = size;
        i.name = Some(name.into());
        self.push(i)
    }

    pub fn emit_addr(&mut self, name: impl Into<String>, ty: Type, line: usize, column: usize) -> ValueId {
        self.emit_named(Op::Addr, name, ty, line, column)
    }

    pub fn emit_load_ptr(&mut self, ptr: ValueId, ty: Type, is_volatile: bool, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::LoadPtr, ty, line, column);
        i.dest = dest;
        i.src1 = ptr;
        i.is_volatile = is_volatile;
        self.push(i)
    }

    pub fn emit_store_ptr(&mut self, ptr: ValueId, value: ValueId, ty: Type, is_volatile: bool, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::StorePtr, ty, line, column);
        i.src1 = ptr;
        i.src2 = value;
        i.is_volatile = is_volatile;
        self.instructions.push(i);
    }

    pub fn emit_load_idx(&mut self, base: ValueId, index: ValueId, elem_size: i64, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::LoadIdx, ty, line, column);
        i.dest = dest;
        i.src1 = base;
        i.src2 = index;
        i.imm = elem_size;
        self.push(i)
    }

    pub fn emit_store_idx(&mut self, base: ValueId, index: ValueId, value: ValueId, elem_size: i64, ty: Type, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::StoreIdx, ty, line, column);
        i.src1 = base;
        i.src2 = index;
        i.imm = elem_size;
        // value travels in a dedicated slot since src1/src2 are taken by
        // base/index; store it as the "dest" field (StoreIdx has no result).
        i.dest = value;
        self.instructions.push(i);
    }

    pub fn emit_bf_load(&mut self, ptr: ValueId, bit_offset: u32, width: u32, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::BfLoad, ty, line, column);
        i.dest = dest;
        i.src1 = ptr;
        i.imm = ((width as i64) << 32) | bit_offset as i64;
        self.push(i)
    }

    pub fn emit_bf_store(&mut self, ptr: ValueId, value: ValueId, bit_offset: u32, width: u32, ty: Type, line: usize, column: usize) {
        let mut i = Instruction::blank(Op::BfStore, ty, line, column);
        i.src1 = ptr;
        i.src2 = value;
        i.imm = ((width as i64) << 32) | bit_offset as i64;
        self.instructions.push(i);
    }

    pub fn emit_ptr_add(&mut self, ptr: ValueId, index: ValueId, elem_size: i64, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::PtrAdd, ty, line, column);
        i.dest = dest;
        i.src1 = ptr;
        i.src2 = index;
        i.imm = elem_size;
        self.push(i)
    }

    pub fn emit_ptr_diff(&mut self, lhs: ValueId, rhs: ValueId, elem_size: i64, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::PtrDiff, ty, line, column);
        i.dest = dest;
        i.src1 = lhs;
        i.src2 = rhs;
        i.imm = elem_size;
        self.push(i)
    }

    pub fn emit_cast(&mut self, src: ValueId, target: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::Cast, target, line, column);
        i.dest = dest;
        i.src1 = src;
        self.push(i)
    }

    pub fn emit_glob_data(&mut self, op: Op, name: impl Into<String>, data: Vec<u8>, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(op, ty, line, column);
        i.dest = dest;
        i.name = Some(name.into());
        i.data = Some(data);
        self.push(i)
    }

    /// A complex immediate: `data` is 16 bytes, real half then imaginary
    /// half, each a little-endian f64 (see `codegen/emit.rs`'s `CplxConst`
    /// lowering for why components are always stored at double width).
    pub fn emit_cplx_const(&mut self, data: Vec<u8>, ty: Type, line: usize, column: usize) -> ValueId {
        let dest = self.fresh_value();
        let mut i = Instruction::blank(Op::CplxConst, ty, line, column);
        i.dest = dest;
        i.data = Some(data);
        self.push(i)
    }

    /// One instruction per line: `dest = OP src1, src2, imm #name`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for instr in &self.instructions {
            out.push_str(&format!("{:?} dest={} src1={} src2={} imm={}", instr.op, instr.dest, instr.src1, instr.src2, instr.imm));
            if let Some(name) = &instr.name {
                out.push_str(&format!(" name={name}"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ids_are_dense_and_start_at_one() {
        let mut b = IrBuilder::new();
        let a = b.emit_const(1, Type::Int { unsigned: false }, 0, 0);
        let c = b.emit_const(2, Type::Int { unsigned: false }, 0, 0);
        assert_eq!(a, 1);
        assert_eq!(c, 2);
    }

    #[test]
    fn side_effect_opcodes_are_flagged() {
        assert!(Op::Store.has_side_effects());
        assert!(Op::Call.has_side_effects());
        assert!(!Op::Add.has_side_effects());
    }

    #[test]
    fn dump_includes_destination_and_operands() {
        let mut b = IrBuilder::new();
        let a = b.emit_const(7, Type::Int { unsigned: false }, 0, 0);
        let dest = b.emit_binary(Op::Add, a, a, Type::Int { unsigned: false }, 0, 0);
        let text = b.dump();
        assert!(text.contains(&format!("dest={dest}")));
    }

    #[test]
    fn cplx_const_carries_its_16_byte_payload() {
        let mut b = IrBuilder::new();
        let data = vec![0u8; 16];
        let v = b.emit_cplx_const(data.clone(), Type::DoubleComplex, 0, 0);
        let instr = b.instructions.iter().find(|i| i.dest == v).unwrap();
        assert_eq!(instr.op, Op::CplxConst);
        assert_eq!(instr.data, Some(data));
    }
}
