//! Per-opcode instruction emission (SPEC_FULL.md §4.7): the table-dispatched
//! walker that turns one function's IR slice into assembly text.

use super::prologue::{self, NamedSlots};
use super::x86::{self, att_suffix};
use crate::config::{CompilerConfig, Syntax, Target};
use crate::ir::{Instruction, IrBuilder, Op};
use crate::regalloc::{self, Loc, RegAlloc, XmmPool};
use crate::types::Type;

const INT_ARGS_64: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

fn is_compare(op: Op) -> bool {
    matches!(op, Op::CmpEq | Op::CmpNe | Op::CmpLt | Op::CmpGt | Op::CmpLe | Op::CmpGe)
}

fn is_float_class(ty: &Type) -> bool {
    ty.is_float() || ty.is_complex()
}

/// One function's codegen session: the allocator results, the named-slot
/// frame layout, and the live XMM scratch pool, plus the growable output
/// buffer the walker appends to.
struct FuncEmitter<'a> {
    config: &'a CompilerConfig,
    alloc: RegAlloc,
    named: NamedSlots,
    xmm: XmmPool,
    out: String,
    pending_int_args: Vec<u32>,
    pending_float_args: Vec<u32>,
    callee_saved: Vec<&'static str>,
}

impl<'a> FuncEmitter<'a> {
    fn target(&self) -> Target {
        self.config.target
    }
    fn syntax(&self) -> Syntax {
        self.config.syntax
    }
    fn word_size(&self) -> u32 {
        self.config.target.word_size()
    }

    fn emit_line(&mut self, line: String) {
        self.out.push_str(&line);
        self.out.push('\n');
    }

    fn width_of(&self, ty: &Type) -> u32 {
        ty.size_of(self.word_size())
    }

    fn int_operand(&self, v: u32, width: u32) -> String {
        match self.alloc.loc.get(&v) {
            Some(&loc) => x86::loc_operand(loc, width, self.alloc.stack_slots, self.target(), self.syntax()),
            None => x86::reg_operand(0, width, self.target(), self.syntax()),
        }
    }

    fn float_operand(&self, v: u32) -> String {
        match self.alloc.loc.get(&v) {
            Some(Loc::FloatSlot(n)) => x86::float_slot_operand(*n, self.alloc.stack_slots, self.target(), self.syntax()),
            _ => x86::mem_at(0, self.target(), self.syntax()),
        }
    }

    /// A complex value's (real, imaginary) memory operands: the real half
    /// sits at the slot's base offset, the imaginary half 8 bytes further in
    /// (see `Op::CplxConst`).
    fn cplx_operand(&self, v: u32) -> (String, String) {
        match self.alloc.loc.get(&v) {
            Some(Loc::FloatSlot(n)) => {
                let int_region = self.alloc.stack_slots as i64 * self.word_size() as i64;
                let base = -(int_region + *n as i64 * 16);
                (x86::mem_at(base, self.target(), self.syntax()), x86::mem_at(base + 8, self.target(), self.syntax()))
            }
            _ => (x86::mem_at(0, self.target(), self.syntax()), x86::mem_at(8, self.target(), self.syntax())),
        }
    }

    /// Per-component add/sub: `real` and `imaginary` are independent `addsd`
    /// / `subsd` pairs (SPEC_FULL.md §4.7). Components are always carried at
    /// double width regardless of the source C type, per `Op::CplxConst`.
    fn emit_cplx_add_sub(&mut self, mnemonic: &str, instr: &Instruction) {
        let (r1, i1) = self.cplx_operand(instr.src1);
        let (r2, i2) = self.cplx_operand(instr.src2);
        let (rd, id) = self.cplx_operand(instr.dest);
        let rx = self.xmm.acquire().unwrap_or(2);
        let ix = self.xmm.acquire().unwrap_or(3);
        let tx = self.xmm.acquire().unwrap_or(4);
        let ty = self.xmm.acquire().unwrap_or(5);
        let (rx_op, ix_op, tx_op, ty_op) =
            (x86::xmm_operand(rx, self.syntax()), x86::xmm_operand(ix, self.syntax()), x86::xmm_operand(tx, self.syntax()), x86::xmm_operand(ty, self.syntax()));
        self.emit_line(x86::two_op("movsd", &r1, &rx_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &i1, &ix_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &r2, &tx_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &i2, &ty_op, self.syntax()));
        self.emit_line(x86::two_op(mnemonic, &tx_op, &rx_op, self.syntax()));
        self.emit_line(x86::two_op(mnemonic, &ty_op, &ix_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &rx_op, &rd, self.syntax()));
        self.emit_line(x86::two_op("movsd", &ix_op, &id, self.syntax()));
        for r in [rx, ix, tx, ty] {
            self.xmm.release(r);
        }
    }

    /// `(a+bi)(c+di) = (ac-bd) + (ad+bc)i`.
    fn emit_cplx_mul(&mut self, instr: &Instruction) {
        let (ra, ia) = self.cplx_operand(instr.src1);
        let (rb, ib) = self.cplx_operand(instr.src2);
        let (rd, id) = self.cplx_operand(instr.dest);
        let a = self.xmm.acquire().unwrap_or(2);
        let b = self.xmm.acquire().unwrap_or(3);
        let c = self.xmm.acquire().unwrap_or(4);
        let d = self.xmm.acquire().unwrap_or(5);
        let t1 = self.xmm.acquire().unwrap_or(6);
        let t2 = self.xmm.acquire().unwrap_or(7);
        let (a_op, b_op, c_op, d_op, t1_op, t2_op) = (
            x86::xmm_operand(a, self.syntax()),
            x86::xmm_operand(b, self.syntax()),
            x86::xmm_operand(c, self.syntax()),
            x86::xmm_operand(d, self.syntax()),
            x86::xmm_operand(t1, self.syntax()),
            x86::xmm_operand(t2, self.syntax()),
        );
        self.emit_line(x86::two_op("movsd", &ra, &a_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &ia, &b_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &rb, &c_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &ib, &d_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &a_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &c_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &b_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &d_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("subsd", &t2_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &t1_op, &rd, self.syntax()));
        self.emit_line(x86::two_op("movsd", &a_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &d_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &b_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &c_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("addsd", &t2_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &t1_op, &id, self.syntax()));
        for r in [a, b, c, d, t1, t2] {
            self.xmm.release(r);
        }
    }

    /// `(a+bi)/(c+di) = [(ac+bd) + (bc-ad)i] / (c^2+d^2)`. The denominator is
    /// stashed in the destination's imaginary slot until both components are
    /// divided, since it is never read again after that.
    fn emit_cplx_div(&mut self, instr: &Instruction) {
        let (ra, ia) = self.cplx_operand(instr.src1);
        let (rb, ib) = self.cplx_operand(instr.src2);
        let (rd, id) = self.cplx_operand(instr.dest);
        let a = self.xmm.acquire().unwrap_or(2);
        let b = self.xmm.acquire().unwrap_or(3);
        let c = self.xmm.acquire().unwrap_or(4);
        let d = self.xmm.acquire().unwrap_or(5);
        let t1 = self.xmm.acquire().unwrap_or(6);
        let t2 = self.xmm.acquire().unwrap_or(7);
        let (a_op, b_op, c_op, d_op, t1_op, t2_op) = (
            x86::xmm_operand(a, self.syntax()),
            x86::xmm_operand(b, self.syntax()),
            x86::xmm_operand(c, self.syntax()),
            x86::xmm_operand(d, self.syntax()),
            x86::xmm_operand(t1, self.syntax()),
            x86::xmm_operand(t2, self.syntax()),
        );
        self.emit_line(x86::two_op("movsd", &ra, &a_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &ia, &b_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &rb, &c_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &ib, &d_op, self.syntax()));

        // denom = c^2 + d^2, parked in the `id` memory slot.
        self.emit_line(x86::two_op("movsd", &c_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &c_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &d_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &d_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("addsd", &t2_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &t1_op, &id, self.syntax()));

        // real = (ac + bd) / denom
        self.emit_line(x86::two_op("movsd", &a_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &c_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &b_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &d_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("addsd", &t1_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("divsd", &id, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &t2_op, &rd, self.syntax()));

        // imag = (bc - ad) / denom
        self.emit_line(x86::two_op("movsd", &b_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &c_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &a_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("mulsd", &d_op, &t1_op, self.syntax()));
        self.emit_line(x86::two_op("subsd", &t1_op, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("divsd", &id, &t2_op, self.syntax()));
        self.emit_line(x86::two_op("movsd", &t2_op, &id, self.syntax()));

        for r in [a, b, c, d, t1, t2] {
            self.xmm.release(r);
        }
    }

    fn named_operand(&self, name: &str) -> String {
        let offset = self.named.offsets.get(name).copied().unwrap_or(0);
        x86::mem_at(offset, self.target(), self.syntax())
    }

    fn mov(&mut self, src: &str, dst: &str, width: u32) {
        let mnemonic = format!("mov{}", att_suffix(width));
        self.emit_line(x86::two_op(&mnemonic, src, dst, self.syntax()));
    }

    fn mov_to_dest(&mut self, dest: u32, ty: &Type, src: &str) {
        let width = self.width_of(ty);
        let dst = self.int_operand(dest, width);
        if dst != src {
            self.mov(src, &dst, width);
        }
    }

    fn scratch(&self, width: u32) -> String {
        x86::reg_operand(0, width, self.target(), self.syntax())
    }

    /// Loads `v` into the scratch register and returns the scratch operand;
    /// used whenever an instruction needs two memory operands at once.
    fn materialize(&mut self, v: u32, ty: &Type) -> String {
        let width = self.width_of(ty);
        let src = self.int_operand(v, width);
        let scratch = self.scratch(width);
        self.mov(&src, &scratch, width);
        scratch
    }

    fn is_register_value(&self, v: u32) -> bool {
        matches!(self.alloc.loc.get(&v), Some(Loc::Reg(_)))
    }

    fn binary_int(&mut self, mnemonic: &str, instr: &Instruction) {
        let width = self.width_of(&instr.ty);
        let dest = self.int_operand(instr.dest, width);
        // `add`/`sub`/`and`/`or`/`xor`/`imul` need one register operand;
        // materialize the left side into scratch when it isn't one already.
        let acc = if self.is_register_value(instr.src1) {
            self.int_operand(instr.src1, width)
        } else {
            self.materialize(instr.src1, &instr.ty)
        };
        let rhs = self.int_operand(instr.src2, width);
        self.emit_line(x86::two_op(mnemonic, &rhs, &acc, self.syntax()));
        if acc != dest {
            self.mov(&acc, &dest, width);
        }
    }

    fn emit_div(&mut self, instr: &Instruction, want_remainder: bool) {
        let width = self.width_of(&instr.ty);
        let unsigned = instr.ty.is_unsigned();
        let dividend = self.int_operand(instr.src1, width);
        let eax = x86::reg_operand(0, width, self.target(), self.syntax());
        self.mov(&dividend, &eax, width);
        if unsigned {
            let edx = x86::reg_operand(1, width, self.target(), self.syntax());
            self.emit_line(x86::two_op(&format!("xor{}", att_suffix(width)), &edx, &edx, self.syntax()));
        } else {
            self.emit_line(match self.target() {
                Target::X86_64 => "    cqo".to_string(),
                Target::X86_32 => "    cdq".to_string(),
            });
        }
        let divisor = self.materialize_divisor(instr.src2, &instr.ty);
        let mnemonic = if unsigned { "div" } else { "idiv" };
        self.emit_line(x86::one_op(mnemonic, &divisor));
        let result_reg = if want_remainder { 1 } else { 0 };
        let src = x86::reg_operand(result_reg, width, self.target(), self.syntax());
        self.mov_to_dest(instr.dest, &instr.ty, &src);
    }

    /// `div`/`idiv` take a register or memory operand but never an
    /// immediate; since `src2` always names a prior value this is already a
    /// register/memory location, but it must not alias `rdx`/`eax`.
    fn materialize_divisor(&mut self, v: u32, ty: &Type) -> String {
        let width = self.width_of(ty);
        match self.alloc.loc.get(&v) {
            Some(Loc::Reg(r)) if *r == 0 || *r == 1 => self.materialize(v, ty),
            _ => self.int_operand(v, width),
        }
    }

    fn emit_shift(&mut self, mnemonic: &str, instr: &Instruction) {
        let width = self.width_of(&instr.ty);
        let dest = self.int_operand(instr.dest, width);
        let lhs = self.int_operand(instr.src1, width);
        if dest != lhs {
            self.mov(&lhs, &dest, width);
        }
        let count_reg = x86::reg_operand(1, 1, self.target(), self.syntax());
        // the count must be in cl; if the count's own home happens to be
        // the count register, a scratch move avoids clobbering it mid-shift.
        match self.alloc.loc.get(&instr.src2) {
            Some(Loc::Reg(1)) => {
                let tmp = self.scratch(self.width_of(&instr.ty));
                self.mov(&x86::reg_operand(1, self.width_of(&instr.ty), self.target(), self.syntax()), &tmp, self.width_of(&instr.ty));
                self.emit_line(x86::two_op(mnemonic, &count_reg, &dest, self.syntax()));
            }
            _ => {
                let count = self.int_operand(instr.src2, 1);
                self.mov(&count, &count_reg, 1);
                self.emit_line(x86::two_op(mnemonic, &count_reg, &dest, self.syntax()));
            }
        }
    }

    fn condition_code(op: Op, unsigned: bool) -> &'static str {
        match (op, unsigned) {
            (Op::CmpEq, _) => "e",
            (Op::CmpNe, _) => "ne",
            (Op::CmpLt, true) => "b",
            (Op::CmpLt, false) => "l",
            (Op::CmpGt, true) => "a",
            (Op::CmpGt, false) => "g",
            (Op::CmpLe, true) => "be",
            (Op::CmpLe, false) => "le",
            (Op::CmpGe, true) => "ae",
            (Op::CmpGe, false) => "ge",
            _ => "e",
        }
    }

    fn emit_compare(&mut self, instr: &Instruction, operand_ty: &Type) {
        let width = self.width_of(operand_ty);
        let lhs = self.int_operand(instr.src1, width);
        let rhs = self.int_operand(instr.src2, width);
        self.emit_line(x86::two_op("cmp", &rhs, &lhs, self.syntax()));
        let cc = Self::condition_code(instr.op, operand_ty.is_unsigned());
        let byte_dest = self.scratch(1);
        self.emit_line(x86::one_op(&format!("set{cc}"), &byte_dest));
        let dest_width = self.width_of(&instr.ty);
        let zx_dest = self.scratch(dest_width);
        self.emit_line(x86::two_op(&format!("movz{}{}", att_suffix(1), att_suffix(dest_width)), &byte_dest, &zx_dest, self.syntax()));
        self.mov_to_dest(instr.dest, &instr.ty, &zx_dest);
    }

    fn sse_mnemonic(base: &str, ty: &Type) -> String {
        let suffix = if matches!(ty, Type::Float) { "ss" } else { "sd" };
        format!("{base}{suffix}")
    }

    fn emit_float_binary(&mut self, base: &str, instr: &Instruction) {
        let r1 = self.xmm.acquire().unwrap_or(0);
        let r2 = self.xmm.acquire().unwrap_or(1);
        let x1 = x86::xmm_operand(r1, self.syntax());
        let x2 = x86::xmm_operand(r2, self.syntax());
        let mov = Self::sse_mnemonic("mov", &instr.ty);
        self.emit_line(x86::two_op(&mov, &self.float_operand(instr.src1), &x1, self.syntax()));
        self.emit_line(x86::two_op(&mov, &self.float_operand(instr.src2), &x2, self.syntax()));
        self.emit_line(x86::two_op(&Self::sse_mnemonic(base, &instr.ty), &x2, &x1, self.syntax()));
        self.emit_line(x86::two_op(&mov, &x1, &self.float_operand(instr.dest), self.syntax()));
        self.xmm.release(r1);
        self.xmm.release(r2);
    }

    /// Long-double arithmetic uses the x87 stack; per SPEC_FULL.md §9 the
    /// stack is always empty again at the end of the instruction, so no
    /// value crosses a branch edge still parked in an x87 register.
    fn emit_long_double_binary(&mut self, mnemonic: &str, instr: &Instruction) {
        self.emit_line(x86::one_op("fldt", &self.float_operand(instr.src1)));
        self.emit_line(x86::one_op("fldt", &self.float_operand(instr.src2)));
        self.emit_line(format!("    {mnemonic}p %st, %st(1)"));
        self.emit_line(x86::one_op("fstpt", &self.float_operand(instr.dest)));
    }

    fn emit_cast(&mut self, instr: &Instruction, from: &Type) {
        let to = &instr.ty;
        match (is_float_class(from), is_float_class(to)) {
            (false, false) => {
                let src_w = self.width_of(from);
                let dst_w = self.width_of(to);
                let src = self.int_operand(instr.src1, src_w);
                if dst_w <= src_w {
                    self.mov_to_dest(instr.dest, to, &src);
                } else {
                    let ext = if from.is_unsigned() { "movz" } else { "movs" };
                    let dest_reg = self.scratch(dst_w);
                    self.emit_line(x86::two_op(&format!("{ext}{}{}", att_suffix(src_w), att_suffix(dst_w)), &src, &dest_reg, self.syntax()));
                    self.mov_to_dest(instr.dest, to, &dest_reg);
                }
            }
            (true, false) => {
                let suffix = if self.word_size() == 8 { "q" } else { "l" };
                let mnemonic = format!("cvtt{}2si{suffix}", if matches!(from, Type::Float) { "ss" } else { "sd" });
                let r = self.xmm.acquire().unwrap_or(0);
                let x = x86::xmm_operand(r, self.syntax());
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", from), &self.float_operand(instr.src1), &x, self.syntax()));
                let dest_reg = self.scratch(self.width_of(to));
                self.emit_line(x86::two_op(&mnemonic, &x, &dest_reg, self.syntax()));
                self.mov_to_dest(instr.dest, to, &dest_reg);
                self.xmm.release(r);
            }
            (false, true) => {
                let suffix = if self.word_size() == 8 { "q" } else { "l" };
                let mnemonic = format!("cvtsi2{}{suffix}", if matches!(to, Type::Float) { "ss" } else { "sd" });
                let src = self.int_operand(instr.src1, self.width_of(from));
                let r = self.xmm.acquire().unwrap_or(0);
                let x = x86::xmm_operand(r, self.syntax());
                self.emit_line(x86::two_op(&mnemonic, &src, &x, self.syntax()));
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", to), &x, &self.float_operand(instr.dest), self.syntax()));
                self.xmm.release(r);
            }
            (true, true) if to.is_complex() && !from.is_complex() => {
                // real -> complex: the real component becomes the real half,
                // the imaginary half is zeroed.
                let r = self.xmm.acquire().unwrap_or(0);
                let x = x86::xmm_operand(r, self.syntax());
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", from), &self.float_operand(instr.src1), &x, self.syntax()));
                if matches!(from, Type::Float) {
                    self.emit_line(x86::two_op("cvtss2sd", &x, &x, self.syntax()));
                }
                let (rd, id) = self.cplx_operand(instr.dest);
                self.emit_line(x86::two_op("movsd", &x, &rd, self.syntax()));
                let z = self.xmm.acquire().unwrap_or(1);
                let z_op = x86::xmm_operand(z, self.syntax());
                self.emit_line(x86::two_op("xorpd", &z_op, &z_op, self.syntax()));
                self.emit_line(x86::two_op("movsd", &z_op, &id, self.syntax()));
                self.xmm.release(r);
                self.xmm.release(z);
            }
            (true, true) if from.is_complex() && !to.is_complex() => {
                // complex -> real: C99 6.3.1.7 takes the real part and
                // discards the imaginary one.
                let (rs, _) = self.cplx_operand(instr.src1);
                let r = self.xmm.acquire().unwrap_or(0);
                let x = x86::xmm_operand(r, self.syntax());
                self.emit_line(x86::two_op("movsd", &rs, &x, self.syntax()));
                if matches!(to, Type::Float) {
                    self.emit_line(x86::two_op("cvtsd2ss", &x, &x, self.syntax()));
                }
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", to), &x, &self.float_operand(instr.dest), self.syntax()));
                self.xmm.release(r);
            }
            (true, true) if from.is_complex() && to.is_complex() => {
                // FloatComplex <-> DoubleComplex: components are already
                // carried at double width, so this is a plain copy of both
                // halves.
                let (rs, is) = self.cplx_operand(instr.src1);
                let (rd, id) = self.cplx_operand(instr.dest);
                let r = self.xmm.acquire().unwrap_or(0);
                let x = x86::xmm_operand(r, self.syntax());
                self.emit_line(x86::two_op("movsd", &rs, &x, self.syntax()));
                self.emit_line(x86::two_op("movsd", &x, &rd, self.syntax()));
                self.emit_line(x86::two_op("movsd", &is, &x, self.syntax()));
                self.emit_line(x86::two_op("movsd", &x, &id, self.syntax()));
                self.xmm.release(r);
            }
            (true, true) => {
                let mnemonic = match (from, to) {
                    (Type::Float, Type::Double) | (Type::Float, Type::LongDouble) => "cvtss2sd",
                    (Type::Double, Type::Float) | (Type::LongDouble, Type::Float) => "cvtsd2ss",
                    _ => "movsd",
                };
                let r = self.xmm.acquire().unwrap_or(0);
                let x = x86::xmm_operand(r, self.syntax());
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", from), &self.float_operand(instr.src1), &x, self.syntax()));
                self.emit_line(x86::two_op(mnemonic, &x, &x, self.syntax()));
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", to), &x, &self.float_operand(instr.dest), self.syntax()));
                self.xmm.release(r);
            }
        }
    }

    fn flush_call(&mut self, label_or_ptr: &str, is_ptr: bool, dest: u32, ty: &Type) {
        if is_ptr {
            self.emit_line(x86::one_op("call", &format!("*{label_or_ptr}")));
        } else {
            self.emit_line(x86::one_op("call", label_or_ptr));
        }
        self.pending_int_args.clear();
        self.pending_float_args.clear();
        if dest != 0 {
            if is_float_class(ty) {
                let x0 = x86::xmm_operand(0, self.syntax());
                self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", ty), &x0, &self.float_operand(dest), self.syntax()));
            } else {
                let width = self.width_of(ty);
                let rax = x86::reg_operand(0, width, self.target(), self.syntax());
                self.mov_to_dest(dest, ty, &rax);
            }
        }
    }

    fn emit_instruction(&mut self, instr: &Instruction) {
        match instr.op {
            Op::Const => {
                let width = self.width_of(&instr.ty);
                let dest = self.int_operand(instr.dest, width);
                self.emit_line(x86::two_op(&format!("mov{}", att_suffix(width)), &format!("${}", instr.imm), &dest, self.syntax()));
            }
            Op::CplxConst => {
                // `data` packs the real and imaginary halves as two 8-byte
                // little-endian words; each is moved through the scratch GP
                // register since `mov` cannot write a 64-bit immediate
                // straight to memory on x86-64.
                let data = instr.data.clone().unwrap_or_else(|| vec![0u8; 16]);
                let slot = match self.alloc.loc.get(&instr.dest) {
                    Some(Loc::FloatSlot(n)) => *n,
                    _ => 1,
                };
                let int_region = self.alloc.stack_slots as i64 * self.word_size() as i64;
                let base_offset = -(int_region + slot as i64 * 16);
                let word_reg = x86::reg_operand(0, 8, self.target(), self.syntax());
                for (half, chunk) in [0i64, 8].into_iter().zip(data.chunks(8)) {
                    let mut bytes = [0u8; 8];
                    bytes[..chunk.len().min(8)].copy_from_slice(&chunk[..chunk.len().min(8)]);
                    let bits = u64::from_le_bytes(bytes);
                    let mnemonic = if self.target() == Target::X86_64 { "movabs" } else { "mov" };
                    self.emit_line(x86::two_op(mnemonic, &format!("${bits:#x}"), &word_reg, self.syntax()));
                    let mem = x86::mem_at(base_offset + half, self.target(), self.syntax());
                    self.emit_line(x86::two_op("mov", &word_reg, &mem, self.syntax()));
                }
            }
            Op::CplxAdd => self.emit_cplx_add_sub("addsd", instr),
            Op::CplxSub => self.emit_cplx_add_sub("subsd", instr),
            Op::CplxMul => self.emit_cplx_mul(instr),
            Op::CplxDiv => self.emit_cplx_div(instr),
            Op::Load => {
                let name = instr.name.clone().unwrap_or_default();
                if is_float_class(&instr.ty) {
                    let mnemonic = Self::sse_mnemonic("mov", &instr.ty);
                    let r = self.xmm.acquire().unwrap_or(0);
                    let x = x86::xmm_operand(r, self.syntax());
                    self.emit_line(x86::two_op(&mnemonic, &self.named_operand(&name), &x, self.syntax()));
                    self.emit_line(x86::two_op(&mnemonic, &x, &self.float_operand(instr.dest), self.syntax()));
                    self.xmm.release(r);
                } else {
                    let src = self.named_operand(&name);
                    self.mov_to_dest(instr.dest, &instr.ty, &src);
                }
            }
            Op::Store => {
                let name = instr.name.clone().unwrap_or_default();
                if is_float_class(&instr.ty) {
                    let mnemonic = Self::sse_mnemonic("mov", &instr.ty);
                    let r = self.xmm.acquire().unwrap_or(0);
                    let x = x86::xmm_operand(r, self.syntax());
                    self.emit_line(x86::two_op(&mnemonic, &self.float_operand(instr.src1), &x, self.syntax()));
                    self.emit_line(x86::two_op(&mnemonic, &x, &self.named_operand(&name), self.syntax()));
                    self.xmm.release(r);
                } else {
                    let width = self.width_of(&instr.ty);
                    let src = self.int_operand(instr.src1, width);
                    let scratch;
                    let src = if src.contains('(') || src.contains('[') {
                        scratch = self.materialize(instr.src1, &instr.ty);
                        &scratch
                    } else {
                        &src
                    };
                    self.mov(src, &self.named_operand(&name), width);
                }
            }
            Op::LoadParam => {
                let idx = instr.imm as usize;
                let width = self.width_of(&instr.ty);
                if is_float_class(&instr.ty) {
                    let x = x86::xmm_operand(idx.min(7) as u8, self.syntax());
                    self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", &instr.ty), &x, &self.float_operand(instr.dest), self.syntax()));
                } else if idx < INT_ARGS_64.len() && self.target() == Target::X86_64 {
                    let src = x86::reg_operand(arg_pool_index(idx), width, self.target(), self.syntax());
                    self.mov_to_dest(instr.dest, &instr.ty, &src);
                } else {
                    let stack_index = if self.target() == Target::X86_64 { idx.saturating_sub(INT_ARGS_64.len()) } else { idx };
                    let offset = 2 * self.word_size() as i64 + stack_index as i64 * self.word_size() as i64;
                    let src = x86::mem_at(offset, self.target(), self.syntax());
                    self.mov_to_dest(instr.dest, &instr.ty, &src);
                }
            }
            Op::StoreParam => {
                // reserved for variadic/`va_list` spill bookkeeping; the
                // named-slot model stores parameters through plain STORE.
            }
            Op::Addr | Op::Alloca => {
                let name = instr.name.clone().unwrap_or_default();
                let dest_width = self.width_of(&instr.ty);
                let scratch = self.scratch(dest_width);
                self.emit_line(x86::two_op("lea", &self.named_operand(&name), &scratch, self.syntax()));
                self.mov_to_dest(instr.dest, &instr.ty, &scratch);
            }
            Op::LoadPtr => {
                let ptr = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let mem = match self.syntax() {
                    Syntax::Att => format!("({ptr})"),
                    Syntax::Intel => format!("[{ptr}]"),
                };
                if is_float_class(&instr.ty) {
                    let r = self.xmm.acquire().unwrap_or(0);
                    let x = x86::xmm_operand(r, self.syntax());
                    self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", &instr.ty), &mem, &x, self.syntax()));
                    self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", &instr.ty), &x, &self.float_operand(instr.dest), self.syntax()));
                    self.xmm.release(r);
                } else {
                    self.mov_to_dest(instr.dest, &instr.ty, &mem);
                }
            }
            Op::StorePtr => {
                let ptr = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let mem = match self.syntax() {
                    Syntax::Att => format!("({ptr})"),
                    Syntax::Intel => format!("[{ptr}]"),
                };
                if is_float_class(&instr.ty) {
                    let r = self.xmm.acquire().unwrap_or(0);
                    let x = x86::xmm_operand(r, self.syntax());
                    self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", &instr.ty), &self.float_operand(instr.src2), &x, self.syntax()));
                    self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", &instr.ty), &x, &mem, self.syntax()));
                    self.xmm.release(r);
                } else {
                    let width = self.width_of(&instr.ty);
                    let val = self.materialize(instr.src2, &instr.ty);
                    self.mov(&val, &mem, width);
                }
            }
            Op::LoadIdx => {
                let base = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let index = self.materialize(instr.src2, &Type::Long { unsigned: false });
                let mem = scaled_operand(&base, &index, instr.imm, self.syntax());
                self.mov_to_dest(instr.dest, &instr.ty, &mem);
            }
            Op::StoreIdx => {
                let base = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let index = self.materialize(instr.src2, &Type::Long { unsigned: false });
                let mem = scaled_operand(&base, &index, instr.imm, self.syntax());
                let width = self.width_of(&instr.ty);
                let val = self.int_operand(instr.dest, width);
                self.mov(&val, &mem, width);
            }
            Op::BfLoad => {
                let width = (instr.imm >> 32) as u32;
                let bit_offset = (instr.imm & 0xFFFF_FFFF) as u32;
                let ptr = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let mem = match self.syntax() {
                    Syntax::Att => format!("({ptr})"),
                    Syntax::Intel => format!("[{ptr}]"),
                };
                let unit_width = self.width_of(&instr.ty);
                let tmp = self.scratch(unit_width);
                self.mov(&mem, &tmp, unit_width);
                if bit_offset > 0 {
                    self.emit_line(x86::two_op(&format!("shr{}", att_suffix(unit_width)), &format!("${bit_offset}"), &tmp, self.syntax()));
                }
                let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                self.emit_line(x86::two_op(&format!("and{}", att_suffix(unit_width)), &format!("${mask:#x}"), &tmp, self.syntax()));
                self.mov_to_dest(instr.dest, &instr.ty, &tmp);
            }
            Op::BfStore => {
                let width = (instr.imm >> 32) as u32;
                let bit_offset = (instr.imm & 0xFFFF_FFFF) as u32;
                let unit_width = self.width_of(&instr.ty);
                // reg 0 holds the field's address for the whole sequence;
                // reg 1 accumulates the unit's new value.
                let ptr = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let mem = match self.syntax() {
                    Syntax::Att => format!("({ptr})"),
                    Syntax::Intel => format!("[{ptr}]"),
                };
                let mask = (if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }) << bit_offset;
                let unit = x86::reg_operand(1, unit_width, self.target(), self.syntax());
                self.mov(&mem, &unit, unit_width);
                self.emit_line(x86::two_op(&format!("and{}", att_suffix(unit_width)), &format!("${:#x}", !mask), &unit, self.syntax()));
                // BfStore is src2's last use, so its own location can be
                // shifted in place without disturbing a later read.
                let field = self.int_operand(instr.src2, unit_width);
                if bit_offset > 0 {
                    self.emit_line(x86::two_op(&format!("shl{}", att_suffix(unit_width)), &format!("${bit_offset}"), &field, self.syntax()));
                }
                self.emit_line(x86::two_op(&format!("or{}", att_suffix(unit_width)), &field, &unit, self.syntax()));
                self.mov(&unit, &mem, unit_width);
            }

            Op::Add => self.binary_int("add", instr),
            Op::Sub => self.binary_int("sub", instr),
            Op::Mul => self.binary_int("imul", instr),
            Op::Div => self.emit_div(instr, false),
            Op::Mod => self.emit_div(instr, true),
            Op::Shl => self.emit_shift("shl", instr),
            Op::Shr => {
                let mnemonic = if instr.ty.is_unsigned() { "shr" } else { "sar" };
                self.emit_shift(mnemonic, instr);
            }
            Op::And => self.binary_int("and", instr),
            Op::Or => self.binary_int("or", instr),
            Op::Xor => self.binary_int("xor", instr),

            Op::PtrAdd => {
                let base = self.materialize(instr.src1, &Type::Long { unsigned: false });
                let index = self.int_operand(instr.src2, self.word_size());
                let dest_w = self.word_size();
                let dest = self.scratch(dest_w);
                let mem = scaled_operand(&base, &index, instr.imm, self.syntax());
                self.emit_line(x86::two_op("lea", &mem, &dest, self.syntax()));
                self.mov_to_dest(instr.dest, &instr.ty, &dest);
            }
            Op::PtrDiff => {
                let width = self.word_size();
                let lhs = self.materialize(instr.src1, &instr.ty);
                let rhs = self.int_operand(instr.src2, width);
                self.emit_line(x86::two_op("sub", &rhs, &lhs, self.syntax()));
                if instr.imm > 1 {
                    self.emit_line(format!("    sar ${}, {lhs}", (instr.imm as f64).log2() as i64));
                }
                self.mov_to_dest(instr.dest, &instr.ty, &lhs);
            }

            Op::FAdd | Op::FSub | Op::FMul | Op::FDiv => {
                let base = match instr.op {
                    Op::FAdd => "add",
                    Op::FSub => "sub",
                    Op::FMul => "mul",
                    _ => "div",
                };
                self.emit_float_binary(base, instr);
            }
            Op::LfAdd | Op::LfSub | Op::LfMul | Op::LfDiv => {
                let base = match instr.op {
                    Op::LfAdd => "fadd",
                    Op::LfSub => "fsub",
                    Op::LfMul => "fmul",
                    _ => "fdiv",
                };
                self.emit_long_double_binary(base, instr);
            }

            Op::CmpEq | Op::CmpNe | Op::CmpLt | Op::CmpGt | Op::CmpLe | Op::CmpGe => {
                let operand_ty = Type::Int { unsigned: false };
                self.emit_compare(instr, &operand_ty);
            }
            Op::LogAnd | Op::LogOr => {
                let width = self.width_of(&instr.ty);
                let a = self.materialize(instr.src1, &instr.ty);
                self.emit_line(x86::two_op("test", &a, &a, self.syntax()));
                let byte = self.scratch(1);
                self.emit_line(x86::one_op("setne", &byte));
                let b = self.int_operand(instr.src2, width);
                self.emit_line(x86::two_op("test", &b, &b, self.syntax()));
                let byte2 = x86::reg_operand(1, 1, self.target(), self.syntax());
                self.emit_line(x86::one_op("setne", &byte2));
                let mnemonic = if instr.op == Op::LogAnd { "and" } else { "or" };
                self.emit_line(x86::two_op(mnemonic, &byte2, &byte, self.syntax()));
                self.mov_to_dest(instr.dest, &instr.ty, &byte);
            }

            Op::Cast => {
                // the caller (walker) resolves the source type from the
                // instruction that defines `src1`; see `resolve_cast_source`.
            }

            Op::Arg => {
                if is_float_class(&instr.ty) {
                    self.pending_float_args.push(instr.src1);
                } else {
                    self.pending_int_args.push(instr.src1);
                }
            }
            Op::Call => {
                self.flush_arguments();
                let name = instr.name.clone().unwrap_or_default();
                self.flush_call(&name, false, instr.dest, &instr.ty);
            }
            Op::CallNr => {
                self.flush_arguments();
                let name = instr.name.clone().unwrap_or_default();
                self.flush_call(&name, false, 0, &instr.ty);
            }
            Op::CallPtr => {
                self.flush_arguments();
                let ptr = self.int_operand(instr.src1, self.word_size());
                self.flush_call(&ptr, true, instr.dest, &instr.ty);
            }
            Op::CallPtrNr => {
                self.flush_arguments();
                let ptr = self.int_operand(instr.src1, self.word_size());
                self.flush_call(&ptr, true, 0, &instr.ty);
            }
            Op::Return => {
                if instr.src1 != 0 {
                    if is_float_class(&instr.ty) {
                        let src = self.float_operand(instr.src1);
                        let x0 = x86::xmm_operand(0, self.syntax());
                        self.emit_line(x86::two_op(&Self::sse_mnemonic("mov", &instr.ty), &src, &x0, self.syntax()));
                    } else {
                        let width = self.width_of(&instr.ty);
                        let src = self.int_operand(instr.src1, width);
                        let rax = x86::reg_operand(0, width, self.target(), self.syntax());
                        if src != rax {
                            self.mov(&src, &rax, width);
                        }
                    }
                }
                self.out.push_str(&prologue::emit_epilogue(&self.callee_saved, self.target(), self.syntax()));
            }
            Op::ReturnAgg => {
                let width = self.word_size();
                let src = self.int_operand(instr.src1, width);
                let rax = x86::reg_operand(0, width, self.target(), self.syntax());
                if src != rax {
                    self.mov(&src, &rax, width);
                }
                self.out.push_str(&prologue::emit_epilogue(&self.callee_saved, self.target(), self.syntax()));
            }
            Op::FuncBegin | Op::FuncEnd => {}
            Op::Br => {
                let target = instr.name.clone().unwrap_or_default();
                self.emit_line(x86::one_op("jmp", &target));
            }
            Op::BCond => {
                let target = instr.name.clone().unwrap_or_default();
                let cond = self.int_operand(instr.src1, self.width_of(&Type::Int { unsigned: false }));
                self.emit_line(x86::two_op("test", &cond, &cond, self.syntax()));
                self.emit_line(x86::one_op("jne", &target));
            }
            Op::Label => {
                let name = instr.name.clone().unwrap_or_default();
                self.out.push_str(&format!("{name}:\n"));
            }

            Op::GlobString | Op::GlobWString | Op::GlobVar | Op::GlobArray | Op::GlobStruct | Op::GlobUnion => {
                // global-data instructions never appear inside a function span.
            }
        }
    }

    fn flush_arguments(&mut self) {
        let int_args = std::mem::take(&mut self.pending_int_args);
        let float_args = std::mem::take(&mut self.pending_float_args);
        for (i, v) in int_args.iter().enumerate() {
            let width = self.word_size();
            let src = self.int_operand(*v, width);
            if self.target() == Target::X86_64 && i < INT_ARGS_64.len() {
                let dst = x86::reg_operand(arg_pool_index(i), width, self.target(), self.syntax());
                if src != dst {
                    self.mov(&src, &dst, width);
                }
            } else {
                self.emit_line(x86::one_op("push", &src));
            }
        }
        for (i, v) in float_args.iter().enumerate() {
            let src = self.float_operand(*v);
            let x = x86::xmm_operand(i.min(7) as u8, self.syntax());
            self.emit_line(x86::two_op("movsd", &src, &x, self.syntax()));
        }
    }
}

/// Maps a logical SysV integer-argument index (0..=5) onto this codegen's
/// allocator index space, reusing the scratch/pool registers since argument
/// setup happens before the call, after any value's last use has expired.
fn arg_pool_index(logical: usize) -> u8 {
    // not a regalloc index: this returns a *named* register directly via
    // reg_name's table, so any table slot works as long as it is consistent;
    // slots 3..=7 line up with rsi/rdi/r8/r9/r10 on x86-64, slot 1 with rdx.
    [1, 3, 4, 5, 6, 7][logical.min(5)]
}

fn scaled_operand(base: &str, index: &str, elem_size: i64, syntax: Syntax) -> String {
    let scale = match elem_size {
        1 | 2 | 4 | 8 => elem_size,
        _ => 1,
    };
    match syntax {
        Syntax::Att => format!("({base}, {index}, {scale})"),
        Syntax::Intel => format!("[{base} + {index} * {scale}]"),
    }
}

/// Emits one function's body, from its `FUNC_BEGIN` to `FUNC_END` inclusive.
pub fn emit_function(config: &CompilerConfig, ir: &IrBuilder, begin: usize, end: usize) -> String {
    let instrs = &ir.instructions[begin..=end];
    let name = instrs[0].name.clone().unwrap_or_default();
    let word_size = config.target.word_size();

    let alloc = regalloc::allocate(ir, begin, end);
    let named = prologue::allocate_named_slots(instrs, word_size);
    let frame = prologue::frame_size(&named, word_size, alloc.stack_slots, alloc.float_slots);

    let callee_saved: Vec<&'static str> = if alloc.loc.values().any(|l| matches!(l, Loc::Reg(2))) {
        vec![match config.target {
            Target::X86_64 => "rbx",
            Target::X86_32 => "ebx",
        }]
    } else {
        Vec::new()
    };

    let mut emitter = FuncEmitter {
        config,
        alloc,
        named,
        xmm: XmmPool::new(),
        out: String::new(),
        pending_int_args: Vec::new(),
        pending_float_args: Vec::new(),
        callee_saved: callee_saved.clone(),
    };

    let mut out = format!("{name}:\n");
    out.push_str(&prologue::emit_prologue(frame, &callee_saved, config.target, config.syntax));

    let mut cast_sources: std::collections::HashMap<u32, Type> = std::collections::HashMap::new();
    for instr in &instrs[1..instrs.len() - 1] {
        if instr.dest != 0 && instr.op != Op::StoreIdx {
            cast_sources.insert(instr.dest, instr.ty.clone());
        }
        if instr.op == Op::Cast {
            let from = cast_sources.get(&instr.src1).cloned().unwrap_or(Type::Int { unsigned: false });
            emitter.emit_cast(instr, &from);
        } else {
            emitter.emit_instruction(instr);
        }
    }
    out.push_str(&emitter.out);
    out
}
