//! Frame layout and function prologue/epilogue (SPEC_FULL.md §4.7).
//!
//! Two disjoint regions live below the frame base: named local storage
//! (the aggregates and named scalars `Load`/`Store`/`Addr`/`Alloca`
//! reference directly by name) and the register allocator's spill region
//! (integer slots plus 16-byte-stride float slots). Both are packed in
//! first-seen order and the whole frame is rounded up to 16 bytes, matching
//! the System V psABI alignment requirement at a `call` instruction.

use crate::config::{Syntax, Target};
use crate::ir::{Instruction, Op};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct NamedSlots {
    pub offsets: HashMap<String, i64>,
    pub size: u32,
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Packs every distinct named local referenced in one function's body into
/// its own frame slot, in first-seen order, honoring each reference's
/// alignment.
pub fn allocate_named_slots(instrs: &[Instruction], word_size: u32) -> NamedSlots {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for instr in instrs {
        let name = match instr.op {
            Op::Alloca | Op::Load | Op::Store | Op::Addr => instr.name.clone(),
            _ => None,
        };
        let Some(name) = name else { continue };
        if seen.insert(name.clone()) {
            let size = if instr.op == Op::Alloca { instr.imm.max(1) as u32 } else { instr.ty.size_of(word_size).max(1) };
            let align = instr.ty.align_of(word_size).max(1);
            order.push((name, size, align));
        }
    }

    let mut offset = 0u32;
    let mut offsets = HashMap::new();
    for (name, size, align) in order {
        offset = round_up(offset + size, align);
        offsets.insert(name, -(offset as i64));
    }
    NamedSlots { offsets, size: offset }
}

/// Total frame size (named locals + spill region), rounded up to 16 bytes.
pub fn frame_size(named: &NamedSlots, word_size: u32, int_slots: u32, float_slots: u32) -> u32 {
    let spill = int_slots * word_size + float_slots * 16;
    round_up(named.size + spill, 16)
}

fn bp_reg(target: Target) -> &'static str {
    match target {
        Target::X86_64 => "rbp",
        Target::X86_32 => "ebp",
    }
}

fn sp_reg(target: Target) -> &'static str {
    match target {
        Target::X86_64 => "rsp",
        Target::X86_32 => "esp",
    }
}

fn reg(name: &str, syntax: Syntax) -> String {
    match syntax {
        Syntax::Att => format!("%{name}"),
        Syntax::Intel => name.to_string(),
    }
}

/// `push bp; mov sp, bp; sub frame_size, sp`, plus a push per callee-saved
/// pool register actually referenced in the function body (the allocator
/// never hands out a register the body doesn't use, so this only saves what
/// is live).
pub fn emit_prologue(frame_size: u32, callee_saved: &[&str], target: Target, syntax: Syntax) -> String {
    let bp = bp_reg(target);
    let sp = sp_reg(target);
    let mut out = String::new();
    match syntax {
        Syntax::Att => {
            out.push_str(&format!("    push %{bp}\n"));
            out.push_str(&format!("    mov %{sp}, %{bp}\n"));
            if frame_size > 0 {
                out.push_str(&format!("    sub ${frame_size}, %{sp}\n"));
            }
            for r in callee_saved {
                out.push_str(&format!("    push %{r}\n"));
            }
        }
        Syntax::Intel => {
            out.push_str(&format!("    push {bp}\n"));
            out.push_str(&format!("    mov {bp}, {sp}\n"));
            if frame_size > 0 {
                out.push_str(&format!("    sub {sp}, {frame_size}\n"));
            }
            for r in callee_saved {
                out.push_str(&format!("    push {r}\n"));
            }
        }
    }
    out
}

/// Restores callee-saved registers (reverse push order), tears the frame
/// down, and returns.
pub fn emit_epilogue(callee_saved: &[&str], _target: Target, syntax: Syntax) -> String {
    let mut out = String::new();
    for r in callee_saved.iter().rev() {
        out.push_str(&format!("    pop {}\n", reg(r, syntax)));
    }
    out.push_str("    leave\n");
    out.push_str("    ret\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;
    use crate::types::Type;

    #[test]
    fn named_slots_pack_in_first_seen_order() {
        let mut ir = IrBuilder::new();
        ir.emit_store("a", 0, Type::Int { unsigned: false }, 0, 0);
        ir.emit_store("b", 0, Type::Char { unsigned: false }, 0, 0);
        let slots = allocate_named_slots(&ir.instructions, 8);
        assert_eq!(slots.offsets["a"], -4);
        assert_eq!(slots.offsets["b"], -5);
        assert_eq!(slots.size, 5);
    }

    #[test]
    fn frame_size_rounds_up_to_sixteen() {
        let named = NamedSlots { offsets: HashMap::new(), size: 5 };
        assert_eq!(frame_size(&named, 8, 1, 0), 16);
        assert_eq!(frame_size(&named, 8, 2, 0), 32);
    }
}
