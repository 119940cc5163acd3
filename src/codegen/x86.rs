//! Register naming and operand formatting (SPEC_FULL.md §4.7).
//!
//! The allocator's pool (see `regalloc.rs`) assumes eight addressable slots
//! (two scratch, six general-purpose) sized for x86-64's larger register
//! file. On the 32-bit target only four general-purpose registers remain
//! once the frame pointer and stack pointer are excluded, so pool indices 6
//! and 7 alias indices 2 and 3 there; see DESIGN.md for the consequence.

use crate::config::{Syntax, Target};
use crate::regalloc::Loc;

/// `[8-bit, 16-bit, 32-bit, 64-bit]` name table for one allocator index.
const X64_NAMES: [[&str; 4]; 8] = [
    ["al", "ax", "eax", "rax"],
    ["dl", "dx", "edx", "rdx"],
    ["bl", "bx", "ebx", "rbx"],
    ["sil", "si", "esi", "rsi"],
    ["dil", "di", "edi", "rdi"],
    ["r8b", "r8w", "r8d", "r8"],
    ["r9b", "r9w", "r9d", "r9"],
    ["r10b", "r10w", "r10d", "r10"],
];

/// 32-bit target has only six usable registers; indices 6 and 7 fold onto
/// 2 and 3 (documented in DESIGN.md rather than widening the frame).
const X86_NAMES: [[&str; 4]; 8] = [
    ["al", "ax", "eax", "eax"],
    ["cl", "cx", "ecx", "ecx"],
    ["bl", "bx", "ebx", "ebx"],
    ["dl", "dx", "edx", "edx"],
    ["", "si", "esi", "esi"],
    ["", "di", "edi", "edi"],
    ["bl", "bx", "ebx", "ebx"],
    ["dl", "dx", "edx", "edx"],
];

fn width_slot(width_bytes: u32) -> usize {
    match width_bytes {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

/// Bare register name (no syntax-specific decoration) for allocator index
/// `reg` at the given operand width, on the selected target.
pub fn reg_name(reg: u8, width_bytes: u32, target: Target) -> &'static str {
    let table = match target {
        Target::X86_64 => &X64_NAMES,
        Target::X86_32 => &X86_NAMES,
    };
    table[reg as usize % 8][width_slot(width_bytes)]
}

/// Register operand formatted for the selected assembler syntax
/// (`%rax` AT&T, `rax` Intel).
pub fn reg_operand(reg: u8, width_bytes: u32, target: Target, syntax: Syntax) -> String {
    let name = reg_name(reg, width_bytes, target);
    match syntax {
        Syntax::Att => format!("%{name}"),
        Syntax::Intel => name.to_string(),
    }
}

/// Frame-relative memory operand at an arbitrary byte offset from the base
/// pointer; the building block every other frame-relative operand uses.
pub fn mem_at(offset: i64, target: Target, syntax: Syntax) -> String {
    let base = match target {
        Target::X86_64 => "rbp",
        Target::X86_32 => "ebp",
    };
    match syntax {
        Syntax::Att => format!("{offset}(%{base})"),
        Syntax::Intel => format!("[{base}{offset:+}]"),
    }
}

/// Frame-relative memory operand for a spilled integer/pointer slot.
pub fn slot_operand(slot: u32, target: Target, syntax: Syntax) -> String {
    let word_size = target.word_size() as i64;
    mem_at(-(slot as i64) * word_size, target, syntax)
}

/// Frame-relative memory operand for a float/double/long-double/complex
/// slot, packed into its own 16-byte-stride region below the integer slots.
pub fn float_slot_operand(slot: u32, int_slots: u32, target: Target, syntax: Syntax) -> String {
    let word_size = target.word_size() as i64;
    let int_region = int_slots as i64 * word_size;
    mem_at(-(int_region + slot as i64 * 16), target, syntax)
}

/// Renders a value's location (allotted by the register allocator) as an
/// operand of the given width.
pub fn loc_operand(loc: Loc, width_bytes: u32, int_slots: u32, target: Target, syntax: Syntax) -> String {
    match loc {
        Loc::Reg(r) => reg_operand(r, width_bytes, target, syntax),
        Loc::Slot(n) => slot_operand(n, target, syntax),
        Loc::FloatSlot(n) => float_slot_operand(n, int_slots, target, syntax),
    }
}

/// XMM register operand, e.g. `%xmm2` / `xmm2`.
pub fn xmm_operand(index: u8, syntax: Syntax) -> String {
    match syntax {
        Syntax::Att => format!("%xmm{index}"),
        Syntax::Intel => format!("xmm{index}"),
    }
}

/// Width suffix for AT&T mnemonics (`movb`, `movw`, `movl`, `movq`).
pub fn att_suffix(width_bytes: u32) -> char {
    match width_bytes {
        1 => 'b',
        2 => 'w',
        4 => 'l',
        _ => 'q',
    }
}

/// Two-operand instruction text, honoring AT&T's `src, dst` vs Intel's
/// `dst, src` operand order.
pub fn two_op(mnemonic: &str, src: &str, dst: &str, syntax: Syntax) -> String {
    match syntax {
        Syntax::Att => format!("    {mnemonic} {src}, {dst}"),
        Syntax::Intel => format!("    {mnemonic} {dst}, {src}"),
    }
}

/// One-operand instruction text (`neg %eax` / `neg eax`).
pub fn one_op(mnemonic: &str, operand: &str) -> String {
    format!("    {mnemonic} {operand}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names_carry_width_suffixes() {
        assert_eq!(reg_name(3, 1, Target::X86_64), "sil");
        assert_eq!(reg_name(3, 8, Target::X86_64), "rsi");
        assert_eq!(reg_operand(3, 4, Target::X86_64, Syntax::Att), "%esi");
        assert_eq!(reg_operand(3, 4, Target::X86_64, Syntax::Intel), "esi");
    }

    #[test]
    fn thirty_two_bit_pool_aliases_high_indices_onto_low_ones() {
        assert_eq!(reg_name(6, 4, Target::X86_32), reg_name(2, 4, Target::X86_32));
        assert_eq!(reg_name(7, 4, Target::X86_32), reg_name(3, 4, Target::X86_32));
    }

    #[test]
    fn stack_slots_grow_downward_from_the_frame_base() {
        assert_eq!(slot_operand(1, Target::X86_64, Syntax::Att), "-8(%rbp)");
        assert_eq!(slot_operand(2, Target::X86_64, Syntax::Att), "-16(%rbp)");
        assert_eq!(slot_operand(1, Target::X86_64, Syntax::Intel), "[rbp-8]");
    }

    #[test]
    fn float_slots_sit_below_the_integer_spill_region() {
        // two integer slots (16 bytes) precede the first float slot.
        assert_eq!(float_slot_operand(1, 2, Target::X86_64, Syntax::Att), "-32(%rbp)");
    }

    #[test]
    fn two_op_honors_operand_order_per_syntax() {
        assert_eq!(two_op("mov", "%eax", "%ebx", Syntax::Att), "    mov %eax, %ebx");
        assert_eq!(two_op("mov", "eax", "ebx", Syntax::Intel), "    mov ebx, eax");
    }

    #[test]
    fn att_suffix_matches_operand_width() {
        assert_eq!(att_suffix(1), 'b');
        assert_eq!(att_suffix(2), 'w');
        assert_eq!(att_suffix(4), 'l');
        assert_eq!(att_suffix(8), 'q');
    }
}
