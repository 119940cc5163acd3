//! Global data emission (SPEC_FULL.md §4.7): strings, wide strings, and the
//! byte-encoded initializers `sema::lower` attaches to `GLOB_VAR`/
//! `GLOB_ARRAY`/`GLOB_STRUCT`/`GLOB_UNION`.

use crate::ir::{Instruction, IrBuilder, Op};

fn emit_byte_rows(data: &[u8]) -> String {
    let mut out = String::new();
    for chunk in data.chunks(12) {
        let values: Vec<String> = chunk.iter().map(|b| format!("0x{b:02x}")).collect();
        out.push_str(&format!("    .byte {}\n", values.join(", ")));
    }
    out
}

/// Escapes everything outside printable ASCII (plus the quote and
/// backslash) as `\xHH`; a NUL embedded before the string's own terminator
/// always gets this treatment rather than ending the literal early.
fn escape_asciz_body(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

fn emit_one(instr: &Instruction, word_size: u32) -> String {
    let name = instr.name.clone().unwrap_or_default();
    let mut out = format!("{name}:\n");
    match instr.op {
        Op::GlobString => {
            let data = instr.data.as_deref().unwrap_or(&[]);
            // `data` carries its own trailing NUL; `.asciz` supplies one of
            // its own, so the stored terminator is stripped before escaping.
            let body = if data.last() == Some(&0) { &data[..data.len() - 1] } else { data };
            out.push_str(&format!("    .asciz \"{}\"\n", escape_asciz_body(body)));
        }
        Op::GlobWString => {
            let data = instr.data.as_deref().unwrap_or(&[]);
            for chunk in data.chunks(4) {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                out.push_str(&format!("    .long {}\n", u32::from_le_bytes(word)));
            }
        }
        Op::GlobVar | Op::GlobArray | Op::GlobStruct | Op::GlobUnion => {
            let data = instr.data.clone().unwrap_or_default();
            let declared = instr.ty.size_of(word_size);
            if !data.is_empty() {
                out.push_str(&emit_byte_rows(&data));
            }
            let written = data.len() as u32;
            if written < declared {
                out.push_str(&format!("    .zero {}\n", declared - written));
            }
        }
        _ => {}
    }
    out
}

/// Emits the `.data` section for every global-data instruction in the IR,
/// in definition order.
pub fn emit_globals(ir: &IrBuilder, word_size: u32) -> String {
    let globals: Vec<&Instruction> = ir
        .instructions
        .iter()
        .filter(|i| matches!(i.op, Op::GlobString | Op::GlobWString | Op::GlobVar | Op::GlobArray | Op::GlobStruct | Op::GlobUnion))
        .collect();
    if globals.is_empty() {
        return String::new();
    }
    let mut out = String::from(".data\n");
    for instr in globals {
        out.push_str(&emit_one(instr, word_size));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn string_terminator_is_not_double_escaped() {
        let mut ir = IrBuilder::new();
        let mut bytes = b"hi".to_vec();
        bytes.push(0);
        ir.emit_glob_data(Op::GlobString, "Lstr0", bytes, Type::Char { unsigned: false }, 0, 0);
        let text = emit_globals(&ir, 8);
        assert!(text.contains(".asciz \"hi\""));
        assert!(!text.contains("\\x00\""));
    }

    #[test]
    fn embedded_nul_is_escaped() {
        let mut ir = IrBuilder::new();
        let bytes = vec![b'a', 0, b'b', 0];
        ir.emit_glob_data(Op::GlobString, "Lstr1", bytes, Type::Char { unsigned: false }, 0, 0);
        let text = emit_globals(&ir, 8);
        assert!(text.contains("a\\x00b"));
    }

    #[test]
    fn short_initializer_is_padded_to_declared_size() {
        let mut ir = IrBuilder::new();
        ir.emit_glob_data(Op::GlobArray, "arr", vec![1, 2], Type::Array(std::rc::Rc::new(Type::Int { unsigned: false }), Some(4)), 0, 0);
        let text = emit_globals(&ir, 8);
        assert!(text.contains(".zero 14"));
    }
}
