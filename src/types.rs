//! C's type system: a tagged `Type` enum plus aggregate field layout.

use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
    /// `Some(width)` for a bit-field; bits are packed LSB-first within a
    /// storage unit sized by `ty` (see SPEC_FULL.md Design Notes).
    pub bit_width: Option<u32>,
    pub bit_offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub tag: String,
    pub fields: Vec<Field>,
    pub size: u32,
    pub align: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Char { unsigned: bool },
    Short { unsigned: bool },
    Int { unsigned: bool },
    Long { unsigned: bool },
    LLong { unsigned: bool },
    Float,
    Double,
    LongDouble,
    FloatComplex,
    DoubleComplex,
    Ptr(Rc<Type>),
    Array(Rc<Type>, Option<u32>),
    Struct(Rc<Aggregate>),
    Union(Rc<Aggregate>),
    Enum(String),
    Func {
        ret: Rc<Type>,
        params: Vec<Type>,
        variadic: bool,
    },
    Unknown,
}

impl Type {
    pub fn ptr_to(self) -> Type {
        Type::Ptr(Rc::new(self))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Char { .. }
                | Type::Short { .. }
                | Type::Int { .. }
                | Type::Long { .. }
                | Type::LLong { .. }
                | Type::Enum(_)
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double | Type::LongDouble)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Type::FloatComplex | Type::DoubleComplex)
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Char { unsigned: true }
                | Type::Short { unsigned: true }
                | Type::Int { unsigned: true }
                | Type::Long { unsigned: true }
                | Type::LLong { unsigned: true }
        )
    }

    pub fn decay(&self) -> Type {
        match self {
            Type::Array(elem, _) => Type::Ptr(elem.clone()),
            Type::Func { .. } => Type::Ptr(Rc::new(self.clone())),
            other => other.clone(),
        }
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(t) => Some(t),
            Type::Array(t, _) => Some(t),
            _ => None,
        }
    }

    /// Size in bytes on the given target word size (4 for x86-32, 8 for x86-64).
    pub fn size_of(&self, word_size: u32) -> u32 {
        match self {
            Type::Void => 1,
            Type::Bool | Type::Char { .. } => 1,
            Type::Short { .. } => 2,
            Type::Int { .. } => 4,
            Type::Long { .. } => word_size,
            Type::LLong { .. } => 8,
            Type::Float => 4,
            Type::Double => 8,
            Type::LongDouble => 16,
            Type::FloatComplex => 8,
            Type::DoubleComplex => 16,
            Type::Ptr(_) => word_size,
            Type::Array(elem, Some(n)) => elem.size_of(word_size) * n,
            Type::Array(_, None) => word_size,
            Type::Struct(agg) | Type::Union(agg) => agg.size,
            Type::Enum(_) => 4,
            Type::Func { .. } => word_size,
            Type::Unknown => 0,
        }
    }

    pub fn align_of(&self, word_size: u32) -> u32 {
        match self {
            Type::Array(elem, _) => elem.align_of(word_size),
            Type::Struct(agg) | Type::Union(agg) => agg.align,
            other => other.size_of(word_size).min(word_size).max(1),
        }
    }

    /// Rank used by the usual arithmetic conversions: higher wins.
    pub fn rank(&self) -> u8 {
        match self {
            Type::Bool => 0,
            Type::Char { .. } => 1,
            Type::Short { .. } => 2,
            Type::Int { .. } | Type::Enum(_) => 3,
            Type::Long { .. } => 4,
            Type::LLong { .. } => 5,
            Type::Float => 6,
            Type::Double => 7,
            Type::LongDouble => 8,
            Type::FloatComplex => 9,
            Type::DoubleComplex => 10,
            _ => 3,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "_Bool"),
            Type::Char { unsigned } => write!(f, "{}char", if *unsigned { "unsigned " } else { "" }),
            Type::Short { unsigned } => write!(f, "{}short", if *unsigned { "unsigned " } else { "" }),
            Type::Int { unsigned } => write!(f, "{}int", if *unsigned { "unsigned " } else { "" }),
            Type::Long { unsigned } => write!(f, "{}long", if *unsigned { "unsigned " } else { "" }),
            Type::LLong { unsigned } => write!(f, "{}long long", if *unsigned { "unsigned " } else { "" }),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::LongDouble => write!(f, "long double"),
            Type::FloatComplex => write!(f, "float _Complex"),
            Type::DoubleComplex => write!(f, "double _Complex"),
            Type::Ptr(t) => write!(f, "{t} *"),
            Type::Array(t, Some(n)) => write!(f, "{t} [{n}]"),
            Type::Array(t, None) => write!(f, "{t} []"),
            Type::Struct(agg) => write!(f, "struct {}", agg.tag),
            Type::Union(agg) => write!(f, "union {}", agg.tag),
            Type::Enum(tag) => write!(f, "enum {tag}"),
            Type::Func { ret, params, variadic } => {
                write!(f, "{ret} (")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *variadic {
                    write!(f, ", ...")?;
                }
                write!(f, ")")
            }
            Type::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// Computes field offsets for a struct, honoring `#pragma pack`'s alignment
/// ceiling on the storage unit (never the bit position within it).
pub fn layout_struct(tag: &str, mut fields: Vec<Field>, word_size: u32, pack: u32) -> Aggregate {
    let mut offset = 0u32;
    let mut max_align = 1u32;
    let mut bit_cursor = 0u32;
    let mut current_unit_offset: Option<u32> = None;

    for field in fields.iter_mut() {
        let natural_align = field.ty.align_of(word_size);
        let align = if pack > 0 { natural_align.min(pack) } else { natural_align };
        max_align = max_align.max(align);

        if let Some(width) = field.bit_width {
            let unit_size = field.ty.size_of(word_size);
            let unit_bits = unit_size * 8;
            if current_unit_offset.is_none() || bit_cursor + width > unit_bits {
                offset = round_up(offset, align);
                current_unit_offset = Some(offset);
                offset += unit_size;
                bit_cursor = 0;
            }
            field.offset = current_unit_offset.unwrap();
            field.bit_offset = bit_cursor;
            bit_cursor += width;
        } else {
            current_unit_offset = None;
            bit_cursor = 0;
            offset = round_up(offset, align);
            field.offset = offset;
            offset += field.ty.size_of(word_size);
        }
    }

    let size = round_up(offset.max(1), max_align);
    Aggregate {
        tag: tag.to_string(),
        fields,
        size,
        align: max_align,
    }
}

pub fn layout_union(tag: &str, mut fields: Vec<Field>, word_size: u32) -> Aggregate {
    let mut size = 0u32;
    let mut align = 1u32;
    for field in fields.iter_mut() {
        field.offset = 0;
        field.bit_offset = 0;
        size = size.max(field.ty.size_of(word_size));
        align = align.max(field.ty.align_of(word_size));
    }
    Aggregate {
        tag: tag.to_string(),
        fields,
        size: round_up(size.max(1), align),
        align,
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_fields_are_aligned() {
        let fields = vec![
            Field { name: "a".into(), ty: Type::Char { unsigned: false }, offset: 0, bit_width: None, bit_offset: 0 },
            Field { name: "b".into(), ty: Type::Int { unsigned: false }, offset: 0, bit_width: None, bit_offset: 0 },
        ];
        let agg = layout_struct("S", fields, 8, 0);
        assert_eq!(agg.fields[0].offset, 0);
        assert_eq!(agg.fields[1].offset, 4);
        assert_eq!(agg.size, 8);
    }

    #[test]
    fn pack_one_eliminates_padding() {
        let fields = vec![
            Field { name: "a".into(), ty: Type::Char { unsigned: false }, offset: 0, bit_width: None, bit_offset: 0 },
            Field { name: "b".into(), ty: Type::Int { unsigned: false }, offset: 0, bit_width: None, bit_offset: 0 },
        ];
        let agg = layout_struct("S", fields, 8, 1);
        assert_eq!(agg.fields[1].offset, 1);
        assert_eq!(agg.size, 5);
    }

    #[test]
    fn union_fields_share_offset_zero() {
        let fields = vec![
            Field { name: "i".into(), ty: Type::Int { unsigned: false }, offset: 0, bit_width: None, bit_offset: 0 },
            Field { name: "d".into(), ty: Type::Double, offset: 0, bit_width: None, bit_offset: 0 },
        ];
        let agg = layout_union("U", fields, 8);
        assert_eq!(agg.fields[0].offset, 0);
        assert_eq!(agg.fields[1].offset, 0);
        assert_eq!(agg.size, 8);
    }

    #[test]
    fn bitfields_pack_lsb_first_within_a_unit() {
        let fields = vec![
            Field { name: "a".into(), ty: Type::Int { unsigned: false }, offset: 0, bit_width: Some(3), bit_offset: 0 },
            Field { name: "b".into(), ty: Type::Int { unsigned: false }, offset: 0, bit_width: Some(5), bit_offset: 0 },
        ];
        let agg = layout_struct("S", fields, 8, 0);
        assert_eq!(agg.fields[0].offset, 0);
        assert_eq!(agg.fields[0].bit_offset, 0);
        assert_eq!(agg.fields[1].offset, 0);
        assert_eq!(agg.fields[1].bit_offset, 3);
    }
}
