//! Attribute-body decoders shared by class-, field-, and method-level
//! attribute parsing: annotations, recursive element values, and signature
//! mining for referenced class names.

use std::sync::Arc;

use anyhow::{Result, bail};

use super::constant_pool::ConstantPool;
use super::reader::Cursor;
use super::record::{Annotation, ConstantValue, ElementValue};

pub fn read_annotations(cursor: &mut Cursor<'_>, pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let count = cursor.read_u2()?;
    (0..count).map(|_| read_annotation(cursor, pool)).collect()
}

pub fn read_annotation(cursor: &mut Cursor<'_>, pool: &ConstantPool) -> Result<Annotation> {
    let type_index = cursor.read_u2()?;
    let type_descriptor = pool.utf8(type_index)?;
    let pair_count = cursor.read_u2()?;
    let mut elements = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name_index = cursor.read_u2()?;
        let name = pool.utf8(name_index)?;
        let value = read_element_value(cursor, pool)?;
        elements.push((name, value));
    }
    Ok(Annotation { type_descriptor, elements })
}

pub fn read_element_value(cursor: &mut Cursor<'_>, pool: &ConstantPool) -> Result<ElementValue> {
    let tag = cursor.read_u1()?;
    Ok(match tag {
        b'B' => ElementValue::Byte(pool.integer_value(cursor.read_u2()?)?),
        b'C' => ElementValue::Char(pool.integer_value(cursor.read_u2()?)?),
        b'D' => ElementValue::Double(pool.double_value(cursor.read_u2()?)?),
        b'F' => ElementValue::Float(pool.float_value(cursor.read_u2()?)?),
        b'I' => ElementValue::Int(pool.integer_value(cursor.read_u2()?)?),
        b'J' => ElementValue::Long(pool.long_value(cursor.read_u2()?)?),
        b'S' => ElementValue::Short(pool.integer_value(cursor.read_u2()?)?),
        b'Z' => ElementValue::Boolean(pool.integer_value(cursor.read_u2()?)? != 0),
        b's' => ElementValue::String(pool.utf8(cursor.read_u2()?)?),
        b'e' => {
            let type_descriptor = pool.utf8(cursor.read_u2()?)?;
            let const_name = pool.utf8(cursor.read_u2()?)?;
            ElementValue::Enum { type_descriptor, const_name }
        }
        b'c' => ElementValue::Class(pool.utf8(cursor.read_u2()?)?),
        b'@' => ElementValue::Annotation(read_annotation(cursor, pool)?),
        b'[' => {
            let count = cursor.read_u2()?;
            let values = (0..count).map(|_| read_element_value(cursor, pool)).collect::<Result<Vec<_>>>()?;
            ElementValue::Array(values)
        }
        other => bail!("unrecognized annotation element-value tag '{}'", other as char),
    })
}

/// Decode a `ConstantValue` attribute body given the owning field's
/// descriptor, which determines how to interpret the narrow numeric type.
pub fn read_constant_value(cursor: &mut Cursor<'_>, pool: &ConstantPool, field_descriptor: &str) -> Result<ConstantValue> {
    let index = cursor.read_u2()?;
    let first = field_descriptor.as_bytes().first().copied().unwrap_or(b'?');
    Ok(match first {
        b'B' | b'C' | b'I' | b'S' | b'Z' => ConstantValue::Int(pool.integer_value(index)?),
        b'F' => ConstantValue::Float(pool.float_value(index)?),
        b'J' => ConstantValue::Long(pool.long_value(index)?),
        b'D' => ConstantValue::Double(pool.double_value(index)?),
        b'L' if field_descriptor == "Ljava/lang/String;" => ConstantValue::String(pool.string_value(index)?),
        _ => bail!("unsupported ConstantValue field descriptor {field_descriptor}"),
    })
}

/// Mine a generic `Signature` string for referenced class names: split on
/// `L`, `<`, `;`, skipping array prefixes (`[`) and primitive/type-parameter
/// tokens. Names are dot-normalized to match [`super::record::descriptor_to_class_name`],
/// so they're directly comparable against [`super::record::ClassInfoUnlinked::name`].
pub fn referenced_class_names_from_signature(signature: &str) -> Vec<Arc<str>> {
    let mut names = Vec::new();
    let bytes = signature.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'L' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != b';' && bytes[end] != b'<' {
                end += 1;
            }
            if end > start {
                let internal = std::str::from_utf8(&bytes[start..end]).unwrap_or_default();
                names.push(Arc::from(internal.replace('/', ".")));
            }
            // skip past the terminator so a following '<...>' is scanned too
            i = end;
        }
        i += 1;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_mining_extracts_class_names_including_generic_args() {
        let signature = "Ljava/util/List<Lcom/x/Foo;>;";
        let names: Vec<String> = referenced_class_names_from_signature(signature).iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["java.util.List".to_string(), "com.x.Foo".to_string()]);
    }
}
