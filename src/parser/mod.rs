//! Class-file decoding: the constant pool, header fields, and field/method/
//! class attributes, assembled into a [`ClassInfoUnlinked`]. One
//! [`ClassParser`] instance is reused across many files via its pooled
//! [`ClassBuffer`]; parsing itself is single-threaded per instance.

pub mod attributes;
pub mod constant_pool;
pub mod reader;
pub mod record;

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::concurrency::Recycler;
use crate::config::{AnnotationVisibility, ScanConfig};
use crate::element::LoaderRef;

use attributes::{read_annotations, read_constant_value, referenced_class_names_from_signature};
use constant_pool::ConstantPool;
use reader::{ClassBuffer, Cursor};
use record::{ClassInfoUnlinked, EnclosingMethodLink, FieldRecord, InnerClassLink, MethodParameter, MethodRecord, descriptor_to_class_name, internal_to_dotted};

const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_MODULE: u16 = 0x8000;

/// A pool of reusable [`ClassBuffer`]s shared by the parser workers.
pub fn new_buffer_pool() -> Arc<Recycler<ClassBuffer>> {
    Arc::new(Recycler::new(ClassBuffer::new))
}

/// Parse one class file's bytes into a [`ClassInfoUnlinked`].
///
/// `relative_path` is the resource path the bytes were discovered at (used
/// only for the identity check below). Returns `Ok(None)` for a module
/// descriptor (`module-info.class`), which this crate does not model as a
/// class at all.
pub fn parse_class_file(
    bytes: &[u8],
    relative_path: &str,
    loaders: Vec<LoaderRef>,
    config: &ScanConfig,
) -> Result<Option<ClassInfoUnlinked>> {
    let owned: Arc<[u8]> = Arc::from(bytes.to_vec().into_boxed_slice());
    let mut cursor = Cursor::new(&owned);

    let magic = cursor.read_u4()?;
    if magic != MAGIC {
        bail!("bad magic number 0x{magic:08X}, expected 0x{MAGIC:08X}");
    }
    let _minor_version = cursor.read_u2()?;
    let _major_version = cursor.read_u2()?;

    let pool = ConstantPool::parse(&mut cursor, Arc::clone(&owned))?;

    let access_flags = cursor.read_u2()?;
    if access_flags & ACC_MODULE != 0 {
        return Ok(None);
    }

    let this_class_index = cursor.read_u2()?;
    let super_class_index = cursor.read_u2()?;

    let internal_name = pool.class_internal_name(this_class_index)?;
    check_class_identity(relative_path, &internal_name)?;
    let name: Arc<str> = Arc::from(internal_to_dotted(&internal_name));

    let superclass_name = if super_class_index == 0 {
        None
    } else {
        Some(Arc::from(internal_to_dotted(&pool.class_internal_name(super_class_index)?)))
    };

    let interface_count = cursor.read_u2()?;
    let mut interface_names = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = cursor.read_u2()?;
        interface_names.push(Arc::from(internal_to_dotted(&pool.class_internal_name(index)?)));
    }

    let field_count = cursor.read_u2()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        if let Some(field) = read_field(&mut cursor, &pool, config)? {
            fields.push(field);
        }
    }

    let method_count = cursor.read_u2()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        if let Some(method) = read_method(&mut cursor, &pool, config)? {
            methods.push(method);
        }
    }

    let mut class_annotations = Vec::new();
    let mut inner_classes = Vec::new();
    let mut enclosing_method = None;

    let attribute_count = cursor.read_u2()?;
    for _ in 0..attribute_count {
        let name_index = cursor.read_u2()?;
        let length = cursor.read_u4()? as usize;
        let attr_name = pool.utf8(name_index)?;
        let body = cursor.read_bytes(length)?;
        let mut body_cursor = Cursor::new(body);
        match attr_name.as_ref() {
            "RuntimeVisibleAnnotations" => {
                class_annotations.extend(read_annotations(&mut body_cursor, &pool)?);
            }
            "RuntimeInvisibleAnnotations" if config.annotation_visibility == AnnotationVisibility::RuntimeAndClass => {
                class_annotations.extend(read_annotations(&mut body_cursor, &pool)?);
            }
            "InnerClasses" => {
                let count = body_cursor.read_u2()?;
                for _ in 0..count {
                    let inner_class_info_index = body_cursor.read_u2()?;
                    let outer_class_info_index = body_cursor.read_u2()?;
                    let _inner_name_index = body_cursor.read_u2()?;
                    let _inner_class_access_flags = body_cursor.read_u2()?;
                    if inner_class_info_index != 0 && outer_class_info_index != 0 {
                        inner_classes.push(InnerClassLink {
                            inner_name: Arc::from(internal_to_dotted(&pool.class_internal_name(inner_class_info_index)?)),
                            outer_name: Arc::from(internal_to_dotted(&pool.class_internal_name(outer_class_info_index)?)),
                        });
                    }
                }
            }
            "EnclosingMethod" => {
                let class_index = body_cursor.read_u2()?;
                let method_index = body_cursor.read_u2()?;
                let enclosing_class = Arc::from(internal_to_dotted(&pool.class_internal_name(class_index)?));
                let enclosing_method_name = if method_index == 0 {
                    None
                } else {
                    let (name_index, _descriptor_index) = pool.name_and_type(method_index)?;
                    Some(pool.utf8(name_index)?)
                };
                enclosing_method = Some(EnclosingMethodLink { enclosing_class, enclosing_method_name });
            }
            _ => {}
        }
    }

    let is_interface = access_flags & ACC_INTERFACE != 0;
    let is_annotation = access_flags & ACC_ANNOTATION != 0;

    Ok(Some(ClassInfoUnlinked {
        name,
        modifiers: access_flags,
        is_interface,
        is_annotation,
        superclass_name,
        interface_names,
        fields,
        methods,
        annotations: class_annotations,
        inner_classes,
        enclosing_method,
        loaders,
    }))
}

fn check_class_identity(relative_path: &str, internal_name: &str) -> Result<()> {
    let expected = relative_path.strip_suffix(".class").with_context(|| format!("resource {relative_path} is not a .class file"))?;
    if expected != internal_name {
        bail!("class name mismatch: resource path implies {expected}, class file declares {internal_name}");
    }
    Ok(())
}

fn field_visibility_allowed(modifiers: u16, config: &ScanConfig) -> bool {
    config.ignore_field_visibility || modifiers & ACC_PUBLIC != 0
}

fn method_visibility_allowed(modifiers: u16, config: &ScanConfig) -> bool {
    config.ignore_method_visibility || modifiers & ACC_PUBLIC != 0
}

fn read_field(cursor: &mut Cursor<'_>, pool: &ConstantPool, config: &ScanConfig) -> Result<Option<FieldRecord>> {
    let access_flags = cursor.read_u2()?;
    let name_index = cursor.read_u2()?;
    let descriptor_index = cursor.read_u2()?;
    let attribute_count = cursor.read_u2()?;

    if !field_visibility_allowed(access_flags, config) {
        for _ in 0..attribute_count {
            let _name_index = cursor.read_u2()?;
            let length = cursor.read_u4()? as usize;
            cursor.skip(length)?;
        }
        return Ok(None);
    }

    let name = pool.utf8(name_index)?;
    let descriptor = pool.utf8(descriptor_index)?;
    let mut field = FieldRecord {
        name,
        modifiers: access_flags,
        ..Default::default()
    };

    let mut constant_value = None;
    let mut signature = None;
    let mut annotations = Vec::new();

    for _ in 0..attribute_count {
        let attr_name_index = cursor.read_u2()?;
        let length = cursor.read_u4()? as usize;
        let attr_name = pool.utf8(attr_name_index)?;
        let body = cursor.read_bytes(length)?;
        let mut body_cursor = Cursor::new(body);
        match attr_name.as_ref() {
            "ConstantValue" if config.enable_field_type_indexing => {
                constant_value = Some(read_constant_value(&mut body_cursor, pool, &descriptor)?);
            }
            "Signature" => {
                let sig = pool.utf8(body_cursor.read_u2()?)?;
                field.referenced_class_names.extend(referenced_class_names_from_signature(&sig));
                signature = Some(Arc::clone(&sig));
            }
            "RuntimeVisibleAnnotations" if config.enable_field_and_method_annotation_indexing => {
                annotations.extend(read_annotations(&mut body_cursor, pool)?);
            }
            "RuntimeInvisibleAnnotations"
                if config.enable_field_and_method_annotation_indexing && config.annotation_visibility == AnnotationVisibility::RuntimeAndClass =>
            {
                annotations.extend(read_annotations(&mut body_cursor, pool)?);
            }
            _ => {}
        }
    }

    if config.enable_field_type_indexing && descriptor.starts_with('L') && descriptor.ends_with(';') {
        field.referenced_class_names.push(Arc::from(descriptor_to_class_name(&descriptor)));
    }
    field.descriptor = descriptor;
    field.constant_value = constant_value;
    field.signature = signature;
    field.annotations = annotations;

    Ok(Some(field))
}

fn read_method(cursor: &mut Cursor<'_>, pool: &ConstantPool, config: &ScanConfig) -> Result<Option<MethodRecord>> {
    let access_flags = cursor.read_u2()?;
    let name_index = cursor.read_u2()?;
    let descriptor_index = cursor.read_u2()?;
    let attribute_count = cursor.read_u2()?;

    if !method_visibility_allowed(access_flags, config) {
        for _ in 0..attribute_count {
            let _name_index = cursor.read_u2()?;
            let length = cursor.read_u4()? as usize;
            cursor.skip(length)?;
        }
        return Ok(None);
    }

    let name = pool.utf8(name_index)?;
    let descriptor = pool.utf8(descriptor_index)?;
    let mut method = MethodRecord {
        name,
        descriptor: Arc::clone(&descriptor),
        modifiers: access_flags,
        ..Default::default()
    };

    for _ in 0..attribute_count {
        let attr_name_index = cursor.read_u2()?;
        let length = cursor.read_u4()? as usize;
        let attr_name = pool.utf8(attr_name_index)?;
        let body = cursor.read_bytes(length)?;
        let mut body_cursor = Cursor::new(body);
        match attr_name.as_ref() {
            "Signature" => {
                let sig = pool.utf8(body_cursor.read_u2()?)?;
                method.referenced_class_names.extend(referenced_class_names_from_signature(&sig));
                method.signature = Some(sig);
            }
            "RuntimeVisibleAnnotations" if config.enable_field_and_method_annotation_indexing => {
                method.annotations.extend(read_annotations(&mut body_cursor, pool)?);
            }
            "RuntimeInvisibleAnnotations"
                if config.enable_field_and_method_annotation_indexing && config.annotation_visibility == AnnotationVisibility::RuntimeAndClass =>
            {
                method.annotations.extend(read_annotations(&mut body_cursor, pool)?);
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let is_invisible = attr_name.as_ref() == "RuntimeInvisibleParameterAnnotations";
                if is_invisible && config.annotation_visibility != AnnotationVisibility::RuntimeAndClass {
                    continue;
                }
                let param_count = body_cursor.read_u1()?;
                ensure_parameters(&mut method.parameters, param_count as usize);
                for param in method.parameters.iter_mut().take(param_count as usize) {
                    param.annotations.extend(read_annotations(&mut body_cursor, pool)?);
                }
            }
            "MethodParameters" => {
                let param_count = body_cursor.read_u1()?;
                ensure_parameters(&mut method.parameters, param_count as usize);
                for param in method.parameters.iter_mut().take(param_count as usize) {
                    let name_index = body_cursor.read_u2()?;
                    let param_access_flags = body_cursor.read_u2()?;
                    param.name = if name_index == 0 { None } else { Some(pool.utf8(name_index)?) };
                    param.access_flags = param_access_flags;
                }
            }
            "AnnotationDefault" => {
                method.annotation_default = Some(attributes::read_element_value(&mut body_cursor, pool)?);
            }
            _ => {}
        }
    }

    Ok(Some(method))
}

fn ensure_parameters(parameters: &mut Vec<MethodParameter>, count: usize) {
    while parameters.len() < count {
        parameters.push(MethodParameter::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClassFileBuilder {
        utf8_pool: Vec<String>,
        bytes: Vec<u8>,
    }

    impl ClassFileBuilder {
        fn new() -> Self {
            Self {
                utf8_pool: Vec::new(),
                bytes: Vec::new(),
            }
        }

        fn utf8(&mut self, s: &str) -> u16 {
            self.utf8_pool.push(s.to_string());
            self.utf8_pool.len() as u16
        }

        /// Build a minimal, empty class file naming `this_class` with no
        /// superclass, no interfaces/fields/methods/attributes.
        fn build_minimal(this_class_internal: &str) -> Vec<u8> {
            let mut builder = Self::new();
            let name_utf8 = builder.utf8(this_class_internal);

            // Pool layout: [1] utf8 name, [2] class(name)
            let class_index = name_utf8 + 1;

            builder.bytes.extend_from_slice(&MAGIC.to_be_bytes());
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // minor
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // major

            let pool_count = class_index + 1;
            builder.bytes.extend_from_slice(&pool_count.to_be_bytes());
            // entry 1: utf8
            builder.bytes.push(constant_pool::TAG_UTF8);
            builder.bytes.extend_from_slice(&(this_class_internal.len() as u16).to_be_bytes());
            builder.bytes.extend_from_slice(this_class_internal.as_bytes());
            // entry 2: class -> utf8 index 1
            builder.bytes.push(constant_pool::TAG_CLASS);
            builder.bytes.extend_from_slice(&name_utf8.to_be_bytes());

            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // access_flags
            builder.bytes.extend_from_slice(&class_index.to_be_bytes()); // this_class
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // super_class = 0
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // fields_count
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // methods_count
            builder.bytes.extend_from_slice(&0u16.to_be_bytes()); // attributes_count

            builder.bytes
        }
    }

    #[test]
    fn parses_minimal_class_file() {
        let bytes = ClassFileBuilder::build_minimal("com/x/Foo");
        let config = ScanConfig::default();
        let parsed = parse_class_file(&bytes, "com/x/Foo.class", Vec::new(), &config).expect("parse").expect("not a module");
        assert_eq!(parsed.name.as_ref(), "com.x.Foo");
        assert!(parsed.superclass_name.is_none());
        assert!(parsed.fields.is_empty());
        assert!(parsed.methods.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassFileBuilder::build_minimal("com/x/Foo");
        bytes[3] = 0xBD; // corrupt last magic byte
        let config = ScanConfig::default();
        let result = parse_class_file(&bytes, "com/x/Foo.class", Vec::new(), &config);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_relative_path_class_name_mismatch() {
        let bytes = ClassFileBuilder::build_minimal("com/x/Foo");
        let config = ScanConfig::default();
        let result = parse_class_file(&bytes, "com/x/Bar.class", Vec::new(), &config);
        assert!(result.is_err());
    }
}
