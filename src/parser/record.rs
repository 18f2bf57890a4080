//! The parser's output record and its constituent pieces: unlinked because
//! superclass/interface/annotation references are still bare class names,
//! not yet resolved to other records.

use std::sync::Arc;

use crate::element::LoaderRef;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(Arc<str>),
}

#[derive(Debug, Clone)]
pub enum ElementValue {
    Byte(i32),
    Char(i32),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i32),
    Boolean(bool),
    String(Arc<str>),
    Enum { type_descriptor: Arc<str>, const_name: Arc<str> },
    Class(Arc<str>),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub type_descriptor: Arc<str>,
    pub elements: Vec<(Arc<str>, ElementValue)>,
}

#[derive(Debug, Clone, Default)]
pub struct FieldRecord {
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub modifiers: u16,
    pub constant_value: Option<ConstantValue>,
    pub signature: Option<Arc<str>>,
    pub annotations: Vec<Annotation>,
    pub referenced_class_names: Vec<Arc<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodParameter {
    pub name: Option<Arc<str>>,
    pub access_flags: u16,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodRecord {
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub modifiers: u16,
    pub signature: Option<Arc<str>>,
    pub annotations: Vec<Annotation>,
    pub parameters: Vec<MethodParameter>,
    pub annotation_default: Option<ElementValue>,
    pub referenced_class_names: Vec<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct InnerClassLink {
    pub inner_name: Arc<str>,
    pub outer_name: Arc<str>,
}

#[derive(Debug, Clone)]
pub struct EnclosingMethodLink {
    pub enclosing_class: Arc<str>,
    pub enclosing_method_name: Option<Arc<str>>,
}

/// The parser's per-class output, produced once per successfully parsed
/// class file and consumed once by the linker.
#[derive(Debug, Clone)]
pub struct ClassInfoUnlinked {
    pub name: Arc<str>,
    pub modifiers: u16,
    pub is_interface: bool,
    pub is_annotation: bool,
    pub superclass_name: Option<Arc<str>>,
    pub interface_names: Vec<Arc<str>>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub annotations: Vec<Annotation>,
    pub inner_classes: Vec<InnerClassLink>,
    pub enclosing_method: Option<EnclosingMethodLink>,
    pub loaders: Vec<LoaderRef>,
}

impl ClassInfoUnlinked {
    pub fn annotation_type_names(&self) -> impl Iterator<Item = String> + '_ {
        self.annotations.iter().map(|a| descriptor_to_class_name(&a.type_descriptor))
    }
}

/// `Lcom/x/Foo;` -> `com.x.Foo`. Strips the `L`/`;` wrapper of an internal
/// type descriptor and dot-normalizes the enclosed internal name, so the
/// result is comparable against [`ClassInfoUnlinked::name`].
pub fn descriptor_to_class_name(descriptor: &str) -> String {
    let internal = descriptor.strip_prefix('L').and_then(|s| s.strip_suffix(';')).unwrap_or(descriptor);
    internal_to_dotted(internal)
}

/// `com/x/Foo` -> `com.x.Foo`.
pub fn internal_to_dotted(internal: &str) -> String {
    internal.replace('/', ".")
}
