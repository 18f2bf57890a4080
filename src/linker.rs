//! Graph Linker: merges parsed records into a name-keyed graph with
//! bidirectional edges, creating placeholder nodes for names referenced but
//! never parsed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::element::LoaderRef;
use crate::parser::record::{Annotation, ClassInfoUnlinked, FieldRecord, MethodRecord, descriptor_to_class_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    StandardClass,
    Interface,
    Annotation,
    /// Not yet linked from a parsed record; only its name is known.
    Unknown,
}

/// A linked node in the type graph. Fields and methods are only populated
/// once a real [`ClassInfoUnlinked`] has been linked in (never for a
/// placeholder).
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: Arc<str>,
    pub kind: ClassKind,
    pub external: bool,

    pub superclass: Option<Arc<str>>,
    pub subclasses: BTreeSet<Arc<str>>,

    pub superinterfaces: BTreeSet<Arc<str>>,
    pub subinterfaces: BTreeSet<Arc<str>>,

    pub implements: BTreeSet<Arc<str>>,
    pub implementing_classes: BTreeSet<Arc<str>>,

    pub annotations: BTreeSet<Arc<str>>,
    pub annotated_classes: BTreeSet<Arc<str>>,

    pub meta_annotations: BTreeSet<Arc<str>>,
    pub meta_annotated_by: BTreeSet<Arc<str>>,

    pub classes_with_method_annotation: BTreeSet<Arc<str>>,
    pub classes_with_field_annotation: BTreeSet<Arc<str>>,
    pub method_annotated_types: BTreeSet<Arc<str>>,
    pub field_annotated_types: BTreeSet<Arc<str>>,

    pub inner_classes: BTreeSet<Arc<str>>,
    pub outer_class: Option<Arc<str>>,

    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub referenced_class_names: BTreeSet<Arc<str>>,
    pub loaders: Vec<LoaderRef>,

    linked: bool,
}

impl ClassInfo {
    fn placeholder(name: Arc<str>) -> Self {
        Self {
            name,
            kind: ClassKind::Unknown,
            external: true,
            superclass: None,
            subclasses: BTreeSet::new(),
            superinterfaces: BTreeSet::new(),
            subinterfaces: BTreeSet::new(),
            implements: BTreeSet::new(),
            implementing_classes: BTreeSet::new(),
            annotations: BTreeSet::new(),
            annotated_classes: BTreeSet::new(),
            meta_annotations: BTreeSet::new(),
            meta_annotated_by: BTreeSet::new(),
            classes_with_method_annotation: BTreeSet::new(),
            classes_with_field_annotation: BTreeSet::new(),
            method_annotated_types: BTreeSet::new(),
            field_annotated_types: BTreeSet::new(),
            inner_classes: BTreeSet::new(),
            outer_class: None,
            fields: Vec::new(),
            methods: Vec::new(),
            referenced_class_names: BTreeSet::new(),
            loaders: Vec::new(),
            linked: false,
        }
    }
}

/// Name-keyed graph of linked classes, interfaces, and annotation types.
#[derive(Debug, Default)]
pub struct TypeGraph {
    nodes: HashMap<Arc<str>, ClassInfo>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All linked (non-placeholder) classes, sorted by name.
    pub fn classes(&self) -> Vec<&ClassInfo> {
        let mut classes: Vec<&ClassInfo> = self.nodes.values().filter(|c| !c.external).collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        classes
    }

    fn get_or_create(&mut self, name: &str) -> &mut ClassInfo {
        self.nodes.entry(Arc::from(name)).or_insert_with(|| ClassInfo::placeholder(Arc::from(name)))
    }

    /// Merge one parsed record into the graph, creating placeholders for any
    /// referenced-but-unparsed names and wiring up bidirectional edges.
    pub fn link_record(&mut self, record: ClassInfoUnlinked) {
        let name: Arc<str> = Arc::clone(&record.name);
        let kind = if record.is_annotation {
            ClassKind::Annotation
        } else if record.is_interface {
            ClassKind::Interface
        } else {
            ClassKind::StandardClass
        };

        if let Some(existing) = self.nodes.get(&name) {
            if existing.linked {
                if existing.kind == kind {
                    debug!(class = %name, "dropping masked duplicate class record");
                } else {
                    warn!(class = %name, "dropping class record with conflicting kind for an already-linked name");
                }
                return;
            }
        }

        let referenced: BTreeSet<Arc<str>> = record
            .fields
            .iter()
            .flat_map(|f| f.referenced_class_names.iter().cloned())
            .chain(record.methods.iter().flat_map(|m| m.referenced_class_names.iter().cloned()))
            .collect();

        let superclass_name = record.superclass_name.clone();
        let interface_names = record.interface_names.clone();
        let class_annotations: Vec<Arc<str>> = record.annotations.iter().map(|a| Arc::from(descriptor_to_class_name(&a.type_descriptor))).collect();
        let inner_classes: Vec<(Arc<str>, Arc<str>)> = record.inner_classes.iter().map(|link| (Arc::clone(&link.inner_name), Arc::clone(&link.outer_name))).collect();
        let enclosing = record.enclosing_method.as_ref().map(|e| Arc::clone(&e.enclosing_class));
        let method_annotation_types = annotation_type_names(record.methods.iter().flat_map(|m| m.annotations.iter()));
        let field_annotation_types = annotation_type_names(record.fields.iter().flat_map(|f| f.annotations.iter()));
        let meta_annotation_sources = if kind == ClassKind::Annotation {
            Some(class_annotations.clone())
        } else {
            None
        };

        {
            let node = self.get_or_create(&name);
            node.kind = kind;
            node.external = false;
            node.linked = true;
            node.superclass = superclass_name.clone();
            node.implements = interface_names.iter().cloned().collect();
            node.annotations = class_annotations.iter().cloned().collect();
            node.inner_classes = inner_classes.iter().map(|(inner, _)| Arc::clone(inner)).collect();
            node.outer_class = inner_classes.iter().find(|(inner, _)| **inner == name).map(|(_, outer)| Arc::clone(outer)).or(enclosing);
            node.fields = record.fields;
            node.methods = record.methods;
            node.referenced_class_names = referenced;
            node.loaders = record.loaders;
            node.method_annotated_types = method_annotation_types.iter().cloned().collect();
            node.field_annotated_types = field_annotation_types.iter().cloned().collect();
        }

        if let Some(super_name) = &superclass_name {
            let super_node = self.get_or_create(super_name);
            super_node.subclasses.insert(Arc::clone(&name));
        }

        for interface_name in &interface_names {
            if kind == ClassKind::Interface {
                let super_iface = self.get_or_create(interface_name);
                super_iface.subinterfaces.insert(Arc::clone(&name));
            } else {
                let iface_node = self.get_or_create(interface_name);
                iface_node.implementing_classes.insert(Arc::clone(&name));
            }
        }

        for annotation_name in &class_annotations {
            let annotation_node = self.get_or_create(annotation_name);
            annotation_node.annotated_classes.insert(Arc::clone(&name));
        }

        if let Some(sources) = meta_annotation_sources {
            for meta_name in &sources {
                let meta_node = self.get_or_create(meta_name);
                meta_node.meta_annotated_by.insert(Arc::clone(&name));
            }
            let node = self.get_or_create(&name);
            node.meta_annotations = sources.into_iter().collect();
        }

        for annotation_name in &method_annotation_types {
            let annotation_node = self.get_or_create(annotation_name);
            annotation_node.classes_with_method_annotation.insert(Arc::clone(&name));
        }
        for annotation_name in &field_annotation_types {
            let annotation_node = self.get_or_create(annotation_name);
            annotation_node.classes_with_field_annotation.insert(Arc::clone(&name));
        }

        for (inner, outer) in &inner_classes {
            let outer_node = self.get_or_create(outer);
            outer_node.inner_classes.insert(Arc::clone(inner));
        }
    }

    /// Transitive subclasses of `name`, sorted alphabetically, not including
    /// `name` itself.
    pub fn subclasses_of(&self, name: &str) -> Vec<&ClassInfo> {
        self.transitive_closure(name, |node| node.subclasses.iter())
    }

    /// Transitive superclasses of `name`, sorted alphabetically.
    pub fn superclasses_of(&self, name: &str) -> Vec<&ClassInfo> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(name).and_then(|n| n.superclass.as_ref());
        while let Some(super_name) = current {
            if let Some(node) = self.nodes.get(super_name) {
                out.push(node);
                current = node.superclass.as_ref();
            } else {
                break;
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Classes implementing `interface_name`, including implementors of its
    /// transitive sub-interfaces and every implementor's subclasses.
    pub fn classes_implementing(&self, interface_name: &str) -> Vec<&ClassInfo> {
        let mut direct_implementors = BTreeSet::new();
        let mut interface_frontier = vec![interface_name.to_string()];
        let mut seen_interfaces = BTreeSet::new();
        while let Some(iface) = interface_frontier.pop() {
            if !seen_interfaces.insert(iface.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get(iface.as_str()) else { continue };
            direct_implementors.extend(node.implementing_classes.iter().map(|n| n.to_string()));
            interface_frontier.extend(node.subinterfaces.iter().map(|n| n.to_string()));
        }

        let mut all = direct_implementors.clone();
        for name in &direct_implementors {
            for subclass in self.subclasses_of(name) {
                all.insert(subclass.name.to_string());
            }
        }
        let mut result: Vec<&ClassInfo> = all.iter().filter_map(|n| self.nodes.get(n.as_str())).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// All interfaces implemented by `name`, including superinterfaces
    /// transitively (does not include interfaces implemented only by a
    /// superclass — callers combine with [`TypeGraph::superclasses_of`]).
    pub fn all_interfaces(&self, name: &str) -> Vec<&ClassInfo> {
        let mut seen = BTreeSet::new();
        let mut frontier: Vec<Arc<str>> = self.nodes.get(name).map(|n| n.implements.iter().cloned().collect()).unwrap_or_default();
        while let Some(iface_name) = frontier.pop() {
            if !seen.insert(Arc::clone(&iface_name)) {
                continue;
            }
            if let Some(node) = self.nodes.get(&iface_name) {
                frontier.extend(node.superinterfaces.iter().cloned());
            }
        }
        let mut result: Vec<&ClassInfo> = seen.iter().filter_map(|n| self.nodes.get(n)).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Classes annotated with `annotation_name`, including via meta-annotation
    /// (a class annotated with `@A` where `@A` is itself annotated with the
    /// queried annotation).
    pub fn classes_with_annotation(&self, annotation_name: &str) -> Vec<&ClassInfo> {
        let mut annotation_frontier = vec![annotation_name.to_string()];
        let mut seen_annotations = BTreeSet::new();
        let mut classes = BTreeSet::new();
        while let Some(current) = annotation_frontier.pop() {
            if !seen_annotations.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(current.as_str()) {
                classes.extend(node.annotated_classes.iter().cloned());
                annotation_frontier.extend(node.meta_annotated_by.iter().map(|s| s.to_string()));
            }
        }
        let mut result: Vec<&ClassInfo> = classes.iter().filter_map(|n| self.nodes.get(n.as_ref())).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Annotations present on `class_name`, including meta-annotations of
    /// its direct annotations, transitively.
    pub fn annotations_on_class(&self, class_name: &str) -> Vec<&ClassInfo> {
        let Some(node) = self.nodes.get(class_name) else { return Vec::new() };
        let mut frontier: Vec<Arc<str>> = node.annotations.iter().cloned().collect();
        let mut seen = BTreeSet::new();
        while let Some(annotation_name) = frontier.pop() {
            if !seen.insert(Arc::clone(&annotation_name)) {
                continue;
            }
            if let Some(annotation_node) = self.nodes.get(&annotation_name) {
                frontier.extend(annotation_node.meta_annotations.iter().cloned());
            }
        }
        let mut result: Vec<&ClassInfo> = seen.iter().filter_map(|n| self.nodes.get(n)).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Classes with a field whose type descriptor references
    /// `type_class_name`.
    pub fn classes_with_field_of_type(&self, type_class_name: &str) -> Vec<&ClassInfo> {
        let mut result: Vec<&ClassInfo> = self
            .nodes
            .values()
            .filter(|node| !node.external && node.fields.iter().any(|f| f.referenced_class_names.iter().any(|n| n.as_ref() == type_class_name)))
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    pub fn classes_with_method_annotation(&self, annotation_name: &str) -> Vec<&ClassInfo> {
        let mut result: Vec<&ClassInfo> =
            self.nodes.get(annotation_name).map(|n| n.classes_with_method_annotation.iter().filter_map(|name| self.nodes.get(name.as_ref())).collect()).unwrap_or_default();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    pub fn classes_with_field_annotation(&self, annotation_name: &str) -> Vec<&ClassInfo> {
        let mut result: Vec<&ClassInfo> =
            self.nodes.get(annotation_name).map(|n| n.classes_with_field_annotation.iter().filter_map(|name| self.nodes.get(name.as_ref())).collect()).unwrap_or_default();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    fn transitive_closure<'a, F, I>(&'a self, start: &str, edges: F) -> Vec<&'a ClassInfo>
    where
        F: Fn(&'a ClassInfo) -> I,
        I: Iterator<Item = &'a Arc<str>>,
    {
        let mut seen = BTreeSet::new();
        let mut frontier = vec![start.to_string()];
        while let Some(current) = frontier.pop() {
            let Some(node) = self.nodes.get(current.as_str()) else { continue };
            for next in edges(node) {
                if seen.insert(next.to_string()) {
                    frontier.push(next.to_string());
                }
            }
        }
        let mut result: Vec<&ClassInfo> = seen.iter().filter_map(|n| self.nodes.get(n.as_str())).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }
}

fn annotation_type_names<'a>(annotations: impl Iterator<Item = &'a Annotation>) -> Vec<Arc<str>> {
    let mut names: BTreeSet<Arc<str>> = BTreeSet::new();
    for annotation in annotations {
        names.insert(Arc::from(descriptor_to_class_name(&annotation.type_descriptor)));
    }
    names.into_iter().collect()
}

/// Link a full set of parsed records into a [`TypeGraph`]. Single-threaded:
/// the graph is mutated without locks, per the pipeline's linking phase.
pub fn link_all(records: impl IntoIterator<Item = ClassInfoUnlinked>) -> TypeGraph {
    let mut graph = TypeGraph::new();
    for record in records {
        graph.link_record(record);
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::record::{Annotation, ElementValue};

    fn unlinked(name: &str, superclass: Option<&str>, is_interface: bool) -> ClassInfoUnlinked {
        ClassInfoUnlinked {
            name: Arc::from(name),
            modifiers: 0,
            is_interface,
            is_annotation: false,
            superclass_name: superclass.map(Arc::from),
            interface_names: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            inner_classes: Vec::new(),
            enclosing_method: None,
            loaders: Vec::new(),
        }
    }

    #[test]
    fn subclass_and_superclass_are_complementary() {
        let mut graph = TypeGraph::new();
        graph.link_record(unlinked("com.x.Animal", None, false));
        graph.link_record(unlinked("com.x.Dog", Some("com.x.Animal"), false));

        assert!(graph.get("com.x.Animal").unwrap().subclasses.contains("com.x.Dog"));
        assert_eq!(graph.get("com.x.Dog").unwrap().superclass.as_deref(), Some("com.x.Animal"));
    }

    #[test]
    fn unresolved_superclass_becomes_an_external_placeholder() {
        let mut graph = TypeGraph::new();
        graph.link_record(unlinked("com.x.Dog", Some("com.x.Animal"), false));

        let placeholder = graph.get("com.x.Animal").expect("placeholder exists");
        assert!(placeholder.external);
        assert!(placeholder.subclasses.contains("com.x.Dog"));
    }

    #[test]
    fn implementing_classes_and_subinterfaces_are_tracked_separately() {
        let mut graph = TypeGraph::new();
        let mut iface = unlinked("com.x.Shape", None, true);
        iface.interface_names = Vec::new();
        graph.link_record(iface);
        let mut circle = unlinked("com.x.Circle", None, false);
        circle.interface_names = vec![Arc::from("com.x.Shape")];
        graph.link_record(circle);

        let shape = graph.get("com.x.Shape").unwrap();
        assert!(shape.implementing_classes.contains("com.x.Circle"));
        assert!(shape.subinterfaces.is_empty());
    }

    #[test]
    fn self_referential_meta_annotation_terminates() {
        let mut meta = unlinked("com.x.Meta", None, false);
        meta.is_annotation = true;
        meta.annotations = vec![Annotation {
            type_descriptor: Arc::from("Lcom/x/Meta;"),
            elements: Vec::new(),
        }];

        let mut graph = TypeGraph::new();
        graph.link_record(meta);

        let results = graph.classes_with_annotation("com.x.Meta");
        assert!(results.iter().any(|c| c.name.as_ref() == "com.x.Meta"));
    }

    #[test]
    fn masked_duplicate_with_conflicting_kind_is_dropped() {
        let mut graph = TypeGraph::new();
        graph.link_record(unlinked("com.x.Foo", None, false));
        graph.link_record(unlinked("com.x.Foo", None, true));

        assert_eq!(graph.get("com.x.Foo").unwrap().kind, ClassKind::StandardClass);
    }

    #[test]
    fn derived_queries_are_sorted_alphabetically() {
        let mut graph = TypeGraph::new();
        graph.link_record(unlinked("com.x.Animal", None, false));
        graph.link_record(unlinked("com.x.Zebra", Some("com.x.Animal"), false));
        graph.link_record(unlinked("com.x.Ant", Some("com.x.Animal"), false));

        let names: Vec<&str> = graph.subclasses_of("com.x.Animal").iter().map(|c| c.name.as_ref()).collect();
        assert_eq!(names, vec!["com.x.Ant", "com.x.Zebra"]);
    }

    #[test]
    fn annotation_default_is_an_element_value() {
        // sanity check that ElementValue variants used in tests compile/match as expected
        let value = ElementValue::Int(42);
        matches!(value, ElementValue::Int(42));
    }
}
