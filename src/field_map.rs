//! The field-map variants that make up a compiled mapping.

use crate::document::Value;
use crate::mapper::{EntityMapper, VERSION_KEY};
use crate::reflect::CollectionKind;
use crate::typer::FieldType;

/// Written in place of a sensitive value on read; writing it back means
/// "unchanged".
pub const SENSITIVE_MASK: &str = "\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}";

/// Field-level access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Full,
    ReadOnly,
    Final,
    WriteOnly,
    CreateOnly,
    Sensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Update,
}

impl Access {
    pub fn allows(self, operation: Operation) -> bool {
        match operation {
            Operation::Read => !matches!(self, Access::WriteOnly | Access::CreateOnly),
            Operation::Create => self != Access::ReadOnly,
            Operation::Update => matches!(self, Access::Full | Access::WriteOnly | Access::Sensitive),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    Update,
    Delete,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionMode {
    Eager,
    #[default]
    Lazy,
}

/// An explicit association key pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub foreign_key: String,
    pub parent_key: String,
    pub handler: Option<String>,
}

impl Join {
    /// `parent_key` defaults to `foreign_key`.
    pub fn new(foreign_key: &str, parent_key: Option<&str>) -> Self {
        Self {
            foreign_key: foreign_key.to_string(),
            parent_key: parent_key.unwrap_or(foreign_key).to_string(),
            handler: None,
        }
    }

    pub fn using(mut self, handler: &str) -> Self {
        self.handler = Some(handler.to_string());
        self
    }
}

/// Attributes shared by every field map.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldHeader {
    pub internal: String,
    pub external: String,
    /// Plugin managing the field, declared here or inherited from an
    /// enclosing attribute.
    pub plugin: Option<String>,
    /// Declared with `@plugin:name`; read and written through [`Attributed`](crate::object::Attributed).
    pub is_attribute: bool,
    pub access: Access,
    /// Excluded from duplication.
    pub exclusive: bool,
}

impl FieldHeader {
    pub fn new(internal: &str) -> Self {
        Self::renamed(internal, internal)
    }

    pub fn renamed(internal: &str, external: &str) -> Self {
        Self {
            internal: internal.to_string(),
            external: external.to_string(),
            plugin: None,
            is_attribute: false,
            access: Access::Full,
            exclusive: false,
        }
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn attribute(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_string());
        self.is_attribute = true;
        self
    }

    pub fn operation_allowed(&self, operation: Operation) -> bool {
        self.access.allows(operation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleFieldMap {
    pub header: FieldHeader,
    pub identifier: bool,
    pub entity_name: bool,
    pub default: Option<Value>,
    /// Declared scalar type, filled in from metadata when the owning mapper
    /// is built.
    pub value_type: Option<FieldType>,
}

impl SimpleFieldMap {
    pub fn new(header: FieldHeader) -> Self {
        Self {
            header,
            identifier: false,
            entity_name: false,
            default: None,
            value_type: None,
        }
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    pub fn entity_name(mut self) -> Self {
        self.entity_name = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Selects the declared subclass. `stored_property` is set when the
/// metadata provider exposes the discriminator as a readable property.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorFieldMap {
    pub header: FieldHeader,
    pub stored_property: bool,
}

pub(crate) const DEFAULT_INTERNAL_DISCRIMINATOR: &str = "class";
pub(crate) const DEFAULT_EXTERNAL_DISCRIMINATOR: &str = "subclass";

impl DiscriminatorFieldMap {
    pub fn new(internal: Option<&str>, external: Option<&str>, stored_property: bool) -> Self {
        let internal = internal.unwrap_or(DEFAULT_INTERNAL_DISCRIMINATOR);
        let external = match external {
            Some(name) if name != DEFAULT_INTERNAL_DISCRIMINATOR => name,
            _ => DEFAULT_EXTERNAL_DISCRIMINATOR,
        };
        Self {
            header: FieldHeader::renamed(internal, external),
            stored_property,
        }
    }
}

/// A single nested entity or value.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMap {
    pub header: FieldHeader,
    pub mapper: EntityMapper,
    pub join: Option<Join>,
    pub cascade: Option<Cascade>,
    /// Declared `optional`: a null value clears the property even when the
    /// nested mapping has defaults.
    pub outer_join: bool,
    /// Applies only when the runtime type is the nested mapper's base class.
    pub for_subclass: bool,
    pub flattened: bool,
}

impl ComponentMap {
    pub fn new(header: FieldHeader, mapper: EntityMapper) -> Self {
        Self {
            header,
            mapper,
            join: None,
            cascade: None,
            outer_join: false,
            for_subclass: false,
            flattened: false,
        }
    }

    /// A `subclass Class { ... }` augmentation of a declared subclass.
    pub fn subclass(header: FieldHeader, mapper: EntityMapper) -> Self {
        Self {
            for_subclass: true,
            ..Self::new(header, mapper)
        }
    }

    pub fn joined(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    pub fn cascading(mut self, cascade: Cascade) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn optional(mut self) -> Self {
        self.outer_join = true;
        self
    }

    /// Merges the nested fields into the parent's key space. A nested
    /// `version` field is renamed `<external>_version`.
    pub fn flattened(mut self) -> Self {
        self.flattened = true;
        let renamed = format!("{}_{}", self.header.external, VERSION_KEY);
        self.mapper.rename_external(VERSION_KEY, &renamed);
        self
    }

    pub fn is_join(&self) -> bool {
        self.join.is_some()
    }

    pub fn is_cascade_update(&self) -> bool {
        matches!(self.cascade, Some(Cascade::Update | Cascade::All))
    }

    pub fn is_cascade_delete(&self) -> bool {
        matches!(self.cascade, Some(Cascade::Delete | Cascade::All))
    }

    /// Whether any simple field, at any component depth, declares a default.
    pub fn has_defaults(&self) -> bool {
        self.mapper.field_maps().iter().any(|fm| match fm {
            FieldMap::Simple(s) => s.default.is_some(),
            FieldMap::Component(c) => c.has_defaults(),
            _ => false,
        })
    }

    /// Counts scalar fields reachable through nested components, skipping
    /// joined components unless `include_joins`.
    pub fn field_map_count(&self, include_joins: bool) -> usize {
        self.mapper
            .field_maps()
            .iter()
            .map(|fm| match fm {
                FieldMap::Simple(_) | FieldMap::Discriminator(_) => 1,
                FieldMap::Component(c) if include_joins || !c.is_join() => c.field_map_count(include_joins),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionElement {
    Entity(EntityMapper),
    Primitive(FieldType),
}

/// A collection of nested entities or scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMap {
    pub header: FieldHeader,
    pub element: CollectionElement,
    pub join: Option<Join>,
    pub cascade: Option<Cascade>,
    pub mode: CollectionMode,
    /// Resolved from metadata when the owning mapper is built.
    pub one_to_many: bool,
    pub orphan_delete: bool,
    pub kind: CollectionKind,
}

impl CollectionMap {
    pub fn entities(header: FieldHeader, mapper: EntityMapper) -> Self {
        Self::new(header, CollectionElement::Entity(mapper))
    }

    pub fn primitives(header: FieldHeader, element: FieldType) -> Self {
        Self::new(header, CollectionElement::Primitive(element))
    }

    fn new(header: FieldHeader, element: CollectionElement) -> Self {
        Self {
            header,
            element,
            join: None,
            cascade: None,
            mode: CollectionMode::Lazy,
            one_to_many: false,
            orphan_delete: false,
            kind: CollectionKind::List,
        }
    }

    pub fn mode(mut self, mode: CollectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn joined(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    pub fn cascading(mut self, cascade: Cascade) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn mapper(&self) -> Option<&EntityMapper> {
        match &self.element {
            CollectionElement::Entity(m) => Some(m),
            CollectionElement::Primitive(_) => None,
        }
    }

    pub fn primitive_type(&self) -> Option<FieldType> {
        match &self.element {
            CollectionElement::Primitive(t) => Some(*t),
            CollectionElement::Entity(_) => None,
        }
    }

    pub fn is_join(&self) -> bool {
        self.join.is_some()
    }

    pub fn is_cascade_update(&self) -> bool {
        matches!(self.cascade, Some(Cascade::Update | Cascade::All))
    }
}

/// A collection over the union of several variant collections. Fields of
/// every variant are visible through the union mapper's lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCollectionMap {
    pub collection: CollectionMap,
    pub indexed_by: Option<String>,
    pub handler: Option<String>,
}

impl MergedCollectionMap {
    pub fn new(header: FieldHeader, mut union: EntityMapper, mode: CollectionMode) -> Self {
        let variants: Vec<EntityMapper> = union
            .field_maps()
            .iter()
            .filter_map(|fm| match fm {
                FieldMap::Collection(c) => c.mapper().cloned(),
                _ => None,
            })
            .collect();
        for variant in variants {
            union.merge(variant);
        }
        Self {
            collection: CollectionMap::entities(header, union).mode(mode),
            indexed_by: None,
            handler: None,
        }
    }

    pub fn indexed_by(mut self, field: &str) -> Self {
        self.indexed_by = Some(field.to_string());
        self
    }

    pub fn using(mut self, handler: &str) -> Self {
        self.handler = Some(handler.to_string());
        self
    }
}

/// Discriminant of [`FieldMap`], for kind-based lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMapKind {
    Simple,
    Discriminator,
    Component,
    Collection,
    MergedCollection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldMap {
    Simple(SimpleFieldMap),
    Discriminator(DiscriminatorFieldMap),
    Component(Box<ComponentMap>),
    Collection(Box<CollectionMap>),
    MergedCollection(Box<MergedCollectionMap>),
}

impl FieldMap {
    pub fn header(&self) -> &FieldHeader {
        match self {
            FieldMap::Simple(s) => &s.header,
            FieldMap::Discriminator(d) => &d.header,
            FieldMap::Component(c) => &c.header,
            FieldMap::Collection(c) => &c.header,
            FieldMap::MergedCollection(m) => &m.collection.header,
        }
    }

    pub(crate) fn header_mut(&mut self) -> &mut FieldHeader {
        match self {
            FieldMap::Simple(s) => &mut s.header,
            FieldMap::Discriminator(d) => &mut d.header,
            FieldMap::Component(c) => &mut c.header,
            FieldMap::Collection(c) => &mut c.header,
            FieldMap::MergedCollection(m) => &mut m.collection.header,
        }
    }

    pub fn internal(&self) -> &str {
        &self.header().internal
    }

    pub fn external(&self) -> &str {
        &self.header().external
    }

    pub fn access(&self) -> Access {
        self.header().access
    }

    pub fn is_attribute(&self) -> bool {
        self.header().is_attribute
    }

    /// Declared exclusive, or an identifier implicitly made exclusive by a
    /// one-to-many parent.
    pub fn is_exclusive(&self) -> bool {
        self.header().exclusive
    }

    pub fn operation_allowed(&self, operation: Operation) -> bool {
        self.header().operation_allowed(operation)
    }

    pub fn kind(&self) -> FieldMapKind {
        match self {
            FieldMap::Simple(_) => FieldMapKind::Simple,
            FieldMap::Discriminator(_) => FieldMapKind::Discriminator,
            FieldMap::Component(_) => FieldMapKind::Component,
            FieldMap::Collection(_) => FieldMapKind::Collection,
            FieldMap::MergedCollection(_) => FieldMapKind::MergedCollection,
        }
    }

    /// The nested mapper of an entity-valued field map.
    pub fn mapper(&self) -> Option<&EntityMapper> {
        match self {
            FieldMap::Component(c) => Some(&c.mapper),
            FieldMap::Collection(c) => c.mapper(),
            FieldMap::MergedCollection(m) => m.collection.mapper(),
            FieldMap::Simple(_) | FieldMap::Discriminator(_) => None,
        }
    }

    /// Component, collection or merged collection.
    pub fn is_entity_field(&self) -> bool {
        matches!(
            self,
            FieldMap::Component(_) | FieldMap::Collection(_) | FieldMap::MergedCollection(_)
        )
    }

    /// The collection data shared by plain and merged collections.
    pub fn as_collection(&self) -> Option<&CollectionMap> {
        match self {
            FieldMap::Collection(c) => Some(c),
            FieldMap::MergedCollection(m) => Some(&m.collection),
            _ => None,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleFieldMap> {
        match self {
            FieldMap::Simple(s) => Some(s),
            _ => None,
        }
    }
}

impl From<SimpleFieldMap> for FieldMap {
    fn from(s: SimpleFieldMap) -> Self {
        FieldMap::Simple(s)
    }
}

impl From<ComponentMap> for FieldMap {
    fn from(c: ComponentMap) -> Self {
        FieldMap::Component(Box::new(c))
    }
}

impl From<CollectionMap> for FieldMap {
    fn from(c: CollectionMap) -> Self {
        FieldMap::Collection(Box::new(c))
    }
}

impl From<MergedCollectionMap> for FieldMap {
    fn from(m: MergedCollectionMap) -> Self {
        FieldMap::MergedCollection(Box::new(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_matrix() {
        use Operation::*;
        assert!(Access::Full.allows(Read) && Access::Full.allows(Create) && Access::Full.allows(Update));
        assert!(Access::ReadOnly.allows(Read) && !Access::ReadOnly.allows(Create) && !Access::ReadOnly.allows(Update));
        assert!(Access::Final.allows(Read) && Access::Final.allows(Create) && !Access::Final.allows(Update));
        assert!(!Access::WriteOnly.allows(Read) && Access::WriteOnly.allows(Create) && Access::WriteOnly.allows(Update));
        assert!(!Access::CreateOnly.allows(Read) && Access::CreateOnly.allows(Create) && !Access::CreateOnly.allows(Update));
        assert!(Access::Sensitive.allows(Read) && Access::Sensitive.allows(Create) && Access::Sensitive.allows(Update));
    }

    #[test]
    fn test_discriminator_names() {
        let d = DiscriminatorFieldMap::new(None, None, false);
        assert_eq!((d.header.internal.as_str(), d.header.external.as_str()), ("class", "subclass"));
        let d = DiscriminatorFieldMap::new(Some("type"), Some("class"), true);
        assert_eq!((d.header.internal.as_str(), d.header.external.as_str()), ("type", "subclass"));
        let d = DiscriminatorFieldMap::new(Some("type"), Some("kind"), true);
        assert_eq!(d.header.external, "kind");
    }

    #[test]
    fn test_join_parent_key_defaults_to_foreign_key() {
        let j = Join::new("memberId", None);
        assert_eq!(j.parent_key, "memberId");
        let j = Join::new("memberId", Some("id")).using("MemberPersister");
        assert_eq!(j.parent_key, "id");
        assert_eq!(j.handler.as_deref(), Some("MemberPersister"));
    }
}
