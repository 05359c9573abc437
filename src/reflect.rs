//! Persistence metadata consumed by the compiler and the marshalling engine.

use crate::error::ConversionError;
use crate::object::{EntityRef, Record};
use crate::typer::FieldType;
use indexmap::IndexMap;

/// How a field participates in the persistent model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Simple,
    Component,
    ManyToOne,
    Collection,
    /// A collection association owned by the parent.
    OneToMany,
}

impl FieldKind {
    pub fn is_collection(self) -> bool {
        matches!(self, FieldKind::Collection | FieldKind::OneToMany)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionKind {
    #[default]
    List,
    SortedSet,
    Set,
}

/// Metadata for one persistent field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMetaData {
    pub internal_name: String,
    pub external_name: String,
    pub kind: FieldKind,
    /// Entity class of a component, association or entity collection.
    pub target_class: Option<String>,
    /// Scalar type of a simple field or of a simple collection's elements.
    pub value_type: Option<FieldType>,
    pub primary_key: bool,
    pub orphan_delete: bool,
    pub collection_kind: Option<CollectionKind>,
}

impl FieldMetaData {
    pub fn simple(name: &str, value_type: FieldType) -> Self {
        Self {
            internal_name: name.to_string(),
            external_name: name.to_string(),
            kind: FieldKind::Simple,
            target_class: None,
            value_type: Some(value_type),
            primary_key: false,
            orphan_delete: false,
            collection_kind: None,
        }
    }

    pub fn component(name: &str, class: &str) -> Self {
        Self::related(name, FieldKind::Component, class)
    }

    pub fn many_to_one(name: &str, class: &str) -> Self {
        Self::related(name, FieldKind::ManyToOne, class)
    }

    pub fn collection(name: &str, class: &str) -> Self {
        Self {
            collection_kind: Some(CollectionKind::List),
            ..Self::related(name, FieldKind::Collection, class)
        }
    }

    pub fn one_to_many(name: &str, class: &str) -> Self {
        Self {
            collection_kind: Some(CollectionKind::List),
            ..Self::related(name, FieldKind::OneToMany, class)
        }
    }

    /// A collection of scalar values.
    pub fn values(name: &str, element: FieldType) -> Self {
        Self {
            value_type: Some(element),
            collection_kind: Some(CollectionKind::List),
            ..Self::related(name, FieldKind::Collection, "")
        }
        .without_target()
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn orphan_delete(mut self) -> Self {
        self.orphan_delete = true;
        self
    }

    pub fn kind_of_collection(mut self, kind: CollectionKind) -> Self {
        self.collection_kind = Some(kind);
        self
    }

    pub fn external(mut self, name: &str) -> Self {
        self.external_name = name.to_string();
        self
    }

    fn related(name: &str, kind: FieldKind, class: &str) -> Self {
        Self {
            internal_name: name.to_string(),
            external_name: name.to_string(),
            kind,
            target_class: Some(class.to_string()),
            value_type: None,
            primary_key: false,
            orphan_delete: false,
            collection_kind: None,
        }
    }

    fn without_target(mut self) -> Self {
        self.target_class = None;
        self
    }

    /// A collection whose elements are scalars rather than entities.
    pub fn is_simple_collection(&self) -> bool {
        self.kind.is_collection() && self.target_class.is_none()
    }
}

/// Metadata provider and instance factory for entity classes.
///
/// One instance is built by the host and passed by reference to
/// [`compile`](crate::api::compile) and to the [`Marshaller`](crate::marshal::Marshaller).
pub trait Reflector {
    fn has_class(&self, class: &str) -> bool;

    /// Reflexive: every class is a subclass of itself.
    fn is_subclass_of(&self, class: &str, base: &str) -> bool;

    /// Persistent fields of `class`, inherited fields first.
    fn fields_of(&self, class: &str) -> Vec<FieldMetaData>;

    fn field(&self, class: &str, name: &str) -> Option<FieldMetaData> {
        self.fields_of(class)
            .into_iter()
            .find(|f| f.internal_name == name)
    }

    /// Whether instances carry an optimistic-lock `version`.
    fn is_versioned(&self, class: &str) -> bool;

    fn discriminator_name(&self, class: &str) -> Option<String>;

    fn discriminator_value(&self, class: &str) -> Option<String>;

    fn instantiate(&self, class: &str) -> Result<EntityRef, ConversionError>;
}

#[derive(Debug, Clone, Default)]
struct ClassInfo {
    parent: Option<String>,
    fields: Vec<FieldMetaData>,
    versioned: bool,
    discriminator_name: Option<String>,
    discriminator_value: Option<String>,
}

/// An in-memory [`Reflector`] whose classes are declared up front. It
/// instantiates [`Record`]s carrying every declared (and inherited) field.
#[derive(Debug, Clone, Default)]
pub struct StaticReflector {
    classes: IndexMap<String, ClassInfo>,
}

impl StaticReflector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(self, name: &str) -> ClassBuilder {
        ClassBuilder {
            reflector: self,
            name: name.to_string(),
            info: ClassInfo::default(),
        }
    }
}

/// Declares one class on a [`StaticReflector`].
pub struct ClassBuilder {
    reflector: StaticReflector,
    name: String,
    info: ClassInfo,
}

impl ClassBuilder {
    pub fn extends(mut self, parent: &str) -> Self {
        self.info.parent = Some(parent.to_string());
        self
    }

    pub fn field(mut self, meta: FieldMetaData) -> Self {
        self.info.fields.push(meta);
        self
    }

    /// Adds an integer `version` field.
    pub fn versioned(mut self) -> Self {
        self.info.versioned = true;
        self.info.fields.push(FieldMetaData::simple("version", FieldType::Integer));
        self
    }

    pub fn discriminator(mut self, name: &str) -> Self {
        self.info.discriminator_name = Some(name.to_string());
        self
    }

    pub fn discriminator_value(mut self, value: &str) -> Self {
        self.info.discriminator_value = Some(value.to_string());
        self
    }

    pub fn done(mut self) -> StaticReflector {
        self.reflector.classes.insert(self.name, self.info);
        self.reflector
    }
}

impl Reflector for StaticReflector {
    fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    fn is_subclass_of(&self, class: &str, base: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == base {
                return true;
            }
            current = self.classes.get(name).and_then(|c| c.parent.as_deref());
        }
        false
    }

    fn fields_of(&self, class: &str) -> Vec<FieldMetaData> {
        let Some(info) = self.classes.get(class) else {
            return Vec::new();
        };
        let mut fields = match &info.parent {
            Some(parent) => self.fields_of(parent),
            None => Vec::new(),
        };
        fields.extend(info.fields.iter().cloned());
        fields
    }

    fn is_versioned(&self, class: &str) -> bool {
        let mut current = self.classes.get(class);
        while let Some(info) = current {
            if info.versioned {
                return true;
            }
            current = info.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        false
    }

    fn discriminator_name(&self, class: &str) -> Option<String> {
        let info = self.classes.get(class)?;
        match &info.discriminator_name {
            Some(name) => Some(name.clone()),
            None => info
                .parent
                .as_deref()
                .and_then(|parent| self.discriminator_name(parent)),
        }
    }

    fn discriminator_value(&self, class: &str) -> Option<String> {
        self.classes.get(class)?.discriminator_value.clone()
    }

    fn instantiate(&self, class: &str) -> Result<EntityRef, ConversionError> {
        if !self.has_class(class) {
            return Err(ConversionError::Instantiation {
                class: class.to_string(),
            });
        }
        let names: Vec<String> = self
            .fields_of(class)
            .into_iter()
            .map(|f| f.internal_name)
            .collect();
        Ok(Record::new(class, names).into_ref())
    }
}
