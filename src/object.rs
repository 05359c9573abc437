//! Property access over an object graph of arbitrary entity types.
//!
//! Entities are shared, interiorly mutable nodes ([`EntityRef`]); collections
//! are shared too, so that a write can refill an existing collection in place
//! and callers can observe which instance a property holds afterwards.

use crate::document::{Document, Value};
use crate::error::ConversionError;
use crate::reflect::CollectionKind;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::rc::Rc;

pub type EntityRef = Rc<RefCell<dyn Entity>>;
pub type CollectionRef = Rc<RefCell<Collection>>;

/// Named-property access on one object.
pub trait Entity: Debug {
    fn class_name(&self) -> &str;

    fn has_property(&self, name: &str) -> bool;

    fn property(&self, name: &str) -> Result<Property, ConversionError>;

    fn set_property(&mut self, name: &str, value: Property) -> Result<(), ConversionError>;

    fn as_attributed(&self) -> Option<&dyn Attributed> {
        None
    }

    fn as_attributed_mut(&mut self) -> Option<&mut dyn Attributed> {
        None
    }
}

/// Virtual fields managed by plugins rather than backed by real properties.
pub trait Attributed {
    fn attribute(&self, name: &str) -> Option<Property>;

    fn set_attribute(&mut self, name: &str, value: Property);

    fn remove_attribute(&mut self, name: &str);
}

/// The value of one property.
#[derive(Debug, Clone, Default)]
pub enum Property {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Entity(EntityRef),
    Collection(CollectionRef),
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Property::Null, Property::Null) => true,
            (Property::Bool(a), Property::Bool(b)) => a == b,
            (Property::Int(a), Property::Int(b)) => a == b,
            (Property::Decimal(a), Property::Decimal(b)) => a == b,
            (Property::Int(a), Property::Decimal(b)) | (Property::Decimal(b), Property::Int(a)) => {
                Decimal::from(*a) == *b
            }
            (Property::Str(a), Property::Str(b)) => a == b,
            (Property::Entity(a), Property::Entity(b)) => Rc::ptr_eq(a, b),
            (Property::Collection(a), Property::Collection(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Property {
    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null)
    }

    pub fn entity(entity: impl Entity + 'static) -> Property {
        Property::Entity(Rc::new(RefCell::new(entity)))
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Property::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Property::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a scalar property into a document value. Entities and
    /// collections have no scalar form and yield `None`.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Property::Null => Some(Value::Null),
            Property::Bool(b) => Some(Value::Bool(*b)),
            Property::Int(i) => Some(Value::Int(*i)),
            Property::Decimal(d) => Some(Value::Decimal(*d)),
            Property::Str(s) => Some(Value::Str(s.clone())),
            Property::Entity(_) | Property::Collection(_) => None,
        }
    }

    /// Converts a scalar document value into a property. Nested documents
    /// and sequences have no scalar form and yield `None`.
    pub fn from_value(value: &Value) -> Option<Property> {
        match value {
            Value::Null => Some(Property::Null),
            Value::Bool(b) => Some(Property::Bool(*b)),
            Value::Int(i) => Some(Property::Int(*i)),
            Value::Decimal(d) => Some(Property::Decimal(*d)),
            Value::Str(s) => Some(Property::Str(s.clone())),
            Value::Seq(_) | Value::Map(_) => None,
        }
    }

    /// Whether this scalar equals a document value, comparing numbers by
    /// magnitude.
    pub fn matches_value(&self, value: &Value) -> bool {
        self.to_value().is_some_and(|v| v.value_eq(value))
    }

    fn ordering(&self, other: &Property) -> Ordering {
        match (self, other) {
            (Property::Int(a), Property::Int(b)) => a.cmp(b),
            (Property::Decimal(a), Property::Decimal(b)) => a.cmp(b),
            (Property::Int(a), Property::Decimal(b)) => Decimal::from(*a).cmp(b),
            (Property::Decimal(a), Property::Int(b)) => a.cmp(&Decimal::from(*b)),
            (Property::Str(a), Property::Str(b)) => a.cmp(b),
            (Property::Bool(a), Property::Bool(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<&str> for Property {
    fn from(s: &str) -> Self {
        Property::Str(s.to_string())
    }
}

impl From<String> for Property {
    fn from(s: String) -> Self {
        Property::Str(s)
    }
}

impl From<i64> for Property {
    fn from(i: i64) -> Self {
        Property::Int(i)
    }
}

impl From<bool> for Property {
    fn from(b: bool) -> Self {
        Property::Bool(b)
    }
}

impl From<Decimal> for Property {
    fn from(d: Decimal) -> Self {
        Property::Decimal(d)
    }
}

impl From<EntityRef> for Property {
    fn from(e: EntityRef) -> Self {
        Property::Entity(e)
    }
}

/// An ordered list, a sorted set or an unordered set of properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    kind: CollectionKind,
    items: Vec<Property>,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }

    pub fn shared(kind: CollectionKind) -> CollectionRef {
        Rc::new(RefCell::new(Self::new(kind)))
    }

    pub fn from_items(kind: CollectionKind, items: impl IntoIterator<Item = Property>) -> Self {
        let mut collection = Self::new(kind);
        for item in items {
            collection.add(item);
        }
        collection
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Adds `item`. Sets ignore items already present; sorted sets keep
    /// scalar items in ascending order.
    pub fn add(&mut self, item: Property) {
        match self.kind {
            CollectionKind::List => self.items.push(item),
            CollectionKind::Set => {
                if !self.items.contains(&item) {
                    self.items.push(item);
                }
            }
            CollectionKind::SortedSet => {
                if !self.items.contains(&item) {
                    let at = self
                        .items
                        .iter()
                        .position(|existing| item.ordering(existing) == Ordering::Less)
                        .unwrap_or(self.items.len());
                    self.items.insert(at, item);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Drops null items, returning whether any were present.
    pub fn remove_nulls(&mut self) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.is_null());
        before != self.items.len()
    }

    pub fn items(&self) -> &[Property] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A dynamic entity: a class name and a bag of declared properties. Writing
/// an undeclared property fails, as it would on a real class.
#[derive(Debug, Clone)]
pub struct Record {
    class: String,
    properties: IndexMap<String, Property>,
    attributes: IndexMap<String, Property>,
}

impl Record {
    pub fn new(class: &str, properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            class: class.to_string(),
            properties: properties
                .into_iter()
                .map(|name| (name.into(), Property::Null))
                .collect(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style setter for declared properties, used to assemble graphs.
    pub fn with(mut self, name: &str, value: impl Into<Property>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn into_ref(self) -> EntityRef {
        Rc::new(RefCell::new(self))
    }

    /// The scalar properties of the record as a flat document, for
    /// diagnostics and tests.
    pub fn scalars(&self) -> Document {
        let mut doc = Document::new();
        for (name, value) in &self.properties {
            if let Some(v) = value.to_value() {
                doc.put(name, v);
            }
        }
        doc
    }
}

impl Entity for Record {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    fn property(&self, name: &str) -> Result<Property, ConversionError> {
        self.properties
            .get(name)
            .cloned()
            .ok_or_else(|| ConversionError::Property {
                class: self.class.clone(),
                property: name.to_string(),
                message: "no such property".to_string(),
            })
    }

    fn set_property(&mut self, name: &str, value: Property) -> Result<(), ConversionError> {
        match self.properties.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ConversionError::Property {
                class: self.class.clone(),
                property: name.to_string(),
                message: "no such property".to_string(),
            }),
        }
    }

    fn as_attributed(&self) -> Option<&dyn Attributed> {
        Some(self)
    }

    fn as_attributed_mut(&mut self) -> Option<&mut dyn Attributed> {
        Some(self)
    }
}

impl Attributed for Record {
    fn attribute(&self, name: &str) -> Option<Property> {
        self.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, name: &str, value: Property) {
        self.attributes.insert(name.to_string(), value);
    }

    fn remove_attribute(&mut self, name: &str) {
        self.attributes.shift_remove(name);
    }
}
