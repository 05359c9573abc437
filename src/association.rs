//! Association work a write hands back to the persistence layer.
//!
//! The marshaller never saves anything. It classifies each joined field into
//! one of two buckets: associations to persist before the subject
//! (`preempted`) and associations to persist after it (`deferred`).

use crate::document::{Document, Value};
use crate::error::ConversionError;
use crate::field_map::{CollectionMap, ComponentMap};
use crate::mapper::EntityMapper;
use crate::object::EntityRef;
use log::trace;

#[derive(Debug)]
pub enum Association<'m> {
    /// A cascading joined component the subject holds a foreign key to.
    ManyToOne {
        field: &'m ComponentMap,
        document: Document,
        parent: EntityRef,
    },
    /// A joined component keyed by the subject's own identifier.
    OneToManyComponent {
        field: &'m ComponentMap,
        parent_mapper: &'m EntityMapper,
        document: Option<Document>,
    },
    /// A cascading joined collection.
    Collection {
        field: &'m CollectionMap,
        documents: Vec<Value>,
    },
}

impl<'m> Association<'m> {
    pub fn external_name(&self) -> &str {
        match self {
            Association::ManyToOne { field, .. } | Association::OneToManyComponent { field, .. } => {
                &field.header.external
            }
            Association::Collection { field, .. } => &field.header.external,
        }
    }

    /// The association's own document, if it carries one.
    pub fn document(&self) -> Option<&Document> {
        match self {
            Association::ManyToOne { document, .. } => Some(document),
            Association::OneToManyComponent { document, .. } => document.as_ref(),
            Association::Collection { .. } => None,
        }
    }

    /// Links a saved entity into the association.
    ///
    /// For `ManyToOne`, `saved` is the saved associated entity. Its foreign
    /// key is copied into the subject's parent-key property, and the result
    /// reports whether that property changed. For `OneToManyComponent`,
    /// `saved` is the saved subject. Its key is written into the component
    /// document's foreign-key entry, and the result is always `false`.
    /// Collections have nothing to link.
    pub fn associate(&mut self, saved: &EntityRef) -> Result<bool, ConversionError> {
        match self {
            Association::ManyToOne { field, parent, .. } => {
                let Some(join) = &field.join else {
                    return Ok(false);
                };
                let value = saved.borrow().property(&join.foreign_key)?;
                let mut parent = parent.borrow_mut();
                let modified = parent.property(&join.parent_key)? != value;
                trace!("linking {} into {}.{}", join.foreign_key, parent.class_name(), join.parent_key);
                parent.set_property(&join.parent_key, value)?;
                Ok(modified)
            }
            Association::OneToManyComponent {
                field,
                parent_mapper,
                document,
            } => {
                let (Some(join), Some(document)) = (&field.join, document.as_mut()) else {
                    return Ok(false);
                };
                let key_property = parent_mapper
                    .find_by_external_name(&join.parent_key)
                    .map_or(join.parent_key.as_str(), |fm| fm.internal());
                let saved = saved.borrow();
                let key = saved.property(key_property)?;
                let value = key.to_value().ok_or_else(|| ConversionError::UnsupportedValue {
                    field: key_property.to_string(),
                    target: "foreign key".to_string(),
                })?;
                document.put(&join.foreign_key, value);
                Ok(false)
            }
            Association::Collection { .. } => Ok(false),
        }
    }
}

/// What one write produced: whether any mapped value changed and which
/// associations the caller must persist around the subject.
#[derive(Debug, Default)]
pub struct WriteOutcome<'m> {
    pub modified: bool,
    pub preempted: Vec<Association<'m>>,
    pub deferred: Vec<Association<'m>>,
}

impl<'m> WriteOutcome<'m> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Folds a nested write into this one.
    pub fn absorb(&mut self, nested: WriteOutcome<'m>) {
        self.modified |= nested.modified;
        self.absorb_associations(nested);
    }

    /// Takes the nested write's associations but not its modification flag.
    pub fn absorb_associations(&mut self, nested: WriteOutcome<'m>) {
        self.preempted.extend(nested.preempted);
        self.deferred.extend(nested.deferred);
    }
}
