//! The engine that walks an [`EntityMapper`] to read entities into documents
//! and to write documents onto entities.

use crate::association::{Association, WriteOutcome};
use crate::document::{Document, Value};
use crate::error::{ConversionError, MapperError};
use crate::field_map::{
    Access, CollectionElement, CollectionMap, ComponentMap, DiscriminatorFieldMap, FieldHeader, FieldMap, Operation,
    SimpleFieldMap, SENSITIVE_MASK,
};
use crate::mapper::{EntityMapper, VERSION_KEY};
use crate::object::{Collection, Entity, EntityRef, Property};
use crate::reflect::Reflector;
use log::{debug, trace, warn};

/// Reads and writes object graphs through compiled mappers.
///
/// Holds only the metadata provider, so one instance can serve any number of
/// mappers and calls.
pub struct Marshaller<'r> {
    reflector: &'r dyn Reflector,
}

impl<'r> Marshaller<'r> {
    pub fn new(reflector: &'r dyn Reflector) -> Self {
        Self { reflector }
    }

    // READ

    /// Converts `entity` to a document.
    pub fn read(&self, mapper: &EntityMapper, entity: &EntityRef) -> Result<Document, ConversionError> {
        let source = entity.borrow();
        self.read_fields(mapper, &*source)
    }

    /// Converts a nested component or collection element, using the mapper
    /// found at `path`.
    pub fn read_sub_resource(&self, mapper: &EntityMapper, data: &EntityRef, path: &str) -> Result<Document, MapperError> {
        let nested = mapper.mapper_for_sub_resource(path)?;
        Ok(self.read(nested, data)?)
    }

    fn read_fields(&self, mapper: &EntityMapper, source: &dyn Entity) -> Result<Document, ConversionError> {
        let mut doc = Document::new();
        for fm in mapper.field_maps().iter().chain(mapper.merged_field_maps()) {
            // a union reads each variant through whichever field maps it has
            if mapper.is_union() && skips_variant(fm, source) {
                continue;
            }
            self.read_field(mapper, fm, source, &mut doc)
                .map_err(|e| e.in_field(fm.external()))?;
        }
        Ok(doc)
    }

    fn read_field(
        &self,
        mapper: &EntityMapper,
        fm: &FieldMap,
        source: &dyn Entity,
        doc: &mut Document,
    ) -> Result<(), ConversionError> {
        match fm {
            FieldMap::Simple(s) => read_simple(s, source, doc),
            FieldMap::Discriminator(d) => read_discriminator(mapper, d, source, doc),
            FieldMap::Component(c) => self.read_component(c, source, doc),
            FieldMap::Collection(c) => self.read_collection(c, source, doc),
            FieldMap::MergedCollection(m) => self.read_collection(&m.collection, source, doc),
        }
    }

    fn read_component(&self, c: &ComponentMap, source: &dyn Entity, doc: &mut Document) -> Result<(), ConversionError> {
        if !c.header.operation_allowed(Operation::Read) {
            return Ok(());
        }

        let nested = if c.for_subclass {
            let subclass = c.mapper.base_class().unwrap_or_default();
            if !self.reflector.is_subclass_of(source.class_name(), subclass) {
                return Ok(());
            }
            self.read_fields(&c.mapper, source)?
        } else {
            if !c.header.is_attribute && !source.has_property(&c.header.internal) {
                return Ok(());
            }
            let Some(value) = current_value(&c.header, source)? else {
                return Ok(());
            };
            match value {
                Property::Null => {
                    if !c.flattened {
                        doc.put(&c.header.external, Value::Null);
                    }
                    return Ok(());
                }
                Property::Entity(entity) => self.read(&c.mapper, &entity)?,
                _ => return Err(not_an_entity(source, &c.header)),
            }
        };

        if c.flattened {
            for (key, value) in nested {
                doc.put(&key, value);
            }
        } else {
            doc.put(&c.header.external, nested);
        }
        Ok(())
    }

    fn read_collection(&self, c: &CollectionMap, source: &dyn Entity, doc: &mut Document) -> Result<(), ConversionError> {
        if !c.header.operation_allowed(Operation::Read) {
            return Ok(());
        }
        if !c.header.is_attribute && !source.has_property(&c.header.internal) {
            return Ok(());
        }
        let Some(value) = current_value(&c.header, source)? else {
            return Ok(());
        };
        let collection = match value {
            Property::Null => {
                doc.put(&c.header.external, Value::Null);
                return Ok(());
            }
            Property::Collection(collection) => collection,
            _ => return Err(not_a_collection(source, &c.header)),
        };

        let collection = collection.borrow();
        let mut items = Vec::with_capacity(collection.len());
        for item in collection.items() {
            if item.is_null() {
                continue;
            }
            match &c.element {
                CollectionElement::Primitive(_) => items.push(item.to_value().ok_or_else(|| {
                    ConversionError::UnsupportedValue {
                        field: c.header.external.clone(),
                        target: "collection element".to_string(),
                    }
                })?),
                CollectionElement::Entity(nested) => {
                    let entity = item.as_entity().ok_or_else(|| not_an_entity(source, &c.header))?;
                    items.push(Value::Map(self.read(nested, entity)?));
                }
            }
        }
        doc.put(&c.header.external, Value::Seq(items));
        Ok(())
    }

    // WRITE

    /// Instantiates the class selected by the document's discriminator (or
    /// the base class) and writes `doc` onto it.
    pub fn create<'m>(
        &self,
        mapper: &'m EntityMapper,
        doc: Document,
        operation: Operation,
    ) -> Result<(EntityRef, WriteOutcome<'m>), ConversionError> {
        let class = resolve_class(mapper, &doc)?;
        let entity = self.reflector.instantiate(&class)?;
        let outcome = self.merge(mapper, doc, &entity, operation)?;
        Ok((entity, outcome))
    }

    /// Writes `doc` onto an existing entity.
    ///
    /// Defaults are applied first, then the keys of flattened components are
    /// gathered into nested documents, then every key is dispatched to its
    /// field map. Keys without a field map are ignored.
    pub fn merge<'m>(
        &self,
        mapper: &'m EntityMapper,
        mut doc: Document,
        target: &EntityRef,
        operation: Operation,
    ) -> Result<WriteOutcome<'m>, ConversionError> {
        let mut outcome = WriteOutcome::new();
        apply_defaults(mapper, target, operation)?;
        lift_flattened(mapper, &mut doc);

        for (key, value) in doc {
            let Some(fm) = mapper.find_by_external_name(&key) else {
                warn!("ignoring field '{}' with no mapping in {}", key, mapper.base_class_alias());
                continue;
            };
            trace!("writing {}.{}", mapper.base_class_alias(), key);
            self.write_field(mapper, fm, value, target, operation, &mut outcome)
                .map_err(|e| e.in_field(&key))?;
        }
        Ok(outcome)
    }

    fn write_field<'m>(
        &self,
        mapper: &'m EntityMapper,
        fm: &'m FieldMap,
        value: Value,
        target: &EntityRef,
        operation: Operation,
        outcome: &mut WriteOutcome<'m>,
    ) -> Result<(), ConversionError> {
        if mapper.is_union() && skips_variant(fm, &*target.borrow()) {
            warn!(
                "skipping '{}': {} has no such property",
                fm.external(),
                target.borrow().class_name()
            );
            return Ok(());
        }
        match fm {
            FieldMap::Simple(s) => write_simple(s, value, target, operation, outcome),
            // the instantiated class already reflects the discriminator
            FieldMap::Discriminator(_) => Ok(()),
            FieldMap::Component(c) => self.write_component(mapper, c, value, target, operation, outcome),
            FieldMap::Collection(c) => self.write_collection(c, value, target, operation, outcome),
            FieldMap::MergedCollection(m) => self.write_collection(&m.collection, value, target, operation, outcome),
        }
    }

    fn write_component<'m>(
        &self,
        parent: &'m EntityMapper,
        c: &'m ComponentMap,
        value: Value,
        target: &EntityRef,
        operation: Operation,
        outcome: &mut WriteOutcome<'m>,
    ) -> Result<(), ConversionError> {
        let document = match value {
            Value::Null => None,
            Value::Map(document) => Some(document),
            _ => {
                return Err(ConversionError::NotADocument {
                    field: c.header.external.clone(),
                })
            }
        };
        if !c.header.operation_allowed(operation) {
            return Ok(());
        }
        if c.header.is_attribute {
            if target.borrow().as_attributed().is_none() {
                return Ok(());
            }
        } else if !c.is_join() && !c.for_subclass && !target.borrow().has_property(&c.header.internal) {
            return Ok(());
        }
        // joins that do not cascade are read-only associations
        if !c.header.is_attribute && c.is_join() && !c.is_cascade_update() {
            return Ok(());
        }

        let document = match document {
            Some(document) => Some(document),
            None if c.header.is_attribute => {
                if !c.has_defaults() {
                    return assign(&c.header, target, Property::Null);
                }
                Some(Document::new())
            }
            None if !c.is_join() => {
                if c.has_defaults() && !c.outer_join {
                    Some(Document::new())
                } else {
                    if !c.for_subclass {
                        let mut entity = target.borrow_mut();
                        if !entity.property(&c.header.internal)?.is_null() {
                            outcome.mark_modified();
                        }
                        entity.set_property(&c.header.internal, Property::Null)?;
                    }
                    return Ok(());
                }
            }
            None => None,
        };

        let current = if c.header.is_attribute {
            target
                .borrow()
                .as_attributed()
                .and_then(|a| a.attribute(&c.header.internal))
                .unwrap_or_default()
        } else {
            if let Some(join) = &c.join {
                if parent.internal_identifier_name() == Some(join.parent_key.as_str()) {
                    debug!("deferring joined component '{}' until the parent is saved", c.header.external);
                    outcome.deferred.push(Association::OneToManyComponent {
                        field: c,
                        parent_mapper: parent,
                        document,
                    });
                    return Ok(());
                }
            }

            if c.mapper.external_identifier_name().is_some() && c.is_cascade_update() {
                if let (true, Some(document)) = (c.is_join(), document) {
                    debug!("preempting joined component '{}' before the parent is saved", c.header.external);
                    outcome.preempted.push(Association::ManyToOne {
                        field: c,
                        document,
                        parent: target.clone(),
                    });
                }
                return Ok(());
            }

            if c.for_subclass {
                let subclass = c.mapper.base_class().unwrap_or_default();
                let applies = self.reflector.is_subclass_of(target.borrow().class_name(), subclass);
                if applies {
                    let nested = self.merge(&c.mapper, document.unwrap_or_default(), target, operation)?;
                    outcome.absorb(nested);
                }
                return Ok(());
            }

            target.borrow().property(&c.header.internal)?
        };

        let document = document.unwrap_or_default();
        let internal_id = c.mapper.internal_identifier_name();
        let replace = current.is_null() || (!c.is_cascade_delete() && !c.is_cascade_update() && internal_id.is_some());

        if replace {
            let old_id = match (&current, internal_id) {
                (Property::Entity(existing), Some(id)) => existing.borrow().property(id)?,
                _ => Property::Null,
            };
            let new_id = c.mapper.resolve_identifier_for_document(&document).cloned().unwrap_or_default();
            if current.is_null() || !old_id.matches_value(&new_id) {
                outcome.mark_modified();
            }
            let (created, nested) = self.create(&c.mapper, document, operation)?;
            outcome.absorb_associations(nested);
            assign(&c.header, target, Property::Entity(created))
        } else {
            let Property::Entity(existing) = current else {
                return Err(not_an_entity(&*target.borrow(), &c.header));
            };
            let nested = self.merge(&c.mapper, document, &existing, operation)?;
            outcome.absorb(nested);
            Ok(())
        }
    }

    fn write_collection<'m>(
        &self,
        c: &'m CollectionMap,
        value: Value,
        target: &EntityRef,
        operation: Operation,
        outcome: &mut WriteOutcome<'m>,
    ) -> Result<(), ConversionError> {
        let items = match value {
            Value::Null => return Ok(()),
            Value::Seq(items) => items,
            _ => {
                return Err(ConversionError::NotASequence {
                    field: c.header.external.clone(),
                })
            }
        };
        if !c.header.operation_allowed(operation) {
            return Ok(());
        }
        if c.header.is_attribute && target.borrow().as_attributed().is_none() {
            return Ok(());
        }
        if c.is_join() && !c.is_cascade_update() {
            return Ok(());
        }
        if c.is_join() && !c.header.is_attribute {
            debug!("deferring joined collection '{}' until the parent is saved", c.header.external);
            outcome.deferred.push(Association::Collection {
                field: c,
                documents: items,
            });
            return Ok(());
        }

        let existing = {
            let entity = target.borrow();
            if !c.header.is_attribute && !entity.has_property(&c.header.internal) {
                return Err(not_a_collection(&*entity, &c.header));
            }
            match current_value(&c.header, &*entity)?.unwrap_or_default() {
                Property::Null => None,
                Property::Collection(collection) => Some(collection),
                _ => return Err(not_a_collection(&*entity, &c.header)),
            }
        };

        // Orphan-deleting one-to-many collections are refilled in place so
        // removed elements stay observable; anything else is replaced.
        let (collection, snapshot) = match existing {
            Some(existing) if c.one_to_many && c.orphan_delete => {
                let snapshot = existing.borrow().clone();
                existing.borrow_mut().clear();
                (existing, Some(snapshot))
            }
            existing => {
                let fresh = Collection::shared(c.kind);
                assign(&c.header, target, Property::Collection(fresh.clone()))?;
                (fresh, existing.map(|e| e.borrow().clone()))
            }
        };
        let snapshot = snapshot.map(|mut snapshot| {
            if snapshot.remove_nulls() {
                outcome.mark_modified();
            }
            snapshot
        });

        if collection_modified(c, &items, snapshot.as_ref())? {
            outcome.mark_modified();
        }

        let nested = match &c.element {
            CollectionElement::Primitive(_) => {
                let mut collection = collection.borrow_mut();
                for item in &items {
                    let property = Property::from_value(item).ok_or_else(|| ConversionError::UnsupportedValue {
                        field: c.header.external.clone(),
                        target: "collection element".to_string(),
                    })?;
                    collection.add(property);
                }
                return Ok(());
            }
            CollectionElement::Entity(nested) => nested,
        };

        for item in items {
            let document = match item {
                Value::Null => continue,
                Value::Map(document) => document,
                _ => {
                    return Err(ConversionError::NotADocument {
                        field: c.header.external.clone(),
                    })
                }
            };
            let reused = match &snapshot {
                Some(snapshot) => find_existing(nested, snapshot, &document)?,
                None => None,
            };
            let element = match reused {
                Some(existing) => {
                    let merged = self.merge(nested, document, &existing, operation)?;
                    outcome.absorb(merged);
                    existing
                }
                None => {
                    let (created, nested_outcome) = self.create(nested, document, operation)?;
                    outcome.absorb_associations(nested_outcome);
                    created
                }
            };
            collection.borrow_mut().add(Property::Entity(element));
        }
        Ok(())
    }
}

/// Whether a union field map has nothing to act on for this variant. The
/// discriminator is derived from the class, never from a property.
fn skips_variant(fm: &FieldMap, entity: &dyn Entity) -> bool {
    !fm.is_attribute() && !matches!(fm, FieldMap::Discriminator(_)) && !entity.has_property(fm.internal())
}

fn current_value(header: &FieldHeader, entity: &dyn Entity) -> Result<Option<Property>, ConversionError> {
    if header.is_attribute {
        Ok(entity
            .as_attributed()
            .map(|a| a.attribute(&header.internal).unwrap_or_default()))
    } else {
        entity.property(&header.internal).map(Some)
    }
}

fn assign(header: &FieldHeader, target: &EntityRef, value: Property) -> Result<(), ConversionError> {
    let mut entity = target.borrow_mut();
    if header.is_attribute {
        if let Some(attributed) = entity.as_attributed_mut() {
            attributed.set_attribute(&header.internal, value);
        }
        Ok(())
    } else {
        entity.set_property(&header.internal, value)
    }
}

fn not_an_entity(entity: &dyn Entity, header: &FieldHeader) -> ConversionError {
    ConversionError::NotAnEntity {
        class: entity.class_name().to_string(),
        field: header.internal.clone(),
    }
}

fn not_a_collection(entity: &dyn Entity, header: &FieldHeader) -> ConversionError {
    ConversionError::NotACollection {
        class: entity.class_name().to_string(),
        field: header.internal.clone(),
    }
}

fn read_simple(s: &SimpleFieldMap, source: &dyn Entity, doc: &mut Document) -> Result<(), ConversionError> {
    if !s.header.operation_allowed(Operation::Read) {
        return Ok(());
    }
    let Some(property) = current_value(&s.header, source)? else {
        return Ok(());
    };
    let value = property.to_value().ok_or_else(|| ConversionError::UnsupportedValue {
        field: s.header.external.clone(),
        target: "scalar".to_string(),
    })?;
    let value = match value {
        Value::Null => return Ok(()),
        Value::Str(text) if text.is_empty() => Value::Str(text),
        _ if s.header.access == Access::Sensitive => Value::from(SENSITIVE_MASK),
        value => value,
    };
    doc.put(&s.header.external, value);
    Ok(())
}

fn read_discriminator(
    mapper: &EntityMapper,
    d: &DiscriminatorFieldMap,
    source: &dyn Entity,
    doc: &mut Document,
) -> Result<(), ConversionError> {
    if d.stored_property {
        if let Some(value) = source.property(&d.header.internal)?.to_value() {
            if !value.is_null() {
                doc.put(&d.header.external, value);
            }
        }
    } else if let Some(value) = mapper.subclass_discriminator_value(source.class_name()) {
        doc.put(&d.header.external, value);
    }
    Ok(())
}

fn write_simple(
    s: &SimpleFieldMap,
    value: Value,
    target: &EntityRef,
    operation: Operation,
    outcome: &mut WriteOutcome<'_>,
) -> Result<(), ConversionError> {
    if !s.header.operation_allowed(operation) {
        return Ok(());
    }
    // the mask means the client left the value unchanged
    if s.header.access == Access::Sensitive && value.as_str() == Some(SENSITIVE_MASK) {
        return Ok(());
    }
    let property = Property::from_value(&value).ok_or_else(|| ConversionError::UnsupportedValue {
        field: s.header.external.clone(),
        target: "scalar".to_string(),
    })?;

    let mut entity = target.borrow_mut();
    if s.header.is_attribute {
        if let Some(attributed) = entity.as_attributed_mut() {
            if property.is_null() {
                attributed.remove_attribute(&s.header.internal);
            } else {
                attributed.set_attribute(&s.header.internal, property);
            }
        }
        return Ok(());
    }
    if s.header.internal != VERSION_KEY && !entity.property(&s.header.internal)?.matches_value(&value) {
        outcome.mark_modified();
    }
    entity.set_property(&s.header.internal, property)
}

fn resolve_class(mapper: &EntityMapper, doc: &Document) -> Result<String, ConversionError> {
    if let Some(discriminator) = mapper.discriminator() {
        if let Some(value) = doc.get(&discriminator.header.external).filter(|v| !v.is_null()) {
            let value = value.to_string();
            return mapper
                .discriminated_subclass(&value)
                .map(|spec| spec.class_name().to_string())
                .ok_or_else(|| ConversionError::UnknownDiscriminator {
                    class: mapper.base_class_alias().to_string(),
                    value,
                });
        }
    }
    mapper
        .base_class()
        .map(str::to_string)
        .ok_or_else(|| ConversionError::Instantiation {
            class: mapper.base_class_alias().to_string(),
        })
}

/// Sets each declared default whose property is still null.
fn apply_defaults(mapper: &EntityMapper, target: &EntityRef, operation: Operation) -> Result<(), ConversionError> {
    for fm in mapper.field_maps().iter().chain(mapper.merged_field_maps()) {
        let FieldMap::Simple(s) = fm else { continue };
        let Some(default) = &s.default else { continue };
        if !s.header.operation_allowed(operation) {
            continue;
        }
        let value = Property::from_value(default).ok_or_else(|| ConversionError::UnsupportedValue {
            field: s.header.external.clone(),
            target: "scalar".to_string(),
        })?;
        let mut entity = target.borrow_mut();
        if s.header.is_attribute {
            if let Some(attributed) = entity.as_attributed_mut() {
                if attributed.attribute(&s.header.internal).map_or(true, |p| p.is_null()) {
                    attributed.set_attribute(&s.header.internal, value);
                }
            }
            continue;
        }
        if mapper.is_union() && !entity.has_property(&s.header.internal) {
            continue;
        }
        let unset = entity
            .property(&s.header.internal)
            .map_err(|e| e.in_field(&s.header.external))?
            .is_null();
        if unset {
            entity
                .set_property(&s.header.internal, value)
                .map_err(|e| e.in_field(&s.header.external))?;
        }
    }
    Ok(())
}

/// Moves the top-level keys belonging to flattened components into a
/// nested document under the component's own key.
fn lift_flattened(mapper: &EntityMapper, doc: &mut Document) {
    for fm in mapper.field_maps() {
        let FieldMap::Component(c) = fm else { continue };
        if !c.flattened {
            continue;
        }
        let mut nested = Document::new();
        for inner in c.mapper.field_maps() {
            if let Some(value) = doc.remove(inner.external()) {
                nested.put(inner.external(), value);
            }
        }
        if !nested.is_empty() {
            debug!("lifted {} flattened fields into '{}'", nested.len(), c.header.external);
            doc.put(&c.header.external, nested);
        }
    }
}

/// Decides whether the incoming elements differ from the snapshot. Without
/// an identifier, element identity cannot be established, so any entity
/// collection counts as changed.
fn collection_modified(c: &CollectionMap, items: &[Value], snapshot: Option<&Collection>) -> Result<bool, ConversionError> {
    let Some(snapshot) = snapshot else {
        return Ok(true);
    };
    if snapshot.len() != items.len() {
        return Ok(true);
    }
    match &c.element {
        CollectionElement::Primitive(_) => Ok(snapshot
            .items()
            .iter()
            .zip(items)
            .any(|(old, new)| !old.matches_value(new))),
        CollectionElement::Entity(nested) => {
            let (Some(external), Some(internal)) = (nested.external_identifier_name(), nested.internal_identifier_name())
            else {
                return Ok(true);
            };
            for (old, new) in snapshot.items().iter().zip(items) {
                let new_key = new.as_document().and_then(|d| d.get(external)).cloned().unwrap_or_default();
                let old_key = match old.as_entity() {
                    Some(entity) => entity.borrow().property(internal)?,
                    None => Property::Null,
                };
                if !old_key.matches_value(&new_key) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// The snapshot element whose identifier equals the document's, if any.
fn find_existing(
    mapper: &EntityMapper,
    snapshot: &Collection,
    document: &Document,
) -> Result<Option<EntityRef>, ConversionError> {
    let (Some(external), Some(internal)) = (mapper.external_identifier_name(), mapper.internal_identifier_name()) else {
        return Ok(None);
    };
    let Some(key) = document.get(external).filter(|k| !k.is_null()) else {
        return Ok(None);
    };
    for item in snapshot.items() {
        let Some(entity) = item.as_entity() else { continue };
        if entity.borrow().property(internal)?.matches_value(key) {
            return Ok(Some(entity.clone()));
        }
    }
    Ok(None)
}
