use crate::document::{Document, Value};
use crate::error::{ConversionError, DefinitionError, LookupError, MapperError};
use crate::field_map::{
    Access, CollectionElement, CollectionMap, DiscriminatorFieldMap, FieldHeader, FieldMap, FieldMapKind,
    SimpleFieldMap, SENSITIVE_MASK,
};
use crate::object::{EntityRef, Property};
use crate::reflect::{FieldKind, Reflector};
use crate::typer::{FieldType, FieldTyper};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Internal and external name of the implicit optimistic-lock field.
pub const VERSION_KEY: &str = "version";

const UNION_ALIAS: &str = "merged collection";

/// A mapped class: its name, the alias it was referenced by, and whether
/// localisation is suppressed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityClassSpec {
    class: String,
    alias: Option<String>,
    unlocalised: bool,
}

impl EntityClassSpec {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            alias: None,
            unlocalised: false,
        }
    }

    /// An alias equal to the class name is not recorded.
    pub fn aliased(class: &str, alias: &str) -> Self {
        Self {
            class: class.to_string(),
            alias: (alias != class).then(|| alias.to_string()),
            unlocalised: false,
        }
    }

    pub fn unlocalised(mut self) -> Self {
        self.unlocalised = true;
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// The alias, or the class name after its last `.`.
    pub fn alias(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.class.rsplit('.').next().unwrap_or(&self.class),
        }
    }

    pub fn is_unlocalised(&self) -> bool {
        self.unlocalised
    }

    /// The metadata provider's discriminator value, unless it is missing or
    /// just the class name, in which case the alias stands in.
    pub fn external_discriminator_value(&self, reflector: &dyn Reflector) -> String {
        match reflector.discriminator_value(&self.class) {
            Some(value) if value != self.class => value,
            _ => self.alias().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Own(usize),
    Merged(usize),
}

/// The compiled mapping for one base class and its declared subclasses.
///
/// Built once, by the parser or through [`EntityMapper::builder`], and
/// immutable afterwards apart from [`merge`](EntityMapper::merge).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapper {
    /// `None` for the union mapper of a merged collection.
    base: Option<EntityClassSpec>,
    subclasses: IndexMap<String, EntityClassSpec>,
    fields: Vec<FieldMap>,
    /// Field maps imported by `merge`; visible to lookups only.
    merged: Vec<FieldMap>,
    discriminator_specified: bool,
    by_internal: IndexMap<String, Slot>,
    by_external: IndexMap<String, Slot>,
    field_types: HashMap<String, FieldType>,
    external_to_internal: HashMap<String, String>,
}

/// Collects the parts of an [`EntityMapper`] before validation.
#[derive(Debug, Clone)]
pub struct MapperBuilder {
    base: Option<EntityClassSpec>,
    subclasses: Vec<EntityClassSpec>,
    discriminator: Option<String>,
    fields: Vec<FieldMap>,
}

impl MapperBuilder {
    pub fn subclass(mut self, spec: EntityClassSpec) -> Self {
        self.subclasses.push(spec);
        self
    }

    /// External name of the discriminator field.
    pub fn discriminate_by(mut self, external: &str) -> Self {
        self.discriminator = Some(external.to_string());
        self
    }

    pub fn map(mut self, field_map: impl Into<FieldMap>) -> Self {
        self.fields.push(field_map.into());
        self
    }

    pub fn map_all(mut self, field_maps: impl IntoIterator<Item = FieldMap>) -> Self {
        self.fields.extend(field_maps);
        self
    }

    /// Validates and indexes the mapping.
    ///
    /// In order: the implicit version field is appended for versioned
    /// classes, a discriminator is appended when subclasses were declared,
    /// field metadata is resolved, subclass components and flattened
    /// collisions are checked, indexes are built, and the single-identifier
    /// rule is enforced.
    pub fn build(self, reflector: &dyn Reflector) -> Result<EntityMapper, DefinitionError> {
        let MapperBuilder {
            base,
            subclasses: declared,
            discriminator,
            mut fields,
        } = self;

        let mut subclasses = IndexMap::new();
        for spec in declared {
            if let Some(base) = &base {
                if !reflector.is_subclass_of(spec.class_name(), base.class_name()) {
                    return Err(DefinitionError::NotASubclass {
                        subclass: spec.class_name().to_string(),
                        class: base.class_name().to_string(),
                    });
                }
            }
            subclasses.insert(spec.external_discriminator_value(reflector), spec);
        }

        if let Some(base) = &base {
            if reflector.is_versioned(base.class_name()) && !fields.iter().any(|f| f.external() == VERSION_KEY) {
                fields.push(SimpleFieldMap::new(FieldHeader::new(VERSION_KEY)).into());
            }
        }

        if !subclasses.is_empty() {
            let stored_name = base
                .as_ref()
                .and_then(|b| reflector.discriminator_name(b.class_name()));
            let stored_property = match (&base, &stored_name) {
                (Some(b), Some(name)) => reflector.field(b.class_name(), name).is_some(),
                _ => false,
            };
            let external = discriminator.as_deref().or(stored_name.as_deref());
            fields.push(FieldMap::Discriminator(DiscriminatorFieldMap::new(
                stored_name.as_deref(),
                external,
                stored_property,
            )));
        }

        let mut mapper = EntityMapper {
            discriminator_specified: discriminator.is_some() && !subclasses.is_empty(),
            base,
            subclasses,
            fields,
            merged: Vec::new(),
            by_internal: IndexMap::new(),
            by_external: IndexMap::new(),
            field_types: HashMap::new(),
            external_to_internal: HashMap::new(),
        };

        mapper.resolve_metadata(reflector)?;
        mapper.check_masked_defaults()?;
        mapper.check_subclass_maps()?;
        mapper.check_flattened_maps()?;
        mapper.reindex();
        mapper.check_unique_identifier()?;

        debug!(
            "built mapper for {} with {} field maps",
            mapper.base_class_alias(),
            mapper.fields.len()
        );
        Ok(mapper)
    }
}

impl EntityMapper {
    pub fn builder(base: EntityClassSpec) -> MapperBuilder {
        MapperBuilder {
            base: Some(base),
            subclasses: Vec::new(),
            discriminator: None,
            fields: Vec::new(),
        }
    }

    /// A builder for the union mapper of a merged collection, whose
    /// "subclasses" are the variant classes.
    pub fn union_builder() -> MapperBuilder {
        MapperBuilder {
            base: None,
            subclasses: Vec::new(),
            discriminator: None,
            fields: Vec::new(),
        }
    }

    fn resolve_metadata(&mut self, reflector: &dyn Reflector) -> Result<(), DefinitionError> {
        let Some(base) = self.base.clone() else {
            return Ok(());
        };
        let class = base.class_name();
        for fm in &mut self.fields {
            match fm {
                FieldMap::Simple(s) if !s.header.is_attribute => match reflector.field(class, &s.header.internal) {
                    Some(meta) => s.value_type = meta.value_type.or(s.value_type),
                    None if s.header.access != Access::ReadOnly => {
                        return Err(DefinitionError::UnknownProperty {
                            class: class.to_string(),
                            field: s.header.internal.clone(),
                        });
                    }
                    None => {}
                },
                FieldMap::Component(c) if !c.header.is_attribute && !c.for_subclass => {
                    if let Some(meta) = reflector.field(class, &c.header.internal) {
                        if meta.kind == FieldKind::OneToMany {
                            c.mapper.mark_identifier_exclusive();
                        }
                    }
                }
                FieldMap::Collection(c) if !c.header.is_attribute => resolve_collection(c, class, reflector),
                FieldMap::MergedCollection(m) if !m.collection.header.is_attribute => {
                    resolve_collection(&mut m.collection, class, reflector)
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn mark_identifier_exclusive(&mut self) {
        for fm in &mut self.fields {
            if let FieldMap::Simple(s) = fm {
                if s.identifier {
                    s.header.exclusive = true;
                }
            }
        }
    }

    fn check_masked_defaults(&self) -> Result<(), DefinitionError> {
        for fm in &self.fields {
            if let FieldMap::Simple(s) = fm {
                if s.header.access == Access::Sensitive
                    && s.default.as_ref().and_then(Value::as_str) == Some(SENSITIVE_MASK)
                {
                    return Err(DefinitionError::MaskedDefault {
                        field: s.header.external.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_subclass_maps(&self) -> Result<(), DefinitionError> {
        for fm in &self.fields {
            if let FieldMap::Component(c) = fm {
                if !c.for_subclass {
                    continue;
                }
                let subclass = c.mapper.base_class().unwrap_or_default();
                if !self.subclasses.values().any(|s| s.class_name() == subclass) {
                    return Err(DefinitionError::UndeclaredSubclass {
                        field: c.header.external.clone(),
                        subclass: subclass.to_string(),
                        class: self.base_class().unwrap_or(UNION_ALIAS).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_flattened_maps(&self) -> Result<(), DefinitionError> {
        let mut seen: HashSet<String> = self.fields.iter().map(|f| f.external().to_string()).collect();
        Self::check_flattened_fields(&mut seen, self)
    }

    fn check_flattened_fields(seen: &mut HashSet<String>, mapper: &EntityMapper) -> Result<(), DefinitionError> {
        for fm in &mapper.fields {
            let FieldMap::Component(c) = fm else { continue };
            if !c.flattened {
                continue;
            }
            for nested in &c.mapper.fields {
                if !seen.insert(nested.external().to_string()) {
                    return Err(DefinitionError::FlattenedCollision {
                        class: c.mapper.base_class().unwrap_or(UNION_ALIAS).to_string(),
                        field: nested.external().to_string(),
                    });
                }
            }
            Self::check_flattened_fields(seen, &c.mapper)?;
        }
        Ok(())
    }

    fn check_unique_identifier(&self) -> Result<(), DefinitionError> {
        let identifiers = self
            .fields
            .iter()
            .filter(|f| f.as_simple().is_some_and(|s| s.identifier))
            .count();
        if identifiers > 1 {
            return Err(DefinitionError::DuplicateIdentifier {
                class: self.base_class_alias().to_string(),
            });
        }
        Ok(())
    }

    fn reindex(&mut self) {
        self.by_internal.clear();
        self.by_external.clear();
        for (i, fm) in self.fields.iter().enumerate() {
            self.by_internal.insert(fm.internal().to_string(), Slot::Own(i));
            self.by_external.insert(fm.external().to_string(), Slot::Own(i));
        }
        for (i, fm) in self.merged.iter().enumerate() {
            self.by_internal.insert(fm.internal().to_string(), Slot::Merged(i));
            self.by_external.insert(fm.external().to_string(), Slot::Merged(i));
        }

        let mut types = HashMap::new();
        collect_field_types(&self.fields, self.is_union(), "", &mut types);
        collect_field_types(&self.merged, false, "", &mut types);
        self.field_types = types;

        let mut paths = HashMap::new();
        collect_paths(&self.fields, "", "", &mut paths);
        collect_paths(&self.merged, "", "", &mut paths);
        self.external_to_internal = paths;
    }

    /// Renames the external name of one of this mapper's own fields.
    pub(crate) fn rename_external(&mut self, from: &str, to: &str) {
        let mut renamed = false;
        for fm in &mut self.fields {
            if fm.external() == from {
                fm.header_mut().external = to.to_string();
                renamed = true;
            }
        }
        if renamed {
            self.reindex();
        }
    }

    /// Appends the field maps and index entries of `other`. Existing entries
    /// are never removed.
    pub fn merge(&mut self, other: EntityMapper) {
        let EntityMapper { fields, merged, .. } = other;
        self.merged.extend(fields);
        self.merged.extend(merged);
        self.reindex();
    }

    fn slot(&self, slot: Slot) -> &FieldMap {
        match slot {
            Slot::Own(i) => &self.fields[i],
            Slot::Merged(i) => &self.merged[i],
        }
    }

    fn find_path(&self, path: &str, internal: bool) -> Option<&FieldMap> {
        let index = if internal { &self.by_internal } else { &self.by_external };
        if let Some(slot) = index.get(path) {
            return Some(self.slot(*slot));
        }
        for (at, _) in path.match_indices('.') {
            let (head, tail) = (&path[..at], &path[at + 1..]);
            let Some(slot) = index.get(head) else { continue };
            if let Some(found) = self.slot(*slot).mapper().and_then(|m| m.find_path(tail, internal)) {
                return Some(found);
            }
        }
        None
    }

    pub fn base_class(&self) -> Option<&str> {
        self.base.as_ref().map(EntityClassSpec::class_name)
    }

    pub fn base_class_spec(&self) -> Option<&EntityClassSpec> {
        self.base.as_ref()
    }

    pub fn base_class_alias(&self) -> &str {
        self.base.as_ref().map_or(UNION_ALIAS, EntityClassSpec::alias)
    }

    pub fn is_union(&self) -> bool {
        self.base.is_none()
    }

    pub fn is_unlocalised(&self) -> bool {
        self.base.as_ref().is_some_and(EntityClassSpec::is_unlocalised)
    }

    /// Field maps in declaration order, followed by the implicit version and
    /// discriminator fields.
    pub fn field_maps(&self) -> &[FieldMap] {
        &self.fields
    }

    pub fn merged_field_maps(&self) -> &[FieldMap] {
        &self.merged
    }

    /// Looks up by internal field path, e.g. `address.street`.
    pub fn find_by_internal_name(&self, path: &str) -> Option<&FieldMap> {
        self.find_path(path, true)
    }

    /// Looks up by external field path, e.g. `address.street`.
    pub fn find_by_external_name(&self, path: &str) -> Option<&FieldMap> {
        self.find_path(path, false)
    }

    pub fn fields_of_kind(&self, kind: FieldMapKind) -> Vec<&FieldMap> {
        self.fields
            .iter()
            .chain(self.merged.iter())
            .filter(|f| f.kind() == kind)
            .collect()
    }

    pub fn find_internal_field_path(&self, external_path: &str) -> Option<&str> {
        self.external_to_internal.get(external_path).map(String::as_str)
    }

    pub fn discriminator(&self) -> Option<&DiscriminatorFieldMap> {
        self.fields.iter().find_map(|f| match f {
            FieldMap::Discriminator(d) => Some(d),
            _ => None,
        })
    }

    /// Whether the discriminator's external name was given explicitly.
    pub fn is_discriminator_specified(&self) -> bool {
        self.discriminator_specified
    }

    pub fn subclasses(&self) -> impl Iterator<Item = (&str, &EntityClassSpec)> {
        self.subclasses.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn discriminated_subclass(&self, external_value: &str) -> Option<&EntityClassSpec> {
        self.subclasses.get(external_value)
    }

    pub fn subclass_discriminator_value(&self, class: &str) -> Option<&str> {
        self.subclasses
            .iter()
            .find(|(_, spec)| spec.class_name() == class)
            .map(|(value, _)| value.as_str())
    }

    pub fn identifier_field(&self) -> Option<&SimpleFieldMap> {
        self.fields.iter().find_map(|f| f.as_simple().filter(|s| s.identifier))
    }

    pub fn entity_name_field(&self) -> Option<&SimpleFieldMap> {
        self.fields.iter().find_map(|f| f.as_simple().filter(|s| s.entity_name))
    }

    pub fn external_identifier_name(&self) -> Option<&str> {
        self.identifier_field().map(|s| s.header.external.as_str())
    }

    pub fn internal_identifier_name(&self) -> Option<&str> {
        self.identifier_field().map(|s| s.header.internal.as_str())
    }

    pub fn external_identifier_type(&self) -> Option<FieldType> {
        self.external_identifier_name()
            .and_then(|name| self.field_types.get(name).copied())
    }

    pub fn internal_identifier_type(&self) -> Option<FieldType> {
        self.identifier_field().and_then(|s| s.value_type)
    }

    /// External path of the entity-name field, searching components
    /// depth-first when this mapper declares none.
    pub fn external_entity_name_field(&self) -> Option<String> {
        if let Some(field) = self.entity_name_field() {
            return Some(field.header.external.clone());
        }
        self.fields.iter().find_map(|f| match f {
            FieldMap::Component(c) => c
                .mapper
                .external_entity_name_field()
                .map(|nested| format!("{}.{}", c.header.external, nested)),
            _ => None,
        })
    }

    /// Follows `path` through component and collection fields to the mapper
    /// of the addressed sub-resource. An empty path addresses `self`.
    pub fn mapper_for_sub_resource(&self, path: &str) -> Result<&EntityMapper, LookupError> {
        if path.trim().is_empty() {
            return Ok(self);
        }
        let (name, rest) = path.split_once('.').unwrap_or((path, ""));
        let field_map = self.top_level(name)?;
        field_map
            .mapper()
            .ok_or_else(|| self.not_an_entity_field(name))?
            .mapper_for_sub_resource(rest)
    }

    /// The field map addressed by `path`.
    pub fn field_map_for_sub_resource(&self, path: &str) -> Result<&FieldMap, LookupError> {
        if path.trim().is_empty() {
            return Err(LookupError::EmptyPath);
        }
        let (name, rest) = path.split_once('.').unwrap_or((path, ""));
        let field_map = self.top_level(name)?;
        if rest.trim().is_empty() {
            return Ok(field_map);
        }
        field_map
            .mapper()
            .ok_or_else(|| self.not_an_entity_field(name))?
            .field_map_for_sub_resource(rest)
    }

    fn top_level(&self, name: &str) -> Result<&FieldMap, LookupError> {
        self.by_external
            .get(name)
            .map(|slot| self.slot(*slot))
            .ok_or_else(|| LookupError::UnknownField {
                field: name.to_string(),
                class: self.base_class_alias().to_string(),
            })
    }

    fn not_an_entity_field(&self, name: &str) -> LookupError {
        LookupError::NotAnEntityField {
            field: name.to_string(),
            class: self.base_class_alias().to_string(),
        }
    }

    pub fn resolve_identifier_for_document<'d>(&self, doc: &'d Document) -> Option<&'d Value> {
        self.external_identifier_name().and_then(|name| doc.get(name))
    }

    /// The identifier property of `entity`, or null when no identifier is
    /// mapped.
    pub fn resolve_identifier_for_entity(&self, entity: &EntityRef) -> Result<Property, ConversionError> {
        match self.internal_identifier_name() {
            Some(name) => entity.borrow().property(name),
            None => Ok(Property::Null),
        }
    }

    /// Like [`resolve_identifier_for_entity`](Self::resolve_identifier_for_entity)
    /// with the mapper of the sub-resource at `path`.
    pub fn resolve_identifier_for_entity_data(&self, data: &EntityRef, path: &str) -> Result<Property, MapperError> {
        Ok(self.mapper_for_sub_resource(path)?.resolve_identifier_for_entity(data)?)
    }

    pub fn resolve_identifier_for_entity_as_string(&self, entity: &EntityRef) -> Result<Option<String>, ConversionError> {
        let identifier = self.resolve_identifier_for_entity(entity)?;
        identifier_string(identifier, self.external_identifier_name().unwrap_or_default())
    }

    pub fn resolve_identifier_for_entity_data_as_string(
        &self,
        data: &EntityRef,
        path: &str,
    ) -> Result<Option<String>, MapperError> {
        let mapper = self.mapper_for_sub_resource(path)?;
        Ok(mapper.resolve_identifier_for_entity_as_string(data)?)
    }
}

fn resolve_collection(collection: &mut CollectionMap, class: &str, reflector: &dyn Reflector) {
    let Some(meta) = reflector.field(class, &collection.header.internal) else {
        return;
    };
    collection.one_to_many = meta.kind == FieldKind::OneToMany;
    collection.orphan_delete = meta.orphan_delete;
    collection.kind = meta.collection_kind.unwrap_or_default();
    if collection.one_to_many {
        if let CollectionElement::Entity(nested) = &mut collection.element {
            nested.mark_identifier_exclusive();
        }
    }
}

fn identifier_string(identifier: Property, field: &str) -> Result<Option<String>, ConversionError> {
    match identifier.to_value() {
        Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(value.to_string())),
        None => Err(ConversionError::UnsupportedValue {
            field: field.to_string(),
            target: "identifier".to_string(),
        }),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Indexes declared scalar types by external path. Flattened components
/// share their parent's prefix; inside a union the variant collection's own
/// segment is skipped, so one path reaches a field on any variant.
fn collect_field_types(fields: &[FieldMap], in_union: bool, prefix: &str, out: &mut HashMap<String, FieldType>) {
    for fm in fields {
        let path = join_path(prefix, fm.external());
        match fm {
            FieldMap::Discriminator(_) => {
                out.insert(path, FieldType::String);
            }
            FieldMap::Simple(s) => {
                if s.header.access != Access::ReadOnly {
                    if let Some(t) = s.value_type {
                        out.insert(path, t);
                    }
                }
            }
            FieldMap::Component(c) => {
                let nested_prefix = if c.flattened { prefix.to_string() } else { path };
                collect_field_types(&c.mapper.fields, c.mapper.is_union(), &nested_prefix, out);
            }
            FieldMap::Collection(_) | FieldMap::MergedCollection(_) => {
                let Some(collection) = fm.as_collection() else { continue };
                match &collection.element {
                    CollectionElement::Entity(nested) if in_union => {
                        collect_field_types(&nested.fields, nested.is_union(), prefix, out);
                    }
                    CollectionElement::Primitive(t) => {
                        out.insert(path, *t);
                    }
                    CollectionElement::Entity(nested) => {
                        collect_field_types(&nested.fields, nested.is_union(), &path, out);
                    }
                }
            }
        }
    }
}

fn collect_paths(fields: &[FieldMap], external: &str, internal: &str, out: &mut HashMap<String, String>) {
    for fm in fields {
        let ext = join_path(external, fm.external());
        let int = join_path(internal, fm.internal());
        if let Some(nested) = fm.mapper() {
            collect_paths(&nested.fields, &ext, &int, out);
            collect_paths(&nested.merged, &ext, &int, out);
        }
        out.insert(ext, int);
    }
}

impl FieldTyper for EntityMapper {
    fn field_type(&self, path: &str) -> Result<Option<FieldType>, LookupError> {
        if let Some(fm) = self.find_by_external_name(path) {
            if fm.access() == Access::ReadOnly {
                return Ok(None);
            }
            if fm.as_collection().is_some_and(|c| c.primitive_type().is_none()) {
                return Ok(None);
            }
        }
        self.field_types
            .get(path)
            .copied()
            .map(Some)
            .ok_or_else(|| LookupError::Untyped { path: path.to_string() })
    }

    fn has_field_type(&self, path: &str) -> bool {
        if self
            .find_by_external_name(path)
            .is_some_and(|fm| fm.access() == Access::ReadOnly)
        {
            return false;
        }
        self.field_types.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_map::ComponentMap;
    use crate::object::Entity;
    use crate::reflect::{FieldMetaData, StaticReflector};

    fn reflector() -> StaticReflector {
        StaticReflector::new()
            .class("test.Member")
            .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
            .field(FieldMetaData::simple("name", FieldType::String))
            .field(FieldMetaData::simple("password", FieldType::String))
            .field(FieldMetaData::component("address", "test.Address"))
            .field(FieldMetaData::one_to_many("phones", "test.Phone").orphan_delete())
            .versioned()
            .done()
            .class("test.Address")
            .field(FieldMetaData::simple("street", FieldType::String))
            .field(FieldMetaData::simple("postcode", FieldType::String))
            .done()
            .class("test.Phone")
            .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
            .field(FieldMetaData::simple("number", FieldType::String))
            .done()
    }

    fn simple(name: &str) -> SimpleFieldMap {
        SimpleFieldMap::new(FieldHeader::new(name))
    }

    fn member_mapper(r: &StaticReflector) -> EntityMapper {
        let address = EntityMapper::builder(EntityClassSpec::new("test.Address"))
            .map(simple("street"))
            .map(SimpleFieldMap::new(FieldHeader::renamed("postcode", "zip")))
            .build(r)
            .unwrap();
        let phones = EntityMapper::builder(EntityClassSpec::new("test.Phone"))
            .map(simple("id").identifier())
            .map(simple("number"))
            .build(r)
            .unwrap();
        EntityMapper::builder(EntityClassSpec::new("test.Member"))
            .map(simple("id").identifier())
            .map(SimpleFieldMap::new(FieldHeader::renamed("name", "fullName")))
            .map(ComponentMap::new(FieldHeader::new("address"), address))
            .map(CollectionMap::entities(FieldHeader::new("phones"), phones))
            .build(r)
            .unwrap()
    }

    #[test]
    fn test_implicit_version_and_indexes() {
        let r = reflector();
        let m = member_mapper(&r);
        assert!(m.find_by_external_name(VERSION_KEY).is_some());
        assert_eq!(m.find_internal_field_path("address.zip"), Some("address.postcode"));
        assert_eq!(m.find_internal_field_path("fullName"), Some("name"));
        assert_eq!(m.find_by_internal_name("address.postcode").map(|f| f.external()), Some("zip"));
        assert_eq!(m.field_type("address.zip").unwrap(), Some(FieldType::String));
        assert_eq!(m.field_type("phones.number").unwrap(), Some(FieldType::String));
        assert_eq!(m.field_type("phones").unwrap(), None);
        assert!(m.field_type("nothing").is_err());
        assert_eq!(m.external_identifier_type(), Some(FieldType::Integer));
    }

    #[test]
    fn test_collection_metadata_and_implicit_exclusive() {
        let r = reflector();
        let m = member_mapper(&r);
        let phones = m.find_by_external_name("phones").and_then(FieldMap::as_collection).unwrap();
        assert!(phones.one_to_many);
        assert!(phones.orphan_delete);
        let id = m.find_by_external_name("phones.id").unwrap();
        assert!(id.is_exclusive());
        assert!(!m.find_by_external_name("id").unwrap().is_exclusive());
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let r = reflector();
        let result = EntityMapper::builder(EntityClassSpec::new("test.Member"))
            .map(simple("id").identifier())
            .map(simple("name").identifier())
            .build(&r);
        assert!(matches!(result, Err(DefinitionError::DuplicateIdentifier { .. })));
    }

    #[test]
    fn test_unknown_property_rejected_unless_readonly() {
        let r = reflector();
        let result = EntityMapper::builder(EntityClassSpec::new("test.Member"))
            .map(simple("nickname"))
            .build(&r);
        assert!(matches!(result, Err(DefinitionError::UnknownProperty { .. })));

        let readonly = EntityMapper::builder(EntityClassSpec::new("test.Member"))
            .map(SimpleFieldMap::new(FieldHeader::new("nickname").access(Access::ReadOnly)))
            .build(&r);
        assert!(readonly.is_ok());
    }

    #[test]
    fn test_masked_default_rejected() {
        let r = reflector();
        let result = EntityMapper::builder(EntityClassSpec::new("test.Member"))
            .map(SimpleFieldMap::new(FieldHeader::new("password").access(Access::Sensitive)).default_value(SENSITIVE_MASK))
            .build(&r);
        assert!(matches!(result, Err(DefinitionError::MaskedDefault { .. })));
    }

    #[test]
    fn test_sub_resource_lookup() {
        let r = reflector();
        let m = member_mapper(&r);
        assert_eq!(m.mapper_for_sub_resource("phones").unwrap().base_class(), Some("test.Phone"));
        assert_eq!(m.mapper_for_sub_resource("").unwrap().base_class(), Some("test.Member"));
        assert_eq!(m.field_map_for_sub_resource("address.zip").unwrap().internal(), "postcode");
        assert!(matches!(m.mapper_for_sub_resource("fullName"), Err(LookupError::NotAnEntityField { .. })));
        assert!(matches!(m.mapper_for_sub_resource("nope"), Err(LookupError::UnknownField { .. })));
        assert!(matches!(m.field_map_for_sub_resource(""), Err(LookupError::EmptyPath)));
    }

    #[test]
    fn test_entity_name_field_found_in_component() {
        let r = reflector();
        let address = EntityMapper::builder(EntityClassSpec::new("test.Address"))
            .map(simple("street").entity_name())
            .build(&r)
            .unwrap();
        let m = EntityMapper::builder(EntityClassSpec::new("test.Member"))
            .map(ComponentMap::new(FieldHeader::renamed("address", "home"), address))
            .build(&r)
            .unwrap();
        assert_eq!(m.external_entity_name_field().as_deref(), Some("home.street"));
    }

    #[test]
    fn test_component_defaults_and_counts() {
        let r = reflector();
        let member = ComponentMap::new(FieldHeader::new("member"), member_mapper(&r));
        // id, fullName, street, zip, version
        assert_eq!(member.field_map_count(false), 5);
        assert!(!member.has_defaults());

        let address = EntityMapper::builder(EntityClassSpec::new("test.Address"))
            .map(simple("street").default_value("Main St"))
            .build(&r)
            .unwrap();
        assert!(ComponentMap::new(FieldHeader::new("address"), address).has_defaults());
    }

    #[test]
    fn test_identifier_resolution() {
        let r = reflector();
        let m = member_mapper(&r);
        let doc = Document::new().with("id", 7).with("fullName", "Ada");
        assert_eq!(m.resolve_identifier_for_document(&doc), Some(&Value::Int(7)));

        let member = r.instantiate("test.Member").unwrap();
        member.borrow_mut().set_property("id", Property::Int(7)).unwrap();
        assert_eq!(m.resolve_identifier_for_entity(&member).unwrap(), Property::Int(7));
        assert_eq!(m.resolve_identifier_for_entity_as_string(&member).unwrap().as_deref(), Some("7"));

        let address = r.instantiate("test.Address").unwrap();
        let nested = m.mapper_for_sub_resource("address").unwrap();
        assert_eq!(nested.resolve_identifier_for_entity(&address).unwrap(), Property::Null);
    }

    #[test]
    fn test_unlocalised_spec() {
        assert!(EntityClassSpec::new("test.Member").unlocalised().is_unlocalised());
        assert!(!EntityClassSpec::new("test.Member").is_unlocalised());
    }

    #[test]
    fn test_alias_defaults_to_simple_name() {
        assert_eq!(EntityClassSpec::new("a.b.Member").alias(), "Member");
        assert_eq!(EntityClassSpec::aliased("a.b.Member", "Person").alias(), "Person");
        assert_eq!(EntityClassSpec::aliased("a.b.Member", "a.b.Member").alias(), "Member");
    }
}
