// Shared domain for the integration tests
#![allow(dead_code)]

use erm_core::object::{Collection, CollectionRef, EntityRef, Property, Record};
use erm_core::reflect::{CollectionKind, FieldMetaData, Reflector, StaticReflector};
use erm_core::typer::FieldType;
use erm_core::{compile, EntityMapper};
use miette::Report;

pub fn reflector() -> StaticReflector {
    StaticReflector::new()
        .class("test.Member")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("name", FieldType::String))
        .field(FieldMetaData::simple("password", FieldType::String))
        .field(FieldMetaData::simple("balance", FieldType::Decimal))
        .field(FieldMetaData::simple("active", FieldType::Boolean))
        .field(FieldMetaData::simple("joined", FieldType::Date))
        .field(FieldMetaData::component("address", "test.Address"))
        .field(FieldMetaData::one_to_many("phones", "test.Phone").orphan_delete())
        .field(FieldMetaData::values("tags", FieldType::String))
        .field(FieldMetaData::simple("employerId", FieldType::Integer))
        .field(FieldMetaData::many_to_one("employer", "test.Company"))
        .field(FieldMetaData::component("profile", "test.Profile"))
        .versioned()
        .done()
        .class("test.Address")
        .field(FieldMetaData::simple("name", FieldType::String))
        .field(FieldMetaData::simple("street", FieldType::String))
        .field(FieldMetaData::simple("city", FieldType::String))
        .done()
        .class("test.Phone")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("number", FieldType::String))
        .field(FieldMetaData::simple("memberId", FieldType::Integer))
        .done()
        .class("test.Company")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("name", FieldType::String))
        .done()
        .class("test.Profile")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("memberId", FieldType::Integer))
        .field(FieldMetaData::simple("bio", FieldType::String))
        .done()
        .class("test.Shape")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::simple("colour", FieldType::String))
        .done()
        .class("test.Circle")
        .extends("test.Shape")
        .field(FieldMetaData::simple("radius", FieldType::Decimal))
        .done()
        .class("test.Square")
        .extends("test.Shape")
        .field(FieldMetaData::simple("side", FieldType::Integer))
        .done()
        .class("test.Order")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::collection("lines", "test.Book"))
        .done()
        .class("test.Book")
        .field(FieldMetaData::simple("title", FieldType::String))
        .done()
        .class("test.Catalogue")
        .field(FieldMetaData::simple("id", FieldType::Integer).primary_key())
        .field(FieldMetaData::values("labels", FieldType::String).kind_of_collection(CollectionKind::SortedSet))
        .field(FieldMetaData::values("codes", FieldType::Integer).kind_of_collection(CollectionKind::Set))
        .field(FieldMetaData::collection("books", "test.Book").kind_of_collection(CollectionKind::Set))
        .done()
        .class("test.Film")
        .field(FieldMetaData::simple("title", FieldType::String))
        .field(FieldMetaData::simple("minutes", FieldType::Integer))
        .done()
}

/// Compiles `source`, panicking with the rendered diagnostic on failure.
pub fn compile_ok(source: &str, reflector: &StaticReflector) -> EntityMapper {
    match compile(source, Some("test.erm"), reflector) {
        Ok(mapper) => mapper,
        Err(err) => panic!("{:?}", Report::from(err)),
    }
}

/// A record of `class` carrying every field the reflector declares for it.
pub fn record(reflector: &StaticReflector, class: &str) -> Record {
    let names: Vec<String> = reflector
        .fields_of(class)
        .into_iter()
        .map(|f| f.internal_name)
        .collect();
    Record::new(class, names)
}

pub fn list(items: impl IntoIterator<Item = Property>) -> CollectionRef {
    let collection = Collection::shared(CollectionKind::List);
    for item in items {
        collection.borrow_mut().add(item);
    }
    collection
}

pub fn prop(entity: &EntityRef, name: &str) -> Property {
    entity
        .borrow()
        .property(name)
        .unwrap_or_else(|e| panic!("no property {}: {}", name, e))
}
