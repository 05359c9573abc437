use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Every failure the compiler and the marshalling engine can report.
#[derive(Error, Debug, Diagnostic)]
pub enum MapperError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),
}

/// Structural violations found while tokenizing or parsing a mapping.
/// Compilation stops at the first one.
#[derive(Error, Debug, Diagnostic)]
pub enum SyntaxError {
    #[error("Unrecognised token at '{excerpt}'")]
    #[diagnostic(
        code(erm::syntax::unrecognised_token),
        help("Field names are identifiers; literals are quoted strings, integers, decimals, true or false.")
    )]
    UnrecognisedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("no token starts here")]
        span: SourceSpan,
        excerpt: String,
    },

    #[error("Expecting {expected} - found '{found}' before '{excerpt}'")]
    #[diagnostic(code(erm::syntax::unexpected_token))]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("expected {expected}")]
        span: SourceSpan,
        expected: String,
        found: String,
        excerpt: String,
    },

    #[error("Entity class {class} not found")]
    #[diagnostic(
        code(erm::syntax::unknown_class),
        help("Declare the class with the metadata provider, or introduce it with an `alias` declaration.")
    )]
    UnknownClass {
        #[source_code]
        src: NamedSource<String>,
        #[label("unknown class")]
        span: SourceSpan,
        class: String,
    },

    #[error("Nested attribute fields not allowed at '{excerpt}'")]
    #[diagnostic(
        code(erm::syntax::nested_attribute),
        help("Fields inside an attribute's mapping already belong to its plugin.")
    )]
    NestedAttribute {
        #[source_code]
        src: NamedSource<String>,
        #[label("attribute declared inside another attribute")]
        span: SourceSpan,
        excerpt: String,
    },

    #[error("Unterminated block comment")]
    #[diagnostic(code(erm::syntax::unterminated_comment), help("Close the comment with `*/`."))]
    UnterminatedComment {
        #[source_code]
        src: NamedSource<String>,
        #[label("comment starts here")]
        span: SourceSpan,
    },

    #[error("Invalid literal '{literal}'")]
    #[diagnostic(code(erm::syntax::invalid_literal))]
    InvalidLiteral {
        #[source_code]
        src: NamedSource<String>,
        #[label("{reason}")]
        span: SourceSpan,
        literal: String,
        reason: String,
    },

    #[error("Could not read mapping file {path}")]
    #[diagnostic(code(erm::syntax::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Violations of the mapping model's invariants, detected after parsing while
/// an entity mapper is assembled.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("More than one identifier was found in the mapping for {class}.")]
    #[diagnostic(code(erm::definition::duplicate_identifier))]
    DuplicateIdentifier { class: String },

    #[error("Flattened component mapping {class} is clashing with existing fields in the parent mapping for field {field}")]
    #[diagnostic(
        code(erm::definition::flattened_collision),
        help("Rename the field with `as` so the flattened keys stay unique.")
    )]
    FlattenedCollision { class: String, field: String },

    #[error("Subclass mapping for '{field}' specifies subclass '{subclass}' which is not declared as a subclass for {class}.")]
    #[diagnostic(code(erm::definition::undeclared_subclass))]
    UndeclaredSubclass {
        field: String,
        subclass: String,
        class: String,
    },

    #[error("{subclass} is not a subclass of {class}")]
    #[diagnostic(code(erm::definition::not_a_subclass))]
    NotASubclass { subclass: String, class: String },

    #[error("Field '{field}' of {class} not found.")]
    #[diagnostic(code(erm::definition::unknown_property))]
    UnknownProperty { class: String, field: String },

    #[error("Sensitive field '{field}' cannot default to the mask value")]
    #[diagnostic(
        code(erm::definition::masked_default),
        help("A written mask means 'unchanged', so such a default could never be stored.")
    )]
    MaskedDefault { field: String },
}

/// Failures while converting between entities and documents. The target of a
/// write may already be partially updated when one of these is returned.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Value for '{field}' should be a document")]
    #[diagnostic(code(erm::conversion::not_a_document))]
    NotADocument { field: String },

    #[error("Value for '{field}' should be a sequence")]
    #[diagnostic(code(erm::conversion::not_a_sequence))]
    NotASequence { field: String },

    #[error("Property '{field}' of {class} is not a collection")]
    #[diagnostic(code(erm::conversion::not_a_collection))]
    NotACollection { class: String, field: String },

    #[error("Property '{field}' of {class} does not hold an entity")]
    #[diagnostic(code(erm::conversion::not_an_entity))]
    NotAnEntity { class: String, field: String },

    #[error("Value of '{field}' cannot be represented as a {target}")]
    #[diagnostic(code(erm::conversion::unsupported_value))]
    UnsupportedValue { field: String, target: String },

    #[error("No subclass of {class} is discriminated by '{value}'")]
    #[diagnostic(code(erm::conversion::unknown_discriminator))]
    UnknownDiscriminator { class: String, value: String },

    #[error("Error creating a new instance of the object class {class}")]
    #[diagnostic(code(erm::conversion::instantiation))]
    Instantiation { class: String },

    #[error("Error accessing property '{property}' of {class}: {message}")]
    #[diagnostic(code(erm::conversion::property))]
    Property {
        class: String,
        property: String,
        message: String,
    },

    #[error("Error converting field '{field}'")]
    #[diagnostic(code(erm::conversion::field))]
    Field {
        field: String,
        #[source]
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    /// Wraps `self` with the external name of the field being converted.
    pub fn in_field(self, field: &str) -> Self {
        ConversionError::Field {
            field: field.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost cause, skipping field context wrappers.
    pub fn root_cause(&self) -> &ConversionError {
        match self {
            ConversionError::Field { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Failures resolving a dotted field path against an entity mapper.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum LookupError {
    #[error("No such field as {field} in map for {class}")]
    #[diagnostic(code(erm::lookup::unknown_field))]
    UnknownField { field: String, class: String },

    #[error("Field {field} in map for {class} is not an entity field map")]
    #[diagnostic(code(erm::lookup::not_an_entity_field))]
    NotAnEntityField { field: String, class: String },

    #[error("Cannot obtain field map for empty path")]
    #[diagnostic(code(erm::lookup::empty_path))]
    EmptyPath,

    #[error("Field '{path}' not found or was not indexed as it does not relate to a simple field map.")]
    #[diagnostic(code(erm::lookup::untyped))]
    Untyped { path: String },
}

/// Failures translating between serialized text and documents.
#[derive(Error, Debug, Diagnostic)]
pub enum CodecError {
    #[error(transparent)]
    #[diagnostic(code(erm::codec::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(erm::codec::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Expected a document at the top level, found {found}")]
    #[diagnostic(code(erm::codec::not_a_document))]
    NotADocument { found: String },

    #[error("Number {number} cannot be represented")]
    #[diagnostic(code(erm::codec::unsupported_number))]
    UnsupportedNumber { number: String },

    #[error("Value '{value}' for '{path}' is not a valid {expected}")]
    #[diagnostic(code(erm::codec::type_mismatch))]
    TypeMismatch {
        path: String,
        expected: String,
        value: String,
    },
}
