use crate::error::LookupError;
use std::collections::HashMap;
use std::fmt::{self, Display};

/// Declared type of a scalar field or of a primitive collection's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
}

impl FieldType {
    /// Resolves the built-in element types a collection may name instead of
    /// an entity class. Matching is case-insensitive.
    pub fn builtin(name: &str) -> Option<FieldType> {
        if name.eq_ignore_ascii_case("String") {
            Some(FieldType::String)
        } else if name.eq_ignore_ascii_case("Integer") {
            Some(FieldType::Integer)
        } else if name.eq_ignore_ascii_case("Date") {
            Some(FieldType::Date)
        } else {
            None
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "String",
            FieldType::Integer => "Integer",
            FieldType::Decimal => "Decimal",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
        };
        write!(f, "{}", name)
    }
}

/// Answers "what is the declared type of external path X". Document codecs
/// use it to decide how to read ambiguous literals.
pub trait FieldTyper {
    /// `Ok(None)` means the path needs no typing (read-only fields, entity
    /// collections).
    fn field_type(&self, path: &str) -> Result<Option<FieldType>, LookupError>;

    fn has_field_type(&self, path: &str) -> bool;
}

/// A field typer over an explicit list of paths, with an optional fallback.
#[derive(Debug, Clone, Default)]
pub struct SimpleFieldTyper {
    types: HashMap<String, FieldType>,
    default: Option<FieldType>,
}

impl SimpleFieldTyper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(default: FieldType) -> Self {
        Self {
            types: HashMap::new(),
            default: Some(default),
        }
    }

    pub fn field(mut self, path: &str, field_type: FieldType) -> Self {
        self.types.insert(path.to_string(), field_type);
        self
    }
}

impl FieldTyper for SimpleFieldTyper {
    fn field_type(&self, path: &str) -> Result<Option<FieldType>, LookupError> {
        match self.types.get(path).copied().or(self.default) {
            Some(t) => Ok(Some(t)),
            None => Err(LookupError::Untyped {
                path: path.to_string(),
            }),
        }
    }

    fn has_field_type(&self, path: &str) -> bool {
        self.default.is_some() || self.types.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_are_case_insensitive() {
        assert_eq!(FieldType::builtin("string"), Some(FieldType::String));
        assert_eq!(FieldType::builtin("INTEGER"), Some(FieldType::Integer));
        assert_eq!(FieldType::builtin("Date"), Some(FieldType::Date));
        assert_eq!(FieldType::builtin("Decimal"), None);
        assert_eq!(FieldType::builtin("com.example.Member"), None);
    }

    #[test]
    fn test_simple_field_typer() {
        let typer = SimpleFieldTyper::new()
            .field("age", FieldType::Integer)
            .field("address.postcode", FieldType::String);
        assert_eq!(typer.field_type("age").unwrap(), Some(FieldType::Integer));
        assert!(typer.has_field_type("address.postcode"));
        assert!(!typer.has_field_type("name"));
        assert!(typer.field_type("name").is_err());

        let fallback = SimpleFieldTyper::with_default(FieldType::String);
        assert_eq!(fallback.field_type("anything").unwrap(), Some(FieldType::String));
    }
}
