use crate::error::{MapperError, SyntaxError};
use crate::mapper::EntityMapper;
use crate::parser::{Parser, DEFAULT_REFLECTION_DEPTH};
use crate::reflect::Reflector;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_ORIGIN: &str = "<mapping>";

/// Settings for one compilation. Serializable so hosts can keep it in
/// their own configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Name of the mapping's origin, shown in diagnostics.
    pub origin: Option<String>,
    /// How deep `<>` follows component and collection metadata.
    pub reflection_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            origin: None,
            reflection_depth: DEFAULT_REFLECTION_DEPTH,
        }
    }
}

/// Compiles an entity map specification into an [`EntityMapper`].
///
/// # Errors
///
/// Returns a `MapperError::Syntax` for malformed input or unknown classes, and
/// a `MapperError::Definition` when a parsed mapping violates the model's
/// invariants.
pub fn compile(source: &str, origin: Option<&str>, reflector: &dyn Reflector) -> Result<EntityMapper, MapperError> {
    let options = CompileOptions {
        origin: origin.map(str::to_string),
        ..CompileOptions::default()
    };
    compile_with(source, &options, reflector)
}

/// Like [`compile`], with explicit options.
///
/// # Errors
///
/// See [`compile`].
pub fn compile_with(
    source: &str,
    options: &CompileOptions,
    reflector: &dyn Reflector,
) -> Result<EntityMapper, MapperError> {
    let origin = options.origin.as_deref().unwrap_or(DEFAULT_ORIGIN);
    debug!("compiling entity map from {}", origin);

    let mut parser =
        Parser::new_with_name(source, origin.to_string(), reflector).with_reflection_depth(options.reflection_depth);
    let mapper = parser.parse_mapping()?;

    debug!(
        "compiled {} from {} with {} field maps",
        mapper.base_class_alias(),
        origin,
        mapper.field_maps().len()
    );
    Ok(mapper)
}

/// Reads and compiles a mapping file, using its path as the origin.
///
/// # Errors
///
/// Returns `SyntaxError::Io` if the file cannot be read, otherwise see [`compile`].
pub fn compile_file(path: impl AsRef<Path>, reflector: &dyn Reflector) -> Result<EntityMapper, MapperError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| SyntaxError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let options = CompileOptions {
        origin: Some(path.display().to_string()),
        ..CompileOptions::default()
    };
    compile_with(&source, &options, reflector)
}
