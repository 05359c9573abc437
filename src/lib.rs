pub mod association;
pub mod document;
pub mod error;
pub mod field_map;
pub mod lexer;
pub mod mapper;
pub mod marshal;
pub mod object;
pub mod parser;
pub mod reflect;
pub mod serialization;
pub mod typer;
pub mod utils;
pub mod api;

pub use api::{compile, compile_file, compile_with, CompileOptions};
pub use document::{Document, Value};
pub use error::MapperError;
pub use mapper::EntityMapper;
pub use marshal::Marshaller;
