// API error path tests
// These test error handling, conversions, and diagnostics in the API layer

mod common;

use common::reflector;
use erm_core::error::{MapperError, SyntaxError};
use erm_core::{compile, compile_file, compile_with, CompileOptions};
use miette::{Diagnostic, Report};
use std::io::Write;

#[test]
fn test_api_compile_syntax_error() {
    let result = compile("test.Member { (id)", Some("test.erm"), &reflector());
    assert!(matches!(result, Err(MapperError::Syntax(_))));
}

#[test]
fn test_api_compile_definition_error() {
    let result = compile("test.Member { (id), (name) }", Some("test.erm"), &reflector());
    assert!(matches!(result, Err(MapperError::Definition(_))));
}

#[test]
fn test_api_default_origin() {
    let err = compile("{", None, &reflector()).unwrap_err();
    let report = format!("{:?}", Report::from(err));
    assert!(report.contains("<mapping>"), "report was: {}", report);
}

#[test]
fn test_api_diagnostic_codes() {
    let err = compile("test.Nobody { }", None, &reflector()).unwrap_err();
    assert_eq!(err.code().map(|c| c.to_string()).as_deref(), Some("erm::syntax::unknown_class"));

    let err = compile("test.Member { (id), (name) }", None, &reflector()).unwrap_err();
    assert_eq!(
        err.code().map(|c| c.to_string()).as_deref(),
        Some("erm::definition::duplicate_identifier")
    );
}

#[test]
fn test_api_error_messages() {
    let err = compile("test.Member { name nickname }", None, &reflector()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Expecting comma or close-brace - found 'nickname' before ' }'"
    );

    let err = compile("test.Nobody { }", None, &reflector()).unwrap_err();
    assert_eq!(err.to_string(), "Entity class test.Nobody not found");
}

#[test]
fn test_api_compile_file() {
    let mut file = tempfile::Builder::new().suffix(".erm").tempfile().unwrap();
    writeln!(file, "test.Member {{ (id), name }}").unwrap();
    let mapper = compile_file(file.path(), &reflector()).unwrap();
    assert_eq!(mapper.external_identifier_name(), Some("id"));
}

#[test]
fn test_api_compile_file_reports_path() {
    let mut file = tempfile::Builder::new().suffix(".erm").tempfile().unwrap();
    writeln!(file, "test.Member {{ (id),").unwrap();
    let err = compile_file(file.path(), &reflector()).unwrap_err();
    let report = format!("{:?}", Report::from(err));
    let name = file.path().file_name().unwrap().to_string_lossy().to_string();
    assert!(report.contains(&name), "report was: {}", report);
}

#[test]
fn test_api_compile_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.erm");
    let err = compile_file(&path, &reflector()).unwrap_err();
    match err {
        MapperError::Syntax(SyntaxError::Io { path: reported, source }) => {
            assert!(reported.ends_with("missing.erm"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected an io error, got {:?}", other),
    }
}

#[test]
fn test_api_options_from_json() {
    let options: CompileOptions = serde_json::from_str(r#"{"origin": "inline.erm", "reflection_depth": 1}"#).unwrap();
    let mapper = compile_with("<test.Member>", &options, &reflector()).unwrap();
    let employer = mapper.mapper_for_sub_resource("employer").unwrap();
    assert!(employer.field_maps().is_empty());

    let err = compile_with("<test.Nobody>", &options, &reflector()).unwrap_err();
    assert!(format!("{:?}", Report::from(err)).contains("inline.erm"));
}

#[test]
fn test_api_empty_source() {
    let err = compile("", None, &reflector()).unwrap_err();
    assert!(matches!(
        err,
        MapperError::Syntax(SyntaxError::UnexpectedToken { ref found, .. }) if found.is_empty()
    ));
}
