//! Test assertions for run results.

use crate::core::PipelineResult;
use crate::errors::{LoaderError, Phase};

/// Asserts that the output text matches.
pub fn assert_output_text(result: &PipelineResult, expected: &str) {
    assert_eq!(
        result.output_text(),
        expected,
        "Expected output {:?}, got {:?}",
        expected,
        result.output_text()
    );
}

/// Asserts that an emitted file exists with the given text.
pub fn assert_emitted(result: &PipelineResult, name: &str, expected: &str) {
    let file = result.emitted_file(name).unwrap_or_else(|| {
        panic!(
            "Expected emitted file '{}', got {:?}",
            name,
            result.emitted_files.iter().map(|f| &f.name).collect::<Vec<_>>()
        )
    });
    assert_eq!(String::from_utf8_lossy(&file.content), expected);
}

/// Asserts that the error is a protocol violation.
pub fn assert_protocol_violation(error: &LoaderError) {
    assert!(
        error.is_protocol_violation(),
        "Expected protocol violation, got: {error}"
    );
}

/// Asserts that the error is a failure of `unit` in `phase`.
pub fn assert_unit_failure(error: &LoaderError, unit: &str, phase: Phase) {
    match error {
        LoaderError::Unit(failure) => {
            assert_eq!(failure.unit, unit, "Expected failure of '{unit}'");
            assert_eq!(failure.phase, phase, "Expected failure in {phase} phase");
        }
        other => panic!("Expected unit failure of '{unit}', got: {other}"),
    }
}

/// Asserts that the run was cancelled.
pub fn assert_cancelled(error: &LoaderError) {
    assert!(
        matches!(error, LoaderError::Cancelled(_)),
        "Expected cancellation, got: {error}"
    );
}
