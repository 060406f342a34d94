pub mod execute;
pub mod graph;
pub mod plan;
pub mod validate;
pub mod vault;

use std::path::Path;

use crate::exit_codes;
use crate::output::print_error;
use crate::OutputArgs;

/// Reads a document, reporting failures as a runtime error.
pub(crate) fn read_document(path: &Path, output: &OutputArgs) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        print_error(
            output.format,
            output.quiet,
            &format!("failed to read {}: {e}", path.display()),
        );
        exit_codes::RUNTIME_ERROR
    })
}
