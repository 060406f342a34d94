use std::path::Path;

use planwright_exec::{ExecutionRecord, VisualizationGraph};

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::OutputArgs;

pub fn graph_cmd(path: &Path, output: OutputArgs) -> i32 {
    let content = match super::read_document(path, &output) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let record: ExecutionRecord = match serde_json::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("not an execution record: {e}"),
            );
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let graph = VisualizationGraph::from_record(&record);
    if output.quiet {
        return exit_codes::SUCCESS;
    }
    match output.format {
        OutputFormat::Json => print_result(output.format, false, &graph),
        OutputFormat::Text | OutputFormat::Dot => print!("{}", graph.to_dot()),
    }
    exit_codes::SUCCESS
}
