use std::path::Path;

use planwright_core::{load_plan_str, LoadError};
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::OutputArgs;

#[derive(Serialize)]
struct ValidateResult {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn validate_cmd(path: &Path, output: OutputArgs) -> i32 {
    let content = match super::read_document(path, &output) {
        Ok(c) => c,
        Err(code) => return code,
    };

    match load_plan_str(&content) {
        Ok(plan) => {
            if output.format == OutputFormat::Text && !output.quiet {
                println!("ok: valid plan {} ({} steps, {})", plan.id, plan.len(), plan.strategy);
            } else {
                print_result(
                    output.format,
                    output.quiet,
                    &ValidateResult {
                        valid: true,
                        plan_id: Some(plan.id.clone()),
                        steps: Some(plan.len()),
                        error_kind: None,
                        error: None,
                    },
                );
            }
            exit_codes::SUCCESS
        }
        Err(err) => {
            report_invalid(&err, &output);
            exit_codes::VALIDATION_FAILED
        }
    }
}

fn report_invalid(err: &LoadError, output: &OutputArgs) {
    if output.format == OutputFormat::Text {
        if !output.quiet {
            eprintln!("error: validation failed");
            eprintln!("- {}: {err}", err.kind());
        }
        return;
    }
    print_result(
        output.format,
        output.quiet,
        &ValidateResult {
            valid: false,
            plan_id: None,
            steps: None,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
        },
    );
}
