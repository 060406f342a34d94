use std::path::Path;

use planwright_core::{load_plan_str, Plan};
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::OutputArgs;

#[derive(Serialize)]
struct PlanView<'a> {
    plan_id: &'a str,
    strategy: String,
    order: Vec<&'a str>,
    groups: Vec<Vec<&'a str>>,
    steps: Vec<StepView<'a>>,
}

#[derive(Serialize)]
struct StepView<'a> {
    id: &'a str,
    depends_on: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    variables: Vec<&'a str>,
    max_retries: u32,
}

pub fn plan_cmd(path: &Path, output: OutputArgs) -> i32 {
    let content = match super::read_document(path, &output) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let plan = match load_plan_str(&content) {
        Ok(p) => p,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };
    if output.quiet {
        return exit_codes::SUCCESS;
    }

    let view = plan_view(&plan);
    match output.format {
        OutputFormat::Dot => print!("{}", plan.to_dot()),
        OutputFormat::Json => print_result(output.format, false, &view),
        OutputFormat::Text => print_text(&view),
    }
    exit_codes::SUCCESS
}

fn plan_view(plan: &Plan) -> PlanView<'_> {
    let id = move |i: usize| plan.step(i).id.as_str();
    PlanView {
        plan_id: &plan.id,
        strategy: plan.strategy.to_string(),
        order: plan.graph.topo_order.iter().map(|i| id(*i)).collect(),
        groups: plan
            .concurrency_groups()
            .iter()
            .map(|g| g.steps.iter().map(|i| id(*i)).collect())
            .collect(),
        steps: plan
            .steps
            .iter()
            .map(|s| StepView {
                id: &s.id,
                depends_on: &s.depends_on,
                reference: s.reference.as_deref(),
                description: s.description.as_deref(),
                variables: s.variables.names().collect(),
                max_retries: s.retry.as_ref().map_or(0, |r| r.max_retries),
            })
            .collect(),
    }
}

fn print_text(view: &PlanView<'_>) {
    println!("plan: {} ({})", view.plan_id, view.strategy);
    println!("\nconcurrency groups:");
    for (idx, group) in view.groups.iter().enumerate() {
        println!("  {idx}: {}", group.join(", "));
    }
    println!("\nsteps:");
    for s in &view.steps {
        println!("- {}", s.id);
        if !s.depends_on.is_empty() {
            println!("  depends on: {}", s.depends_on.join(", "));
        }
        if let Some(reference) = s.reference {
            println!("  reference: {reference}");
        }
        if !s.variables.is_empty() {
            println!("  variables: {}", s.variables.join(", "));
        }
        if s.max_retries > 0 {
            println!("  retries: {}", s.max_retries);
        }
    }
}
