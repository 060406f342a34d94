use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use planwright_exec::executor::{
    CompositeEventSink, EventSink, MetricsCollector, MetricsEventSink, StdoutEventSink,
    TracingEventSink,
};
use planwright_exec::tracker::StepState;
use planwright_exec::{
    ExecutionRecord, ExecutorConfig, ExecutorError, PlanExecutor, VisualizationGraph,
};
use tokio_util::sync::CancellationToken;

use crate::exit_codes;
use crate::keys::build_key_source;
use crate::output::{print_error, print_result, OutputFormat};
use crate::runner::CommandActionRunner;
use crate::{KeyArgs, OutputArgs, RunArgs};

pub async fn execute_cmd(path: &Path, run: RunArgs, keys: KeyArgs, output: OutputArgs) -> i32 {
    let content = match super::read_document(path, &output) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let mut sink = CompositeEventSink::new();
    sink.add(Arc::new(TracingEventSink));
    if run.events {
        sink.add(Arc::new(StdoutEventSink));
    }
    let config = ExecutorConfig {
        max_parallel: run.max_parallel,
        cancel_grace: Duration::from_secs(run.cancel_grace),
        ..Default::default()
    };
    let collector = Arc::new(MetricsCollector::new());
    let sink: Arc<dyn EventSink> = if run.metrics {
        Arc::new(MetricsEventSink::new(collector.clone(), Arc::new(sink)))
    } else {
        Arc::new(sink)
    };
    let executor = PlanExecutor::new(Arc::new(CommandActionRunner::new()))
        .with_config(config)
        .with_event_sink(sink);

    let plan = match executor.verify(&content) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let result = executor
        .run_plan(plan, build_key_source(&keys), &run.run_options(), cancel)
        .await;
    signal_task.abort();

    let (record, code) = match result {
        Ok(record) if record.is_success() => (record, exit_codes::SUCCESS),
        Ok(record) => (record, exit_codes::RUN_FAILED),
        Err(ExecutorError::Cancelled { record }) => (*record, exit_codes::CANCELLED),
        Err(e @ ExecutorError::UnknownStep(_)) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
    };

    if run.metrics {
        eprintln!("{}", collector.get_metrics().await.to_json());
    }

    if let Some(dest) = &run.record {
        if let Err(e) = write_record(dest, &record) {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to write {}: {e}", dest.display()),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    }

    if !output.quiet {
        match output.format {
            OutputFormat::Json => print_result(output.format, false, &record),
            OutputFormat::Dot => print!("{}", VisualizationGraph::from_record(&record).to_dot()),
            OutputFormat::Text => print_text(&record),
        }
    }
    code
}

fn write_record(dest: &Path, record: &ExecutionRecord) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(dest, json)
}

fn print_text(record: &ExecutionRecord) {
    for s in &record.steps {
        let mut line = format!("{:<9} {}", s.state.as_str(), s.id);
        if s.attempts > 1 {
            line.push_str(&format!(" (attempts: {})", s.attempts));
        }
        match s.state {
            StepState::Succeeded => {
                if let Some(out) = &s.output {
                    line.push_str(&format!(": {out}"));
                }
            }
            StepState::Failed => {
                if let Some(err) = &s.error {
                    line.push_str(&format!(": {err}"));
                }
            }
            StepState::Skipped => {
                if let Some(reason) = &s.skip_reason {
                    line.push_str(&format!(": {reason}"));
                }
            }
            _ => {}
        }
        println!("{line}");
    }
    println!("run {} {}", record.run_id, record.status);
}
