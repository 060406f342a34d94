use std::process::Stdio;

use async_trait::async_trait;
use planwright_exec::{ActionContext, ActionError, ActionOutput, ActionRunner};
use serde_json::Value as JsonValue;

const SUMMARY_MAX_CHARS: usize = 200;

/// Runs `action.command` through `sh -c`.
///
/// Resolved variables are exported as `PW_VAR_<NAME>` (upper-cased). A step
/// without a command succeeds without doing anything. The last non-empty
/// line of stdout becomes the output summary; the tail of stdout is kept in
/// the step's log whether or not the command succeeds.
#[derive(Debug, Default, Clone)]
pub struct CommandActionRunner;

impl CommandActionRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionRunner for CommandActionRunner {
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let Some(command) = ctx.action.get("command") else {
            return Ok(ActionOutput::empty());
        };
        let Some(command) = command.as_str() else {
            return Err(ActionError::failed("action.command must be a string"));
        };

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env("PW_RUN_ID", ctx.run_id.to_string())
            .env("PW_PLAN_ID", &ctx.plan_id)
            .env("PW_STEP_ID", &ctx.step_id)
            .env("PW_ATTEMPT", ctx.attempt.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in &ctx.variables.values {
            cmd.env(format!("PW_VAR_{}", name.to_ascii_uppercase()), env_value(value));
        }

        let child = cmd
            .spawn()
            .map_err(|e| ActionError::failed(format!("failed to spawn sh: {e}")))?;

        let output = tokio::select! {
            out = child.wait_with_output() => {
                out.map_err(|e| ActionError::failed(format!("failed to wait for command: {e}")))?
            }
            // Dropping the child future kills the process.
            _ = ctx.cancel.cancelled() => return Err(ActionError::Cancelled),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        ctx.log.push_text(&stdout);

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match last_line(&stderr) {
                Some(line) => ActionError::failed(format!("{status}: {line}")),
                None => ActionError::failed(status),
            });
        }

        Ok(match last_line(&stdout) {
            Some(line) => ActionOutput::with_summary(truncate(line, SUMMARY_MAX_CHARS)),
            None => ActionOutput::empty(),
        })
    }
}

fn env_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}
