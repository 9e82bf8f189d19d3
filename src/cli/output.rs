//! CLI output formatting

use crate::{
    core::{
        DiffStats, ExecutionEvent, ExecutionResult, ExecutionStatus, LogEntry, StageStatus,
        WorkflowDefinition,
    },
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static LOOP: Emoji<'_, '_> = Emoji("🔁 ", "@ ");

/// Spinner shown while a workflow runs
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    "─".repeat(width.min(120))
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Aborted => style("ABORTED").yellow().to_string(),
        ExecutionStatus::RolledBack => style("ROLLED BACK").yellow().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").dim().to_string(),
    }
}

pub fn format_stage_status(status: StageStatus) -> String {
    match status {
        StageStatus::Success => style("SUCCESS").green().to_string(),
        StageStatus::Failure => style("FAILURE").red().to_string(),
        StageStatus::Cancelled => style("CANCELLED").dim().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> &'static Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Completed => &CHECK,
        ExecutionStatus::Failed => &CROSS,
        _ => &WARN,
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let mut line = format!(
        "{} {} - {} - {} - {} steps - {}",
        status_icon(summary.status),
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.workflow_name).bold(),
        format_status(summary.status),
        summary.steps_executed,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if let Some(target) = &summary.target {
        line.push_str(&format!(" @ {}", style(target).cyan()));
    }
    line
}

/// Format a log entry for live display
pub fn format_log_entry(entry: &LogEntry) -> String {
    let command = entry.command.as_deref().unwrap_or_default();
    match &entry.event {
        ExecutionEvent::ExecutionStarted { workflow } => {
            format!("{} Starting workflow {}", ROCKET, style(workflow).bold())
        }
        ExecutionEvent::StageStarted { stage } => {
            format!("{}\n{} {}", separator(), INFO, style(stage.title()).bold())
        }
        ExecutionEvent::StepExecuted { exit_code, .. } => {
            let mut line = match entry.matched {
                Some(false) => format!("{} {}", CROSS, style(command).red()),
                _ => format!("{} {}", CHECK, style(command).cyan()),
            };
            if *exit_code != 0 {
                line.push_str(&format!(" {}", style(format!("(exit {})", exit_code)).dim()));
            }
            if let Some(captured) = &entry.captured {
                line.push_str(&format!(
                    " {} {} = {}",
                    style("→").dim(),
                    style(&captured.name).cyan(),
                    style(&captured.value).dim()
                ));
            }
            line
        }
        ExecutionEvent::StepFailed { error } => {
            format!("{} {}: {}", CROSS, style(command).red(), style(error).dim())
        }
        ExecutionEvent::RetryScheduled {
            attempt,
            max_attempts,
            error,
        } => format!(
            "{} {} (attempt {}/{}): {}",
            WARN,
            style(command).yellow(),
            attempt,
            max_attempts,
            style(error).dim()
        ),
        ExecutionEvent::ConditionEvaluated { condition, branch } => format!(
            "{} {} → {}",
            INFO,
            style(condition).dim(),
            style(format!("{:?}", branch)).cyan()
        ),
        ExecutionEvent::LoopIteration {
            iteration,
            satisfied,
        } => format!(
            "{} iteration {} {}",
            LOOP,
            iteration,
            if *satisfied {
                style("satisfied").green().to_string()
            } else {
                style("not yet").dim().to_string()
            }
        ),
        ExecutionEvent::LoopFinished { exit, iterations } => format!(
            "{} loop finished after {} iterations ({:?})",
            LOOP, iterations, exit
        ),
        ExecutionEvent::StageFinished { stage, status } => {
            format!("{} {} {}", INFO, stage.title(), format_stage_status(*status))
        }
        ExecutionEvent::ExecutionCancelled => {
            format!("{} {}", WARN, style("Execution cancelled").yellow())
        }
        ExecutionEvent::ExecutionFinished { status } => {
            format!("{}\n{} Workflow {}", separator(), status_icon(*status), format_status(*status))
        }
    }
}

/// Print the outcome of one execution
pub fn print_result(result: &ExecutionResult) {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(result.execution_id()).cyan());
    println!("  Workflow: {}", style(result.workflow_name()).bold());
    if let Some(target) = result.target() {
        println!("  Target: {}", style(target).cyan());
    }
    println!("  Status: {}", format_status(result.status()));
    println!("  Outcome: {}", result.status().describe());
    println!("  Started: {}", style(result.started_at().to_rfc3339()).dim());
    if let Ok(duration) = result.duration().to_std() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }

    for stage in result.stages() {
        println!(
            "  {:<16} {} ({} steps)",
            stage.stage.title(),
            format_stage_status(stage.status),
            stage.steps_executed
        );
    }

    if let (Some(stage), Some(step)) = (result.failed_stage(), result.failed_step()) {
        println!(
            "  Failed at: {} step {} {}",
            stage.title(),
            step.position + 1,
            style(&step.command).red()
        );
    }
    if let Some(error) = result.error_message() {
        println!("  Error: {}", style(error).red());
    }
    if !result.variables().is_empty() {
        println!("  Variables:");
        for (name, value) in result.variables() {
            println!("    {} = {}", style(name).cyan(), style(value).dim());
        }
    }
    if let Some(diff) = result.output_diff() {
        println!("  Pre/post diff: {}", format_diff_stats(&diff.stats));
    }
}

pub fn format_diff_stats(stats: &DiffStats) -> String {
    if stats.total_changes == 0 {
        return "no changes".to_string();
    }
    format!(
        "{} {} ({} lines changed)",
        style(format!("+{}", stats.additions)).green(),
        style(format!("-{}", stats.deletions)).red(),
        stats.total_changes
    )
}

/// Color a unified diff: additions green, deletions red, hunk headers cyan
pub fn format_unified_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                style(line).bold().to_string()
            } else if line.starts_with("@@") {
                style(line).cyan().to_string()
            } else if line.starts_with('+') {
                style(line).green().to_string()
            } else if line.starts_with('-') {
                style(line).red().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print the stage layout of a loaded workflow
pub fn print_workflow(workflow: &WorkflowDefinition) {
    println!("  Name: {}", style(&workflow.name).bold());
    if let Some(description) = &workflow.description {
        println!("  Description: {}", description);
    }
    for kind in crate::core::StageKind::ALL {
        println!(
            "  {}: {}",
            kind.title(),
            style(workflow.stage(kind).len()).cyan()
        );
    }
    println!("  Commands (including conditional): {}", style(workflow.step_count()).cyan());
    println!(
        "  Timeout: {}s, retries: {}",
        workflow.validation.timeout.as_secs(),
        workflow.validation.retry_count
    );
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
