//! CLI command definitions

use clap::Args;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow file (YAML or JSON)
    #[arg(short, long)]
    pub file: String,

    /// Device or host label recorded with the execution
    #[arg(short, long)]
    pub target: Option<String>,

    /// Values for {{name}} tokens in dynamic steps (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub param: Vec<(String, String)>,

    /// Initial variable values (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Program used to reach the device; each command is passed as its last argument
    #[arg(long, default_value = "ssh")]
    pub program: String,

    /// Argument placed before the command, repeatable
    #[arg(long)]
    pub program_arg: Vec<String>,

    /// Override the per-command timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Override the retry count for transport failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Answer commands from a recorded replay file instead of a live device
    #[arg(long)]
    pub replay: Option<String>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the execution result as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the unified diff between pre-check and post-check output
    #[arg(long)]
    pub diff: bool,

    /// POST execution start and finish events to this URL
    #[arg(long, env = "NETFLOW_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub webhook_timeout: u64,
}

/// Validate a workflow document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show the full execution log
    #[arg(long)]
    pub log: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Delete old execution history
#[derive(Debug, Args, Clone)]
pub struct CleanupCommand {
    /// Keep executions started within this many days
    #[arg(long, default_value_t = crate::persistence::DEFAULT_RETENTION_DAYS)]
    pub days: i64,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
