use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use netflow::cli::commands::{CleanupCommand, HistoryCommand, RunCommand, ValidateCommand};
use netflow::cli::output::*;
use netflow::cli::{Cli, Command};
use netflow::{
    DeviceAdapter, DeviceClientConfig, ExecutionEngine, ExecutionEvent, ExecutionRequest,
    InMemoryPersistence, PersistenceBackend, ScriptedDevice, SubprocessDevice, WebhookConfig,
    WebhookNotifier, WorkflowConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over the flag
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, cli.verbose).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::Cleanup(cmd) => cleanup_history(cmd).await?,
    }

    Ok(())
}

/// History store used by the CLI
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = netflow::persistence::SqliteExecutionStore::with_default_path()
            .await
            .context("Failed to open execution history")?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without sqlite support, history is not kept between runs");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_workflow(cmd: &RunCommand, verbose: bool) -> Result<()> {
    let config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow")?;
    let mut workflow = config.to_workflow().context("Invalid workflow")?;

    if let Some(timeout) = cmd.timeout {
        if timeout == 0 {
            bail!("--timeout must be at least 1 second");
        }
        workflow.validation.timeout = Duration::from_secs(timeout);
    }
    if let Some(retries) = cmd.retries {
        workflow.validation.retry_count = retries;
    }

    if !cmd.json {
        println!("{} Loaded workflow: {}", INFO, style(&workflow.name).bold());
    }

    let device: Arc<dyn DeviceAdapter> = match &cmd.replay {
        Some(path) => {
            Arc::new(ScriptedDevice::from_file(path).context("Failed to load replay file")?)
        }
        None => Arc::new(SubprocessDevice::new(
            DeviceClientConfig::new()
                .with_program(&cmd.program)
                .with_args(cmd.program_arg.iter().cloned()),
        )),
    };

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let mut engine = ExecutionEngine::from_shared(device);
    if let Some(url) = &cmd.webhook_url {
        let config = WebhookConfig::new(url).with_timeout(Duration::from_secs(cmd.webhook_timeout));
        let notifier = WebhookNotifier::new(config).context("Failed to set up webhook")?;
        engine = engine.with_notifier(Arc::new(notifier));
    }

    let spinner = (!cmd.json).then(|| create_spinner(&format!("{}Running {}", SPINNER, workflow.name)));
    if let Some(spinner) = spinner.clone() {
        engine
            .add_event_handler(move |entry| {
                spinner.println(format_log_entry(entry));
                if let Some(command) = &entry.command {
                    spinner.set_message(command.clone());
                }
                if verbose {
                    if let ExecutionEvent::StepExecuted { output, .. } = &entry.event {
                        if !output.is_empty() {
                            spinner.println(format!("{}", style(format_output(output, 5)).dim()));
                        }
                    }
                }
            })
            .await;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling execution");
            on_signal.cancel();
        }
    });

    let mut request = ExecutionRequest::new()
        .with_params(cmd.param.iter().cloned().collect())
        .with_variables(cmd.var.iter().cloned().collect())
        .with_cancellation(cancel);
    if let Some(target) = &cmd.target {
        request = request.with_target(target);
    }

    let result = engine.execute(&workflow, request).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if !cmd.no_history {
        store.save_execution(&result).await?;
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        print_result(&result);
        if cmd.diff {
            match result.output_diff().filter(|diff| diff.has_changes()) {
                Some(diff) => println!("\n{}", format_unified_diff(&diff.unified)),
                None => println!("\n{} No pre/post check differences", INFO),
            }
        }
        if !cmd.no_history {
            println!(
                "\n{} Execution saved to history (ID: {})",
                INFO,
                style(&result.execution_id().to_string()[..8]).dim()
            );
        }
    }

    if !result.status().is_success() {
        error!("{}", result.summary());
        std::process::exit(1);
    }

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    if !cmd.json {
        println!("{} Validating workflow...", INFO);
    }

    let loaded = WorkflowConfig::from_file(&cmd.file).and_then(|config| {
        let workflow = config.to_workflow()?;
        Ok((config, workflow))
    });

    match loaded {
        Ok((config, workflow)) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{} Workflow document is valid!", CHECK);
                print_workflow(&workflow);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(result) if cmd.json => {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Some(result) => {
                print_result(&result);
                if cmd.log {
                    println!("\n  {}", style("Execution log:").bold());
                    for entry in result.log() {
                        println!("    {}", format_log_entry(entry));
                    }
                }
            }
            None => {
                println!("{} Execution not found", WARN);
            }
        }
        return Ok(());
    }

    let mut executions = match &cmd.workflow {
        Some(workflow_name) => store.list_executions(workflow_name).await?,
        None => {
            let mut all = Vec::new();
            for workflow_name in store.list_workflows().await? {
                all.extend(store.list_executions(&workflow_name).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, executions.len());
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

async fn cleanup_history(cmd: &CleanupCommand) -> Result<()> {
    if cmd.days < 0 {
        bail!("--days must not be negative");
    }

    let store = open_store().await?;
    let cutoff = Utc::now() - ChronoDuration::days(cmd.days);
    let removed = store.delete_older_than(cutoff).await?;

    println!(
        "{} Removed {} executions older than {} days",
        CHECK,
        style(removed).cyan(),
        cmd.days
    );

    Ok(())
}
