use anyhow::{bail, Context};
use brand_flow::{
    build_report_snapshot, AccessDecision, BrandFlowConfig, ConfirmPrompt, FixedAnswer,
    FlowController, LeaveFlowInterceptor, NavigationOutcome, ReportHistory, StepResult, StepStatus,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pipeline_core::{Candidate, PipelineDocument, StepKey};
use pipeline_store::FileStorage;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "brand-flow")]
#[command(about = "Drive the brand consulting flow against a local data directory")]
#[command(version)]
struct Cli {
    /// Directory holding the stored documents
    #[arg(long, env = "BRAND_FLOW_DATA_DIR", default_value = ".brand_flow")]
    data_dir: PathBuf,

    /// JSON or TOML config file
    #[arg(long, env = "BRAND_FLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the pipeline document and per-step status
    Show {
        /// Print the raw stored JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Submit a diagnosis form from a JSON file
    Diagnosis { file: PathBuf },
    /// Start a strict flow, clearing all step results
    Start {
        #[arg(long)]
        brand_id: Option<String>,
    },
    /// Record generated candidates for a step
    Result {
        step: StepKey,
        /// JSON array of candidate objects, each with an `id`
        candidates: String,
        /// Candidate id to select right away
        #[arg(long)]
        select: Option<String>,
    },
    /// Confirm a candidate, invalidating later steps when the choice changed
    Select { step: StepKey, candidate_id: String },
    /// Enter a step page: migrate, strict-check and move the current step
    Enter { step: StepKey },
    /// Check access to a step without side effects on the flow
    Check {
        step: StepKey,
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Simulate a route change
    Navigate {
        from: String,
        to: String,
        /// Confirm leaving without prompting
        #[arg(long, short, default_value_t = false)]
        yes: bool,
    },
    /// Simulate the current page unloading
    Unload { route: String },
    /// Reset a flow that was interrupted
    Recover,
    /// Abort the active flow
    Abort {
        #[arg(long, default_value = "user_cancel")]
        reason: String,
    },
    /// Mark the flow completed
    Complete,
    /// Import superseded page-local storage
    Migrate,
    /// Render a report snapshot
    Report {
        #[arg(long, default_value_t = false)]
        allow_incomplete: bool,
        /// Also store the snapshot in the history archive
        #[arg(long, default_value_t = false)]
        archive: bool,
    },
    /// List archived report snapshots
    History,
    /// Remove the pipeline document and all superseded keys
    Reset {
        /// Also clear the report history
        #[arg(long, default_value_t = false)]
        history: bool,
    },
}

/// Reads y/n from stdin.
struct StdinPrompt;

impl ConfirmPrompt for StdinPrompt {
    fn confirm(&self, message: &str) -> bool {
        print!("{} [y/N] ", message.yellow());
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = BrandFlowConfig::load(cli.config.as_deref())
        .with_context(|| "Failed to load configuration")?;
    tracing::debug!(data_dir = %cli.data_dir.display(), "Using data directory");

    let storage = Arc::new(FileStorage::new(&cli.data_dir));
    let controller = FlowController::new(storage, config);
    run(&controller, cli.command)
}

fn run(controller: &FlowController, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Show { json } => {
            let doc = controller.read();
            if json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_status(&doc);
            }
        }
        Commands::Diagnosis { file } => {
            let form = read_json(&file)?;
            let summary = controller.submit_diagnosis(&form);
            if summary.is_empty() {
                println!("{}", "⚠️  Diagnosis form had no recognised fields".yellow());
            } else {
                println!("{}", format!("✅ Diagnosis: {}", summary.short_text).green());
            }
        }
        Commands::Start { brand_id } => {
            controller.start_brand_flow(brand_id.as_deref());
            println!("{}", "🚀 Flow started at naming".cyan());
        }
        Commands::Result {
            step,
            candidates,
            select,
        } => {
            let candidates: Vec<Candidate> = serde_json::from_str(&candidates)
                .with_context(|| "Candidates must be a JSON array of objects")?;
            let mut result = StepResult::new(candidates);
            if let Some(id) = select {
                result = result.with_selected_id(id);
            }
            let doc = controller.set_step_result(step, result);
            let state = if doc.is_done(step) { "done" } else { "waiting for selection" };
            println!("{}", format!("✅ {} recorded ({})", step.label(), state).green());
        }
        Commands::Select { step, candidate_id } => {
            let doc = controller.confirm_selection(step, &candidate_id)?;
            println!("{}", format!("✅ {} selected: {}", step.label(), candidate_id).green());
            if doc.all_steps_complete() {
                println!("{}", "🎉 All steps complete".green());
            }
        }
        Commands::Enter { step } => print_decision(step, &controller.enter_step(step)),
        Commands::Check { step, strict } => {
            let decision = if strict {
                controller.ensure_strict_step_access(step)
            } else {
                controller.ensure_step_access(step)
            };
            print_decision(step, &decision);
        }
        Commands::Navigate { from, to, yes } => {
            let outcome = if yes {
                LeaveFlowInterceptor::new(controller.clone(), FixedAnswer(true))
                    .on_route_change(&from, &to)
            } else {
                LeaveFlowInterceptor::new(controller.clone(), StdinPrompt).on_route_change(&from, &to)
            };
            match outcome {
                NavigationOutcome::Proceed { to } => println!("➡️  {}", to),
                NavigationOutcome::Cancelled { stay_on } => {
                    println!("{}", format!("↩️  Staying on {}", stay_on).yellow())
                }
                NavigationOutcome::Redirected { to, notice } => {
                    println!("{}", notice.message.yellow());
                    println!("{}", format!("➡️  Redirected to {}", to).cyan());
                }
            }
        }
        Commands::Unload { route } => {
            let marked = LeaveFlowInterceptor::new(controller.clone(), FixedAnswer(false))
                .on_page_unload(&route);
            if marked {
                println!("{}", "⏸️  Active flow marked as interrupted".yellow());
            } else {
                println!("No active flow on this route");
            }
        }
        Commands::Recover => match controller.recover_interrupted() {
            Some(notice) => println!("{}", notice.message.yellow()),
            None => println!("No interrupted session"),
        },
        Commands::Abort { reason } => {
            controller.abort_brand_flow(&reason);
            println!("{}", format!("🛑 Flow aborted ({})", reason).red());
        }
        Commands::Complete => {
            controller.complete_brand_flow();
            println!("{}", "🎉 Flow completed".green());
        }
        Commands::Migrate => {
            let report = controller.migrate();
            if report.diagnosis_imported {
                println!("{}", "✅ Diagnosis imported from legacy draft".green());
            }
            for (step, key) in &report.imported {
                println!("{}", format!("✅ {} imported from {}", step.label(), key).green());
            }
            for discarded in &report.discarded {
                println!(
                    "{}",
                    format!("🗑️  {} discarded ({:?})", discarded.key, discarded.reason).dimmed()
                );
            }
            if !report.changed() {
                println!("Nothing to migrate");
            }
        }
        Commands::Report {
            allow_incomplete,
            archive,
        } => {
            let doc = controller.read();
            let snapshot = build_report_snapshot(&doc, controller.store().now(), allow_incomplete)?;
            println!("{}", snapshot.render_text());
            if archive {
                let history = ReportHistory::from_config(controller.store().clone(), controller.config());
                if !history.archive(snapshot) {
                    bail!("Failed to archive report snapshot");
                }
                println!("{}", "📦 Snapshot archived".green());
            }
        }
        Commands::History => {
            let history = ReportHistory::from_config(controller.store().clone(), controller.config());
            let entries = history.list();
            if entries.is_empty() {
                println!("No archived reports");
            }
            for snapshot in entries {
                println!(
                    "{}  {}  {}",
                    snapshot.created_at.to_rfc3339().dimmed(),
                    snapshot.id,
                    if snapshot.complete { "complete".green() } else { "partial".yellow() }
                );
            }
        }
        Commands::Reset { history } => {
            controller.reset_all();
            if history {
                ReportHistory::from_config(controller.store().clone(), controller.config()).clear();
            }
            println!("{}", "🧹 Pipeline reset".cyan());
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_decision(step: StepKey, decision: &AccessDecision) {
    match decision {
        AccessDecision::Allowed => println!("{}", format!("✅ {} allowed", step.label()).green()),
        AccessDecision::Denied {
            redirect_to,
            reason,
        } => {
            println!("{}", format!("❌ {} denied: {}", step.label(), reason).red());
            println!("   {}", reason.message());
            println!("   ➡️  {}", redirect_to);
        }
    }
}

fn print_status(doc: &PipelineDocument) {
    match &doc.diagnosis_summary {
        Some(summary) if !summary.is_empty() => {
            println!("Diagnosis: {}", summary.short_text.cyan())
        }
        _ => println!("Diagnosis: {}", "missing".red()),
    }
    if let Some(brand_id) = &doc.brand_id {
        println!("Brand: {}", brand_id);
    }
    match &doc.brand_flow {
        Some(flow) if flow.is_active() => {
            println!("Flow: {} at {}", "active".green(), flow.current_step())
        }
        Some(flow) => println!("Flow: {:?}", flow),
        None => println!("Flow: {}", "not started".dimmed()),
    }

    println!("{}", "─".repeat(40).dimmed());
    for step in StepKey::ORDER {
        let status = if doc.is_complete(step) {
            StepStatus::Complete
        } else if doc.is_done(step) {
            StepStatus::Stale
        } else {
            StepStatus::Pending
        };
        let marker = match status {
            StepStatus::Complete => "✔".green(),
            StepStatus::Stale => "!".yellow(),
            StepStatus::Pending => "·".dimmed(),
        };
        let selected = doc
            .step(step)
            .and_then(|s| s.resolve_selected())
            .map(|c| c.title().unwrap_or(&c.id).to_string())
            .unwrap_or_default();
        println!("{} {:<12} {}", marker, step.label(), selected);
    }
}
