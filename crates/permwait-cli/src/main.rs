//! permwait CLI
//!
//! Opens a simulated screen, requests the given permissions, and answers the
//! platform dialog on the terminal.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use permwait_cli::dialog::AnswerPolicy;
use permwait_cli::session::{self, SessionOptions, SessionReport};
use permwait_core::config::load_config;
use permwait_core::tracing_init::init_from_config;

#[derive(Parser, Debug)]
#[command(name = "permwait")]
#[command(version, about = "Request runtime permissions and await the decision", long_about = None)]
struct Cli {
    /// Permissions to request (e.g. CAMERA LOCATION)
    permissions: Vec<String>,

    /// Permissions the platform already granted (comma-separated)
    #[arg(long, value_delimiter = ',')]
    granted: Vec<String>,

    /// Platform SDK level (below 23 every permission is granted at install)
    #[arg(long)]
    sdk_level: Option<u32>,

    /// How platform dialogs are answered
    #[arg(long, value_enum, default_value_t = AnswerPolicy::Ask)]
    answer: AnswerPolicy,

    /// Project directory holding `.permwait/settings.json`
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Emit structured JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = match cli.project_dir {
        Some(dir) => Some(dir),
        None => std::env::current_dir().ok(),
    };
    let mut config = load_config(project_dir.as_deref())?;
    if let Some(level) = cli.sdk_level {
        config.host.sdk_level = level;
    }
    config.host.pre_granted.extend(cli.granted);
    if cli.log_json {
        config.logging.json = true;
    }
    init_from_config(&config.logging);

    let report = session::run(SessionOptions {
        permissions: cli.permissions,
        sdk_level: config.host.sdk_level,
        pre_granted: config.host.pre_granted,
        answer: cli.answer,
    })
    .await?;

    print_report(&report, cli.json)?;
    if !report.outcome.is_granted() {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_report(report: &SessionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "{} {:?} ({} dialog{})",
            report.permissions,
            report.outcome,
            report.prompts,
            if report.prompts == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
