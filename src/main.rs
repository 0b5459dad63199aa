//! GRACC report CLI
//!
//! Entry point for the `gracc-report` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use gracc_reporting::deliver::notify_failure;
use gracc_reporting::{
    ElasticsearchSource, JobRateReport, ProjectSummaryReport, ReportConfig, ReportError,
    ReportWindow, RunOutcome, SmtpDelivery,
};

#[derive(Parser)]
#[command(name = "gracc-report")]
#[command(about = "Periodic accounting reports from the GRACC event store", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, short = 'c', default_value = "gracc-report.toml")]
    config: PathBuf,

    /// Report window start (YYYY/MM/DD HH:MM)
    #[arg(long, short = 's')]
    start: String,

    /// Report window end (YYYY/MM/DD HH:MM)
    #[arg(long, short = 'e')]
    end: String,

    /// Send to the test recipient list only
    #[arg(long)]
    is_test: bool,

    /// Render the report but do not send it
    #[arg(long)]
    no_email: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Job success rate report for a VO
    Jobrate {
        /// VO to report on
        vo: String,

        /// Path to an HTML template overriding the built-in one
        #[arg(long, short = 't')]
        template: Option<PathBuf>,
    },

    /// Project wall-hours summary report
    Projects {
        /// Report type (e.g. OSG, XD)
        report_type: String,

        /// Path to an HTML template overriding the built-in one
        #[arg(long, short = 't')]
        template: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Config failures can only go to stderr; the maintainer addresses for
    // failure notifications live in the config itself.
    let config = match ReportConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {}", err);
            process::exit(1);
        }
    };
    let delivery = SmtpDelivery::new(&config.email.smtphost);

    match run(cli, &config, &delivery) {
        Ok(RunOutcome::Sent) => println!("Sent report"),
        Ok(RunOutcome::NothingToReport) => println!("Nothing to report"),
        Ok(RunOutcome::EmailSuppressed) => println!("Not sending email"),
        Err(err) => {
            error!(error = %err, "report run failed");
            notify_failure(&delivery, &config.email, &err.to_string());
            process::exit(1);
        }
    }
}

/// Everything past config load; any error here is logged and triggers a
/// failure notification before the process exits non-zero.
fn run(
    cli: Cli,
    config: &ReportConfig,
    delivery: &SmtpDelivery,
) -> Result<RunOutcome, ReportError> {
    let window = ReportWindow::parse(&cli.start, &cli.end)?;
    let source = ElasticsearchSource::new(&config.elasticsearch.hostname)?;

    match cli.command {
        Commands::Jobrate { vo, template } => {
            let template = read_template(template)?;
            JobRateReport::new(config, window, &vo, template, cli.is_test, cli.no_email)
                .execute(&source, delivery)
        }
        Commands::Projects {
            report_type,
            template,
        } => {
            let template = read_template(template)?;
            ProjectSummaryReport::new(
                config,
                window,
                &report_type,
                template,
                cli.is_test,
                cli.no_email,
            )
            .execute(&source, delivery)
        }
    }
}

fn read_template(path: Option<PathBuf>) -> Result<Option<String>, ReportError> {
    path.map(|p| std::fs::read_to_string(p)).transpose().map_err(Into::into)
}
