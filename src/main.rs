use clap::Parser;
use colored::*;
use log::{debug, error, info};

mod config;
mod mail;
mod report;
mod zpool;

/// Collect ZFS pool health, usage, and scrub status and email a report
#[derive(Parser)]
#[command(name = "zfs-report")]
#[command(about = "Poll zpool health, usage, errors and scrub age, render a report, and email it")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = config::CONFIG_PATH)]
    config: std::path::PathBuf,
    /// Print the report without sending email
    #[arg(long)]
    no_mail: bool,
    /// Output the merged pool records as JSON instead of the report (implies --no-mail)
    #[arg(long)]
    json: bool,
}

// Check if terminal supports colors
fn supports_colors() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if cfg!(unix) && std::env::var("TERM").is_ok() {
        return true;
    }
    false
}

fn init_colors() {
    if !supports_colors() {
        colored::control::set_override(false);
    }
}

fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(config::LoadOutcome::Loaded(cfg)) => cfg,
        Ok(config::LoadOutcome::TemplateCreated) => {
            println!("Created sample config file: {}", cli.config.display());
            println!("Please edit the config file with your settings and run again.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    let log_level = if cfg.debug.unwrap_or(false) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    init_colors();

    debug!("Loaded config: {:#?}", cfg);

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let now = chrono::Local::now();

    println!("{}", "Generating ZFS report...".yellow());

    // Strictly sequential: four queries, then merge
    let zpool_cli = zpool::ZpoolCommand;
    let health = zpool::collect_health(&zpool_cli);
    let usage = zpool::collect_usage(&zpool_cli);
    let errors = zpool::collect_errors(&zpool_cli);
    let scrub = zpool::collect_scrub(&zpool_cli, now.naive_local());

    let thresholds = &cfg.alert_thresholds;
    let rows = report::merge_rows(&health, &usage, &errors, &scrub, thresholds);
    let stats = report::compute_stats(&rows, thresholds);

    if cli.json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            hostname: &'a str,
            generated_at: String,
            subject: String,
            pools: &'a [report::PoolRow],
            summary: report::ReportStats,
        }

        let output = JsonOutput {
            hostname: &hostname,
            generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            subject: report::subject(&stats),
            pools: &rows,
            summary: stats,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize JSON output: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let body = report::render_report(
        &rows,
        &stats,
        thresholds,
        &hostname,
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    let subject = report::subject(&stats);

    if cli.no_mail {
        info!("--no-mail set; skipping email");
    } else {
        println!("{}", "Sending email...".yellow());
        match mail::send_report(&cfg.email, &subject, &body) {
            Ok(()) => println!(
                "{} Email sent to {} recipient(s)",
                "SUCCESS".green().bold(),
                cfg.email.to_addresses.len().to_string().cyan()
            ),
            // Mail failure is logged but never changes the exit status
            Err(e) => error!("Failed to send email: {e}"),
        }
    }

    println!("\n{}", "=".repeat(50));
    println!("REPORT PREVIEW:");
    println!("{}", "=".repeat(50));
    println!("{body}");
}
