// src/main.rs

use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use std::time::Duration;

use palisade_rs_scanner::core::config::ScanConfig;
use palisade_rs_scanner::core::error::ScanError;
use palisade_rs_scanner::core::knowledge_base;
use palisade_rs_scanner::core::models::{RiskLevel, ScanReport};
use palisade_rs_scanner::core::{Collaborators, Scanner};
use palisade_rs_scanner::logging;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Balanced,
    Strict,
    Fast,
}

/// Scan a URL and print the full scan report as JSON.
#[derive(Parser)]
#[command(name = "palisade", version, about = "URL risk-scoring scanner")]
struct Args {
    /// The URL to scan. Bare domains are accepted.
    url: String,

    /// Named configuration preset.
    #[arg(long, value_enum, default_value_t = Preset::Balanced)]
    preset: Preset,

    /// Override the overall scan deadline in seconds (capped at 60).
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,

    /// Append a human-readable explanation of every finding.
    #[arg(long)]
    explain: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    color_eyre::install().ok();
    if let Err(e) = logging::initialize_logging() {
        eprintln!("warning: could not initialize logging: {e}");
    }

    let mut config = match args.preset {
        Preset::Balanced => ScanConfig::balanced(),
        Preset::Strict => ScanConfig::strict(),
        Preset::Fast => ScanConfig::fast(),
    };
    if let Some(secs) = args.timeout_secs {
        config.deadline.overall = Duration::from_secs(secs);
    }

    let scanner = match Scanner::new(config, Collaborators::live()) {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match scanner.scan(&args.url).await {
        Ok(outcome) => {
            let json = if args.pretty {
                serde_json::to_string_pretty(&*outcome.report)
            } else {
                serde_json::to_string(&*outcome.report)
            };
            match json {
                Ok(serialized) => println!("{serialized}"),
                Err(e) => {
                    eprintln!("error: could not serialize report: {e}");
                    return ExitCode::FAILURE;
                }
            }
            if args.explain {
                explain(&outcome.report);
            }
            exit_code_for(outcome.report.risk_level)
        }
        Err(ScanError::InvalidUrl(e)) => {
            eprintln!("error: invalid URL: {e}");
            ExitCode::from(64)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Renders the findings with titles and descriptions from the knowledge base.
fn explain(report: &ScanReport) {
    let advice = knowledge_base::get_risk_advice(report.risk_level);
    eprintln!();
    eprintln!(
        "{}: {:.1}% ({}/{} points, pipeline {})",
        advice.label,
        report.risk_percentage,
        report.final_score,
        report.base_score.active_max_score,
        report.mode,
    );
    eprintln!("{}", advice.recommendation);

    for category in &report.categories {
        if category.findings.is_empty() {
            continue;
        }
        eprintln!();
        eprintln!("{} ({}/{})", category.name, category.score, category.max_weight);
        for finding in &category.findings {
            match knowledge_base::get_check_detail(&finding.check_id) {
                Some(detail) => {
                    eprintln!("  [{:+}] {}", finding.points, detail.title);
                    eprintln!("        {}", finding.message);
                }
                None => eprintln!("  [{:+}] {}", finding.points, finding.message),
            }
        }
    }
}

/// CI-friendly exit code mapping: 0 clean, 1 worth a look, 2 dangerous.
fn exit_code_for(level: RiskLevel) -> ExitCode {
    match level {
        RiskLevel::Safe | RiskLevel::Low => ExitCode::SUCCESS,
        RiskLevel::Medium => ExitCode::from(1),
        RiskLevel::High | RiskLevel::Critical => ExitCode::from(2),
    }
}
