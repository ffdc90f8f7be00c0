//! `poll`, `watch` and `flow`: read the pool through the reconciler.

use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tabled::Tabled;

use wifipool_core::{CapabilityValue, MemoryHost, PoolController, PollReport};

use crate::cli::{FlowArgs, FlowComparison, GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Reading {
    capability: String,
    value: Option<CapabilityValue>,
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Capability")]
    capability: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn readings(host: &MemoryHost) -> Vec<Reading> {
    host.snapshot()
        .into_iter()
        .map(|(capability, value)| Reading { capability, value })
        .collect()
}

fn report_errors(report: &PollReport, global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    for e in &report.errors {
        eprintln!("  ! {e}");
    }
}

pub async fn handle_poll(
    controller: &PoolController,
    host: &MemoryHost,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if controller.current_setup()?.is_none() {
        return Err(CliError::NoSetup);
    }
    controller.initialize().await?;
    let report = controller.poll_once().await;

    let data = readings(host);
    let out = output::render_list(
        &global.output,
        &data,
        |r| ReadingRow {
            capability: r.capability.clone(),
            value: r.value.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
        },
        |r| {
            format!(
                "{}={}",
                r.capability,
                r.value.map(|v| v.to_string()).unwrap_or_default()
            )
        },
    );
    output::print_output(&out, global.quiet);

    if !global.quiet {
        let color = output::should_color(&global.color);
        eprintln!("Health: {}", output::health_marker(report.healthy, color));
    }
    report_errors(&report, global);
    Ok(())
}

pub async fn handle_watch(
    controller: &PoolController,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if controller.current_setup()?.is_none() {
        return Err(CliError::NoSetup);
    }
    controller.initialize().await?;

    let mut reports = controller.reports();
    controller
        .restart_polling(args.interval.map(Duration::from_secs))
        .await;
    if !global.quiet {
        eprintln!(
            "Polling every {}s, Ctrl-C to stop",
            controller.poll_interval().await.as_secs()
        );
    }

    let color = output::should_color(&global.color);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                print_report_line(&report, global, color);
                report_errors(&report, global);
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn print_report_line(report: &PollReport, global: &GlobalOpts, color: bool) {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::to_string(report).unwrap_or_default()
        }
        _ => {
            let changes: Vec<String> = report
                .published
                .iter()
                .map(|p| format!("{}={}", p.capability, p.value))
                .collect();
            format!(
                "{} {} {}",
                Local::now().format("%H:%M:%S"),
                output::health_marker(report.healthy, color),
                if changes.is_empty() {
                    "(no change)".into()
                } else {
                    changes.join(" ")
                }
            )
        }
    };
    output::print_output(&line, global.quiet);
}

pub async fn handle_flow(
    controller: &PoolController,
    args: FlowArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !args.threshold.is_finite() {
        return Err(CliError::Validation {
            field: "threshold".into(),
            reason: "must be a finite number".into(),
        });
    }
    if controller.current_setup()?.is_none() {
        return Err(CliError::NoSetup);
    }
    controller.initialize().await?;
    controller.poll_once().await;

    let result = match args.comparison {
        FlowComparison::Above => controller.flow_above(args.threshold),
        FlowComparison::Below => controller.flow_below(args.threshold),
    };
    output::print_output(&result.to_string(), global.quiet);
    Ok(())
}
