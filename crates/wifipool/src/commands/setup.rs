//! `setup` and `status`: run auto setup, show the saved result.

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use wifipool_core::{ChannelClassification, IoMap, PoolController, SensorSlot};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ClassificationRow {
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Reading")]
    reading: String,
}

fn classification_row(c: &ChannelClassification) -> ClassificationRow {
    ClassificationRow {
        channel: c.channel.to_string(),
        kind: c.kind.to_string(),
        key: c.key.clone().unwrap_or_default(),
        reading: c.reading.map(|r| r.to_string()).unwrap_or_default(),
    }
}

fn spinner(global: &GlobalOpts, message: &'static str) -> Option<ProgressBar> {
    if global.quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

pub async fn handle_setup(controller: &PoolController, global: &GlobalOpts) -> Result<(), CliError> {
    let pb = spinner(global, "Resolving pool and probing channels…");
    let result = controller.run_auto_setup().await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let report = result?;

    let out = output::render_list(
        &global.output,
        &report.classifications,
        classification_row,
        |c| format!("{}\t{}", c.channel, c.kind),
    );
    output::print_output(&out, global.quiet);

    if !global.quiet {
        eprintln!(
            "✓ Saved setup for \"{}\" ({} roles populated)",
            report.name,
            report.io_map.populated_count()
        );
    }
    Ok(())
}

pub fn handle_status(controller: &PoolController, global: &GlobalOpts) -> Result<(), CliError> {
    let descriptor = controller.pairing_descriptor()?.ok_or(CliError::NoSetup)?;
    let out = output::render_single(
        &global.output,
        &descriptor,
        |d| describe(&d.name, &d.store),
        |d| d.id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn slot(s: Option<&SensorSlot>) -> String {
    s.map_or_else(|| "-".into(), |s| s.io.to_string())
}

fn describe(name: &str, map: &IoMap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{name}");
    let _ = writeln!(out, "  Domain:       {}", map.domain);
    let _ = writeln!(out, "  Device:       {}", map.device_uuid);
    let _ = writeln!(out, "  pH:           {}", slot(map.ph.as_ref()));
    let _ = writeln!(out, "  Redox:        {}", slot(map.redox.as_ref()));
    let _ = writeln!(out, "  Temperature:  {}", slot(map.temperature.as_ref()));
    let _ = writeln!(out, "  Flow:         {}", slot(map.flow.as_ref()));

    let switches: Vec<String> = map
        .switches
        .iter()
        .map(|ch| match map.writability.get(ch) {
            Some(true) => format!("{ch} (writable)"),
            Some(false) => format!("{ch} (read-only)"),
            None => ch.to_string(),
        })
        .collect();
    let _ = write!(
        out,
        "  Switches:     {}",
        if switches.is_empty() {
            "-".into()
        } else {
            switches.join(", ")
        }
    );
    out
}
