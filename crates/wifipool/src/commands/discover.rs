//! `discover`: list the raw IO inventory.

use tabled::Tabled;

use wifipool_core::PoolController;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ChannelRow {
    #[tabled(rename = "Channel")]
    channel: String,
}

pub async fn handle(controller: &PoolController, global: &GlobalOpts) -> Result<(), CliError> {
    let discovery = controller.discover_channels().await?;

    if !global.quiet {
        eprintln!(
            "Domain {} · device {} · {} channels",
            discovery.domain,
            discovery.device_uuid.as_deref().unwrap_or("-"),
            discovery.channels.len()
        );
    }

    let out = output::render_list(
        &global.output,
        &discovery.channels,
        |c| ChannelRow { channel: c.clone() },
        Clone::clone,
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
