//! `switch`: drive a relay output.

use wifipool_core::PoolController;

use crate::cli::{GlobalOpts, SwitchArgs};
use crate::error::CliError;

pub async fn handle(
    controller: &PoolController,
    args: SwitchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    controller.initialize().await?;

    let on = args.state.is_on();
    controller.set_switch(&args.channel, on).await?;

    if !global.quiet {
        eprintln!(
            "✓ {} switched {}",
            args.channel,
            if on { "on" } else { "off" }
        );
    }
    Ok(())
}
