//! `test`: log in and report the account identity.

use wifipool_core::PoolController;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub async fn handle(controller: &PoolController, global: &GlobalOpts) -> Result<(), CliError> {
    let info = controller.test_connection().await?;
    let out = output::render_single(
        &global.output,
        &info,
        |i| match i.identity {
            Some(ref who) => format!("✓ Connected as {who}"),
            None => "✓ Connected".into(),
        },
        |i| i.identity.clone().unwrap_or_default(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
