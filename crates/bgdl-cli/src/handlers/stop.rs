//! Stop command handler.

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Cancel the transfer for `target` and discard its staged data.
pub async fn execute(ctx: &CliContext, target: &str) -> Result<(), CliError> {
    ctx.manager().stop(target).await?;
    println!("Stopped download for {target}");
    Ok(())
}
