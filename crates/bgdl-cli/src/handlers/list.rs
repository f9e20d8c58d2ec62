//! List command handler.

use bgdl_core::transfer::TransferRecord;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Print the transfers the manager knows about.
///
/// Right after start-up these are the leftovers adopted from earlier runs.
pub async fn execute(ctx: &CliContext, json: bool) -> Result<(), CliError> {
    let records = ctx.manager().snapshot().await;

    if json {
        let rendered = serde_json::to_string_pretty(&records)
            .map_err(|e| CliError::Io(format!("cannot render transfers: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if records.is_empty() {
        println!("No transfers in {}.", ctx.staging_dir.display());
        return Ok(());
    }

    println!("{:<10} {:>22}  Destination", "Status", "Received");
    for record in &records {
        println!(
            "{:<10} {:>22}  {}",
            record.status.as_str(),
            format_bytes(record),
            record.tag
        );
    }
    Ok(())
}

fn format_bytes(record: &TransferRecord) -> String {
    if record.bytes_total > 0 {
        format!("{}/{}", record.bytes_received, record.bytes_total)
    } else {
        format!("{}/?", record.bytes_received)
    }
}
