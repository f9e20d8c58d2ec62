//! Fetch command handler.

use bgdl_core::transfer::{NotificationStream, TransferNotification, TransferOperation};

use crate::bootstrap::CliContext;
use crate::commands::FetchArgs;
use crate::error::CliError;
use crate::progress::FetchProgress;

/// Start (or attach to) a download and follow it to its outcome.
///
/// Ctrl+C requests cancellation; the command then waits for the manager to
/// report the terminal outcome.
pub async fn execute(ctx: &CliContext, args: FetchArgs) -> Result<(), CliError> {
    let quiet = args.quiet;
    let configuration = args.into_configuration()?;

    let mut operation = ctx
        .manager()
        .start_with_configuration(configuration)
        .await?;
    let destination = operation.tag().as_str().to_string();
    if operation.is_attached() {
        tracing::info!(destination = %destination, "Attached to download already in progress");
    }

    let stream = operation
        .progress_stream()
        .ok_or_else(|| CliError::Transfer("progress stream already taken".to_string()))?;
    let progress = if quiet {
        FetchProgress::hidden()
    } else {
        FetchProgress::new(&destination)
    };

    follow(&operation, stream, &progress).await?;
    println!("{destination}");
    Ok(())
}

async fn follow(
    operation: &TransferOperation,
    mut stream: NotificationStream,
    progress: &FetchProgress,
) -> Result<(), CliError> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelling = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelling => {
                cancelling = true;
                progress.message("cancelling");
                operation.cancel();
            }
            notification = stream.next_notification() => {
                let Some(notification) = notification else {
                    progress.abandon("interrupted");
                    return Err(CliError::Transfer(
                        "download ended without an outcome".to_string(),
                    ));
                };
                match notification {
                    TransferNotification::Progress { percentage } => {
                        progress.set_percentage(percentage);
                    }
                    TransferNotification::Status { message } => progress.message(&message),
                    TransferNotification::Completed => {
                        progress.finish("done");
                        return Ok(());
                    }
                    TransferNotification::Failed { error } => {
                        progress.abandon("failed");
                        return Err(error.into());
                    }
                    TransferNotification::Cancelled => {
                        progress.abandon("cancelled");
                        return Err(CliError::Cancelled);
                    }
                }
            }
        }
    }
}
