//! `chain-mirror flush`: stream notifications into the mirror.

use mirror_config_and_utils::Config;
use mirror_database::{queries, AsyncDatabase};
use mirror_flusher::{
    decode_line, BlockAssembler, Dispatcher, FlushResult, FlushSummary, Flusher, Step,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub async fn run_flush(
    config: &Config,
    db_path: &Path,
    input: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = AsyncDatabase::open(db_path).await?;
    let flusher = Arc::new(Flusher::new(Dispatcher::new(config.catalog_policy)));

    info!(
        database = %db.path(),
        input = %input.map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".into()),
        catalog_policy = %config.catalog_policy,
        "Starting flush"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let summary = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            flush_stream(&db, flusher, BufReader::new(file), shutdown).await?
        }
        None => flush_stream(&db, flusher, BufReader::new(tokio::io::stdin()), shutdown).await?,
    };

    db.close().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Apply every complete block read from `reader`, one `AsyncDatabase::call`
/// per block. Resolving `shutdown` stops the loop at the next block boundary.
pub async fn flush_stream<R, S>(
    db: &AsyncDatabase,
    flusher: Arc<Flusher>,
    reader: R,
    shutdown: S,
) -> FlushResult<FlushSummary>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let last_commit_height = db.call(|conn| queries::last_commit_height(conn)).await?;
    let mut assembler = BlockAssembler::new(last_commit_height);
    let mut summary = FlushSummary {
        last_commit_height,
        ..Default::default()
    };

    let mut lines = reader.lines();
    let mut line_no = 0;
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(pending = assembler.pending(), "Interrupted; stopping at block boundary");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;

        let Some(message) = decode_line(line_no, &line)? else {
            continue;
        };

        match assembler.push(message) {
            Step::Pending => {}
            Step::Skipped { .. } => summary.blocks_skipped += 1,
            Step::Ready(block) => {
                let height = block.height;
                let flusher = flusher.clone();
                let applied = db
                    .call(move |conn| Ok(flusher.apply_block(conn, &block.messages, block.height)))
                    .await??;

                summary.messages_applied += applied;
                summary.blocks_committed += 1;
                summary.last_commit_height = Some(height);
                assembler.mark_committed(height);
            }
        }
    }

    let dropped = assembler.dropped();
    let trailing = assembler.finish().len();
    summary.discarded = dropped + trailing;
    if trailing > 0 {
        warn!(
            discarded = trailing,
            "Stream ended inside a block; trailing messages not applied"
        );
    }

    info!(
        blocks_committed = summary.blocks_committed,
        blocks_skipped = summary.blocks_skipped,
        messages_applied = summary.messages_applied,
        "Flush finished"
    );
    Ok(summary)
}
