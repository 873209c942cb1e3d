//! Line-delimited JSON-RPC over a byte stream (stdin/stdout in the binary).
//!
//! Each input line is one request. Each request that carries an `id` gets
//! exactly one response line, written in input order. Notifications (no
//! `id`) are dispatched and their result discarded. Blank lines are skipped.
//! The loop ends at end of input.

use crate::dispatcher::JsonRpcDispatcher;
use crate::error::Result;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Serve `dispatcher` on `reader`/`writer` until the reader is exhausted.
pub async fn serve_stdio<R, W>(dispatcher: &JsonRpcDispatcher, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    info!("Serving MCP over stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let dispatched = match serde_json::from_str::<Value>(line) {
            Ok(request) => {
                let dispatched = dispatcher.handle(&request).await;
                if request.is_object() && request.get("id").is_none() {
                    debug!(method = ?dispatched.method, "Handled stdio notification");
                    continue;
                }
                dispatched
            }
            Err(_) => dispatcher.handle_bytes(line.as_bytes()).await,
        };

        let mut out = serde_json::to_vec(&dispatched.response).map_err(std::io::Error::from)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    info!("stdio input closed");
    Ok(())
}
