//! JSON-lines command loop.
//!
//! One request per input line, one reply per output line, in order. The
//! loop ends at end of input or when `shutdown` resolves.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use lord_controller::ControlPlane;

/// Serve requests from `reader` until it is exhausted or `shutdown` fires.
///
/// Returns the number of requests answered.
pub async fn serve_lines<R, W, S>(
    plane: &ControlPlane,
    reader: R,
    mut writer: W,
    shutdown: S,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut answered = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("end of input");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = plane.handle_line(&line).await;
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                answered += 1;
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    Ok(answered)
}
