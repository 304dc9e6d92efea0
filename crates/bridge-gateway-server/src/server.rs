//! Socket server: accepts connections, tags them with the peer uid and feeds
//! frames to the dispatcher.

use std::future::Future;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::task::JoinError;

use bridge_gateway::protocol::MAX_FRAME_LEN;
use bridge_gateway::{DispatchOutcome, Dispatcher, ResponseEnvelope, WireReply, WireRequest};

// ── Listener setup ────────────────────────────────────────────────────────────

/// Bind the socket, replacing a stale socket file left by a previous run.
///
/// The socket is world-connectable; every call is authenticated by peer uid.
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            anyhow::bail!("{} exists and is not a socket", path.display());
        }
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
    Ok(listener)
}

/// Uid owning the socket file, i.e. the uid this process runs as.
pub fn socket_owner_uid(path: &Path) -> Result<u32> {
    Ok(std::fs::metadata(path)?.uid())
}

/// Removes the socket file when dropped.
pub struct SocketGuard(pub PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct BridgeServer {
    dispatcher: Arc<Dispatcher>,
}

impl BridgeServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: UnixListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    let caller_uid = match stream.peer_cred() {
                        Ok(cred) => cred.uid(),
                        Err(e) => {
                            // No uid, no way to authenticate.
                            tracing::warn!("dropping connection without peer credentials: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(dispatcher, caller_uid, stream).await {
                            tracing::debug!("connection from uid={caller_uid} ended: {e:#}");
                        }
                    });
                }
            }
        }
    }
}

/// Serve one connection: read a frame, dispatch it, write the reply.
///
/// A frame is one line of UTF-8 JSON, at most `MAX_FRAME_LEN` bytes before
/// the line ending. The connection is closed after a denial or an oversized
/// frame.
pub async fn handle_connection<S>(
    dispatcher: Arc<Dispatcher>,
    caller_uid: u32,
    stream: S,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!("connection from uid={caller_uid}");
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        // Room for a full frame plus "\r\n".
        let read = (&mut reader)
            .take(MAX_FRAME_LEN as u64 + 2)
            .read_until(b'\n', &mut frame)
            .await?;
        if read == 0 {
            return Ok(());
        }
        if strip_line_ending(&frame).len() > MAX_FRAME_LEN {
            let reply = WireReply::malformed(format!("frame exceeds {MAX_FRAME_LEN} bytes"));
            write_reply(&mut writer, &reply).await?;
            writer.shutdown().await?;
            return Ok(());
        }

        // Payloads are stored as received, so bytes that are not UTF-8 are
        // refused rather than repaired.
        let line = match std::str::from_utf8(&frame) {
            Ok(line) => line.trim(),
            Err(e) => {
                write_reply(&mut writer, &WireReply::malformed(e)).await?;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let reply = match WireRequest::decode(line) {
            Ok(request) => {
                let dispatcher = Arc::clone(&dispatcher);
                let joined = tokio::task::spawn_blocking(move || {
                    dispatcher.handle(caller_uid, &request.method, &request.arguments)
                })
                .await;
                dispatch_reply(joined)
            }
            Err(e) => WireReply::malformed(e),
        };

        write_reply(&mut writer, &reply).await?;
        if reply.is_denied() {
            writer.shutdown().await?;
            return Ok(());
        }
    }
}

fn strip_line_ending(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}

/// Reply for a finished dispatch task. A handler that panicked still gets
/// the caller an error envelope.
fn dispatch_reply(joined: Result<DispatchOutcome, JoinError>) -> WireReply {
    match joined {
        Ok(outcome) => WireReply::from(outcome),
        Err(e) => {
            tracing::error!("dispatch task failed: {e}");
            WireReply::Response(ResponseEnvelope::error(format!("call failed: {e}")))
        }
    }
}

async fn write_reply<W>(writer: &mut W, reply: &WireReply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = reply.encode()?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
