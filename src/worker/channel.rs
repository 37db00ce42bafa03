//! Remote messaging endpoint for the analysis worker.
//!
//! The endpoint is a single TCP connection to the worker's loopback
//! address carrying length-prefixed JSON frames:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Frames are capped at [`MAX_FRAME_SIZE`] in both directions. A
//! background reader task routes replies to waiting sessions by their
//! correlation id; once the connection closes or a corrupt frame is seen,
//! every current and future session observes a closed channel.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error};
use uuid::Uuid;

use super::error::{AnalysisError, AnalysisResult};
use super::protocol::{ClientMessage, WorkerMessage};

/// Maximum message size the channel will carry, in bytes.
pub const MAX_FRAME_SIZE: usize = 4_000_000;

/// Local system name. Distinct from [`WORKER_SYSTEM_NAME`]: the client
/// only ever dials the worker's port, it never binds it.
pub const CLIENT_SYSTEM_NAME: &str = "pkgscope-client";

/// System name the worker listens under.
pub const WORKER_SYSTEM_NAME: &str = "pkgscope-host";

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<WorkerMessage>>>>;
type SharedWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Messaging endpoint addressed to the worker process.
///
/// One endpoint exists per worker start; it is disposed when the
/// supervisor shuts the worker down and recreated with the next worker.
#[derive(Debug)]
pub struct Endpoint {
    writer: SharedWriter,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl Endpoint {
    /// Connect to the worker at `host:port`.
    ///
    /// The worker binds its listener shortly after process start, so the
    /// dial is retried up to `attempts` times with `retry_delay` between
    /// attempts before giving up.
    pub async fn connect(
        host: &str,
        port: u16,
        attempts: u32,
        retry_delay: Duration,
    ) -> AnalysisResult<Self> {
        let mut last_err: Option<io::Error> = None;

        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
            }
            match TcpStream::connect((host, port)).await {
                Ok(stream) => {
                    debug!(host, port, attempt, "worker endpoint connected");
                    return Ok(Self::from_stream(stream));
                }
                Err(err) => {
                    debug!(host, port, attempt, %err, "worker endpoint not reachable yet");
                    last_err = Some(err);
                }
            }
        }

        Err(AnalysisError::ConnectFailed {
            addr: format!("{host}:{port}"),
            source: last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no attempts made")),
        })
    }

    fn from_stream(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let writer = Arc::new(Mutex::new(BufWriter::new(write_half)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = Self::spawn_reader_task(read_half, pending.clone(), closed.clone());

        Self {
            writer,
            pending,
            closed,
            reader_task,
        }
    }

    /// Spawn the background task that reads replies from the worker and
    /// routes them to waiting sessions.
    fn spawn_reader_task(
        read_half: OwnedReadHalf,
        pending: PendingMap,
        closed: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);

            loop {
                match read_frame(&mut reader).await {
                    Ok(None) => {
                        debug!("worker closed the channel");
                        break;
                    }
                    Ok(Some(payload)) => match serde_json::from_slice::<WorkerMessage>(&payload) {
                        Ok(reply) => {
                            let session = reply.session();
                            let mut pending = pending.lock().await;
                            match pending.remove(&session) {
                                Some(tx) => {
                                    let _ = tx.send(reply);
                                }
                                None => {
                                    debug!(%session, "reply for an unknown session dropped");
                                }
                            }
                        }
                        Err(err) => {
                            error!(%err, "corrupt frame on the worker channel");
                            break;
                        }
                    },
                    Err(err) => {
                        error!(%err, "failed to read from the worker channel");
                        break;
                    }
                }
            }

            // Mark closed before draining so no session can register
            // against a dead map; dropped senders wake every waiter.
            closed.store(true, Ordering::SeqCst);
            pending.lock().await.clear();
        })
    }

    /// Register a session actor on this endpoint.
    ///
    /// The actor accepts exactly one [`RemoteActor::ask`]; its reply is
    /// routed here by the session id.
    pub async fn actor_of(&self) -> AnalysisResult<RemoteActor> {
        let session = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(AnalysisError::ChannelClosed);
            }
            pending.insert(session, tx);
        }

        Ok(RemoteActor {
            session,
            writer: Arc::clone(&self.writer),
            pending: Arc::clone(&self.pending),
            reply: Some(rx),
        })
    }

    /// Whether the connection has died. A closed endpoint never recovers;
    /// the supervisor replaces worker and endpoint together.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the endpoint down: the reader task is aborted and the socket
    /// dropped. Never fails; in-flight sessions observe a closed channel.
    pub fn dispose(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_task.abort();
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Worker-bound actor reference for one analysis session.
pub struct RemoteActor {
    session: Uuid,
    writer: SharedWriter,
    pending: PendingMap,
    reply: Option<oneshot::Receiver<WorkerMessage>>,
}

impl RemoteActor {
    /// The session id this actor is registered under.
    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Send the analysis request and await the single reply.
    pub async fn ask(&mut self, spec: &[u8], output_file: &Path) -> AnalysisResult<WorkerMessage> {
        let request = ClientMessage::Analyse {
            session: self.session,
            spec: spec.to_vec(),
            output_file: output_file.to_path_buf(),
        };
        let payload = serde_json::to_vec(&request).map_err(AnalysisError::EncodeFailed)?;

        {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &payload).await?;
        }

        let rx = self.reply.take().ok_or(AnalysisError::ChannelClosed)?;
        rx.await.map_err(|_| AnalysisError::ChannelClosed)
    }

    /// Send a best-effort cancellation notice. Delivery failures are
    /// logged and ignored; the worker owes no reply.
    pub async fn tell_cancel(&self) {
        let notice = ClientMessage::Cancel {
            session: self.session,
        };
        let payload = match serde_json::to_vec(&notice) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(session = %self.session, %err, "cancel notice not encoded");
                return;
            }
        };

        let mut writer = self.writer.lock().await;
        if let Err(err) = write_frame(&mut *writer, &payload).await {
            debug!(session = %self.session, %err, "cancel notice not delivered");
        }
    }

    /// Deregister this actor. Idempotent; safe to call after the reply
    /// arrived or the channel died.
    pub async fn stop(&mut self) {
        self.reply = None;
        self.pending.lock().await.remove(&self.session);
    }
}

/// Write a length-prefixed frame.
///
/// Payloads above [`MAX_FRAME_SIZE`] are rejected without touching the
/// writer.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> AnalysisResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(AnalysisError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_SIZE,
        });
    }

    let len = payload.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(AnalysisError::WriteFailed)?;
    writer
        .write_all(payload)
        .await
        .map_err(AnalysisError::WriteFailed)?;
    writer.flush().await.map_err(AnalysisError::WriteFailed)?;
    Ok(())
}

/// Read a length-prefixed frame.
///
/// Returns `None` on clean EOF. A length prefix above [`MAX_FRAME_SIZE`]
/// is a transport error, not a truncation.
pub async fn read_frame<R>(reader: &mut R) -> AnalysisResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(AnalysisError::ReadFailed(err)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(AnalysisError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(AnalysisError::ReadFailed)?;
    Ok(Some(payload))
}
