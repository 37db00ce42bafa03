//! Analysis session coordination.
//!
//! One [`AnalysisClient::analyse`] call is one session: the spec is
//! compressed and size-checked before any process or channel work, a live
//! worker is ensured, a session actor is registered, and exactly one
//! reply is awaited under the caller's cancellation token. Whatever the
//! outcome, the session actor is deregistered and any partial output the
//! worker left behind is removed; the worker process itself stays warm
//! for the next session.

use std::fs;
use std::io;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::channel::{RemoteActor, MAX_FRAME_SIZE};
use super::error::{AnalysisError, AnalysisResult};
use super::protocol::WorkerMessage;
use super::supervisor::{ShutdownReport, WorkerSupervisor};
use crate::analysis::{document, spec, AnalysisDocument, AnalysisRequest};
use crate::config::Settings;

/// Client for out-of-process package analysis.
///
/// Sessions are issued sequentially against one client; the worker
/// process is reused across sessions and dies when the client is shut
/// down or dropped.
///
/// # Example
///
/// ```ignore
/// use pkgscope::{AnalysisClient, AnalysisRequest, Settings};
/// use tokio_util::sync::CancellationToken;
///
/// let mut client = AnalysisClient::new(Settings::load()?);
/// let request = AnalysisRequest::new(spec_bytes, "/tmp/analysis.out");
/// let document = client.analyse(request, CancellationToken::new()).await?;
/// ```
pub struct AnalysisClient {
    supervisor: WorkerSupervisor,
}

impl AnalysisClient {
    /// Create a client. No worker is started until the first session.
    pub fn new(settings: Settings) -> Self {
        Self {
            supervisor: WorkerSupervisor::new(&settings),
        }
    }

    /// Pid of the warm worker, if one is currently tracked.
    pub fn worker_pid(&self) -> Option<u32> {
        self.supervisor.worker_pid()
    }

    /// Run one analysis session.
    ///
    /// The request's `spec` is replaced by its gzip-compressed form and
    /// checked against the frame budget before any worker interaction.
    /// If `cancellation` fires after dispatch the session ends with
    /// [`AnalysisError::Cancelled`]; a best-effort cancel notice is sent
    /// to the worker without waiting for acknowledgment.
    ///
    /// On every exit path the session actor is deregistered and
    /// `request.output_file` is deleted if it exists.
    pub async fn analyse(
        &mut self,
        mut request: AnalysisRequest,
        cancellation: CancellationToken,
    ) -> AnalysisResult<AnalysisDocument> {
        request.spec = spec::compress(&request.spec).map_err(AnalysisError::CompressFailed)?;
        check_frame_budget(request.spec.len())?;

        let (handle, endpoint) = self.supervisor.ensure_running().await?;
        debug!(pid = handle.pid(), "worker ensured");

        let mut actor = endpoint.actor_of().await?;
        debug!(session = %actor.session(), "session dispatched");

        let outcome = tokio::select! {
            outcome = submit(&mut actor, &request) => outcome,
            () = cancellation.cancelled() => Err(AnalysisError::Cancelled),
        };

        if matches!(outcome, Err(AnalysisError::Cancelled)) {
            actor.tell_cancel().await;
        }

        actor.stop().await;
        scrub_output(&request.output_file);

        outcome
    }

    /// Stop the worker process and dispose the endpoint, best-effort.
    ///
    /// Also runs on drop; calling it explicitly surfaces the report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        self.supervisor.shutdown()
    }
}

impl Drop for AnalysisClient {
    fn drop(&mut self) {
        self.supervisor.shutdown();
    }
}

/// Send the request and map the single reply.
async fn submit(
    actor: &mut RemoteActor,
    request: &AnalysisRequest,
) -> AnalysisResult<AnalysisDocument> {
    let reply = actor.ask(&request.spec, &request.output_file).await?;

    match reply {
        WorkerMessage::Failed { error, .. } => Err(AnalysisError::Remote(error)),
        WorkerMessage::Completed { document, .. } => {
            document::decode(&document).map_err(AnalysisError::DecodeFailed)
        }
    }
}

/// Reject specs whose frame, with encoding overhead, could exceed the
/// channel limit. The compressed bytes travel base64-inside-JSON, which
/// expands by less than 2x, so half a frame is the budget.
fn check_frame_budget(compressed_len: usize) -> AnalysisResult<()> {
    if compressed_len * 2 > MAX_FRAME_SIZE {
        return Err(AnalysisError::SpecTooLarge {
            compressed: compressed_len,
            limit: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// Remove the session's output file if the worker left one behind.
/// Idempotent and infallible; a failed removal is only logged.
fn scrub_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(file = %path.display(), "partial output removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(file = %path.display(), %err, "could not remove partial output"),
    }
}
