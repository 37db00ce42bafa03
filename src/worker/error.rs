//! Analysis-session error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for analysis sessions.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors that can terminate an analysis session.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The compressed spec cannot fit the transport frame budget.
    ///
    /// Raised before any process or channel work; the caller can recover
    /// by shrinking the spec.
    #[error("compressed spec of {compressed} bytes exceeds the {limit} byte frame budget")]
    SpecTooLarge {
        /// Compressed spec length in bytes.
        compressed: usize,
        /// Maximum frame size the channel will carry.
        limit: usize,
    },

    /// The worker explicitly reported an analysis-level failure.
    #[error("analysis failed in the worker: {0}")]
    Remote(String),

    /// The caller cancelled the session.
    #[error("analysis cancelled")]
    Cancelled,

    /// The worker executable does not exist at the expected location.
    #[error("worker executable not found at {0}")]
    WorkerMissing(PathBuf),

    /// Failed to spawn the worker process.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to gzip the spec payload.
    #[error("failed to compress spec: {0}")]
    CompressFailed(#[source] io::Error),

    /// The worker never accepted a connection on its endpoint address.
    #[error("failed to connect to worker at {addr}: {source}")]
    ConnectFailed {
        /// The `host:port` the client dialed.
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Failed to write a frame to the worker channel.
    #[error("failed to write to the worker channel: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to read a frame from the worker channel.
    #[error("failed to read from the worker channel: {0}")]
    ReadFailed(#[source] io::Error),

    /// A frame exceeded the channel's fixed size limit.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Claimed or actual frame size in bytes.
        size: usize,
        /// Maximum frame size the channel will carry.
        limit: usize,
    },

    /// The channel closed before a reply arrived.
    #[error("worker channel closed before a reply arrived")]
    ChannelClosed,

    /// Failed to serialize an outgoing message.
    #[error("failed to encode request: {0}")]
    EncodeFailed(#[source] serde_json::Error),

    /// The worker's success payload did not decode into a document.
    #[error("failed to decode worker payload: {0}")]
    DecodeFailed(#[source] serde_json::Error),
}

impl AnalysisError {
    /// Check whether this is a channel- or process-level fault, as opposed
    /// to a pre-flight rejection, a worker-reported failure, or a
    /// cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WorkerMissing(_)
                | Self::SpawnFailed(_)
                | Self::ConnectFailed { .. }
                | Self::WriteFailed(_)
                | Self::ReadFailed(_)
                | Self::FrameTooLarge { .. }
                | Self::ChannelClosed
                | Self::EncodeFailed(_)
                | Self::DecodeFailed(_)
        )
    }

    /// Check whether the session ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<io::Error> for AnalysisError {
    fn from(err: io::Error) -> Self {
        Self::WriteFailed(err)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AnalysisError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}
