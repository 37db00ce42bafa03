//! Protocol types for worker communication.
//!
//! These types describe the framed JSON messages exchanged with the
//! analysis worker. Each session actor accepts exactly one `Analyse`
//! message and owes exactly one reply; `Cancel` is an out-of-band notice
//! with no reply.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit one analysis to the session actor named by `session`.
    Analyse {
        /// Session correlation id.
        session: Uuid,
        /// Gzip-compressed packaging spec, base64 inside the JSON frame.
        #[serde(with = "spec_bytes")]
        spec: Vec<u8>,
        /// Scratch file the worker may write while producing the document.
        output_file: PathBuf,
    },

    /// Cancellation notice. The worker may act on it or not; no reply is
    /// expected either way.
    Cancel {
        /// Session being cancelled.
        session: Uuid,
    },
}

/// Messages sent from the worker back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The analysis finished; `document` is the encoded analysis document.
    Completed {
        /// Session this reply belongs to.
        session: Uuid,
        /// Opaque string blob the client decodes into an `AnalysisDocument`.
        document: String,
    },

    /// The analysis failed inside the worker.
    Failed {
        /// Session this reply belongs to.
        session: Uuid,
        /// Worker-reported diagnostic text.
        error: String,
    },
}

impl WorkerMessage {
    /// The session this reply is addressed to.
    pub fn session(&self) -> Uuid {
        match self {
            Self::Completed { session, .. } | Self::Failed { session, .. } => *session,
        }
    }
}

/// Base64 transport encoding for the compressed spec bytes.
mod spec_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(&encoded).map_err(serde::de::Error::custom)
    }
}
