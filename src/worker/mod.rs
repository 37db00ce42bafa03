//! Worker orchestration module.
//!
//! This module manages the out-of-process analysis worker: the client
//! delegates the actual package inspection to an isolated child process
//! so that crashes or memory pressure inside the inspected package never
//! take down the host application.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Pkgscope Client (Tokio)                     │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                      AnalysisClient                       │  │
//! │  │  - compresses and size-checks the spec before dispatch    │  │
//! │  │  - one request / one reply per session actor              │  │
//! │  │  - cancellation + cleanup on every exit path              │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │  ┌───────────────────────┐  ┌───────────────────────────────┐  │
//! │  │    WorkerSupervisor    │  │           Endpoint            │  │
//! │  │  spawn / reuse / kill  │  │  framed JSON over loopback    │  │
//! │  └───────────────────────┘  └───────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                 TCP, [u32 BE len][JSON], max 4 MB
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        pkgscope-worker (long-running, reused when warm)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod client;
mod error;
mod supervisor;

pub mod channel;
pub mod protocol;

pub use client::AnalysisClient;
pub use error::{AnalysisError, AnalysisResult};
pub use supervisor::{ShutdownReport, WorkerHandle, WorkerSupervisor, WORKER_EXECUTABLE};
