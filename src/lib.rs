//! # Pkgscope
//!
//! Out-of-process static analysis of compiled packages.
//!
//! Inspecting a compiled package means loading it, and loading arbitrary
//! packages can crash, leak, or hang. Pkgscope therefore never inspects
//! in-process: it supervises a dedicated worker process and speaks a
//! framed, size-guarded protocol to it over a loopback channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 AnalysisRequest + token                  │
//! │        (packaging spec, scratch output file path)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compress + frame budget check]
//! ┌─────────────────────────────────────────────────────────┐
//! │              AnalysisClient (one session)                │
//! │   ensure worker → dispatch → await one reply → cleanup   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ framed JSON over loopback TCP
//! ┌─────────────────────────────────────────────────────────┐
//! │       pkgscope-worker (isolated, reused when warm)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          AnalysisDocument (call graph + failures)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A session always cleans up after itself: the session actor is
//! deregistered and any partial worker output removed, on success,
//! failure, and cancellation alike. The worker process survives sessions
//! and dies with the client.

pub mod analysis;
pub mod config;
pub mod worker;

pub use analysis::{AnalysisDocument, AnalysisRequest};
pub use config::Settings;
pub use worker::{AnalysisClient, AnalysisError, AnalysisResult};
