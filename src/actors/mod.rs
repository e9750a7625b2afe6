//! Actor-based assessment runtime
//!
//! Each actor runs as an independent tokio task and is controlled through a handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │  EngineHandle      │  pause / resume / shutdown
//!                 └─────────┬──────────┘
//!                           │ EngineCommand (mpsc)
//!                 ┌─────────▼──────────┐      poll       ┌───────────┐
//!                 │  AssessmentEngine  │ ──────────────► │ Transport │
//!                 └─────────┬──────────┘                 └─────┬─────┘
//!                           │ spawns / drains                  │ subscribe
//!            ┌──────────────┼──────────────┐                   │
//!    ┌───────▼────────┐            ┌───────▼────────┐          │
//!    │ChannelAssessor │    ...     │ChannelAssessor │ ◄────────┘
//!    │  (/channel_a)  │            │  (/channel_n)  │
//!    └────────────────┘            └────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **AssessmentEngine**: polls for the target, drives the lifecycle and builds reports
//! - **ChannelAssessor**: subscribes to one channel and evaluates every value it receives
//!
//! Assessors are stopped through a `CancellationToken` and hand their accumulated
//! result back through their join handle.

pub mod channel_assessor;
pub mod engine;
pub mod messages;

pub use channel_assessor::{AssessorState, ChannelAssessorHandle, ChannelEvaluation};
pub use engine::{AssessmentEngine, EngineHandle};
pub use messages::{AssessmentState, EngineCommand};
