//! Scorepipe
//!
//! Batch scoring pipeline for financial instruments: normalize raw
//! attributes, compute technical features from price history, score five
//! independent pillars, compose them into a 0-100 composite, apply
//! institutional caps, and publish the results atomically.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        scoring run (per market scope)            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  gate ──► features ──► pillars ──► compose ──► guard ──► stage   │
//! │                                                           │      │
//! │                       production ◄── atomic publish ◄─────┘      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Staging and publish
//! Every run writes into an isolated staging area keyed by run ID.
//! Readers only ever see production tables; a run's output becomes
//! visible all at once when the publish transaction commits, or never.
//!
//! ## Missing data
//! Field absence is `None`, not a sentinel. Metrics, pillar components,
//! and pillars degrade independently; weights renormalize over what is
//! present. Only an instrument with zero computable pillars is a failure.
//!
//! ## Institutional guard
//! The raw composite is advisory; the final score is bounded by a
//! deterministic cap cascade (liquidity tier, penny price, coverage,
//! confidence) with a mandatory audit trail.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod composer;
pub mod confidence;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod features;
pub mod gating;
pub mod guard;
pub mod logging;
pub mod normalize;
pub mod pillars;
pub mod store;
pub mod types;

pub use config::ScoringConfig;
pub use coordinator::RunCoordinator;
pub use engine::{InstrumentInput, RunSummary, ScoreOutcome, ScoringEngine};
pub use error::{Result, ScoreError};
pub use gating::GatingEvaluator;
pub use guard::InstitutionalGuard;
pub use store::{MemoryStore, SqliteStore, SqliteStoreConfig, StagingStore};
pub use types::{GatingResult, Instrument, RawAttributes, ScoreResult};
