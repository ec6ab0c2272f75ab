//! Consensus pick pipeline.
//!
//! Wires the quality scorer, perspective engine, consensus builder, ensemble
//! predictor and regime guardrail into one deterministic run, plus async
//! snapshot collection for hosts that fetch inputs over the network.

pub mod blending;
pub mod collector;
pub mod pipeline;
pub mod summary;

pub use blending::{Blender, RankedPick, NEUTRAL_PROBABILITY};
pub use collector::{CollectedSnapshots, SnapshotCollector};
pub use pipeline::{ConsensusPipeline, RunOutput};
pub use summary::RunSummary;
