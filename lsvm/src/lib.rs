//! Latent SVM training with per-dataset bias correction.
//!
//! Examples are read once, put in canonical order and deduplicated, then collapsed into
//! groups of latent placements sharing one extended label. The trainer runs stochastic
//! subgradient passes over those groups, learning a shared weight vector plus one bias
//! vector per source dataset.

pub mod codec;
pub mod data;
pub mod error;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod training;

pub use error::{LsvmErr, Result};
pub use layout::{Block, BlockLayout, DatasetCounts, Header};
pub use model::{LowerBounds, Model};
pub use pipeline::{RunPaths, RunSummary, run};
pub use training::{ConfigOverrides, TrainConfig, TrainStats, Trainer};
