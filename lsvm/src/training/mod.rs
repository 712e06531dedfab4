mod cache;
mod config;
mod trainer;

pub use cache::{INCACHE, SmallCache, WAIT};
pub use config::{ConfigOverrides, ITER, TrainConfig};
pub use trainer::{TrainStats, Trainer, generate_rng};
