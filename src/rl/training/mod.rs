//! Training Infrastructure
//!
//! Learning loop and checkpointing.

pub mod checkpointing;
pub mod trainer;

pub use checkpointing::{Checkpointer, EngineSnapshot};
pub use trainer::{LearnReport, LearningLoop, TrainingStats};
