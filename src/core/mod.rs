// src/core/mod.rs — Frame-sampling & aggregation pipeline

pub mod aggregator;
pub mod analyzer;
pub mod frame;
pub mod orchestrator;
pub mod sampler;
pub mod synthesizer;
pub mod types;
