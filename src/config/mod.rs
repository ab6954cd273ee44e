// src/config/mod.rs
pub mod ai;
pub mod pipeline;

pub use ai::ModelConfig;
pub use pipeline::{
    ContractConfig, GenerationConfig, HistoryConfig, LoopLimits, PipelineConfig, SignalConfig,
    StoreConfig,
};
