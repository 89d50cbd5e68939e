pub mod catalog;
pub mod context;
pub mod criteria;
pub mod database;
pub mod extractor;
pub mod llm;
pub mod pipeline;
pub mod preference;
pub mod reason;
pub mod settings;

pub use pipeline::{ProcessingMode, RecommendationOrchestrator, RecommendationResult, ResultKind};
