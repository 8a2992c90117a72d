pub mod error;
pub mod pipeline;

pub use error::PipelineError;
pub use pipeline::{notifier_params, Pipeline, PipelineState};
