pub mod pipeline;

pub use pipeline::{Pipeline, PipelineHandle};
