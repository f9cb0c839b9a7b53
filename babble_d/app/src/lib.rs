pub mod capture;
pub mod dispatcher;
pub mod inference;
pub mod osc;
pub mod pipeline;
pub mod setup;
pub mod sources;

pub use dispatcher::ParameterDispatcher;
pub use inference::{InferenceRunner, OrtInferenceRunner};
pub use pipeline::{ProcessingPipeline, SourceFactory, TickOutput};
