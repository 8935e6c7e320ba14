pub mod factory;
pub mod pipeline;
pub mod signal;
pub mod supervisor;

pub use factory::{OnvifPipelineFactory, PipelineFactory};
pub use pipeline::Pipeline;
pub use signal::{ShutdownController, ShutdownSignal};
pub use supervisor::Supervisor;
