pub mod combinators;
pub mod lanes;
pub mod processor;
pub mod worker;

pub use processor::{ActionProcessor, DEFAULT_VIDEO_EVENT_BUFFER, ResultStream};
