//! Extract, stage, load
//!
//! The three stages of a run and the orchestration that sequences them.
//! Only the transform stage runs anything concurrently.

mod extract;
mod load;
mod pipe;
mod pipeline;
mod transform;

pub use extract::QueryExtractor;
pub use load::{CopyLoader, CopyStatement};
pub use pipeline::{Pipeline, RunReport};
pub use transform::{StagedObject, StreamingTransform};
