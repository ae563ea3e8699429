//! Domain types for the advisory pipeline.
//!
//! - `farmer`: what the form submits (FarmerInput, SoilType, PipelineId)
//! - `stage`: the fixed stage list and agent payloads
//! - `pipeline`: the durable record, stage log, and final Advisory

mod farmer;
mod pipeline;
mod stage;

pub use farmer::*;
pub use pipeline::*;
pub use stage::*;
