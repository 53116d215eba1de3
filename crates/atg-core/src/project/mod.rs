//! Project Builder and Processor: the two stages that
//! turn a Manage project plus a set of impacted environments into
//! updated, baselined test scripts.

pub mod builder;
pub mod processor;

pub use builder::{Builder, BuilderOptions};
pub use processor::{Processor, ProcessorConfig};
