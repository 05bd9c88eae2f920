mod metadata;
mod queue;
mod tables;

pub use metadata::*;
pub use queue::*;
pub use tables::*;
