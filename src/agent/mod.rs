mod cache;
mod client;
mod evaluator;
mod telemetry;

pub use cache::*;
pub use client::*;
pub use evaluator::*;
pub use telemetry::*;
