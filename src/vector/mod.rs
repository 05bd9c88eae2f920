mod qdrant;
mod store;

pub use qdrant::*;
pub use store::*;
