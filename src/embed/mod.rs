mod embedder;
mod openai;
mod pool;
mod worker;

pub use embedder::*;
pub use openai::*;
pub use pool::*;
pub use worker::*;
