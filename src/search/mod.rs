mod executor;
mod intent;
mod plan;

pub use executor::*;
pub use intent::*;
pub use plan::*;
