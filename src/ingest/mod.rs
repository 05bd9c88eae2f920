mod controller;
mod precheck;

pub use controller::*;
pub use precheck::*;
