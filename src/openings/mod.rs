mod catalogue;

pub use catalogue::*;
