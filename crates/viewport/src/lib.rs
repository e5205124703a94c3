pub mod engine;
pub mod prefetch;

pub use engine::*;
pub use prefetch::*;
