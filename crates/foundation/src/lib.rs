pub mod bounds;
pub mod geo;
pub mod pixel;
pub mod time;
pub mod viewport;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use geo::*;
pub use pixel::*;
pub use time::*;
pub use viewport::*;
