// GitHub record module.
// Typed upstream data that callers cache; fetching it is the caller's concern.

pub mod types;

pub use types::*;
