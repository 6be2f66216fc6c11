//! Shared types for the token rotator workspace

mod error;
mod region;
mod secret;

pub use error::{Error, Result};
pub use region::Region;
pub use secret::Secret;
