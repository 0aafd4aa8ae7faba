//! Data models

pub mod draft;
pub mod session;
pub mod violation;

pub use draft::*;
pub use session::*;
pub use violation::*;
