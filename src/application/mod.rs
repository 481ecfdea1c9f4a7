// Application layer - use cases shared by the CLI and the HTTP API.

pub mod error;
mod payouts;
mod renewal;
pub mod service;

pub use error::*;
pub use payouts::*;
pub use renewal::*;
pub use service::*;
