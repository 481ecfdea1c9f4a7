mod import;
mod snapshot;

pub use import::*;
pub use snapshot::*;
