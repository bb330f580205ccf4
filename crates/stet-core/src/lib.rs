pub mod clock;
pub mod config;
pub mod error;
pub mod lockfile;
pub mod model;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::Store;
