pub mod classify;
pub mod config;
pub mod highlight;
pub mod inspect;
pub mod layout;
pub mod metadata;
pub mod paginate;
pub mod pdf;
pub mod pretty;
pub mod render;
pub mod search;
pub mod shellout;
pub mod store;
#[cfg(test)]
mod testing;

pub use config::InspectorConfig;
pub use inspect::{InspectedBody, Inspector};
pub use store::{FsBlobStore, MemoryBlobStore};
