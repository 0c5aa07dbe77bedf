//! Async service wrappers shared by clients.

mod store;

pub use store::StoreHandle;
