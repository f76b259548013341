pub mod domain;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod store;
