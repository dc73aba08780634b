//! Shared application state.

pub mod store;

pub use store::{AlertSnapshot, AppState, ALERT_CHANNEL_CAPACITY};
