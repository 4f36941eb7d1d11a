//! Service coordination and application state

pub mod app;

pub use app::{AppState, ServiceBackends};
