//! In-memory room state and persisted-room reconciliation

pub mod state;
pub mod store;
pub mod synchronizer;

pub use state::RoomState;
pub use store::{InMemoryRoomStore, RoomDocument, RoomStore};
pub use synchronizer::{GamePhaseProbe, IdleGamePhaseProbe, RoomSynchronizer};
