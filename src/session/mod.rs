//! Live session tracking and room-scoped event fan-out

pub mod broadcast;
pub mod registry;

pub use broadcast::{BroadcastOptions, Broadcaster, RecordingBroadcaster, SessionBroadcaster};
pub use registry::{ConnectionState, EventSink, PlayerSession, SessionRegistry, SweptSession};
