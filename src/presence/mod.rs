//! In-memory live-connection state: who is online, which rooms each
//! connection has joined, and per-user idle tracking.
//!
//! Each table is owned by exactly one component and injected by reference
//! into its consumers; there are no process-wide singletons.

pub mod activity;
pub mod registry;
pub mod rooms;

pub use activity::ActivityMonitor;
pub use registry::{Connection, ConnectionRegistry, Transition};
pub use rooms::RoomPresenceTracker;

pub type UserId = String;
pub type ConnId = String;
pub type RoomId = String;
