//! Friend graph read access and the friend-request state machine.

pub mod graph;
pub mod requests;

pub use graph::FriendGraphQuery;
pub use requests::FriendRequestWorkflow;
