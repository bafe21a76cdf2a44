//! Event fan-out: best-effort delivery to resolved audiences, and the
//! online-push vs. durable-record notification split.

pub mod broadcast;
pub mod notify;
