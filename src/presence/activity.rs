//! Per-user two-stage idle timeout.
//!
//! Every online user has exactly one activity record holding two scheduled
//! tasks: a warning pushed at `idle - warning_lead` and a forced disconnect
//! at `idle`. Qualifying activity cancels both and restarts the cycle from
//! zero. The forced disconnect only closes the transport; presence and the
//! activity record are cleared through the normal disconnect path, not here.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{ConnectionRegistry, UserId};
use crate::fanout::broadcast::{force_close_user, send_to_user};
use crate::ws::protocol::ServerEvent;

/// Close code for a forced inactivity disconnect.
pub const CLOSE_IDLE_TIMEOUT: u16 = 4005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    Active,
    /// The warning has been pushed. Informational only — timer arithmetic
    /// is unaffected.
    WarningIssued,
}

struct ActivityRecord {
    last_activity: Instant,
    phase: IdlePhase,
    warning: JoinHandle<()>,
    disconnect: JoinHandle<()>,
}

impl ActivityRecord {
    fn cancel(&self) {
        self.warning.abort();
        self.disconnect.abort();
    }
}

pub struct ActivityMonitor {
    registry: Arc<ConnectionRegistry>,
    /// Shared with the spawned timer tasks.
    records: Arc<DashMap<UserId, ActivityRecord>>,
    /// Inactivity span after which the user is forcibly disconnected.
    idle_timeout: Duration,
    /// How long before the disconnect the warning fires (also the
    /// remaining time reported in the warning event).
    warning_lead: Duration,
}

impl ActivityMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        idle_timeout: Duration,
        warning_lead: Duration,
    ) -> Self {
        Self {
            registry,
            records: Arc::new(DashMap::new()),
            idle_timeout,
            warning_lead: warning_lead.min(idle_timeout),
        }
    }

    /// Record qualifying activity: cancel any pending warning/disconnect
    /// tasks and restart the two-stage cycle from now.
    pub fn touch(&self, user_id: &str) {
        let warning = self.spawn_warning(user_id);
        let disconnect = self.spawn_disconnect(user_id);

        let record = ActivityRecord {
            last_activity: Instant::now(),
            phase: IdlePhase::Active,
            warning,
            disconnect,
        };
        if let Some(previous) = self.records.insert(user_id.to_string(), record) {
            previous.cancel();
        }
    }

    /// Drop the user's record and cancel outstanding tasks. Called whenever
    /// the user's presence entry is removed, regardless of timer phase.
    pub fn discard(&self, user_id: &str) {
        if let Some((_, record)) = self.records.remove(user_id) {
            record.cancel();
            tracing::debug!(user_id = %user_id, "activity record discarded");
        }
    }

    pub fn is_tracked(&self, user_id: &str) -> bool {
        self.records.contains_key(user_id)
    }

    pub fn phase_of(&self, user_id: &str) -> Option<IdlePhase> {
        self.records.get(user_id).map(|r| r.phase)
    }

    pub fn idle_for(&self, user_id: &str) -> Option<Duration> {
        self.records
            .get(user_id)
            .map(|r| r.last_activity.elapsed())
    }

    fn spawn_warning(&self, user_id: &str) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let records = self.records.clone();
        let user_id = user_id.to_string();
        // Deadline fixed now, not at first poll: the cycle starts at the
        // touch instant.
        let deadline = Instant::now() + (self.idle_timeout - self.warning_lead);
        let time_left = self.warning_lead.as_secs();

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            tracing::info!(user_id = %user_id, time_left_secs = time_left, "inactivity warning");
            send_to_user(
                &registry,
                &user_id,
                &ServerEvent::InactivityWarning { time_left },
            );
            if let Some(mut record) = records.get_mut(&user_id) {
                record.phase = IdlePhase::WarningIssued;
            }
        })
    }

    fn spawn_disconnect(&self, user_id: &str) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let user_id = user_id.to_string();
        let deadline = Instant::now() + self.idle_timeout;

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            tracing::info!(user_id = %user_id, "forcing disconnect after inactivity");
            send_to_user(&registry, &user_id, &ServerEvent::InactivityDisconnect);
            force_close_user(
                &registry,
                &user_id,
                CLOSE_IDLE_TIMEOUT,
                "Disconnected due to inactivity",
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::Connection;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    const IDLE: Duration = Duration::from_secs(3600);
    const WARN: Duration = Duration::from_secs(1800);

    fn setup() -> (
        Arc<ConnectionRegistry>,
        Arc<ActivityMonitor>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(Connection::new("c1".into(), "u1".into(), tx));
        let monitor = Arc::new(ActivityMonitor::new(registry.clone(), IDLE, WARN));
        (registry, monitor, rx)
    }

    async fn advance(duration: Duration) {
        tokio::time::advance(duration).await;
        // Let the woken timer tasks run to completion.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn drain_types(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Message::Text(text) => {
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    types.push(value["type"].as_str().unwrap_or("").to_string());
                }
                Message::Close(_) => types.push("close".to_string()),
                _ => {}
            }
        }
        types
    }

    #[tokio::test(start_paused = true)]
    async fn no_warning_before_threshold() {
        let (_registry, monitor, mut rx) = setup();
        monitor.touch("u1");

        advance(Duration::from_secs(1799)).await;
        assert!(drain_types(&mut rx).is_empty());
        assert_eq!(monitor.phase_of("u1"), Some(IdlePhase::Active));
        // Paused clock: idle time is exactly the advanced span.
        assert_eq!(monitor.idle_for("u1"), Some(Duration::from_secs(1799)));
        assert_eq!(monitor.idle_for("ghost"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_then_disconnect_on_schedule() {
        let (_registry, monitor, mut rx) = setup();
        monitor.touch("u1");

        advance(Duration::from_secs(1800)).await;
        let types = drain_types(&mut rx);
        assert_eq!(types, vec!["inactivityWarning"]);
        assert_eq!(monitor.phase_of("u1"), Some(IdlePhase::WarningIssued));

        advance(Duration::from_secs(1800)).await;
        let types = drain_types(&mut rx);
        assert_eq!(types, vec!["inactivityDisconnect", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_payload_reports_remaining_time() {
        let (_registry, monitor, mut rx) = setup();
        monitor.touch("u1");

        advance(Duration::from_secs(1800)).await;
        let msg = rx.try_recv().unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["timeLeft"].as_u64(), Some(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_restarts_the_cycle() {
        let (_registry, monitor, mut rx) = setup();
        monitor.touch("u1");

        // Past the warning, then activity at 45:00 resets everything.
        advance(Duration::from_secs(2700)).await;
        assert_eq!(drain_types(&mut rx), vec!["inactivityWarning"]);
        monitor.touch("u1");

        // Old disconnect (would fire at 60:00) must not fire.
        advance(Duration::from_secs(1799)).await;
        assert!(drain_types(&mut rx).is_empty());

        // New cycle: warning at 45:00 + 30:00, disconnect at 45:00 + 60:00.
        advance(Duration::from_secs(1)).await;
        assert_eq!(drain_types(&mut rx), vec!["inactivityWarning"]);
        advance(Duration::from_secs(1800)).await;
        assert_eq!(drain_types(&mut rx), vec!["inactivityDisconnect", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_cancels_pending_tasks() {
        let (_registry, monitor, mut rx) = setup();
        monitor.touch("u1");
        monitor.discard("u1");
        assert!(!monitor.is_tracked("u1"));

        advance(IDLE + Duration::from_secs(60)).await;
        assert!(drain_types(&mut rx).is_empty());
    }
}
