use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use lapak_core::{Entities, IntentAction};

/// Per-session cap on retained messages.
const HISTORY_CAP: usize = 20;

#[derive(Clone, Debug, PartialEq)]
pub struct SessionMessage {
    pub role: &'static str,
    pub content: String,
    pub action: IntentAction,
}

/// What the conversation is waiting for from this user.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingState {
    Idle,
    /// A slot-filling question is outstanding; the next message from this
    /// user is interpreted as the answer.
    AwaitingSlot { action: IntentAction, slot: String },
}

struct Session {
    messages: Vec<SessionMessage>,
    last_action: IntentAction,
    entities: Entities,
    pending: PendingState,
    last_update: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            last_action: IntentAction::Unknown,
            entities: Entities::new(),
            pending: PendingState::Idle,
            last_update: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_update = Instant::now();
    }
}

/// In-memory conversation state keyed by user id. Sessions idle longer
/// than the TTL are removed by the sweeper.
pub struct ConversationSessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl ConversationSessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    pub async fn append_message(
        &self,
        user_id: &str,
        role: &'static str,
        content: &str,
        action: IntentAction,
    ) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(Session::new);

        session.messages.push(SessionMessage {
            role,
            content: content.to_string(),
            action,
        });
        if session.messages.len() > HISTORY_CAP {
            let excess = session.messages.len() - HISTORY_CAP;
            session.messages.drain(..excess);
        }
        if action != IntentAction::Unknown {
            session.last_action = action;
        }
        session.touch();
    }

    pub async fn recent_messages(&self, user_id: &str, count: usize) -> Vec<SessionMessage> {
        let sessions = self.sessions.read().await;
        sessions
            .get(user_id)
            .map(|session| {
                let start = session.messages.len().saturating_sub(count);
                session.messages[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub async fn last_action(&self, user_id: &str) -> IntentAction {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).map(|session| session.last_action).unwrap_or_default()
    }

    pub async fn entities(&self, user_id: &str) -> Entities {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).map(|session| session.entities.clone()).unwrap_or_default()
    }

    /// Merge freshly extracted entities into the session's accumulated
    /// set. Newer values win per slot.
    pub async fn merge_entities(&self, user_id: &str, update: &Entities) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(Session::new);
        session.entities.merge(update);
        session.touch();
    }

    /// Replace the accumulated entities wholesale. Used when a new task
    /// starts so stale slots from an abandoned one cannot leak in.
    pub async fn replace_entities(&self, user_id: &str, entities: Entities) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(Session::new);
        session.entities = entities;
        session.touch();
    }

    /// Drops accumulated entities and any outstanding question while
    /// keeping the message history.
    pub async fn finish_task(&self, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(user_id) {
            session.entities = Entities::new();
            session.pending = PendingState::Idle;
            session.touch();
        }
    }

    pub async fn pending(&self, user_id: &str) -> PendingState {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).map(|session| session.pending.clone()).unwrap_or(PendingState::Idle)
    }

    pub async fn set_pending(&self, user_id: &str, pending: PendingState) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(Session::new);
        session.pending = pending;
        session.touch();
    }

    /// Drops the session entirely, including accumulated entities.
    pub async fn clear(&self, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(user_id);
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Removes sessions idle past the TTL. Returns how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, session| session.last_update.elapsed() < ttl);
        let swept = before - sessions.len();
        if swept > 0 {
            debug!(swept, remaining = sessions.len(), "swept expired sessions");
        }
        swept
    }

    /// Background task sweeping expired sessions on a fixed interval.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use lapak_core::EntityValue;

    use super::*;

    fn store() -> ConversationSessionStore {
        ConversationSessionStore::new(Duration::from_secs(30 * 60))
    }

    #[tokio::test]
    async fn history_is_capped_at_twenty_messages() {
        let store = store();
        for turn in 0..25 {
            store
                .append_message("u-1", "user", &format!("pesan {turn}"), IntentAction::Unknown)
                .await;
        }

        let recent = store.recent_messages("u-1", 50).await;
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].content, "pesan 5");
        assert_eq!(recent[19].content, "pesan 24");
    }

    #[tokio::test]
    async fn unknown_actions_do_not_overwrite_last_action() {
        let store = store();
        store.append_message("u-1", "user", "laku nasi", IntentAction::RecordSale).await;
        store.append_message("u-1", "user", "hmm", IntentAction::Unknown).await;

        assert_eq!(store.last_action("u-1").await, IntentAction::RecordSale);
    }

    #[tokio::test]
    async fn entities_accumulate_across_turns() {
        let store = store();

        let mut first = Entities::new();
        first.insert("product", EntityValue::Text("beras".to_string()));
        store.merge_entities("u-1", &first).await;

        let mut second = Entities::new();
        second.insert("qty", EntityValue::Number(25.0));
        store.merge_entities("u-1", &second).await;

        let merged = store.entities("u-1").await;
        assert_eq!(merged.text("product"), Some("beras"));
        assert_eq!(merged.number("qty"), Some(25.0));
    }

    #[tokio::test]
    async fn pending_state_round_trips() {
        let store = store();
        assert_eq!(store.pending("u-1").await, PendingState::Idle);

        store
            .set_pending(
                "u-1",
                PendingState::AwaitingSlot {
                    action: IntentAction::OrderRestock,
                    slot: "max_price".to_string(),
                },
            )
            .await;

        assert_eq!(
            store.pending("u-1").await,
            PendingState::AwaitingSlot {
                action: IntentAction::OrderRestock,
                slot: "max_price".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn clear_drops_all_session_state() {
        let store = store();
        store.append_message("u-1", "user", "halo", IntentAction::Greeting).await;
        store.clear("u-1").await;

        assert!(store.recent_messages("u-1", 10).await.is_empty());
        assert_eq!(store.pending("u-1").await, PendingState::Idle);
    }

    #[tokio::test]
    async fn sweep_removes_idle_sessions_only() {
        let store = ConversationSessionStore::new(Duration::from_millis(10));
        store.append_message("stale", "user", "halo", IntentAction::Greeting).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.append_message("fresh", "user", "halo", IntentAction::Greeting).await;

        let swept = store.sweep_expired().await;
        assert_eq!(swept, 1);
        assert!(store.recent_messages("stale", 10).await.is_empty());
        assert_eq!(store.recent_messages("fresh", 10).await.len(), 1);
    }
}
