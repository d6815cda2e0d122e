use std::sync::Arc;

use tracing::debug;

use lapak_core::slots::{first_missing, parse_slot_reply, prompt_for, SlotPrompt};
use lapak_core::{Entities, Intent, IntentAction};

use crate::session::{ConversationSessionStore, PendingState};

/// Outcome of one slot-filling step.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotDisposition {
    /// Every required slot is filled; the action can run.
    Complete { action: IntentAction, entities: Entities },
    /// A slot is still missing; ask the user and wait for the answer.
    Ask { action: IntentAction, slot: &'static str, prompt: SlotPrompt },
}

/// Drives the ask-answer loop for intents with required slots. State lives
/// in the session store so the loop survives across messages.
pub struct SlotResolver {
    sessions: Arc<ConversationSessionStore>,
}

impl SlotResolver {
    pub fn new(sessions: Arc<ConversationSessionStore>) -> Self {
        Self { sessions }
    }

    /// Start slot filling for a freshly extracted intent. The session's
    /// accumulated entities are replaced; a new task never inherits slots
    /// from an abandoned one.
    pub async fn begin(&self, user_id: &str, intent: &Intent) -> SlotDisposition {
        self.sessions.replace_entities(user_id, intent.entities.clone()).await;
        self.advance(user_id, intent.action).await
    }

    /// Interpret a follow-up message as the answer to the outstanding
    /// question. An unparseable reply re-asks the same question.
    pub async fn resume(
        &self,
        user_id: &str,
        action: IntentAction,
        slot: &str,
        reply: &str,
    ) -> SlotDisposition {
        match parse_slot_reply(slot, reply) {
            Some(value) => {
                let mut update = Entities::new();
                update.insert(slot, value);
                self.sessions.merge_entities(user_id, &update).await;
                self.advance(user_id, action).await
            }
            None => {
                debug!(user_id, slot, "follow-up reply did not fill the slot, re-asking");
                let entities = self.sessions.entities(user_id).await;
                let prompt = prompt_for(action, slot, &entities);
                // Pending state is unchanged; same slot, same question.
                let slot = leak_free_slot_name(action, slot);
                SlotDisposition::Ask { action, slot, prompt }
            }
        }
    }

    async fn advance(&self, user_id: &str, action: IntentAction) -> SlotDisposition {
        let entities = self.sessions.entities(user_id).await;

        match first_missing(action, &entities) {
            None => {
                self.sessions.set_pending(user_id, PendingState::Idle).await;
                SlotDisposition::Complete { action, entities }
            }
            Some(slot) => {
                let prompt = prompt_for(action, slot, &entities);
                self.sessions
                    .set_pending(
                        user_id,
                        PendingState::AwaitingSlot { action, slot: slot.to_string() },
                    )
                    .await;
                SlotDisposition::Ask { action, slot, prompt }
            }
        }
    }
}

/// Maps a runtime slot name back to its static counterpart. Pending state
/// stores owned strings; dispositions carry the canonical `&'static str`.
fn leak_free_slot_name(action: IntentAction, slot: &str) -> &'static str {
    lapak_core::slots::required_slots(action)
        .iter()
        .copied()
        .find(|known| *known == slot)
        .unwrap_or("product")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lapak_core::slots::{SLOT_MAX_PRICE, SLOT_PRICE, SLOT_PRODUCT, SLOT_QTY};
    use lapak_core::{EntityValue, Language, Sentiment};

    use super::*;

    fn resolver() -> (SlotResolver, Arc<ConversationSessionStore>) {
        let sessions = Arc::new(ConversationSessionStore::new(Duration::from_secs(1800)));
        (SlotResolver::new(sessions.clone()), sessions)
    }

    fn intent(action: IntentAction, pairs: &[(&str, EntityValue)]) -> Intent {
        let mut entities = Entities::new();
        for (slot, value) in pairs {
            entities.insert(*slot, value.clone());
        }
        Intent {
            action,
            entities,
            sentiment: Sentiment::Neutral,
            language: Language::Id,
            raw_text: String::new(),
        }
    }

    #[tokio::test]
    async fn complete_intent_passes_straight_through() {
        let (resolver, _) = resolver();
        let full = intent(
            IntentAction::OrderRestock,
            &[
                (SLOT_PRODUCT, EntityValue::Text("beras".to_string())),
                (SLOT_QTY, EntityValue::Number(25.0)),
                (SLOT_MAX_PRICE, EntityValue::Number(12000.0)),
            ],
        );

        match resolver.begin("u-1", &full).await {
            SlotDisposition::Complete { action, entities } => {
                assert_eq!(action, IntentAction::OrderRestock);
                assert_eq!(entities.number(SLOT_MAX_PRICE), Some(12000.0));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_slot_asks_and_sets_pending() {
        let (resolver, sessions) = resolver();
        let partial = intent(
            IntentAction::RecordSale,
            &[(SLOT_PRODUCT, EntityValue::Text("nasi goreng".to_string()))],
        );

        match resolver.begin("u-1", &partial).await {
            SlotDisposition::Ask { slot, prompt, .. } => {
                assert_eq!(slot, SLOT_QTY);
                assert!(prompt.question.contains("nasi goreng"));
            }
            other => panic!("expected a question, got {other:?}"),
        }

        assert_eq!(
            sessions.pending("u-1").await,
            PendingState::AwaitingSlot {
                action: IntentAction::RecordSale,
                slot: SLOT_QTY.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn answers_walk_through_remaining_slots_in_order() {
        let (resolver, _) = resolver();
        let partial = intent(IntentAction::RecordSale, &[]);

        let first = resolver.begin("u-1", &partial).await;
        assert!(matches!(first, SlotDisposition::Ask { slot: SLOT_PRODUCT, .. }));

        let second =
            resolver.resume("u-1", IntentAction::RecordSale, SLOT_PRODUCT, "nasi goreng").await;
        assert!(matches!(second, SlotDisposition::Ask { slot: SLOT_QTY, .. }));

        let third = resolver.resume("u-1", IntentAction::RecordSale, SLOT_QTY, "10 porsi").await;
        assert!(matches!(third, SlotDisposition::Ask { slot: SLOT_PRICE, .. }));

        match resolver.resume("u-1", IntentAction::RecordSale, SLOT_PRICE, "15rb").await {
            SlotDisposition::Complete { entities, .. } => {
                assert_eq!(entities.text(SLOT_PRODUCT), Some("nasi goreng"));
                assert_eq!(entities.number(SLOT_QTY), Some(10.0));
                assert_eq!(entities.number(SLOT_PRICE), Some(15000.0));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_reply_re_asks_same_slot() {
        let (resolver, sessions) = resolver();
        let partial = intent(
            IntentAction::OrderRestock,
            &[
                (SLOT_PRODUCT, EntityValue::Text("beras".to_string())),
                (SLOT_QTY, EntityValue::Number(25.0)),
            ],
        );
        resolver.begin("u-1", &partial).await;

        match resolver.resume("u-1", IntentAction::OrderRestock, SLOT_MAX_PRICE, "terserah").await {
            SlotDisposition::Ask { slot, .. } => assert_eq!(slot, SLOT_MAX_PRICE),
            other => panic!("expected a re-ask, got {other:?}"),
        }

        // Pending state still points at the same slot.
        assert_eq!(
            sessions.pending("u-1").await,
            PendingState::AwaitingSlot {
                action: IntentAction::OrderRestock,
                slot: SLOT_MAX_PRICE.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn new_task_does_not_inherit_old_slots() {
        let (resolver, _) = resolver();
        let sale = intent(
            IntentAction::RecordSale,
            &[(SLOT_PRODUCT, EntityValue::Text("nasi".to_string()))],
        );
        resolver.begin("u-1", &sale).await;

        let restock = intent(IntentAction::OrderRestock, &[]);
        match resolver.begin("u-1", &restock).await {
            SlotDisposition::Ask { slot, .. } => assert_eq!(slot, SLOT_PRODUCT),
            other => panic!("expected product question, got {other:?}"),
        }
    }
}
