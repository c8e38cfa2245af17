//! Conversation-scoped answering
//!
//! Reads the recent history of one conversation from the store, answers the
//! utterance, and appends the exchange back to that conversation only.

use crate::pipeline::{AnswerResponse, RagPipeline, TurnContext};
use finchat_common::conversation::{ConversationId, ConversationMessage, ConversationStore};
use finchat_common::errors::Result;
use std::sync::Arc;

pub struct ConversationService {
    pipeline: Arc<RagPipeline>,
    store: Arc<dyn ConversationStore>,
    history_window: usize,
}

impl ConversationService {
    pub fn new(pipeline: Arc<RagPipeline>, store: Arc<dyn ConversationStore>, history_window: usize) -> Self {
        Self {
            pipeline,
            store,
            history_window,
        }
    }

    /// Answer `utterance` within `conversation_id`.
    ///
    /// Pipeline failures are already folded into the fallback message; only
    /// store failures are returned as errors.
    pub async fn reply(&self, conversation_id: ConversationId, utterance: &str) -> Result<AnswerResponse> {
        let history = self.store.history(conversation_id, self.history_window).await?;
        let turn = TurnContext::new(conversation_id);

        let response = self.pipeline.answer(&turn, utterance, &history).await;

        self.store
            .append(
                conversation_id,
                vec![
                    ConversationMessage::user(utterance),
                    ConversationMessage::assistant(response.message.clone()),
                ],
            )
            .await?;

        Ok(response)
    }
}
