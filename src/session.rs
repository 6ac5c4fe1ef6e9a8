use std::sync::Arc;

use crate::{
    api::RagApi,
    errors::{ApiError, SessionError},
    store::HistoryStore,
    types::{Answer, ChatMessage},
};

const INTERRUPTED: &str = "Request interrupted before an answer arrived";

/// A question whose placeholder is in the log and whose answer is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub id: String,
    pub question: String,
    pub collection_name: String,
}

/// The active conversation for one `(display name, collection)` pair.
///
/// Every mutation of a non-empty log is written through to the store before
/// the call returns. At most one question is in flight; its placeholder is
/// found again through a session-scoped id.
pub struct ConversationSession {
    store: Arc<HistoryStore>,
    display_name: String,
    collection_name: Option<String>,
    messages: Vec<ChatMessage>,
    pending: Option<String>,
    next_id: u64,
}

impl ConversationSession {
    /// Loads the stored conversation. A supplied `collection_name` wins over
    /// the stored binding.
    pub fn bind(
        store: Arc<HistoryStore>,
        display_name: impl Into<String>,
        collection_name: Option<String>,
    ) -> Self {
        let display_name = display_name.into();
        let record = store.load(&display_name);
        let collection_name = collection_name.or(record.collection_name);

        let mut session = Self {
            store,
            display_name,
            collection_name,
            messages: record.messages,
            pending: None,
            next_id: 0,
        };
        if session.settle_interrupted() {
            session.persist();
        }

        tracing::debug!(
            "Bound '{}' to {:?} with {} messages",
            session.display_name,
            session.collection_name,
            session.messages.len()
        );
        session
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_sending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether input should be enabled.
    pub fn can_send(&self) -> bool {
        self.collection_name.is_some() && self.pending.is_none()
    }

    /// Attaches a collection to this conversation, e.g. to recover a legacy record.
    pub fn rebind(&mut self, collection_name: impl Into<String>) {
        self.collection_name = Some(collection_name.into());
        self.persist();
    }

    /// Appends the question and its placeholder.
    ///
    /// Returns `Ok(None)` without touching the log when the question is blank
    /// or the session is unbound.
    pub fn begin_send(&mut self, question: &str) -> Result<Option<PendingQuestion>, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::SendInProgress);
        }
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }
        let Some(collection_name) = self.collection_name.clone() else {
            return Ok(None);
        };

        self.next_id += 1;
        let id = format!("pending-{}", self.next_id);
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::placeholder(id.clone()));
        self.pending = Some(id.clone());
        self.persist();

        tracing::info!("Asking '{}' about '{}'", question, collection_name);
        Ok(Some(PendingQuestion {
            id,
            question: question.to_string(),
            collection_name,
        }))
    }

    /// Replaces the placeholder in place with the answer or a failure message.
    ///
    /// If the placeholder is gone (the log was cleared meanwhile) the outcome
    /// is dropped.
    pub fn complete(
        &mut self,
        pending: &PendingQuestion,
        outcome: Result<Answer, ApiError>,
    ) -> Option<&ChatMessage> {
        if self.pending.as_deref() == Some(pending.id.as_str()) {
            self.pending = None;
        }

        let Some(index) = self
            .messages
            .iter()
            .position(|m| m.id.as_deref() == Some(pending.id.as_str()))
        else {
            tracing::debug!("Dropping answer for vanished placeholder {}", pending.id);
            return None;
        };

        self.messages[index] = match outcome {
            Ok(reply) => ChatMessage::assistant(reply.answer).with_pages(reply.pages),
            Err(err) => {
                tracing::warn!("Question '{}' failed: {}", pending.question, err);
                ChatMessage::failure(err)
            }
        };
        self.persist();
        self.messages.get(index)
    }

    /// Asks `question` and resolves its placeholder with the outcome.
    pub async fn send(
        &mut self,
        api: &dyn RagApi,
        question: &str,
    ) -> Result<Option<&ChatMessage>, SessionError> {
        let Some(pending) = self.begin_send(question)? else {
            return Ok(None);
        };
        let outcome = api.ask(&pending.question, &pending.collection_name).await;
        Ok(self.complete(&pending, outcome))
    }

    /// Empties the log and stores the empty state right away.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending = None;
        if let Err(err) = self.store.save(
            &self.display_name,
            &self.messages,
            self.collection_name.as_deref(),
        ) {
            tracing::warn!("Failed to persist cleared '{}': {}", self.display_name, err);
        }
    }

    fn persist(&self) {
        if self.messages.is_empty() {
            return;
        }
        if let Err(err) = self.store.save(
            &self.display_name,
            &self.messages,
            self.collection_name.as_deref(),
        ) {
            tracing::warn!("Failed to persist '{}': {}", self.display_name, err);
        }
    }

    // Placeholders only survive a reload if the process died mid-question.
    fn settle_interrupted(&mut self) -> bool {
        let mut changed = false;
        for message in self.messages.iter_mut().filter(|m| m.loading) {
            *message = ChatMessage::failure(INTERRUPTED);
            changed = true;
        }
        changed
    }
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("display_name", &self.display_name)
            .field("collection_name", &self.collection_name)
            .field("messages", &self.messages.len())
            .field("pending", &self.pending)
            .finish()
    }
}
