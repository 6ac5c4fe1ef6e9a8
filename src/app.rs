use std::sync::Arc;

use crate::{
    api::RagApi,
    errors::{RegistryError, SessionError, UploadError},
    registry::CollectionRegistry,
    session::ConversationSession,
    store::HistoryStore,
    types::{ChatMessage, IndexedDocument, UploadSource},
    upload::UploadCoordinator,
};

/// A document the user can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub display_name: String,
    /// `None` for history found only locally.
    pub collection_name: Option<String>,
    pub vectors_count: Option<u64>,
}

/// Wires user commands to the registry, uploads and the active session.
pub struct App {
    api: Arc<dyn RagApi>,
    store: Arc<HistoryStore>,
    registry: CollectionRegistry,
    uploads: UploadCoordinator,
    session: Option<ConversationSession>,
}

impl App {
    pub fn new(api: Arc<dyn RagApi>, store: Arc<HistoryStore>, uploads: UploadCoordinator) -> Self {
        Self {
            api,
            store,
            registry: CollectionRegistry::new(),
            uploads,
            session: None,
        }
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    pub async fn health(&self) -> bool {
        self.api.health().await.is_ok()
    }

    pub async fn refresh(&mut self) -> Result<(), RegistryError> {
        self.registry.refresh(self.api.as_ref()).await?;
        Ok(())
    }

    /// Server collections when known, otherwise the locally stored names
    /// as unbound entries.
    pub fn documents(&self) -> Vec<DocumentEntry> {
        match self.registry.collections() {
            Some(collections) => collections
                .iter()
                .map(|c| DocumentEntry {
                    display_name: c.display_name.clone(),
                    collection_name: Some(c.name.clone()),
                    vectors_count: Some(c.vectors_count),
                })
                .collect(),
            None => self
                .store
                .list_known_names()
                .into_iter()
                .map(|display_name| DocumentEntry {
                    display_name,
                    collection_name: None,
                    vectors_count: None,
                })
                .collect(),
        }
    }

    /// Uploads, refreshes the registry and opens the new document.
    pub async fn upload(&mut self, source: &UploadSource) -> Result<IndexedDocument, UploadError> {
        let doc = self.uploads.run(self.api.as_ref(), source).await?;
        if let Err(err) = self.refresh().await {
            tracing::warn!("Refresh after upload failed: {}", err);
        }
        self.open(&doc.display_name, Some(doc.collection_name.clone()));
        Ok(doc)
    }

    /// Opens `display_name`, bound to the given collection. Without one, a
    /// stored binding the registry still lists wins over the first registry
    /// entry with that label.
    pub fn open(&mut self, display_name: &str, collection_name: Option<String>) -> &ConversationSession {
        let collection_name = collection_name.or_else(|| {
            let stored = self.store.load(display_name).collection_name;
            if let Some(stored) = stored.filter(|name| self.registry.find(name).is_some()) {
                return Some(stored);
            }
            self.registry
                .find_by_display_name(display_name)
                .map(|c| c.name.clone())
        });
        self.session.insert(ConversationSession::bind(
            self.store.clone(),
            display_name,
            collection_name,
        ))
    }

    /// Opens the document behind a collection name.
    pub fn open_collection(&mut self, collection_name: &str) -> Option<&ConversationSession> {
        let display_name = self.registry.find(collection_name)?.display_name.clone();
        Some(self.open(&display_name, Some(collection_name.to_string())))
    }

    /// `Ok(None)` when nothing is open or the question was not sent.
    pub async fn ask(&mut self, question: &str) -> Result<Option<ChatMessage>, SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let reply = session.send(self.api.as_ref(), question).await?;
        Ok(reply.cloned())
    }

    pub fn clear(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.clear();
        }
    }

    /// Deletes the collection and the conversation of its document.
    pub async fn delete(&mut self, collection_name: &str) -> Result<(), RegistryError> {
        let display_name = self
            .registry
            .find(collection_name)
            .map(|c| c.display_name.clone());

        self.registry
            .remove(self.api.as_ref(), collection_name)
            .await?;

        if let Some(display_name) = display_name {
            if let Err(err) = self.store.remove(&display_name) {
                tracing::warn!("Failed to remove history of '{}': {}", display_name, err);
            }
        }
        if self
            .session
            .as_ref()
            .map_or(false, |s| s.collection_name() == Some(collection_name))
        {
            self.session = None;
        }

        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::testing::FakeApi, types::UploadFile};
    use std::time::Duration;

    fn app(api: Arc<FakeApi>) -> (App, Arc<HistoryStore>) {
        let store = Arc::new(HistoryStore::in_memory());
        let app = App::new(
            api,
            store.clone(),
            UploadCoordinator::new(Duration::from_millis(1)),
        );
        (app, store)
    }

    #[tokio::test]
    async fn test_upload_then_ask() {
        let api = Arc::new(
            FakeApi::new().with_answer("What is the termination clause?", "30 days notice."),
        );
        let (mut app, store) = app(api.clone());

        let source = UploadSource::File(UploadFile::new("contract.pdf", b"%PDF".to_vec()));
        let doc = app.upload(&source).await.unwrap();
        assert_eq!(doc.collection_name, "col_42");
        assert_eq!(app.documents().len(), 1);
        assert_eq!(app.session().unwrap().collection_name(), Some("col_42"));

        let reply = app.ask("What is the termination clause?").await.unwrap();
        assert_eq!(reply, Some(ChatMessage::assistant("30 days notice.")));

        let record = store.load("contract.pdf");
        assert_eq!(
            record.messages,
            vec![
                ChatMessage::user("What is the termination clause?"),
                ChatMessage::assistant("30 days notice."),
            ]
        );
        assert_eq!(record.collection_name.as_deref(), Some("col_42"));
    }

    #[tokio::test]
    async fn test_documents_fall_back_to_history() {
        let api = Arc::new(FakeApi::new());
        FakeApi::set(&api.fail_refresh, true);
        let (mut app, store) = app(api);
        store
            .save("old.pdf", &[ChatMessage::user("hi")], None)
            .unwrap();

        assert!(app.refresh().await.is_err());
        assert_eq!(
            app.documents(),
            vec![DocumentEntry {
                display_name: "old.pdf".to_string(),
                collection_name: None,
                vectors_count: None,
            }]
        );

        let session = app.open("old.pdf", None);
        assert!(!session.can_send());
        assert_eq!(app.ask("anything").await, Ok(None));
    }

    #[tokio::test]
    async fn test_open_keeps_listed_stored_binding() {
        let api = Arc::new(
            FakeApi::new()
                .with_collection("col_1", "a.pdf")
                .with_collection("col_2", "a.pdf"),
        );
        let (mut app, store) = app(api);
        app.refresh().await.unwrap();
        store
            .save("a.pdf", &[ChatMessage::user("hi")], Some("col_2"))
            .unwrap();

        let session = app.open("a.pdf", None);
        assert_eq!(session.collection_name(), Some("col_2"));
        assert_eq!(store.load("a.pdf").collection_name.as_deref(), Some("col_2"));
    }

    #[tokio::test]
    async fn test_open_replaces_unlisted_stored_binding() {
        let api = Arc::new(FakeApi::new().with_collection("col_1", "a.pdf"));
        let (mut app, store) = app(api);
        app.refresh().await.unwrap();
        store
            .save("a.pdf", &[ChatMessage::user("hi")], Some("col_gone"))
            .unwrap();

        let session = app.open("a.pdf", None);
        assert_eq!(session.collection_name(), Some("col_1"));
    }

    #[tokio::test]
    async fn test_delete_removes_history_and_session() {
        let api = Arc::new(
            FakeApi::new()
                .with_collection("col_1", "a.pdf")
                .with_collection("col_2", "b.pdf")
                .with_answer("q", "a"),
        );
        let (mut app, store) = app(api.clone());
        app.refresh().await.unwrap();

        app.open_collection("col_1").unwrap();
        app.ask("q").await.unwrap();
        assert!(!store.load("a.pdf").messages.is_empty());

        app.delete("col_1").await.unwrap();
        assert!(app.session().is_none());
        assert!(store.load("a.pdf").messages.is_empty());
        assert_eq!(api.deleted.lock().unwrap().as_slice(), &["col_1".to_string()]);
        assert_eq!(app.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_everything() {
        let api = Arc::new(FakeApi::new().with_collection("col_1", "a.pdf"));
        FakeApi::set(&api.fail_delete, true);
        let (mut app, store) = app(api);
        app.refresh().await.unwrap();
        store
            .save("a.pdf", &[ChatMessage::user("hi")], Some("col_1"))
            .unwrap();
        app.open("a.pdf", None);

        assert!(app.delete("col_1").await.is_err());
        assert!(app.session().is_some());
        assert_eq!(store.load("a.pdf").messages.len(), 1);
    }
}
