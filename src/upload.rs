use std::time::Duration;
use tokio::sync::watch;

use crate::{
    api::RagApi,
    errors::{ApiError, UploadError},
    types::{IndexedDocument, UploadSource},
};

// Estimates never reach this value; only a finished upload shows 100.
const ESTIMATE_CEILING: u8 = 95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading { display_name: String },
    Indexed(IndexedDocument),
    Failed(String),
}

/// Proof that [`UploadCoordinator::begin`] accepted an upload.
#[derive(Debug)]
pub struct UploadTicket {
    display_name: String,
}

/// Drives one upload-and-index request at a time.
///
/// Progress before the server answers is a heuristic for the user, it says
/// nothing about how far indexing actually got.
pub struct UploadCoordinator {
    state: UploadState,
    progress: watch::Sender<u8>,
    tick: Duration,
}

impl UploadCoordinator {
    pub fn new(tick: Duration) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            state: UploadState::Idle,
            progress,
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub fn begin(&mut self, source: &UploadSource) -> Result<UploadTicket, UploadError> {
        if matches!(self.state, UploadState::Uploading { .. }) {
            return Err(UploadError::AlreadyInProgress);
        }
        let display_name = source.display_name();
        if display_name.trim().is_empty() {
            return Err(UploadError::MissingFile);
        }
        if let UploadSource::File(file) = source {
            if file.bytes.is_empty() {
                return Err(UploadError::MissingFile);
            }
        }

        tracing::info!("Uploading '{}'", display_name);
        self.state = UploadState::Uploading {
            display_name: display_name.to_string(),
        };
        self.progress.send_replace(0);
        Ok(UploadTicket {
            display_name: display_name.to_string(),
        })
    }

    /// Moves the estimate a fraction of the remaining way to the ceiling.
    pub fn advance(&mut self) {
        if !matches!(self.state, UploadState::Uploading { .. }) {
            return;
        }
        self.progress.send_modify(|p| {
            if *p < ESTIMATE_CEILING {
                let step = ((ESTIMATE_CEILING - *p) / 10).max(1);
                *p = (*p + step).min(ESTIMATE_CEILING);
            }
        });
    }

    pub fn finish(
        &mut self,
        ticket: UploadTicket,
        outcome: Result<String, ApiError>,
    ) -> Result<IndexedDocument, UploadError> {
        match outcome {
            Ok(collection_name) => {
                tracing::info!("Indexed '{}' as '{}'", ticket.display_name, collection_name);
                let doc = IndexedDocument {
                    display_name: ticket.display_name,
                    collection_name,
                };
                self.state = UploadState::Indexed(doc.clone());
                self.progress.send_replace(100);
                Ok(doc)
            }
            Err(err) => {
                tracing::warn!("Upload of '{}' failed: {}", ticket.display_name, err);
                self.state = UploadState::Failed(err.to_string());
                self.progress.send_replace(0);
                Err(UploadError::Failed(err))
            }
        }
    }

    /// Uploads `source` and ticks the progress estimate until the server answers.
    pub async fn run(
        &mut self,
        api: &dyn RagApi,
        source: &UploadSource,
    ) -> Result<IndexedDocument, UploadError> {
        let ticket = self.begin(source)?;

        let request = async {
            match source {
                UploadSource::File(file) => api.upload(file).await,
                UploadSource::Url(url) => api.index_url(url).await,
            }
        };
        tokio::pin!(request);

        let mut ticker = tokio::time::interval(self.tick);
        ticker.tick().await;
        let outcome = loop {
            tokio::select! {
                outcome = &mut request => break outcome,
                _ = ticker.tick() => self.advance(),
            }
        };

        self.finish(ticket, outcome)
    }
}
