use crate::{api::RagApi, errors::RegistryError, types::Collection};

/// Read cache of the server's collection list.
///
/// The cache is only ever replaced wholesale by a successful [`refresh`].
/// A failed refresh leaves the previous list in place: failure means the
/// state is unknown, not empty.
///
/// [`refresh`]: CollectionRegistry::refresh
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    cache: Option<Vec<Collection>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refresh(&mut self, api: &dyn RagApi) -> Result<&[Collection], RegistryError> {
        match api.collections().await {
            Ok(collections) => {
                tracing::info!("Registry refreshed, {} collections", collections.len());
                Ok(self.cache.insert(collections).as_slice())
            }
            Err(err) => {
                tracing::warn!("Registry refresh failed: {}", err);
                Err(RegistryError::Unavailable(err))
            }
        }
    }

    /// Deletes on the server. The cache is untouched; callers refresh afterwards.
    pub async fn remove(&self, api: &dyn RagApi, collection_name: &str) -> Result<(), RegistryError> {
        api.delete_collection(collection_name)
            .await
            .map_err(|source| {
                tracing::warn!("Delete of '{}' failed: {}", collection_name, source);
                RegistryError::DeleteFailed {
                    collection_name: collection_name.to_string(),
                    source,
                }
            })?;
        tracing::info!("Deleted collection '{}'", collection_name);
        Ok(())
    }

    /// `None` until the first successful refresh.
    pub fn collections(&self) -> Option<&[Collection]> {
        self.cache.as_deref()
    }

    pub fn find(&self, collection_name: &str) -> Option<&Collection> {
        self.cache
            .as_ref()?
            .iter()
            .find(|c| c.name == collection_name)
    }

    /// First collection carrying `display_name`. Labels may collide, so this is
    /// only a convenience lookup.
    pub fn find_by_display_name(&self, display_name: &str) -> Option<&Collection> {
        self.cache
            .as_ref()?
            .iter()
            .find(|c| c.display_name == display_name)
    }
}
