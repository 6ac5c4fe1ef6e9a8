use async_trait::async_trait;
use reqwest::{
    header::{HeaderName, HeaderValue},
    multipart::{Form, Part},
    Client, RequestBuilder, Response, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    cfg::Configuration,
    errors::ApiError,
    types::{Answer, Collection, UploadFile},
};

/// The backend's HTTP contract.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Uploads a PDF and returns the collection it was indexed into.
    async fn upload(&self, file: &UploadFile) -> Result<String, ApiError>;

    /// Indexes a web page and returns its collection.
    async fn index_url(&self, url: &str) -> Result<String, ApiError>;

    async fn ask(&self, question: &str, collection_name: &str) -> Result<Answer, ApiError>;

    async fn collections(&self) -> Result<Vec<Collection>, ApiError>;

    async fn delete_collection(&self, collection_name: &str) -> Result<(), ApiError>;

    async fn health(&self) -> Result<(), ApiError>;
}

#[derive(Serialize, Debug)]
pub struct RagReq<'a> {
    pub question: &'a str,
    pub collection_name: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct RagResp {
    pub answer: String,
    /// Page of each retrieved chunk, null when the source has no pages.
    #[serde(default)]
    pub pages: Vec<Option<u32>>,
}

impl From<RagResp> for Answer {
    fn from(resp: RagResp) -> Self {
        let mut pages: Vec<u32> = resp.pages.into_iter().flatten().collect();
        pages.sort_unstable();
        pages.dedup();
        Answer {
            answer: resp.answer,
            pages,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct IndexUrlReq<'a> {
    pub url: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct IndexResp {
    pub collection_name: String,
}

#[derive(Deserialize, Debug)]
pub struct CollectionsResp {
    #[serde(default)]
    pub collections: Vec<Collection>,
}

#[derive(Clone)]
pub struct RagClient {
    client: Client,
    base_url: Url,
}

impl RagClient {
    pub fn new(cfg: &Configuration) -> Result<Self, ApiError> {
        let invalid = |reason: String| ApiError::InvalidUrl {
            url: cfg.api_url.clone(),
            reason,
        };
        let base_url = Url::parse(&cfg.api_url).map_err(|err| invalid(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        let client = Client::builder().timeout(cfg.request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends with a fresh `X-Request-Id` and maps non-2xx answers to errors.
    async fn execute(&self, op: &'static str, req: RequestBuilder) -> Result<Response, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let instant = Instant::now();
        let req = match HeaderValue::from_str(&request_id) {
            Ok(value) => req.header(HeaderName::from_static("x-request-id"), value),
            Err(_) => req,
        };

        let resp = req.send().await.map_err(|err| {
            tracing::warn!(%request_id, "{} request failed: {}", op, err);
            ApiError::Request(err)
        })?;

        let status = resp.status();
        tracing::debug!(%request_id, "{} answered {} in {:?}", op, status, instant.elapsed());
        if !status.is_success() {
            return Err(ApiError::Status { op, status });
        }
        Ok(resp)
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        req: RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = self.execute(op, req).await?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl RagApi for RagClient {
    async fn upload(&self, file: &UploadFile) -> Result<String, ApiError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);
        let req = self.client.post(self.url(&["api", "upload"])).multipart(form);
        let resp: IndexResp = self.execute_json("Upload", req).await?;
        Ok(resp.collection_name)
    }

    async fn index_url(&self, url: &str) -> Result<String, ApiError> {
        let req = self
            .client
            .post(self.url(&["api", "url"]))
            .json(&IndexUrlReq { url });
        let resp: IndexResp = self.execute_json("Index", req).await?;
        Ok(resp.collection_name)
    }

    async fn ask(&self, question: &str, collection_name: &str) -> Result<Answer, ApiError> {
        let req = self.client.post(self.url(&["api", "rag"])).json(&RagReq {
            question,
            collection_name,
        });
        let resp: RagResp = self.execute_json("Query", req).await?;
        Ok(resp.into())
    }

    async fn collections(&self) -> Result<Vec<Collection>, ApiError> {
        let req = self.client.get(self.url(&["api", "collections"]));
        let resp: CollectionsResp = self.execute_json("Refresh", req).await?;
        Ok(resp.collections)
    }

    async fn delete_collection(&self, collection_name: &str) -> Result<(), ApiError> {
        let url = self.url(&["api", "collection", collection_name]);
        let req = self.client.delete(url);
        self.execute("Delete", req).await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), ApiError> {
        let req = self.client.get(self.url(&["health"]));
        self.execute("Health", req).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> RagClient {
        let cfg = Configuration {
            api_url: api_url.to_string(),
            ..Default::default()
        };
        RagClient::new(&cfg).unwrap()
    }

    #[test]
    fn test_url_escapes_collection_names() {
        let api = client("http://localhost:8000");
        let url = api.url(&["api", "collection", "a#b/c?d"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/collection/a%23b%2Fc%3Fd"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let api = client("http://rag.local/v1/");
        assert_eq!(
            api.url(&["api", "rag"]).as_str(),
            "http://rag.local/v1/api/rag"
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let cfg = Configuration {
            api_url: "localhost:8000".to_string(),
            ..Default::default()
        };
        let err = RagClient::new(&cfg).err().unwrap();
        assert!(matches!(err, ApiError::InvalidUrl { .. }));
    }

    #[test]
    fn test_answer_pages_skip_nulls() {
        let resp: RagResp =
            serde_json::from_str(r#"{"answer": "30 days.", "pages": [4, null, 2, 4]}"#).unwrap();
        assert_eq!(
            Answer::from(resp),
            Answer {
                answer: "30 days.".to_string(),
                pages: vec![2, 4],
            }
        );
    }

    #[test]
    fn test_answer_without_pages() {
        let resp: RagResp = serde_json::from_str(r#"{"answer": "No."}"#).unwrap();
        assert_eq!(Answer::from(resp), Answer::new("No."));
    }
}
