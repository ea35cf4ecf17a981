//! HTTP feed client — talks to a feed bridge over a small JSON API.
//!
//! The bridge owns the platform session (cookies, login flow). This client
//! only speaks:
//!
//! - `POST   /session`                 establish session
//! - `DELETE /session`                 tear down session
//! - `GET    /mentions?q=&count=&before=`
//! - `GET    /items/{id}`
//! - `GET    /users/{handle}`
//! - `POST   /items/{id}/replies`      `{"text": "..."}` → `{"id": "..."}`

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::FeedError;
use crate::feed::client::FeedClient;
use crate::feed::types::{Item, ItemId};

/// Feed client backed by `reqwest`.
pub struct HttpFeedClient {
    base_url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MentionsResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    id: Option<ItemId>,
}

impl HttpFeedClient {
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, FeedError> {
        self.authorize(req)
            .send()
            .await
            .map_err(|e| FeedError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<T, FeedError> {
        resp.json::<T>()
            .await
            .map_err(|e| FeedError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }
}

fn check_status(endpoint: &str, status: StatusCode) -> Result<(), FeedError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FeedError::AuthFailed(format!(
            "{endpoint} returned {}",
            status.as_u16()
        )));
    }
    if !status.is_success() {
        return Err(FeedError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn login(&self) -> Result<(), FeedError> {
        let endpoint = "POST /session";
        let resp = self.send(endpoint, self.client.post(self.url("/session"))).await?;
        check_status(endpoint, resp.status())
    }

    async fn logout(&self) -> Result<(), FeedError> {
        let endpoint = "DELETE /session";
        let resp = self
            .send(endpoint, self.client.delete(self.url("/session")))
            .await?;
        check_status(endpoint, resp.status())
    }

    async fn fetch_mentions_page(
        &self,
        query: &str,
        page_size: usize,
        older_than: Option<ItemId>,
    ) -> Result<Vec<Item>, FeedError> {
        let endpoint = "GET /mentions";
        let mut params = vec![
            ("q", query.to_string()),
            ("count", page_size.to_string()),
        ];
        if let Some(before) = older_than {
            params.push(("before", before.to_string()));
        }

        let req = self.client.get(self.url("/mentions")).query(&params);
        let resp = self.send(endpoint, req).await?;
        check_status(endpoint, resp.status())?;
        let body: MentionsResponse = Self::read_json(endpoint, resp).await?;
        debug!(count = body.items.len(), "Fetched mentions page");
        Ok(body.items)
    }

    async fn fetch_item(&self, id: ItemId) -> Result<Option<Item>, FeedError> {
        let endpoint = "GET /items/{id}";
        let resp = self
            .send(endpoint, self.client.get(self.url(&format!("/items/{id}"))))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(endpoint, resp.status())?;
        Self::read_json(endpoint, resp).await.map(Some)
    }

    async fn resolve_user_id(&self, handle: &str) -> Result<Option<String>, FeedError> {
        let endpoint = "GET /users/{handle}";
        let handle = handle.trim_start_matches('@');
        let resp = self
            .send(endpoint, self.client.get(self.url(&format!("/users/{handle}"))))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(endpoint, resp.status())?;
        let body: UserResponse = Self::read_json(endpoint, resp).await?;
        Ok(body.id)
    }

    async fn send_reply(&self, target: ItemId, text: &str) -> Result<Option<ItemId>, FeedError> {
        let endpoint = "POST /items/{id}/replies";
        let req = self
            .client
            .post(self.url(&format!("/items/{target}/replies")))
            .json(&serde_json::json!({ "text": text }));
        let resp = self.send(endpoint, req).await?;
        check_status(endpoint, resp.status())?;
        let body: ReplyResponse = Self::read_json(endpoint, resp).await?;
        Ok(body.id)
    }
}
