use std::time::Duration;

use log::debug;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::error::{ApiError, Result};
use crate::models::{Article, TrackedStory, User, WireId};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const BODY_EXCERPT_CHARS: usize = 200;

/// Client for the NewsFlow REST backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base.to_string()));
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(ApiClient { http, base, token: None })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn has_session(&self) -> bool {
        self.token.is_some()
    }

    pub async fn health(&self) -> Result<String> {
        let body = self.send(self.request(Method::GET, &["health"])?).await?;
        let status = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("status").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| "ok".to_string());
        Ok(status)
    }

    pub async fn fetch_news(&self, query: &str, session_id: &str) -> Result<Vec<Article>> {
        debug!("Fetching news for {query:?}");
        let req = self
            .request(Method::GET, &["api", "news", "fetch"])?
            .query(&[("keyword", query), ("session_id", session_id)]);
        let body = self.send(req).await?;
        decode_list(&body, &["articles", "data"])
    }

    pub async fn process_news(&self, session_id: &str) -> Result<Vec<Article>> {
        let req = self
            .request(Method::POST, &["api", "news", "process"])?
            .json(&json!({ "session_id": session_id }));
        let body = self.send(req).await?;
        decode_list(&body, &["articles", "data"])
    }

    pub async fn get_bookmarks(&self) -> Result<Vec<Article>> {
        let body = self.send(self.request(Method::GET, &["api", "bookmarks"])?).await?;
        decode_list(&body, &["bookmarks", "data"])
    }

    /// Returns the id of the new bookmark.
    pub async fn add_bookmark(&self, article_id: &str) -> Result<String> {
        let req = self
            .request(Method::POST, &["api", "bookmarks"])?
            .json(&json!({ "news_id": article_id }));
        let value = parse(&self.send(req).await?)?;
        [&value, &value["data"]]
            .into_iter()
            .find_map(|v| id_of(&v["id"]))
            .ok_or(ApiError::MissingData("id"))
    }

    pub async fn remove_bookmark(&self, bookmark_id: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &["api", "bookmarks", bookmark_id])?;
        self.send(req).await?;
        Ok(())
    }

    pub async fn summarize(&self, article_url: &str) -> Result<String> {
        let req = self
            .request(Method::POST, &["summarize"])?
            .json(&json!({ "url": article_url }));
        let value = parse(&self.send(req).await?)?;
        value["summary"]
            .as_str()
            .map(str::to_owned)
            .ok_or(ApiError::MissingData("summary"))
    }

    pub async fn fetch_tracked_stories(&self) -> Result<Vec<TrackedStory>> {
        let body = self.send(self.request(Method::GET, &["api", "story_tracking"])?).await?;
        decode_list(&body, &["stories", "data"])
    }

    pub async fn fetch_tracked_story(&self, story_id: &str) -> Result<TrackedStory> {
        let req = self.request(Method::GET, &["api", "story_tracking", story_id])?;
        decode_one(&self.send(req).await?, "data")
    }

    pub async fn create_tracked_story(
        &self,
        keyword: &str,
        source_article_id: Option<&str>,
    ) -> Result<TrackedStory> {
        let mut payload = json!({ "keyword": keyword });
        if let Some(id) = source_article_id {
            payload["sourceArticleId"] = json!(id);
        }
        let req = self
            .request(Method::POST, &["api", "story_tracking"])?
            .json(&payload);
        decode_one(&self.send(req).await?, "data")
    }

    pub async fn delete_tracked_story(&self, story_id: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &["api", "story_tracking", story_id])?;
        self.send(req).await?;
        Ok(())
    }

    pub async fn user_profile(&self) -> Result<User> {
        let req = self.request(Method::GET, &["api", "user", "profile"])?;
        decode_one(&self.send(req).await?, "user")
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!("{method} {url}");
        let req = self.http.request(method, url);
        Ok(match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn send(&self, req: RequestBuilder) -> Result<Vec<u8>> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!("Response {status}, {} bytes", body.len());
        check_status(status, &body)?;
        Ok(body)
    }
}

pub(crate) fn check_status(status: StatusCode, body: &[u8]) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let detail = excerpt(body);
        return Err(ApiError::Auth(if detail.is_empty() {
            status.to_string()
        } else {
            detail
        }));
    }
    if !status.is_success() {
        return Err(ApiError::BadStatus { status, body: excerpt(body) });
    }
    Ok(())
}

pub(crate) fn excerpt(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .trim()
        .chars()
        .take(BODY_EXCERPT_CHARS)
        .collect()
}

pub(crate) fn parse(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decoding {
        path: ".".to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_path_to_error::deserialize(value)?)
}

/// Bare array first, then `{ key: [...] }` for each envelope key. Reports the
/// bare-array error when nothing fits.
fn decode_list<T: DeserializeOwned>(body: &[u8], envelopes: &[&str]) -> Result<Vec<T>> {
    let value = parse(body)?;
    let first_err = match from_value::<Vec<T>>(value.clone()) {
        Ok(items) => return Ok(items),
        Err(e) => e,
    };
    for key in envelopes {
        if let Some(inner) = value.get(*key) {
            if let Ok(items) = from_value::<Vec<T>>(inner.clone()) {
                debug!("Decoded list from `{key}` envelope");
                return Ok(items);
            }
        }
    }
    Err(first_err)
}

fn decode_one<T: DeserializeOwned>(body: &[u8], envelope: &str) -> Result<T> {
    let value = parse(body)?;
    let first_err = match from_value::<T>(value.clone()) {
        Ok(item) => return Ok(item),
        Err(e) => e,
    };
    match value.get(envelope).map(|inner| from_value::<T>(inner.clone())) {
        Some(Ok(item)) => Ok(item),
        _ => Err(first_err),
    }
}

fn id_of(value: &Value) -> Option<String> {
    WireId::deserialize(value).ok().and_then(WireId::into_id)
}
