use std::sync::Arc;

use log::{debug, info};

use crate::api::ApiClient;
use crate::error::{ApiError, Result};
use crate::models::Article;

/// Search results for the currently selected keywords.
pub struct NewsFeed {
    api: Arc<ApiClient>,
    session_id: String,
    pub articles: Vec<Article>,
    pub selected_keywords: Vec<String>,
    pub is_loading: bool,
    pub error_message: Option<String>,
}

impl NewsFeed {
    pub fn new(api: Arc<ApiClient>, session_id: String) -> Self {
        NewsFeed {
            api,
            session_id,
            articles: Vec::new(),
            selected_keywords: Vec::new(),
            is_loading: false,
            error_message: None,
        }
    }

    /// Adds the keyword if it is not selected yet, then refreshes.
    pub async fn search(&mut self, keyword: &str) -> Result<()> {
        self.select(keyword);
        self.refresh().await
    }

    /// Like `search` for several keywords, with a single refresh.
    pub async fn search_all<S: AsRef<str>>(&mut self, keywords: &[S]) -> Result<()> {
        for keyword in keywords {
            self.select(keyword.as_ref());
        }
        self.refresh().await
    }

    pub async fn toggle_keyword(&mut self, keyword: &str) -> Result<()> {
        let keyword = keyword.trim();
        if self.selected_keywords.iter().any(|k| k == keyword) {
            self.selected_keywords.retain(|k| k != keyword);
        } else {
            self.select(keyword);
        }
        self.refresh().await
    }

    pub async fn refresh(&mut self) -> Result<()> {
        if self.selected_keywords.is_empty() {
            self.articles.clear();
            return Ok(());
        }
        let query = self.selected_keywords.join(" ");
        self.start_loading();
        let result = self.api.fetch_news(&query, &self.session_id).await;
        self.apply(result)
    }

    /// Asks the backend to summarize the session's pending articles.
    pub async fn process(&mut self) -> Result<()> {
        self.start_loading();
        let result = self.api.process_news(&self.session_id).await;
        self.apply(result)
    }

    /// Flips the bookmark of a listed article. Returns the new bookmarked state.
    pub async fn toggle_bookmark(&mut self, article_id: &str) -> Result<bool> {
        let Some(index) = self.articles.iter().position(|a| a.id == article_id) else {
            return Err(ApiError::MissingData("article"));
        };

        let outcome = match self.articles[index].bookmark_id().map(str::to_owned) {
            Some(bookmark_id) => self
                .api
                .remove_bookmark(&bookmark_id)
                .await
                .map(|_| None),
            None => self.api.add_bookmark(article_id).await.map(Some),
        };

        match outcome {
            Ok(Some(bookmark_id)) => {
                info!("Bookmarked {article_id} as {bookmark_id}");
                self.articles[index].mark_bookmarked(bookmark_id);
                Ok(true)
            }
            Ok(None) => {
                info!("Removed bookmark from {article_id}");
                self.articles[index].clear_bookmark();
                Ok(false)
            }
            Err(e) => {
                self.error_message = Some(format!("Failed to update bookmark: {e}"));
                Err(e)
            }
        }
    }

    fn select(&mut self, keyword: &str) {
        let keyword = keyword.trim();
        if keyword.is_empty() || self.selected_keywords.iter().any(|k| k == keyword) {
            return;
        }
        self.selected_keywords.push(keyword.to_string());
    }

    fn start_loading(&mut self) {
        self.is_loading = true;
        self.error_message = None;
    }

    fn apply(&mut self, result: Result<Vec<Article>>) -> Result<()> {
        self.is_loading = false;
        match result {
            Ok(articles) => {
                debug!("Feed now holds {} articles", articles.len());
                self.articles = articles;
                Ok(())
            }
            Err(e) => {
                self.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Hits, serve};
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::StatusCode,
        routing::{delete, get, post},
    };
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;

    fn article(id: &str) -> Value {
        json!({ "id": id, "title": "t", "source": "s", "published_at": "p", "url": "u" })
    }

    async fn feed_for(router: Router) -> NewsFeed {
        let base = serve(router).await;
        let api = ApiClient::new(base, Duration::from_secs(5)).unwrap();
        NewsFeed::new(Arc::new(api), "sess".into())
    }

    fn news_router(hits: Hits) -> Router {
        Router::new().route(
            "/api/news/fetch",
            get(move |Query(q): Query<HashMap<String, String>>| {
                hits.bump();
                async move {
                    let keyword = q.get("keyword").cloned().unwrap_or_default();
                    Json(json!({ "articles": [article(&keyword)] }))
                }
            }),
        )
    }

    #[tokio::test]
    async fn duplicate_search_does_not_duplicate_keywords() {
        let hits = Hits::default();
        let mut feed = feed_for(news_router(hits.clone())).await;

        feed.search("climate").await.unwrap();
        feed.search(" climate ").await.unwrap();
        feed.search("energy").await.unwrap();

        assert_eq!(feed.selected_keywords, ["climate", "energy"]);
        assert_eq!(feed.articles[0].id, "climate energy");
        assert_eq!(hits.get(), 3);
    }

    #[tokio::test]
    async fn toggling_last_keyword_clears_without_fetching() {
        let hits = Hits::default();
        let mut feed = feed_for(news_router(hits.clone())).await;

        feed.search_all(&["ai", "", "ai"]).await.unwrap();
        assert_eq!(feed.selected_keywords, ["ai"]);
        assert_eq!(hits.get(), 1);

        feed.toggle_keyword("ai").await.unwrap();
        assert!(feed.selected_keywords.is_empty());
        assert!(feed.articles.is_empty());
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_sets_error_message_and_keeps_articles() {
        let hits = Hits::default();
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/news/fetch",
            get(move || {
                let n = counter.bump();
                async move {
                    if n == 1 {
                        (StatusCode::OK, Json(json!([article("a1")])))
                    } else {
                        (StatusCode::BAD_GATEWAY, Json(json!({ "error": "upstream" })))
                    }
                }
            }),
        );
        let mut feed = feed_for(router).await;

        feed.search("x").await.unwrap();
        assert!(feed.search("y").await.is_err());
        assert_eq!(feed.articles.len(), 1);
        assert!(feed.error_message.as_deref().unwrap().contains("502"));
        assert!(!feed.is_loading);
    }

    #[tokio::test]
    async fn toggle_bookmark_round_trip() {
        let router = Router::new()
            .route("/api/news/fetch", get(|| async { Json(json!([article("a1")])) }))
            .route(
                "/api/bookmarks",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["news_id"], "a1");
                    Json(json!({ "id": "b1" }))
                }),
            )
            .route(
                "/api/bookmarks/:id",
                delete(|Path(id): Path<String>| async move {
                    assert_eq!(id, "b1");
                    StatusCode::NO_CONTENT
                }),
            );
        let mut feed = feed_for(router).await;
        feed.search("x").await.unwrap();

        assert!(feed.toggle_bookmark("a1").await.unwrap());
        assert!(feed.articles[0].is_bookmarked());
        assert_eq!(feed.articles[0].bookmark_id(), Some("b1"));

        assert!(!feed.toggle_bookmark("a1").await.unwrap());
        assert!(!feed.articles[0].is_bookmarked());
        assert_eq!(feed.articles[0].bookmark_id(), None);
    }

    #[tokio::test]
    async fn failed_bookmark_leaves_article_untouched() {
        let router = Router::new()
            .route("/api/news/fetch", get(|| async { Json(json!([article("a1")])) }))
            .route("/api/bookmarks", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let mut feed = feed_for(router).await;
        feed.search("x").await.unwrap();

        assert!(feed.toggle_bookmark("a1").await.is_err());
        assert!(!feed.articles[0].is_bookmarked());
        assert!(feed.error_message.as_deref().unwrap().starts_with("Failed to update bookmark"));

        assert!(matches!(
            feed.toggle_bookmark("missing").await,
            Err(ApiError::MissingData("article"))
        ));
    }

    #[tokio::test]
    async fn process_replaces_articles() {
        let router = Router::new().route(
            "/api/news/process",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["session_id"], "sess");
                Json(json!({ "data": [article("p1"), article("p2")] }))
            }),
        );
        let mut feed = feed_for(router).await;

        feed.process().await.unwrap();
        assert_eq!(feed.articles.len(), 2);
    }
}
