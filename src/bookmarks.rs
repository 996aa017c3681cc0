use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::Article;

#[derive(Default)]
struct BookmarkState {
    articles: Vec<Article>,
    is_loading: bool,
    error_message: Option<String>,
}

/// The signed-in user's saved articles. Safe to share between tasks; a fetch
/// requested while another one runs is skipped.
pub struct Bookmarks {
    api: Arc<ApiClient>,
    state: Mutex<BookmarkState>,
    fetching: AtomicBool,
}

struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Bookmarks {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Bookmarks {
            api,
            state: Mutex::new(BookmarkState::default()),
            fetching: AtomicBool::new(false),
        }
    }

    pub async fn articles(&self) -> Vec<Article> {
        self.state.lock().await.articles.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.is_loading
    }

    pub async fn error_message(&self) -> Option<String> {
        self.state.lock().await.error_message.clone()
    }

    /// Reloads the list. Returns `false` when another fetch was already running.
    pub async fn fetch(&self) -> Result<bool> {
        if self.fetching.swap(true, Ordering::SeqCst) {
            debug!("Bookmark fetch already running, skipping");
            return Ok(false);
        }
        let _guard = FetchGuard(&self.fetching);

        {
            let mut state = self.state.lock().await;
            state.is_loading = true;
            state.error_message = None;
        }

        let result = self.api.get_bookmarks().await;

        let mut state = self.state.lock().await;
        state.is_loading = false;
        match result {
            Ok(articles) => {
                state.articles = articles
                    .into_iter()
                    .filter(|a| {
                        if a.bookmark_id().is_none() {
                            warn!("Bookmarked article {} arrived without a bookmark id", a.id);
                        }
                        a.is_bookmarked()
                    })
                    .collect();
                Ok(true)
            }
            Err(e) => {
                state.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Bookmarks an article and reloads the list. Returns the new bookmark id.
    pub async fn add(&self, article_id: &str) -> Result<String> {
        let bookmark_id = match self.api.add_bookmark(article_id).await {
            Ok(id) => id,
            Err(e) => {
                self.state.lock().await.error_message =
                    Some(format!("Failed to add bookmark: {e}"));
                return Err(e);
            }
        };
        if !self.fetch().await? {
            debug!("Bookmark list reload skipped; {bookmark_id} shows after the next fetch");
        }
        Ok(bookmark_id)
    }

    /// Removes the bookmark of a listed article. Returns `false` when the
    /// article is not in the list.
    pub async fn remove(&self, article_id: &str) -> Result<bool> {
        let bookmark_id = {
            let state = self.state.lock().await;
            state
                .articles
                .iter()
                .find(|a| a.id == article_id)
                .and_then(|a| a.bookmark_id().map(str::to_owned))
        };
        let Some(bookmark_id) = bookmark_id else {
            return Ok(false);
        };

        match self.api.remove_bookmark(&bookmark_id).await {
            Ok(()) => {
                self.state.lock().await.articles.retain(|a| a.id != article_id);
                Ok(true)
            }
            Err(e) => {
                self.state.lock().await.error_message =
                    Some(format!("Failed to remove bookmark: {e}"));
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
        extract::Path,
        http::StatusCode,
        routing::{delete, get},
    };
    use serde_json::{Value, json};
    use std::time::Duration;

    fn bookmarked(id: &str, bookmark_id: Option<&str>) -> Value {
        json!({
            "id": id, "title": "t", "source": "s", "published_at": "p", "url": "u",
            "bookmark_id": bookmark_id
        })
    }

    async fn bookmarks_for(router: Router) -> Arc<Bookmarks> {
        let base = serve(router).await;
        let api = ApiClient::new(base, Duration::from_secs(5)).unwrap();
        Arc::new(Bookmarks::new(Arc::new(api)))
    }

    #[tokio::test]
    async fn fetch_keeps_only_entries_with_bookmark_ids() {
        let router = Router::new().route(
            "/api/bookmarks",
            get(|| async {
                Json(json!({ "bookmarks": [bookmarked("a1", Some("b1")), bookmarked("a2", None)] }))
            }),
        );
        let bookmarks = bookmarks_for(router).await;

        assert!(bookmarks.fetch().await.unwrap());
        let articles = bookmarks.articles().await;
        assert_eq!(articles.len(), 1);
        assert!(articles[0].is_bookmarked());
        assert_eq!(articles[0].bookmark_id(), Some("b1"));
        assert!(!bookmarks.is_loading().await);
    }

    #[tokio::test]
    async fn concurrent_fetch_is_skipped() {
        let hits = Hits::default();
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/bookmarks",
            get(move || {
                counter.bump();
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Json(json!([]))
                }
            }),
        );
        let bookmarks = bookmarks_for(router).await;

        let first = tokio::spawn({
            let bookmarks = bookmarks.clone();
            async move { bookmarks.fetch().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!bookmarks.fetch().await.unwrap());
        assert!(first.await.unwrap().unwrap());
        assert_eq!(hits.get(), 1);

        // The flag is released once the first fetch is done.
        assert!(bookmarks.fetch().await.unwrap());
        assert_eq!(hits.get(), 2);
    }

    #[tokio::test]
    async fn numeric_bookmark_ids_are_listed_and_removable() {
        let router = Router::new()
            .route(
                "/api/bookmarks",
                get(|| async {
                    Json(json!([
                        { "id": 7, "title": "t", "source": "s", "published_at": "p",
                          "url": "u", "bookmark_id": 42 },
                        bookmarked("a2", Some(""))
                    ]))
                }),
            )
            .route(
                "/api/bookmarks/:id",
                delete(|Path(id): Path<String>| async move {
                    if id == "42" {
                        StatusCode::NO_CONTENT
                    } else {
                        StatusCode::NOT_FOUND
                    }
                }),
            );
        let bookmarks = bookmarks_for(router).await;

        assert!(bookmarks.fetch().await.unwrap());
        let articles = bookmarks.articles().await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "7");
        assert_eq!(articles[0].bookmark_id(), Some("42"));

        assert!(bookmarks.remove("7").await.unwrap());
        assert!(bookmarks.articles().await.is_empty());
    }

    #[tokio::test]
    async fn add_during_running_fetch_still_returns_new_id() {
        let hits = Hits::default();
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/bookmarks",
            get(move || {
                counter.bump();
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Json(json!([]))
                }
            })
            .post(|| async { Json(json!({ "id": "b5" })) }),
        );
        let bookmarks = bookmarks_for(router).await;

        let running = tokio::spawn({
            let bookmarks = bookmarks.clone();
            async move { bookmarks.fetch().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(bookmarks.add("a1").await.unwrap(), "b5");
        assert!(running.await.unwrap().unwrap());
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn remove_drops_article_after_server_confirms() {
        let router = Router::new()
            .route(
                "/api/bookmarks",
                get(|| async { Json(json!([bookmarked("a1", Some("b1")), bookmarked("a2", Some("b2"))])) }),
            )
            .route(
                "/api/bookmarks/:id",
                delete(|Path(id): Path<String>| async move {
                    if id == "b1" {
                        StatusCode::NO_CONTENT
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }),
            );
        let bookmarks = bookmarks_for(router).await;
        bookmarks.fetch().await.unwrap();

        assert!(bookmarks.remove("a1").await.unwrap());
        assert!(!bookmarks.remove("unknown").await.unwrap());
        assert!(bookmarks.remove("a2").await.is_err());

        let ids: Vec<_> = bookmarks.articles().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["a2"]);
        assert!(bookmarks
            .error_message()
            .await
            .unwrap()
            .starts_with("Failed to remove bookmark"));
    }
}
