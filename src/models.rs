use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArticleWire")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    #[serde(rename = "image")]
    pub image_url: Option<String>,
    #[serde(rename = "published_at")]
    pub date: String,
    pub url: String,
    pub author: Option<String>,
    is_bookmarked: bool,
    bookmark_id: Option<String>,
}

#[derive(Deserialize)]
struct ArticleWire {
    id: WireId,
    title: String,
    #[serde(default)]
    summary: Option<String>,
    source: String,
    #[serde(default, rename = "image", alias = "image_url", alias = "imageUrl")]
    image_url: Option<String>,
    #[serde(rename = "published_at", alias = "publishedAt")]
    date: String,
    url: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    bookmark_id: Option<WireId>,
}

/// Ids arrive as strings or numbers depending on the backend table.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl WireId {
    /// `None` for blank strings, which cannot address a resource.
    pub(crate) fn into_id(self) -> Option<String> {
        match self {
            WireId::Text(s) if s.trim().is_empty() => None,
            WireId::Text(s) => Some(s),
            WireId::Signed(n) => Some(n.to_string()),
            WireId::Unsigned(n) => Some(n.to_string()),
        }
    }
}

const EMPTY_ID: &str = "id must not be empty";

impl TryFrom<ArticleWire> for Article {
    type Error = &'static str;

    fn try_from(w: ArticleWire) -> Result<Self, Self::Error> {
        let id = w.id.into_id().ok_or(EMPTY_ID)?;
        let bookmark_id = w.bookmark_id.and_then(WireId::into_id);
        // The flag is a client-side annotation, derived from the id the server sent.
        Ok(Article {
            id,
            title: w.title,
            summary: w.summary.unwrap_or_default(),
            source: w.source,
            image_url: w.image_url,
            date: w.date,
            url: w.url,
            author: w.author,
            is_bookmarked: bookmark_id.is_some(),
            bookmark_id,
        })
    }
}

impl Article {
    pub fn is_bookmarked(&self) -> bool {
        self.is_bookmarked
    }

    pub fn bookmark_id(&self) -> Option<&str> {
        self.bookmark_id.as_deref()
    }

    pub fn mark_bookmarked(&mut self, bookmark_id: String) {
        self.is_bookmarked = true;
        self.bookmark_id = Some(bookmark_id);
    }

    pub fn clear_bookmark(&mut self) {
        self.is_bookmarked = false;
        self.bookmark_id = None;
    }

    /// Published date as `Mar 3, 2025`, or the raw string when it is not RFC 3339.
    pub fn published_date(&self) -> String {
        match DateTime::parse_from_rfc3339(&self.date) {
            Ok(date) => date.format("%b %-d, %Y").to_string(),
            Err(_) => self.date.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrackedStoryWire")]
pub struct TrackedStory {
    pub id: String,
    pub user_id: String,
    pub keyword: String,
    pub created_at: String,
    pub last_updated: String,
    pub is_polling: Option<bool>,
    pub last_polled_at: Option<String>,
    pub articles: Vec<Article>,
}

#[derive(Deserialize)]
struct TrackedStoryWire {
    id: WireId,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    is_polling: Option<bool>,
    #[serde(default)]
    last_polled_at: Option<String>,
    #[serde(default)]
    articles: Option<Vec<ArticleEntry>>,
}

/// Story articles arrive either flat or wrapped with the time they were added.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArticleEntry {
    Nested { article: Article },
    Flat(Article),
}

impl From<ArticleEntry> for Article {
    fn from(entry: ArticleEntry) -> Self {
        match entry {
            ArticleEntry::Nested { article } | ArticleEntry::Flat(article) => article,
        }
    }
}

impl TryFrom<TrackedStoryWire> for TrackedStory {
    type Error = &'static str;

    fn try_from(w: TrackedStoryWire) -> Result<Self, Self::Error> {
        let id = w.id.into_id().ok_or(EMPTY_ID)?;
        let now = || Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(TrackedStory {
            id,
            user_id: w.user_id.unwrap_or_else(|| "unknown".to_string()),
            keyword: w.keyword.unwrap_or_else(|| "unknown".to_string()),
            created_at: w.created_at.unwrap_or_else(now),
            last_updated: w.last_updated.unwrap_or_else(now),
            is_polling: w.is_polling,
            last_polled_at: w.last_polled_at,
            articles: w
                .articles
                .unwrap_or_default()
                .into_iter()
                .map(Article::from)
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("User")
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub user: User,
}

#[cfg(test)]
pub(crate) fn sample_article(id: &str) -> Article {
    Article {
        id: id.to_string(),
        title: format!("Title {id}"),
        summary: String::new(),
        source: "Wire".to_string(),
        image_url: None,
        date: "2025-03-03T10:00:00Z".to_string(),
        url: format!("https://news.example/{id}"),
        author: None,
        is_bookmarked: false,
        bookmark_id: None,
    }
}
