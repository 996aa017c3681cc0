use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Article, TrackedStory};

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z!][^>]*>|</?[A-Za-z][^>]*$").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Backend summaries sometimes carry stray markup; drop tags, decode the
/// common entities and collapse whitespace.
pub fn strip_markup(text: &str) -> String {
    let cleaned = TAG.replace_all(text, " ");
    let cleaned = cleaned
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

pub fn format_article(article: &Article) -> String {
    let mut output = String::new();

    let marker = if article.is_bookmarked() { "★ " } else { "" };
    output.push_str(&format!("{marker}{}\n", article.title));

    let mut byline = vec![article.source.clone(), article.published_date()];
    if let Some(author) = &article.author {
        byline.push(author.clone());
    }
    output.push_str(&format!("  {}\n", byline.join(" · ")));

    let summary = strip_markup(&article.summary);
    if !summary.is_empty() {
        output.push_str(&format!("  {summary}\n"));
    }
    output.push_str(&format!("  {}  [id: {}]", article.url, article.id));
    if let Some(bookmark_id) = article.bookmark_id() {
        output.push_str(&format!(" [bookmark: {bookmark_id}]"));
    }
    output
}

pub fn format_articles(articles: &[Article]) -> String {
    if articles.is_empty() {
        return "No articles.".to_string();
    }
    articles
        .iter()
        .map(format_article)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_story(story: &TrackedStory) -> String {
    let mut output = format!(
        "{} [id: {}] {} article(s), updated {}",
        story.keyword,
        story.id,
        story.articles.len(),
        story.last_updated
    );
    for article in story.articles.iter().take(3) {
        output.push_str(&format!("\n  - {} ({})", article.title, article.source));
    }
    output
}

pub fn format_stories(stories: &[TrackedStory]) -> String {
    if stories.is_empty() {
        return "No tracked stories.".to_string();
    }
    stories
        .iter()
        .map(format_story)
        .collect::<Vec<_>>()
        .join("\n")
}
