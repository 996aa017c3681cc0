mod app;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "newsflow")]
#[command(about = "Search, track and bookmark news from a NewsFlow backend")]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show debug logs on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account
    Signup {
        email: String,
        password: String,
        /// Display name stored with the account
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign in with email and password
    Signin { email: String, password: String },
    /// Sign out and forget the stored session
    Signout,
    /// Show the signed-in user
    Whoami,
    /// Check that the backend is up
    Health,
    /// Search news for one or more keywords
    News {
        #[arg(required = true)]
        keywords: Vec<String>,
        /// Toggle the bookmark of this article from the results
        #[arg(long, value_name = "ARTICLE_ID")]
        bookmark: Option<String>,
    },
    /// Ask the backend to process this session's articles
    Process,
    /// Summarize an article by URL
    Summarize { url: String },
    /// Manage bookmarks
    Bookmarks {
        #[command(subcommand)]
        action: BookmarkAction,
    },
    /// Manage tracked stories
    Track {
        #[command(subcommand)]
        action: TrackAction,
    },
}

#[derive(Subcommand)]
pub enum BookmarkAction {
    List,
    Add { article_id: String },
    Remove { article_id: String },
}

#[derive(Subcommand)]
pub enum TrackAction {
    List,
    /// Track keywords, or a keyword picked from an article title
    Add {
        #[arg(required_unless_present = "title", conflicts_with = "title")]
        keywords: Vec<String>,
        #[arg(long)]
        title: Option<String>,
        /// Article the story started from
        #[arg(long, value_name = "ARTICLE_ID")]
        source_article: Option<String>,
    },
    /// Show one tracked story with its articles
    Show { story_id: String },
    Remove { story_id: String },
    /// Poll tracked stories and print updates until Ctrl-C; Enter refreshes
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    app::run(cli).await
}
