use std::sync::Arc;

use anyhow::{Result, bail};
use log::{debug, error, info};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use newsflow::account::Account;
use newsflow::api::ApiClient;
use newsflow::auth::AuthClient;
use newsflow::bookmarks::Bookmarks;
use newsflow::config::{Config, EnsureOutcome};
use newsflow::keywords::extract_main_keyword;
use newsflow::logger::init_logger;
use newsflow::news_feed::NewsFeed;
use newsflow::prefs::Prefs;
use newsflow::tracking::{RefreshOutcome, StoryTracker};
use newsflow::utils::{format_articles, format_stories, format_story, strip_markup};

use crate::{BookmarkAction, Cli, Command, TrackAction};

pub async fn run(cli: Cli) -> Result<()> {
    // 0) Initialize logger
    init_logger(cli.verbose)?;

    // 1) Ensure config exists
    let config_outcome: EnsureOutcome = Config::ensure_user_config()?;
    if config_outcome.created {
        info!("Config file created at {}", config_outcome.path.display());
        println!(
            "Config file created at {}. Please edit it and run again.",
            config_outcome.path.display()
        );
        return Ok(());
    }
    let cfg = Config::get_user_config()?;
    debug!("User config loaded");

    // 2) Local state and clients
    let prefs = Prefs::open(&cfg.prefs_path)?;
    let auth = AuthClient::new(
        cfg.auth_url.clone(),
        cfg.auth_anon_key.clone(),
        cfg.request_timeout(),
    )?;
    let mut account = Account::new(auth, prefs);
    let api = Arc::new(
        ApiClient::new(cfg.api_base_url.clone(), cfg.request_timeout())?
            .with_token(account.access_token()?),
    );
    let out = Output { json: cli.json };

    // 3) Dispatch
    match cli.command {
        Command::Signup {
            email,
            password,
            name,
        } => {
            let (user, signed_in) = account.sign_up(&email, &password, name.as_deref()).await?;
            if signed_in {
                out.emit(&user, || format!("Signed up and signed in as {}.", user.label()))
            } else {
                out.emit(&user, || format!("Check {email} to confirm your account, then sign in."))
            }
        }
        Command::Signin { email, password } => {
            let user = account.sign_in(&email, &password).await?;
            out.emit(&user, || format!("Signed in as {}.", user.label()))
        }
        Command::Signout => {
            if !account.is_authenticated()? {
                return out.emit(&"not_signed_in", || "Not signed in.".to_string());
            }
            account.sign_out().await?;
            out.emit(&"signed_out", || "Signed out.".to_string())
        }
        Command::Whoami => match account.whoami(&api).await? {
            Some(user) => out.emit(&user, || {
                format!("{} [id: {}]", user.label(), user.id)
            }),
            None => out.emit(&None::<()>, || "Not signed in.".to_string()),
        },
        Command::Health => {
            let status = api.health().await?;
            out.emit(&status, || format!("Backend is up ({status})."))
        }
        Command::News { keywords, bookmark } => {
            let mut feed = NewsFeed::new(api.clone(), account.prefs().session_id()?);
            feed.search_all(keywords.as_slice()).await?;
            if let Some(article_id) = bookmark {
                require_session(&api)?;
                let now_bookmarked = feed.toggle_bookmark(&article_id).await?;
                info!("Bookmark on {article_id} is now {now_bookmarked}");
            }
            out.emit(&feed.articles, || format_articles(&feed.articles))
        }
        Command::Process => {
            let mut feed = NewsFeed::new(api.clone(), account.prefs().session_id()?);
            feed.process().await?;
            out.emit(&feed.articles, || format_articles(&feed.articles))
        }
        Command::Summarize { url } => {
            let summary = strip_markup(&api.summarize(&url).await?);
            out.emit(&summary, || summary.clone())
        }
        Command::Bookmarks { action } => {
            require_session(&api)?;
            run_bookmarks(action, Bookmarks::new(api.clone()), &out).await
        }
        Command::Track { action } => {
            require_session(&api)?;
            let tracker = Arc::new(StoryTracker::new(
                api.clone(),
                cfg.poll_interval(),
                cfg.refresh_debounce(),
            ));
            run_tracking(action, tracker, &out).await
        }
    }
}

async fn run_bookmarks(action: BookmarkAction, bookmarks: Bookmarks, out: &Output) -> Result<()> {
    match action {
        BookmarkAction::List => {
            bookmarks.fetch().await?;
            let articles = bookmarks.articles().await;
            out.emit(&articles, || format_articles(&articles))
        }
        BookmarkAction::Add { article_id } => {
            let bookmark_id = bookmarks.add(&article_id).await?;
            out.emit(&bookmark_id, || format!("Bookmarked {article_id} [bookmark: {bookmark_id}]."))
        }
        BookmarkAction::Remove { article_id } => {
            bookmarks.fetch().await?;
            if !bookmarks.remove(&article_id).await? {
                bail!("Article {article_id} is not bookmarked");
            }
            out.emit(&article_id, || format!("Removed bookmark from {article_id}."))
        }
    }
}

async fn run_tracking(action: TrackAction, tracker: Arc<StoryTracker>, out: &Output) -> Result<()> {
    match action {
        TrackAction::List => {
            tracker.refresh().await?;
            let stories = tracker.stories().await;
            out.emit(&stories, || format_stories(&stories))
        }
        TrackAction::Add {
            keywords,
            title,
            source_article,
        } => {
            let keywords = match title {
                Some(title) => vec![extract_main_keyword(&title)],
                None => keywords,
            };
            if let [keyword] = keywords.as_slice() {
                let story = tracker
                    .start_tracking(keyword, source_article.as_deref())
                    .await?;
                return out.emit(&story, || format!("Tracking {}", format_story(&story)));
            }

            let mut created = Vec::new();
            for (keyword, result) in keywords
                .iter()
                .zip(tracker.start_tracking_all(keywords.as_slice()).await)
            {
                match result {
                    Ok(story) => created.push(story),
                    Err(e) => error!("Could not track \"{keyword}\": {e}"),
                }
            }
            if created.len() < keywords.len() {
                bail!(
                    "Tracked {} of {} keywords; see the log for failures",
                    created.len(),
                    keywords.len()
                );
            }
            out.emit(&created, || format_stories(&created))
        }
        TrackAction::Show { story_id } => {
            let story = tracker.story(&story_id).await?;
            let articles = format_articles(&story.articles);
            out.emit(&story, || format!("{}\n\n{articles}", format_story(&story)))
        }
        TrackAction::Remove { story_id } => {
            tracker.stop_tracking(&story_id).await?;
            out.emit(&story_id, || format!("Stopped tracking {story_id}."))
        }
        TrackAction::Watch => watch_stories(tracker, out).await,
    }
}

async fn watch_stories(tracker: Arc<StoryTracker>, out: &Output) -> Result<()> {
    let mut updates = tracker.subscribe();

    tracker.refresh().await?;
    let stories = updates.borrow_and_update().clone();
    out.emit(&stories, || format_stories(&stories))?;

    tracker.start_polling().await;
    println!("Watching tracked stories. Press Enter to refresh, Ctrl-C to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let stories = updates.borrow_and_update().clone();
                out.emit(&stories, || format_stories(&stories))?;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(_) => match tracker.refresh().await {
                    Ok(RefreshOutcome::Debounced) => println!("Refreshed moments ago, try again shortly."),
                    Ok(outcome) => debug!("Manual refresh: {outcome:?}"),
                    Err(e) => error!("Refresh failed: {e}"),
                },
                None => stdin_open = false,
            },
        }
    }

    tracker.stop_polling().await;
    Ok(())
}

fn require_session(api: &ApiClient) -> Result<()> {
    if !api.has_session() {
        bail!("Not signed in. Run `newsflow signin <email> <password>` first.");
    }
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T, F>(&self, value: &T, text: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> String,
    {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}
