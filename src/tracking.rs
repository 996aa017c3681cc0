use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::{Mutex, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::TrackedStory;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(180);
pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_secs(5);

/// Rejects requests made within `window` of the last recorded one.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    window: Duration,
    last: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Debounce { window, last: None }
    }

    pub fn record(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Records `now` and returns true unless the window is still open.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.record(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Stories were replaced with this many fetched ones.
    Updated(usize),
    /// A manual refresh came too soon after the previous fetch.
    Debounced,
    /// A timer tick found a fetch still running.
    Skipped,
    /// A newer fetch replaced this one before it finished.
    Cancelled,
}

struct InFlight {
    id: u64,
    handle: AbortHandle,
}

struct TrackerState {
    stories: Vec<TrackedStory>,
    is_loading: bool,
    error_message: Option<String>,
    debounce: Debounce,
    in_flight: Option<InFlight>,
    fetches: u64,
    poller: Option<JoinHandle<()>>,
}

/// Keeps the tracked-story list fresh: a fixed-interval timer plus a
/// debounced manual refresh that replaces any fetch still in flight.
pub struct StoryTracker {
    api: Arc<ApiClient>,
    state: Arc<Mutex<TrackerState>>,
    updates: watch::Sender<Vec<TrackedStory>>,
    poll_interval: Duration,
}

impl StoryTracker {
    pub fn new(api: Arc<ApiClient>, poll_interval: Duration, debounce: Duration) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        StoryTracker {
            api,
            state: Arc::new(Mutex::new(TrackerState {
                stories: Vec::new(),
                is_loading: false,
                error_message: None,
                debounce: Debounce::new(debounce),
                in_flight: None,
                fetches: 0,
                poller: None,
            })),
            updates,
            poll_interval,
        }
    }

    pub async fn stories(&self) -> Vec<TrackedStory> {
        self.state.lock().await.stories.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.is_loading
    }

    pub async fn error_message(&self) -> Option<String> {
        self.state.lock().await.error_message.clone()
    }

    /// Receives the story list every time it changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TrackedStory>> {
        self.updates.subscribe()
    }

    /// Manual refresh.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let handle = {
            let mut state = self.state.lock().await;
            if !state.debounce.try_acquire(Instant::now()) {
                debug!("Refresh requested within the debounce window, ignoring");
                return Ok(RefreshOutcome::Debounced);
            }
            if let Some(previous) = state.in_flight.take() {
                debug!("Cancelling story fetch #{}", previous.id);
                previous.handle.abort();
            }
            self.spawn_fetch(&mut state)
        };
        finish(handle).await
    }

    /// Timer refresh. Never cancels a running fetch.
    pub async fn poll_once(&self) -> Result<RefreshOutcome> {
        let handle = {
            let mut state = self.state.lock().await;
            if state
                .in_flight
                .as_ref()
                .is_some_and(|f| !f.handle.is_finished())
            {
                debug!("Story fetch still running, skipping tick");
                return Ok(RefreshOutcome::Skipped);
            }
            state.debounce.record(Instant::now());
            self.spawn_fetch(&mut state)
        };
        finish(handle).await
    }

    /// Starts the timer. The first tick fires one interval from now; a
    /// running timer is replaced.
    pub async fn start_polling(self: &Arc<Self>) {
        let tracker: Weak<Self> = Arc::downgrade(self);
        let period = self.poll_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                match tracker.poll_once().await {
                    Ok(outcome) => debug!("Poll tick: {outcome:?}"),
                    Err(e) => warn!("Polling tracked stories failed: {e}"),
                }
            }
        });

        let mut state = self.state.lock().await;
        if let Some(previous) = state.poller.replace(task) {
            previous.abort();
        }
        info!("Polling tracked stories every {}s", period.as_secs_f32());
    }

    pub async fn stop_polling(&self) {
        if let Some(poller) = self.state.lock().await.poller.take() {
            poller.abort();
            info!("Stopped polling tracked stories");
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.state
            .lock()
            .await
            .poller
            .as_ref()
            .is_some_and(|p| !p.is_finished())
    }

    pub async fn start_tracking(
        &self,
        keyword: &str,
        source_article_id: Option<&str>,
    ) -> Result<TrackedStory> {
        let result = self.api.create_tracked_story(keyword, source_article_id).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(story) => {
                info!("Tracking \"{}\" as story {}", story.keyword, story.id);
                if !state.stories.iter().any(|s| s.id == story.id) {
                    state.stories.push(story.clone());
                    self.updates.send_replace(state.stories.clone());
                }
                Ok(story)
            }
            Err(e) => {
                state.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetches one story and folds it into the list.
    pub async fn story(&self, story_id: &str) -> Result<TrackedStory> {
        let result = self.api.fetch_tracked_story(story_id).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(story) => {
                match state.stories.iter().position(|s| s.id == story.id) {
                    Some(index) => state.stories[index] = story.clone(),
                    None => state.stories.push(story.clone()),
                }
                self.updates.send_replace(state.stories.clone());
                Ok(story)
            }
            Err(e) => {
                state.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Creates one story per keyword concurrently; results keep keyword order.
    pub async fn start_tracking_all<S: AsRef<str>>(
        &self,
        keywords: &[S],
    ) -> Vec<Result<TrackedStory>> {
        join_all(
            keywords
                .iter()
                .map(|keyword| self.start_tracking(keyword.as_ref(), None)),
        )
        .await
    }

    pub async fn stop_tracking(&self, story_id: &str) -> Result<()> {
        let result = self.api.delete_tracked_story(story_id).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                info!("Stopped tracking story {story_id}");
                state.stories.retain(|s| s.id != story_id);
                self.updates.send_replace(state.stories.clone());
                Ok(())
            }
            Err(e) => {
                state.error_message = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn spawn_fetch(&self, state: &mut TrackerState) -> JoinHandle<Result<Option<usize>>> {
        state.fetches += 1;
        let id = state.fetches;
        state.is_loading = true;
        state.error_message = None;

        let api = self.api.clone();
        let shared = self.state.clone();
        let updates = self.updates.clone();
        // The caller holds the lock, so `in_flight` is set before the task can look at it.
        let handle = tokio::spawn(async move {
            let result = api.fetch_tracked_stories().await;
            let mut state = shared.lock().await;
            if state.in_flight.as_ref().map(|f| f.id) != Some(id) {
                debug!("Story fetch #{id} was superseded, dropping its result");
                return Ok(None);
            }
            state.in_flight = None;
            state.is_loading = false;
            match result {
                Ok(stories) => {
                    let count = stories.len();
                    state.stories = stories;
                    updates.send_replace(state.stories.clone());
                    Ok(Some(count))
                }
                Err(e) => {
                    state.error_message = Some(e.to_string());
                    Err(e)
                }
            }
        });
        state.in_flight = Some(InFlight {
            id,
            handle: handle.abort_handle(),
        });
        handle
    }
}

async fn finish(handle: JoinHandle<Result<Option<usize>>>) -> Result<RefreshOutcome> {
    match handle.await {
        Ok(Ok(Some(count))) => Ok(RefreshOutcome::Updated(count)),
        Ok(Ok(None)) => Ok(RefreshOutcome::Cancelled),
        Ok(Err(e)) => Err(e),
        Err(e) if e.is_cancelled() => Ok(RefreshOutcome::Cancelled),
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}
