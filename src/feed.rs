//! The client-side feed synchronization controller.
//!
//! There is no push channel: the dashboards keep their "today" list fresh by
//! polling the list endpoint and diffing against a high-water mark, the
//! highest question id already rendered or known. Newly discovered items are
//! merged into the visible list, most recent on top, and a transient
//! notification reports how many arrived. The rendered page is abstracted as
//! a [`FeedView`] and the list endpoint as a [`FeedSource`] so the state
//! machine can be driven and inspected without a browser or a server.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};

use crate::question::{QuestionWithStats, TeacherStats};
use crate::user::SessionUser;

/// Which page the controller is driving. Polling is only meaningful on the
/// two dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Landing,
    Student,
    Teacher,
}

/// The API calls the controller issues while polling.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn today_questions(&self, class_name: &str) -> anyhow::Result<Vec<QuestionWithStats>>;
    async fn top_weekly(&self, class_name: &str) -> anyhow::Result<Vec<QuestionWithStats>>;
    async fn teacher_stats(&self, class_name: &str) -> anyhow::Result<TeacherStats>;
}

/// The rendered question list. Implementations own whatever the "DOM" is:
/// the real client renders cards, tests record calls.
pub trait FeedView: Send + Sync {
    /// Ids of the questions currently visible, in display order.
    fn rendered_ids(&self) -> Vec<i64>;
    /// Whether the empty-state placeholder is showing instead of a list.
    fn has_placeholder(&self) -> bool;
    fn clear_placeholder(&self);
    /// Put a question at the top of the list with the entry transition.
    fn prepend(&self, question: &QuestionWithStats);
    /// Transient "N new questions" notification.
    fn notify_new(&self, count: usize);
    fn show_top_weekly(&self, questions: &[QuestionWithStats]);
    fn show_teacher_stats(&self, stats: &TeacherStats);
}

#[async_trait]
impl<T: FeedSource + ?Sized> FeedSource for Arc<T> {
    async fn today_questions(&self, class_name: &str) -> anyhow::Result<Vec<QuestionWithStats>> {
        (**self).today_questions(class_name).await
    }
    async fn top_weekly(&self, class_name: &str) -> anyhow::Result<Vec<QuestionWithStats>> {
        (**self).top_weekly(class_name).await
    }
    async fn teacher_stats(&self, class_name: &str) -> anyhow::Result<TeacherStats> {
        (**self).teacher_stats(class_name).await
    }
}

impl<T: FeedView + ?Sized> FeedView for Arc<T> {
    fn rendered_ids(&self) -> Vec<i64> {
        (**self).rendered_ids()
    }
    fn has_placeholder(&self) -> bool {
        (**self).has_placeholder()
    }
    fn clear_placeholder(&self) {
        (**self).clear_placeholder()
    }
    fn prepend(&self, question: &QuestionWithStats) {
        (**self).prepend(question)
    }
    fn notify_new(&self, count: usize) {
        (**self).notify_new(count)
    }
    fn show_top_weekly(&self, questions: &[QuestionWithStats]) {
        (**self).show_top_weekly(questions)
    }
    fn show_teacher_stats(&self, stats: &TeacherStats) {
        (**self).show_teacher_stats(stats)
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Fixed delay between polls.
    pub poll_interval: Duration,
    /// Grace delay before the first fetch after `start`.
    pub start_grace: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            start_grace: Duration::from_millis(500),
        }
    }
}

struct FeedState {
    watermark: i64,
    polling_active: bool,
    // One fetch at a time: a tick that lands while a previous fetch is still
    // outstanding is skipped.
    in_flight: bool,
    // Bumped on every start; a driver task from a previous start notices and
    // retires instead of double-polling.
    generation: u64,
    user: Option<SessionUser>,
    page: Page,
}

struct FeedInner<S: FeedSource, V: FeedView> {
    source: S,
    view: V,
    config: FeedConfig,
    state: Mutex<FeedState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the session, the watermark and the timer. Constructed on page load,
/// torn down on logout or navigation; the embedding is expected to call
/// [`FeedController::stop`] when the page becomes hidden and `start` again
/// when it is visible with a user still logged in.
pub struct FeedController<S: FeedSource, V: FeedView> {
    inner: Arc<FeedInner<S, V>>,
}

impl<S: FeedSource, V: FeedView> Clone for FeedController<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: FeedSource + 'static, V: FeedView + 'static> FeedController<S, V> {
    pub fn new(source: S, view: V, config: FeedConfig) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                source,
                view,
                config,
                state: Mutex::new(FeedState {
                    watermark: 0,
                    polling_active: false,
                    in_flight: false,
                    generation: 0,
                    user: None,
                    page: Page::Landing,
                }),
                task: Mutex::new(None),
            }),
        }
    }

    pub async fn watermark(&self) -> i64 {
        self.inner.state.lock().await.watermark
    }

    pub async fn is_polling(&self) -> bool {
        self.inner.state.lock().await.polling_active
    }

    /// Begins polling for `user` on a dashboard page. Restarting is
    /// idempotent: any previous timer is cancelled first. The watermark is
    /// recomputed from whatever the page already shows so pre-existing
    /// questions are not re-announced as new.
    pub async fn start(&self, user: SessionUser, page: Page) {
        if page == Page::Landing || user.class_name.is_empty() {
            return;
        }
        self.stop().await;
        let generation = {
            let mut state = self.inner.state.lock().await;
            state.user = Some(user);
            state.page = page;
            state.polling_active = true;
            state.in_flight = false;
            state.watermark = 0;
            state.generation += 1;
            state.generation
        };
        self.recompute_watermark().await;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            // One early fetch to populate state without waiting out a full
            // interval.
            sleep(inner.config.start_grace).await;
            if !inner.still_active(generation).await {
                return;
            }
            inner.poll().await;

            let period = inner.config.poll_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !inner.still_active(generation).await {
                    break;
                }
                inner.poll().await;
            }
        });
        *self.inner.task.lock().await = Some(handle);
    }

    /// Cancels future ticks. Idempotent; an in-flight fetch is left to finish
    /// on its own (cancellation is cooperative: the driver task notices the
    /// cleared flag at its next tick and retires).
    pub async fn stop(&self) {
        self.inner.state.lock().await.polling_active = false;
        self.inner.task.lock().await.take();
    }

    /// Clears the session and stops polling.
    pub async fn logout(&self) {
        self.inner.state.lock().await.user = None;
        self.stop().await;
    }

    /// One unit of poll work; see [`FeedInner::poll`].
    pub async fn poll(&self) {
        self.inner.poll().await;
    }

    /// Merges items known to be above the watermark into the visible list.
    pub fn insert_new(&self, fresh: &[QuestionWithStats]) {
        self.inner.insert_new(fresh);
    }

    /// Raises the watermark to the maximum rendered id; never lowers it.
    /// Called after any full re-render so the watermark stays consistent
    /// with what the user is actually looking at.
    pub async fn recompute_watermark(&self) {
        let max_rendered = self
            .inner
            .view
            .rendered_ids()
            .into_iter()
            .max()
            .unwrap_or(0);
        let mut state = self.inner.state.lock().await;
        if max_rendered > state.watermark {
            state.watermark = max_rendered;
        }
    }

    /// Accounts for a question the user just posted or re-rendered manually,
    /// so the next poll does not re-announce it.
    pub async fn note_rendered(&self, question_id: i64) {
        let mut state = self.inner.state.lock().await;
        if question_id > state.watermark {
            state.watermark = question_id;
        }
    }
}

impl<S: FeedSource, V: FeedView> FeedInner<S, V> {
    async fn still_active(&self, generation: u64) -> bool {
        let state = self.state.lock().await;
        state.polling_active && state.generation == generation
    }

    /// One unit of poll work. Failures are swallowed: the next tick simply
    /// tries again. A missing session self-terminates the loop, which guards
    /// against a timer that was still pending when the user logged out.
    async fn poll(&self) {
        let (class_name, page) = {
            let mut state = self.state.lock().await;
            let class_name = state
                .user
                .as_ref()
                .map(|u| u.class_name.clone())
                .filter(|c| !c.is_empty());
            match class_name {
                Some(class_name) => {
                    if state.in_flight {
                        return;
                    }
                    state.in_flight = true;
                    (class_name, state.page)
                }
                None => {
                    state.polling_active = false;
                    return;
                }
            }
        };

        let fetched = self.source.today_questions(&class_name).await;
        let questions = match fetched {
            Ok(questions) => questions,
            Err(e) => {
                // Includes server-side errors; the schedule keeps running.
                warn!("feed poll failed: {}", e);
                self.state.lock().await.in_flight = false;
                return;
            }
        };

        let fresh = {
            let mut state = self.state.lock().await;
            state.in_flight = false;
            if state.watermark == 0 && !questions.is_empty() {
                // First contact: adopt the current maximum without treating
                // pre-existing history as new.
                state.watermark = questions.iter().map(|q| q.id).max().unwrap_or(0);
                return;
            }
            let mut fresh: Vec<QuestionWithStats> = questions
                .into_iter()
                .filter(|q| q.id > state.watermark)
                .collect();
            if fresh.is_empty() {
                return;
            }
            fresh.sort_by(|a, b| b.id.cmp(&a.id));
            state.watermark = state.watermark.max(fresh[0].id);
            fresh
        };

        self.insert_new(&fresh);
        self.view.notify_new(fresh.len());

        match page {
            Page::Student => match self.source.top_weekly(&class_name).await {
                Ok(top) => self.view.show_top_weekly(&top),
                Err(e) => warn!("weekly ranking refresh failed: {}", e),
            },
            Page::Teacher => match self.source.teacher_stats(&class_name).await {
                Ok(stats) => self.view.show_teacher_stats(&stats),
                Err(e) => warn!("teacher stats refresh failed: {}", e),
            },
            Page::Landing => {}
        }
    }

    /// Replaces the empty-state placeholder if present, skips ids the list
    /// already shows, and leaves the newest item on top.
    fn insert_new(&self, fresh: &[QuestionWithStats]) {
        if self.view.has_placeholder() {
            self.view.clear_placeholder();
        }
        let rendered: HashSet<i64> = self.view.rendered_ids().into_iter().collect();
        // `fresh` arrives newest-first; prepending oldest-first puts the
        // newest at the top.
        for question in fresh.iter().rev() {
            if rendered.contains(&question.id) {
                continue;
            }
            self.view.prepend(question);
        }
    }
}
