use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use classroom::feed::{FeedConfig, FeedController, FeedSource, FeedView, Page};
use classroom::question::{QuestionWithStats, TeacherStats};
use classroom::user::{Role, SessionUser};
use tokio::time::{sleep, Duration};

fn question(id: i64) -> QuestionWithStats {
    let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    QuestionWithStats {
        id,
        user_id: 1,
        content: format!("question #{}", id),
        reason: Some("because".to_string()),
        category: Some("science".to_string()),
        date,
        created_at: date.and_hms_opt(9, 0, 0).unwrap() + chrono::Duration::seconds(id),
        author_name: "Alice Kim".to_string(),
        author_type: Role::Student,
        class_name: "grade-3-1".to_string(),
        like_count: 0,
        comment_count: 0,
    }
}

fn student() -> SessionUser {
    SessionUser {
        id: 1,
        username: "alice".to_string(),
        full_name: "Alice Kim".to_string(),
        user_type: Role::Student,
        class_name: "grade-3-1".to_string(),
    }
}

/// Serves scripted poll responses; when the script runs out, the feed is
/// quiet (empty today list).
#[derive(Default)]
struct ScriptedSource {
    responses: StdMutex<VecDeque<anyhow::Result<Vec<QuestionWithStats>>>>,
    today_calls: AtomicUsize,
    weekly_calls: AtomicUsize,
    stats_calls: AtomicUsize,
}

impl ScriptedSource {
    fn push(&self, response: anyhow::Result<Vec<QuestionWithStats>>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn today_questions(&self, _class_name: &str) -> anyhow::Result<Vec<QuestionWithStats>> {
        self.today_calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn top_weekly(&self, _class_name: &str) -> anyhow::Result<Vec<QuestionWithStats>> {
        self.weekly_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn teacher_stats(&self, _class_name: &str) -> anyhow::Result<TeacherStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TeacherStats {
            today_questions: 0,
            week_questions: 0,
            active_students: 0,
            total_students: 0,
        })
    }
}

/// Records what the controller does to the page.
#[derive(Default)]
struct RecordingView {
    ids: StdMutex<Vec<i64>>,
    placeholder: AtomicBool,
    notifications: StdMutex<Vec<usize>>,
}

impl RecordingView {
    fn with_ids(ids: &[i64]) -> Arc<Self> {
        let view = Arc::new(Self::default());
        *view.ids.lock().unwrap() = ids.to_vec();
        view
    }

    fn ids(&self) -> Vec<i64> {
        self.ids.lock().unwrap().clone()
    }

    fn notifications(&self) -> Vec<usize> {
        self.notifications.lock().unwrap().clone()
    }
}

impl FeedView for RecordingView {
    fn rendered_ids(&self) -> Vec<i64> {
        self.ids.lock().unwrap().clone()
    }

    fn has_placeholder(&self) -> bool {
        self.placeholder.load(Ordering::SeqCst)
    }

    fn clear_placeholder(&self) {
        self.placeholder.store(false, Ordering::SeqCst);
    }

    fn prepend(&self, question: &QuestionWithStats) {
        self.ids.lock().unwrap().insert(0, question.id);
    }

    fn notify_new(&self, count: usize) {
        self.notifications.lock().unwrap().push(count);
    }

    fn show_top_weekly(&self, _questions: &[QuestionWithStats]) {}

    fn show_teacher_stats(&self, _stats: &TeacherStats) {}
}

/// A config whose timer effectively never fires, for tests that drive
/// `poll()` by hand.
fn manual_config() -> FeedConfig {
    FeedConfig {
        poll_interval: Duration::from_secs(3600),
        start_grace: Duration::from_secs(3600),
    }
}

type Controller = FeedController<Arc<ScriptedSource>, Arc<RecordingView>>;

fn controller(
    view: Arc<RecordingView>,
    config: FeedConfig,
) -> (Controller, Arc<ScriptedSource>) {
    let source = Arc::new(ScriptedSource::default());
    let controller = FeedController::new(Arc::clone(&source), view, config);
    (controller, source)
}

#[tokio::test]
async fn test_first_contact_bootstrap_does_not_announce_history() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;
    assert_eq!(ctrl.watermark().await, 0);

    source.push(Ok(vec![question(5), question(7), question(9)]));
    ctrl.poll().await;

    assert_eq!(ctrl.watermark().await, 9);
    assert!(view.notifications().is_empty());
    assert!(view.ids().is_empty());
    ctrl.stop().await;
}

#[tokio::test]
async fn test_new_items_merge_on_top_in_descending_order() {
    let view = RecordingView::with_ids(&[9, 7, 5]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;
    assert_eq!(ctrl.watermark().await, 9);

    source.push(Ok(vec![
        question(5),
        question(7),
        question(9),
        question(12),
        question(13),
    ]));
    ctrl.poll().await;

    assert_eq!(view.ids(), vec![13, 12, 9, 7, 5]);
    assert_eq!(ctrl.watermark().await, 13);
    assert_eq!(view.notifications(), vec![2]);
    // The student page also refreshes the weekly ranking.
    assert_eq!(source.weekly_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.stats_calls.load(Ordering::SeqCst), 0);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_stale_response_changes_nothing() {
    let view = RecordingView::with_ids(&[9, 7, 5]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;

    source.push(Ok(vec![question(5), question(7), question(9)]));
    ctrl.poll().await;

    assert_eq!(view.ids(), vec![9, 7, 5]);
    assert_eq!(ctrl.watermark().await, 9);
    assert!(view.notifications().is_empty());
    ctrl.stop().await;
}

#[tokio::test]
async fn test_watermark_is_monotonic() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;

    source.push(Ok(vec![question(3)]));
    ctrl.poll().await;
    assert_eq!(ctrl.watermark().await, 3);

    // A response that only contains older ids cannot lower it.
    source.push(Ok(vec![question(2)]));
    ctrl.poll().await;
    assert_eq!(ctrl.watermark().await, 3);
    assert!(view.notifications().is_empty());

    source.push(Ok(Vec::new()));
    ctrl.poll().await;
    assert_eq!(ctrl.watermark().await, 3);

    ctrl.recompute_watermark().await;
    assert_eq!(ctrl.watermark().await, 3);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_already_rendered_items_are_not_duplicated() {
    let view = RecordingView::with_ids(&[9]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;
    assert_eq!(ctrl.watermark().await, 9);

    // A manual refresh already rendered 12 without telling the controller.
    view.ids.lock().unwrap().insert(0, 12);

    source.push(Ok(vec![question(9), question(12), question(13)]));
    ctrl.poll().await;

    assert_eq!(view.ids(), vec![13, 12, 9]);
    assert_eq!(ctrl.watermark().await, 13);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_start_adopts_the_rendered_maximum() {
    let view = RecordingView::with_ids(&[42, 17]);
    let (ctrl, _source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;
    assert_eq!(ctrl.watermark().await, 42);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_start_requires_a_dashboard_and_a_class() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, _source) = controller(Arc::clone(&view), manual_config());

    ctrl.start(student(), Page::Landing).await;
    assert!(!ctrl.is_polling().await);

    let mut classless = student();
    classless.class_name = String::new();
    ctrl.start(classless, Page::Student).await;
    assert!(!ctrl.is_polling().await);
}

#[tokio::test]
async fn test_poll_without_a_session_self_terminates() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;
    assert!(ctrl.is_polling().await);

    ctrl.logout().await;
    ctrl.poll().await;

    assert!(!ctrl.is_polling().await);
    assert_eq!(source.today_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_failure_is_swallowed_and_polling_continues() {
    let view = RecordingView::with_ids(&[5]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;

    source.push(Err(anyhow!("503 service unavailable")));
    ctrl.poll().await;
    assert_eq!(view.ids(), vec![5]);
    assert_eq!(ctrl.watermark().await, 5);
    assert!(ctrl.is_polling().await);

    source.push(Ok(vec![question(5), question(6)]));
    ctrl.poll().await;
    assert_eq!(view.ids(), vec![6, 5]);
    assert_eq!(ctrl.watermark().await, 6);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_teacher_page_refreshes_stats_instead_of_ranking() {
    let view = RecordingView::with_ids(&[1]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    let mut teacher = student();
    teacher.user_type = Role::Teacher;
    ctrl.start(teacher, Page::Teacher).await;

    source.push(Ok(vec![question(1), question(2)]));
    ctrl.poll().await;

    assert_eq!(source.stats_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.weekly_calls.load(Ordering::SeqCst), 0);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_placeholder_is_replaced_by_the_first_insert() {
    let view = RecordingView::with_ids(&[]);
    view.placeholder.store(true, Ordering::SeqCst);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;

    // Bootstrap first, then something new arrives.
    source.push(Ok(vec![question(1)]));
    ctrl.poll().await;
    source.push(Ok(vec![question(1), question(2)]));
    ctrl.poll().await;

    assert!(!view.has_placeholder());
    assert_eq!(view.ids(), vec![2]);
    ctrl.stop().await;
}

#[tokio::test]
async fn test_stop_halts_the_schedule() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, source) = controller(
        Arc::clone(&view),
        FeedConfig {
            poll_interval: Duration::from_millis(20),
            start_grace: Duration::from_millis(5),
        },
    );
    ctrl.start(student(), Page::Student).await;

    sleep(Duration::from_millis(120)).await;
    let polled = source.today_calls.load(Ordering::SeqCst);
    assert!(polled >= 2, "expected a few polls, saw {}", polled);

    ctrl.stop().await;
    // Let any final in-flight tick settle, then confirm silence.
    sleep(Duration::from_millis(40)).await;
    let after_stop = source.today_calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(120)).await;
    assert_eq!(source.today_calls.load(Ordering::SeqCst), after_stop);
    assert!(!ctrl.is_polling().await);
}

#[tokio::test]
async fn test_restart_is_idempotent_and_single_threaded() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, source) = controller(
        Arc::clone(&view),
        FeedConfig {
            poll_interval: Duration::from_millis(30),
            start_grace: Duration::from_millis(5),
        },
    );
    ctrl.start(student(), Page::Student).await;
    ctrl.start(student(), Page::Student).await;
    ctrl.start(student(), Page::Student).await;

    sleep(Duration::from_millis(100)).await;
    ctrl.stop().await;
    sleep(Duration::from_millis(60)).await;

    // Roughly one driver's worth of polls, not three.
    let polled = source.today_calls.load(Ordering::SeqCst);
    assert!(polled >= 2, "expected a few polls, saw {}", polled);
    assert!(polled <= 6, "expected one schedule, saw {} polls", polled);
}

#[tokio::test]
async fn test_manual_render_raises_the_watermark() {
    let view = RecordingView::with_ids(&[]);
    let (ctrl, source) = controller(Arc::clone(&view), manual_config());
    ctrl.start(student(), Page::Student).await;

    source.push(Ok(vec![question(4)]));
    ctrl.poll().await;
    assert_eq!(ctrl.watermark().await, 4);

    // The user posts question 8; the page renders it immediately.
    view.ids.lock().unwrap().insert(0, 8);
    ctrl.note_rendered(8).await;
    assert_eq!(ctrl.watermark().await, 8);

    // The next poll sees it as already known.
    source.push(Ok(vec![question(4), question(8)]));
    ctrl.poll().await;
    assert!(view.notifications().is_empty());
    assert_eq!(view.ids(), vec![8]);
    ctrl.stop().await;
}
