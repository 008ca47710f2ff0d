// PanelController - owns the injected chat panel's lifecycle: mounting on
// host-ready, context refresh on navigation, and serialization of ask
// requests against the answering service.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::client::{AnswerSource, AskError, SERVER_ERROR_MSG};
use super::context::ContextSource;
use crate::browser::observer::PageEvent;
use crate::browser::transcript::TranscriptResult;
use crate::browser::youtube::{VideoContext, VideoMetadata};
use crate::error::AppError;
use crate::settings::SettingsManager;

/// Wait inserted after navigation so the host page finishes rebuilding
/// before the watch page is re-scraped.
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Theme re-classing is cosmetic; cap it to avoid observer-callback storms.
const THEME_THROTTLE: Duration = Duration::from_millis(500);

pub const WELCOME_MESSAGE: &str = "Welcome! Ask me anything about this video...";

/// Question issued by the single-use summarize quick action.
const SUMMARIZE_QUESTION: &str = "What is this video about? Give a brief summary.";

/// Who a chat bubble belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// A single rendered message. Append-only: never edited, never reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: String, // "HH:MM:SS"
}

impl ChatMessage {
    fn now(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

/// Nested conversational state while the panel is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversation {
    Idle,
    AwaitingAnswer,
}

/// Panel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    Mounted {
        collapsed: bool,
        conversation: Conversation,
    },
    Unmounted,
}

/// Render seam for the injected panel UI.
///
/// The controller drives these callbacks; implementations only draw.
/// Mounting must replace any pre-existing panel instance so host-page DOM
/// rebuilds cannot produce duplicates.
pub trait PanelSurface: Send + Sync {
    fn mount(&self, collapsed: bool);
    fn unmount(&self);
    fn set_collapsed(&self, collapsed: bool);
    fn set_dark_mode(&self, dark: bool);
    fn clear_messages(&self);
    fn push_message(&self, message: &ChatMessage);
    /// Inline notice (e.g. "transcript unavailable"); not a chat bubble.
    fn push_notice(&self, text: &str);
    /// Show the refreshed video metadata at the top of the pane.
    fn show_context(&self, metadata: &VideoMetadata);
    fn set_thinking(&self, thinking: bool);
}

/// Point-in-time view of the controller, for tests and diagnostics.
#[derive(Debug, Clone)]
pub struct PanelSnapshot {
    pub state: PanelState,
    pub messages: Vec<ChatMessage>,
    pub context: VideoContext,
    pub summarize_used: bool,
}

enum Input {
    Page(PageEvent),
    Ask(String),
    Summarize,
    ToggleCollapse,
    ContextReady {
        epoch: u64,
        metadata: VideoMetadata,
        transcript: TranscriptResult,
    },
    AnswerReady {
        epoch: u64,
        result: Result<String, AskError>,
    },
    Snapshot(oneshot::Sender<PanelSnapshot>),
    Stop,
}

/// Handle for feeding user actions into a running controller.
#[derive(Clone)]
pub struct PanelHandle {
    tx: mpsc::Sender<Input>,
}

impl PanelHandle {
    /// Submit a question. Empty text and submissions while an answer is
    /// outstanding are dropped by the controller.
    pub async fn ask(&self, question: String) {
        let _ = self.tx.send(Input::Ask(question)).await;
    }

    /// Trigger the single-use summarize quick action.
    pub async fn summarize(&self) {
        let _ = self.tx.send(Input::Summarize).await;
    }

    /// Flip and persist the collapse preference.
    pub async fn toggle_collapse(&self) {
        let _ = self.tx.send(Input::ToggleCollapse).await;
    }

    /// Unmount the panel and end the controller task.
    pub async fn stop(&self) {
        let _ = self.tx.send(Input::Stop).await;
    }

    /// Current controller state. Returns None if the controller is gone.
    pub async fn snapshot(&self) -> Option<PanelSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Input::Snapshot(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }
}

/// The panel controller. Construct with `new`, then `start` it with the
/// observer's event stream; all side effects happen after start.
pub struct PanelController {
    surface: Arc<dyn PanelSurface>,
    answers: Arc<dyn AnswerSource>,
    source: Arc<dyn ContextSource>,
    settings: Arc<SettingsManager>,
    settle_delay: Duration,
    theme_throttle: Duration,
}

impl PanelController {
    pub fn new(
        surface: Arc<dyn PanelSurface>,
        answers: Arc<dyn AnswerSource>,
        source: Arc<dyn ContextSource>,
        settings: Arc<SettingsManager>,
    ) -> Self {
        Self {
            surface,
            answers,
            source,
            settings,
            settle_delay: SETTLE_DELAY,
            theme_throttle: THEME_THROTTLE,
        }
    }

    /// Shorter delays for tests.
    #[cfg(test)]
    fn with_timing(mut self, settle_delay: Duration, theme_throttle: Duration) -> Self {
        self.settle_delay = settle_delay;
        self.theme_throttle = theme_throttle;
        self
    }

    /// Start the controller task.
    ///
    /// Page events from `events_rx` and user actions from the returned
    /// handle are processed on one task, in arrival order - observers only
    /// enqueue work, nothing runs reentrant with a handler.
    pub fn start(self, mut events_rx: mpsc::Receiver<PageEvent>) -> Result<PanelHandle, AppError> {
        let (tx, rx) = mpsc::channel::<Input>(32);

        // Bridge page events into the single input stream.
        let bridge_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if bridge_tx.send(Input::Page(event)).await.is_err() {
                    break;
                }
            }
        });

        let loop_tx = tx.clone();
        tokio::spawn(async move {
            self.run(loop_tx, rx).await;
        });

        Ok(PanelHandle { tx })
    }

    async fn run(self, tx: mpsc::Sender<Input>, mut rx: mpsc::Receiver<Input>) {
        let mut state = PanelState::Uninitialized;
        let mut messages: Vec<ChatMessage> = Vec::new();
        let mut context = VideoContext::empty();
        let mut epoch: u64 = 0;
        let mut summarize_used = false;
        let mut last_theme_update: Option<Instant> = None;

        while let Some(input) = rx.recv().await {
            match input {
                Input::Page(PageEvent::HostReady { video_id, url }) => {
                    eprintln!("Panel: Host ready at {}", url);

                    // Remove any pre-existing instance before re-inserting.
                    if matches!(state, PanelState::Mounted { .. }) {
                        self.surface.unmount();
                    }

                    let collapsed = self.settings.get().panel.collapsed;
                    state = PanelState::Mounted {
                        collapsed,
                        conversation: Conversation::Idle,
                    };
                    summarize_used = false;
                    self.surface.mount(collapsed);

                    epoch += 1;
                    Self::reset_conversation(&self.surface, &mut messages);
                    self.spawn_refresh(&tx, epoch, video_id);
                }

                Input::Page(PageEvent::Navigated { video_id, url }) => {
                    if !matches!(state, PanelState::Mounted { .. }) {
                        continue;
                    }
                    eprintln!("Panel: Navigation to {}", url);

                    // New page supersedes everything: conversation history is
                    // discarded and any in-flight completion goes stale.
                    epoch += 1;
                    if let PanelState::Mounted { conversation, .. } = &mut state {
                        *conversation = Conversation::Idle;
                    }
                    self.surface.set_thinking(false);
                    Self::reset_conversation(&self.surface, &mut messages);
                    self.spawn_refresh(&tx, epoch, video_id);
                }

                Input::Page(PageEvent::ThemeChanged { dark }) => {
                    if !matches!(state, PanelState::Mounted { .. }) {
                        continue;
                    }
                    let now = Instant::now();
                    let throttled = last_theme_update
                        .map(|t| now.duration_since(t) < self.theme_throttle)
                        .unwrap_or(false);
                    if throttled {
                        continue;
                    }
                    last_theme_update = Some(now);
                    self.surface.set_dark_mode(dark);
                }

                Input::ContextReady {
                    epoch: ready_epoch,
                    metadata,
                    transcript,
                } => {
                    // Results for a superseded page, or for a panel that no
                    // longer exists, are dropped silently.
                    if ready_epoch != epoch || !matches!(state, PanelState::Mounted { .. }) {
                        eprintln!("Panel: Dropping stale context refresh");
                        continue;
                    }

                    self.surface.show_context(&metadata);

                    let transcript_text = match transcript {
                        TranscriptResult::Transcript { text, .. } => text,
                        TranscriptResult::Unavailable { message } => {
                            self.surface.push_notice(&message);
                            String::new()
                        }
                    };

                    // Superseded wholesale, never merged.
                    context = VideoContext {
                        transcript: transcript_text,
                        metadata,
                    };
                }

                Input::Ask(question) => {
                    let question = question.trim().to_string();
                    if question.is_empty() {
                        continue;
                    }
                    self.begin_ask(&tx, &mut state, &mut messages, &context, epoch, question);
                }

                Input::Summarize => {
                    // Single-use per mount; navigation within the same mount
                    // does not re-arm it.
                    if summarize_used {
                        eprintln!("Panel: Summarize already used this mount, ignoring");
                        continue;
                    }
                    if !matches!(
                        state,
                        PanelState::Mounted {
                            conversation: Conversation::Idle,
                            ..
                        }
                    ) {
                        continue;
                    }
                    summarize_used = true;
                    self.begin_ask(
                        &tx,
                        &mut state,
                        &mut messages,
                        &context,
                        epoch,
                        SUMMARIZE_QUESTION.to_string(),
                    );
                }

                Input::AnswerReady {
                    epoch: ready_epoch,
                    result,
                } => {
                    // Dead-panel guard: the page (or panel) this answer was
                    // for may be gone.
                    if ready_epoch != epoch || !matches!(state, PanelState::Mounted { .. }) {
                        eprintln!("Panel: Dropping answer for a stale panel");
                        continue;
                    }

                    self.surface.set_thinking(false);

                    let message = match result {
                        Ok(answer) => ChatMessage::now(Role::Assistant, answer),
                        Err(e) => {
                            eprintln!("Panel: Ask failed: {}", e);
                            ChatMessage::now(Role::Error, SERVER_ERROR_MSG)
                        }
                    };
                    messages.push(message.clone());
                    self.surface.push_message(&message);

                    if let PanelState::Mounted { conversation, .. } = &mut state {
                        *conversation = Conversation::Idle;
                    }
                }

                Input::ToggleCollapse => {
                    if let PanelState::Mounted { collapsed, .. } = &mut state {
                        *collapsed = !*collapsed;
                        self.surface.set_collapsed(*collapsed);
                        if let Err(e) = self.settings.set_panel_collapsed(*collapsed) {
                            eprintln!("Panel: Failed to persist collapse preference: {}", e);
                        }
                    }
                }

                Input::Snapshot(reply_tx) => {
                    let _ = reply_tx.send(PanelSnapshot {
                        state,
                        messages: messages.clone(),
                        context: context.clone(),
                        summarize_used,
                    });
                }

                Input::Stop => {
                    if matches!(state, PanelState::Mounted { .. }) {
                        self.surface.unmount();
                    }
                    state = PanelState::Unmounted;
                    let _ = state; // terminal
                    eprintln!("Panel: Controller stopped");
                    break;
                }
            }
        }
    }

    /// Clear the pane back to its welcome state.
    fn reset_conversation(surface: &Arc<dyn PanelSurface>, messages: &mut Vec<ChatMessage>) {
        messages.clear();
        surface.clear_messages();
        let welcome = ChatMessage::now(Role::Assistant, WELCOME_MESSAGE);
        messages.push(welcome.clone());
        surface.push_message(&welcome);
    }

    /// Issue the context refresh for `video_id` after the settle delay.
    ///
    /// Metadata and transcript are fetched concurrently and joined; one
    /// side failing never blocks the other's result.
    fn spawn_refresh(&self, tx: &mpsc::Sender<Input>, epoch: u64, video_id: String) {
        let source = self.source.clone();
        let settle_delay = self.settle_delay;
        let tx = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            let (metadata, transcript) = tokio::join!(
                source.fetch_metadata(&video_id),
                source.fetch_transcript(&video_id),
            );
            let _ = tx
                .send(Input::ContextReady {
                    epoch,
                    metadata,
                    transcript,
                })
                .await;
        });
    }

    /// Append the user message and issue exactly one answering call.
    ///
    /// Only legal from Mounted/Idle. A submission while an answer is
    /// outstanding is dropped - not queued, not replacing the in-flight
    /// request.
    fn begin_ask(
        &self,
        tx: &mpsc::Sender<Input>,
        state: &mut PanelState,
        messages: &mut Vec<ChatMessage>,
        context: &VideoContext,
        epoch: u64,
        question: String,
    ) {
        match state {
            PanelState::Mounted { conversation, .. } => match conversation {
                Conversation::AwaitingAnswer => {
                    eprintln!("Panel: Ask ignored, an answer is already outstanding");
                    return;
                }
                Conversation::Idle => {
                    *conversation = Conversation::AwaitingAnswer;
                }
            },
            _ => return,
        }

        let message = ChatMessage::now(Role::User, question.clone());
        messages.push(message.clone());
        self.surface.push_message(&message);
        self.surface.set_thinking(true);

        let answers = self.answers.clone();
        let context = context.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = answers.ask(&question, &context).await;
            let _ = tx.send(Input::AnswerReady { epoch, result }).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::transcript::NO_TRANSCRIPT_MSG;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ── Test doubles ──

    /// Surface that records every call it receives.
    #[derive(Default)]
    struct RecordingSurface {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingSurface {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl PanelSurface for RecordingSurface {
        fn mount(&self, collapsed: bool) {
            self.record(format!("mount({})", collapsed));
        }
        fn unmount(&self) {
            self.record("unmount");
        }
        fn set_collapsed(&self, collapsed: bool) {
            self.record(format!("set_collapsed({})", collapsed));
        }
        fn set_dark_mode(&self, dark: bool) {
            self.record(format!("set_dark_mode({})", dark));
        }
        fn clear_messages(&self) {
            self.record("clear_messages");
        }
        fn push_message(&self, message: &ChatMessage) {
            self.record(format!("push_message({:?}:{})", message.role, message.text));
        }
        fn push_notice(&self, text: &str) {
            self.record(format!("push_notice({})", text));
        }
        fn show_context(&self, metadata: &VideoMetadata) {
            self.record(format!("show_context({})", metadata.title));
        }
        fn set_thinking(&self, thinking: bool) {
            self.record(format!("set_thinking({})", thinking));
        }
    }

    /// Answer source with a configurable delay, outcome, and call counter.
    struct FakeAnswers {
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeAnswers {
        fn new(delay: Duration, fail: bool) -> Self {
            Self {
                delay,
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AnswerSource for FakeAnswers {
        async fn ask(&self, question: &str, _context: &VideoContext) -> Result<String, AskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(AskError {
                    status: Some(500),
                    detail: "boom".into(),
                })
            } else {
                Ok(format!("answer to {}", question))
            }
        }
    }

    /// Context source returning canned data, counting refreshes.
    struct FakeSource {
        transcript: TranscriptResult,
        refreshes: AtomicUsize,
    }

    impl FakeSource {
        fn new(transcript: TranscriptResult) -> Self {
            Self {
                transcript,
                refreshes: AtomicUsize::new(0),
            }
        }
        fn with_transcript() -> Self {
            Self::new(TranscriptResult::Transcript {
                text: "line one\nline two".into(),
                language: "en".into(),
                is_translated: false,
            })
        }
    }

    #[async_trait]
    impl ContextSource for FakeSource {
        async fn fetch_metadata(&self, video_id: &str) -> VideoMetadata {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            VideoMetadata {
                title: format!("video {}", video_id),
                ..VideoMetadata::placeholder()
            }
        }
        async fn fetch_transcript(&self, _video_id: &str) -> TranscriptResult {
            self.transcript.clone()
        }
    }

    struct Fixture {
        surface: Arc<RecordingSurface>,
        answers: Arc<FakeAnswers>,
        source: Arc<FakeSource>,
        handle: PanelHandle,
        events_tx: mpsc::Sender<PageEvent>,
        _temp: tempfile::TempDir,
    }

    fn start_panel(answers: FakeAnswers, source: FakeSource) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let settings = Arc::new(
            SettingsManager::new_with_path(temp.path().join("settings.json")).unwrap(),
        );
        let surface = Arc::new(RecordingSurface::default());
        let answers = Arc::new(answers);
        let source = Arc::new(source);

        let controller = PanelController::new(
            surface.clone(),
            answers.clone(),
            source.clone(),
            settings,
        )
        .with_timing(Duration::from_millis(10), Duration::from_millis(100));

        let (events_tx, events_rx) = mpsc::channel(16);
        let handle = controller.start(events_rx).unwrap();

        Fixture {
            surface,
            answers,
            source,
            handle,
            events_tx,
            _temp: temp,
        }
    }

    fn host_ready() -> PageEvent {
        PageEvent::HostReady {
            video_id: "aaaaaaaaaaa".into(),
            url: "https://www.youtube.com/watch?v=aaaaaaaaaaa".into(),
        }
    }

    fn navigated(id: &str) -> PageEvent {
        PageEvent::Navigated {
            video_id: id.into(),
            url: format!("https://www.youtube.com/watch?v={}", id),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    // ── Lifecycle ──

    #[tokio::test]
    async fn test_host_ready_mounts_and_refreshes() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        assert_eq!(
            snap.state,
            PanelState::Mounted {
                collapsed: false,
                conversation: Conversation::Idle
            }
        );
        assert_eq!(snap.context.transcript, "line one\nline two");
        assert_eq!(snap.context.metadata.title, "video aaaaaaaaaaa");
        assert_eq!(fx.source.refreshes.load(Ordering::SeqCst), 1);

        let calls = fx.surface.calls();
        assert!(calls.contains(&"mount(false)".to_string()));
        assert!(calls.contains(&"show_context(video aaaaaaaaaaa)".to_string()));
    }

    #[tokio::test]
    async fn test_remount_removes_previous_panel_first() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;

        let calls = fx.surface.calls();
        let unmount_pos = calls.iter().position(|c| c == "unmount").unwrap();
        let second_mount_pos = calls.iter().rposition(|c| c == "mount(false)").unwrap();
        assert!(unmount_pos < second_mount_pos);
    }

    #[tokio::test]
    async fn test_transcript_unavailable_renders_notice() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::new(TranscriptResult::Unavailable {
                message: NO_TRANSCRIPT_MSG.into(),
            }),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        assert_eq!(snap.context.transcript, "");
        assert!(fx
            .surface
            .calls()
            .contains(&format!("push_notice({})", NO_TRANSCRIPT_MSG)));
    }

    #[tokio::test]
    async fn test_events_before_mount_are_ignored() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(navigated("bbbbbbbbbbb")).await.unwrap();
        fx.handle.ask("hello?".into()).await;
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        assert_eq!(snap.state, PanelState::Uninitialized);
        assert!(snap.messages.is_empty());
        assert_eq!(fx.source.refreshes.load(Ordering::SeqCst), 0);
    }

    // ── Ask serialization ──

    #[tokio::test]
    async fn test_ask_appends_answer_and_returns_to_idle() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.ask("what is this?".into()).await;
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        assert_eq!(
            snap.state,
            PanelState::Mounted {
                collapsed: false,
                conversation: Conversation::Idle
            }
        );
        // welcome + user + assistant
        assert_eq!(snap.messages.len(), 3);
        assert_eq!(snap.messages[1].role, Role::User);
        assert_eq!(snap.messages[1].text, "what is this?");
        assert_eq!(snap.messages[2].role, Role::Assistant);
        assert_eq!(snap.messages[2].text, "answer to what is this?");

        // Thinking placeholder was shown and removed.
        let calls = fx.surface.calls();
        assert!(calls.contains(&"set_thinking(true)".to_string()));
        assert!(calls.contains(&"set_thinking(false)".to_string()));
    }

    #[tokio::test]
    async fn test_second_ask_while_awaiting_is_dropped() {
        let fx = start_panel(
            FakeAnswers::new(Duration::from_millis(80), false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.ask("first".into()).await;
        fx.handle.ask("second".into()).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Only one call ever reached the answer source.
        assert_eq!(fx.answers.calls.load(Ordering::SeqCst), 1);

        let snap = fx.handle.snapshot().await.unwrap();
        // welcome + first user message + its answer; "second" left no trace.
        assert_eq!(snap.messages.len(), 3);
        assert_eq!(snap.messages[1].text, "first");
        assert_eq!(snap.messages[2].text, "answer to first");
    }

    #[tokio::test]
    async fn test_empty_ask_is_ignored() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.ask("   ".into()).await;
        settle().await;

        assert_eq!(fx.answers.calls.load(Ordering::SeqCst), 0);
        let snap = fx.handle.snapshot().await.unwrap();
        assert_eq!(snap.messages.len(), 1); // welcome only
    }

    #[tokio::test]
    async fn test_failed_ask_shows_generic_error_and_recovers() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, true),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.ask("doomed".into()).await;
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        assert_eq!(snap.messages[2].role, Role::Error);
        assert_eq!(snap.messages[2].text, SERVER_ERROR_MSG);
        assert_eq!(
            snap.state,
            PanelState::Mounted {
                collapsed: false,
                conversation: Conversation::Idle
            }
        );

        // The panel is usable again after the failure.
        fx.handle.ask("again".into()).await;
        settle().await;
        assert_eq!(fx.answers.calls.load(Ordering::SeqCst), 2);
    }

    // ── Navigation ──

    #[tokio::test]
    async fn test_navigation_clears_conversation_and_reissues_refresh() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.ask("remember me".into()).await;
        settle().await;

        fx.events_tx.send(navigated("bbbbbbbbbbb")).await.unwrap();
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        // Back to welcome state only; history discarded by design.
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].text, WELCOME_MESSAGE);
        assert_eq!(snap.context.metadata.title, "video bbbbbbbbbbb");
        assert_eq!(fx.source.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rapid_navigations_each_clear_and_refresh() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        // Navigate again before the first refresh can possibly finish.
        fx.events_tx.send(navigated("bbbbbbbbbbb")).await.unwrap();
        settle().await;
        settle().await;

        let snap = fx.handle.snapshot().await.unwrap();
        // Only the latest navigation's context survives.
        assert_eq!(snap.context.metadata.title, "video bbbbbbbbbbb");
        assert_eq!(snap.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_arriving_after_navigation_is_dropped() {
        let fx = start_panel(
            FakeAnswers::new(Duration::from_millis(80), false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.ask("slow question".into()).await;
        // Navigate while the answer is in flight.
        fx.events_tx.send(navigated("bbbbbbbbbbb")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let snap = fx.handle.snapshot().await.unwrap();
        // The stale answer never rendered.
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].text, WELCOME_MESSAGE);
        assert_eq!(
            snap.state,
            PanelState::Mounted {
                collapsed: false,
                conversation: Conversation::Idle
            }
        );
    }

    // ── Summarize quick action ──

    #[tokio::test]
    async fn test_summarize_is_single_use_per_mount() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.summarize().await;
        settle().await;
        fx.handle.summarize().await;
        settle().await;

        assert_eq!(fx.answers.calls.load(Ordering::SeqCst), 1);

        // Navigation within the same mount does not re-arm it.
        fx.events_tx.send(navigated("bbbbbbbbbbb")).await.unwrap();
        settle().await;
        fx.handle.summarize().await;
        settle().await;
        assert_eq!(fx.answers.calls.load(Ordering::SeqCst), 1);

        // A fresh mount does.
        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.summarize().await;
        settle().await;
        assert_eq!(fx.answers.calls.load(Ordering::SeqCst), 2);
    }

    // ── Collapse + theme ──

    #[tokio::test]
    async fn test_toggle_collapse_updates_surface_and_persists() {
        let temp = tempfile::tempdir().unwrap();
        let settings_path = temp.path().join("settings.json");
        let settings =
            Arc::new(SettingsManager::new_with_path(settings_path.clone()).unwrap());
        let surface = Arc::new(RecordingSurface::default());
        let controller = PanelController::new(
            surface.clone(),
            Arc::new(FakeAnswers::new(Duration::ZERO, false)),
            Arc::new(FakeSource::with_transcript()),
            settings.clone(),
        )
        .with_timing(Duration::from_millis(10), Duration::from_millis(100));

        let (events_tx, events_rx) = mpsc::channel(16);
        let handle = controller.start(events_rx).unwrap();

        events_tx.send(host_ready()).await.unwrap();
        settle().await;
        handle.toggle_collapse().await;
        settle().await;

        assert!(surface.calls().contains(&"set_collapsed(true)".to_string()));
        assert!(settings.get().panel.collapsed);

        // A controller over a fresh settings manager reading the same file
        // mounts collapsed - the preference survives a reload.
        let reloaded = SettingsManager::new_with_path(settings_path).unwrap();
        assert!(reloaded.get().panel.collapsed);
    }

    #[tokio::test]
    async fn test_theme_changes_are_throttled() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;

        // A burst of flips inside the throttle window renders once.
        for dark in [true, false, true, false] {
            fx.events_tx
                .send(PageEvent::ThemeChanged { dark })
                .await
                .unwrap();
        }
        settle().await;

        let theme_calls = fx
            .surface
            .calls()
            .iter()
            .filter(|c| c.starts_with("set_dark_mode"))
            .count();
        assert_eq!(theme_calls, 1);

        // After the window passes, the next flip renders.
        tokio::time::sleep(Duration::from_millis(120)).await;
        fx.events_tx
            .send(PageEvent::ThemeChanged { dark: true })
            .await
            .unwrap();
        settle().await;

        let theme_calls = fx
            .surface
            .calls()
            .iter()
            .filter(|c| c.starts_with("set_dark_mode"))
            .count();
        assert_eq!(theme_calls, 2);
    }

    // ── Teardown ──

    #[tokio::test]
    async fn test_stop_unmounts_and_ends_the_controller() {
        let fx = start_panel(
            FakeAnswers::new(Duration::ZERO, false),
            FakeSource::with_transcript(),
        );

        fx.events_tx.send(host_ready()).await.unwrap();
        settle().await;
        fx.handle.stop().await;
        settle().await;

        assert!(fx.surface.calls().contains(&"unmount".to_string()));
        assert!(fx.handle.snapshot().await.is_none());
    }
}
