// Page observer - polls the host browser for the active tab URL and theme,
// and turns changes into panel controller events.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::youtube::extract_video_id;
use crate::error::AppError;

/// How often the probe is polled.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to keep looking for the first watch page before giving up on
/// mounting. Navigation watching continues past this deadline only if the
/// panel mounted in time.
const MOUNT_DEADLINE: Duration = Duration::from_secs(10);

/// Events emitted toward the panel controller.
///
/// Observers only ever enqueue controller work - they never run handler
/// logic themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// The host page's mount point became available for the first time.
    HostReady { video_id: String, url: String },
    /// The page navigated to a different watch page without a full reload.
    Navigated { video_id: String, url: String },
    /// The host page's theme flipped. Cosmetic only.
    ThemeChanged { dark: bool },
}

/// Source of the host page's observable state.
///
/// Abstracts the browser so the observer can be driven by a real browser
/// probe in production and a scripted fake in tests.
#[async_trait]
pub trait PageProbe: Send + Sync {
    /// The URL of the active tab.
    async fn current_url(&self) -> Result<String, String>;

    /// Whether the host page is in dark mode. Probe failure is treated as
    /// "no change" by the observer.
    async fn dark_mode(&self) -> Result<bool, String> {
        Ok(false)
    }
}

/// Probes Google Chrome through AppleScript.
pub struct ChromeProbe;

#[async_trait]
impl PageProbe for ChromeProbe {
    async fn current_url(&self) -> Result<String, String> {
        run_osascript("tell application \"Google Chrome\" to return URL of active tab of front window")
            .await
    }

    async fn dark_mode(&self) -> Result<bool, String> {
        let script = "tell application \"Google Chrome\" to tell active tab of front window to \
                      execute javascript \"document.documentElement.hasAttribute('dark')\"";
        let output = run_osascript(script).await?;
        Ok(output == "true")
    }
}

/// Execute an AppleScript snippet, with a timeout so an unresponsive
/// browser cannot hang the polling loop.
async fn run_osascript(script: &str) -> Result<String, String> {
    let output = tokio::time::timeout(
        Duration::from_secs(2),
        tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output(),
    )
    .await
    .map_err(|_| "AppleScript execution timed out after 2 seconds".to_string())?
    .map_err(|e| format!("Failed to execute osascript: {}", e))?;

    if !output.status.success() {
        return Err("Browser not running or no windows".to_string());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Watches the host browser and emits PageEvents.
pub struct PageObserver {
    probe: Arc<dyn PageProbe>,
    poll_interval: Duration,
    mount_deadline: Duration,
    stop_tx: Option<watch::Sender<bool>>,
    is_running: bool,
}

impl PageObserver {
    pub fn new(probe: Arc<dyn PageProbe>) -> Self {
        Self {
            probe,
            poll_interval: POLL_INTERVAL,
            mount_deadline: MOUNT_DEADLINE,
            stop_tx: None,
            is_running: false,
        }
    }

    /// Shorter intervals for tests.
    #[cfg(test)]
    pub fn with_timing(probe: Arc<dyn PageProbe>, poll_interval: Duration, mount_deadline: Duration) -> Self {
        Self {
            probe,
            poll_interval,
            mount_deadline,
            stop_tx: None,
            is_running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Start the observer.
    ///
    /// Spawns a background task that polls the probe and sends events into
    /// `events_tx`. Returns an error if already running.
    pub fn start(&mut self, events_tx: mpsc::Sender<PageEvent>) -> Result<(), AppError> {
        if self.is_running {
            return Err(AppError::AlreadyRunning("Page observer"));
        }

        eprintln!("PageObserver: Starting observer");

        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.is_running = true;

        let probe = self.probe.clone();
        let poll_interval = self.poll_interval;
        let mount_deadline = Instant::now() + self.mount_deadline;

        tokio::spawn(async move {
            let mut mounted = false;
            let mut last_url = String::new();
            let mut last_dark: Option<bool> = None;

            loop {
                tokio::select! {
                    biased; // Prioritize stop signal over polling

                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            eprintln!("PageObserver: Stop signal received, shutting down");
                            break;
                        }
                    }

                    _ = tokio::time::sleep(poll_interval) => {
                        // Mount watching is bounded; without a watch page by
                        // the deadline the panel never mounts and there is
                        // nothing left to observe.
                        if !mounted && Instant::now() > mount_deadline {
                            eprintln!("PageObserver: No watch page within the mount deadline, giving up");
                            break;
                        }

                        match probe.current_url().await {
                            Ok(url) if url != last_url => {
                                eprintln!("PageObserver: URL changed to: {}", url);
                                last_url = url.clone();

                                if let Some(video_id) = extract_video_id(&url) {
                                    let event = if !mounted {
                                        mounted = true;
                                        PageEvent::HostReady { video_id, url }
                                    } else {
                                        PageEvent::Navigated { video_id, url }
                                    };

                                    if events_tx.send(event).await.is_err() {
                                        eprintln!("PageObserver: Controller gone, shutting down");
                                        break;
                                    }
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                eprintln!("PageObserver: Browser unavailable: {}", e);
                            }
                        }

                        if let Ok(dark) = probe.dark_mode().await {
                            if last_dark != Some(dark) {
                                last_dark = Some(dark);
                                if events_tx.send(PageEvent::ThemeChanged { dark }).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            eprintln!("PageObserver: Polling task terminated");
        });

        Ok(())
    }

    /// Stop the observer.
    pub fn stop(&mut self) -> Result<(), AppError> {
        if !self.is_running {
            return Err(AppError::NotRunning("Page observer"));
        }

        eprintln!("PageObserver: Stopping observer");

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.is_running = false;

        Ok(())
    }
}
