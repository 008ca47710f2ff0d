// tubechat - chat with the YouTube video you're watching.
//
// Wires the pieces together: the answering service (which holds the
// OpenRouter key), the page observer watching the browser, and the panel
// controller rendering to the console. Questions are read from stdin.

use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use tubechat::assistant::{
    AssistantClient, ChatMessage, PanelController, PanelSurface, Role, WatchPageSource,
};
use tubechat::browser::{ChromeProbe, PageObserver, VideoMetadata};
use tubechat::error::AppError;
use tubechat::logging;
use tubechat::server::{AnsweringService, OpenRouterProvider};
use tubechat::settings::SettingsManager;

/// Renders the panel to stdout. Stands in for a real injected UI.
struct ConsolePanel;

impl PanelSurface for ConsolePanel {
    fn mount(&self, collapsed: bool) {
        println!("── panel mounted{} ──", if collapsed { " (collapsed)" } else { "" });
    }

    fn unmount(&self) {
        println!("── panel removed ──");
    }

    fn set_collapsed(&self, collapsed: bool) {
        println!("── panel {} ──", if collapsed { "collapsed" } else { "expanded" });
    }

    fn set_dark_mode(&self, dark: bool) {
        println!("── theme: {} ──", if dark { "dark" } else { "light" });
    }

    fn clear_messages(&self) {
        println!("── conversation cleared ──");
    }

    fn push_message(&self, message: &ChatMessage) {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::Error => "error",
        };
        println!("[{}] {}: {}", message.timestamp, who, message.text);
    }

    fn push_notice(&self, text: &str) {
        println!("  ({})", text);
    }

    fn show_context(&self, metadata: &VideoMetadata) {
        println!("── now watching: {} — {} ──", metadata.title, metadata.channel);
    }

    fn set_thinking(&self, thinking: bool) {
        if thinking {
            println!("  ...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    if let Some(logs_dir) = logging::logs_dir() {
        logging::init(&logs_dir);
    }

    // The provider key stays inside the answering service process; the
    // panel side only ever talks to the local endpoint.
    let provider = Arc::new(OpenRouterProvider::from_env()?);
    let mut service = AnsweringService::with_defaults(provider);
    service.start().await?;

    let settings = Arc::new(SettingsManager::new().map_err(AppError::SettingsFailed)?);
    let client = Arc::new(AssistantClient::new(service.url()));
    let source = Arc::new(WatchPageSource::new());

    let controller = PanelController::new(Arc::new(ConsolePanel), client, source, settings);
    let (events_tx, events_rx) = mpsc::channel(32);
    let handle = controller.start(events_rx)?;

    let mut observer = PageObserver::new(Arc::new(ChromeProbe));
    observer.start(events_tx)?;

    eprintln!("tubechat: Ready. Open a YouTube video in Chrome.");
    println!("Type a question, /summarize, /collapse, or /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match line.trim() {
                        "" => {}
                        "/quit" => break,
                        "/summarize" => handle.summarize().await,
                        "/collapse" => handle.toggle_collapse().await,
                        question => handle.ask(question.to_string()).await,
                    },
                    _ => break, // stdin closed
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    eprintln!("tubechat: Shutting down");
    observer.stop()?;
    handle.stop().await;
    service.stop();

    Ok(())
}
