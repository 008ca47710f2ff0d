// Chat panel: controller state machine, answering-service client, and
// context refresh.

pub mod client;
pub mod context;
pub mod panel;

pub use client::{AnswerSource, AskError, AssistantClient, SERVER_ERROR_MSG};
pub use context::{ContextSource, WatchPageSource};
pub use panel::{
    ChatMessage, Conversation, PanelController, PanelHandle, PanelSnapshot, PanelState,
    PanelSurface, Role, WELCOME_MESSAGE,
};
