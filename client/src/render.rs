//! Rendering seam between the controller and whatever displays the chat.

use frames::ChatMessage;

/// Connection status reported to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connected,
    Disconnected,
    Error,
    StaticMode,
}

impl Status {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
            Self::StaticMode => "Static Mode",
        }
    }
}

/// Receives every newly visible message and every status change.
///
/// Called from the controller's driver task and from `send_message`; both
/// callbacks must return quickly and must not block on the controller.
pub trait Renderer: Send + Sync {
    fn on_message_rendered(&self, message: &ChatMessage);
    fn on_status_changed(&self, status: Status);
}
