use std::sync::Arc;

use tracing::debug;

use crate::directory::{SessionDirectory, SessionHandle, SessionId};

/// Fan-out over the session directory.
///
/// Every delivery is one independent queue send per recipient, taken over a
/// directory snapshot. A recipient whose writer has already gone away is
/// skipped without affecting the rest of the fan-out.
pub struct BroadcastRouter {
    directory: Arc<SessionDirectory>,
}

impl BroadcastRouter {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }

    /// Delivers `message` to every registered session except `exclude`.
    pub fn broadcast_except(&self, message: &str, exclude: Option<SessionId>) {
        for handle in self.directory.snapshot() {
            if Some(handle.id) == exclude {
                continue;
            }
            if handle.outbound.send(message.to_string()).is_err() {
                debug!(session = handle.id, "dropping message for closed session");
            }
        }
    }

    /// Routes a private message to the first session matching `recipient`
    /// (case-insensitive, join order) and echoes a confirmation to the
    /// sender. An unknown recipient yields a notice to the sender only.
    pub fn send_private(&self, recipient: &str, text: &str, sender: &SessionHandle) {
        match self.directory.find_by_name(recipient) {
            Some(target) => {
                let tagged = format!("[Private from {}]: {text}", sender.name);
                if target.outbound.send(tagged).is_err() {
                    debug!(
                        session = target.id,
                        "dropping private message for closed session"
                    );
                }
                let _ = sender
                    .outbound
                    .send(format!("[Private to {recipient}]: {text}"));
            }
            None => {
                let _ = sender.outbound.send(format!("User {recipient} not found."));
            }
        }
    }
}
