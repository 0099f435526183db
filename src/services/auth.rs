use log::{error, warn};
use tokio::sync::watch;

const CREDENTIAL_MARKERS: &[&str] = &["Requested entity was not found", "API_KEY_INVALID"];
const PERMISSION_MARKERS: &[&str] = &["permission denied", "permission_denied"];

/// True when a backend failure means the key is missing, invalid or lacks access.
pub fn is_credential_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CREDENTIAL_MARKERS.iter().any(|m| message.contains(m))
        || PERMISSION_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Session-level "credential required" flag.
///
/// Raising is edge-triggered: subscribers are woken once per episode no matter
/// how many failures follow, until [`CredentialMonitor::acknowledge`] lowers it.
#[derive(Debug)]
pub struct CredentialMonitor {
    tx: watch::Sender<bool>,
}

impl Default for CredentialMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Logs a backend failure and raises the flag if it looks like an auth
    /// problem. Returns true only for the call that raised it.
    pub fn report(&self, context: &str, err: &anyhow::Error) -> bool {
        let message = format!("{:#}", err);
        error!("{} failed: {}", context, message);
        if !is_credential_error(&message) {
            return false;
        }
        let fired = self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        });
        if fired {
            warn!("Backend rejected the API key; a new key is required before continuing");
        }
        fired
    }

    pub fn acknowledge(&self) {
        self.tx.send_if_modified(|raised| std::mem::replace(raised, false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_credential_markers() {
        assert!(is_credential_error("400 Bad Request: API_KEY_INVALID"));
        assert!(is_credential_error("Requested entity was not found."));
        assert!(is_credential_error("403: Permission Denied on resource"));
        assert!(is_credential_error("status: PERMISSION_DENIED"));
        assert!(!is_credential_error("503 model overloaded"));
        assert!(!is_credential_error("api_key_invalid"));
    }

    #[test]
    fn test_signal_fires_once_per_episode() {
        let monitor = CredentialMonitor::new();
        let mut rx = monitor.subscribe();

        assert!(monitor.report("image", &anyhow!("Gemini API error: API_KEY_INVALID")));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!monitor.report("image", &anyhow!("connection reset")));
        assert!(!monitor.report("beat", &anyhow!("API_KEY_INVALID again")));
        assert!(!rx.has_changed().unwrap());
        assert!(monitor.is_raised());

        monitor.acknowledge();
        assert!(!monitor.is_raised());
        assert!(monitor.report("beat", &anyhow!("permission denied")));
    }

    #[test]
    fn test_report_inspects_context_chain() {
        let monitor = CredentialMonitor::new();
        let err = anyhow!("API_KEY_INVALID").context("Narrative request for page 2");
        assert!(monitor.report("beat", &err));
    }
}
