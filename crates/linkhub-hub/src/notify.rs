use tracing::warn;

/// Desktop notification, abstracted behind a trait so tests can observe
/// calls without actually shelling out.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}

/// Shells out to `notify-send`. Best-effort: logs a warning and does
/// nothing further if the binary is missing or exits non-zero.
#[derive(Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, summary: &str, body: &str) {
        let summary = summary.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            let result = tokio::process::Command::new("notify-send")
                .arg(&summary)
                .arg(&body)
                .status()
                .await;
            match result {
                Ok(status) if !status.success() => {
                    warn!(%status, "notify-send exited non-zero");
                }
                Err(e) => {
                    warn!(error = %e, "failed to spawn notify-send");
                }
                Ok(_) => {}
            }
        });
    }
}

/// Decide whether an inbound message should trigger a notification: a
/// channel message mentioning the self-nickname (case-insensitive
/// substring), or any private message not originating from a leading-`*`
/// service pseudo-nick.
pub fn should_notify(target: &str, from_nick: &str, text: &str, self_nick: &str) -> bool {
    if target.starts_with('#') || target.starts_with('&') {
        !self_nick.is_empty() && text.to_lowercase().contains(&self_nick.to_lowercase())
    } else {
        !from_nick.starts_with('*')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_message_mentioning_self_notifies() {
        assert!(should_notify("#room", "other", "hey Nick, you there?", "nick"));
    }

    #[test]
    fn channel_message_not_mentioning_self_is_silent() {
        assert!(!should_notify("#room", "other", "hey someone else", "nick"));
    }

    #[test]
    fn private_message_notifies() {
        assert!(should_notify("nick", "other", "hi", "nick"));
    }

    #[test]
    fn private_message_from_service_pseudo_nick_is_silent() {
        assert!(!should_notify("nick", "*status", "server notice", "nick"));
    }
}
