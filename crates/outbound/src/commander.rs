//! The outbound command FSM: issue → confirm → place.

use std::sync::Arc;

use voice_gateway_config::remote::ConfigProvider;
use voice_gateway_core::phone::{last4, to_e164_us};
use voice_gateway_telephony::TelephonyClient;

use crate::command::{parse_command, CallTarget, Command, HELP_TEXT};
use crate::pending::{OutboundPending, PendingStore, PopOutcome};

pub struct OutboundCommander {
    provider: Arc<ConfigProvider>,
    telephony: TelephonyClient,
    pending: PendingStore,
    outbound_from: String,
    webhook_base: String,
    allowed_chat_id: Option<i64>,
    webhook_secret: Option<String>,
}

impl OutboundCommander {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<ConfigProvider>,
        telephony: TelephonyClient,
        pending: PendingStore,
        outbound_from: String,
        webhook_base: String,
        allowed_chat_id: Option<i64>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            provider,
            telephony,
            pending,
            outbound_from,
            webhook_base,
            allowed_chat_id,
            webhook_secret,
        }
    }

    /// Gate the webhook: the chat id must be on the allow-list and, when a
    /// secret is configured, the header must match.
    pub fn authorize(&self, chat_id: i64, secret_header: Option<&str>) -> bool {
        if let Some(expected) = &self.webhook_secret {
            if secret_header != Some(expected.as_str()) {
                tracing::warn!(chat_id, "outbound webhook secret mismatch");
                return false;
            }
        }
        match self.allowed_chat_id {
            Some(allowed) => chat_id == allowed,
            // No allow-list configured means the channel is disabled.
            None => false,
        }
    }

    /// Handle one message; the returned string is the reply to post back.
    pub async fn handle_text(&self, chat_id: i64, text: &str) -> String {
        match parse_command(text) {
            Command::Help => HELP_TEXT.to_string(),
            Command::Invalid { reply } => reply,
            Command::Call { target, theme } => self.stage_call(chat_id, target, theme).await,
            Command::Confirm { code } => self.confirm(&code).await,
            Command::Cancel { code } => {
                if self.pending.cancel(&code) {
                    format!("Cancelled pending call {code}.")
                } else {
                    format!("No pending call under code {code}.")
                }
            }
        }
    }

    async fn stage_call(&self, chat_id: i64, target: CallTarget, theme: String) -> String {
        let (destination, display, recipient_name) = match target {
            CallTarget::NameLast4 { name, last4: want } => {
                // Force-fresh so a VIP added moments ago resolves.
                let config = self.provider.get(true).await;
                let needle = name.to_lowercase();
                let vip = config.vips.iter().find(|v| {
                    v.name.to_lowercase().contains(&needle) && last4(&v.phone) == want
                });
                match vip {
                    Some(vip) => match to_e164_us(&vip.phone) {
                        Some(number) => {
                            let display = format!("{} ({})", vip.name, number);
                            (number, display, Some(vip.name.clone()))
                        }
                        None => {
                            return format!(
                                "{} is in the directory but their number doesn't look dialable.",
                                vip.name
                            )
                        }
                    },
                    None => {
                        return format!(
                            "No VIP matching \"{name}\" with number ending {want}. \
                             Check /help for the formats."
                        )
                    }
                }
            }
            CallTarget::Phone(raw) => match to_e164_us(&raw) {
                Some(number) => (number.clone(), number, None),
                None => return format!("\"{raw}\" doesn't look like a dialable number."),
            },
        };

        let code = self.pending.create(OutboundPending {
            destination_e164: destination,
            display: display.clone(),
            theme: theme.clone(),
            recipient_name,
            created_at: std::time::Instant::now(),
            requester_id: chat_id,
        });

        format!(
            "Ready to call {display} about: {theme}\n\
             Reply YES {code} to place the call, or /cancel {code} to drop it."
        )
    }

    async fn confirm(&self, code: &str) -> String {
        let pending = match self.pending.pop(code) {
            PopOutcome::Found(entry) => entry,
            PopOutcome::Expired => {
                return "That code has expired. Send /call again for a fresh one.".to_string()
            }
            PopOutcome::Unknown => {
                return format!("Unknown code {code}. Nothing was placed.")
            }
        };

        let twiml_url = match reqwest::Url::parse_with_params(
            &format!("{}/twiml/outbound", self.webhook_base),
            [
                ("to", pending.destination_e164.as_str()),
                ("theme", pending.theme.as_str()),
                (
                    "recipientName",
                    pending.recipient_name.as_deref().unwrap_or(""),
                ),
            ],
        ) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "bad outbound TwiML url");
                return "Internal error building the call. Nothing was placed.".to_string();
            }
        };
        let status_callback = format!("{}/call-status", self.webhook_base);

        match self
            .telephony
            .create_call(
                &pending.destination_e164,
                &self.outbound_from,
                &twiml_url,
                &status_callback,
            )
            .await
        {
            Ok(created) => {
                tracing::info!(call_sid = %created.sid, to = %pending.destination_e164, "outbound call placed");
                format!("Calling {} about: {}", pending.display, pending.theme)
            }
            Err(e) => {
                tracing::error!(error = %e, "outbound call create failed");
                format!(
                    "The provider rejected the call to {}. Nothing is ringing.",
                    pending.display
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn commander(allowed: Option<i64>, secret: Option<&str>) -> OutboundCommander {
        let provider = Arc::new(ConfigProvider::new(None, Duration::from_secs(20), "Trinity"));
        OutboundCommander::new(
            provider,
            TelephonyClient::new("AC-test", "token"),
            PendingStore::new(Duration::from_secs(120)),
            "+15550001111".into(),
            "https://gw.example.com".into(),
            allowed,
            secret.map(String::from),
        )
    }

    #[test]
    fn authorize_requires_allow_list() {
        let cmd = commander(Some(42), None);
        assert!(cmd.authorize(42, None));
        assert!(!cmd.authorize(43, None));

        let unset = commander(None, None);
        assert!(!unset.authorize(42, None));
    }

    #[test]
    fn authorize_checks_secret_when_configured() {
        let cmd = commander(Some(42), Some("s3cret"));
        assert!(cmd.authorize(42, Some("s3cret")));
        assert!(!cmd.authorize(42, Some("wrong")));
        assert!(!cmd.authorize(42, None));
    }

    #[tokio::test]
    async fn help_replies_with_syntax() {
        let cmd = commander(Some(42), None);
        let reply = cmd.handle_text(42, "/help").await;
        assert!(reply.contains("/call <name> <last4>"));
    }

    #[tokio::test]
    async fn direct_phone_call_stages_with_code() {
        let cmd = commander(Some(42), None);
        let reply = cmd.handle_text(42, "/call 5551235680 | say hi").await;
        assert!(reply.contains("+15551235680"));
        assert!(reply.contains("YES "));
        assert_eq!(cmd.pending.len(), 1);
    }

    #[tokio::test]
    async fn unknown_vip_does_not_stage() {
        // Provider has no config URL, so the directory is empty.
        let cmd = commander(Some(42), None);
        let reply = cmd.handle_text(42, "/call jeff 5680 | invoice").await;
        assert!(reply.contains("No VIP matching"));
        assert!(cmd.pending.is_empty());
    }

    #[tokio::test]
    async fn unknown_code_replies_distinctly() {
        let cmd = commander(Some(42), None);
        let reply = cmd.handle_text(42, "YES 123456").await;
        assert!(reply.contains("Unknown code"));
    }

    #[tokio::test]
    async fn bad_number_is_rejected() {
        let cmd = commander(Some(42), None);
        let reply = cmd.handle_text(42, "/call 12345 | hi").await;
        assert!(reply.contains("doesn't look like a dialable number"));
    }
}
