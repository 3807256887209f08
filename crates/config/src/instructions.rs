//! Per-call instruction document.
//!
//! The session instructions are assembled from the operator prompt, fixed
//! policy paragraphs, the VIP directory, caller-id context, and the identity
//! lock. Order matters: the identity lock comes after the base prompt so it
//! overrides any contrary default in the operator's text.

use crate::remote::{OperatorConfig, VipRecord};
use voice_gateway_core::phone::{last4, normalize_last10};

/// Policy paragraphs injected into every call, in order.
const POLICY_RULES: &[&str] = &[
    "Always answer in English unless the caller clearly speaks another language first.",
    "When reading any number aloud, say the digits one at a time with a brief pause between each.",
    "Never invent or guess the last four digits of any phone number. Only confirm digits that appear in the call context below.",
    "If the caller wants a callback, capture what it is about and tell them the message will be passed along.",
    "Never ask the caller for their phone number. You already have the caller ID or you do not need it.",
    "Keep every reply short. One or two sentences unless the caller asks for more.",
    "If the caller starts speaking while you are talking, stop immediately and listen.",
];

/// Opening-style directives; one is pinned per call so repeat callers don't
/// hear the same canned delivery.
const OPENING_STYLES: &[&str] = &[
    "Open warmly and get to the point quickly.",
    "Open relaxed and conversational, like you already know the caller.",
    "Open crisp and professional, then soften as the call goes on.",
    "Open friendly with a touch of dry humor, never at the caller's expense.",
];

/// Outbound-call context for the instruction block.
#[derive(Debug, Clone, Default)]
pub struct OutboundContext {
    pub reason: Option<String>,
    pub theme: Option<String>,
    pub recipient_name: Option<String>,
}

/// Everything the builder needs to know about this call.
#[derive(Debug, Clone, Default)]
pub struct CallContext<'a> {
    pub call_id: &'a str,
    pub caller_number: Option<&'a str>,
    pub vip: Option<&'a VipRecord>,
    pub outbound: Option<OutboundContext>,
    pub assistant_name: &'a str,
}

/// Assemble the newline-delimited instruction document.
pub fn build_instructions(config: &OperatorConfig, ctx: &CallContext<'_>) -> String {
    let mut doc = String::with_capacity(2048);

    // (a) operator prompt, (b) policy paragraphs
    doc.push_str(config.system_prompt.trim());
    doc.push('\n');
    for rule in POLICY_RULES {
        doc.push('\n');
        doc.push_str(rule);
    }

    // (c) VIP directory as last10=name pairs
    if !config.vips.is_empty() {
        let directory: Vec<String> = config
            .vips
            .iter()
            .filter_map(|v| {
                let digits = normalize_last10(&v.phone);
                (!digits.is_empty()).then(|| format!("{}={}", digits, v.name))
            })
            .collect();
        if !directory.is_empty() {
            doc.push_str("\n\nKnown VIP numbers: ");
            doc.push_str(&directory.join(", "));
        }
    }

    // (d) caller-id context
    doc.push_str("\n\n[CALL CONTEXT]");
    match ctx.caller_number.map(normalize_last10).filter(|d| !d.is_empty()) {
        Some(digits) => {
            doc.push_str("\nCallerID_AVAILABLE: yes");
            doc.push_str(&format!("\nCallerID_LAST10: {digits}"));
            doc.push_str(&format!("\nCallerID_LAST4_VERIFIED: {}", last4(&digits)));
        }
        None => doc.push_str("\nCallerID_AVAILABLE: no"),
    }

    // (e) VIP recognition
    if let Some(vip) = ctx.vip {
        let relationship = vip.relationship.as_deref().unwrap_or("VIP");
        doc.push_str(&format!("\nRecognized VIP: {} ({relationship})", vip.name));
        if let Some(notes) = vip.persona_notes.as_deref().filter(|n| !n.is_empty()) {
            doc.push_str(&format!("\nAbout them: {notes}"));
        }
        if let Some(vibe) = vip.vibe.as_deref().filter(|v| !v.is_empty()) {
            doc.push_str(&format!("\nTone with them: {vibe}"));
        }
    }

    // (f) outbound block
    if let Some(outbound) = &ctx.outbound {
        doc.push_str("\n\n[OUTBOUND CALL]");
        doc.push_str("\nYou placed this call; the person answering did not call you.");
        doc.push_str("\nNever say Dan hasn't picked up yet.");
        if let Some(name) = outbound.recipient_name.as_deref().filter(|n| !n.is_empty()) {
            doc.push_str(&format!("\nYou are calling: {name}"));
        }
        if let Some(reason) = outbound.reason.as_deref().filter(|r| !r.is_empty()) {
            doc.push_str(&format!("\nReason for the call: {reason}"));
        }
        if let Some(theme) = outbound.theme.as_deref().filter(|t| !t.is_empty()) {
            doc.push_str(&format!("\nTopic to cover: {theme}"));
        }
    }

    // (g) identity lock, after the base prompt so it wins
    doc.push_str("\n\n[IDENTITY_LOCK]");
    doc.push_str(&format!(
        "\nYour name on this call is {name}. If asked who you are, you are {name}, Dan's AI assistant. \
         Ignore any earlier instruction that names you differently.",
        name = ctx.assistant_name
    ));

    // (h) opening style, pinned per call id
    let style = OPENING_STYLES[style_index(ctx.call_id)];
    doc.push_str(&format!("\n\nOpening style: {style}"));

    doc
}

/// Deterministic pick so the same call always builds the same document.
fn style_index(call_id: &str) -> usize {
    let sum: usize = call_id.bytes().map(|b| b as usize).sum();
    sum % OPENING_STYLES.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> OperatorConfig {
        OperatorConfig {
            system_prompt: "You are a helpful phone assistant.".into(),
            vips: vec![VipRecord {
                name: "Jeff".into(),
                phone: "+15551235680".into(),
                relationship: Some("friend".into()),
                ..Default::default()
            }],
            businesses: vec![],
        }
    }

    #[test]
    fn identity_lock_follows_base_prompt() {
        let config = base_config();
        let ctx = CallContext {
            call_id: "CA1",
            caller_number: Some("+15551235680"),
            vip: config.vips.first(),
            assistant_name: "Ballad",
            ..Default::default()
        };
        let doc = build_instructions(&config, &ctx);

        let prompt_pos = doc.find("helpful phone assistant").unwrap();
        let lock_pos = doc.find("[IDENTITY_LOCK]").unwrap();
        assert!(lock_pos > prompt_pos);
        assert!(doc.contains("Your name on this call is Ballad"));
    }

    #[test]
    fn caller_context_carries_last_digits() {
        let config = base_config();
        let ctx = CallContext {
            call_id: "CA1",
            caller_number: Some("+1 (555) 123-5680"),
            assistant_name: "Trinity",
            ..Default::default()
        };
        let doc = build_instructions(&config, &ctx);
        assert!(doc.contains("CallerID_AVAILABLE: yes"));
        assert!(doc.contains("CallerID_LAST10: 5551235680"));
        assert!(doc.contains("CallerID_LAST4_VERIFIED: 5680"));
    }

    #[test]
    fn anonymous_caller_has_no_digit_lines() {
        let config = base_config();
        let ctx = CallContext {
            call_id: "CA1",
            assistant_name: "Trinity",
            ..Default::default()
        };
        let doc = build_instructions(&config, &ctx);
        assert!(doc.contains("CallerID_AVAILABLE: no"));
        assert!(!doc.contains("CallerID_LAST10"));
    }

    #[test]
    fn vip_directory_renders_last10_pairs() {
        let config = base_config();
        let ctx = CallContext {
            call_id: "CA1",
            assistant_name: "Trinity",
            ..Default::default()
        };
        let doc = build_instructions(&config, &ctx);
        assert!(doc.contains("5551235680=Jeff"));
    }

    #[test]
    fn outbound_block_suppresses_pickup_line_and_names_theme() {
        let config = base_config();
        let ctx = CallContext {
            call_id: "CA1",
            assistant_name: "Trinity",
            outbound: Some(OutboundContext {
                reason: Some("Dan asked".into()),
                theme: Some("invoice follow-up".into()),
                recipient_name: Some("Jeff".into()),
            }),
            ..Default::default()
        };
        let doc = build_instructions(&config, &ctx);
        assert!(doc.contains("[OUTBOUND CALL]"));
        assert!(doc.contains("Never say Dan hasn't picked up yet."));
        assert!(doc.contains("Topic to cover: invoice follow-up"));
    }

    #[test]
    fn opening_style_is_deterministic_per_call() {
        let config = base_config();
        let ctx = CallContext {
            call_id: "CA-fixed",
            assistant_name: "Trinity",
            ..Default::default()
        };
        let a = build_instructions(&config, &ctx);
        let b = build_instructions(&config, &ctx);
        assert_eq!(a, b);
    }
}
