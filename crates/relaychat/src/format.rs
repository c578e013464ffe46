//! Turning chat events into the lines players see.
//!
//! [`ChatFormatter`] is the rendering seam: hosts with rich text (colors,
//! hover text) implement it themselves. [`PlainFormatter`] fills
//! `%placeholder%` templates from [`MessageTemplates`] and is what a node
//! uses when the host supplies nothing.

use serde::{Deserialize, Serialize};

/// Renders every line a chat node delivers.
pub trait ChatFormatter: Send + Sync + 'static {
    /// Proximity chat, for hosts that route it through the node.
    fn distance_chat(&self, player_name: &str, display_name: &str, text: &str) -> String;

    fn global_chat(
        &self,
        server_name: &str,
        player_name: &str,
        display_name: &str,
        text: &str,
    ) -> String;

    /// Shown to the sender of a whisper.
    fn whisper_sent(&self, target_name: &str, target_display_name: &str, text: &str) -> String;

    /// Shown to the recipient of a whisper.
    fn whisper_received(&self, sender_name: &str, sender_display_name: &str, text: &str) -> String;

    fn notice(&self, sender_name: &str, text: &str) -> String;

    fn whisper_self(&self) -> String;

    fn player_not_found(&self, player: &str) -> String;

    fn no_reply_target(&self) -> String;
}

/// Line templates. `%name%` placeholders are replaced when rendering;
/// unknown placeholders are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    /// `%player_name%`, `%player%`, `%message%`
    pub distance_format: String,
    /// `%server%`, `%player_name%`, `%player%`, `%message%`
    pub global_format: String,
    /// `%target_name%`, `%target%`, `%message%`
    pub whisper_sent: String,
    /// `%sender_name%`, `%sender%`, `%message%`
    pub whisper_received: String,
    /// `%sender%`, `%message%`
    pub notice_format: String,
    pub whisper_self: String,
    /// `%player%`
    pub player_not_found: String,
    pub no_reply_target: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            distance_format: "[Nearby] %player%: %message%".into(),
            global_format: "[Global] [%server%] %player%: %message%".into(),
            whisper_sent: "[me -> %target%] %message%".into(),
            whisper_received: "[%sender% -> me] %message%".into(),
            notice_format: "[Notice] %sender%: %message%".into(),
            whisper_self: "You cannot whisper to yourself.".into(),
            player_not_found: "Player %player% was not found.".into(),
            no_reply_target: "There is no one to reply to.".into(),
        }
    }
}

/// Template-based [`ChatFormatter`].
#[derive(Debug, Clone, Default)]
pub struct PlainFormatter {
    templates: MessageTemplates,
}

impl PlainFormatter {
    pub fn new(templates: MessageTemplates) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }
}

/// Fills `%key%` placeholders in one pass, so text that itself contains
/// `%message%` is never expanded a second time.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after[..end];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                // Not a placeholder; keep the first '%' and rescan from the second.
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

impl ChatFormatter for PlainFormatter {
    fn distance_chat(&self, player_name: &str, display_name: &str, text: &str) -> String {
        render(
            &self.templates.distance_format,
            &[("player_name", player_name), ("player", display_name), ("message", text)],
        )
    }

    fn global_chat(
        &self,
        server_name: &str,
        player_name: &str,
        display_name: &str,
        text: &str,
    ) -> String {
        render(
            &self.templates.global_format,
            &[
                ("server", server_name),
                ("player_name", player_name),
                ("player", display_name),
                ("message", text),
            ],
        )
    }

    fn whisper_sent(&self, target_name: &str, target_display_name: &str, text: &str) -> String {
        render(
            &self.templates.whisper_sent,
            &[("target_name", target_name), ("target", target_display_name), ("message", text)],
        )
    }

    fn whisper_received(&self, sender_name: &str, sender_display_name: &str, text: &str) -> String {
        render(
            &self.templates.whisper_received,
            &[("sender_name", sender_name), ("sender", sender_display_name), ("message", text)],
        )
    }

    fn notice(&self, sender_name: &str, text: &str) -> String {
        render(&self.templates.notice_format, &[("sender", sender_name), ("message", text)])
    }

    fn whisper_self(&self) -> String {
        self.templates.whisper_self.clone()
    }

    fn player_not_found(&self, player: &str) -> String {
        render(&self.templates.player_not_found, &[("player", player)])
    }

    fn no_reply_target(&self) -> String {
        self.templates.no_reply_target.clone()
    }
}
