use chrono::{DateTime, Local};

use crate::{
    actions::ActionRequest, classify::Severity, domain::NotificationId,
    formatting::escape_html,
};

/// Image attached to a delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Everything the channel needs to render one notification.
#[derive(Clone, Debug)]
pub struct DeliveryPayload {
    pub notif_id: NotificationId,
    pub text: String,
    pub severity: Severity,
    pub color: u32,
    pub processed_at: DateTime<Local>,
    pub footer: String,
    pub thumbnail: Option<Thumbnail>,
    /// Absolute url of the entry on the source site.
    pub link: Option<String>,
    pub actions: Vec<ActionRequest>,
}

impl DeliveryPayload {
    /// HTML body: severity marker, bold text, footer line with the processing time.
    pub fn render_html(&self) -> String {
        format!(
            "{} <b>{}</b>\n\n<i>{} · {}</i>",
            self.severity.marker(),
            escape_html(&self.text),
            escape_html(&self.footer),
            self.processed_at.format("%d.%m.%Y %H:%M"),
        )
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Thumbnails are only fetched when the channel can show them.
    pub supports_photos: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;
    use chrono::TimeZone;

    #[test]
    fn html_escapes_feed_text() {
        let payload = DeliveryPayload {
            notif_id: NotificationId::new("1"),
            text: "a <b> & c".to_string(),
            severity: Severity::Purchase,
            color: Severity::Purchase.color(),
            processed_at: Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            footer: "MangaBuff Sentinel".to_string(),
            thumbnail: None,
            link: None,
            actions: ActionRequest::all_for(&NotificationId::new("1")),
        };
        let html = payload.render_html();
        assert!(html.starts_with("🟡 <b>a &lt;b&gt; &amp; c</b>"));
        assert!(html.contains("02.01.2026 03:04"));
        assert_eq!(payload.actions[0].kind, ActionKind::MarkRead);
    }
}
