//! Notification entries from the feed page markup.
//!
//! The feed is a flat list of blocks carrying a `data-id` attribute, an avatar
//! `<img src>` and a `notifications__name` text block. An entry exists only
//! where a text block is found; it is owned by a `data-id` between the
//! previous text block and this one, preferring the one on a
//! `notifications__item` element. Stray `data-id` attributes (menus, nested
//! widgets) never become entries, and the thumbnail is searched only between
//! the owning `data-id` and the text block.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::NotificationId;

const ITEM_CLASS: &str = "notifications__item";

/// One feed entry as matched, before any cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawNotification {
    pub id: NotificationId,
    pub thumbnail_src: Option<String>,
    pub raw_text: String,
}

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"data-id="([^"]+)""#).expect("valid regex"))
}

fn src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"src="([^"]+)""#).expect("valid regex"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)class="notifications__name">\s*(.*?)</div>"#).expect("valid regex")
    })
}

/// A `data-id` attribute occurrence: attribute start, attribute end, value.
type IdMark<'a> = (usize, usize, &'a str);

/// Whether the tag holding the attribute at `pos` carries the item class.
fn on_item_tag(page: &str, pos: usize) -> bool {
    let Some(open) = page[..pos].rfind('<') else {
        return false;
    };
    let close = page[pos..].find('>').map_or(page.len(), |i| pos + i);
    page[open..close].contains(ITEM_CLASS)
}

/// Extract entries in feed order. An empty or unrecognized page yields an empty vec.
pub fn extract_notifications(page: &str) -> Vec<RawNotification> {
    let ids: Vec<IdMark<'_>> = id_re()
        .captures_iter(page)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((whole.start(), whole.end(), c.get(1)?.as_str()))
        })
        .collect();

    let mut out = Vec::new();
    let mut region_start = 0;

    for caps in name_re().captures_iter(page) {
        let (Some(block), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let candidates: Vec<IdMark<'_>> = ids
            .iter()
            .copied()
            .filter(|(start, _, _)| *start >= region_start && *start < block.start())
            .collect();
        region_start = block.end();

        let owner = candidates
            .iter()
            .copied()
            .find(|(start, _, _)| on_item_tag(page, *start))
            .or_else(|| candidates.first().copied());
        let Some((_, id_end, id)) = owner else {
            tracing::debug!(offset = block.start(), "text block without data-id skipped");
            continue;
        };
        if candidates.len() > 1 {
            tracing::debug!(notif_id = id, ignored = candidates.len() - 1, "extra data-id attributes ignored");
        }

        let thumbnail_src = src_re()
            .captures(&page[id_end..block.start()])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.trim().is_empty());

        out.push(RawNotification {
            id: NotificationId::new(id),
            thumbnail_src,
            raw_text: body.as_str().to_string(),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_OK: &str = r#"
<div class="notifications__item" data-id="101">
  <img class="notifications__avatar" src="/x70//img/avatars/1.jpg">
  <div class="notifications__name">
     Пользователь <a href="/trades/55">Вася</a> предлагает обмен карт
  </div>
</div>"#;

    const ENTRY_NO_IMG: &str = r#"
<div class="notifications__item" data-id="102">
  <div class="notifications__name">Вы получили новую карту</div>
</div>"#;

    #[test]
    fn extracts_fields_in_feed_order() {
        let page = format!("<html>{ENTRY_OK}{ENTRY_NO_IMG}</html>");
        let items = extract_notifications(&page);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].id, NotificationId::new("101"));
        assert_eq!(
            items[0].thumbnail_src.as_deref(),
            Some("/x70//img/avatars/1.jpg")
        );
        assert!(items[0].raw_text.contains("предлагает обмен"));
        assert!(items[0].raw_text.contains(r#"href="/trades/55""#));

        assert_eq!(items[1].id, NotificationId::new("102"));
        assert_eq!(items[1].thumbnail_src, None);
        assert_eq!(items[1].raw_text, "Вы получили новую карту");
    }

    #[test]
    fn missing_image_does_not_borrow_from_next_entry() {
        let page = format!("{ENTRY_NO_IMG}{ENTRY_OK}");
        let items = extract_notifications(&page);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].thumbnail_src, None);
        assert!(items[1].thumbnail_src.is_some());
    }

    #[test]
    fn data_id_without_text_block_is_not_an_entry() {
        let page = format!(
            r#"<header><button data-id="user-menu">Меню</button></header>{ENTRY_OK}<div data-id="8"><img src="/a.png"></div>"#
        );
        let items = extract_notifications(&page);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, NotificationId::new("101"));
        assert_eq!(
            items[0].thumbnail_src.as_deref(),
            Some("/x70//img/avatars/1.jpg")
        );
    }

    #[test]
    fn nested_data_id_does_not_take_over_the_entry() {
        let page = r#"
<div class="notifications__item" data-id="201">
  <img src="/img/201.jpg">
  <span class="badge" data-id="badge-9"></span>
  <div class="notifications__name">Иван купил ваш товар</div>
</div>"#;
        let items = extract_notifications(page);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, NotificationId::new("201"));
        assert_eq!(items[0].thumbnail_src.as_deref(), Some("/img/201.jpg"));
        assert_eq!(items[0].raw_text, "Иван купил ваш товар");
    }

    #[test]
    fn empty_feed_is_not_an_error() {
        assert!(extract_notifications("").is_empty());
        assert!(extract_notifications("<html><body>Нет уведомлений</body></html>").is_empty());
    }

    #[test]
    fn duplicate_ids_are_kept_for_the_dedup_stage() {
        let page = format!("{ENTRY_OK}{ENTRY_OK}");
        let items = extract_notifications(&page);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, items[1].id);
    }
}
