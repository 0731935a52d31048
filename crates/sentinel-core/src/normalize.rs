//! Plain-text display form of a feed entry.

use std::sync::OnceLock;

use regex::Regex;

use crate::{domain::NotificationId, extract::RawNotification};

/// A feed entry ready for classification and delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedNotification {
    pub id: NotificationId,
    pub text: String,
    pub action_link: Option<String>,
    pub thumbnail_url: Option<String>,
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]+)""#).expect("valid regex"))
}

/// Strip tags, collapse whitespace runs to one space, trim.
///
/// Idempotent: the output contains no `<...>` and no whitespace runs.
pub fn normalize_text(raw: &str) -> String {
    let stripped = tag_re().replace_all(raw, "");
    let collapsed = ws_re().replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// First `href` target inside the fragment, verbatim.
pub fn extract_link(raw: &str) -> Option<String> {
    href_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve a feed-relative or protocol-relative url against `base_url` and
/// collapse repeated slashes in the path (`site.ru//img`, `/x70//img`).
pub fn resolve_url(base_url: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let absolute = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            raw.trim_start_matches('/')
        )
    };

    let Some((scheme, rest)) = absolute.split_once("://") else {
        return Some(absolute);
    };
    let mut path = String::with_capacity(rest.len());
    let mut prev_slash = false;
    for c in rest.chars() {
        if c == '?' || c == '#' {
            // query/fragment kept as-is
            let tail = &rest[rest.find(c).unwrap_or(rest.len())..];
            path.push_str(tail);
            break;
        }
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        path.push(c);
    }

    Some(format!("{scheme}://{path}"))
}

/// Derive the display form of a matched entry.
pub fn normalize(raw: &RawNotification, base_url: &str) -> NormalizedNotification {
    NormalizedNotification {
        id: raw.id.clone(),
        text: normalize_text(&raw.raw_text),
        action_link: extract_link(&raw.raw_text).and_then(|l| resolve_url(base_url, &l)),
        thumbnail_url: raw
            .thumbnail_src
            .as_deref()
            .and_then(|s| resolve_url(base_url, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://mangabuff.ru";

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(normalize_text("<b>Hi</b>  there"), "Hi there");
        assert_eq!(
            normalize_text("\n  Пользователь <a href=\"/u/1\">Вася</a>\n\t купил ваш  товар \n"),
            "Пользователь Вася купил ваш товар"
        );
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "<b>Hi</b>  there",
            "a <<b>>b",
            "<div>\n<span> x </span>\n</div>",
            "plain text",
            "a < b and c > d",
            "",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "input: {s:?}");
        }
    }

    #[test]
    fn link_is_first_href_or_absent() {
        assert_eq!(
            extract_link(r#"<a href="/a">x</a> <a href="/b">y</a>"#).as_deref(),
            Some("/a")
        );
        assert_eq!(extract_link("no links here"), None);
    }

    #[test]
    fn urls_resolve_against_base_and_lose_double_slashes() {
        assert_eq!(
            resolve_url(BASE, "/x70//img/a.jpg").as_deref(),
            Some("https://mangabuff.ru/x70/img/a.jpg")
        );
        assert_eq!(
            resolve_url(BASE, "https://mangabuff.ru//img/a.jpg").as_deref(),
            Some("https://mangabuff.ru/img/a.jpg")
        );
        assert_eq!(
            resolve_url(BASE, "//cdn.example.com/a.jpg").as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(
            resolve_url(BASE, "img/a.jpg?v=1//2").as_deref(),
            Some("https://mangabuff.ru/img/a.jpg?v=1//2")
        );
        assert_eq!(resolve_url(BASE, "  "), None);
    }

    #[test]
    fn normalize_builds_absolute_links() {
        let raw = RawNotification {
            id: NotificationId::new("5"),
            thumbnail_src: Some("/x70//img/1.jpg".to_string()),
            raw_text: r#" <a href="/cards/9">Card</a>   received "#.to_string(),
        };
        let n = normalize(&raw, BASE);
        assert_eq!(n.text, "Card received");
        assert_eq!(n.action_link.as_deref(), Some("https://mangabuff.ru/cards/9"));
        assert_eq!(
            n.thumbnail_url.as_deref(),
            Some("https://mangabuff.ru/x70/img/1.jpg")
        );
    }
}
