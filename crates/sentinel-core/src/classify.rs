//! Content rules deciding whether a notification is worth delivering.

use crate::watchlist::Watchlist;

/// Severity category; drives the color/priority tag of the delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Exchange,
    Purchase,
    Reward,
    WatchlistMatch,
    Default,
}

impl Severity {
    /// 24-bit RGB color tag.
    pub fn color(self) -> u32 {
        match self {
            Severity::Exchange => 0xFF0000,
            Severity::Purchase => 0xF1C40F,
            Severity::Reward => 0x3498DB,
            Severity::WatchlistMatch => 0x2ECC71,
            Severity::Default => 0x8B00FF,
        }
    }

    /// Colored marker for channels without native message colors.
    pub fn marker(self) -> &'static str {
        match self {
            Severity::Exchange => "🔴",
            Severity::Purchase => "🟡",
            Severity::Reward => "🔵",
            Severity::WatchlistMatch => "🟢",
            Severity::Default => "🟣",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Exchange => "exchange",
            Severity::Purchase => "purchase",
            Severity::Reward => "reward",
            Severity::WatchlistMatch => "watchlist",
            Severity::Default => "default",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub should_deliver: bool,
    pub severity: Severity,
}

/// High-priority rules, evaluated in order; markers are lowercase.
const RULES: &[(&[&str], Severity)] = &[
    (&["обмен"], Severity::Exchange),
    (&["купил ваш"], Severity::Purchase),
    (&["свиток", "получили новую карту"], Severity::Reward),
];

/// First matching rule wins. Without a rule match, deliver only when the
/// watchlist is empty or one of its terms occurs in the text.
pub fn classify(text: &str, watchlist: &Watchlist) -> Classification {
    let lower = text.to_lowercase();

    for (markers, severity) in RULES {
        if markers.iter().any(|m| lower.contains(m)) {
            return Classification {
                should_deliver: true,
                severity: *severity,
            };
        }
    }

    if watchlist.is_empty() || watchlist.matches(text) {
        return Classification {
            should_deliver: true,
            severity: Severity::WatchlistMatch,
        };
    }

    Classification {
        should_deliver: false,
        severity: Severity::Default,
    }
}
