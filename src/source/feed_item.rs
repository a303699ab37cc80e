//! The item type shared by every fetcher.
//!
//! `FeedItem` is deliberately small: the relay only needs a title to show and
//! an identifier to decide novelty.  Both RSS and Atom documents are mapped
//! into it by [`super::http`].

use crate::ident;

/// A single feed entry, normalised from any feed format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedItem {
    /// Human-readable headline.
    pub title: String,

    /// Identifier as published by the feed (e.g. `t3_1abcde`).
    ///
    /// For RSS this is the `<guid>` element (falling back to `<link>`); for
    /// Atom it is the entry `<id>`.
    pub raw_id: String,

    /// URL to the full content, when the feed provides one.
    pub link: Option<String>,
}

impl FeedItem {
    pub fn new(title: impl Into<String>, raw_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            raw_id: raw_id.into(),
            link: None,
        }
    }

    /// Encoded identifier suffix, or `None` if the item is not relayable.
    pub fn suffix(&self) -> Option<&str> {
        ident::split_prefixed(&self.raw_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_strips_the_kind_tag() {
        assert_eq!(FeedItem::new("a", "t3_c").suffix(), Some("c"));
        assert_eq!(FeedItem::new("a", "t3_").suffix(), Some(""));
    }

    #[test]
    fn suffix_ignores_unprefixed_ids() {
        assert_eq!(FeedItem::new("a", "t1_c").suffix(), None);
        assert_eq!(FeedItem::new("a", "https://example.com/c").suffix(), None);
    }
}
