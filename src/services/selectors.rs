// src/services/selectors.rs

//! CSS selectors for the forum's thread markup, parsed once up front.

use std::fmt;

use scraper::Selector;

use crate::error::{AppError, Result};

/// Parsed selector set for thread pages.
pub struct Selectors {
    /// Pagination buttons; the last one carries the page count.
    pub page_buttons: Selector,
    /// Thread title on the first page.
    pub title: Selector,
    /// One post section per floor.
    pub section: Selector,
    pub main: Selector,
    pub author: Selector,
    pub floor_anchor: Selector,
    pub username: Selector,
    pub userid: Selector,
    pub content: Selector,
    /// Reply container under a floor.
    pub reply_container: Selector,
    /// Truncation marker inside the reply container.
    pub nocontent: Selector,
    /// Anchor whose onclick carries the expand parameters.
    pub more_reply: Selector,
    pub reply_content: Selector,
    pub reply_user: Selector,
    pub reply_comment: Selector,
}

impl Selectors {
    pub fn new() -> Result<Self> {
        Ok(Self {
            page_buttons: parse("p.BH-pagebtnA > a")?,
            title: parse("div.c-post__header > h1.c-post__header__title")?,
            section: parse("section.c-section[id]")?,
            main: parse("div.c-section__main")?,
            author: parse("div.c-post__header__author")?,
            floor_anchor: parse("a.floor")?,
            username: parse("a.username")?,
            userid: parse("a.userid")?,
            content: parse("div.c-article__content")?,
            reply_container: parse("div.c-reply")?,
            nocontent: parse("div.nocontent")?,
            more_reply: parse("div.nocontent > a.more-reply")?,
            reply_content: parse("div.c-reply__item > div > div.reply-content")?,
            reply_user: parse("a.reply-content__user")?,
            reply_comment: parse("article.c-article > span.comment_content")?,
        })
    }
}

fn parse(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Decides whether a post section's id attribute marks a disabled floor.
///
/// Site-markup-dependent by nature, so it is pluggable rather than a
/// hard-coded string match.
pub struct DisabledPredicate(Box<dyn Fn(&str) -> bool + Send + Sync>);

impl DisabledPredicate {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Box::new(predicate))
    }

    pub fn is_disabled(&self, id_attr: &str) -> bool {
        (self.0)(id_attr)
    }
}

impl Default for DisabledPredicate {
    fn default() -> Self {
        Self::new(|id_attr| id_attr.contains("disable"))
    }
}

impl fmt::Debug for DisabledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DisabledPredicate")
    }
}
