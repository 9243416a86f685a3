// src/services/extract.rs

//! Document extractor: one forum page's markup into typed records.
//!
//! Parsing is synchronous and the document never crosses an await point
//! (`scraper::Html` is not `Send`); truncated reply lists are resolved
//! afterwards through the expand endpoint.

use std::sync::Arc;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{FloorRecord, PageRecord, ReplyRecord, TargetInfo, ThreadOverview};
use crate::services::selectors::{DisabledPredicate, Selectors};
use crate::services::session::Transport;

/// Endpoint serving replies omitted from the page due to truncation.
pub const EXTEND_REPLY_URL: &str = "https://forum.gamer.com.tw/ajax/moreCommend.php?";

/// Non-record key in the expand response; a cursor, not a reply index.
const EXTEND_SENTINEL_KEY: &str = "next_snC";

/// A floor as parsed from the document, replies possibly unresolved.
struct RawFloor {
    floor_index: u32,
    author_name: String,
    author_id: String,
    content: String,
    replies: RawReplies,
}

enum RawReplies {
    Inline(Vec<ReplyRecord>),
    /// Reply list was truncated; fetch the rest with these parameters.
    Truncated {
        bsn: u64,
        snb: u64,
    },
}

/// Parses thread pages into records, fetching expanded replies on demand.
pub struct Extractor {
    transport: Arc<dyn Transport>,
    selectors: Selectors,
    disabled: DisabledPredicate,
}

impl Extractor {
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self {
            transport,
            selectors: Selectors::new()?,
            disabled: DisabledPredicate::default(),
        })
    }

    /// Replace the disabled-floor predicate.
    pub fn with_disabled_predicate(mut self, predicate: DisabledPredicate) -> Self {
        self.disabled = predicate;
        self
    }

    /// Read page count and title from the thread's first page.
    ///
    /// Both absent elements are `NotFound`: a layout mismatch, fatal for the
    /// thread and not worth retrying.
    pub async fn fetch_overview(&self, target: &TargetInfo) -> Result<ThreadOverview> {
        let html = self.transport.fetch_html(&target.building_url()).await?;
        self.parse_overview(&html)
    }

    pub fn parse_overview(&self, html: &str) -> Result<ThreadOverview> {
        let document = Html::parse_document(html);

        let page_text = document
            .select(&self.selectors.page_buttons)
            .last()
            .map(|el| el.text().collect::<String>())
            .ok_or_else(|| AppError::not_found("page buttons (p.BH-pagebtnA > a)"))?;
        let last_page_index = page_text
            .trim()
            .parse()
            .map_err(|_| AppError::not_found(format!("page count is not numeric: {page_text}")))?;

        let title = document
            .select(&self.selectors.title)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        if title.is_empty() {
            return Err(AppError::not_found("thread title"));
        }

        Ok(ThreadOverview {
            last_page_index,
            title,
        })
    }

    /// Extract one page of the thread.
    pub async fn extract_page(&self, target: &TargetInfo, page_index: u32) -> Result<PageRecord> {
        let floors = self.extract_floors_from(&target.page_url(page_index)).await?;
        Ok(PageRecord {
            bsn: target.bsn,
            sna: target.sna,
            page_index,
            floors,
        })
    }

    /// Fetch a URL and extract its floors, resolving truncated reply lists.
    pub async fn extract_floors_from(&self, url: &str) -> Result<Vec<FloorRecord>> {
        let html = self.transport.fetch_html(url).await?;
        let raw_floors = self.parse_floors(&html);

        let mut floors = Vec::with_capacity(raw_floors.len());
        for raw in raw_floors {
            let mut replies = match raw.replies {
                RawReplies::Inline(replies) => replies,
                RawReplies::Truncated { bsn, snb } => {
                    self.fetch_extended_replies(bsn, snb).await?
                }
            };
            // Re-sort regardless of source path; the expand response is an
            // unordered mapping.
            replies.sort_by_key(|r| r.reply_index);

            floors.push(FloorRecord {
                floor_index: raw.floor_index,
                author_name: raw.author_name,
                author_id: raw.author_id,
                content: raw.content,
                replies,
            });
        }
        Ok(floors)
    }

    /// Parse every valid floor section out of a page document.
    ///
    /// A section without an id, or whose id marks it disabled, yields no
    /// record. A malformed floor is skipped with an error log; it must not
    /// poison the rest of the page.
    fn parse_floors(&self, html: &str) -> Vec<RawFloor> {
        let document = Html::parse_document(html);
        let mut floors = Vec::new();

        for section in document.select(&self.selectors.section) {
            let Some(id_attr) = section.value().attr("id") else {
                continue;
            };
            if self.disabled.is_disabled(id_attr) {
                log::debug!("skipping disabled floor section {id_attr}");
                continue;
            }

            match self.parse_floor_section(section) {
                Ok(raw) => floors.push(raw),
                Err(e) => log::error!("floor extraction failed in section {id_attr}: {e}"),
            }
        }
        floors
    }

    fn parse_floor_section(&self, section: ElementRef<'_>) -> Result<RawFloor> {
        let main = section
            .select(&self.selectors.main)
            .next()
            .ok_or_else(|| AppError::not_found("div.c-section__main"))?;

        let author = main
            .select(&self.selectors.author)
            .next()
            .ok_or_else(|| AppError::not_found("div.c-post__header__author"))?;

        let floor_attr = author
            .select(&self.selectors.floor_anchor)
            .next()
            .and_then(|el| el.value().attr("data-floor"))
            .ok_or_else(|| AppError::parse("a.floor data-floor attribute missing"))?;
        let floor_index = floor_attr
            .parse()
            .map_err(|_| AppError::parse(format!("data-floor is not numeric: {floor_attr}")))?;

        let author_name = author
            .select(&self.selectors.username)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let author_id = author
            .select(&self.selectors.userid)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();

        // Content stays serialized markup so edits diff verbatim.
        let content = main
            .select(&self.selectors.content)
            .next()
            .map(|el| el.inner_html())
            .ok_or_else(|| AppError::not_found("div.c-article__content"))?;

        let replies = match main.select(&self.selectors.reply_container).next() {
            None => RawReplies::Inline(Vec::new()),
            Some(container) => self.parse_reply_container(container),
        };

        Ok(RawFloor {
            floor_index,
            author_name,
            author_id,
            content,
            replies,
        })
    }

    fn parse_reply_container(&self, container: ElementRef<'_>) -> RawReplies {
        if container.select(&self.selectors.nocontent).next().is_some() {
            // Truncated list; the onclick expression carries the expand
            // parameters.
            let onclick = container
                .select(&self.selectors.more_reply)
                .next()
                .and_then(|el| el.value().attr("onclick"));
            return match onclick {
                Some(onclick) => match parse_extend_params(onclick) {
                    Ok((bsn, snb)) => RawReplies::Truncated { bsn, snb },
                    Err(e) => {
                        log::error!("expand trigger parse failed: {e}");
                        RawReplies::Inline(Vec::new())
                    }
                },
                None => {
                    log::error!("truncated reply list without an expand trigger");
                    RawReplies::Inline(Vec::new())
                }
            };
        }

        RawReplies::Inline(self.parse_inline_replies(container))
    }

    /// Replies present in the document, reply index = document position.
    fn parse_inline_replies(&self, container: ElementRef<'_>) -> Vec<ReplyRecord> {
        let mut replies = Vec::new();
        for (i, item) in container.select(&self.selectors.reply_content).enumerate() {
            let Some(user) = item.select(&self.selectors.reply_user).next() else {
                log::error!("reply user link missing, skipping reply {i}");
                continue;
            };
            let Some(href) = user.value().attr("href") else {
                log::error!("reply user href missing, skipping reply {i}");
                continue;
            };

            let content = item
                .select(&self.selectors.reply_comment)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default();

            replies.push(ReplyRecord {
                reply_index: i as u32,
                author_name: user.text().collect::<String>(),
                author_id: author_id_from_href(href).to_string(),
                content,
            });
        }
        replies
    }

    /// Fetch the expand endpoint and parse its reply mapping.
    async fn fetch_extended_replies(&self, bsn: u64, snb: u64) -> Result<Vec<ReplyRecord>> {
        let url = format!("{EXTEND_REPLY_URL}bsn={bsn}&snB={snb}&returnHtml=0");
        let value = self.transport.fetch_json(&url).await?;
        Ok(parse_extend_response(&value))
    }
}

/// Pull the two expand parameters out of the inline trigger expression.
fn parse_extend_params(onclick: &str) -> Result<(u64, u64)> {
    let re = Regex::new(r"extendComment\((\d+),\s*(\d+)\);").map_err(|e| AppError::parse(e))?;
    let captures = re
        .captures(onclick)
        .ok_or_else(|| AppError::parse(format!("no extendComment match in {onclick:?}")))?;

    let bsn = captures[1]
        .parse()
        .map_err(|_| AppError::parse("extendComment first argument is not numeric"))?;
    let snb = captures[2]
        .parse()
        .map_err(|_| AppError::parse("extendComment second argument is not numeric"))?;
    Ok((bsn, snb))
}

/// Parse the expand response: a mapping from string reply-index to reply
/// fields, plus the sentinel cursor key.
///
/// Malformed entries are skipped with a warning; one bad reply never drops
/// the whole floor.
fn parse_extend_response(value: &Value) -> Vec<ReplyRecord> {
    let Some(map) = value.as_object() else {
        log::error!("expand response is not a JSON object");
        return Vec::new();
    };

    let mut replies = Vec::new();
    for (key, entry) in map {
        if key == EXTEND_SENTINEL_KEY {
            continue;
        }
        let Ok(reply_index) = key.parse::<u32>() else {
            log::warn!("expand reply index is not numeric: {key}");
            continue;
        };
        let Some(fields) = entry.as_object() else {
            log::warn!("expand reply {key} has unexpected shape");
            continue;
        };

        let nick = fields.get("nick").and_then(Value::as_str);
        let userid = fields.get("userid").and_then(Value::as_str);
        let comment = fields.get("comment").and_then(Value::as_str);
        let (Some(nick), Some(userid), Some(comment)) = (nick, userid, comment) else {
            log::warn!("expand reply {key} is missing nick/userid/comment");
            continue;
        };

        replies.push(ReplyRecord {
            reply_index,
            author_name: nick.to_string(),
            author_id: userid.to_string(),
            content: comment.to_string(),
        });
    }
    replies
}

/// The author id is the last path segment of the profile link.
fn author_id_from_href(href: &str) -> &str {
    href.rsplit('/').next().unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{
        FakeResponse, FakeTransport, floor_section, inline_reply, overview_html, page_html,
        truncated_replies,
    };
    use serde_json::json;

    fn extractor(transport: Arc<FakeTransport>) -> Extractor {
        Extractor::new(transport).unwrap()
    }

    #[test]
    fn parses_overview() {
        let transport = Arc::new(FakeTransport::new());
        let ex = extractor(transport);

        let html = overview_html("test building", 12, "");
        let overview = ex.parse_overview(&html).unwrap();
        assert_eq!(overview.last_page_index, 12);
        assert_eq!(overview.title, "test building");
    }

    #[test]
    fn overview_without_title_is_not_found() {
        let ex = extractor(Arc::new(FakeTransport::new()));
        let html = r#"<html><body><p class="BH-pagebtnA"><a>3</a></p></body></html>"#;
        assert!(matches!(
            ex.parse_overview(html).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn overview_without_page_buttons_is_not_found() {
        let ex = extractor(Arc::new(FakeTransport::new()));
        let html = r#"<html><body><div class="c-post__header"><h1 class="c-post__header__title">t</h1></div></body></html>"#;
        assert!(matches!(
            ex.parse_overview(html).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn extracts_floor_with_inline_replies() {
        let transport = Arc::new(FakeTransport::new());
        let replies = [
            inline_reply("alice", "alice01", "first"),
            inline_reply("bob", "bob02", "second"),
        ]
        .concat();
        let html = page_html(&[floor_section(1, "poster", "poster01", "<p>hello</p>", &replies)]);
        transport.push("page://1", FakeResponse::Html(html));

        let floors = extractor(transport)
            .extract_floors_from("page://1")
            .await
            .unwrap();

        assert_eq!(floors.len(), 1);
        let floor = &floors[0];
        assert_eq!(floor.floor_index, 1);
        assert_eq!(floor.author_name, "poster");
        assert_eq!(floor.author_id, "poster01");
        assert_eq!(floor.content, "<p>hello</p>");
        assert_eq!(floor.replies.len(), 2);
        assert_eq!(floor.replies[0].reply_index, 0);
        assert_eq!(floor.replies[0].author_id, "alice01");
        assert_eq!(floor.replies[1].reply_index, 1);
        assert_eq!(floor.replies[1].content, "second");
    }

    #[tokio::test]
    async fn disabled_floor_yields_no_record() {
        let transport = Arc::new(FakeTransport::new());
        let mut disabled = floor_section(2, "ghost", "ghost01", "<p>gone</p>", "");
        disabled = disabled.replace("id=\"post_2\"", "id=\"post_disable_2\"");
        let html = page_html(&[
            floor_section(1, "poster", "poster01", "<p>hello</p>", ""),
            disabled,
            floor_section(3, "third", "third01", "<p>still here</p>", ""),
        ]);
        transport.push("page://1", FakeResponse::Html(html));

        let floors = extractor(transport)
            .extract_floors_from("page://1")
            .await
            .unwrap();

        let indices: Vec<u32> = floors.iter().map(|f| f.floor_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[tokio::test]
    async fn malformed_floor_is_skipped_without_poisoning_page() {
        let transport = Arc::new(FakeTransport::new());
        let broken =
            floor_section(2, "broken", "broken01", "<p>x</p>", "").replace("data-floor=\"2\"", "");
        let html = page_html(&[
            floor_section(1, "poster", "poster01", "<p>hello</p>", ""),
            broken,
        ]);
        transport.push("page://1", FakeResponse::Html(html));

        let floors = extractor(transport)
            .extract_floors_from("page://1")
            .await
            .unwrap();
        assert_eq!(floors.len(), 1);
        assert_eq!(floors[0].floor_index, 1);
    }

    #[tokio::test]
    async fn truncated_replies_use_expand_endpoint() {
        let transport = Arc::new(FakeTransport::new());
        let html = page_html(&[floor_section(
            1,
            "poster",
            "poster01",
            "<p>hello</p>",
            &truncated_replies(60076, 8292214),
        )]);
        transport.push("page://1", FakeResponse::Html(html));
        transport.push(
            "https://forum.gamer.com.tw/ajax/moreCommend.php?bsn=60076&snB=8292214&returnHtml=0",
            FakeResponse::Json(json!({
                "2": {"nick": "carol", "userid": "carol03", "comment": "late"},
                "0": {"nick": "alice", "userid": "alice01", "comment": "early"},
                "next_snC": "5",
            })),
        );

        let floors = extractor(transport)
            .extract_floors_from("page://1")
            .await
            .unwrap();

        let replies = &floors[0].replies;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].reply_index, 0);
        assert_eq!(replies[0].author_id, "alice01");
        assert_eq!(replies[1].reply_index, 2);
        assert_eq!(replies[1].author_id, "carol03");
    }

    #[test]
    fn extend_response_skips_sentinel_and_malformed_entries() {
        let value = json!({
            "0": {"nick": "a", "userid": "a01", "comment": "ok"},
            "2": {"nick": "c", "userid": "c03", "comment": "ok too"},
            "next_snC": "5",
            "oops": {"nick": "x", "userid": "x", "comment": "non-numeric index"},
            "3": "not an object",
            "4": {"nick": "missing fields"},
        });

        let mut replies = parse_extend_response(&value);
        replies.sort_by_key(|r| r.reply_index);

        let indices: Vec<u32> = replies.iter().map(|r| r.reply_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn extend_params_parse_from_trigger_expression() {
        let (bsn, snb) = parse_extend_params("extendComment(60076, 8292214);").unwrap();
        assert_eq!((bsn, snb), (60076, 8292214));

        let (bsn, snb) = parse_extend_params("javascript:extendComment(1,2);").unwrap();
        assert_eq!((bsn, snb), (1, 2));

        assert!(parse_extend_params("showMore(1, 2);").is_err());
    }

    #[test]
    fn author_id_comes_from_last_href_segment() {
        assert_eq!(
            author_id_from_href("https://home.gamer.com.tw/alice01"),
            "alice01"
        );
        assert_eq!(author_id_from_href("bob02"), "bob02");
    }
}
