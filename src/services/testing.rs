// src/services/testing.rs

//! Shared test doubles: an in-memory transport and thread-markup builders.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::services::session::Transport;

/// One canned response for a route.
#[derive(Debug, Clone)]
pub(crate) enum FakeResponse {
    Html(String),
    Json(serde_json::Value),
    Fail,
}

/// Transport serving canned responses per URL.
///
/// Pushing several responses to one URL forms a sequence; the last one is
/// repeated once the sequence is drained. Unknown URLs fail the fetch.
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, Vec<FakeResponse>>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn push(&self, url: &str, response: FakeResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(response);
    }

    fn take(&self, url: &str) -> Result<FakeResponse> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(url)
            .ok_or_else(|| AppError::config(format!("no fake route for {url}")))?;
        if queue.len() > 1 {
            Ok(queue.remove(0))
        } else {
            Ok(queue[0].clone())
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        match self.take(url)? {
            FakeResponse::Html(html) => Ok(html),
            FakeResponse::Fail => Err(AppError::config("injected transport failure")),
            FakeResponse::Json(_) => Err(AppError::config(format!("expected html route: {url}"))),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        match self.take(url)? {
            FakeResponse::Json(value) => Ok(value),
            FakeResponse::Fail => Err(AppError::config("injected transport failure")),
            FakeResponse::Html(_) => Err(AppError::config(format!("expected json route: {url}"))),
        }
    }
}

/// A first page with title, pagination buttons, and optional floor markup.
pub(crate) fn overview_html(title: &str, pages: u32, floors_html: &str) -> String {
    let links: String = (1..=pages).map(|p| format!("<a>{p}</a>")).collect();
    format!(
        r#"<html><body>
        <div class="c-post__header"><h1 class="c-post__header__title">{title}</h1></div>
        <p class="BH-pagebtnA">{links}</p>
        {floors_html}
        </body></html>"#
    )
}

/// A page body containing only floor sections.
pub(crate) fn page_html(sections: &[String]) -> String {
    format!("<html><body>{}</body></html>", sections.concat())
}

/// One post section in the thread's markup shape.
pub(crate) fn floor_section(
    floor_index: u32,
    author: &str,
    author_id: &str,
    content: &str,
    replies_html: &str,
) -> String {
    format!(
        r#"<section class="c-section" id="post_{floor_index}">
        <div class="c-section__main">
        <div class="c-post__header"><div class="c-post__header__author">
        <a class="floor" data-floor="{floor_index}"></a><a class="username">{author}</a><a class="userid">{author_id}</a>
        </div></div>
        <div class="c-article__content">{content}</div>
        <div class="c-reply">{replies_html}</div>
        </div></section>"#
    )
}

/// One inline reply item.
pub(crate) fn inline_reply(author: &str, author_id: &str, comment: &str) -> String {
    format!(
        r#"<div class="c-reply__item"><div><div class="reply-content"><a class="reply-content__user" href="https://home.gamer.com.tw/{author_id}">{author}</a><article class="c-article"><span class="comment_content">{comment}</span></article></div></div></div>"#
    )
}

/// A truncated reply container with the expand trigger.
pub(crate) fn truncated_replies(bsn: u64, snb: u64) -> String {
    format!(
        r#"<div class="nocontent"><a class="more-reply" onclick="extendComment({bsn}, {snb});">more</a></div>"#
    )
}
