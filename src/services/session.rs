// src/services/session.rs

//! Authenticated HTTP transport.
//!
//! The forum requires a logged-in session for thread pages. `Session` keeps
//! the login cookies in a jar and refuses to fetch anything until `login`
//! has succeeded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// First login phase; serves the `alternativeCaptcha` hidden input.
pub const LOGIN_URL_PHASE1: &str = "https://user.gamer.com.tw/login.php";

/// Second login phase; the form POST that sets the session cookies.
pub const LOGIN_URL_PHASE2: &str = "https://user.gamer.com.tw/ajax/do_login.php";

/// Minimal fetch surface the extraction pipeline needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a URL and return the raw document body.
    async fn fetch_html(&self, url: &str) -> Result<String>;

    /// Fetch a URL and parse the body as JSON.
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value>;
}

/// Cookie-bearing HTTP client gated on a successful login.
pub struct Session {
    client: reqwest::Client,
    active: AtomicBool,
}

impl Session {
    /// Build the client with the session jar pre-seeded; no login yet.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let jar = Arc::new(reqwest::cookie::Jar::default());
        // The login check rejects requests without a `_ga` cookie.
        let login_origin: url::Url = LOGIN_URL_PHASE1.parse()?;
        jar.add_cookie_str("_ga=c8763; Domain=gamer.com.tw", &login_origin);

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(jar)
            .build()?;

        Ok(Self {
            client,
            active: AtomicBool::new(false),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AppError::SessionInactive)
        }
    }

    /// Two-phase login: fetch the captcha substitute, then post the form.
    /// The jar retains the cookies for subsequent fetches.
    pub async fn login(&self, account: &str, password: &str) -> Result<()> {
        let body = self
            .client
            .get(LOGIN_URL_PHASE1)
            .send()
            .await?
            .text()
            .await?;

        let captcha = extract_alternative_captcha(&body)?;
        log::info!("got alternativeCaptcha value");

        self.client
            .post(LOGIN_URL_PHASE2)
            .form(&[
                ("userid", account),
                ("password", password),
                ("alternativeCaptcha", captcha.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        log::info!("login success");
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Transport for Session {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.ensure_active()?;
        let response = self.client.get(url).send().await?;
        Ok(response.text().await?)
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        self.ensure_active()?;
        let body = self.client.get(url).send().await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Pull the hidden `alternativeCaptcha` value out of the login page.
fn extract_alternative_captcha(body: &str) -> Result<String> {
    let re = Regex::new(r#"<input type="hidden" name="alternativeCaptcha" value="(\w+)""#)
        .map_err(|e| AppError::parse(e))?;
    re.captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AppError::not_found("alternativeCaptcha value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_captcha_value() {
        let body = r#"<form><input type="hidden" name="alternativeCaptcha" value="a1b2c3"></form>"#;
        assert_eq!(extract_alternative_captcha(body).unwrap(), "a1b2c3");
    }

    #[test]
    fn missing_captcha_is_not_found() {
        let err = extract_alternative_captcha("<form></form>").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_before_login_is_rejected() {
        let session = Session::new(&CrawlerConfig::default()).unwrap();
        let err = session
            .fetch_html("https://forum.gamer.com.tw/C.php?bsn=1&snA=1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionInactive));
    }
}
