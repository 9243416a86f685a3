// src/models/target.rs

//! Thread target identification.

use url::Url;

use crate::error::{AppError, Result};

/// Base URL for thread pages.
pub const FORUM_BASE_URL: &str = "https://forum.gamer.com.tw/C.php?";

/// Identifies one thread: board id (`bsn`) plus thread id (`snA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetInfo {
    pub bsn: u64,
    pub sna: u64,
}

impl TargetInfo {
    pub fn new(bsn: u64, sna: u64) -> Self {
        Self { bsn, sna }
    }

    /// Both ids must be positive integers.
    pub fn validate(&self) -> Result<()> {
        if self.bsn == 0 || self.sna == 0 {
            return Err(AppError::invalid_target(format!(
                "bsn and snA must be positive (bsn={}, snA={})",
                self.bsn, self.sna
            )));
        }
        Ok(())
    }

    /// URL of the thread's first page.
    pub fn building_url(&self) -> String {
        format!("{}bsn={}&snA={}", FORUM_BASE_URL, self.bsn, self.sna)
    }

    /// URL of one page within the thread (1-based).
    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}bsn={}&snA={}&page={}",
            FORUM_BASE_URL, self.bsn, self.sna, page
        )
    }

    /// Derive a target from a thread URL's `bsn` and `snA` query parameters.
    pub fn from_url(raw_url: &str) -> Result<Self> {
        let parsed = Url::parse(raw_url)?;

        let mut bsn = 0u64;
        let mut sna = 0u64;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "bsn" => {
                    bsn = value
                        .parse()
                        .map_err(|_| AppError::parse(format!("bsn is not numeric: {value}")))?;
                }
                "snA" => {
                    sna = value
                        .parse()
                        .map_err(|_| AppError::parse(format!("snA is not numeric: {value}")))?;
                }
                _ => {}
            }
        }

        let target = Self { bsn, sna };
        target.validate()?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero_ids() {
        assert!(TargetInfo::new(0, 1).validate().is_err());
        assert!(TargetInfo::new(1, 0).validate().is_err());
        assert!(TargetInfo::new(60076, 8292214).validate().is_ok());
    }

    #[test]
    fn builds_page_urls() {
        let target = TargetInfo::new(60076, 8292214);
        assert_eq!(
            target.building_url(),
            "https://forum.gamer.com.tw/C.php?bsn=60076&snA=8292214"
        );
        assert_eq!(
            target.page_url(3),
            "https://forum.gamer.com.tw/C.php?bsn=60076&snA=8292214&page=3"
        );
    }

    #[test]
    fn parses_target_from_url() {
        let target =
            TargetInfo::from_url("https://forum.gamer.com.tw/C.php?bsn=60076&snA=8292214&page=2")
                .unwrap();
        assert_eq!(target.bsn, 60076);
        assert_eq!(target.sna, 8292214);
    }

    #[test]
    fn from_url_rejects_missing_params() {
        assert!(TargetInfo::from_url("https://forum.gamer.com.tw/C.php?bsn=60076").is_err());
        assert!(TargetInfo::from_url("https://forum.gamer.com.tw/C.php").is_err());
    }

    #[test]
    fn from_url_rejects_non_numeric() {
        let err =
            TargetInfo::from_url("https://forum.gamer.com.tw/C.php?bsn=abc&snA=1").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }
}
