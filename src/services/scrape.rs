// src/services/scrape.rs

//! Pagination driver: walks every page of a thread, strictly in order.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{BuildingRecord, CrawlerConfig, TargetInfo};
use crate::services::extract::Extractor;
use crate::services::session::Transport;

/// One-shot thread scraper.
pub struct Scraper {
    extractor: Extractor,
    page_delay: Duration,
}

impl Scraper {
    pub fn new(transport: Arc<dyn Transport>, config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            extractor: Extractor::new(transport)?,
            page_delay: Duration::from_millis(config.page_delay_ms),
        })
    }

    /// Build from an existing extractor (custom disabled predicate etc.).
    pub fn from_extractor(extractor: Extractor, page_delay: Duration) -> Self {
        Self {
            extractor,
            page_delay,
        }
    }

    /// Scrape the whole building.
    ///
    /// Pages are fetched 1..=N strictly in order; the floor natural keys
    /// depend on sequential page indices. Any page failure aborts the whole
    /// scrape, no partial record is returned.
    pub async fn scrape_building(&self, target: &TargetInfo) -> Result<BuildingRecord> {
        target.validate()?;

        let overview = self.extractor.fetch_overview(target).await?;
        log::info!(
            "scraping bsn={} snA={} ({} pages): {}",
            target.bsn,
            target.sna,
            overview.last_page_index,
            overview.title
        );

        let mut pages = Vec::with_capacity(overview.last_page_index as usize);
        for page_index in 1..=overview.last_page_index {
            // Politeness toward the origin, not a correctness mechanism.
            tokio::time::sleep(self.page_delay).await;

            let page = self.extractor.extract_page(target, page_index).await?;
            log::debug!("page {page_index}: {} floors", page.floors.len());
            pages.push(page);
        }

        let poster_floor = pages.first().and_then(|page| page.floors.first()).cloned();

        Ok(BuildingRecord {
            bsn: target.bsn,
            sna: target.sna,
            title: overview.title,
            last_page_index: overview.last_page_index,
            poster_floor,
            pages,
        })
    }

    /// Scrape a building identified by a thread URL.
    pub async fn scrape_url(&self, url: &str) -> Result<BuildingRecord> {
        let target = TargetInfo::from_url(url)?;
        self.scrape_building(&target).await
    }
}
