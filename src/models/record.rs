//! Extracted thread records.
//!
//! These are ephemeral extraction results; durable counterparts with
//! surrogate ids live in the storage layer.

use serde::{Deserialize, Serialize};

/// One reply attached to a floor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyRecord {
    pub reply_index: u32,
    pub author_name: String,
    pub author_id: String,
    pub content: String,
}

/// One top-level post within a thread.
///
/// `floor_index` is site-assigned and monotonically increasing within a
/// thread, with gaps where floors were deleted or disabled. `content` is
/// serialized markup, not plain text, so edits can be diffed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FloorRecord {
    pub floor_index: u32,
    pub author_name: String,
    pub author_id: String,
    pub content: String,

    #[serde(rename = "messages")]
    pub replies: Vec<ReplyRecord>,
}

/// One paginated slice of a thread's floors.
///
/// The floor list is rebuilt fresh on each extraction, never merged, since
/// page contents can shift between scrapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRecord {
    pub bsn: u64,
    pub sna: u64,
    pub page_index: u32,

    #[serde(rename = "floor_records")]
    pub floors: Vec<FloorRecord>,
}

/// One whole discussion thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildingRecord {
    pub bsn: u64,
    pub sna: u64,

    #[serde(rename = "building_title")]
    pub title: String,

    pub last_page_index: u32,

    /// The designated poster's first floor, if the thread has any floors.
    pub poster_floor: Option<FloorRecord>,

    pub pages: Vec<PageRecord>,
}

/// Page count and title read from a thread's first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOverview {
    pub last_page_index: u32,
    pub title: String,
}
