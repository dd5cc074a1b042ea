/// Crawl status definitions for frontier entries
///
/// This module defines the four statuses a frontier entry can be in and the
/// legal transitions between them.
use std::fmt;

/// Represents the crawl status of a frontier entry
///
/// ```text
/// New       -> Requested   (selected for fetch)
/// New       -> Ignored     (rejected by fetch policy)
/// Requested -> Got         (fetched and stored)
/// Requested -> Ignored     (rejected after selection)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrawlStatus {
    /// Discovered, not yet requested
    New,

    /// Dispatched to fetch, awaiting the result
    Requested,

    /// Successfully fetched and stored
    Got,

    /// Excluded from fetching by policy
    Ignored,
}

impl CrawlStatus {
    /// Returns true if no further transition is defined from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Got | Self::Ignored)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Requested)
                | (Self::New, Self::Ignored)
                | (Self::Requested, Self::Got)
                | (Self::Requested, Self::Ignored)
        )
    }

    /// Row id of this status in the seeded `crawl_statuses` table
    pub fn id(&self) -> i64 {
        match self {
            Self::New => 1,
            Self::Requested => 2,
            Self::Got => 3,
            Self::Ignored => 4,
        }
    }

    /// Maps a `crawl_statuses` row id back to a status
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::New),
            2 => Some(Self::Requested),
            3 => Some(Self::Got),
            4 => Some(Self::Ignored),
            _ => None,
        }
    }

    /// Name stored in the `crawl_statuses` table
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Requested => "Requested",
            Self::Got => "Got",
            Self::Ignored => "Ignored",
        }
    }

    /// Parses a status from its stored name
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "New" => Some(Self::New),
            "Requested" => Some(Self::Requested),
            "Got" => Some(Self::Got),
            "Ignored" => Some(Self::Ignored),
            _ => None,
        }
    }

    /// Returns all statuses in id order
    pub fn all() -> [Self; 4] {
        [Self::New, Self::Requested, Self::Got, Self::Ignored]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
