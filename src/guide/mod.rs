//! Read-only collaborators the scan consults: the program guide, the media
//! library and the optional season/episode enricher.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::models::{CandidateEvent, EventDetails, MediaItem, SearchQuery};

/// Electronic program guide access
pub trait GuideSource: Send + Sync {
    /// All events matching the query, in no particular order
    fn search(&self, query: &SearchQuery<'_>) -> Vec<CandidateEvent>;

    /// Full guide record for an event, `None` when it is no longer in the guide
    fn resolve_event(&self, service: &str, event_id: u32) -> Option<EventDetails>;

    /// Services contained in a bouquet or alternative group
    fn group_members(&self, _group: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Enumerates recordings already present in a destination directory
pub trait MediaLibrary: Send + Sync {
    /// `None` when the directory can't be listed
    fn enumerate_directory(&self, path: &Path) -> Option<Vec<MediaItem>>;
}

/// Input of a season/episode lookup
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest<'a> {
    pub service: &'a str,
    pub name: &'a str,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub short_description: &'a str,
    pub destination: &'a Path,
}

/// Values to use instead of the guide's; `None` keeps the original
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub name: Option<String>,
    pub short_description: Option<String>,
    pub destination: Option<PathBuf>,
    pub trace: Vec<String>,
}

/// Season/episode labeling service
pub trait SeriesEnricher: Send + Sync {
    fn season_episode(&self, request: &EnrichmentRequest<'_>) -> Option<Enrichment>;
}
