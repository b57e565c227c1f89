use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContentType {
    Movie,
    Series,
    Anime,
    AnimeMovie,
    Ova,
    AsianDrama,
    Others,
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Others
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShowStatus {
    Ongoing,
    Completed,
}

/// Listing card as it appears on channel and search pages.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContentInfo {
    pub id: String,
    pub title: String,
    pub secondary_title: Option<String>,
    pub image: String,
    pub content_type: ContentType,
    pub year: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContentDetails {
    pub title: String,
    pub original_title: Option<String>,
    pub image: String,
    pub description: String,
    pub content_type: ContentType,
    pub year: Option<u32>,
    /// minutes
    pub duration: Option<u32>,
    pub status: Option<ShowStatus>,
    pub mal_id: Option<u32>,
    pub tags: Vec<String>,
    pub additional_info: Vec<String>,
    pub similar: Vec<ContentInfo>,
    pub media_items: Option<Vec<ContentMediaItem>>,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContentMediaItem {
    pub number: u32,
    pub title: String,
    pub season: Option<u32>,
    pub section: Option<String>,
    pub image: Option<String>,
    pub sources: Option<Vec<ContentMediaItemSource>>,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ContentMediaItemSource {
    Video {
        link: String,
        description: String,
        quality: Option<u32>,
        headers: Option<HashMap<String, String>>,
    },
    Subtitle {
        link: String,
        description: String,
        headers: Option<HashMap<String, String>>,
    },
}

impl ContentMediaItemSource {
    pub fn link(&self) -> &str {
        match self {
            ContentMediaItemSource::Video { link, .. } => link,
            ContentMediaItemSource::Subtitle { link, .. } => link,
        }
    }
}
