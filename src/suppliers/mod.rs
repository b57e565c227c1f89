/// flutter_rust_bridge:ignore

#[cfg(test)]
mod tests;

// suppliers
mod anime4up;
mod animeblkom;
mod egibest;
mod egy1best;
mod faselhd;
mod ristoanime;

use anime4up::{Anime4upContentSupplier, WitAnimeContentSupplier};
use animeblkom::AnimeBlkomContentSupplier;
use egibest::EgiBestContentSupplier;
use egy1best::Egy1BestContentSupplier;
use faselhd::FaselHDContentSupplier;
use ristoanime::RistoAnimeContentSupplier;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::anyhow;
use enum_dispatch::enum_dispatch;
use indexmap::IndexMap;
use strum::VariantNames;
use strum_macros::{EnumIter, EnumString, VariantNames};

use crate::models::{
    ContentDetails, ContentInfo, ContentMediaItem, ContentMediaItemSource, ContentType,
};
use crate::utils::{html, text};

#[enum_dispatch]
pub trait ContentSupplier {
    fn get_channels(&self) -> Vec<String>;
    fn get_default_channels(&self) -> Vec<String>;
    fn get_supported_types(&self) -> Vec<ContentType>;
    fn get_supported_languages(&self) -> Vec<String>;
    async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error>;
    async fn load_channel(
        &self,
        channel: String,
        page: u16,
    ) -> Result<Vec<ContentInfo>, anyhow::Error>;
    async fn get_content_details(
        &self,
        id: String,
    ) -> Result<Option<ContentDetails>, anyhow::Error>;
    async fn load_media_items(
        &self,
        id: String,
        params: Vec<String>,
    ) -> Result<Vec<ContentMediaItem>, anyhow::Error>;
    async fn load_media_item_sources(
        &self,
        id: String,
        params: Vec<String>,
    ) -> Result<Vec<ContentMediaItemSource>, anyhow::Error>;
}

#[enum_dispatch(ContentSupplier)]
#[derive(EnumIter, EnumString, VariantNames)]
pub enum AllContentSuppliers {
    #[strum(serialize = "AnimeBlkom")]
    AnimeBlkomContentSupplier,
    #[strum(serialize = "Anime4up")]
    Anime4upContentSupplier,
    #[strum(serialize = "WitAnime")]
    WitAnimeContentSupplier,
    #[strum(serialize = "EgiBest")]
    EgiBestContentSupplier,
    #[strum(serialize = "Egy1Best")]
    Egy1BestContentSupplier,
    #[strum(serialize = "FaselHD")]
    FaselHDContentSupplier,
    #[strum(serialize = "RistoAnime")]
    RistoAnimeContentSupplier,
}

pub fn avalaible_suppliers() -> Vec<String> {
    AllContentSuppliers::VARIANTS
        .iter()
        .map(|&s| s.to_owned())
        .collect()
}

pub fn get_supplier(name: &str) -> Result<AllContentSuppliers, anyhow::Error> {
    AllContentSuppliers::from_str(name).map_err(|err| anyhow!("unknown supplier {name}: {err}"))
}

/// Channel url with the page number appended.
fn get_channel_url(
    channels: &IndexMap<&'static str, String>,
    channel: &str,
    page: u16,
) -> anyhow::Result<String> {
    let url = channels
        .get(channel)
        .ok_or_else(|| anyhow!("unknown channel {channel}"))?;

    Ok(format!("{url}{page}"))
}

fn channel_names(channels: &IndexMap<&'static str, String>) -> Vec<String> {
    channels.keys().map(|&name| name.to_owned()).collect()
}

/// Movies are played from their own page, so they get a single item.
fn movie_media_item(title: &str, id: &str) -> ContentMediaItem {
    ContentMediaItem {
        number: 1,
        title: title.to_owned(),
        params: vec![id.to_owned()],
        ..Default::default()
    }
}

/// Keeps the first item of every episode page id.
fn dedup_media_items(items: Vec<ContentMediaItem>) -> Vec<ContentMediaItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| match item.params.first() {
            Some(page) => seen.insert(page.clone()),
            None => true,
        })
        .collect()
}

/// Cards without an id cannot be opened.
fn dedup_content_infos(items: Vec<ContentInfo>) -> Vec<ContentInfo> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.id.is_empty() && seen.insert(item.id.clone()))
        .collect()
}

/// Episode page for the sources call, the content page for movies.
fn source_page_id(id: &str, params: &[String]) -> String {
    params
        .first()
        .filter(|p| !p.is_empty())
        .cloned()
        .unwrap_or_else(|| id.to_owned())
}

/// `<source>` tags of a player page with their `res`/`size` attribute as quality.
fn parse_source_tags(page: &str) -> Vec<(String, Option<u32>)> {
    static SOURCE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);
    let sources = document
        .select(html::selector(&SOURCE_SELECTOR, "source[src]"))
        .filter_map(|el| {
            let src = el.attr("src")?.trim();
            if src.is_empty() {
                return None;
            }

            let quality = el
                .attr("res")
                .or_else(|| el.attr("size"))
                .or_else(|| el.attr("label"))
                .and_then(text::get_int_from_text);

            Some((text::to_full_url(src), quality))
        })
        .collect();

    sources
}
