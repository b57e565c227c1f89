pub mod doodstream;
pub mod mixdrop;
pub mod mp4upload;
pub mod streamwish;

use std::collections::HashMap;

use log::{error, warn};

use crate::{models::ContentMediaItemSource, utils::text};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Host {
    Mp4Upload,
    StreamWish,
    DoodStream,
    MixDrop,
    DirectFile,
}

const STREAMWISH_HOSTS: &[&str] = &[
    "streamwish",
    "filelions",
    "vidhide",
    "wishembed",
    "wishfast",
    "swdyu",
    "hgplaycdn",
    "dhtpre",
    "embedwish",
];
const DOOD_HOSTS: &[&str] = &["dood", "ds2play", "d000d", "d0000d"];
const MIXDROP_HOSTS: &[&str] = &["mixdrop", "mxdrop", "m1xdrop"];

fn detect_host(url: &str) -> Option<Host> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
    let matches = |names: &[&str]| names.iter().any(|name| host.contains(name));

    if host.contains("mp4upload") {
        Some(Host::Mp4Upload)
    } else if matches(STREAMWISH_HOSTS) {
        Some(Host::StreamWish)
    } else if matches(DOOD_HOSTS) {
        Some(Host::DoodStream)
    } else if matches(MIXDROP_HOSTS) {
        Some(Host::MixDrop)
    } else if text::is_media_file(url) {
        Some(Host::DirectFile)
    } else {
        None
    }
}

/// Resolves an embed url into playable links. Unknown hosts and extractor
/// failures produce no links.
pub async fn load_extractor(url: &str, referer: &str, prefix: &str) -> Vec<ContentMediaItemSource> {
    let url = text::to_full_url(url.trim());

    let host = match detect_host(&url) {
        Some(host) => host,
        None => {
            warn!("[extractors] no extractor for {url}");
            return vec![];
        }
    };

    let result = match host {
        Host::Mp4Upload => mp4upload::extract(&url, referer, prefix).await,
        Host::StreamWish => streamwish::extract(&url, referer, prefix).await,
        Host::DoodStream => doodstream::extract(&url, prefix).await,
        Host::MixDrop => mixdrop::extract(&url, prefix).await,
        Host::DirectFile => Ok(vec![direct_link(&url, referer, prefix, None)]),
    };

    match result {
        Ok(sources) => sources,
        Err(err) => {
            error!("[extractors] {host:?} failed for {url}: {err}");
            vec![]
        }
    }
}

/// Link played as is, with the page it was found on as referer.
pub fn direct_link(
    url: &str,
    referer: &str,
    description: &str,
    quality: Option<u32>,
) -> ContentMediaItemSource {
    let headers = if referer.is_empty() {
        None
    } else {
        Some(HashMap::from([("Referer".to_owned(), referer.to_owned())]))
    };

    ContentMediaItemSource::Video {
        link: text::to_full_url(url),
        description: description.to_owned(),
        quality,
        headers,
    }
}
