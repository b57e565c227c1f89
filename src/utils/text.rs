use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;

/// First run of ascii digits in `text`.
pub fn get_int_from_text(text: &str) -> Option<u32> {
    static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
    DIGITS_RE
        .get_or_init(|| Regex::new(r"\d+").unwrap())
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Four digit year between 1900 and next year.
pub fn extract_year(text: &str) -> Option<u32> {
    static YEAR_RE: OnceLock<Regex> = OnceLock::new();
    let max_year = chrono::Utc::now().year() as u32 + 1;

    YEAR_RE
        .get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap())
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|year| *year <= max_year)
}

/// Season and episode from markers like `S01E02`.
pub fn extract_season_episode(text: &str) -> Option<(u32, u32)> {
    static SEASON_EPISODE_RE: OnceLock<Regex> = OnceLock::new();
    let caps = SEASON_EPISODE_RE
        .get_or_init(|| Regex::new(r"[sS](?<season>\d+)[eE](?<episode>\d+)").unwrap())
        .captures(text)?;

    Some((
        caps.name("season")?.as_str().parse().ok()?,
        caps.name("episode")?.as_str().parse().ok()?,
    ))
}

pub fn to_full_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.into()
    }
}

/// Resolves `href` against `base`, `None` for empty or script links.
pub fn fix_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("data:") {
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_owned());
    }

    if href.starts_with("//") {
        return Some(to_full_url(href));
    }

    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .ok()
}

/// Site relative id (path and query without the leading slash).
pub fn extract_id_from_url(href: &str) -> String {
    let href = href.trim();
    match url::Url::parse(href) {
        Ok(url) => {
            let mut id = url.path().trim_start_matches('/').to_owned();
            if let Some(query) = url.query() {
                id.push('?');
                id.push_str(query);
            }
            id
        }
        Err(_) => href.trim_start_matches('/').to_owned(),
    }
}

/// Joins a site relative id with the supplier origin.
pub fn format_id_to_url(origin: &str, id: &str) -> String {
    if id.starts_with("http://") || id.starts_with("https://") {
        id.to_owned()
    } else {
        format!("{}/{}", origin.trim_end_matches('/'), id.trim_start_matches('/'))
    }
}

/// Scheme and host part of `url`.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    match parsed.origin() {
        url::Origin::Tuple(..) => Some(parsed.origin().ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}

pub fn sanitize_text(text: &str) -> String {
    static SANITIZE_TEXT_REGEXP: OnceLock<regex::Regex> = OnceLock::new();
    let re = SANITIZE_TEXT_REGEXP.get_or_init(|| Regex::new(r#"[\n\t\s]+"#).unwrap());

    re.replace_all(text, " ").into_owned().trim().into()
}

/// MyAnimeList id from an `.../anime/<id>/...` link.
pub fn mal_id_from_url(href: &str) -> Option<u32> {
    static MAL_ID_RE: OnceLock<Regex> = OnceLock::new();
    MAL_ID_RE
        .get_or_init(|| Regex::new(r"/anime/(?<id>\d+)").unwrap())
        .captures(href)?
        .name("id")?
        .as_str()
        .parse()
        .ok()
}

pub fn is_media_file(url: &str) -> bool {
    static MEDIA_FILE_RE: OnceLock<Regex> = OnceLock::new();
    let path = url.split(['?', '#']).next().unwrap_or_default();

    MEDIA_FILE_RE
        .get_or_init(|| Regex::new(r"(?i)\.(mp4|mkv|avi|mov|m3u8|webm)$").unwrap())
        .is_match(path)
}
