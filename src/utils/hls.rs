use std::{collections::HashMap, sync::OnceLock};

use anyhow::Result;
use regex::Regex;

use crate::models::ContentMediaItemSource;
use crate::utils::create_client;

/// Stream variant of an HLS master playlist
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub quality: Option<u32>,
    pub src: String,
}

/// Loads a master playlist and turns every variant into a video source.
/// A playlist without variants is returned as a single source.
pub async fn expand_master_playlist(
    url: &str,
    referer: &str,
    prefix: &str,
) -> Result<Vec<ContentMediaItemSource>> {
    let content = create_client()
        .get(url)
        .header("Referer", referer)
        .send()
        .await?
        .text()
        .await?;

    let headers = Some(HashMap::from([("Referer".to_owned(), referer.to_owned())]));
    let variants = parse_variants(&content, url);

    if variants.is_empty() {
        return Ok(vec![ContentMediaItemSource::Video {
            link: url.to_owned(),
            description: prefix.to_owned(),
            quality: None,
            headers,
        }]);
    }

    Ok(variants
        .into_iter()
        .map(|variant| ContentMediaItemSource::Video {
            description: match variant.quality {
                Some(q) => format!("{prefix} {q}p"),
                None => prefix.to_owned(),
            },
            link: variant.src,
            quality: variant.quality,
            headers: headers.clone(),
        })
        .collect())
}

/// Parses `#EXT-X-STREAM-INF` entries, the uri is on the next non comment line.
pub fn parse_variants(content: &str, base_url: &str) -> Vec<Variant> {
    static RESOLUTION_RE: OnceLock<Regex> = OnceLock::new();
    let resolution_re =
        RESOLUTION_RE.get_or_init(|| Regex::new(r"RESOLUTION=\d+x(?<height>\d+)").unwrap());

    let mut variants = Vec::new();
    let mut pending: Option<Option<u32>> = None;

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("#EXT-X-STREAM-INF") {
            let quality = resolution_re
                .captures(line)
                .and_then(|c| c.name("height")?.as_str().parse().ok());
            pending = Some(quality);
        } else if !line.starts_with('#') {
            if let Some(quality) = pending.take() {
                let src = if line.starts_with("http") {
                    line.to_owned()
                } else {
                    resolve_uri(base_url, line)
                };
                variants.push(Variant { quality, src });
            }
        }
    }

    variants.sort_by(|a, b| b.quality.cmp(&a.quality));
    variants
}

/// Resolves a relative URI against a base URL
fn resolve_uri(base_url: &str, relative_path: &str) -> String {
    if let Some(resolved) = url::Url::parse(base_url)
        .ok()
        .and_then(|base| base.join(relative_path).ok())
    {
        return resolved.to_string();
    }

    if base_url.ends_with('/') {
        format!("{}{}", base_url, relative_path)
    } else if let Some(pos) = base_url.rfind('/') {
        format!("{}/{}", &base_url[..pos], relative_path)
    } else {
        format!("{}/{}", base_url, relative_path)
    }
}

/// Master playlist url embedded anywhere in a player page.
pub fn find_master_playlist(html: &str) -> Option<String> {
    static MASTER_RE: OnceLock<Regex> = OnceLock::new();
    MASTER_RE
        .get_or_init(|| {
            Regex::new(r#"https?:(?:\\?/){2}[^"'\s<>]+master\.m3u8[^"'\s<>]*"#).unwrap()
        })
        .find(html)
        .map(|m| m.as_str().replace("\\/", "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_variants_by_quality() {
        let m3u8_content = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
https://cdn.example.com/1080/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
720/index.m3u8"#;

        let variants = parse_variants(m3u8_content, "https://example.com/hls/master.m3u8");

        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].quality, Some(1080));
        assert_eq!(variants[0].src, "https://cdn.example.com/1080/index.m3u8");
        assert_eq!(variants[1].src, "https://example.com/hls/720/index.m3u8");
        assert_eq!(variants[2].quality, Some(360));
    }

    #[test]
    fn should_return_nothing_for_media_playlist() {
        let m3u8_content = r#"#EXTM3U
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
seg-1.ts"#;

        assert!(parse_variants(m3u8_content, "https://example.com/index.m3u8").is_empty());
    }

    #[test]
    fn test_resolve_uri() {
        assert_eq!(
            resolve_uri("https://example.com/path/master.m3u8", "audio/playlist.m3u8"),
            "https://example.com/path/audio/playlist.m3u8"
        );
        assert_eq!(
            resolve_uri("https://example.com/master.m3u8", "https://other.com/a.m3u8"),
            "https://other.com/a.m3u8"
        );
    }

    #[test]
    fn should_find_master_playlist_in_player_page() {
        let html = r#"<script>var player = {file:"https:\/\/s1.scdns.io\/hls\/abc\/master.m3u8?t=1"};</script>"#;
        assert_eq!(
            find_master_playlist(html),
            Some("https://s1.scdns.io/hls/abc/master.m3u8?t=1".into())
        );

        let html = r#"<script>jwplayer().setup({file:"https://s1.scdns.io/hls/abc/master.m3u8?t=1"});</script>"#;
        assert_eq!(
            find_master_playlist(html),
            Some("https://s1.scdns.io/hls/abc/master.m3u8?t=1".into())
        );
    }
}
