use anyhow::anyhow;
use regex::Regex;
use std::{collections::HashMap, sync::OnceLock};

use crate::{
    models::ContentMediaItemSource,
    utils::{self, unpack::packerjs},
};

pub async fn extract(
    url: &str,
    referer: &str,
    prefix: &str,
) -> anyhow::Result<Vec<ContentMediaItemSource>> {
    let host = utils::text::origin_of(url)
        .ok_or_else(|| anyhow!("[streamwish] invalid url: {url}"))?;

    let html = utils::create_client()
        .get(url)
        .header("Referer", referer)
        .send()
        .await?
        .text()
        .await?;

    let script = packerjs::unpack_all(&html)
        .into_iter()
        .find(|script| script.contains("sources"))
        // some mirrors serve the player config unpacked
        .unwrap_or(html);

    let sources = parse_player_config(&script, &host, prefix);
    if sources.is_empty() {
        return Err(anyhow!("[streamwish] no sources found in {url}"));
    }

    Ok(sources)
}

/// Reads `hlsN`/`file` entries and caption tracks of a JW player setup.
fn parse_player_config(script: &str, host: &str, prefix: &str) -> Vec<ContentMediaItemSource> {
    static HLS_PROPERTY_RE: OnceLock<Regex> = OnceLock::new();
    static FILE_PROPERTY_RE: OnceLock<Regex> = OnceLock::new();
    static TRACK_RE: OnceLock<Regex> = OnceLock::new();

    let headers = Some(HashMap::from([("Referer".to_owned(), format!("{host}/"))]));
    let absolute = |file: &str| {
        if file.starts_with('/') {
            format!("{host}{file}")
        } else {
            file.to_owned()
        }
    };

    let mut results: Vec<ContentMediaItemSource> = HLS_PROPERTY_RE
        .get_or_init(|| Regex::new(r#""hls(\d+)":\s?['"]([^"']+)['"]"#).unwrap())
        .captures_iter(script)
        .filter_map(|m| Some((m.get(1)?.as_str(), m.get(2)?.as_str())))
        .map(|(idx, file)| ContentMediaItemSource::Video {
            link: absolute(file),
            description: format!("{prefix} hls{idx}"),
            quality: None,
            headers: headers.clone(),
        })
        .collect();

    if results.is_empty() {
        results.extend(
            FILE_PROPERTY_RE
                .get_or_init(|| {
                    Regex::new(r#"sources:\s*\[\{\s*file:\s*"(?<file>[^"]+)""#).unwrap()
                })
                .captures_iter(script)
                .filter_map(|m| Some(m.name("file")?.as_str()))
                .map(|file| ContentMediaItemSource::Video {
                    link: absolute(file),
                    description: prefix.to_owned(),
                    quality: None,
                    headers: headers.clone(),
                }),
        );
    }

    results.extend(
        TRACK_RE
            .get_or_init(|| {
                Regex::new(
                    r#"\{\s*file:\s*"(?<file>[^"]+)",\s*label:\s*"(?<label>[^"]+)",\s*kind:\s*"captions""#,
                )
                .unwrap()
            })
            .captures_iter(script)
            .filter_map(|m| Some((m.name("file")?.as_str(), m.name("label")?.as_str())))
            .map(|(file, label)| ContentMediaItemSource::Subtitle {
                link: absolute(file),
                description: format!("{prefix} {label}"),
                headers: None,
            }),
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_hls_entries_and_captions() {
        let script = r#"var links={"hls2":"https://srv.example.com/hls2/01/master.m3u8?t=1","hls4":"/stream/abc/master.m3u8"};jwplayer("vplayer").setup({sources:[{file:links.hls4||links.hls2}],tracks:[{file:"https://srv.example.com/sub/ar.vtt",label:"Arabic",kind:"captions"}]});"#;

        let sources = parse_player_config(script, "https://hgplaycdn.com", "StreamWish");

        assert_eq!(sources.len(), 3);
        assert_eq!(
            sources[1].link(),
            "https://hgplaycdn.com/stream/abc/master.m3u8"
        );
        assert!(matches!(
            &sources[2],
            ContentMediaItemSource::Subtitle { description, .. } if description == "StreamWish Arabic"
        ));
    }

    #[test]
    fn should_fall_back_to_file_property() {
        let script = r#"jwplayer("vplayer").setup({sources:[{file:"https://srv.example.com/v/master.m3u8"}],image:"x.jpg"});"#;

        let sources = parse_player_config(script, "https://filelions.to", "FileLions");

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].link(), "https://srv.example.com/v/master.m3u8");
    }
}
