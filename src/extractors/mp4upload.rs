use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;

use crate::{models::ContentMediaItemSource, utils};

pub async fn extract(
    url: &str,
    referer: &str,
    prefix: &str,
) -> anyhow::Result<Vec<ContentMediaItemSource>> {
    let html = utils::create_client()
        .get(url)
        .header("Referer", referer)
        .send()
        .await?
        .text()
        .await?;

    let file = find_source(&html)
        .ok_or_else(|| anyhow::anyhow!("[mp4upload] no src found in page"))?;

    Ok(vec![ContentMediaItemSource::Video {
        link: file.into(),
        description: prefix.into(),
        quality: None,
        headers: Some(HashMap::from([("Referer".into(), url.into())])),
    }])
}

fn find_source(html: &str) -> Option<&str> {
    static SRC_REGEXP: OnceLock<Regex> = OnceLock::new();
    SRC_REGEXP
        .get_or_init(|| Regex::new(r#"src:?\s+"(?<src>.*?(mp4|m3u8))""#).unwrap())
        .captures(html)
        .and_then(|m| Some(m.name("src")?.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_find_player_source() {
        let html = r#"<script>player.src({ type: "video/mp4", src: "https://a4.mp4upload.com:183/d/xkx3z/video.mp4"});</script>"#;

        assert_eq!(
            find_source(html),
            Some("https://a4.mp4upload.com:183/d/xkx3z/video.mp4")
        );
        assert_eq!(find_source("<html></html>"), None);
    }
}
