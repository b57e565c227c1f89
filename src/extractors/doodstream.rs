use std::{collections::HashMap, sync::OnceLock};

use anyhow::anyhow;
use rand::{distr::Alphanumeric, Rng};
use regex::Regex;

use crate::{models::ContentMediaItemSource, utils};

const DOOD_URL: &str = "https://dood.li";

pub async fn extract(url: &str, prefix: &str) -> anyhow::Result<Vec<ContentMediaItemSource>> {
    let (_, id) = url
        .trim_end_matches('/')
        .rsplit_once('/')
        .ok_or_else(|| anyhow!("[doodstream] no id found in url {url}"))?;

    let iframe_url = format!("{DOOD_URL}/e/{id}");

    let iframe_res = utils::create_client()
        .get(&iframe_url)
        .send()
        .await?
        .text()
        .await?;

    let md5_pass = find_md5_pass(&iframe_res)
        .ok_or_else(|| anyhow!("[doodstream] pass_md5 not found"))?;

    let media_link_part = utils::create_client()
        .get(format!("{DOOD_URL}/pass_md5/{md5_pass}"))
        .header("Referer", &iframe_url)
        .send()
        .await?
        .text()
        .await?;

    Ok(vec![ContentMediaItemSource::Video {
        link: media_link(&media_link_part, md5_pass, &random_suffix()),
        description: prefix.into(),
        quality: None,
        headers: Some(HashMap::from([("Referer".into(), iframe_url)])),
    }])
}

fn find_md5_pass(html: &str) -> Option<&str> {
    static MD5_PASS_RE: OnceLock<Regex> = OnceLock::new();
    MD5_PASS_RE
        .get_or_init(|| Regex::new(r"/pass_md5/(?<pass>[^']*)").unwrap())
        .captures(html)
        .and_then(|caps| Some(caps.name("pass")?.as_str()))
}

fn media_link(link_part: &str, md5_pass: &str, suffix: &str) -> String {
    let token = md5_pass.rsplit('/').next().unwrap_or(md5_pass);
    format!("{}{suffix}?token={token}", link_part.trim())
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_media_link() {
        let html = r#"<script>$.get('/pass_md5/61742-85-12-1719237312-abc/xyz123', function(data){});</script>"#;
        let pass = find_md5_pass(html).unwrap();

        assert_eq!(pass, "61742-85-12-1719237312-abc/xyz123");
        assert_eq!(
            media_link("https://cdn.dood.video/xyz\n", pass, "d96ZdcNq9N"),
            "https://cdn.dood.video/xyzd96ZdcNq9N?token=xyz123"
        );
    }

    #[test]
    fn should_generate_suffix() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 10);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
