use anyhow::anyhow;
use regex::Regex;
use std::{collections::HashMap, sync::OnceLock};

use crate::{
    models::ContentMediaItemSource,
    utils::{self, unpack::packerjs},
};

pub async fn extract(url: &str, prefix: &str) -> anyhow::Result<Vec<ContentMediaItemSource>> {
    let iframe_url = url.replace("/f/", "/e/");

    let iframe = utils::create_client()
        .get(&iframe_url)
        .send()
        .await?
        .text()
        .await?;

    let file = find_file(&iframe).ok_or_else(|| anyhow!("[mixdrop] file property not found"))?;

    Ok(vec![ContentMediaItemSource::Video {
        link: file,
        description: prefix.into(),
        quality: None,
        headers: Some(HashMap::from([
            ("User-Agent".into(), utils::get_user_agent().to_string()),
            ("Referer".into(), iframe_url),
        ])),
    }])
}

fn find_file(html: &str) -> Option<String> {
    static FILE_PROPERTY_RE: OnceLock<Regex> = OnceLock::new();
    let file_re = FILE_PROPERTY_RE
        .get_or_init(|| Regex::new(r#"MDCore.wurl\s*=\s*"(?<file>[^"]+)""#).unwrap());

    let file = packerjs::unpack_all(html).into_iter().find_map(|script| {
        file_re
            .captures(&script)
            .and_then(|m| Some(m.name("file")?.as_str().to_owned()))
    })?;

    if file.starts_with("//") {
        Some(format!("https:{file}"))
    } else {
        Some(file)
    }
}
