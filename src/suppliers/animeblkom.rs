use std::{collections::HashMap, sync::OnceLock};

use indexmap::IndexMap;
use log::warn;
use regex::Regex;

use crate::{
    extractors,
    models::{
        ContentDetails, ContentInfo, ContentMediaItem, ContentMediaItemSource, ContentType,
        ShowStatus,
    },
    utils::{
        self,
        html::{self, DOMProcessor},
        retry::{self, RetryPolicy},
        text,
    },
};

use super::ContentSupplier;

const URL: &str = "https://animeblkom.net";
const MIRRORS: &[&str] = &["https://blkom.com"];
const ANIMETITANS_URL: &str = "https://animetitans.net/";

#[derive(Default)]
pub struct AnimeBlkomContentSupplier;

impl ContentSupplier for AnimeBlkomContentSupplier {
    fn get_channels(&self) -> Vec<String> {
        super::channel_names(get_channels_map())
    }

    fn get_default_channels(&self) -> Vec<String> {
        vec!["Most rated".into()]
    }

    fn get_supported_types(&self) -> Vec<ContentType> {
        vec![ContentType::Anime, ContentType::AnimeMovie, ContentType::Ova]
    }

    fn get_supported_languages(&self) -> Vec<String> {
        vec!["ar".into()]
    }

    async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = url::Url::parse_with_params(&format!("{URL}/search"), &[("query", &query)])?;
        let html = load_page(url.as_str()).await?;

        Ok(super::dedup_content_infos(utils::process_html(
            &html,
            search_items_processor(),
        )))
    }

    async fn load_channel(
        &self,
        channel: String,
        page: u16,
    ) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = super::get_channel_url(get_channels_map(), &channel, page)?;
        let html = load_page(&url).await?;

        Ok(utils::process_html(&html, content_info_items_processor()))
    }

    async fn get_content_details(
        &self,
        id: String,
    ) -> Result<Option<ContentDetails>, anyhow::Error> {
        let html = load_page(&text::format_id_to_url(URL, &id)).await?;

        Ok(Some(parse_content_details(&html, &id)))
    }

    async fn load_media_items(
        &self,
        id: String,
        _params: Vec<String>,
    ) -> Result<Vec<ContentMediaItem>, anyhow::Error> {
        let html = load_page(&text::format_id_to_url(URL, &id)).await?;

        Ok(parse_content_details(&html, &id)
            .media_items
            .unwrap_or_default())
    }

    async fn load_media_item_sources(
        &self,
        id: String,
        params: Vec<String>,
    ) -> Result<Vec<ContentMediaItemSource>, anyhow::Error> {
        let page_url = text::format_id_to_url(URL, &super::source_page_id(&id, &params));
        let html = load_page(&page_url).await?;

        let servers = parse_servers(&html);
        let mut results = parse_downloads(&html);

        let sources_futures = servers
            .iter()
            .map(|server| load_server_sources(server, &page_url));

        let mut sources: Vec<_> = futures::future::join_all(sources_futures)
            .await
            .into_iter()
            .flatten()
            .collect();

        sources.append(&mut results);
        Ok(sources)
    }
}

fn retry_policy() -> RetryPolicy {
    RetryPolicy::default().with_mirrors(URL, MIRRORS)
}

async fn load_page(url: &str) -> anyhow::Result<String> {
    retry::fetch_html(url, Some(URL), &retry_policy()).await
}

#[derive(Debug, Clone, PartialEq)]
struct Server {
    name: String,
    url: String,
}

async fn load_server_sources(server: &Server, referer: &str) -> Vec<ContentMediaItemSource> {
    let result = if server.url.starts_with(ANIMETITANS_URL) {
        load_animetitans(server, referer).await
    } else if server.name == "Blkom" {
        load_blkom_player(server, referer).await
    } else if server.name.contains("Google") {
        let url = format!("http://gdriveplayer.to/embed2.php?link={}", server.url);
        Ok(extractors::load_extractor(&url, referer, &server.name).await)
    } else {
        Ok(extractors::load_extractor(&server.url, referer, &server.name).await)
    };

    result.unwrap_or_else(|err| {
        warn!("[animeblkom] server {} failed: {err}", server.name);
        vec![]
    })
}

async fn load_animetitans(
    server: &Server,
    referer: &str,
) -> anyhow::Result<Vec<ContentMediaItemSource>> {
    let html = retry::fetch_html(&server.url, Some(referer), &retry_policy()).await?;

    let link = find_animetitans_source(&html)
        .ok_or_else(|| anyhow::anyhow!("[animeblkom] no animetitans source in {}", server.url))?;

    Ok(vec![ContentMediaItemSource::Video {
        link,
        description: format!("Animetitans {}", server.name),
        quality: None,
        headers: Some(HashMap::from([("Referer".into(), server.url.clone())])),
    }])
}

async fn load_blkom_player(
    server: &Server,
    referer: &str,
) -> anyhow::Result<Vec<ContentMediaItemSource>> {
    let html = retry::fetch_html(&server.url, Some(referer), &retry_policy()).await?;

    Ok(super::parse_source_tags(&html)
        .into_iter()
        .map(|(link, quality)| {
            let description = match quality {
                Some(q) => format!("Blkom {q}p"),
                None => "Blkom".to_owned(),
            };
            extractors::direct_link(&link, URL, &description, quality)
        })
        .collect())
}

fn find_animetitans_source(page: &str) -> Option<String> {
    static SCRIPT_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static SOURCE_RE: OnceLock<Regex> = OnceLock::new();
    let source_re =
        SOURCE_RE.get_or_init(|| Regex::new(r#"source:\s*"(?<src>[^"]+)""#).unwrap());

    let document = scraper::Html::parse_document(page);
    let source = document
        .select(html::selector(&SCRIPT_SELECTOR, "script"))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find_map(|script| {
            let code = script.text().collect::<String>();
            source_re
                .captures(&code)
                .and_then(|c| Some(c.name("src")?.as_str().to_owned()))
        });

    source
}

fn parse_servers(page: &str) -> Vec<Server> {
    static SERVER_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);
    let servers = document
        .select(html::selector(&SERVER_SELECTOR, "div.item a[data-src]"))
        .filter_map(|el| {
            let url = text::to_full_url(el.attr("data-src")?.trim());
            if url.is_empty() {
                return None;
            }

            Some(Server {
                name: html::element_text(&el),
                url,
            })
        })
        .collect();

    servers
}

fn parse_downloads(page: &str) -> Vec<ContentMediaItemSource> {
    static DOWNLOAD_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static SMALL_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);
    let downloads = document
        .select(html::selector(&DOWNLOAD_SELECTOR, ".panel .panel-body a"))
        .filter_map(|el| {
            let href = el.attr("href")?.trim();
            if href.is_empty() {
                return None;
            }

            let small = el
                .select(html::selector(&SMALL_SELECTOR, "small"))
                .next()
                .map(|s| html::element_text(&s))
                .unwrap_or_default();
            let title = el.attr("title").unwrap_or_default();
            let description =
                text::sanitize_text(&format!("{title} {small} Download Source"));

            Some(extractors::direct_link(
                href,
                URL,
                &description,
                text::get_int_from_text(&small),
            ))
        })
        .collect();

    downloads
}

fn parse_content_details(page: &str, id: &str) -> ContentDetails {
    let mut details = utils::process_html(page, content_details_processor());

    let has_episodes = details
        .media_items
        .as_ref()
        .is_some_and(|items| !items.is_empty());

    if !has_episodes {
        details.media_items = Some(vec![super::movie_media_item("Watch", id)]);
    }

    details
}

fn card_type(kind: &str) -> ContentType {
    let kind = kind.to_lowercase();
    if kind.contains("فيلم") || kind.contains("خاصة") || kind.contains("movie") {
        ContentType::AnimeMovie
    } else if ["أوفا", "أونا", "ova", "ona"].iter().any(|k| kind.contains(k)) {
        ContentType::Ova
    } else {
        ContentType::Anime
    }
}

fn details_type(kind: &str) -> ContentType {
    let kind = kind.to_lowercase();
    if kind.contains("movie") {
        ContentType::AnimeMovie
    } else if kind.contains("ova") || kind.contains("ona") {
        ContentType::Ova
    } else {
        ContentType::Anime
    }
}

fn content_info_processor() -> Box<dyn DOMProcessor<ContentInfo>> {
    html::ContentInfoProcessor {
        id: html::AttrValue::new("href")
            .map(|href| text::extract_id_from_url(&href))
            .in_scope("div.poster a")
            .unwrap_or_default()
            .into(),
        title: html::text_value("div.name a"),
        secondary_title: html::optional_text_value(r#"div[title="عدد الحلقات"]"#),
        image: html::self_hosted_image(URL, "div.poster img", "data-original"),
        content_type: html::TextValue::new()
            .all_nodes()
            .in_scope(r#"div[title="النوع"]"#)
            .unwrap_or_default()
            .map(|kind| card_type(&kind))
            .into(),
        year: html::TextValue::new()
            .all_nodes()
            .in_scope(r#"div[title="سنة الانتاج"]"#)
            .map(|opt| opt.and_then(|s| text::extract_year(&s)))
            .into(),
    }
    .into()
}

fn content_info_items_processor() -> &'static html::FilterProcessor<ContentInfo> {
    static CONTENT_INFO_ITEMS_PROCESSOR: OnceLock<html::FilterProcessor<ContentInfo>> =
        OnceLock::new();
    CONTENT_INFO_ITEMS_PROCESSOR.get_or_init(|| {
        html::ItemsProcessor::new("div.content-inner", content_info_processor())
            .filter(|item| !item.id.is_empty())
    })
}

fn search_items_processor() -> &'static html::FilterProcessor<ContentInfo> {
    static SEARCH_ITEMS_PROCESSOR: OnceLock<html::FilterProcessor<ContentInfo>> =
        OnceLock::new();
    SEARCH_ITEMS_PROCESSOR.get_or_init(|| {
        html::ItemsProcessor::new("div.contents.text-center .content", content_info_processor())
            .filter(|item| !item.id.is_empty())
    })
}

fn episode_processor() -> Box<dyn DOMProcessor<ContentMediaItem>> {
    static NUMBER_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    html::ExtractValue::new(|el| {
        let number = el
            .select(html::selector(&NUMBER_SELECTOR, "span:not(.pull-left)"))
            .last()
            .and_then(|span| text::get_int_from_text(&html::element_text(&span)))
            .unwrap_or_default();

        ContentMediaItem {
            number,
            title: text::sanitize_text(&html::element_text(el).replace(':', " ")),
            params: vec![text::extract_id_from_url(el.attr("href").unwrap_or_default())],
            ..Default::default()
        }
    })
    .into()
}

fn content_details_processor() -> &'static html::ContentDetailsProcessor {
    static CONTENT_DETAILS_PROCESSOR: OnceLock<html::ContentDetailsProcessor> = OnceLock::new();
    CONTENT_DETAILS_PROCESSOR.get_or_init(|| {
        html::ContentDetailsProcessor {
            title: html::TextValue::new()
                .all_nodes()
                .in_scope("span h1")
                .unwrap_or_default()
                .map(|title| match title.split_once('(') {
                    Some((title, _)) => title.trim().to_owned(),
                    None => title,
                })
                .into(),
            original_title: html::TextValue::new()
                .all_nodes()
                .in_scope(r#"span[title="الاسم باليابانية"]"#)
                .map(|opt| {
                    opt.map(|name| match name.rsplit_once(':') {
                        Some((_, name)) => name.trim().to_owned(),
                        None => name,
                    })
                    .filter(|name| !name.is_empty())
                })
                .into(),
            image: html::self_hosted_image(URL, "div.poster img", "data-original"),
            description: html::text_value(".story p"),
            content_type: html::TextValue::new()
                .all_nodes()
                .in_scope("h1 small")
                .unwrap_or_default()
                .map(|kind| details_type(&kind))
                .into(),
            year: html::ScopeProcessor::new(".info-table div", html::text_value("span.info"))
                .containing("تاريخ الانتاج")
                .map(|opt| opt.and_then(|date| date.split('-').next()?.trim().parse::<u32>().ok()))
                .into(),
            duration: html::default_value(),
            status: html::TextValue::new()
                .all_nodes()
                .in_scope(".info-table div")
                .containing("حالة الأنمي")
                .map_optional(|status| {
                    if status.contains("مستمر") {
                        ShowStatus::Ongoing
                    } else {
                        ShowStatus::Completed
                    }
                })
                .into(),
            mal_id: html::AttrValue::new("href")
                .in_scope("a.blue.cta")
                .containing("المزيد من المعلومات")
                .map(|opt| opt.and_then(|href| text::mal_id_from_url(&href)))
                .into(),
            tags: html::texts_value("p.genres a"),
            additional_info: html::texts_value(".info-table div"),
            similar: html::default_value(),
            media_items: html::ItemsProcessor::new(".episode-link a", episode_processor())
                .map(|items| Some(super::dedup_media_items(items)))
                .into(),
            params: html::default_value(),
        }
    })
}

fn get_channels_map() -> &'static IndexMap<&'static str, String> {
    static CHANNELS_MAP: OnceLock<IndexMap<&'static str, String>> = OnceLock::new();
    CHANNELS_MAP.get_or_init(|| {
        IndexMap::from([
            ("Most rated", format!("{URL}/anime-list?sort_by=rate&page=")),
            (
                "Recently added",
                format!("{URL}/anime-list?sort_by=created_at&page="),
            ),
            ("Completed", format!("{URL}/anime-list?states=finished&page=")),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_keep_animetitans_host_on_retry() {
        let policy = retry_policy();
        let embed = "https://animetitans.net/embed/abc";

        assert_eq!(
            retry::candidate_urls(embed, policy.origin, policy.mirrors),
            vec![embed.to_owned()]
        );
    }

    const LISTING: &str = r#"
        <div class="contents">
            <div class="content-inner">
                <div class="poster"><a href="https://animeblkom.net/anime/one-piece"><img data-original="/uploads/one-piece.jpg"></a></div>
                <div class="name"><a>One Piece</a></div>
                <div title="سنة الانتاج">1999</div>
                <div title="عدد الحلقات">1100</div>
                <div title="النوع">مسلسل</div>
            </div>
            <div class="content-inner">
                <div class="poster"><a href="https://animeblkom.net/anime/suzume"><img data-original="/uploads/suzume.jpg"></a></div>
                <div class="name"><a>Suzume no Tojimari</a></div>
                <div title="سنة الانتاج">2022</div>
                <div title="النوع">فيلم</div>
            </div>
            <div class="content-inner">
                <div class="name"><a>Broken card</a></div>
            </div>
        </div>
    "#;

    const DETAILS: &str = r#"
        <html><body>
            <span><h1>Frieren (Sousou no Frieren) <small>TV</small></h1></span>
            <span title="الاسم باليابانية">الاسم باليابانية: 葬送のフリーレン</span>
            <div class="poster"><img data-original="/uploads/frieren.jpg"></div>
            <div class="story"><p>A mage outlives her party.</p></div>
            <p class="genres"><a>مغامرات</a><a>خيال</a></p>
            <div class="info-table">
                <div><span class="head">تاريخ الانتاج:</span><span class="info">2023-09-29</span></div>
                <div><span class="head">حالة الأنمي:</span><span class="info">مستمر</span></div>
            </div>
            <a class="blue cta" href="https://myanimelist.net/anime/52991/Sousou_no_Frieren">المزيد من المعلومات</a>
            <div class="episode-link"><a href="https://animeblkom.net/watch/frieren/1"><span class="pull-left">24 دقيقة</span><span>الحلقة : 1</span></a></div>
            <div class="episode-link"><a href="https://animeblkom.net/watch/frieren/2"><span class="pull-left">24 دقيقة</span><span>الحلقة : 2</span></a></div>
            <div class="episode-link"><a href="https://animeblkom.net/watch/frieren/2"><span>الحلقة : 2</span></a></div>
        </body></html>
    "#;

    const WATCH: &str = r#"
        <html><body>
            <div class="item"><a data-src="https://animetitans.net/embed/abc">Titans</a></div>
            <div class="item"><a data-src="//www.mp4upload.com/embed-h5x14yaphmdk.html">mp4upload</a></div>
            <div class="item"><a data-src="">Empty</a></div>
            <div class="panel"><div class="panel-body">
                <a href="https://dl.blkom.com/frieren-1-720.mp4" title="تحميل"><small>720p</small></a>
            </div></div>
        </body></html>
    "#;

    #[test]
    fn should_parse_listing_cards() {
        let items = utils::process_html(LISTING, content_info_items_processor());

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            ContentInfo {
                id: "anime/one-piece".into(),
                title: "One Piece".into(),
                secondary_title: Some("1100".into()),
                image: "https://animeblkom.net/uploads/one-piece.jpg".into(),
                content_type: ContentType::Anime,
                year: Some(1999),
            }
        );
        assert_eq!(items[1].content_type, ContentType::AnimeMovie);
        assert_eq!(items[1].secondary_title, None);
    }

    #[test]
    fn should_parse_details() {
        let details = parse_content_details(DETAILS, "anime/frieren");

        assert_eq!(details.title, "Frieren");
        assert_eq!(details.original_title, Some("葬送のフリーレン".into()));
        assert_eq!(details.image, "https://animeblkom.net/uploads/frieren.jpg");
        assert_eq!(details.description, "A mage outlives her party.");
        assert_eq!(details.year, Some(2023));
        assert_eq!(details.status, Some(ShowStatus::Ongoing));
        assert_eq!(details.mal_id, Some(52991));
        assert_eq!(details.content_type, ContentType::Anime);
        assert_eq!(details.tags, vec!["مغامرات".to_owned(), "خيال".to_owned()]);

        let items = details.media_items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].number, 2);
        assert_eq!(items[1].params, vec!["watch/frieren/2".to_owned()]);
        assert!(!items[0].title.contains(':'));
    }

    #[test]
    fn should_fall_back_to_single_watch_item() {
        let details = parse_content_details("<html><body><span><h1>Movie</h1></span></body></html>", "anime/movie");

        assert_eq!(
            details.media_items,
            Some(vec![ContentMediaItem {
                number: 1,
                title: "Watch".into(),
                params: vec!["anime/movie".into()],
                ..Default::default()
            }])
        );
        assert_eq!(details.status, None);
    }

    #[test]
    fn should_parse_servers_and_downloads() {
        let servers = parse_servers(WATCH);
        assert_eq!(
            servers,
            vec![
                Server {
                    name: "Titans".into(),
                    url: "https://animetitans.net/embed/abc".into()
                },
                Server {
                    name: "mp4upload".into(),
                    url: "https://www.mp4upload.com/embed-h5x14yaphmdk.html".into()
                },
            ]
        );

        let downloads = parse_downloads(WATCH);
        assert_eq!(downloads.len(), 1);
        assert!(matches!(
            &downloads[0],
            ContentMediaItemSource::Video { description, quality: Some(720), .. }
                if description == "تحميل 720p Download Source"
        ));
    }

    #[test]
    fn should_find_animetitans_source_in_last_script() {
        let html = r#"<script>var a = 1;</script><script>var player = new Playerjs({ source: "https://cdn.animetitans.net/hls/ep1.m3u8" });</script>"#;

        assert_eq!(
            find_animetitans_source(html),
            Some("https://cdn.animetitans.net/hls/ep1.m3u8".into())
        );
    }

    #[test]
    fn should_map_card_types() {
        assert_eq!(card_type("خاصة"), ContentType::AnimeMovie);
        assert_eq!(card_type("أونا"), ContentType::Ova);
        assert_eq!(card_type("TV"), ContentType::Anime);
    }

    #[test]
    fn should_build_channel_urls() {
        assert_eq!(
            super::super::get_channel_url(get_channels_map(), "Completed", 2).unwrap(),
            "https://animeblkom.net/anime-list?states=finished&page=2"
        );
        assert!(super::super::get_channel_url(get_channels_map(), "Unknown", 1).is_err());
    }
}
