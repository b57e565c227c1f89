use std::{collections::HashMap, sync::OnceLock};

use base64::{engine::general_purpose, Engine};
use indexmap::IndexMap;
use log::warn;
use regex::Regex;
use serde::Deserialize;

use crate::{
    extractors,
    models::{ContentDetails, ContentInfo, ContentMediaItem, ContentMediaItemSource, ContentType},
    utils::{
        self,
        html::{self, DOMProcessor},
        text,
    },
};

use super::ContentSupplier;

const HOME_CHANNEL: &str = "Home";
const MOSHAHDA_URL: &str = "https://moshahda.net";
const MOSHAHDA_QUALITIES: &[(&str, &str, u32)] = &[
    ("Original", "download_o", 1080),
    ("720", "download_x", 720),
    ("480", "download_h", 480),
    ("360", "download_n", 360),
    ("240", "download_l", 240),
];

/// Sites built on the same anime theme, only the domain differs.
struct Anime4upSite {
    name: &'static str,
    url: &'static str,
}

static ANIME4UP: Anime4upSite = Anime4upSite {
    name: "Anime4up",
    url: "https://witaanime.com",
};

static WITANIME: Anime4upSite = Anime4upSite {
    name: "WitAnime",
    url: "https://witanime.you",
};

macro_rules! anime4up_supplier {
    ($supplier:ident, $site:expr) => {
        #[derive(Default)]
        pub struct $supplier;

        impl ContentSupplier for $supplier {
            fn get_channels(&self) -> Vec<String> {
                vec![HOME_CHANNEL.into()]
            }

            fn get_default_channels(&self) -> Vec<String> {
                vec![HOME_CHANNEL.into()]
            }

            fn get_supported_types(&self) -> Vec<ContentType> {
                vec![
                    ContentType::Anime,
                    ContentType::AnimeMovie,
                    ContentType::Ova,
                    ContentType::Others,
                ]
            }

            fn get_supported_languages(&self) -> Vec<String> {
                vec!["ar".into()]
            }

            async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error> {
                $site.search(&query).await
            }

            async fn load_channel(
                &self,
                channel: String,
                page: u16,
            ) -> Result<Vec<ContentInfo>, anyhow::Error> {
                $site.load_channel(&channel, page).await
            }

            async fn get_content_details(
                &self,
                id: String,
            ) -> Result<Option<ContentDetails>, anyhow::Error> {
                $site.get_content_details(&id).await.map(Some)
            }

            async fn load_media_items(
                &self,
                id: String,
                _params: Vec<String>,
            ) -> Result<Vec<ContentMediaItem>, anyhow::Error> {
                let details = $site.get_content_details(&id).await?;
                Ok(details.media_items.unwrap_or_default())
            }

            async fn load_media_item_sources(
                &self,
                id: String,
                params: Vec<String>,
            ) -> Result<Vec<ContentMediaItemSource>, anyhow::Error> {
                $site
                    .load_media_item_sources(&super::source_page_id(&id, &params))
                    .await
            }
        }
    };
}

anime4up_supplier!(Anime4upContentSupplier, ANIME4UP);
anime4up_supplier!(WitAnimeContentSupplier, WITANIME);

impl Anime4upSite {
    async fn load_page(&self, url: &str) -> anyhow::Result<String> {
        utils::load_text(utils::create_client().get(url).header("Referer", self.url)).await
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<ContentInfo>> {
        let url = url::Url::parse_with_params(
            &format!("{}/", self.url),
            &[("search_param", "animes"), ("s", query)],
        )?;
        let html = self.load_page(url.as_str()).await?;

        Ok(parse_search_results(&html))
    }

    async fn load_channel(&self, channel: &str, page: u16) -> anyhow::Result<Vec<ContentInfo>> {
        if channel != HOME_CHANNEL {
            return Err(anyhow::anyhow!("[{}] unknown channel {channel}", self.name));
        }

        if page > 1 {
            return Ok(vec![]);
        }

        let html = self.load_page(&format!("{}/", self.url)).await?;
        Ok(parse_home_page(&html))
    }

    async fn get_content_details(&self, id: &str) -> anyhow::Result<ContentDetails> {
        let html = self.load_page(&text::format_id_to_url(self.url, id)).await?;
        Ok(parse_content_details(&html))
    }

    async fn load_media_item_sources(
        &self,
        page_id: &str,
    ) -> anyhow::Result<Vec<ContentMediaItemSource>> {
        let page_url = text::format_id_to_url(self.url, page_id);
        let html = self.load_page(&page_url).await?;
        let servers = parse_servers(&html);

        let mut results = moshahda_sources(self.name, servers.moshahda_id.as_deref());

        let sources_futures = servers
            .embeds
            .iter()
            .map(|(name, url)| extractors::load_extractor(url, &page_url, name));

        results.extend(
            futures::future::join_all(sources_futures)
                .await
                .into_iter()
                .flatten(),
        );

        Ok(results)
    }
}

#[derive(Debug, Default, Deserialize)]
struct WatchLinks {
    fhd: Option<IndexMap<String, String>>,
    hd: Option<IndexMap<String, String>>,
    sd: Option<IndexMap<String, String>>,
}

#[derive(Debug, Default, PartialEq)]
struct EpisodeServers {
    /// (description, embed url)
    embeds: Vec<(String, String)>,
    moshahda_id: Option<String>,
}

fn decode_base64(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let bytes = general_purpose::STANDARD
        .decode(value)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(value.trim_end_matches('=')))
        .ok()?;

    String::from_utf8(bytes).ok()
}

fn parse_servers(page: &str) -> EpisodeServers {
    static WL_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static MOSHAHDA_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static SERVER_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);
    let mut servers = EpisodeServers::default();

    let watch_links = document
        .select(html::selector(&WL_SELECTOR, r#"input[name="wl"]"#))
        .next()
        .and_then(|el| decode_base64(el.attr("value")?));

    if let Some(json) = watch_links {
        match serde_json::from_str::<WatchLinks>(&json) {
            Ok(links) => {
                for (label, map) in [("FHD", links.fhd), ("HD", links.hd), ("SD", links.sd)] {
                    for (server, url) in map.unwrap_or_default() {
                        servers.embeds.push((format!("{server} {label}"), url));
                    }
                }
            }
            Err(err) => warn!("[anime4up] invalid watch links: {err}"),
        }
    }

    servers.moshahda_id = document
        .select(html::selector(&MOSHAHDA_SELECTOR, r#"input[name="moshahda"]"#))
        .next()
        .and_then(|el| decode_base64(el.attr("value")?));

    servers.embeds.extend(
        document
            .select(html::selector(
                &SERVER_SELECTOR,
                "ul#episode-servers li a[data-ep-url]",
            ))
            .filter_map(|el| {
                let url = el.attr("data-ep-url")?.trim();
                if url.is_empty() {
                    return None;
                }
                Some((html::element_text(&el), text::to_full_url(url)))
            }),
    );

    servers
}

fn moshahda_sources(name: &str, moshahda_id: Option<&str>) -> Vec<ContentMediaItemSource> {
    let id = match moshahda_id {
        Some(id) if !id.is_empty() => id,
        _ => return vec![],
    };

    MOSHAHDA_QUALITIES
        .iter()
        .map(|&(label, code, quality)| ContentMediaItemSource::Video {
            link: format!("{MOSHAHDA_URL}/{id}.html?{code}"),
            description: format!("{name} Moshahda {label}"),
            quality: Some(quality),
            headers: Some(HashMap::from([(
                "Referer".to_owned(),
                MOSHAHDA_URL.to_owned(),
            )])),
        })
        .collect()
}

fn card_type(kind: &str) -> ContentType {
    if kind.contains("TV") || kind.contains("Special") {
        ContentType::Anime
    } else if kind.contains("OVA") || kind.contains("ONA") {
        ContentType::Ova
    } else if kind.contains("Movie") {
        ContentType::AnimeMovie
    } else {
        ContentType::Others
    }
}

/// Episode links are turned into the link of their anime.
fn card_id(href: String) -> String {
    static EPISODE_SUFFIX_RE: OnceLock<Regex> = OnceLock::new();
    let href = EPISODE_SUFFIX_RE
        .get_or_init(|| Regex::new(r"(?i)-%d8%a7%d9%84%d8%ad%d9%84%d9%82%d8%a9-.*").unwrap())
        .replace(&href, "")
        .replace("episode", "anime");

    text::extract_id_from_url(&href)
}

fn content_info_processor() -> Box<dyn DOMProcessor<ContentInfo>> {
    html::ContentInfoProcessor {
        id: html::AttrValue::new("href")
            .map(card_id)
            .in_scope("div.hover > a")
            .unwrap_or_default()
            .into(),
        title: html::attr_value("div.hover > img", "alt"),
        secondary_title: html::default_value(),
        image: html::attr_value("div.hover > img", "src"),
        content_type: html::TextValue::new()
            .all_nodes()
            .in_scope("div.anime-card-type > a")
            .unwrap_or_default()
            .map(|kind| card_type(&kind))
            .into(),
        year: html::default_value(),
    }
    .into()
}

fn cards_processor(scope: &str) -> html::ItemsProcessor<ContentInfo> {
    html::ItemsProcessor::new(scope, content_info_processor())
}

fn parse_home_page(page: &str) -> Vec<ContentInfo> {
    static HOME_PROCESSOR: OnceLock<html::FlattenProcessor<ContentInfo>> = OnceLock::new();
    static FALLBACK_PROCESSOR: OnceLock<html::ItemsProcessor<ContentInfo>> = OnceLock::new();

    let home = HOME_PROCESSOR.get_or_init(|| {
        html::FlattenProcessor::default()
            .add_processor(
                html::ScopeProcessor::new(
                    "section.home-slider, .featured-animes, .slider-section",
                    cards_processor("div.anime-card, .slide-item, .featured-item").into(),
                )
                .unwrap_or_default()
                .into(),
            )
            .add_processor(
                html::ItemsProcessor::new(
                    "section, .section, .home-section, .content-section",
                    html::ExtractValue::new(|section| {
                        static TITLE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
                        static CARDS: OnceLock<html::ItemsProcessor<ContentInfo>> =
                            OnceLock::new();

                        let titled = section
                            .select(html::selector(
                                &TITLE_SELECTOR,
                                "h2, h3, .section-title, .title",
                            ))
                            .next()
                            .is_some();

                        if !titled {
                            return vec![];
                        }

                        CARDS
                            .get_or_init(|| {
                                cards_processor("div.anime-card, div.card, .anime-item, .item")
                            })
                            .process(section)
                    })
                    .into(),
                )
                .map(|sections: Vec<Vec<ContentInfo>>| sections.concat())
                .into(),
            )
    });

    let mut items = super::dedup_content_infos(utils::process_html(page, home));

    if items.is_empty() {
        let fallback = FALLBACK_PROCESSOR
            .get_or_init(|| cards_processor("div.anime-card, div.card, .anime-item, .item"));
        items = super::dedup_content_infos(utils::process_html(page, fallback));
    }

    items
}

fn parse_search_results(page: &str) -> Vec<ContentInfo> {
    static SEARCH_PROCESSOR: OnceLock<html::ItemsProcessor<ContentInfo>> = OnceLock::new();
    static FALLBACK_PROCESSOR: OnceLock<html::ItemsProcessor<ContentInfo>> = OnceLock::new();

    let items = utils::process_html(
        page,
        SEARCH_PROCESSOR.get_or_init(|| cards_processor("div.row.display-flex > div")),
    );
    let items = super::dedup_content_infos(items);
    if !items.is_empty() {
        return items;
    }

    super::dedup_content_infos(utils::process_html(
        page,
        FALLBACK_PROCESSOR.get_or_init(|| {
            cards_processor("div.anime-card, div.search-result, .result-item, .anime-item")
        }),
    ))
}

fn title_from_document_title(title: String) -> String {
    match title.rsplit_once('-') {
        Some((title, _)) => title.trim().to_owned(),
        None => title,
    }
}

fn episode_processor() -> Box<dyn DOMProcessor<Option<ContentMediaItem>>> {
    static LINK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static IMAGE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    html::ExtractValue::new(|el| {
        let link = el
            .select(html::selector(
                &LINK_SELECTOR,
                "h3 a, .episode-title a, a.episode-link",
            ))
            .next()?;
        let href = link.attr("href")?.trim();
        if href.is_empty() {
            return None;
        }

        let image = el
            .select(html::selector(
                &IMAGE_SELECTOR,
                ".hover img, .episode-thumb img, img",
            ))
            .next()
            .and_then(|img| img.attr("src"))
            .map(|src| src.to_owned());

        let title = html::element_text(&link);
        Some(ContentMediaItem {
            number: text::get_int_from_text(&title).unwrap_or_default(),
            title,
            image,
            params: vec![text::extract_id_from_url(href)],
            ..Default::default()
        })
    })
    .into()
}

fn fallback_episode_processor() -> Box<dyn DOMProcessor<Option<ContentMediaItem>>> {
    html::ExtractValue::new(|el| {
        let href = el.attr("href")?.trim();
        if href.is_empty() {
            return None;
        }

        let title = html::element_text(el);
        Some(ContentMediaItem {
            number: text::get_int_from_text(&title).unwrap_or_default(),
            title,
            params: vec![text::extract_id_from_url(href)],
            ..Default::default()
        })
    })
    .into()
}

fn content_details_processor() -> &'static html::ContentDetailsProcessor {
    static CONTENT_DETAILS_PROCESSOR: OnceLock<html::ContentDetailsProcessor> = OnceLock::new();
    CONTENT_DETAILS_PROCESSOR.get_or_init(|| html::ContentDetailsProcessor {
        title: html::FallbackProcessor::new(|s: &String| !s.is_empty())
            .or(html::text_value("h1.anime-details-title, h1.title, .anime-title"))
            .or(html::TextValue::new()
                .all_nodes()
                .in_scope("title")
                .unwrap_or_default()
                .map(title_from_document_title)
                .into())
            .into(),
        original_title: html::default_value(),
        image: html::fallback_attr(&[
            ("div.anime-thumbnail img, .anime-poster img, .thumbnail img", "src"),
            ("img[src*=poster], img[src*=thumb]", "src"),
        ]),
        description: html::text_value("p.anime-story, .anime-description, .story, .plot"),
        content_type: html::FallbackProcessor::new(|s: &String| !s.is_empty())
            .or(html::ScopeProcessor::new(".anime-info", html::text_value("a"))
                .containing("النوع")
                .unwrap_or_default()
                .into())
            .or(html::text_value(".anime-type a, .type a"))
            .map(|kind| card_type(&kind))
            .into(),
        year: html::FallbackProcessor::new(|year: &Option<u32>| year.is_some())
            .or(html::TextValue::new()
                .all_nodes()
                .in_scope(".anime-info")
                .containing("بداية العرض|Year")
                .map(|opt| opt.and_then(|s| text::extract_year(&s)))
                .into())
            .or(html::TextValue::new()
                .all_nodes()
                .in_scope(".year-info")
                .map(|opt| opt.and_then(|s| text::extract_year(&s)))
                .into())
            .into(),
        duration: html::default_value(),
        status: html::default_value(),
        mal_id: html::AttrValue::new("href")
            .in_scope("a.anime-mal, a[href*=myanimelist], a[href*=mal]")
            .map(|opt| opt.and_then(|href| text::mal_id_from_url(&href)))
            .into(),
        tags: html::texts_value(".anime-genres a, ul.anime-genres li a"),
        additional_info: html::texts_value(".anime-info"),
        similar: html::default_value(),
        media_items: html::FallbackProcessor::new(|items: &Vec<Option<ContentMediaItem>>| {
            items.iter().any(Option::is_some)
        })
        .or(html::ItemsProcessor::new(
            "div#DivEpisodesList > div, .episodes-list div, .episode-item",
            episode_processor(),
        )
        .into())
        .or(html::ItemsProcessor::new("a[href*=episode], .episode-link", fallback_episode_processor()).into())
        .map(|items| Some(super::dedup_media_items(items.into_iter().flatten().collect())))
        .into(),
        params: html::default_value(),
    })
}

fn parse_content_details(page: &str) -> ContentDetails {
    let mut details = utils::process_html(page, content_details_processor());

    let section = if details.title.contains("مدبلج") {
        "Dubbed"
    } else {
        "Subbed"
    };

    if let Some(items) = details.media_items.as_mut() {
        for (idx, item) in items.iter_mut().enumerate() {
            item.section = Some(section.to_owned());
            if item.number == 0 {
                item.number = idx as u32 + 1;
            }
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = r#"
        <html><body>
            <section class="home-slider">
                <div class="anime-card">
                    <div class="hover"><img alt="One Piece" src="https://witanime.you/img/op.jpg"><a href="https://witanime.you/episode/one-piece-%d8%a7%d9%84%d8%ad%d9%84%d9%82%d8%a9-1100/"></a></div>
                    <div class="anime-card-type"><a>TV</a></div>
                </div>
            </section>
            <div class="section">
                <h3>آخر الحلقات</h3>
                <div class="anime-card">
                    <div class="hover"><img alt="One Piece" src="https://witanime.you/img/op.jpg"><a href="https://witanime.you/anime/one-piece"></a></div>
                    <div class="anime-card-type"><a>TV</a></div>
                </div>
                <div class="anime-card">
                    <div class="hover"><img alt="Your Name" src="https://witanime.you/img/yn.jpg"><a href="https://witanime.you/anime/kimi-no-na-wa/"></a></div>
                    <div class="anime-card-type"><a>Movie</a></div>
                </div>
            </div>
        </body></html>
    "#;

    const DETAILS: &str = r#"
        <html><head><title>Frieren مدبلج - WitAnime</title></head><body>
            <div class="anime-thumbnail"><img src="https://witanime.you/img/frieren.jpg"></div>
            <p class="anime-story">A mage outlives her party.</p>
            <div class="anime-info"><span>النوع:</span> <a>TV</a></div>
            <div class="anime-info"><span>بداية العرض:</span> 2023</div>
            <a class="anime-mal" href="https://myanimelist.net/anime/52991/Sousou_no_Frieren">MAL</a>
            <div id="DivEpisodesList">
                <div><div class="hover"><img src="https://witanime.you/img/ep1.jpg"></div><h3><a href="https://witanime.you/episode/frieren-1/">الحلقة 1</a></h3></div>
                <div><h3><a href="https://witanime.you/episode/frieren-2/">الحلقة 2</a></h3></div>
            </div>
        </body></html>
    "#;

    #[test]
    fn should_parse_home_page() {
        let items = parse_home_page(HOME);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "anime/one-piece");
        assert_eq!(items[0].content_type, ContentType::Anime);
        assert_eq!(items[1].title, "Your Name");
        assert_eq!(items[1].content_type, ContentType::AnimeMovie);
    }

    #[test]
    fn should_parse_details_with_fallbacks() {
        let details = parse_content_details(DETAILS);

        assert_eq!(details.title, "Frieren مدبلج");
        assert_eq!(details.image, "https://witanime.you/img/frieren.jpg");
        assert_eq!(details.description, "A mage outlives her party.");
        assert_eq!(details.content_type, ContentType::Anime);
        assert_eq!(details.year, Some(2023));
        assert_eq!(details.mal_id, Some(52991));

        let items = details.media_items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].number, 1);
        assert_eq!(items[0].section, Some("Dubbed".into()));
        assert_eq!(
            items[0].image,
            Some("https://witanime.you/img/ep1.jpg".into())
        );
        assert_eq!(items[1].params, vec!["episode/frieren-2/".to_owned()]);
    }

    #[test]
    fn should_fall_back_to_episode_links() {
        let page = r#"<html><body><h1 class="title">Show</h1>
            <a class="episode-link" href="/episode/show-1/">Episode 1</a>
            <a class="episode-link" href="/episode/show-2/">Episode 2</a>
        </body></html>"#;
        let details = parse_content_details(page);

        let items = details.media_items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].number, 2);
        assert_eq!(items[1].section, Some("Subbed".into()));
    }

    #[test]
    fn should_parse_watch_links_and_moshahda() {
        let wl = general_purpose::STANDARD.encode(
            r#"{"fhd":{"streamwish":"https://streamwish.to/e/abc"},"hd":{},"sd":{"dood":"https://dood.wf/e/xyz"}}"#,
        );
        let moshahda = general_purpose::STANDARD.encode("m0shId");
        let page = format!(
            r#"<html><body>
                <input name="wl" value="{wl}">
                <input name="moshahda" value="{moshahda}">
                <ul id="episode-servers"><li><a data-ep-url="https://www.mp4upload.com/embed-1.html">mp4upload</a></li></ul>
            </body></html>"#
        );

        let servers = parse_servers(&page);
        assert_eq!(
            servers.embeds,
            vec![
                (
                    "streamwish FHD".to_owned(),
                    "https://streamwish.to/e/abc".to_owned()
                ),
                ("dood SD".to_owned(), "https://dood.wf/e/xyz".to_owned()),
                (
                    "mp4upload".to_owned(),
                    "https://www.mp4upload.com/embed-1.html".to_owned()
                ),
            ]
        );
        assert_eq!(servers.moshahda_id, Some("m0shId".into()));

        let sources = moshahda_sources("Anime4up", servers.moshahda_id.as_deref());
        assert_eq!(sources.len(), 5);
        assert_eq!(sources[0].link(), "https://moshahda.net/m0shId.html?download_o");
        assert!(matches!(
            &sources[4],
            ContentMediaItemSource::Video { quality: Some(240), .. }
        ));
    }

    #[test]
    fn should_ignore_pages_without_servers() {
        let servers = parse_servers("<html><body></body></html>");
        assert_eq!(servers, EpisodeServers::default());
        assert!(moshahda_sources("WitAnime", None).is_empty());
    }
}
