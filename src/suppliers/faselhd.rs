use std::sync::OnceLock;

use indexmap::IndexMap;
use log::{error, warn};
use regex::Regex;
use scraper::ElementRef;

use crate::{
    extractors,
    models::{ContentDetails, ContentInfo, ContentMediaItem, ContentMediaItemSource, ContentType},
    utils::{
        self, hls,
        html::{self, DOMProcessor},
        retry::{self, RetryPolicy},
        text,
    },
};

use super::ContentSupplier;

const URL: &str = "https://www.faselhd.cloud";
const MIRRORS: &[&str] = &["https://www.faselhd.club"];
const NAME: &str = "FaselHD";

const CARDS_SELECTOR: &str = r#"div#postList div[class="col-xl-2 col-lg-2 col-md-3 col-sm-3"]"#;
const INFO_CELLS_SELECTOR: &str =
    r#"div#singleList div[class="col-xl-6 col-lg-6 col-md-6 col-sm-6"]"#;

#[derive(Default)]
pub struct FaselHDContentSupplier;

impl ContentSupplier for FaselHDContentSupplier {
    fn get_channels(&self) -> Vec<String> {
        super::channel_names(get_channels_map())
    }

    fn get_default_channels(&self) -> Vec<String> {
        vec!["جميع الافلام".into()]
    }

    fn get_supported_types(&self) -> Vec<ContentType> {
        vec![ContentType::Movie, ContentType::Series, ContentType::Anime]
    }

    fn get_supported_languages(&self) -> Vec<String> {
        vec!["ar".into()]
    }

    async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = url::Url::parse_with_params(&format!("{URL}/"), &[("s", query.as_str())])?;

        utils::scrap_page_with_retry(url.as_str(), retry_policy(), content_info_items_processor())
            .await
    }

    async fn load_channel(
        &self,
        channel: String,
        page: u16,
    ) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = super::get_channel_url(get_channels_map(), &channel, page)?;

        utils::scrap_page_with_retry(&url, retry_policy(), content_info_items_processor()).await
    }

    async fn get_content_details(
        &self,
        id: String,
    ) -> Result<Option<ContentDetails>, anyhow::Error> {
        Ok(Some(load_content_details(&id).await?))
    }

    async fn load_media_items(
        &self,
        id: String,
        _params: Vec<String>,
    ) -> Result<Vec<ContentMediaItem>, anyhow::Error> {
        Ok(load_content_details(&id)
            .await?
            .media_items
            .unwrap_or_default())
    }

    async fn load_media_item_sources(
        &self,
        id: String,
        params: Vec<String>,
    ) -> Result<Vec<ContentMediaItemSource>, anyhow::Error> {
        let page_url = text::format_id_to_url(URL, &super::source_page_id(&id, &params));
        let page = retry::fetch_html(&page_url, None, retry_policy()).await?;
        let links = parse_player_links(&page);

        let download = async {
            match &links.download {
                Some(url) => load_download_source(url, &page_url).await,
                None => vec![],
            }
        };
        let player = async {
            match &links.iframe {
                Some(url) => load_player_sources(url, &page_url).await,
                None => vec![],
            }
        };

        let (download, player) = futures::future::join(download, player).await;

        Ok(player.into_iter().chain(download).collect())
    }
}

fn retry_policy() -> &'static RetryPolicy {
    static RETRY_POLICY: OnceLock<RetryPolicy> = OnceLock::new();
    RETRY_POLICY.get_or_init(|| RetryPolicy::mirrors_only(URL, MIRRORS))
}

async fn load_content_details(id: &str) -> anyhow::Result<ContentDetails> {
    let url = text::format_id_to_url(URL, id);
    let page = retry::fetch_html(&url, None, retry_policy()).await?;

    let mut details = parse_content_details(&page, id);
    if details.content_type == ContentType::Movie {
        return Ok(details);
    }

    let referer = url.as_str();
    let season_futures = parse_season_pages(&page).into_iter().map(|season_url| async move {
        match retry::fetch_html(&season_url, Some(referer), retry_policy()).await {
            Ok(season_page) => parse_season_episodes(&season_page),
            Err(err) => {
                warn!("[faselhd] failed to load season {season_url}: {err}");
                vec![]
            }
        }
    });

    let mut episodes = details.media_items.take().unwrap_or_default();
    episodes.extend(
        futures::future::join_all(season_futures)
            .await
            .into_iter()
            .flatten(),
    );

    details.media_items = Some(sort_episodes(episodes));
    Ok(details)
}

fn sort_episodes(episodes: Vec<ContentMediaItem>) -> Vec<ContentMediaItem> {
    let mut episodes = super::dedup_media_items(episodes);
    episodes.sort_by_key(|ep| (ep.season.unwrap_or_default(), ep.number));
    episodes
}

/// Drops the marketing words FaselHD puts around every title.
fn clean_title(title: &str) -> String {
    static CLEANUP_RE: OnceLock<Regex> = OnceLock::new();
    let re = CLEANUP_RE.get_or_init(|| {
        Regex::new("الموسم الأول|برنامج|فيلم|مترجم|اون لاين|مسلسل|مشاهدة|انمي|أنمي").unwrap()
    });

    text::sanitize_text(&re.replace_all(title, ""))
}

fn clean_quality(quality: &str) -> Option<String> {
    let quality = text::sanitize_text(&quality.replace("1080p ", "").replace('-', ""));
    if quality.is_empty() {
        None
    } else {
        Some(quality)
    }
}

fn card_processor() -> Box<dyn DOMProcessor<ContentInfo>> {
    html::ContentInfoProcessor {
        id: html::MapValue::new(
            |href: String| text::extract_id_from_url(&href),
            html::fallback_attr(&[("div.postDiv a", "href"), ("a", "href")]),
        )
        .into(),
        title: html::FallbackProcessor::new(|s: &String| !s.is_empty())
            .or(html::attr_value("img", "alt"))
            .or(html::text_value(".title"))
            .or(html::text_value("a"))
            .into(),
        secondary_title: html::TextValue::new()
            .all_nodes()
            .in_scope(".quality")
            .map(|quality| quality.and_then(|q| clean_quality(&q)))
            .into(),
        image: html::MapValue::new(
            |src: String| html::complete_image_url(URL, &src),
            html::fallback_attr(&[("img", "data-src"), ("img", "src")]),
        )
        .into(),
        content_type: html::default_value(),
        year: html::default_value(),
    }
    .into()
}

/// Type comes from the raw title, before the cleanup strips `فيلم`.
fn finish_cards(items: Vec<ContentInfo>) -> Vec<ContentInfo> {
    let items = items
        .into_iter()
        .map(|item| ContentInfo {
            content_type: if item.title.contains("فيلم") {
                ContentType::Movie
            } else {
                ContentType::Series
            },
            title: clean_title(&item.title),
            ..item
        })
        .collect();

    super::dedup_content_infos(items)
}

fn content_info_items_processor() -> &'static html::MapValue<Vec<ContentInfo>, Vec<ContentInfo>> {
    static CONTENT_INFO_ITEMS_PROCESSOR: OnceLock<
        html::MapValue<Vec<ContentInfo>, Vec<ContentInfo>>,
    > = OnceLock::new();
    CONTENT_INFO_ITEMS_PROCESSOR
        .get_or_init(|| html::ItemsProcessor::new(CARDS_SELECTOR, card_processor()).map(finish_cards))
}

fn content_details_processor() -> &'static html::ContentDetailsProcessor {
    static CONTENT_DETAILS_PROCESSOR: OnceLock<html::ContentDetailsProcessor> = OnceLock::new();
    CONTENT_DETAILS_PROCESSOR.get_or_init(|| html::ContentDetailsProcessor {
        title: html::text_value("title"),
        original_title: html::default_value(),
        image: html::MapValue::new(
            |src: String| html::complete_image_url(URL, &src),
            html::fallback_attr(&[
                ("div.posterImg img", "src"),
                ("div.seasonDiv.active img", "data-src"),
                ("img[itemprop=image]", "src"),
                ("meta[property='og:image']", "content"),
            ]),
        )
        .into(),
        description: html::text_value("div.singleDesc p"),
        content_type: html::ExtractValue::new(|root| {
            static EPISODES_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
            if root
                .select(html::selector(&EPISODES_SELECTOR, "div.epAll"))
                .next()
                .is_some()
            {
                ContentType::Series
            } else {
                ContentType::Movie
            }
        })
        .into(),
        year: html::TextValue::new()
            .all_nodes()
            .in_scope(INFO_CELLS_SELECTOR)
            .containing("سنة|موعد")
            .map(|cell| cell.and_then(|c| text::extract_year(&c)))
            .into(),
        duration: html::TextValue::new()
            .all_nodes()
            .in_scope(INFO_CELLS_SELECTOR)
            .containing("مدة|توقيت")
            .map(|cell| cell.and_then(|c| text::get_int_from_text(&c)))
            .into(),
        status: html::default_value(),
        mal_id: html::default_value(),
        tags: html::ScopeProcessor::new(INFO_CELLS_SELECTOR, html::texts_value("a"))
            .containing("تصنيف الفيلم")
            .unwrap_or_default()
            .into(),
        additional_info: html::default_value(),
        similar: html::ItemsProcessor::new("div#postList div.postDiv", card_processor())
            .map(finish_cards)
            .into(),
        media_items: html::ExtractValue::new(|root| Some(episodes_of_active_season(root))).into(),
        params: html::default_value(),
    })
}

fn parse_content_details(page: &str, id: &str) -> ContentDetails {
    static SITE_NAME_RE: OnceLock<Regex> = OnceLock::new();

    let mut details = utils::process_html(page, content_details_processor());

    let title = SITE_NAME_RE
        .get_or_init(|| Regex::new(r"\s*-\s*فاصل إعلاني.*$").unwrap())
        .replace(&details.title, "");
    let mut title = clean_title(&title);
    if let Some(year) = details.year {
        title = text::sanitize_text(&title.replace(&year.to_string(), ""));
    }
    details.title = title;

    if details.content_type == ContentType::Movie {
        details.media_items = Some(vec![super::movie_media_item(&details.title, id)]);
    }

    details
}

/// Episodes listed for the season that is open on the page.
fn episodes_of_active_season(root: &ElementRef) -> Vec<ContentMediaItem> {
    static SEASON_TITLE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static EPISODE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let season = root
        .select(html::selector(
            &SEASON_TITLE_SELECTOR,
            "div.seasonDiv.active div.title",
        ))
        .next()
        .and_then(|el| text::get_int_from_text(&html::element_text(&el)))
        .unwrap_or(1);

    root.select(html::selector(&EPISODE_SELECTOR, "div.epAll a"))
        .enumerate()
        .filter_map(|(idx, a)| {
            let href = a.attr("href")?;
            let title = html::element_text(&a);

            Some(ContentMediaItem {
                number: text::get_int_from_text(&title).unwrap_or(idx as u32 + 1),
                title,
                season: Some(season),
                params: vec![text::extract_id_from_url(href)],
                ..Default::default()
            })
        })
        .collect()
}

fn parse_season_episodes(page: &str) -> Vec<ContentMediaItem> {
    let document = scraper::Html::parse_document(page);
    let episodes = episodes_of_active_season(&document.root_element());
    episodes
}

/// Urls of the seasons that are not open on the page.
fn parse_season_pages(page: &str) -> Vec<String> {
    static SEASON_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static ONCLICK_RE: OnceLock<Regex> = OnceLock::new();

    let onclick_re = ONCLICK_RE.get_or_init(|| Regex::new(r".*/\?p=|'").unwrap());
    let document = scraper::Html::parse_document(page);

    let urls = document
        .select(html::selector(
            &SEASON_SELECTOR,
            r#"div#seasonList div[class="col-xl-2 col-lg-3 col-md-6"] div.seasonDiv:not(.active)"#,
        ))
        .filter_map(|el| el.attr("onclick"))
        .map(|onclick| onclick_re.replace_all(onclick, "").trim().to_owned())
        .filter(|post_id| !post_id.is_empty())
        .map(|post_id| format!("{URL}/?p={post_id}"))
        .collect();

    urls
}

#[derive(Debug, Default, PartialEq)]
struct PlayerLinks {
    download: Option<String>,
    iframe: Option<String>,
}

fn parse_player_links(page: &str) -> PlayerLinks {
    static DOWNLOAD_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static IFRAME_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);
    let first_attr = |cell: &'static OnceLock<scraper::Selector>, selectors: &str, attr: &str| {
        document
            .select(html::selector(cell, selectors))
            .filter_map(|el| el.attr(attr))
            .find_map(|href| text::fix_url(URL, href))
    };

    PlayerLinks {
        download: first_attr(&DOWNLOAD_SELECTOR, ".downloadLinks a", "href"),
        iframe: first_attr(&IFRAME_SELECTOR, r#"iframe[name="player_iframe"]"#, "src"),
    }
}

async fn load_download_source(url: &str, referer: &str) -> Vec<ContentMediaItemSource> {
    static DL_LINK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let page = match retry::post_html(url, Some(referer), retry_policy()).await {
        Ok(page) => page,
        Err(err) => {
            error!("[faselhd] failed to load download page {url}: {err}");
            return vec![];
        }
    };

    let document = scraper::Html::parse_document(&page);
    let links = document
        .select(html::selector(&DL_LINK_SELECTOR, "div.dl-link a"))
        .filter_map(|a| a.attr("href"))
        .take(1)
        .map(|href| extractors::direct_link(href, url, "FaselHD Download Source", None))
        .collect();

    links
}

/// What a player iframe page offers, best option first.
#[derive(Debug, PartialEq)]
enum PlayerPage {
    Master(String),
    Files(Vec<(String, Option<u32>)>, &'static str),
    Nothing,
}

fn parse_player_page(page: &str) -> PlayerPage {
    static SCRIPT_SOURCE_RE: OnceLock<Regex> = OnceLock::new();

    if let Some(master) = hls::find_master_playlist(page) {
        return PlayerPage::Master(master);
    }

    let tags = super::parse_source_tags(page);
    if !tags.is_empty() {
        return PlayerPage::Files(tags, "Video Source");
    }

    let files: Vec<_> = SCRIPT_SOURCE_RE
        .get_or_init(|| {
            Regex::new(r#"(?:src|file|video_url):\s*['"]([^'"]+\.(?:mp4|m3u8|mkv|webm))['"]"#)
                .unwrap()
        })
        .captures_iter(page)
        .map(|caps| (text::to_full_url(&caps[1]), None))
        .collect();

    if !files.is_empty() {
        return PlayerPage::Files(files, "JS Source");
    }

    PlayerPage::Nothing
}

async fn load_player_sources(iframe_url: &str, referer: &str) -> Vec<ContentMediaItemSource> {
    let iframe_fallback = || {
        vec![extractors::direct_link(
            iframe_url,
            referer,
            "FaselHD Iframe Direct",
            None,
        )]
    };

    let page = match retry::fetch_html(iframe_url, Some(referer), retry_policy()).await {
        Ok(page) => page,
        Err(err) => {
            warn!("[faselhd] player {iframe_url} failed: {err}");
            return iframe_fallback();
        }
    };

    match parse_player_page(&page) {
        PlayerPage::Master(master) => {
            match hls::expand_master_playlist(&master, iframe_url, NAME).await {
                Ok(sources) => sources,
                Err(err) => {
                    warn!("[faselhd] master playlist {master} failed: {err}");
                    iframe_fallback()
                }
            }
        }
        PlayerPage::Files(files, description) => files
            .iter()
            .map(|(link, quality)| {
                extractors::direct_link(link, iframe_url, &format!("{NAME} {description}"), *quality)
            })
            .collect(),
        PlayerPage::Nothing => iframe_fallback(),
    }
}

fn get_channels_map() -> &'static IndexMap<&'static str, String> {
    static CHANNELS_MAP: OnceLock<IndexMap<&'static str, String>> = OnceLock::new();
    CHANNELS_MAP.get_or_init(|| {
        IndexMap::from([
            ("جميع الافلام", format!("{URL}/all-movies/page/")),
            ("الافلام الاعلي مشاهدة", format!("{URL}/movies_top_views/page/")),
            ("الأفلام المدبلجة", format!("{URL}/dubbed-movies/page/")),
            ("الافلام الاعلي تقييما IMDB", format!("{URL}/movies_top_imdb/page/")),
            ("مسلسلات", format!("{URL}/series/page/")),
            ("المضاف حديثا", format!("{URL}/recent_series/page/")),
            ("الأنمي", format!("{URL}/anime/page/")),
        ])
    })
}
