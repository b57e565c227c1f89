use std::{collections::HashSet, sync::OnceLock, time::Duration};

use indexmap::IndexMap;
use regex::Regex;
use scraper::ElementRef;

use crate::{
    extractors,
    models::{ContentDetails, ContentInfo, ContentMediaItem, ContentMediaItemSource, ContentType},
    utils::{
        self,
        html,
        retry::{self, RetryPolicy},
        text,
    },
};

use super::ContentSupplier;

const ORIGIN: &str = "https://egy1best.cimawbas.tv";
const URL: &str = "https://egy1best.cimawbas.tv/egy1/index.php";
const NAME: &str = "Egy1Best";
const TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Default)]
pub struct Egy1BestContentSupplier;

impl ContentSupplier for Egy1BestContentSupplier {
    fn get_channels(&self) -> Vec<String> {
        super::channel_names(get_channels_map())
    }

    fn get_default_channels(&self) -> Vec<String> {
        vec!["Home".into()]
    }

    fn get_supported_types(&self) -> Vec<ContentType> {
        vec![ContentType::Movie, ContentType::Series]
    }

    fn get_supported_languages(&self) -> Vec<String> {
        vec!["ar".into()]
    }

    async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = url::Url::parse_with_params(URL, &[("search", query.as_str())])?;
        let html = load_page(url.as_str()).await?;

        Ok(parse_content_infos(&html))
    }

    async fn load_channel(
        &self,
        channel: String,
        page: u16,
    ) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = get_channels_map()
            .get(channel.as_str())
            .map(|url| paged_url(url, page))
            .ok_or_else(|| anyhow::anyhow!("unknown channel {channel}"))?;
        let html = load_page(&url).await?;

        Ok(parse_content_infos(&html))
    }

    async fn get_content_details(
        &self,
        id: String,
    ) -> Result<Option<ContentDetails>, anyhow::Error> {
        let html = load_page(&text::format_id_to_url(ORIGIN, &id)).await?;

        Ok(Some(parse_content_details(&html, &id)))
    }

    async fn load_media_items(
        &self,
        id: String,
        _params: Vec<String>,
    ) -> Result<Vec<ContentMediaItem>, anyhow::Error> {
        let html = load_page(&text::format_id_to_url(ORIGIN, &id)).await?;

        Ok(parse_content_details(&html, &id)
            .media_items
            .unwrap_or_default())
    }

    async fn load_media_item_sources(
        &self,
        id: String,
        params: Vec<String>,
    ) -> Result<Vec<ContentMediaItemSource>, anyhow::Error> {
        let page_url = text::format_id_to_url(ORIGIN, &super::source_page_id(&id, &params));
        let html = load_page(&page_url).await?;
        let (embeds, direct) = parse_page_links(&html);

        let sources_futures = embeds
            .iter()
            .map(|url| extractors::load_extractor(url, &page_url, NAME));

        let mut results: Vec<_> = futures::future::join_all(sources_futures)
            .await
            .into_iter()
            .flatten()
            .collect();

        results.extend(
            direct
                .iter()
                .map(|url| extractors::direct_link(url, &page_url, NAME, None)),
        );

        Ok(results)
    }
}

fn retry_policy() -> &'static RetryPolicy {
    static RETRY_POLICY: OnceLock<RetryPolicy> = OnceLock::new();
    RETRY_POLICY.get_or_init(|| RetryPolicy::default().with_timeout(TIMEOUT))
}

async fn load_page(url: &str) -> anyhow::Result<String> {
    retry::fetch_html(url, None, retry_policy()).await
}

/// The listing urls already carry a query, so the page goes after `&`.
fn paged_url(url: &str, page: u16) -> String {
    if url.contains('?') {
        format!("{url}&page={page}")
    } else {
        format!("{url}?page={page}")
    }
}

fn first_element<'a>(
    el: &ElementRef<'a>,
    cell: &'static OnceLock<scraper::Selector>,
    selectors: &str,
) -> Option<ElementRef<'a>> {
    el.select(html::selector(cell, selectors)).next()
}

fn parse_card(el: &ElementRef) -> Option<ContentInfo> {
    static TITLE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static IMAGE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static SERIES_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let title_el = first_element(
        el,
        &TITLE_SELECTOR,
        "h3 a, h2 a, .title a, .movie-title a",
    )?;
    let href = text::fix_url(URL, title_el.attr("href")?)?;

    let mut title = html::element_text(&title_el);
    if title.is_empty() {
        title = html::element_text(el);
    }

    let image = first_element(
        el,
        &IMAGE_SELECTOR,
        "img[src], img[data-src], img[data-lazy-src]",
    )
    .and_then(|img| {
        img.attr("src")
            .or_else(|| img.attr("data-src"))
            .or_else(|| img.attr("data-lazy-src"))
    })
    .and_then(|src| text::fix_url(URL, src))
    .unwrap_or_default();

    let is_series = first_element(
        el,
        &SERIES_SELECTOR,
        ".series-badge, .tv-series, [class*='series'], .episode-list, .seasons-container",
    )
    .is_some()
        || href.to_lowercase().contains("series");

    Some(ContentInfo {
        id: text::extract_id_from_url(&href),
        title,
        secondary_title: None,
        image,
        content_type: if is_series {
            ContentType::Series
        } else {
            ContentType::Movie
        },
        year: None,
    })
}

fn content_info_items_processor() -> &'static html::ItemsProcessor<Option<ContentInfo>> {
    static CONTENT_INFO_ITEMS_PROCESSOR: OnceLock<html::ItemsProcessor<Option<ContentInfo>>> =
        OnceLock::new();
    CONTENT_INFO_ITEMS_PROCESSOR.get_or_init(|| {
        html::ItemsProcessor::new(
            "div.movie-item, article, .item",
            html::ExtractValue::new(|el| parse_card(el)).into(),
        )
    })
}

/// Card selectors overlap on nested markup, so the same title can show up twice.
fn parse_content_infos(page: &str) -> Vec<ContentInfo> {
    let items = utils::process_html(page, content_info_items_processor());

    super::dedup_content_infos(items.into_iter().flatten().collect())
}

fn parse_episodes(root: &ElementRef) -> Vec<ContentMediaItem> {
    static SEASON_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static EPISODE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static TITLE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static LINK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static NUMBER_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static FALLBACK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let mut episodes: Vec<ContentMediaItem> = vec![];

    let seasons = root.select(html::selector(
        &SEASON_SELECTOR,
        ".seasons-container .season, .episodes-container .season, .episode-list",
    ));
    for (season_idx, season) in seasons.enumerate() {
        let items = season
            .select(html::selector(&EPISODE_SELECTOR, ".episode, .episode-item"))
            .filter_map(|ep| {
                let title = first_element(&ep, &TITLE_SELECTOR, "a, .episode-title")
                    .map(|el| html::element_text(&el))
                    .unwrap_or_default();
                let href = first_element(&ep, &LINK_SELECTOR, "a")
                    .and_then(|a| a.attr("href"))
                    .and_then(|href| text::fix_url(URL, href))?;
                let number = first_element(&ep, &NUMBER_SELECTOR, ".episode-number, .num")
                    .and_then(|el| text::get_int_from_text(&html::element_text(&el)))
                    .or_else(|| text::get_int_from_text(&title))
                    .unwrap_or_default();

                Some(ContentMediaItem {
                    number,
                    title,
                    season: Some(season_idx as u32 + 1),
                    params: vec![text::extract_id_from_url(&href)],
                    ..Default::default()
                })
            });
        episodes.extend(items);
    }

    if episodes.is_empty() {
        episodes = root
            .select(html::selector(
                &FALLBACK_SELECTOR,
                "a[href*='episode'], .episode-link",
            ))
            .filter_map(|link| {
                let href = text::fix_url(URL, link.attr("href")?)?;
                let title = html::element_text(&link);
                let season_episode = text::extract_season_episode(&title);

                Some(ContentMediaItem {
                    number: season_episode.map(|(_, e)| e).unwrap_or_default(),
                    season: season_episode.map(|(s, _)| s),
                    title,
                    params: vec![text::extract_id_from_url(&href)],
                    ..Default::default()
                })
            })
            .collect();
    }

    super::dedup_media_items(episodes)
}

fn content_details_processor() -> &'static html::ContentDetailsProcessor {
    static CONTENT_DETAILS_PROCESSOR: OnceLock<html::ContentDetailsProcessor> = OnceLock::new();
    CONTENT_DETAILS_PROCESSOR.get_or_init(|| html::ContentDetailsProcessor {
        title: html::fallback_text(&["h1, .movie-title, .title", "title"]),
        original_title: html::default_value(),
        image: html::FallbackProcessor::new(|s: &String| !s.is_empty())
            .or(html::attr_value(
                "img[src*='poster'], .poster img, .thumbnail img",
                "src",
            ))
            .or(html::attr_value("img[src]", "src"))
            .map(|src| text::fix_url(URL, &src).unwrap_or_default())
            .into(),
        description: html::text_value(".plot, .description, .synopsis, .story"),
        content_type: html::ExtractValue::new(|root| {
            static SERIES_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
            let has_episodes = first_element(
                root,
                &SERIES_SELECTOR,
                ".episodes-list, .seasons, .episode-container",
            )
            .is_some();

            if has_episodes {
                ContentType::Series
            } else {
                ContentType::Movie
            }
        })
        .into(),
        year: html::TextValue::new()
            .all_nodes()
            .itr_scope(".year, .release-date, .date, .info")
            .map(|texts| text::extract_year(&texts.join(" ")))
            .into(),
        duration: html::default_value(),
        status: html::default_value(),
        mal_id: html::default_value(),
        tags: html::default_value(),
        additional_info: html::default_value(),
        similar: html::default_value(),
        media_items: html::ExtractValue::new(|root| Some(parse_episodes(root))).into(),
        params: html::default_value(),
    })
}

fn parse_content_details(page: &str, id: &str) -> ContentDetails {
    let mut details = utils::process_html(page, content_details_processor());

    if details.content_type == ContentType::Movie
        || details
            .media_items
            .as_ref()
            .map_or(true, |items| items.is_empty())
    {
        details.media_items = Some(vec![super::movie_media_item(&details.title, id)]);
    }

    details
}

/// Embed pages for the extractors and media urls found in inline scripts.
fn parse_page_links(page: &str) -> (Vec<String>, Vec<String>) {
    static ANCHOR_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static FRAME_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static SCRIPT_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static QUOTED_URL_RE: OnceLock<Regex> = OnceLock::new();
    static PLAYER_SRC_RE: OnceLock<Regex> = OnceLock::new();

    let quoted_url_re = QUOTED_URL_RE.get_or_init(|| {
        Regex::new(
            r#"["'](https?://[^"'\s]*\.(?:mp4|mkv|avi|mov|m3u8|webm|json|php)[^"'\s]*)["']"#,
        )
        .unwrap()
    });
    let player_src_re =
        PLAYER_SRC_RE.get_or_init(|| Regex::new(r#"src\s*:\s*["']([^"']*)["']"#).unwrap());

    let document = scraper::Html::parse_document(page);
    let mut seen = HashSet::new();
    let mut embeds = vec![];
    let mut direct = vec![];

    let anchors = document
        .select(html::selector(
            &ANCHOR_SELECTOR,
            "a[href*='download'], a[href*='watch'], a[href*='player'], .mirror a, .server a",
        ))
        .filter_map(|a| a.attr("href"));
    let frames = document
        .select(html::selector(
            &FRAME_SELECTOR,
            "iframe[src], frame[src], object[data]",
        ))
        .filter_map(|el| el.attr("src").or_else(|| el.attr("data")));

    for href in anchors.chain(frames) {
        if let Some(url) = text::fix_url(URL, href) {
            if seen.insert(url.clone()) {
                embeds.push(url);
            }
        }
    }

    for script in document.select(html::selector(&SCRIPT_SELECTOR, "script")) {
        let content = script.text().collect::<String>();

        let quoted = quoted_url_re
            .captures_iter(&content)
            .map(|caps| caps[1].to_owned());
        let players = player_src_re
            .captures_iter(&content)
            .map(|caps| caps[1].to_owned())
            .filter(|src| text::is_media_file(src));

        for url in quoted.chain(players) {
            let url = text::to_full_url(&url);
            if seen.insert(url.clone()) {
                direct.push(url);
            }
        }
    }

    (embeds, direct)
}

fn get_channels_map() -> &'static IndexMap<&'static str, String> {
    static CHANNELS_MAP: OnceLock<IndexMap<&'static str, String>> = OnceLock::new();
    CHANNELS_MAP.get_or_init(|| {
        IndexMap::from([
            ("Home", URL.to_owned()),
            ("Movies", format!("{URL}?page=movies")),
            ("Series", format!("{URL}?page=series")),
            ("Trending", format!("{URL}?page=trending")),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_wait_longer_for_listings() {
        assert_eq!(retry_policy().timeout, Some(TIMEOUT));
        assert!(retry_policy().mirrors.is_empty());
    }

    const LISTING: &str = r#"
        <html><body>
            <div class="movie-item">
                <img data-src="uploads/inception.jpg">
                <h3><a href="movie.php?id=12">Inception</a></h3>
            </div>
            <article>
                <div class="item">
                    <img src="/egy1/uploads/dark.jpg">
                    <h2><a href="series.php?id=7"></a></h2>
                    <span class="tv-series">TV</span>
                    Dark
                </div>
            </article>
            <div class="item"><p>banner</p></div>
        </body></html>
    "#;

    #[test]
    fn should_page_query_urls() {
        assert_eq!(
            paged_url("https://egy1best.cimawbas.tv/egy1/index.php", 2),
            "https://egy1best.cimawbas.tv/egy1/index.php?page=2"
        );
        assert_eq!(
            paged_url("https://egy1best.cimawbas.tv/egy1/index.php?page=movies", 3),
            "https://egy1best.cimawbas.tv/egy1/index.php?page=movies&page=3"
        );
    }

    #[test]
    fn should_parse_listing_cards() {
        let items = parse_content_infos(LISTING);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "egy1/movie.php?id=12");
        assert_eq!(items[0].title, "Inception");
        assert_eq!(
            items[0].image,
            "https://egy1best.cimawbas.tv/egy1/uploads/inception.jpg"
        );
        assert_eq!(items[0].content_type, ContentType::Movie);
        assert_eq!(items[1].id, "egy1/series.php?id=7");
        assert_eq!(items[1].title, "TV Dark");
        assert_eq!(items[1].content_type, ContentType::Series);
    }

    #[test]
    fn should_parse_series_details() {
        let page = r#"<html><head><title>Dark</title></head><body>
            <h1 class="title">Dark</h1>
            <div class="poster"><img src="/egy1/uploads/dark-poster.jpg"></div>
            <div class="info">Germany, 2017</div>
            <div class="story">A missing child.</div>
            <div class="seasons seasons-container">
                <div class="season">
                    <div class="episode"><span class="num">1</span><a href="watch.php?ep=101">Secrets</a></div>
                    <div class="episode"><span class="num">2</span><a href="watch.php?ep=102">Lies</a></div>
                </div>
                <div class="season">
                    <div class="episode-item"><a href="watch.php?ep=201">Episode 1</a></div>
                </div>
            </div>
        </body></html>"#;

        let details = parse_content_details(page, "egy1/series.php?id=7");

        assert_eq!(details.title, "Dark");
        assert_eq!(
            details.image,
            "https://egy1best.cimawbas.tv/egy1/uploads/dark-poster.jpg"
        );
        assert_eq!(details.year, Some(2017));
        assert_eq!(details.description, "A missing child.");
        assert_eq!(details.content_type, ContentType::Series);

        let items = details.media_items.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].number, 2);
        assert_eq!(items[1].title, "Lies");
        assert_eq!(items[1].params, vec!["egy1/watch.php?ep=102".to_owned()]);
        assert_eq!(items[2].season, Some(2));
        assert_eq!(items[2].number, 1);
    }

    #[test]
    fn should_collect_page_links() {
        let page = r#"<html><body>
            <div class="server"><a href="https://dood.li/e/abc">Dood</a></div>
            <a href="javascript:void(0)" class="watch">watch</a>
            <iframe src="https://mixdrop.ps/e/xyz"></iframe>
            <object data="data:application/x-shockwave-flash,abc"></object>
            <script>
                var cfg = {src: '//cdn.example.com/egy/movie.mp4', poster: "https://cdn.example.com/p.jpg"};
                fetch("https://api.example.com/links.php?id=3");
            </script>
        </body></html>"#;

        let (embeds, direct) = parse_page_links(page);

        assert_eq!(
            embeds,
            vec!["https://dood.li/e/abc".to_owned(), "https://mixdrop.ps/e/xyz".to_owned()]
        );
        assert_eq!(
            direct,
            vec![
                "https://api.example.com/links.php?id=3".to_owned(),
                "https://cdn.example.com/egy/movie.mp4".to_owned(),
            ]
        );
    }
}
