use std::{collections::HashSet, sync::OnceLock};

use indexmap::IndexMap;
use regex::Regex;
use scraper::ElementRef;

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

const URL: &str = "https://egibest.net";
const NAME: &str = "EgiBest";

#[derive(Default)]
pub struct EgiBestContentSupplier;

impl ContentSupplier for EgiBestContentSupplier {
    fn get_channels(&self) -> Vec<String> {
        super::channel_names(get_channels_map())
    }

    fn get_default_channels(&self) -> Vec<String> {
        vec!["Movies".into()]
    }

    fn get_supported_types(&self) -> Vec<ContentType> {
        vec![ContentType::Movie, ContentType::Series]
    }

    fn get_supported_languages(&self) -> Vec<String> {
        vec!["ar".into()]
    }

    async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let query = query.split_whitespace().collect::<Vec<_>>().join("+");
        let url = format!("{URL}/search/{query}/");

        utils::scrap_page(
            utils::create_client().get(&url),
            content_info_items_processor(),
        )
        .await
    }

    async fn load_channel(
        &self,
        channel: String,
        page: u16,
    ) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = super::get_channel_url(get_channels_map(), &channel, page)?;

        utils::scrap_page(
            utils::create_client().get(&url),
            content_info_items_processor(),
        )
        .await
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
        let links = parse_page_links(&html);

        let sources_futures = links
            .embeds
            .iter()
            .map(|url| extractors::load_extractor(url, &page_url, NAME));

        let mut results: Vec<_> = futures::future::join_all(sources_futures)
            .await
            .into_iter()
            .flatten()
            .collect();

        results.extend(
            links
                .direct
                .iter()
                .map(|url| extractors::direct_link(url, &page_url, NAME, None)),
        );

        Ok(results)
    }
}

async fn load_page(url: &str) -> anyhow::Result<String> {
    utils::load_text(utils::create_client().get(url)).await
}

#[derive(Debug, Default, PartialEq)]
struct PageLinks {
    embeds: Vec<String>,
    direct: Vec<String>,
}

fn parse_page_links(page: &str) -> PageLinks {
    static ANCHOR_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static PLAYER_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static MEDIA_URL_RE: OnceLock<Regex> = OnceLock::new();

    let media_url_re = MEDIA_URL_RE.get_or_init(|| {
        Regex::new(r#""(https?://[^"\s]*\.(?:mp4|mkv|avi|mov|m3u8|webm)[^"\s]*)""#).unwrap()
    });

    let document = scraper::Html::parse_document(page);
    let mut seen = HashSet::new();
    let mut links = PageLinks::default();

    let anchors = document
        .select(html::selector(
            &ANCHOR_SELECTOR,
            "a[href*='download'], a[href*='embed'], a[href*='player']",
        ))
        .filter_map(|el| el.attr("href"));

    let players = document
        .select(html::selector(&PLAYER_SELECTOR, "iframe, script"))
        .filter_map(|el| el.attr("src"))
        .filter(|src| !src.ends_with(".js") && !src.contains(".js?"));

    for href in anchors.chain(players) {
        if let Some(url) = text::fix_url(URL, href) {
            if seen.insert(url.clone()) {
                links.embeds.push(url);
            }
        }
    }

    for script in document.select(html::selector(&PLAYER_SELECTOR, "iframe, script")) {
        let content = script.text().collect::<String>();
        for caps in media_url_re.captures_iter(&content) {
            let url = caps[1].to_owned();
            if seen.insert(url.clone()) {
                links.direct.push(url);
            }
        }
    }

    links
}

fn is_series_card(el: &ElementRef) -> bool {
    static POST_TYPE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static LINK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let post_type = el
        .select(html::selector(&POST_TYPE_SELECTOR, ".post-type"))
        .map(|e| html::element_text(&e).to_lowercase())
        .collect::<String>();
    let href = el
        .select(html::selector(&LINK_SELECTOR, "h3 a, h2 a"))
        .next()
        .and_then(|a| a.attr("href"))
        .unwrap_or_default()
        .to_lowercase();

    post_type.contains("series") || post_type.contains("tv") || href.contains("series")
}

fn content_info_processor() -> Box<dyn DOMProcessor<ContentInfo>> {
    html::ContentInfoProcessor {
        id: html::AttrValue::new("href")
            .map(|href| text::extract_id_from_url(&href))
            .in_scope("h3 a, h2 a")
            .unwrap_or_default()
            .into(),
        title: html::fallback_text(&["h3 a", "h2 a"]),
        secondary_title: html::default_value(),
        image: html::fallback_attr(&[("img", "data-lazy-src"), ("img", "src")]),
        content_type: html::ExtractValue::new(|el| {
            if is_series_card(el) {
                ContentType::Series
            } else {
                ContentType::Movie
            }
        })
        .into(),
        year: html::default_value(),
    }
    .into()
}

fn content_info_items_processor() -> &'static html::FilterProcessor<ContentInfo> {
    static CONTENT_INFO_ITEMS_PROCESSOR: OnceLock<html::FilterProcessor<ContentInfo>> =
        OnceLock::new();
    CONTENT_INFO_ITEMS_PROCESSOR.get_or_init(|| {
        html::ItemsProcessor::new("article.item", content_info_processor())
            .filter(|item| !item.id.is_empty())
    })
}

fn parse_episodes(root: &ElementRef) -> Vec<ContentMediaItem> {
    static SEASON_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static EPISODE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static LINK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static FALLBACK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let mut episodes: Vec<ContentMediaItem> = vec![];

    let seasons = root.select(html::selector(
        &SEASON_SELECTOR,
        ".seasons-and-episodes .season",
    ));
    for (season_idx, season) in seasons.enumerate() {
        let items = season
            .select(html::selector(&EPISODE_SELECTOR, ".episode-item"))
            .enumerate()
            .filter_map(|(idx, ep)| {
                let link = ep.select(html::selector(&LINK_SELECTOR, "a")).next()?;
                let href = link.attr("href")?;
                let title = html::element_text(&link);

                Some(ContentMediaItem {
                    number: text::get_int_from_text(&title).unwrap_or(idx as u32 + 1),
                    title,
                    season: Some(season_idx as u32 + 1),
                    params: vec![text::extract_id_from_url(href)],
                    ..Default::default()
                })
            });
        episodes.extend(items);
    }

    if episodes.is_empty() {
        episodes = root
            .select(html::selector(&FALLBACK_SELECTOR, "a[href*='/episode/']"))
            .filter_map(|link| {
                let href = link.attr("href")?;
                let title = html::element_text(&link);
                let season_episode = text::extract_season_episode(&title);

                Some(ContentMediaItem {
                    number: season_episode.map(|(_, e)| e).unwrap_or_default(),
                    season: season_episode.map(|(s, _)| s),
                    title,
                    params: vec![text::extract_id_from_url(href)],
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
        title: html::fallback_text(&["h1", "title"]),
        original_title: html::default_value(),
        image: html::attr_value("figure.single-post-thumbnail img", "src"),
        description: html::text_value(".entry-content p"),
        content_type: html::ExtractValue::new(|root| {
            static SEASONS_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
            let has_seasons = root
                .select(html::selector(&SEASONS_SELECTOR, ".seasons-and-episodes"))
                .next()
                .is_some();

            if has_seasons {
                ContentType::Series
            } else {
                ContentType::Movie
            }
        })
        .into(),
        year: html::TextValue::new()
            .all_nodes()
            .itr_scope(".post-meta span")
            .map(|texts| text::extract_year(&texts.join(" ")))
            .into(),
        duration: html::default_value(),
        status: html::default_value(),
        mal_id: html::default_value(),
        tags: html::texts_value(".post-meta .category a, .genres a"),
        additional_info: html::default_value(),
        similar: html::default_value(),
        media_items: html::ExtractValue::new(|root| Some(parse_episodes(root))).into(),
        params: html::default_value(),
    })
}

fn parse_content_details(page: &str, id: &str) -> ContentDetails {
    let mut details = utils::process_html(page, content_details_processor());

    if details.content_type == ContentType::Movie {
        details.media_items = Some(vec![super::movie_media_item(&details.title, id)]);
    }

    details
}

fn get_channels_map() -> &'static IndexMap<&'static str, String> {
    static CHANNELS_MAP: OnceLock<IndexMap<&'static str, String>> = OnceLock::new();
    CHANNELS_MAP.get_or_init(|| {
        IndexMap::from([
            ("Movies", format!("{URL}/category/movies/page/")),
            ("Series", format!("{URL}/category/series/page/")),
            ("Trending", format!("{URL}/trending/page/")),
            ("Popular", format!("{URL}/popular/page/")),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
            <article class="item">
                <img data-lazy-src="https://egibest.net/wp-content/dune.jpg" src="data:image/gif;base64,R0lG">
                <h3><a href="https://egibest.net/movie/dune-part-two/">Dune: Part Two</a></h3>
                <span class="post-type">Movie</span>
            </article>
            <article class="item">
                <img src="https://egibest.net/wp-content/shogun.jpg">
                <h2><a href="https://egibest.net/series/shogun/">Shogun</a></h2>
            </article>
            <article class="item"><span>ad</span></article>
        </body></html>
    "#;

    const SERIES: &str = r#"
        <html><head><title>Shogun - EgiBest</title></head><body>
            <h1>Shogun</h1>
            <figure class="single-post-thumbnail"><img src="https://egibest.net/wp-content/shogun.jpg"></figure>
            <div class="post-meta"><span>دراما</span><span>2024</span></div>
            <div class="entry-content"><p>Feudal Japan.</p></div>
            <div class="seasons-and-episodes">
                <div class="season">
                    <div class="episode-item"><a href="https://egibest.net/episode/shogun-1x1/">الحلقة 1</a></div>
                    <div class="episode-item"><a href="https://egibest.net/episode/shogun-1x2/">الحلقة 2</a></div>
                </div>
                <div class="season">
                    <div class="episode-item"><a href="https://egibest.net/episode/shogun-2x1/">الحلقة 1</a></div>
                    <div class="episode-item"><a href="https://egibest.net/episode/shogun-2x1/">الحلقة 1</a></div>
                </div>
            </div>
        </body></html>
    "#;

    #[test]
    fn should_parse_listing_cards() {
        let items = utils::process_html(LISTING, content_info_items_processor());

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "movie/dune-part-two/");
        assert_eq!(items[0].title, "Dune: Part Two");
        assert_eq!(items[0].image, "https://egibest.net/wp-content/dune.jpg");
        assert_eq!(items[0].content_type, ContentType::Movie);
        assert_eq!(items[1].title, "Shogun");
        assert_eq!(items[1].content_type, ContentType::Series);
    }

    #[test]
    fn should_parse_series_seasons() {
        let details = parse_content_details(SERIES, "series/shogun/");

        assert_eq!(details.title, "Shogun");
        assert_eq!(details.year, Some(2024));
        assert_eq!(details.content_type, ContentType::Series);
        assert_eq!(details.description, "Feudal Japan.");

        let items = details.media_items.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].season, Some(2));
        assert_eq!(items[2].number, 1);
        assert_eq!(items[2].params, vec!["episode/shogun-2x1/".to_owned()]);
    }

    #[test]
    fn should_fall_back_to_episode_links() {
        let page = r#"<html><body><h1>Show</h1><div class="seasons-and-episodes"></div>
            <a href="https://egibest.net/episode/show-s01e01/">Show S01E01</a>
            <a href="https://egibest.net/episode/show-s02e05/">Show S02E05</a>
        </body></html>"#;

        let items = parse_content_details(page, "series/show/").media_items.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[1].season, Some(2));
        assert_eq!(items[1].number, 5);
    }

    #[test]
    fn should_use_movie_page_as_single_item() {
        let page = r#"<html><head><title>Dune - EgiBest</title></head><body><div class="entry-content"><p>Arrakis.</p></div></body></html>"#;
        let details = parse_content_details(page, "movie/dune/");

        assert_eq!(details.title, "Dune - EgiBest");
        assert_eq!(details.content_type, ContentType::Movie);
        assert_eq!(
            details.media_items,
            Some(vec![super::super::movie_media_item("Dune - EgiBest", "movie/dune/")])
        );
    }

    #[test]
    fn should_collect_page_links() {
        let page = r#"<html><body>
            <a href="https://mixdrop.ps/f/abc?download=1">Download</a>
            <a href="https://streamwish.to/e/xyz?embed">Embed</a>
            <a href="https://streamwish.to/e/xyz?embed">Embed again</a>
            <iframe src="//www.mp4upload.com/embed-1.html"></iframe>
            <script src="/wp-includes/js/jquery.js"></script>
            <script>var player = {file: "https://cdn.egibest.net/v/ep1.m3u8?token=1"};</script>
        </body></html>"#;

        assert_eq!(
            parse_page_links(page),
            PageLinks {
                embeds: vec![
                    "https://mixdrop.ps/f/abc?download=1".into(),
                    "https://streamwish.to/e/xyz?embed".into(),
                    "https://www.mp4upload.com/embed-1.html".into(),
                ],
                direct: vec!["https://cdn.egibest.net/v/ep1.m3u8?token=1".into()],
            }
        );
    }
}
