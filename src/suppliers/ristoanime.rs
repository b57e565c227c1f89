use std::sync::OnceLock;

use anyhow::anyhow;
use indexmap::IndexMap;
use log::warn;
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

const URL: &str = "https://ristoanime.org";
const NAME: &str = "RistoAnime";

#[derive(Default)]
pub struct RistoAnimeContentSupplier;

impl ContentSupplier for RistoAnimeContentSupplier {
    fn get_channels(&self) -> Vec<String> {
        super::channel_names(get_channels_map())
    }

    fn get_default_channels(&self) -> Vec<String> {
        vec!["أقسام الأنمي".into()]
    }

    fn get_supported_types(&self) -> Vec<ContentType> {
        vec![ContentType::Anime, ContentType::AnimeMovie]
    }

    fn get_supported_languages(&self) -> Vec<String> {
        vec!["ar".into()]
    }

    async fn search(&self, query: String) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = url::Url::parse_with_params(&format!("{URL}/"), &[("s", query.as_str())])?;
        let page = load_page(url.as_str(), None).await?;

        Ok(parse_cards(
            &page,
            ".SearchInnerList article, .PostList article, article",
        ))
    }

    async fn load_channel(
        &self,
        channel: String,
        page: u16,
    ) -> Result<Vec<ContentInfo>, anyhow::Error> {
        let url = super::get_channel_url(get_channels_map(), &channel, page)?;
        let page = load_page(&url, None).await?;

        Ok(parse_cards(&page, "article, .PostList article, .Bpage article"))
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
        let page = load_page(&page_url, None).await?;
        let links = parse_watch_links(&page);

        let mut results = match &links.iframe {
            Some(iframe) => load_player_sources(iframe, &page_url).await,
            None => vec![],
        };

        results.extend(
            links
                .downloads
                .iter()
                .map(|link| extractors::direct_link(link, &page_url, &format!("{NAME} Direct"), None)),
        );

        Ok(results)
    }
}

fn retry_policy() -> &'static RetryPolicy {
    static RETRY_POLICY: OnceLock<RetryPolicy> = OnceLock::new();
    RETRY_POLICY.get_or_init(RetryPolicy::default)
}

async fn load_page(url: &str, referer: Option<&str>) -> anyhow::Result<String> {
    retry::fetch_html(url, referer, retry_policy()).await
}

fn parse_card(el: &ElementRef) -> Option<ContentInfo> {
    static LINK_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static IMAGE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static TITLE_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let href = el
        .select(html::selector(&LINK_SELECTOR, "a"))
        .next()?
        .attr("href")?;
    let image = el.select(html::selector(&IMAGE_SELECTOR, "img")).next()?;

    let title = match image.attr("alt").map(str::trim) {
        Some(alt) if !alt.is_empty() => alt.to_owned(),
        _ => el
            .select(html::selector(&TITLE_SELECTOR, ".title"))
            .next()
            .map(|t| html::element_text(&t))?,
    };

    let image = image
        .attr("data-src")
        .filter(|src| !src.is_empty())
        .or_else(|| image.attr("src"))
        .map(|src| html::complete_image_url(URL, src))
        .unwrap_or_default();

    Some(ContentInfo {
        id: text::extract_id_from_url(href),
        title,
        secondary_title: None,
        image,
        content_type: ContentType::Anime,
        year: None,
    })
}

/// Listing selectors overlap, the same article is matched more than once.
fn parse_cards(page: &str, selectors: &str) -> Vec<ContentInfo> {
    let processor = html::ItemsProcessor::new(selectors, html::ExtractValue::new(parse_card).into());
    let items = utils::process_html(page, &processor);

    super::dedup_content_infos(items.into_iter().flatten().collect())
}

#[derive(Debug, PartialEq)]
struct SeasonLink {
    url: String,
    season: u32,
}

fn content_details_processor() -> &'static html::ContentDetailsProcessor {
    static CONTENT_DETAILS_PROCESSOR: OnceLock<html::ContentDetailsProcessor> = OnceLock::new();
    CONTENT_DETAILS_PROCESSOR.get_or_init(|| html::ContentDetailsProcessor {
        title: html::text_value("h1.Title, .Title"),
        original_title: html::default_value(),
        image: html::MapValue::new(
            |src: String| html::complete_image_url(URL, &src),
            html::fallback_attr(&[
                ("div.Image img, .Image img", "data-src"),
                ("div.Image img, .Image img", "src"),
            ]),
        )
        .into(),
        description: html::text_value("div.Description p, .Description p"),
        content_type: html::const_value(ContentType::Anime),
        year: html::default_value(),
        duration: html::default_value(),
        status: html::default_value(),
        mal_id: html::default_value(),
        tags: html::default_value(),
        additional_info: html::default_value(),
        similar: html::default_value(),
        media_items: html::ExtractValue::new(|root| Some(parse_episode_links(root, 1, false)))
            .into(),
        params: html::default_value(),
    })
}

/// Episode anchors of a listing. Season pages get generated titles.
fn parse_episode_links(root: &ElementRef, season: u32, season_page: bool) -> Vec<ContentMediaItem> {
    static EPISODES_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static SEASON_EPISODES_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let selector = if season_page {
        html::selector(&SEASON_EPISODES_SELECTOR, ".EpisodesList a, .episode-item a")
    } else {
        html::selector(
            &EPISODES_SELECTOR,
            ".EpisodesList a, .episode-item a, #watch li a",
        )
    };

    root.select(selector)
        .filter_map(|a| {
            let href = text::fix_url(URL, a.attr("href")?)?;
            let label = html::element_text(&a);
            let number = text::get_int_from_text(&label).unwrap_or_default();

            Some(ContentMediaItem {
                title: if season_page {
                    format!("الموسم {season} الحلقة {number}")
                } else {
                    label
                },
                number,
                season: Some(season),
                params: vec![text::extract_id_from_url(&href)],
                ..Default::default()
            })
        })
        .collect()
}

fn parse_season_links(root: &ElementRef) -> Vec<SeasonLink> {
    static SEASONS_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    root.select(html::selector(
        &SEASONS_SELECTOR,
        ".SeasonsList li a, .season-item a",
    ))
    .filter_map(|a| {
        Some(SeasonLink {
            url: text::fix_url(URL, a.attr("href")?)?,
            season: a
                .attr("data-season")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(1),
        })
    })
    .collect()
}

/// Details with the episodes listed on the page itself, and the season
/// pages that still have to be loaded.
fn parse_content_details(page: &str) -> anyhow::Result<(ContentDetails, Vec<SeasonLink>)> {
    let document = scraper::Html::parse_document(page);
    let root = document.root_element();

    let mut details = content_details_processor().process(&root);
    if details.title.is_empty() {
        return Err(anyhow!("[ristoanime] No title found"));
    }

    let seasons = parse_season_links(&root);
    if !seasons.is_empty() {
        details.media_items = None;
    }

    Ok((details, seasons))
}

fn parse_season_page(page: &str, season: u32) -> Vec<ContentMediaItem> {
    let document = scraper::Html::parse_document(page);
    let episodes = parse_episode_links(&document.root_element(), season, true);
    episodes
}

async fn load_content_details(id: &str) -> anyhow::Result<ContentDetails> {
    let url = text::format_id_to_url(URL, id);
    let page = load_page(&url, None).await?;
    let (mut details, seasons) = parse_content_details(&page)?;

    let mut episodes = details.media_items.take().unwrap_or_default();

    let referer = url.as_str();
    let season_futures = seasons.iter().map(|link| async move {
        match load_page(&link.url, Some(referer)).await {
            Ok(season_page) => parse_season_page(&season_page, link.season),
            Err(err) => {
                warn!("[ristoanime] skipping season {}: {err}", link.url);
                vec![]
            }
        }
    });
    episodes.extend(
        futures::future::join_all(season_futures)
            .await
            .into_iter()
            .flatten(),
    );

    finish_details(&mut details, episodes, id);
    Ok(details)
}

fn finish_details(details: &mut ContentDetails, episodes: Vec<ContentMediaItem>, id: &str) {
    if episodes.is_empty() {
        details.content_type = ContentType::AnimeMovie;
        details.media_items = Some(vec![super::movie_media_item(&details.title, id)]);
        return;
    }

    let mut episodes = super::dedup_media_items(episodes);
    episodes.sort_by_key(|ep| (ep.season.unwrap_or_default(), ep.number));
    details.media_items = Some(episodes);
}

#[derive(Debug, Default, PartialEq)]
struct WatchLinks {
    iframe: Option<String>,
    downloads: Vec<String>,
}

fn parse_watch_links(page: &str) -> WatchLinks {
    static IFRAME_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();
    static DOWNLOAD_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);

    let iframe = document
        .select(html::selector(
            &IFRAME_SELECTOR,
            "iframe[src*=watch], .WatchIframe iframe, #player iframe",
        ))
        .filter_map(|el| el.attr("src"))
        .find_map(|src| text::fix_url(URL, src));

    let mut downloads: Vec<String> = vec![];
    let links = document
        .select(html::selector(
            &DOWNLOAD_SELECTOR,
            "a[href*=download], a[href*=dl], .DownloadLink",
        ))
        .filter_map(|a| a.attr("href"))
        .filter(|href| href.contains("download") || href.contains(".mp4") || href.contains(".mkv"))
        .filter_map(|href| text::fix_url(URL, href));
    for link in links {
        if !downloads.contains(&link) {
            downloads.push(link);
        }
    }

    WatchLinks { iframe, downloads }
}

fn find_video_source(page: &str) -> Option<String> {
    static VIDEO_SELECTOR: OnceLock<scraper::Selector> = OnceLock::new();

    let document = scraper::Html::parse_document(page);
    let src = document
        .select(html::selector(
            &VIDEO_SELECTOR,
            "video source[src], #player video source",
        ))
        .filter_map(|el| el.attr("src"))
        .find_map(|src| text::fix_url(URL, src));

    src
}

async fn load_player_sources(iframe_url: &str, referer: &str) -> Vec<ContentMediaItemSource> {
    let page = match load_page(iframe_url, Some(referer)).await {
        Ok(page) => page,
        Err(err) => {
            warn!("[ristoanime] player {iframe_url} failed: {err}");
            return vec![];
        }
    };

    if let Some(master) = hls::find_master_playlist(&page) {
        match hls::expand_master_playlist(&master, referer, NAME).await {
            Ok(sources) => return sources,
            Err(err) => warn!("[ristoanime] master playlist {master} failed: {err}"),
        }
    }

    find_video_source(&page)
        .map(|src| vec![extractors::direct_link(&src, referer, NAME, None)])
        .unwrap_or_default()
}

fn get_channels_map() -> &'static IndexMap<&'static str, String> {
    static CHANNELS_MAP: OnceLock<IndexMap<&'static str, String>> = OnceLock::new();
    CHANNELS_MAP.get_or_init(|| {
        IndexMap::from([
            ("أقسام الأنمي", format!("{URL}/category/anime/page/")),
            ("المستمرة", format!("{URL}/genre/ongoing/page/")),
            ("المكتملة", format!("{URL}/genre/completed/page/")),
            ("شائع", format!("{URL}/trending/page/")),
            ("المضافة حديثاً", format!("{URL}/latest_additions/page/")),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body><div class="PostList">
            <article>
                <a href="https://ristoanime.org/anime/frieren/">
                    <img data-src="https://ristoanime.org/wp-content/frieren.jpg" alt="Sousou no Frieren">
                </a>
            </article>
            <article>
                <a href="https://ristoanime.org/anime/dandadan/">
                    <img src="/wp-content/dandadan.jpg" alt="">
                    <div class="title">Dandadan</div>
                </a>
            </article>
            <article><a href="https://ristoanime.org/news/1/">No image</a></article>
        </div></body></html>
    "#;

    #[test]
    fn should_parse_cards() {
        let items = parse_cards(LISTING, "article, .PostList article, .Bpage article");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "anime/frieren/");
        assert_eq!(items[0].title, "Sousou no Frieren");
        assert_eq!(items[0].image, "https://ristoanime.org/wp-content/frieren.jpg");
        assert_eq!(items[0].content_type, ContentType::Anime);
        assert_eq!(items[1].title, "Dandadan");
        assert_eq!(items[1].image, "https://ristoanime.org/wp-content/dandadan.jpg");
    }

    #[test]
    fn should_require_title() {
        let result = parse_content_details("<html><body><p>empty</p></body></html>");
        assert!(result.is_err());
    }

    #[test]
    fn should_parse_single_season_episodes() {
        let page = r#"<html><body>
            <h1 class="Title">Frieren</h1>
            <div class="Image"><img src="https://ristoanime.org/wp-content/frieren-poster.jpg"></div>
            <div class="Description"><p>After the demon king.</p></div>
            <div class="EpisodesList">
                <a href="https://ristoanime.org/watch/frieren-2/">الحلقة 2</a>
                <a href="https://ristoanime.org/watch/frieren-1/">الحلقة 1</a>
            </div>
        </body></html>"#;

        let (mut details, seasons) = parse_content_details(page).unwrap();
        assert!(seasons.is_empty());
        assert_eq!(details.title, "Frieren");
        assert_eq!(details.image, "https://ristoanime.org/wp-content/frieren-poster.jpg");
        assert_eq!(details.description, "After the demon king.");

        let episodes = details.media_items.take().unwrap();
        finish_details(&mut details, episodes, "anime/frieren/");

        let items = details.media_items.unwrap();
        assert_eq!(details.content_type, ContentType::Anime);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].number, 1);
        assert_eq!(items[0].title, "الحلقة 1");
        assert_eq!(items[0].params, vec!["watch/frieren-1/".to_owned()]);
    }

    #[test]
    fn should_list_season_pages() {
        let page = r#"<html><body>
            <h1 class="Title">Attack on Titan</h1>
            <ul class="SeasonsList">
                <li><a href="/season/aot-1/" data-season="1">S1</a></li>
                <li><a href="/season/aot-2/" data-season="2">S2</a></li>
            </ul>
        </body></html>"#;

        let (details, seasons) = parse_content_details(page).unwrap();

        assert_eq!(details.media_items, None);
        assert_eq!(
            seasons,
            vec![
                SeasonLink { url: "https://ristoanime.org/season/aot-1/".into(), season: 1 },
                SeasonLink { url: "https://ristoanime.org/season/aot-2/".into(), season: 2 },
            ]
        );
    }

    #[test]
    fn should_title_season_page_episodes() {
        let page = r#"<div class="EpisodesList"><a href="/watch/aot-s2-e3/">حلقة 3</a></div>"#;

        let items = parse_season_page(page, 2);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "الموسم 2 الحلقة 3");
        assert_eq!(items[0].season, Some(2));
        assert_eq!(items[0].number, 3);
    }

    #[test]
    fn should_fall_back_to_movie() {
        let mut details = ContentDetails {
            title: "Suzume".into(),
            ..Default::default()
        };

        finish_details(&mut details, vec![], "anime/suzume/");

        assert_eq!(details.content_type, ContentType::AnimeMovie);
        assert_eq!(
            details.media_items,
            Some(vec![super::super::movie_media_item("Suzume", "anime/suzume/")])
        );
    }

    #[test]
    fn should_collect_watch_links() {
        let page = r#"<html><body>
            <div class="WatchIframe"><iframe src="https://ristoanime.org/watch/player.php?id=5"></iframe></div>
            <a href="https://files.example.com/download/ep5.mp4">Download</a>
            <a href="https://files.example.com/dl/ep5.mkv">Mirror</a>
            <a class="DownloadLink" href="https://ristoanime.org/contact/">Contact</a>
        </body></html>"#;

        assert_eq!(
            parse_watch_links(page),
            WatchLinks {
                iframe: Some("https://ristoanime.org/watch/player.php?id=5".into()),
                downloads: vec![
                    "https://files.example.com/download/ep5.mp4".into(),
                    "https://files.example.com/dl/ep5.mkv".into(),
                ],
            }
        );
    }

    #[test]
    fn should_find_video_source() {
        let page = r#"<div id="player"><video><source src="//cdn.example.com/ep5.mp4"></video></div>"#;
        assert_eq!(
            find_video_source(page),
            Some("https://cdn.example.com/ep5.mp4".into())
        );
    }
}
