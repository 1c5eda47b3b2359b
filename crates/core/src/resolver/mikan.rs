//! Mikan page scraper.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::FeedConfig;
use crate::metrics;

use super::{ResolverError, SubjectResolver};

const ANIME_LINK_SELECTOR: &str = "#sk-container .bangumi-title a";
const BANGUMI_INFO_SELECTOR: &str = "#sk-container .bangumi-info";
const SEARCH_RESULT_SELECTOR: &str = "#sk-container .central-container ul li";

/// Resolves subjects by scraping Mikan episode and anime pages.
pub struct MikanResolver {
    client: Client,
    site_url: Url,
}

impl MikanResolver {
    pub fn new(config: &FeedConfig) -> Result<Self, ResolverError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs as u64));
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ResolverError::InvalidUrl(format!("proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ResolverError::Request(e.to_string()))?;

        Ok(Self {
            client,
            site_url: site_root(&config.site_url)?,
        })
    }

    async fn fetch_page(&self, operation: &str, url: &str) -> Result<String, ResolverError> {
        if url.trim().is_empty() {
            return Err(ResolverError::InvalidUrl("empty page URL".to_string()));
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ResolverError::Request(format!("{}: {}", url, e)))?;
        let status = response.status();
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["mikan", operation, status.as_str()])
            .inc();
        if !status.is_success() {
            return Err(ResolverError::Request(format!("HTTP {} from {}", status, url)));
        }
        response
            .text()
            .await
            .map_err(|e| ResolverError::Request(format!("{}: {}", url, e)))
    }

    /// Search the site for an anime and return the first hit's page URL.
    pub async fn search_anime_page(&self, keyword: &str) -> Result<Option<String>, ResolverError> {
        let mut url = self
            .site_url
            .join("Home/Search")
            .map_err(|e| ResolverError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("searchstr", keyword.trim());
        let body = self.fetch_page("search", url.as_str()).await?;
        let page = parse_search_result(&body, &self.site_url);
        debug!(keyword, anime_page = ?page, "Searched anime page");
        Ok(page)
    }
}

#[async_trait]
impl SubjectResolver for MikanResolver {
    async fn resolve_anime_page(&self, episode_page_url: &str) -> Result<String, ResolverError> {
        let body = self.fetch_page("episode_page", episode_page_url).await?;
        let base = Url::parse(episode_page_url)
            .map_err(|e| ResolverError::InvalidUrl(format!("{}: {}", episode_page_url, e)))?;
        let anime_page = parse_anime_page_link(&body, &base).ok_or_else(|| {
            ResolverError::ElementNotFound(format!(
                "{} on episode page {}",
                ANIME_LINK_SELECTOR, episode_page_url
            ))
        })?;
        debug!(episode_page = %episode_page_url, anime_page = %anime_page, "Resolved anime page");
        Ok(anime_page)
    }

    async fn resolve_subject_page(&self, anime_page_url: &str) -> Result<String, ResolverError> {
        let body = self.fetch_page("anime_page", anime_page_url).await?;
        let base = Url::parse(anime_page_url)
            .map_err(|e| ResolverError::InvalidUrl(format!("{}: {}", anime_page_url, e)))?;
        let subject_page = parse_subject_page_link(&body, &base).ok_or_else(|| {
            ResolverError::ElementNotFound(format!(
                "Bangumi link on anime page {}",
                anime_page_url
            ))
        })?;
        debug!(anime_page = %anime_page_url, subject_page = %subject_page, "Resolved subject page");
        Ok(subject_page)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Site root with a trailing slash, so relative joins keep any path prefix.
fn site_root(site_url: &str) -> Result<Url, ResolverError> {
    let root = format!("{}/", site_url.trim().trim_end_matches('/'));
    Url::parse(&root).map_err(|e| ResolverError::InvalidUrl(format!("site {}: {}", site_url, e)))
}

/// Resolve `href` against the page it appeared on.
fn absolute_url(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}

fn non_blank_href(element: ElementRef<'_>) -> Option<&str> {
    element
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
}

/// Anime page link on an episode page.
pub fn parse_anime_page_link(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = selector(ANIME_LINK_SELECTOR)?;
    let link = document.select(&selector).next()?;
    non_blank_href(link).and_then(|href| absolute_url(base, href))
}

/// Subject page link on an anime page: the first link inside the info line
/// whose leading text mentions Bangumi. With several such lines the last wins.
pub fn parse_subject_page_link(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let info_selector = selector(BANGUMI_INFO_SELECTOR)?;
    let link_selector = selector("a")?;

    document
        .select(&info_selector)
        .filter(|info| {
            info.children()
                .filter_map(|node| node.value().as_text())
                .next()
                .map(|text| text.contains("Bangumi"))
                .unwrap_or(false)
        })
        .filter_map(|info| info.select(&link_selector).next())
        .last()
        .and_then(non_blank_href)
        .and_then(|href| absolute_url(base, href))
}

/// First anime page link in search results.
pub fn parse_search_result(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let item_selector = selector(SEARCH_RESULT_SELECTOR)?;
    let link_selector = selector("a")?;
    let item = document.select(&item_selector).next()?;
    let link = item.select(&link_selector).next()?;
    non_blank_href(link).and_then(|href| absolute_url(base, href))
}
