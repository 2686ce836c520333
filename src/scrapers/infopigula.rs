//! Infopiguła listing scraper.
//!
//! Each section is a tab on the same single-page app. The listing URL for a
//! section is the source URL with the tab anchor as its route
//! (`https://infopigula.pl/#/poland`, `https://infopigula.pl/#/global`).
//!
//! # Markup
//!
//! ```html
//! <div class="article__item" id="8f3c…">
//!   <div class="article__content"><span>Text of the news item…</span></div>
//! </div>
//! ```
//!
//! Entries are only taken from the tab container of the requested section
//! (`#poland` / `#global`). A plain GET ignores the route fragment, so both
//! sections may receive the same page; items outside the container cannot be
//! attributed to a section and are ignored.

use crate::errors::FetchError;
use crate::fetch::PageFetcher;
use crate::models::{ArticleRecord, Category};
use crate::utils::{MAX_DERIVED_TITLE_CHARS, collapse_whitespace, first_sentence, truncate_for_log};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse(".article__content").expect("static selector"));
static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("static selector"));
static HEADING: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".article__title, h1, h2, h3, h4, strong, b").expect("static selector")
});
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static POLAND_TAB: Lazy<Selector> = Lazy::new(|| Selector::parse("#poland").expect("static selector"));
static GLOBAL_TAB: Lazy<Selector> = Lazy::new(|| Selector::parse("#global").expect("static selector"));
static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse(".article__item").expect("static selector"));

/// Tab container of `category`.
fn tab_of(category: Category) -> &'static Selector {
    match category {
        Category::Polska => &POLAND_TAB,
        Category::Swiat => &GLOBAL_TAB,
    }
}

/// Collects the current listing entries of the source.
#[derive(Debug)]
pub struct Scraper<F> {
    fetcher: F,
    source_url: Url,
}

impl<F> Scraper<F>
where
    F: PageFetcher,
{
    pub fn new(fetcher: F, source_url: Url) -> Self {
        Self { fetcher, source_url }
    }

    /// Listing page for one section.
    pub fn category_url(&self, category: Category) -> Url {
        let mut url = self.source_url.clone();
        url.set_fragment(Some(&format!("/{}", category.anchor())));
        url
    }

    /// Collect every visible entry of the given sections.
    ///
    /// Never fails as a whole: a section whose page cannot be loaded or read
    /// contributes nothing and is logged. Duplicate URLs within the pass are
    /// dropped, keeping the first occurrence.
    #[instrument(level = "info", skip_all, fields(categories = ?categories))]
    pub async fn collect(&self, categories: &[Category]) -> Vec<ArticleRecord> {
        let per_category: Vec<Vec<ArticleRecord>> = stream::iter(categories.iter().copied().unique())
            .then(|category| async move {
                match self.collect_category(category).await {
                    Ok(records) => {
                        info!(%category, count = records.len(), "Collected section");
                        records
                    }
                    Err(e) => {
                        warn!(%category, error = %e, "Section failed; it yields no articles this pass");
                        Vec::new()
                    }
                }
            })
            .collect()
            .await;

        let records: Vec<ArticleRecord> = per_category
            .into_iter()
            .flatten()
            .unique_by(|r| r.url.clone())
            .collect();
        info!(count = records.len(), "Collection pass finished");
        records
    }

    async fn collect_category(&self, category: Category) -> Result<Vec<ArticleRecord>, FetchError> {
        let url = self.category_url(category);
        let html = self.fetcher.fetch_page(&url).await?;
        extract_entries(&html, &url, category, Utc::now())
    }
}

/// Turn a rendered listing page into records for `category`.
///
/// Missing listing markup is not an error: a page without the section's tab
/// container, or a container without entries, means zero entries. Only an
/// empty response is treated as unparsable.
pub fn extract_entries(
    html: &str,
    page_url: &Url,
    category: Category,
    collected_at: DateTime<Utc>,
) -> Result<Vec<ArticleRecord>, FetchError> {
    if html.trim().is_empty() {
        return Err(FetchError::Parse {
            url: page_url.to_string(),
            reason: "empty response".to_string(),
        });
    }

    let document = Html::parse_document(html);

    let Some(tab) = document.select(tab_of(category)).next() else {
        warn!(
            url = %page_url,
            %category,
            preview = %truncate_for_log(&collapse_whitespace(html), 200),
            "Section container not found on page"
        );
        return Ok(Vec::new());
    };

    let items: Vec<ElementRef> = tab.select(&ITEM).collect();
    if items.is_empty() {
        warn!(
            url = %page_url,
            preview = %truncate_for_log(&collapse_whitespace(html), 200),
            "No listing entries found on page"
        );
        return Ok(Vec::new());
    }

    let records: Vec<ArticleRecord> = items
        .into_iter()
        .filter_map(|item| entry_from_item(item, page_url, category, collected_at))
        .collect();
    debug!(url = %page_url, count = records.len(), "Extracted entries");
    Ok(records)
}

fn entry_from_item(
    item: ElementRef,
    page_url: &Url,
    category: Category,
    collected_at: DateTime<Utc>,
) -> Option<ArticleRecord> {
    let content = item.select(&CONTENT).next()?;
    let body_el = content.select(&SPAN).next().unwrap_or(content);
    let body = collapse_whitespace(&body_el.text().collect::<Vec<_>>().join(" "));

    let heading = item
        .select(&HEADING)
        .map(|h| collapse_whitespace(&h.text().collect::<Vec<_>>().join(" ")))
        .find(|t| !t.is_empty());
    let title = match heading {
        Some(t) => t,
        None if !body.is_empty() => first_sentence(&body, MAX_DERIVED_TITLE_CHARS),
        None => return None,
    };

    let url = link_of(item, page_url).or_else(|| {
        let id = item.value().attr("id").filter(|id| !id.trim().is_empty())?;
        let mut url = page_url.clone();
        url.set_fragment(Some(&format!("/{}/{}", category.anchor(), id.trim())));
        Some(url.to_string())
    })?;

    let summary = (!body.is_empty() && body != title).then_some(body);

    Some(ArticleRecord {
        title,
        url,
        category,
        collected_at,
        summary,
    })
}

/// First outbound http(s) link of an entry, resolved against the page.
fn link_of(item: ElementRef, page_url: &Url) -> Option<String> {
    item.select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty() && !href.starts_with('#'))
        .filter_map(|href| page_url.join(href.trim()).ok())
        .find(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
}
