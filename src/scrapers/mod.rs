//! News source scrapers.
//!
//! The service follows exactly one source, [Infopiguła](https://infopigula.pl),
//! and two of its sections ([`Category::Polska`](crate::models::Category) and
//! [`Category::Swiat`](crate::models::Category)).
//!
//! # Pattern
//!
//! 1. **Fetching**: load each section's listing page through the injected
//!    [`PageFetcher`](crate::fetch::PageFetcher)
//! 2. **Extraction**: turn the visible `.article__item` entries into
//!    [`ArticleRecord`](crate::models::ArticleRecord)s
//!
//! A section that fails to load, or whose markup no longer matches, yields no
//! records and a warning; the other section is still collected.

pub mod infopigula;

pub use infopigula::Scraper;
