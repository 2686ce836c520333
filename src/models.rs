//! Data models for collected articles and the composed weekly digest.
//!
//! - [`Category`]: the two fixed Infopiguła sections
//! - [`ArticleRecord`]: one normalized listing entry, keyed by URL
//! - [`Document`]: the rendered weekly digest handed to the mailer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A news section tracked on the source page.
///
/// The derived ordering is the display order used in the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Polska")]
    Polska,
    #[serde(rename = "Świat")]
    Swiat,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 2] = [Category::Polska, Category::Swiat];

    /// Human-readable section name as shown on the site.
    pub fn label(self) -> &'static str {
        match self {
            Category::Polska => "Polska",
            Category::Swiat => "Świat",
        }
    }

    /// Tab anchor on the listing page.
    pub fn anchor(self) -> &'static str {
        match self {
            Category::Polska => "poland",
            Category::Swiat => "global",
        }
    }

    /// Message shown in the digest when a section collected nothing.
    pub fn empty_notice(self) -> &'static str {
        match self {
            Category::Polska => "Brak wiadomości z Polski w tym tygodniu.",
            Category::Swiat => "Brak wiadomości ze Świata w tym tygodniu.",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single article entry collected from a listing page.
///
/// Identity is the `url`; the store never holds two records with the same one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub category: Category,
    pub collected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A rendered digest ready to be mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub subject: String,
    pub html: String,
    /// Number of entries rendered per section, for every category.
    pub counts: BTreeMap<Category, usize>,
}

impl Document {
    /// Total number of articles rendered into the document.
    pub fn article_count(&self) -> usize {
        self.counts.values().sum()
    }
}
