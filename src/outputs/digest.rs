//! Weekly digest rendering.
//!
//! Turns the week's accumulated [`ArticleRecord`]s into one HTML e-mail body.
//! Sections follow [`Category::ALL`]; entries keep their input order inside a
//! section.
//!
//! # Output Structure
//!
//! ```text
//! <h1>Tygodniowe podsumowanie z Infopiguły</h1>
//! <p class="week">05.10.2026 - 11.10.2026</p>
//! <h2>Polska</h2>
//! <ul>
//!   <li><a href="…">title</a><p>summary</p></li>
//! </ul>
//! <h2>Świat</h2>
//! …
//! ```
//!
//! Rendering is a pure function of its inputs: the same records and week give
//! byte-identical documents.

use crate::models::{ArticleRecord, Category, Document};
use crate::utils::escape_html;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Shown instead of any section when the whole week collected nothing.
pub const EMPTY_DIGEST_NOTICE: &str = "Brak nowych artykułów w tym tygodniu.";

const HEADING: &str = "Tygodniowe podsumowanie z Infopiguły";
const SUBJECT_PREFIX: &str = "Infopiguła Podsumowanie Tygodnia";

#[derive(Debug, Default, Clone, Copy)]
pub struct DigestComposer;

impl DigestComposer {
    /// Render `records` as the digest for the week ending on `week_ending`.
    #[instrument(level = "info", skip_all, fields(records = records.len(), %week_ending))]
    pub fn compose(&self, records: &[ArticleRecord], week_ending: NaiveDate) -> Document {
        let mut groups: BTreeMap<Category, Vec<&ArticleRecord>> =
            Category::ALL.iter().map(|&c| (c, Vec::new())).collect();
        for record in records {
            groups.entry(record.category).or_default().push(record);
        }
        let counts: BTreeMap<Category, usize> =
            groups.iter().map(|(&c, entries)| (c, entries.len())).collect();

        let week_start = week_ending - Duration::days(6);
        let subject = format!("{} - {}", SUBJECT_PREFIX, week_ending.format("%Y-%m-%d"));

        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"UTF-8\">\n");
        html.push_str(&format!("  <title>{}</title>\n", escape_html(&subject)));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("  <h1>{HEADING}</h1>\n"));
        html.push_str(&format!(
            "  <p class=\"week\">{} - {}</p>\n",
            week_start.format("%d.%m.%Y"),
            week_ending.format("%d.%m.%Y")
        ));

        if records.is_empty() {
            html.push_str(&format!("  <p class=\"empty\">{EMPTY_DIGEST_NOTICE}</p>\n"));
        } else {
            for (category, entries) in &groups {
                render_section(&mut html, *category, entries);
            }
        }

        html.push_str("</body>\n</html>\n");

        debug!(bytes = html.len(), ?counts, "Composed digest");
        Document {
            subject,
            html,
            counts,
        }
    }
}

fn render_section(html: &mut String, category: Category, entries: &[&ArticleRecord]) {
    html.push_str(&format!("  <h2>{}</h2>\n", category.label()));

    if entries.is_empty() {
        html.push_str(&format!("  <p class=\"empty\">{}</p>\n", category.empty_notice()));
        return;
    }

    html.push_str("  <ul>\n");
    for entry in entries {
        html.push_str(&format!(
            "    <li><a href=\"{}\">{}</a>",
            escape_html(&entry.url),
            escape_html(&entry.title)
        ));
        if let Some(summary) = &entry.summary {
            html.push_str(&format!("<p>{}</p>", escape_html(summary)));
        }
        html.push_str("</li>\n");
    }
    html.push_str("  </ul>\n");
}
