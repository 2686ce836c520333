//! The collect/digest pipeline and the state it owns.
//!
//! [`PipelineContext`] owns the article store, the scraper, the composer and
//! the mailer, plus the pending-digest flag. The scheduler hands it to one job
//! at a time, so every action below runs with exclusive (`&mut`) access to the
//! store.
//!
//! # Jobs
//!
//! - **Daily collection**: `store.append(scraper.collect(ALL))`, then a retry
//!   of a previously failed digest when the retry policy says so
//! - **Weekly digest**: `store.all()` → compose → send → `store.clear()`, the
//!   clear only after a successful send

use crate::cli::{EmptyDigestPolicy, SendRetryPolicy};
use crate::errors::{MailError, StorageError};
use crate::fetch::PageFetcher;
use crate::mailer::Mailer;
use crate::models::{ArticleRecord, Category};
use crate::outputs::digest::DigestComposer;
use crate::scrapers::Scraper;
use crate::store::ArticleStore;
use chrono::{Local, NaiveDate};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// What a weekly digest run ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    /// Delivered; the store was cleared.
    Sent { articles: usize },
    /// Nothing to send and the policy says to skip.
    Skipped,
}

/// Why a weekly digest run did not complete.
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("no recipient configured")]
    NoRecipient,

    #[error(transparent)]
    Mail(#[from] MailError),

    /// The digest went out but the store could not be emptied; the same
    /// articles will appear in the next digest.
    #[error("digest sent but store not cleared: {0}")]
    Clear(#[source] StorageError),
}

#[derive(Debug)]
pub struct PipelineContext<F, M> {
    pub store: ArticleStore,
    scraper: Scraper<F>,
    composer: DigestComposer,
    mailer: M,
    recipient: Option<String>,
    empty_digest: EmptyDigestPolicy,
    send_retry: SendRetryPolicy,
    /// Set when a weekly send failed and has not been retried successfully.
    pending_digest: bool,
}

impl<F, M> PipelineContext<F, M>
where
    F: PageFetcher,
    M: Mailer,
{
    pub fn new(
        store: ArticleStore,
        scraper: Scraper<F>,
        mailer: M,
        recipient: Option<String>,
        empty_digest: EmptyDigestPolicy,
        send_retry: SendRetryPolicy,
    ) -> Self {
        Self {
            store,
            scraper,
            composer: DigestComposer,
            mailer,
            recipient,
            empty_digest,
            send_retry,
            pending_digest: false,
        }
    }

    pub fn pending_digest(&self) -> bool {
        self.pending_digest
    }

    /// Daily job: collect every category into the store.
    ///
    /// Returns the number of new articles. A storage failure is logged and the
    /// collected records stay in memory for the next write.
    #[instrument(level = "info", skip_all)]
    pub async fn run_collection(&mut self) -> usize {
        let t0 = Instant::now();
        info!("Starting daily collection");

        let records = self.scraper.collect(&Category::ALL).await;
        let added = match self.store.append(records).await {
            Ok(added) => added,
            Err(e) => {
                error!(error = %e, in_memory = self.store.len(), "Could not persist collected articles; keeping them in memory");
                0
            }
        };

        info!(
            added,
            total = self.store.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Daily collection finished"
        );

        if self.pending_digest && self.send_retry == SendRetryPolicy::NextDailyTick {
            info!("Retrying the digest that failed to send");
            self.run_digest_logged().await;
        }
        added
    }

    /// Weekly job: compose the stored articles, send them, then clear the store.
    ///
    /// The store is only cleared after the mailer reports success; on any
    /// failure it is left exactly as it was.
    #[instrument(level = "info", skip_all)]
    pub async fn run_digest(&mut self) -> Result<DigestOutcome, DigestError> {
        self.run_digest_for(Local::now().date_naive()).await
    }

    pub async fn run_digest_for(&mut self, week_ending: NaiveDate) -> Result<DigestOutcome, DigestError> {
        info!(count = self.store.len(), "Starting weekly digest");

        if self.store.is_empty() && self.empty_digest == EmptyDigestPolicy::Skip {
            info!("No articles this week; skipping digest");
            self.pending_digest = false;
            return Ok(DigestOutcome::Skipped);
        }

        let records = self.store.all();
        let result = self.compose_and_send(&records, week_ending).await;
        self.pending_digest = matches!(
            result,
            Err(DigestError::Mail(_) | DigestError::NoRecipient)
        );
        result
    }

    async fn compose_and_send(
        &mut self,
        records: &[ArticleRecord],
        week_ending: NaiveDate,
    ) -> Result<DigestOutcome, DigestError> {
        let recipient = self.recipient.as_deref().ok_or(DigestError::NoRecipient)?;

        let document = self.composer.compose(records, week_ending);
        self.mailer.send(&document, recipient).await?;
        info!(articles = document.article_count(), %recipient, "Weekly digest sent");

        self.store.clear().await.map_err(DigestError::Clear)?;
        Ok(DigestOutcome::Sent {
            articles: document.article_count(),
        })
    }

    /// Run the weekly job and log its outcome; never fails.
    pub async fn run_digest_logged(&mut self) {
        match self.run_digest().await {
            Ok(DigestOutcome::Sent { articles }) => {
                info!(articles, "Digest delivered and store cleared")
            }
            Ok(DigestOutcome::Skipped) => {}
            Err(DigestError::Mail(MailError::Auth(reason))) => {
                error!(%reason, "SMTP authentication failed; check SRC_MAIL / SRC_PWD");
                self.log_retry_plan();
            }
            Err(e @ (DigestError::Mail(_) | DigestError::NoRecipient)) => {
                error!(error = %e, "Weekly digest failed; store left untouched");
                self.log_retry_plan();
            }
            Err(e @ DigestError::Clear(_)) => {
                warn!(error = %e, "Store could not be cleared after sending");
            }
        }
    }

    fn log_retry_plan(&self) {
        match self.send_retry {
            SendRetryPolicy::NextDailyTick => info!("Digest will be retried after the next daily collection"),
            SendRetryPolicy::NextWeek => info!("Digest will be retried at the next weekly trigger"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::FetchError;
    use crate::models::Document;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use url::Url;

    pub(crate) const POLSKA: &str = r#"<div id="poland">
        <div class="article__item" id="p1"><div class="article__content">Pierwsza z kraju.</div></div>
        <div class="article__item" id="p2"><div class="article__content">Druga z kraju.</div></div>
        <div class="article__item" id="p3"><div class="article__content">Trzecia z kraju.</div></div>
    </div>"#;
    pub(crate) const SWIAT: &str = r#"<div id="global">
        <div class="article__item" id="s1"><div class="article__content">Pierwsza ze świata.</div></div>
        <div class="article__item" id="s2"><div class="article__content">Druga ze świata.</div></div>
    </div>"#;

    /// Serves canned listing pages; URLs without a page fail.
    #[derive(Default)]
    pub(crate) struct FakeBrowser {
        pub pages: HashMap<String, String>,
    }

    impl PageFetcher for FakeBrowser {
        async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
            self.pages.get(url.as_str()).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    /// Records every send; fails while `fail` is set.
    #[derive(Clone, Default)]
    pub(crate) struct FakeMailer {
        pub sent: Arc<Mutex<Vec<(Document, String)>>>,
        pub fail: Arc<Mutex<bool>>,
    }

    impl Mailer for FakeMailer {
        async fn send(&self, document: &Document, recipient: &str) -> Result<(), MailError> {
            if *self.fail.lock().unwrap() {
                return Err(MailError::Connection("connection refused".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((document.clone(), recipient.to_string()));
            Ok(())
        }
    }

    pub(crate) fn browser(polska: Option<&str>, swiat: Option<&str>) -> FakeBrowser {
        let mut pages = HashMap::new();
        if let Some(html) = polska {
            pages.insert("https://infopigula.pl/#/poland".to_string(), html.to_string());
        }
        if let Some(html) = swiat {
            pages.insert("https://infopigula.pl/#/global".to_string(), html.to_string());
        }
        FakeBrowser { pages }
    }

    pub(crate) async fn context(
        dir: &tempfile::TempDir,
        browser: FakeBrowser,
        mailer: FakeMailer,
        empty_digest: EmptyDigestPolicy,
        send_retry: SendRetryPolicy,
    ) -> PipelineContext<FakeBrowser, FakeMailer> {
        let store = ArticleStore::load(dir.path().join("data.json")).await;
        let scraper = Scraper::new(browser, Url::parse("https://infopigula.pl/#/").unwrap());
        PipelineContext::new(
            store,
            scraper,
            mailer,
            Some("odbiorca@example.com".to_string()),
            empty_digest,
            send_retry,
        )
    }

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[tokio::test]
    async fn test_collection_with_one_failing_category() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), None),
            FakeMailer::default(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;

        let added = ctx.run_collection().await;
        assert_eq!(added, 3);
        assert!(ctx.store.all().iter().all(|r| r.category == Category::Polska));
    }

    #[tokio::test]
    async fn test_collection_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            FakeMailer::default(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;

        assert_eq!(ctx.run_collection().await, 5);
        assert_eq!(ctx.run_collection().await, 0);
        assert_eq!(ctx.store.len(), 5);
    }

    #[tokio::test]
    async fn test_successful_digest_sends_once_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            mailer.clone(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        ctx.run_collection().await;
        assert_eq!(ctx.store.len(), 5);

        let outcome = ctx.run_digest_for(week()).await.unwrap();
        assert_eq!(outcome, DigestOutcome::Sent { articles: 5 });
        assert!(ctx.store.all().is_empty());

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (document, recipient) = &sent[0];
        assert_eq!(recipient, "odbiorca@example.com");
        assert_eq!(document.counts[&Category::Polska], 3);
        assert_eq!(document.counts[&Category::Swiat], 2);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        *mailer.fail.lock().unwrap() = true;
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            mailer.clone(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextWeek,
        )
        .await;
        ctx.run_collection().await;
        let before: Vec<ArticleRecord> = ctx.store.all();
        let on_disk_before = std::fs::read(dir.path().join("data.json")).unwrap();

        let result = ctx.run_digest_for(week()).await;
        assert!(matches!(result, Err(DigestError::Mail(MailError::Connection(_)))));
        assert_eq!(ctx.store.all(), before);
        assert_eq!(std::fs::read(dir.path().join("data.json")).unwrap(), on_disk_before);
        assert!(ctx.pending_digest());
    }

    #[tokio::test]
    async fn test_failed_digest_retried_after_next_daily_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        *mailer.fail.lock().unwrap() = true;
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            mailer.clone(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        ctx.run_collection().await;
        ctx.run_digest_logged().await;
        assert!(ctx.pending_digest());
        assert_eq!(ctx.store.len(), 5);

        *mailer.fail.lock().unwrap() = false;
        ctx.run_collection().await;

        assert!(!ctx.pending_digest());
        assert!(ctx.store.all().is_empty());
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_week_policy_does_not_retry_daily() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        *mailer.fail.lock().unwrap() = true;
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), None),
            mailer.clone(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextWeek,
        )
        .await;
        ctx.run_collection().await;
        ctx.run_digest_logged().await;

        *mailer.fail.lock().unwrap() = false;
        ctx.run_collection().await;

        assert!(ctx.pending_digest());
        assert!(mailer.sent.lock().unwrap().is_empty());
        assert_eq!(ctx.store.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_week_sends_notice_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        let mut ctx = context(
            &dir,
            browser(None, None),
            mailer.clone(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;

        let outcome = ctx.run_digest_for(week()).await.unwrap();
        assert_eq!(outcome, DigestOutcome::Sent { articles: 0 });
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.html.contains(crate::outputs::digest::EMPTY_DIGEST_NOTICE));
    }

    #[tokio::test]
    async fn test_empty_week_skipped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        let mut ctx = context(
            &dir,
            browser(None, None),
            mailer.clone(),
            EmptyDigestPolicy::Skip,
            SendRetryPolicy::NextDailyTick,
        )
        .await;

        let outcome = ctx.run_digest_for(week()).await.unwrap();
        assert_eq!(outcome, DigestOutcome::Skipped);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_without_clearing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), None),
            FakeMailer::default(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        ctx.recipient = None;
        ctx.run_collection().await;

        let result = ctx.run_digest_for(week()).await;
        assert!(matches!(result, Err(DigestError::NoRecipient)));
        assert_eq!(ctx.store.len(), 3);
    }
}
