use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{split_by_date, PaginationScheme, SourceQuery};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::item_set::ItemSet;
use crate::retry::{retry_with_policy, RetryAction, RetryError, RetryPolicy};
use crate::token::TokenHandle;
use crate::transport::Transport;
use crate::{HarvestError, HarvestReport, PageError};

/// Where workers get the bearer token from, and where they report staleness.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> String;
    fn request_renewal(&self);
}

impl TokenSource for TokenHandle {
    fn access_token(&self) -> String {
        self.current_token().access_token.clone()
    }

    fn request_renewal(&self) {
        if !TokenHandle::request_renewal(self) {
            engine_debug!("Token manager stopped, renewal request dropped");
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub workers: usize,
    pub page_retry: RetryPolicy,
    pub split_window: TimeDelta,
    pub queue_capacity: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            page_retry: RetryPolicy::page(),
            split_window: TimeDelta::minutes(1),
            queue_capacity: 64,
        }
    }
}

/// One page-fetch unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    url: String,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Deserialize)]
struct ODataPage {
    value: Vec<ODataItem>,
}

#[derive(Deserialize)]
struct ODataItem {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default)]
struct HarvestStats {
    pages_fetched: AtomicU64,
    lineages_completed: AtomicU64,
    lineages_abandoned: AtomicU64,
}

enum LineageEnd {
    Exhausted,
    Abandoned,
    Cancelled,
}

/// Bounded worker pool that drains page jobs into a shared [`ItemSet`].
pub struct Harvester<T, S> {
    transport: Arc<T>,
    tokens: Arc<S>,
    settings: HarvestSettings,
}

impl<T, S> Harvester<T, S>
where
    T: Transport + 'static,
    S: TokenSource + 'static,
{
    pub fn new(transport: Arc<T>, tokens: Arc<S>, settings: HarvestSettings) -> Self {
        Self {
            transport,
            tokens,
            settings,
        }
    }

    /// Harvest every item name reachable from `query`.
    ///
    /// Setup problems are returned before any request is made. Once workers
    /// run, page failures only drop their lineage, and cancellation returns
    /// whatever was collected so far.
    pub async fn harvest(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<HarvestReport, HarvestError> {
        let query = SourceQuery::parse(query)?;
        let jobs = self.plan_jobs(&query)?;

        let items = Arc::new(ItemSet::new());
        let stats = Arc::new(HarvestStats::default());
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.settings.queue_capacity.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.settings.workers.max(1) {
            let worker = Worker {
                id: worker_id,
                transport: self.transport.clone(),
                tokens: self.tokens.clone(),
                pagination: query.pagination(),
                page_retry: self.settings.page_retry.clone(),
                jobs: job_rx.clone(),
                items: items.clone(),
                stats: stats.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }

        let mut jobs_enqueued = 0;
        for job in jobs {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = job_tx.send(job) => sent.is_ok(),
            };
            if !sent {
                break;
            }
            jobs_enqueued += 1;
        }
        // Closing the queue lets idle workers exit once it drains.
        drop(job_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                engine_warn!("Harvest worker ended abnormally: {}", err);
            }
        }

        let report = HarvestReport {
            output_filename: query.output_filename(),
            items: items.to_sorted_vec(),
            jobs_enqueued,
            pages_fetched: stats.pages_fetched.load(Ordering::Relaxed),
            lineages_completed: stats.lineages_completed.load(Ordering::Relaxed),
            lineages_abandoned: stats.lineages_abandoned.load(Ordering::Relaxed),
            cancelled: cancel.is_cancelled(),
        };
        engine_info!(
            "Harvest of {} finished: {} items, {} pages, {} lineages abandoned{}",
            query.url(),
            report.items.len(),
            report.pages_fetched,
            report.lineages_abandoned,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    fn plan_jobs(&self, query: &SourceQuery) -> Result<Vec<Job>, HarvestError> {
        if !query.is_date_filtered() {
            return Ok(vec![Job::new(query.url())]);
        }
        let windows = split_by_date(query.url(), self.settings.split_window, Utc::now())?;
        if let (Some(first), Some(last)) = (windows.first(), windows.last()) {
            engine_info!(
                "Splitting tasks for date range {} / {} into {} jobs",
                first.start,
                last.end,
                windows.len()
            );
        }
        Ok(windows.into_iter().map(|window| Job::new(window.url)).collect())
    }
}

struct Worker<T, S> {
    id: usize,
    transport: Arc<T>,
    tokens: Arc<S>,
    pagination: PaginationScheme,
    page_retry: RetryPolicy,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    items: Arc<ItemSet>,
    stats: Arc<HarvestStats>,
    cancel: CancellationToken,
}

impl<T: Transport, S: TokenSource> Worker<T, S> {
    async fn run(self) {
        engine_debug!("Started worker {}", self.id);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                job = async { self.jobs.lock().await.recv().await } => job,
            };
            let Some(job) = next else { break };

            match self.follow_lineage(job).await {
                LineageEnd::Exhausted => {
                    self.stats.lineages_completed.fetch_add(1, Ordering::Relaxed);
                }
                LineageEnd::Abandoned => {
                    self.stats.lineages_abandoned.fetch_add(1, Ordering::Relaxed);
                }
                LineageEnd::Cancelled => break,
            }
        }
        engine_debug!("Closed worker {}", self.id);
    }

    /// Fetch a job and each successor page in order until a page comes back empty.
    async fn follow_lineage(&self, job: Job) -> LineageEnd {
        let mut job = job;
        loop {
            let page = match self.fetch_page(job.url()).await {
                Ok(page) => page,
                Err(RetryError::Cancelled) => return LineageEnd::Cancelled,
                Err(RetryError::Aborted(PageError::Transport(err))) if err.is_cancelled() => {
                    return LineageEnd::Cancelled;
                }
                Err(err) => {
                    engine_warn!("Abandoning lineage at {}: {}", job.url(), err);
                    return LineageEnd::Abandoned;
                }
            };
            self.stats.pages_fetched.fetch_add(1, Ordering::Relaxed);

            let returned = page.value.len();
            for item in page.value {
                match item.name {
                    Some(name) if !name.is_empty() => {
                        self.items.insert(name);
                    }
                    _ => engine_debug!("Skipping unnamed item on {}", job.url()),
                }
            }
            if returned == 0 {
                return LineageEnd::Exhausted;
            }

            job = match self.pagination.next(job.url(), returned) {
                Ok(next) => Job::new(next),
                Err(err) => {
                    engine_warn!("Abandoning lineage at {}: {}", job.url(), err);
                    return LineageEnd::Abandoned;
                }
            };
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<ODataPage, RetryError<PageError>> {
        retry_with_policy(
            &self.page_retry,
            &self.cancel,
            "page fetch",
            classify_page,
            |_| self.fetch_once(url),
        )
        .await
    }

    async fn fetch_once(&self, url: &str) -> Result<ODataPage, PageError> {
        engine_debug!("Worker {} fetching {}", self.id, url);
        let bearer = self.tokens.access_token();
        let response = self
            .transport
            .get(url, &bearer, &self.cancel)
            .await
            .map_err(PageError::Transport)?;

        match response.status {
            401 | 403 => {
                self.tokens.request_renewal();
                return Err(PageError::Unauthorized(response.status));
            }
            status if !(200..300).contains(&status) => {
                return Err(PageError::HttpStatus(status));
            }
            _ => {}
        }

        serde_json::from_slice(&response.body).map_err(|err| PageError::Decode(err.to_string()))
    }
}

/// The transport spends its own budget on network failures; only failures
/// it cannot see are retried here.
fn classify_page(err: &PageError) -> RetryAction {
    match err {
        PageError::Transport(_) => RetryAction::Abort,
        PageError::Unauthorized(_) | PageError::HttpStatus(_) | PageError::Decode(_) => {
            RetryAction::Retry
        }
    }
}
