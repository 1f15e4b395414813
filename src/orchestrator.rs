use futures::stream::{self, StreamExt};
use ractor::ActorRef;
use std::iter;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::actors::load_coordinator::{self, LoadCoordinator, LoadCoordinatorMessage, LoadStats};
use crate::assembler::assemble;
use crate::config::Config;
use crate::discovery::discover;
use crate::error::{Phase, PipelineError, Result, StargazerError};
use crate::fetcher::fetch_pages;
use crate::github::GitHubClient;
use crate::loader::{Loader, StargazerStore};
use crate::models::{PageResult, RunSummary, SourceReport, SourceTarget, StargazerRecord};

/// Runs extract-then-load for configured sources.
///
/// Up to `source_concurrency` sources are fetched at once, each with its own
/// pool of `workers` page requests. Loads are funnelled through one
/// [`LoadCoordinator`], so the store only ever sees one writer.
pub struct Orchestrator {
    config: Arc<Config>,
    coordinator: ActorRef<LoadCoordinatorMessage>,
    coordinator_handle: JoinHandle<()>,
}

impl Orchestrator {
    pub async fn start(config: Arc<Config>, store: Arc<dyn StargazerStore>) -> Result<Self> {
        let loader = Loader::new(store, config.load.clone());
        let (coordinator, coordinator_handle) = LoadCoordinator::spawn(loader)
            .await
            .map_err(|e| StargazerError::Internal(format!("Failed to start load coordinator: {}", e)))?;

        Ok(Self {
            config,
            coordinator,
            coordinator_handle,
        })
    }

    /// Fetch every page of one source and return its records in page order,
    /// with the number of pages covered.
    pub async fn extract(&self, target: &SourceTarget) -> Result<(Vec<StargazerRecord>, u32)> {
        let source = target.full_name.as_str();
        let fetch = &self.config.fetch;
        let client = GitHubClient::for_source(&self.config, target)?;

        let discovery = discover(&client, source, fetch.page_cap()).await?;
        if discovery.rate_limit.is_limited {
            warn!(source, reset = %discovery.rate_limit.reset_time, "GitHub quota exhausted, page fetches will wait");
        }
        if discovery.last_page <= 1 {
            return Ok((discovery.first_page, discovery.last_page));
        }

        let rest = fetch_pages(&client, source, 2..=discovery.last_page, fetch.workers).await?;
        let first = PageResult::Records {
            page: 1,
            records: discovery.first_page,
        };

        Ok((assemble(iter::once(first).chain(rest)), discovery.last_page))
    }

    /// Extract and load one source. This is the unit an external scheduler
    /// invokes; its failure never affects other sources.
    pub async fn extract_and_load(
        &self,
        target: &SourceTarget,
    ) -> std::result::Result<SourceReport, PipelineError> {
        let started = Instant::now();
        let source = target.full_name.as_str();
        let deadline = self.config.fetch.source_deadline;

        info!(source, "Starting extraction");

        let (records, pages) = match timeout(deadline, self.extract(target)).await {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => return Err(PipelineError::new(source, Phase::Extract, e)),
            Err(_) => {
                return Err(PipelineError::new(
                    source,
                    Phase::Extract,
                    StargazerError::DeadlineExceeded(format!(
                        "extract did not finish within {}s",
                        deadline.as_secs()
                    )),
                ))
            }
        };

        let fetched = records.len();
        info!(source, "Fetched {} total stargazers", fetched);

        let rows_loaded = load_coordinator::load(&self.coordinator, target.clone(), records)
            .await
            .map_err(|e| PipelineError::new(source, Phase::Load, e))?;

        Ok(SourceReport {
            source: target.full_name.clone(),
            table: target.table.clone(),
            pages,
            records: fetched,
            rows_loaded,
            elapsed: started.elapsed(),
        })
    }

    /// Run every given source, reporting each one's outcome separately.
    pub async fn run(&self, sources: &[SourceTarget]) -> RunSummary {
        info!(
            sources = sources.len(),
            source_concurrency = self.config.source_concurrency,
            workers = self.config.fetch.workers,
            "Extract-load start"
        );

        let mut summary = RunSummary::default();
        let mut outcomes = stream::iter(sources)
            .map(|target| self.extract_and_load(target))
            .buffer_unordered(self.config.source_concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(report) => {
                    info!(
                        source = %report.source,
                        rows = report.rows_loaded,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Source complete"
                    );
                    summary.succeeded.push(report);
                }
                Err(e) => {
                    error!(source = %e.source_name, phase = %e.phase, "Source failed: {}", e.cause);
                    summary.failed.push(e);
                }
            }
        }

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            rows = summary.total_rows(),
            "Extract-load complete"
        );
        summary
    }

    pub async fn load_stats(&self) -> Result<LoadStats> {
        load_coordinator::stats(&self.coordinator).await
    }

    /// Stop the load coordinator once all queued loads have been handled.
    pub async fn shutdown(self) {
        self.coordinator.stop(Some("Run finished".to_string()));
        if let Err(e) = self.coordinator_handle.await {
            error!("Load coordinator did not stop cleanly: {}", e);
        }
    }
}
