//! Parallel dispatch of deduplicated region lookups and merge of their rows.

use crate::errors::{AppError, Result};
use crate::query::QueryBatch;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 4;

/// Answers one region lookup against an annotation store.
pub trait RangeLookup: Sync {
    fn lookup(&self, region: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnQueryError {
    /// Log the failure and treat the region as having no annotations.
    Drop,
    /// Abort the run on the first failed region.
    FailFast,
}

impl OnQueryError {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "drop" => Some(Self::Drop),
            "fail-fast" => Some(Self::FailFast),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Extra attempts after the first failure of a region.
    pub retries: usize,
    pub on_error: OnQueryError,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            on_error: OnQueryError::Drop,
        }
    }
}

pub type QueryOutcome = Result<Vec<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedQuery {
    pub region: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FederatedRows {
    /// Grouping key followed by the annotation columns, duplicates removed.
    pub rows: Vec<Vec<String>>,
    pub dispatched: usize,
    pub failed: Vec<FailedQuery>,
}

#[derive(Debug)]
pub struct QueryFederator<'a, L: RangeLookup> {
    lookup: &'a L,
    workers: usize,
    policy: FailurePolicy,
    columns: Option<usize>,
    progress: bool,
}

impl<'a, L: RangeLookup> QueryFederator<'a, L> {
    pub fn new(lookup: &'a L, workers: usize) -> Self {
        Self {
            lookup,
            workers: workers.max(1),
            policy: FailurePolicy::default(),
            columns: None,
            progress: false,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Expected number of columns per annotation row; wider rows are malformed
    /// and narrower rows are padded.
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Looks up every distinct region once, waits for all workers, then merges
    /// the fragments under each region's grouping keys.
    pub fn run(&self, batch: &QueryBatch) -> Result<FederatedRows> {
        let regions = batch.regions();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|err| AppError::ParseError {
                message: format!("failed to initialize rayon thread pool: {err}"),
            })?;

        info!(
            regions = regions.len(),
            expanded = batch.expanded_len(),
            workers = self.workers,
            "dispatching region lookups"
        );
        let progress = DispatchProgress::new(self.progress, regions.len());
        let started = Instant::now();
        let outcomes = pool.install(|| {
            regions
                .par_iter()
                .map(|region| {
                    let outcome = self.lookup_with_retries(region);
                    progress.on_completed();
                    (*region, outcome)
                })
                .collect::<Vec<_>>()
        });
        progress.finish();

        let merged = self.merge(batch, outcomes)?;
        info!(
            dispatched = merged.dispatched,
            failed = merged.failed.len(),
            rows = merged.rows.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "completed region lookups"
        );
        Ok(merged)
    }

    fn lookup_with_retries(&self, region: &str) -> QueryOutcome {
        let mut attempt = 0;
        loop {
            let outcome = self
                .lookup
                .lookup(region)
                .and_then(|lines| self.split_rows(region, lines));
            match outcome {
                Ok(rows) => {
                    debug!(region, rows = rows.len(), "region lookup finished");
                    return Ok(rows);
                }
                Err(error) if attempt < self.policy.retries => {
                    attempt += 1;
                    debug!(region, attempt, error = %error, "retrying region lookup");
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn split_rows(&self, region: &str, lines: Vec<String>) -> QueryOutcome {
        lines
            .iter()
            .map(|line| {
                let mut fields = line.split('\t').map(str::to_string).collect::<Vec<_>>();
                if let Some(columns) = self.columns {
                    if fields.len() > columns {
                        return Err(AppError::MalformedOutput {
                            query: region.to_string(),
                            reason: format!(
                                "expected {columns} columns but found {}",
                                fields.len()
                            ),
                        });
                    }
                    fields.resize(columns, String::new());
                }
                Ok(fields)
            })
            .collect()
    }

    fn merge(&self, batch: &QueryBatch, outcomes: Vec<(&str, QueryOutcome)>) -> Result<FederatedRows> {
        let mut merged = FederatedRows {
            dispatched: outcomes.len(),
            ..FederatedRows::default()
        };
        let mut seen: HashSet<Vec<String>> = HashSet::new();

        for (region, outcome) in outcomes {
            let rows = match outcome {
                Ok(rows) => rows,
                Err(error) => match self.policy.on_error {
                    OnQueryError::FailFast => {
                        return Err(AppError::QueryFailed {
                            query: region.to_string(),
                            reason: error.to_string(),
                        });
                    }
                    OnQueryError::Drop => {
                        warn!(region, error = %error, "region lookup failed; treating as empty");
                        merged.failed.push(FailedQuery {
                            region: region.to_string(),
                            reason: error.to_string(),
                        });
                        continue;
                    }
                },
            };

            for key in batch.keys_for(region) {
                for fields in &rows {
                    let mut row = Vec::with_capacity(fields.len() + 1);
                    row.push(key.to_string());
                    row.extend(fields.iter().cloned());
                    if seen.insert(row.clone()) {
                        merged.rows.push(row);
                    }
                }
            }
        }
        Ok(merged)
    }
}

#[derive(Debug)]
struct DispatchProgress {
    progress_bar: Option<ProgressBar>,
}

impl DispatchProgress {
    fn new(enabled: bool, total: usize) -> Self {
        let progress_bar = enabled.then(|| {
            let bar = ProgressBar::new(total as u64);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));
            let style = ProgressStyle::with_template(
                "{spinner:.green} {elapsed_precise} [{bar:30}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(200));
            bar.set_message("region lookups");
            bar
        });
        Self { progress_bar }
    }

    fn on_completed(&self) {
        if let Some(bar) = &self.progress_bar {
            bar.inc(1);
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message("done");
        }
    }
}
