//! Concurrent analysis of many entities.
//!
//! Market data is fetched in bulk on the coordinating task, one analysis task
//! per entity runs on a bounded pool, and results are gathered in completion
//! order. Only the coordinator touches the output file.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tplus_agents::{AnalysisInput, Analyzer};
use tplus_cache::Clock;
use tplus_data::{MarketData, QuoteSource};
use tplus_models::{AnalysisMode, AnalyzedRecord, EntityProfile, Recommendation, ResultRecord};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::BatchError;
use crate::writer::IncrementalWriter;

pub const PROFILE_NOT_FOUND: &str = "profile not found";
pub const QUOTE_UNAVAILABLE: &str = "quote unavailable";

pub const DEFAULT_MAX_WORKERS: usize = 32;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_workers: usize,
    /// Flush to `output` every this many completions. Both must be set for
    /// incremental writing.
    pub batch_size: Option<usize>,
    pub output: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: None,
            output: None,
        }
    }
}

pub struct BatchOrchestrator {
    market: Arc<dyn MarketData>,
    quotes: Arc<dyn QuoteSource>,
    analyzer: Arc<dyn Analyzer>,
    clock: Arc<dyn Clock>,
    lookback_days: u32,
    quote_delay: Duration,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        market: Arc<dyn MarketData>,
        quotes: Arc<dyn QuoteSource>,
        analyzer: Arc<dyn Analyzer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            market,
            quotes,
            analyzer,
            clock,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            quote_delay: Duration::from_millis(100),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Pause between quote requests in a bulk fetch.
    pub fn with_quote_delay(mut self, delay: Duration) -> Self {
        self.quote_delay = delay;
        self
    }

    /// Cancelling stops dispatch of new analyses. Running ones finish and are
    /// still collected.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }

    fn history_window(&self) -> (NaiveDate, NaiveDate) {
        let until = self.clock.now().date_naive();
        let since = until - chrono::Duration::days(i64::from(self.lookback_days));
        (since, until)
    }

    /// Analyze one entity with per-entity collaborator calls.
    pub async fn analyze_one(&self, entity_id: &str) -> Result<ResultRecord, BatchError> {
        info!(entity = %entity_id, "Analyzing entity");

        let Some(profile) = self.market.get_profile(entity_id).await? else {
            warn!(entity = %entity_id, "No profile");
            return Ok(ResultRecord::failed(entity_id, None, PROFILE_NOT_FOUND));
        };

        let (since, until) = self.history_window();
        let history = self
            .market
            .get_history(&profile.full_code, since, until)
            .await?;

        let Some(snapshot) = self.quotes.get_quote(&profile.full_code).await? else {
            warn!(entity = %entity_id, full_code = %profile.full_code, "No quote");
            return Ok(ResultRecord::failed(
                entity_id,
                Some(profile.name.as_str()),
                QUOTE_UNAVAILABLE,
            ));
        };

        let input = AnalysisInput {
            snapshot,
            history,
            profile,
        };
        let rec = self.analyzer.analyze(&input).await;
        Ok(analyzed_record(
            &input,
            self.analyzer.mode(),
            rec,
            self.clock.now(),
        ))
    }

    /// Analyze `entity_ids` concurrently.
    ///
    /// Missing profiles and quotes become failed records. A bulk fetch error
    /// aborts the whole run. Records are returned in completion order and,
    /// when `options` names both a batch size and an output path, also
    /// written there incrementally.
    pub async fn analyze_many(
        &self,
        entity_ids: &[String],
        options: &BatchOptions,
    ) -> Result<Vec<ResultRecord>, BatchError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", %run_id, entities = entity_ids.len());
        self.run_batch(entity_ids, options).instrument(span).await
    }

    async fn run_batch(
        &self,
        entity_ids: &[String],
        options: &BatchOptions,
    ) -> Result<Vec<ResultRecord>, BatchError> {
        let started = Instant::now();
        info!(
            workers = options.max_workers,
            mode = %self.analyzer.mode(),
            "Batch starting"
        );

        // Bulk lookups, one call each.
        let profiles = self
            .market
            .get_profiles_batch(entity_ids)
            .await
            .inspect_err(|e| error!(error = %e, "Bulk profile lookup failed"))?;

        let mut resolved: Vec<EntityProfile> = Vec::with_capacity(profiles.len());
        let mut unresolved: Vec<ResultRecord> = Vec::new();
        for id in entity_ids {
            match profiles.get(id) {
                Some(profile) => resolved.push(profile.clone()),
                None => {
                    warn!(entity = %id, "No profile");
                    unresolved.push(ResultRecord::failed(id.as_str(), None, PROFILE_NOT_FOUND));
                }
            }
        }

        let (quotes, histories) = if resolved.is_empty() {
            (HashMap::new(), HashMap::new())
        } else {
            let mut seen = HashSet::new();
            let full_codes: Vec<String> = resolved
                .iter()
                .filter(|p| seen.insert(p.full_code.as_str()))
                .map(|p| p.full_code.clone())
                .collect();
            let quotes = self
                .quotes
                .get_quotes_batch(&full_codes, self.quote_delay)
                .await
                .inspect_err(|e| error!(error = %e, "Bulk quote fetch failed"))?;
            let (since, until) = self.history_window();
            let histories = self
                .market
                .get_history_batch(&full_codes, since, until)
                .await
                .inspect_err(|e| error!(error = %e, "Bulk history fetch failed"))?;
            (quotes, histories)
        };
        debug!(
            profiles = resolved.len(),
            quotes = quotes.len(),
            "Bulk data fetched"
        );

        // Opened after the bulk fetches; a fetch error leaves the output file untouched.
        let mut collector = Collector::open(options)?;
        for record in unresolved {
            collector.push(record)?;
        }

        let max_workers = options.max_workers.max(1);
        let mut tasks: JoinSet<ResultRecord> = JoinSet::new();

        'dispatch: for profile in resolved {
            let Some(snapshot) = quotes.get(&profile.full_code).cloned() else {
                warn!(entity = %profile.code, full_code = %profile.full_code, "No quote");
                collector.push(ResultRecord::failed(
                    profile.code.as_str(),
                    Some(profile.name.as_str()),
                    QUOTE_UNAVAILABLE,
                ))?;
                continue;
            };

            // Wait for a free worker, collecting whatever finishes meanwhile.
            while tasks.len() >= max_workers {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'dispatch,
                    Some(joined) = tasks.join_next() => {
                        if let Some(record) = settle(joined) {
                            collector.push(record)?;
                        }
                    }
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let input = AnalysisInput {
                snapshot,
                history: histories.get(&profile.full_code).cloned().unwrap_or_default(),
                profile,
            };
            tasks.spawn(
                analyze_isolated(Arc::clone(&self.analyzer), Arc::clone(&self.clock), input)
                    .in_current_span(),
            );
        }

        if self.cancel.is_cancelled() {
            info!(in_flight = tasks.len(), "Batch cancelled, no further dispatch");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Some(record) = settle(joined) {
                collector.push(record)?;
            }
        }

        let records = collector.finish()?;
        let failed = records.iter().filter(|r| r.is_failed()).count();
        info!(
            completed = records.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );
        Ok(records)
    }
}

fn analyzed_record(
    input: &AnalysisInput,
    mode: AnalysisMode,
    recommendation: Recommendation,
    at: DateTime<Local>,
) -> ResultRecord {
    ResultRecord::Analyzed(AnalyzedRecord {
        code: input.profile.code.clone(),
        name: input.profile.name.clone(),
        analysis_date: at.format("%Y-%m-%d %H:%M:%S").to_string(),
        mode,
        current_price: input.snapshot.current_price,
        change_percent: input.snapshot.change_percent,
        recommendation,
    })
}

/// Run one analysis on its own task so a panic becomes a failed record for
/// that entity instead of a lost result.
async fn analyze_isolated(
    analyzer: Arc<dyn Analyzer>,
    clock: Arc<dyn Clock>,
    input: AnalysisInput,
) -> ResultRecord {
    let code = input.profile.code.clone();
    let name = input.profile.name.clone();

    let job = tokio::spawn(
        async move {
            let rec = analyzer.analyze(&input).await;
            analyzed_record(&input, analyzer.mode(), rec, clock.now())
        }
        .in_current_span(),
    );

    match job.await {
        Ok(record) => {
            debug!(entity = %code, "Entity complete");
            record
        }
        Err(e) => {
            warn!(entity = %code, error = %e, "Analysis task failed");
            ResultRecord::failed(code, Some(name.as_str()), format!("analysis task failed: {e}"))
        }
    }
}

fn settle(joined: Result<ResultRecord, JoinError>) -> Option<ResultRecord> {
    joined
        .inspect_err(|e| error!(error = %e, "Worker task lost"))
        .ok()
}

/// Completed records plus the optional incremental sink.
struct Collector {
    records: Vec<ResultRecord>,
    sink: Option<(IncrementalWriter, usize)>,
    unflushed: usize,
}

impl Collector {
    fn open(options: &BatchOptions) -> Result<Self, BatchError> {
        let sink = match (&options.output, options.batch_size) {
            (Some(path), Some(size)) if size > 0 => {
                info!(path = %path.display(), batch_size = size, "Writing results incrementally");
                Some((IncrementalWriter::create(path)?, size))
            }
            _ => None,
        };
        Ok(Self {
            records: Vec::new(),
            sink,
            unflushed: 0,
        })
    }

    fn push(&mut self, record: ResultRecord) -> Result<(), BatchError> {
        self.records.push(record);
        self.unflushed += 1;
        if let Some((_, size)) = &self.sink {
            if self.unflushed >= *size {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BatchError> {
        if let Some((writer, _)) = &mut self.sink {
            if self.unflushed > 0 {
                let start = self.records.len() - self.unflushed;
                writer.append(&self.records[start..])?;
            }
        }
        self.unflushed = 0;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<ResultRecord>, BatchError> {
        self.flush()?;
        if let Some((writer, _)) = self.sink.take() {
            writer.close()?;
        }
        Ok(self.records)
    }
}
