use crate::api::ScorecardApi;
use crate::cache::IndicatorCache;
use crate::config::{Config, FailurePolicy};
use crate::error::Result;
use crate::model::{value_patch, number_value, Indicator, IndicatorId, Month, Patch, Track};
use crate::sheet::{column_for_month, month_for_column, BscSheet, RowRole};
use futures::future::join_all;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

lazy_static! {
    static ref GROUPED_NUMBER: Regex = Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d*)?$").unwrap();
}

/// One cell change as typed into the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct CellEdit {
    pub row: usize,
    pub col: usize,
    pub input: String,
}

impl CellEdit {
    pub fn new(row: usize, col: usize, input: impl Into<String>) -> Self {
        CellEdit {
            row,
            col,
            input: input.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    OutOfRange,
    CategoryHeader,
    ReadOnly,
    NotMonthColumn,
    Unparseable,
    UnknownIndicator,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::OutOfRange => "row outside the sheet",
            SkipReason::CategoryHeader => "category header row",
            SkipReason::ReadOnly => "aggregate row is read-only",
            SkipReason::NotMonthColumn => "not a monthly value column",
            SkipReason::Unparseable => "not a number",
            SkipReason::UnknownIndicator => "indicator not in cache",
        };
        f.write_str(text)
    }
}

/// Life cycle of a single cell edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditState {
    Idle,
    OptimisticallyApplied,
    PersistPending,
    Persisted,
    PersistFailed { reverted: bool },
}

#[derive(Clone, Debug, PartialEq)]
pub enum EditOutcome {
    Skipped {
        row: usize,
        col: usize,
        reason: SkipReason,
    },
    Persisted {
        indicator_id: IndicatorId,
        field: String,
        value: Option<f64>,
    },
    Failed {
        indicator_id: IndicatorId,
        field: String,
        error: String,
        reverted: bool,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<EditOutcome>,
}

impl BatchReport {
    pub fn persisted(&self) -> usize {
        self.count(|o| matches!(o, EditOutcome::Persisted { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EditOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EditOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&EditOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Parses a typed cell value. Blank means "clear the cell".
///
/// ```
/// use scorecard::sync::parse_cell_input;
///
/// assert_eq!(parse_cell_input(" 1,234.5 "), Some(Some(1234.5)));
/// assert_eq!(parse_cell_input(""), Some(None));
/// assert_eq!(parse_cell_input("n/a"), None);
/// ```
pub fn parse_cell_input(raw: &str) -> Option<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(None);
    }
    let plain = if GROUPED_NUMBER.is_match(trimmed) {
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };
    let value: f64 = plain.parse().ok()?;
    value.is_finite().then_some(Some(value))
}

// An edit resolved against the sheet and applied to the cache, with what
// it replaced so a failed persist can be undone.
struct PendingEdit {
    indicator_id: IndicatorId,
    month: Month,
    track: Track,
    value: Option<f64>,
    previous: Option<f64>,
    state: EditState,
}

impl PendingEdit {
    fn field(&self) -> String {
        self.month.field_name(self.track)
    }

    fn advance(&mut self, next: EditState) {
        debug!(
            "indicator {} {}: {:?} -> {:?}",
            self.indicator_id,
            self.field(),
            self.state,
            next
        );
        self.state = next;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Optimistic edit pipeline between the grid, the local cache and the API.
///
/// Edits are written to the cache first, persisted concurrently, and a
/// single debounced refetch follows each burst of batches.
pub struct SyncEngine<A: ScorecardApi + 'static> {
    api: Arc<A>,
    cache: Arc<Mutex<IndicatorCache>>,
    debounce: Duration,
    policy: FailurePolicy,
    pending_refetch: Mutex<Option<JoinHandle<()>>>,
}

impl<A: ScorecardApi + 'static> SyncEngine<A> {
    pub fn new(api: Arc<A>, cache: IndicatorCache, config: &Config) -> Self {
        SyncEngine {
            api,
            cache: Arc::new(Mutex::new(cache)),
            debounce: config.refetch_debounce,
            policy: config.on_failure,
            pending_refetch: Mutex::new(None),
        }
    }

    /// Fetches the indicator collection and builds an engine around it.
    pub async fn connect(api: Arc<A>, config: &Config) -> Result<Self> {
        let indicators = api.list_indicators().await?;
        info!("loaded {} indicators", indicators.len());
        Ok(Self::new(api, IndicatorCache::new(indicators), config))
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn cache(&self) -> Arc<Mutex<IndicatorCache>> {
        Arc::clone(&self.cache)
    }

    /// Copy of the cached indicators, suitable for materializing a sheet.
    pub fn snapshot(&self) -> Vec<Indicator> {
        lock(&self.cache).all().to_vec()
    }

    pub fn with_cache<R>(&self, f: impl FnOnce(&mut IndicatorCache) -> R) -> R {
        f(&mut lock(&self.cache))
    }

    pub fn value(&self, id: IndicatorId, month: Month, track: Track) -> Option<f64> {
        lock(&self.cache).value(id, month, track)
    }

    pub fn has_pending_refetch(&self) -> bool {
        lock(&self.pending_refetch)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Applies a batch of grid edits.
    ///
    /// Each edit is checked against the row mapping of `sheet`, written to the
    /// cache, then persisted as a single-field `PATCH`. All requests run
    /// concurrently and a failure never stops the others. Once the batch
    /// settles a refetch is (re)scheduled after the debounce window.
    ///
    /// # Arguments
    /// * `sheet` - The sheet the edits were made on
    /// * `edits` - Cell changes in the order they were made
    ///
    /// # Returns
    /// * `BatchReport` - One outcome per edit
    pub async fn apply_batch(&self, sheet: &BscSheet, edits: Vec<CellEdit>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut pending = Vec::new();

        {
            let mut cache = lock(&self.cache);
            for edit in edits {
                let resolved = resolve(sheet, &edit).and_then(|(id, month, track, value)| {
                    cache
                        .set_value(id, month, track, value)
                        .map(|previous| (id, month, track, value, previous))
                        .ok_or(SkipReason::UnknownIndicator)
                });
                match resolved {
                    Ok((indicator_id, month, track, value, previous)) => {
                        let mut p = PendingEdit {
                            indicator_id,
                            month,
                            track,
                            value,
                            previous,
                            state: EditState::Idle,
                        };
                        p.advance(EditState::OptimisticallyApplied);
                        pending.push(p);
                    }
                    Err(reason) => {
                        warn!(
                            "skipping edit at {}: {}",
                            BscSheet::cell_name(edit.row, edit.col),
                            reason
                        );
                        report.outcomes.push(EditOutcome::Skipped {
                            row: edit.row,
                            col: edit.col,
                            reason,
                        });
                    }
                }
            }
        }

        if pending.is_empty() {
            return report;
        }
        self.cancel_refetch();

        let requests = pending.iter_mut().map(|p| {
            p.advance(EditState::PersistPending);
            let api = Arc::clone(&self.api);
            let (id, patch) = (p.indicator_id, value_patch(p.month, p.track, p.value));
            async move { api.patch_indicator(id, patch).await }
        });
        let results = join_all(requests).await;
        let settled: Vec<_> = pending.into_iter().zip(results).collect();

        // Newest first, so stacked edits to one field unwind to the original.
        let mut reverted = vec![false; settled.len()];
        if self.policy == FailurePolicy::Revert {
            for (i, (p, result)) in settled.iter().enumerate().rev() {
                if result.is_err() {
                    reverted[i] = self.revert(p);
                }
            }
        }

        for ((mut p, result), reverted) in settled.into_iter().zip(reverted) {
            match result {
                Ok(_) => {
                    p.advance(EditState::Persisted);
                    report.outcomes.push(EditOutcome::Persisted {
                        indicator_id: p.indicator_id,
                        field: p.field(),
                        value: p.value,
                    });
                }
                Err(err) => {
                    error!(
                        "failed to persist {} of indicator {}: {}",
                        p.field(),
                        p.indicator_id,
                        err
                    );
                    p.advance(EditState::PersistFailed { reverted });
                    report.outcomes.push(EditOutcome::Failed {
                        indicator_id: p.indicator_id,
                        field: p.field(),
                        error: err.to_string(),
                        reverted,
                    });
                }
            }
        }

        self.schedule_refetch();
        report
    }

    // Puts the previous value back only while the cache still shows ours.
    fn revert(&self, edit: &PendingEdit) -> bool {
        let mut cache = lock(&self.cache);
        if cache.value(edit.indicator_id, edit.month, edit.track) != edit.value {
            return false;
        }
        cache
            .set_value(edit.indicator_id, edit.month, edit.track, edit.previous)
            .is_some()
    }

    /// Persists every editable indicator on the sheet with all 24 month fields.
    ///
    /// Fails on the first rejected request and skips the refetch in that
    /// case; on success the cache is refreshed right away.
    pub async fn save_all(&self, sheet: &BscSheet) -> Result<usize> {
        let payloads = full_payloads(sheet);
        self.cancel_refetch();
        info!("saving {} indicators of {}", payloads.len(), sheet.board_name);

        let requests = payloads.into_iter().map(|(id, patch)| {
            let api = Arc::clone(&self.api);
            async move { api.patch_indicator(id, patch).await.map(|_| id) }
        });
        let mut saved = 0;
        for result in join_all(requests).await {
            match result {
                Ok(_) => saved += 1,
                Err(err) => {
                    error!("bulk save failed: {}", err);
                    return Err(err);
                }
            }
        }

        self.refresh().await?;
        Ok(saved)
    }

    /// Replaces the cache with the server's collection now.
    pub async fn refresh(&self) -> Result<()> {
        self.cancel_refetch();
        let fresh = self.api.list_indicators().await?;
        lock(&self.cache).replace(fresh);
        Ok(())
    }

    fn schedule_refetch(&self) {
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let delay = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match api.list_indicators().await {
                Ok(fresh) => {
                    debug!("refetched {} indicators", fresh.len());
                    lock(&cache).replace(fresh);
                }
                Err(err) => warn!("refetch failed: {}", err),
            }
        });
        if let Some(previous) = lock(&self.pending_refetch).replace(handle) {
            previous.abort();
        }
    }

    fn cancel_refetch(&self) {
        if let Some(handle) = lock(&self.pending_refetch).take() {
            handle.abort();
        }
    }

    /// Cancels the pending refetch, if any.
    pub fn shutdown(&self) {
        self.cancel_refetch();
    }
}

impl<A: ScorecardApi + 'static> Drop for SyncEngine<A> {
    fn drop(&mut self) {
        self.cancel_refetch();
    }
}

fn resolve(
    sheet: &BscSheet,
    edit: &CellEdit,
) -> std::result::Result<(IndicatorId, Month, Track, Option<f64>), SkipReason> {
    let mapping = sheet.mapping(edit.row).ok_or(SkipReason::OutOfRange)?;
    if mapping.role == RowRole::CategoryHeader {
        return Err(SkipReason::CategoryHeader);
    }
    if mapping.read_only {
        return Err(SkipReason::ReadOnly);
    }
    let month = month_for_column(edit.col).ok_or(SkipReason::NotMonthColumn)?;
    let key = mapping.key().ok_or(SkipReason::OutOfRange)?;
    let value = parse_cell_input(&edit.input).ok_or(SkipReason::Unparseable)?;
    Ok((key.indicator_id, month, key.track, value))
}

// One payload per editable indicator, in sheet order, built from the cells.
fn full_payloads(sheet: &BscSheet) -> Vec<(IndicatorId, Patch)> {
    let mut order = Vec::new();
    let mut payloads: HashMap<IndicatorId, Patch> = HashMap::new();
    for mapping in &sheet.rows {
        let Some(key) = mapping.key() else { continue };
        if mapping.read_only {
            continue;
        }
        let patch = payloads.entry(key.indicator_id).or_insert_with(|| {
            order.push(key.indicator_id);
            Patch::new()
        });
        for month in Month::ALL {
            let value = sheet
                .cell(mapping.row, column_for_month(month))
                .and_then(|c| c.as_number());
            patch.insert(month.field_name(key.track), number_value(value));
        }
    }
    order
        .into_iter()
        .filter_map(|id| payloads.remove(&id).map(|p| (id, p)))
        .collect()
}
