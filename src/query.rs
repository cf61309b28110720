use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::DatasetCache;
use crate::data::export::export_file_name;
use crate::data::filter::{available_fields, filter_by_date, select_fields, DateRange};
use crate::data::model::{Measurement, ReadingSet, SeriesPoint};
use crate::data::profile::{hourly_profile, HourlyProfile};
use crate::data::resample::{resample, ResampleRule};
use crate::data::stats::{summary_statistics, FieldSummary};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Query – what the caller selected
// ---------------------------------------------------------------------------

/// Everything a presentation layer chooses: which file, which series, which
/// days and which interval. Deserializable from a JSON query file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub source: PathBuf,

    /// Series to chart and summarize. Defaults to the particulate fractions.
    #[serde(default = "Measurement::particulates")]
    pub fields: Vec<Measurement>,

    /// Inclusive date range; `None` covers the whole dataset.
    #[serde(default)]
    pub range: Option<DateRange>,

    #[serde(default)]
    pub resample: ResampleRule,

    /// Whether to compute the hour-of-day profile.
    #[serde(default = "default_hourly")]
    pub hourly: bool,
}

fn default_hourly() -> bool {
    true
}

impl DashboardQuery {
    /// A query over `source` with every selection at its default.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        DashboardQuery {
            source: source.into(),
            fields: Measurement::particulates(),
            range: None,
            resample: ResampleRule::Raw,
            hourly: default_hourly(),
        }
    }
}

// ---------------------------------------------------------------------------
// View – what the caller renders
// ---------------------------------------------------------------------------

/// Which state a presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    Ready,
    /// The date range excludes every reading.
    NoData,
    /// No requested series is present in the dataset.
    NothingSelected,
}

/// All derived views for one query. `base` is the shared cached set; every
/// other member is owned by this view.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    #[serde(skip)]
    pub base: Arc<ReadingSet>,
    pub status: ViewStatus,
    /// Effective range (the covering range when the query had none).
    pub range: Option<DateRange>,
    /// Selected series that the dataset actually carries.
    pub fields: Vec<Measurement>,
    /// Date-filtered, resampled readings.
    pub view: ReadingSet,
    pub hourly: Option<HourlyProfile>,
    pub summary: Vec<FieldSummary>,
    /// `view` melted into chart points for `fields`.
    pub series: Vec<SeriesPoint>,
}

impl DashboardView {
    /// Derive every view of `base` for `query`. `query.source` is ignored.
    pub fn compute(base: Arc<ReadingSet>, query: &DashboardQuery) -> Self {
        let available = available_fields(&base, &Measurement::ALL);
        let fields = select_fields(&available, &query.fields);

        let range = query.range.or_else(|| DateRange::covering(&base));
        let filtered = match &range {
            Some(r) => filter_by_date(&base, r),
            None => base.as_ref().clone(),
        };
        let view = resample(&filtered, query.resample, &fields);

        let status = if fields.is_empty() {
            ViewStatus::NothingSelected
        } else if view.is_empty() {
            ViewStatus::NoData
        } else {
            ViewStatus::Ready
        };

        let hourly = query.hourly.then(|| hourly_profile(&view, &fields));
        let summary = summary_statistics(&view, &fields);
        let series = view.series(&fields);

        debug!(
            "view over {} of {} readings: {} rows, {} series points, {:?}",
            filtered.len(),
            base.len(),
            view.len(),
            series.len(),
            status
        );

        DashboardView {
            base,
            status,
            range,
            fields,
            view,
            hourly,
            summary,
            series,
        }
    }

    /// Suggested file name for exporting `view`.
    pub fn export_name(&self) -> Option<String> {
        self.range.as_ref().map(export_file_name)
    }
}

/// Load (or reuse) the query's source and derive its views.
pub fn evaluate(cache: &mut DatasetCache, query: &DashboardQuery) -> Result<DashboardView> {
    let base = cache.load(&query.source)?;
    Ok(DashboardView::compute(base, query))
}
