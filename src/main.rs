use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use log::info;

use airq_dash::cache::DatasetCache;
use airq_dash::data::export::export_to_path;
use airq_dash::data::filter::{parse_date, DateRange};
use airq_dash::data::model::Measurement;
use airq_dash::data::resample::ResampleRule;
use airq_dash::query::{DashboardQuery, DashboardView, ViewStatus};

#[derive(Parser, Debug)]
#[command(name = "airq-dash")]
#[command(about = "Summarize and export indoor air-quality measurements")]
struct Args {
    /// Measurements file (.csv, .json or .parquet)
    source: Option<PathBuf>,

    /// JSON query file; command-line flags override its values
    #[arg(short, long)]
    query: Option<PathBuf>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Last day to include, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    /// Resample interval: raw, 30min, 1h, 2h, 6h, 1D
    #[arg(short, long)]
    resample: Option<String>,

    /// Comma-separated measurement columns (default: PM1..PM10)
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Skip the hour-of-day profile
    #[arg(long)]
    no_hourly: bool,

    /// Write the current view as CSV; a directory gets the default file name
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Print the whole view as JSON instead of tables
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (mut query, open_bounds) = build_query(&args)?;
    let mut cache = DatasetCache::default();
    let base = cache
        .load(&query.source)
        .with_context(|| format!("loading {}", query.source.display()))?;
    if let Some(bounds) = open_bounds {
        query.range = complete_range(bounds, DateRange::covering(&base));
    }
    let view = DashboardView::compute(base, &query);

    if let Some(target) = &args.export {
        let path = if target.is_dir() {
            let name = view
                .export_name()
                .unwrap_or_else(|| "air_quality.csv".to_string());
            target.join(name)
        } else {
            target.clone()
        };
        export_to_path(&view.view, &path)
            .with_context(|| format!("exporting to {}", path.display()))?;
        info!("exported {} rows to {}", view.view.len(), path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_report(&view);
    }
    Ok(())
}

/// Bounds given on the command line without a matching query-file range.
type OpenBounds = (Option<NaiveDate>, Option<NaiveDate>);

/// Merge the optional query file with command-line flags.
fn build_query(args: &Args) -> Result<(DashboardQuery, Option<OpenBounds>)> {
    let mut query = match (&args.query, &args.source) {
        (Some(file), _) => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading query file {}", file.display()))?;
            serde_json::from_str::<DashboardQuery>(&text)
                .with_context(|| format!("parsing query file {}", file.display()))?
        }
        (None, Some(source)) => DashboardQuery::new(source),
        (None, None) => bail!("either a SOURCE file or --query is required"),
    };

    if let Some(source) = &args.source {
        query.source = source.clone();
    }
    if !args.fields.is_empty() {
        query.fields = args
            .fields
            .iter()
            .map(|f| f.parse::<Measurement>())
            .collect::<Result<_, _>>()?;
    }
    if let Some(rule) = &args.resample {
        query.resample = rule.parse::<ResampleRule>()?;
    }
    if args.no_hourly {
        query.hourly = false;
    }

    let from = args.from.as_deref().map(parse_date).transpose()?;
    let to = args.to.as_deref().map(parse_date).transpose()?;
    match (from, to, query.range) {
        (None, None, _) => {}
        (Some(start), Some(end), _) => query.range = Some(DateRange::new(start, end)),
        (Some(start), None, Some(r)) => query.range = Some(DateRange::new(start, r.end)),
        (None, Some(end), Some(r)) => query.range = Some(DateRange::new(r.start, end)),
        // Half-open bounds are completed from the dataset once it is loaded.
        (start, end, None) => return Ok((query, Some((start, end)))),
    }

    Ok((query, None))
}

/// Fill the missing side of a half-open range from the dataset's span.
fn complete_range((start, end): OpenBounds, covering: Option<DateRange>) -> Option<DateRange> {
    covering.map(|c| DateRange::new(start.unwrap_or(c.start), end.unwrap_or(c.end)))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

fn print_report(view: &DashboardView) {
    println!(
        "{} readings loaded, {} in view",
        view.base.len(),
        view.view.len()
    );
    if let Some(range) = &view.range {
        println!("range: {} .. {}", range.start, range.end);
    }

    match view.status {
        ViewStatus::NothingSelected => {
            println!("No selected measurement is present in this dataset.");
            return;
        }
        ViewStatus::NoData => {
            println!("No data in the selected range.");
            return;
        }
        ViewStatus::Ready => {}
    }

    println!();
    println!(
        "{:<20} {:>7} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "field", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for s in &view.summary {
        let name = format!("{} ({})", s.field.label(), s.field.unit());
        println!(
            "{:<20} {:>7} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            name,
            s.count,
            fmt_opt(s.mean),
            fmt_opt(s.std),
            fmt_opt(s.min),
            fmt_opt(s.q1),
            fmt_opt(s.median),
            fmt_opt(s.q3),
            fmt_opt(s.max),
        );
    }

    if let Some(profile) = &view.hourly {
        println!();
        let header: Vec<String> = profile
            .fields
            .iter()
            .map(|f| format!("{:>10}", f.label()))
            .collect();
        println!("{:<5} {}", "hour", header.join(" "));
        for (hour, means) in &profile.hours {
            let cells: Vec<String> = means.iter().map(|m| format!("{:>10}", fmt_opt(*m))).collect();
            println!("{:<5} {}", format!("{hour:02}h"), cells.join(" "));
        }
    }
}
