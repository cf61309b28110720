use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::{Duration, TimeZone, Timelike, Utc};
use parquet::arrow::ArrowWriter;

use airq_dash::data::model::Measurement;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

const DAYS: i64 = 7;
const STEP_MINUTES: i64 = 10;

/// One generated row before rendering: text timestamp, one optional value
/// per measurement, optional event label.
struct Row {
    timestamp: String,
    values: [Option<f64>; Measurement::COUNT],
    event: Option<&'static str>,
}

/// Indoor events that push particulates and CO₂ up, by (hour, label).
const EVENTS: &[(u32, &str)] = &[(8, "ventilacion"), (13, "cocina"), (20, "limpieza")];

fn generate_rows(rng: &mut SimpleRng) -> Vec<Row> {
    let start = Utc
        .with_ymd_and_hms(2024, 3, 4, 0, 0, 0)
        .single()
        .expect("valid start date");
    let n = (DAYS * 24 * 60 / STEP_MINUTES) as usize;
    let mut rows = Vec::with_capacity(n + 3);

    for i in 0..n {
        let t = start + Duration::minutes(i as i64 * STEP_MINUTES);
        let hour = t.hour();
        let day_phase = (t.hour() as f64 + t.minute() as f64 / 60.0) / 24.0;
        let cycle = (2.0 * std::f64::consts::PI * (day_phase - 0.25)).sin();

        let occupied = (9..19).contains(&hour);
        let event = EVENTS
            .iter()
            .find(|(h, _)| *h == hour && t.minute() < 30)
            .map(|(_, label)| *label);
        let boost = if event.is_some() { 3.0 } else { 1.0 };

        let pm1 = (4.0 + rng.gauss(0.0, 0.8)).max(0.3) * boost;
        let pm2_5 = pm1 * 1.4 + rng.gauss(0.0, 0.5).abs();
        let pm4 = pm2_5 * 1.15 + rng.gauss(0.0, 0.3).abs();
        let pm10 = pm4 * 1.2 + rng.gauss(0.0, 0.4).abs();

        let mut values = [
            Some(21.0 + 2.0 * cycle + rng.gauss(0.0, 0.2)),
            Some(45.0 - 6.0 * cycle + rng.gauss(0.0, 1.0)),
            Some(if occupied { 850.0 } else { 480.0 } + rng.gauss(0.0, 40.0)),
            Some(pm1),
            Some(pm2_5),
            Some(pm4),
            Some(pm10),
        ];
        // Sensor dropouts: roughly one value in a hundred goes missing.
        for v in values.iter_mut() {
            if rng.next_f64() < 0.01 {
                *v = None;
            }
        }
        let values = values.map(|v| v.map(|x| (x * 100.0).round() / 100.0));

        rows.push(Row {
            timestamp: t.format("%Y-%m-%d %H:%M:%S").to_string(),
            values,
            event,
        });
    }

    // A few rows a cleaning pass must drop.
    for bad in ["", "sin fecha", "2024-02-30 12:00:00"] {
        rows.push(Row {
            timestamp: bad.to_string(),
            values: [Some(1.0); Measurement::COUNT],
            event: None,
        });
    }
    rows
}

fn write_csv(rows: &[Row], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).context("creating CSV")?;

    let mut header = vec!["timestamp"];
    header.extend(Measurement::ALL.iter().map(|m| m.column()));
    header.push("evento");
    wtr.write_record(&header)?;

    for (i, row) in rows.iter().enumerate() {
        let mut record = vec![row.timestamp.clone()];
        for (j, v) in row.values.iter().enumerate() {
            // Sprinkle a non-numeric cell now and then, as exported sheets do.
            let cell = match v {
                Some(_) if (i + j) % 997 == 0 => "n/a".to_string(),
                Some(x) => x.to_string(),
                None => String::new(),
            };
            record.push(cell);
        }
        record.push(row.event.unwrap_or("").to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn build_batch(rows: &[Row]) -> Result<RecordBatch> {
    let mut fields = vec![Field::new("timestamp", DataType::Utf8, false)];
    fields.extend(
        Measurement::ALL
            .iter()
            .map(|m| Field::new(m.column(), DataType::Float64, true)),
    );
    fields.push(Field::new("evento", DataType::Utf8, true));
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(Measurement::COUNT + 2);
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|r| r.timestamp.as_str()).collect::<Vec<_>>(),
    )));
    for m in Measurement::ALL {
        columns.push(Arc::new(Float64Array::from(
            rows.iter().map(|r| r.values[m.index()]).collect::<Vec<_>>(),
        )));
    }
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|r| r.event).collect::<Vec<_>>(),
    )));

    RecordBatch::try_new(schema, columns).context("building record batch")
}

fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let rows = generate_rows(&mut rng);

    let csv_path = out_dir.join("sample_air_quality.csv");
    write_csv(&rows, &csv_path)?;

    let batch = build_batch(&rows)?;
    let parquet_path = out_dir.join("sample_air_quality.parquet");
    write_parquet(&batch, &parquet_path)?;

    println!("{}", pretty_format_batches(&[batch.slice(0, 5)])?);
    println!(
        "Wrote {} rows ({} days at {} min) to {} and {}",
        rows.len(),
        DAYS,
        STEP_MINUTES,
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
