/// Data layer: core types, loading, and the derived views.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawTable → normalize → ReadingSet
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ ReadingSet  │  Vec<Reading> sorted by timestamp, present fields
///   └────────────┘
///        │
///        ├── filter    date range / series selection
///        ├── resample  fixed-width bucket means
///        ├── profile   hour-of-day means
///        ├── stats     describe-style summary table
///        └── export    CSV writer
/// ```

pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod profile;
pub mod resample;
pub mod stats;
