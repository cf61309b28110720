use std::collections::BTreeMap;

use chrono::Timelike;
use serde::Serialize;

use super::model::{Measurement, ReadingSet};
use super::stats::FieldMeans;

/// Mean value per hour of day (UTC), pooled across all calendar days.
///
/// Only hours that occur in the input have an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyProfile {
    pub fields: Vec<Measurement>,
    /// hour (0–23) → one mean per entry of `fields`, `None` when that field
    /// had no present values in the hour.
    pub hours: BTreeMap<u32, Vec<Option<f64>>>,
}

impl HourlyProfile {
    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    /// Hours present in the profile, ascending.
    pub fn hours(&self) -> impl Iterator<Item = u32> + '_ {
        self.hours.keys().copied()
    }

    pub fn mean(&self, hour: u32, field: Measurement) -> Option<f64> {
        let col = self.fields.iter().position(|&f| f == field)?;
        self.hours.get(&hour)?.get(col).copied().flatten()
    }

    /// `(hour, mean)` pairs for one field in ascending hour order, skipping
    /// hours where the field is missing. Suitable as a chart series.
    pub fn series(&self, field: Measurement) -> Vec<(u32, f64)> {
        self.hours()
            .filter_map(|h| self.mean(h, field).map(|v| (h, v)))
            .collect()
    }
}

/// Group readings by hour of day and average each field over present values.
pub fn hourly_profile(set: &ReadingSet, fields: &[Measurement]) -> HourlyProfile {
    let fields = set.present_fields(fields);

    let mut groups: BTreeMap<u32, FieldMeans> = BTreeMap::new();
    for reading in &set.readings {
        groups
            .entry(reading.timestamp.hour())
            .or_insert_with(|| FieldMeans::new(&fields))
            .add(reading);
    }

    HourlyProfile {
        hours: groups
            .into_iter()
            .map(|(hour, means)| (hour, means.means()))
            .collect(),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Reading;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_hour_pooled_across_days() {
        let set = ReadingSet::new(
            vec![
                Reading::new(Utc.with_ymd_and_hms(2024, 1, 1, 14, 5, 0).unwrap())
                    .with(Measurement::Co2, 900.0),
                Reading::new(Utc.with_ymd_and_hms(2024, 1, 2, 14, 40, 0).unwrap())
                    .with(Measurement::Co2, 1100.0),
            ],
            vec![Measurement::Co2],
            vec![],
        );

        let profile = hourly_profile(&set, &[Measurement::Co2]);
        assert_eq!(profile.hours().collect::<Vec<_>>(), vec![14]);
        assert_eq!(profile.mean(14, Measurement::Co2), Some(1000.0));
        assert_eq!(profile.mean(13, Measurement::Co2), None);
    }

    #[test]
    fn test_hour_without_present_values_is_missing() {
        let set = ReadingSet::new(
            vec![
                Reading::new(Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap())
                    .with(Measurement::Pm1, 1.0),
                Reading::new(Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap())
                    .with(Measurement::Pm10, 6.0),
            ],
            vec![Measurement::Pm1, Measurement::Pm10],
            vec![],
        );

        let profile = hourly_profile(&set, &[Measurement::Pm10, Measurement::Pm1]);
        assert_eq!(profile.fields, vec![Measurement::Pm10, Measurement::Pm1]);
        assert_eq!(profile.hours.get(&3), Some(&vec![None, Some(1.0)]));
        assert_eq!(profile.mean(4, Measurement::Pm10), Some(6.0));
        assert_eq!(profile.mean(4, Measurement::Pm1), None);
        assert_eq!(profile.series(Measurement::Pm1), vec![(3, 1.0)]);
    }

    #[test]
    fn test_hours_are_unique_and_ascending() {
        let readings = (0..96)
            .map(|i| {
                let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::minutes(45 * i);
                Reading::new(t).with(Measurement::Temperature, i as f64)
            })
            .collect();
        let set = ReadingSet::new(readings, vec![Measurement::Temperature], vec![]);
        let profile = hourly_profile(&set, &[Measurement::Temperature]);
        let hours: Vec<u32> = profile.hours().collect();
        assert_eq!(hours, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input_gives_empty_profile() {
        let set = ReadingSet::new(vec![], vec![Measurement::Co2], vec![]);
        let profile = hourly_profile(&set, &[Measurement::Co2]);
        assert!(profile.is_empty());
    }
}
