//! The `summary` subcommand: store queries rendered as text or JSON.

use std::fmt::Write as _;

use deforest_rings_database::{QueryFilter, Store};
use deforest_rings_models::{MunicipalityArea, RingTotalArea, RingYearArea};
use serde::Serialize;

use crate::context::CliError;

/// Everything the summary shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// First and last year in the store.
    pub year_bounds: Option<(i32, i32)>,
    /// Rings in partition order.
    pub ring_ids: Vec<String>,
    /// Area by year and ring within the filter.
    pub time_series: Vec<RingYearArea>,
    /// Area by ring within the filter.
    pub totals: Vec<RingTotalArea>,
    /// Largest municipalities within the filter.
    pub municipalities: Vec<MunicipalityArea>,
}

impl Summary {
    /// Runs every query against `store`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Db`] if a query fails.
    pub fn query(store: &Store, filter: &QueryFilter, limit: usize) -> Result<Self, CliError> {
        Ok(Self {
            year_bounds: store.year_bounds()?,
            ring_ids: store.ring_ids()?,
            time_series: store.time_series(filter)?,
            totals: store.totals(filter)?,
            municipalities: store.municipality_totals(filter, limit)?,
        })
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text tables.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        match self.year_bounds {
            Some((first, last)) => {
                let _ = writeln!(out, "Years: {first}-{last}");
            }
            None => {
                let _ = writeln!(out, "Years: (no data)");
            }
        }
        let _ = writeln!(out, "Rings: {}", self.ring_ids.join(", "));

        let _ = writeln!(out, "\nArea by ring");
        let _ = writeln!(out, "{:<12} {:>14}", "ring", "area_ha");
        for row in &self.totals {
            let _ = writeln!(out, "{:<12} {:>14.2}", row.ring_id, row.area_ha);
        }
        let total: f64 = self.totals.iter().map(|r| r.area_ha).sum();
        let _ = writeln!(out, "{:<12} {total:>14.2}", "total");

        let _ = writeln!(out, "\nArea by year and ring");
        let _ = writeln!(out, "{:<6} {:<12} {:>14}", "year", "ring", "area_ha");
        for row in &self.time_series {
            let _ = writeln!(
                out,
                "{:<6} {:<12} {:>14.2}",
                row.year, row.ring_id, row.area_ha
            );
        }

        if !self.municipalities.is_empty() {
            let _ = writeln!(out, "\nTop municipalities");
            for (rank, row) in self.municipalities.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{:>3}. {:<30} {:>14.2}",
                    rank + 1,
                    row.municipality,
                    row.area_ha
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Summary {
        Summary {
            year_bounds: Some((2019, 2020)),
            ring_ids: vec!["0-5km".to_string(), ">5km".to_string()],
            time_series: vec![
                RingYearArea {
                    ring_id: "0-5km".to_string(),
                    year: 2019,
                    area_ha: 1.0,
                },
                RingYearArea {
                    ring_id: ">5km".to_string(),
                    year: 2020,
                    area_ha: 2.5,
                },
            ],
            totals: vec![
                RingTotalArea {
                    ring_id: ">5km".to_string(),
                    area_ha: 2.5,
                },
                RingTotalArea {
                    ring_id: "0-5km".to_string(),
                    area_ha: 1.0,
                },
            ],
            municipalities: Vec::new(),
        }
    }

    #[test]
    fn text_has_totals_and_series() {
        let text = sample().to_text();
        assert!(text.contains("Years: 2019-2020"));
        assert!(text.contains("Rings: 0-5km, >5km"));
        assert!(text.contains("total                  3.50"));
        assert!(text.contains("2020   >5km                   2.50"));
        assert!(!text.contains("Top municipalities"));
    }

    #[test]
    fn empty_store_text() {
        let summary = Summary {
            year_bounds: None,
            ring_ids: Vec::new(),
            time_series: Vec::new(),
            totals: Vec::new(),
            municipalities: Vec::new(),
        };
        assert!(summary.to_text().contains("Years: (no data)"));
    }

    #[test]
    fn json_round_trips_through_serde_json() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["year_bounds"], serde_json::json!([2019, 2020]));
        assert_eq!(value["totals"][0]["ring_id"], ">5km");
        assert_eq!(value["time_series"].as_array().unwrap().len(), 2);
    }
}
