//! Flat CSV tables.

use std::path::Path;

use deforest_rings_models::{
    MunicipalityArea, MunicipalityRingArea, MunicipalityYearRingArea, RingTotalArea,
    RingYearArea,
};
use serde::Serialize;

use crate::DbError;
use crate::paths::{PipelinePaths, ensure_parent};

/// Writes `rows` to `path` with an explicit header line, so an empty
/// table still has its columns.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be created or a row cannot be
/// serialized.
pub fn write_csv<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<(), DbError> {
    ensure_parent(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    log::debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes `by_ring_year.csv` and `by_ring_total.csv`.
///
/// # Errors
///
/// Returns [`DbError`] if either file cannot be written.
pub fn write_ring_csvs(
    paths: &PipelinePaths,
    by_ring_year: &[RingYearArea],
    by_ring: &[RingTotalArea],
) -> Result<(), DbError> {
    write_csv(
        &paths.by_ring_year_csv(),
        &["ring_id", "year", "area_ha"],
        by_ring_year,
    )?;
    write_csv(&paths.by_ring_total_csv(), &["ring_id", "area_ha"], by_ring)?;
    Ok(())
}

/// Writes the three municipality tables.
///
/// # Errors
///
/// Returns [`DbError`] if any file cannot be written.
pub fn write_municipality_csvs(
    paths: &PipelinePaths,
    totals: &[MunicipalityArea],
    by_ring: &[MunicipalityRingArea],
    by_year_ring: &[MunicipalityYearRingArea],
) -> Result<(), DbError> {
    write_csv(
        &paths.by_municipality_csv(),
        &["municipality", "area_ha"],
        totals,
    )?;
    write_csv(
        &paths.by_municipality_ring_csv(),
        &["municipality", "ring_id", "area_ha"],
        by_ring,
    )?;
    write_csv(
        &paths.by_municipality_year_ring_csv(),
        &["municipality", "year", "ring_id", "area_ha"],
        by_year_ring,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "deforest_rings_export_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn empty_table_keeps_its_header() {
        let dir = temp_dir("empty");
        let path = dir.join("by_ring_total.csv");
        write_csv::<RingTotalArea>(&path, &["ring_id", "area_ha"], &[]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), "ring_id,area_ha");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rows_follow_the_header() {
        let dir = temp_dir("rows");
        let path = dir.join("by_ring_year.csv");
        let rows = vec![
            RingYearArea {
                ring_id: "0-5km".to_string(),
                year: 2019,
                area_ha: 1.5,
            },
            RingYearArea {
                ring_id: ">5km".to_string(),
                year: 2020,
                area_ha: 2.0,
            },
        ];
        write_csv(&path, &["ring_id", "year", "area_ha"], &rows).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["ring_id", "year", "area_ha"]);
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1][0], ">5km");
        assert_eq!(&records[1][1], "2020");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
