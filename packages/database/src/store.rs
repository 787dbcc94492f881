#![allow(clippy::module_name_repetitions)]
//! The queryable `DuckDB` store.
//!
//! The store is rebuilt from scratch on every run. Intersection pieces are
//! inserted with their geometry as `GeoJSON` TEXT and the aggregate tables
//! are materialized from them with `GROUP BY`, so the tables always agree
//! with the pieces. Consumers open it read-only through [`Store`]; every
//! query opens and closes its own connection.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use deforest_rings_models::progress::ProgressCallback;
use deforest_rings_models::{
    IntersectionFeature, MunicipalityArea, RingSet, RingTotalArea, RingYearArea,
    SQ_METERS_PER_SQ_KM, SubdivisionFeature,
};
use duckdb::types::Value;
use duckdb::{Connection, params_from_iter};
use geo::Area as _;
use serde::Serialize;

use crate::DbError;
use crate::paths::ensure_parent;

/// What goes into the store.
#[derive(Debug, Clone, Copy)]
pub struct StoreInput<'a> {
    /// Ring partition, in order.
    pub rings: &'a RingSet,
    /// Intersection pieces.
    pub intersections: &'a [IntersectionFeature],
    /// Municipality pieces; the municipality tables are only created when
    /// present.
    pub municipalities: Option<&'a [SubdivisionFeature]>,
}

/// Row counts of a freshly built store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    /// Rows in `rings`.
    pub rings: usize,
    /// Rows in `intersections`.
    pub intersections: usize,
    /// Rows in `by_ring_year`.
    pub by_ring_year: usize,
    /// Rows in `by_ring`.
    pub by_ring: usize,
    /// Rows in `by_municipality`, if built.
    pub by_municipality: Option<usize>,
}

/// Builds the store at `path`, replacing any previous one.
///
/// All inserts run in a single transaction.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be replaced, a geometry cannot be
/// serialized, or any statement fails.
pub fn build_store(
    path: &Path,
    input: &StoreInput<'_>,
    progress: &dyn ProgressCallback,
) -> Result<StoreSummary, DbError> {
    ensure_parent(path)?;
    remove_existing(path)?;

    let conn = Connection::open(path)?;
    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;
    create_schema(&conn, input.municipalities.is_some())?;

    let total_rows = input.rings.len()
        + input.intersections.len()
        + input.municipalities.map_or(0, <[_]>::len);
    progress.set_total(total_rows as u64);
    progress.set_position(0);
    progress.set_message("store".to_string());

    conn.execute_batch("BEGIN TRANSACTION")?;
    if let Err(e) = insert_rows(&conn, input, progress) {
        if let Err(rollback) = conn.execute_batch("ROLLBACK") {
            log::warn!("Rollback failed: {rollback}");
        }
        progress.finish_and_clear();
        return Err(e);
    }
    conn.execute_batch("COMMIT")?;
    progress.finish_and_clear();

    materialize(&conn, input.municipalities.is_some())?;
    conn.execute_batch("CHECKPOINT")?;

    let summary = StoreSummary {
        rings: count_rows(&conn, "rings")?,
        intersections: count_rows(&conn, "intersections")?,
        by_ring_year: count_rows(&conn, "by_ring_year")?,
        by_ring: count_rows(&conn, "by_ring")?,
        by_municipality: if input.municipalities.is_some() {
            Some(count_rows(&conn, "by_municipality")?)
        } else {
            None
        },
    };

    log::info!(
        "Store built at {}: {} rings, {} pieces, {} ring-year rows",
        path.display(),
        summary.rings,
        summary.intersections,
        summary.by_ring_year
    );
    Ok(summary)
}

fn remove_existing(path: &Path) -> Result<(), DbError> {
    let mut wal = OsString::from(path.as_os_str());
    wal.push(".wal");

    for file in [path.to_path_buf(), PathBuf::from(wal)] {
        if file.exists() {
            log::debug!("Removing previous {}", file.display());
            std::fs::remove_file(&file)?;
        }
    }
    Ok(())
}

fn create_schema(conn: &Connection, with_municipalities: bool) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE rings (
            position INTEGER PRIMARY KEY,
            ring_id TEXT NOT NULL UNIQUE,
            min_km DOUBLE NOT NULL,
            max_km DOUBLE,
            area_km2 DOUBLE NOT NULL
        );

        CREATE TABLE intersections (
            id INTEGER PRIMARY KEY,
            ring_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            area_ha DOUBLE NOT NULL,
            geometry_geojson TEXT
        );",
    )?;

    if with_municipalities {
        conn.execute_batch(
            "CREATE TABLE municipality_pieces (
                municipality TEXT NOT NULL,
                ring_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                area_ha DOUBLE NOT NULL
            );",
        )?;
    }

    Ok(())
}

fn insert_rows(
    conn: &Connection,
    input: &StoreInput<'_>,
    progress: &dyn ProgressCallback,
) -> Result<(), DbError> {
    let mut stmt = conn.prepare(
        "INSERT INTO rings (position, ring_id, min_km, max_km, area_km2)
         VALUES (?, ?, ?, ?, ?)",
    )?;
    for (position, ring) in input.rings.rings.iter().enumerate() {
        let position = to_i32(position)?;
        stmt.execute(duckdb::params![
            position,
            ring.ring_id,
            ring.bounds.min_km,
            ring.bounds.max_km,
            ring.geometry.unsigned_area() / SQ_METERS_PER_SQ_KM,
        ])?;
        progress.inc(1);
    }

    let mut stmt = conn.prepare(
        "INSERT INTO intersections (id, ring_id, year, area_ha, geometry_geojson)
         VALUES (?, ?, ?, ?, ?)",
    )?;
    for (id, piece) in input.intersections.iter().enumerate() {
        let id = to_i32(id)?;
        let geometry = geojson::Geometry::new(geojson::Value::from(&piece.geometry));
        let geometry = serde_json::to_string(&geometry)?;
        stmt.execute(duckdb::params![
            id,
            piece.ring_id,
            piece.year,
            piece.area_ha,
            geometry,
        ])?;
        progress.inc(1);
    }

    if let Some(pieces) = input.municipalities {
        let mut stmt = conn.prepare(
            "INSERT INTO municipality_pieces (municipality, ring_id, year, area_ha)
             VALUES (?, ?, ?, ?)",
        )?;
        for piece in pieces {
            stmt.execute(duckdb::params![
                piece.municipality,
                piece.ring_id,
                piece.year,
                piece.area_ha,
            ])?;
            progress.inc(1);
        }
    }

    Ok(())
}

fn materialize(conn: &Connection, with_municipalities: bool) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE by_ring_year AS
        SELECT i.ring_id, i.year, SUM(i.area_ha) AS area_ha
        FROM intersections i
        LEFT JOIN rings r ON r.ring_id = i.ring_id
        GROUP BY i.ring_id, i.year, r.position
        ORDER BY i.year, r.position NULLS LAST, i.ring_id;

        CREATE TABLE by_ring AS
        SELECT b.ring_id, SUM(b.area_ha) AS area_ha
        FROM by_ring_year b
        LEFT JOIN rings r ON r.ring_id = b.ring_id
        GROUP BY b.ring_id, r.position
        ORDER BY 2 DESC, r.position NULLS LAST, b.ring_id;",
    )?;

    if with_municipalities {
        conn.execute_batch(
            "CREATE TABLE by_municipality_year_ring AS
            SELECT municipality, year, ring_id, SUM(area_ha) AS area_ha
            FROM municipality_pieces
            GROUP BY municipality, year, ring_id
            ORDER BY municipality, year, ring_id;

            CREATE TABLE by_municipality_ring AS
            SELECT municipality, ring_id, SUM(area_ha) AS area_ha
            FROM municipality_pieces
            GROUP BY municipality, ring_id
            ORDER BY municipality, ring_id;

            CREATE TABLE by_municipality AS
            SELECT municipality, SUM(area_ha) AS area_ha
            FROM municipality_pieces
            GROUP BY municipality
            ORDER BY 2 DESC, municipality;",
        )?;
    }

    Ok(())
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize, DbError> {
    let count: i64 = conn
        .prepare(&format!("SELECT COUNT(*) FROM {table}"))?
        .query_row([], |row| row.get(0))?;
    usize::try_from(count).map_err(|e| DbError::Conversion {
        message: format!("row count of {table}: {e}"),
    })
}

fn to_i32(value: usize) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|e| DbError::Conversion {
        message: format!("row index {value}: {e}"),
    })
}

/// Restricts store queries to a year range and a set of rings.
///
/// `ring_ids: None` means every ring; `Some(vec![])` selects nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Inclusive lower year bound.
    pub year_min: Option<i32>,
    /// Inclusive upper year bound.
    pub year_max: Option<i32>,
    /// Rings to keep.
    pub ring_ids: Option<Vec<String>>,
}

impl QueryFilter {
    /// Whether no row can match.
    #[must_use]
    pub fn selects_nothing(&self) -> bool {
        if let (Some(min), Some(max)) = (self.year_min, self.year_max)
            && min > max
        {
            return true;
        }
        self.ring_ids.as_ref().is_some_and(Vec::is_empty)
    }

    /// `WHERE` clause over the `year` and `ring_id` columns of `alias`,
    /// with its bound values in placeholder order.
    fn where_clause(&self, alias: &str) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(min) = self.year_min {
            conditions.push(format!("{alias}.year >= ?"));
            values.push(Value::Int(min));
        }
        if let Some(max) = self.year_max {
            conditions.push(format!("{alias}.year <= ?"));
            values.push(Value::Int(max));
        }
        if let Some(ids) = &self.ring_ids {
            let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            conditions.push(format!("{alias}.ring_id IN ({placeholders})"));
            values.extend(ids.iter().cloned().map(Value::Text));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

/// Read-only handle on a built store.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Points at the store file.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingStore`] if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if !path.exists() {
            return Err(DbError::MissingStore {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Store location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, DbError> {
        let config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
        Ok(Connection::open_with_flags(&self.path, config)?)
    }

    /// Smallest and largest year with data, or `None` for an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn year_bounds(&self) -> Result<Option<(i32, i32)>, DbError> {
        let conn = self.connect()?;
        let (min, max): (Option<i32>, Option<i32>) = conn.query_row(
            "SELECT MIN(year), MAX(year) FROM by_ring_year",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(min.zip(max))
    }

    /// Ring labels in partition order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn ring_ids(&self) -> Result<Vec<String>, DbError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT ring_id FROM rings ORDER BY position")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Area by ring and year within `filter`, ordered by year then ring.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn time_series(&self, filter: &QueryFilter) -> Result<Vec<RingYearArea>, DbError> {
        if filter.selects_nothing() {
            return Ok(Vec::new());
        }

        let (clause, values) = filter.where_clause("b");
        let sql = format!(
            "SELECT b.ring_id, b.year, b.area_ha
             FROM by_ring_year b
             LEFT JOIN rings r ON r.ring_id = b.ring_id
             {clause}
             ORDER BY b.year, r.position NULLS LAST, b.ring_id"
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(RingYearArea {
                    ring_id: row.get(0)?,
                    year: row.get(1)?,
                    area_ha: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Area by ring within `filter`, recomputed from `by_ring_year`,
    /// largest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn totals(&self, filter: &QueryFilter) -> Result<Vec<RingTotalArea>, DbError> {
        if filter.selects_nothing() {
            return Ok(Vec::new());
        }

        let (clause, values) = filter.where_clause("b");
        let sql = format!(
            "SELECT b.ring_id, SUM(b.area_ha) AS area_ha
             FROM by_ring_year b
             LEFT JOIN rings r ON r.ring_id = b.ring_id
             {clause}
             GROUP BY b.ring_id, r.position
             ORDER BY 2 DESC, r.position NULLS LAST, b.ring_id"
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(RingTotalArea {
                    ring_id: row.get(0)?,
                    area_ha: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether the municipality tables were built.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn has_municipalities(&self) -> Result<bool, DbError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_name = 'by_municipality_year_ring'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// The `limit` municipalities with the most area within `filter`.
    /// Empty when the store has no municipality tables.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn municipality_totals(
        &self,
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<MunicipalityArea>, DbError> {
        if filter.selects_nothing() || limit == 0 || !self.has_municipalities()? {
            return Ok(Vec::new());
        }

        let (clause, values) = filter.where_clause("m");
        let sql = format!(
            "SELECT m.municipality, SUM(m.area_ha) AS area_ha
             FROM by_municipality_year_ring m
             {clause}
             GROUP BY m.municipality
             ORDER BY 2 DESC, m.municipality
             LIMIT {limit}"
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(MunicipalityArea {
                    municipality: row.get(0)?,
                    area_ha: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use deforest_rings_models::progress::NullProgress;
    use deforest_rings_models::{Ring, RingBounds};
    use geo::{MultiPolygon, polygon};

    use super::*;

    struct TempStore {
        dir: PathBuf,
    }

    impl TempStore {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "deforest_rings_store_{name}_{}",
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&dir);
            Self { dir }
        }

        fn path(&self) -> PathBuf {
            self.dir.join("intersections.duckdb")
        }
    }

    impl Drop for TempStore {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn square(size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
        ]])
    }

    fn rings() -> RingSet {
        RingSet::new(vec![
            Ring::new(RingBounds::closed(0.0, 5.0), square(1_000.0)),
            Ring::new(RingBounds::closed(5.0, 10.0), square(2_000.0)),
            Ring::new(RingBounds::open(10.0), MultiPolygon::new(vec![])),
        ])
    }

    fn piece(ring_id: &str, year: i32, area_ha: f64) -> IntersectionFeature {
        IntersectionFeature {
            ring_id: ring_id.to_string(),
            year,
            area_ha,
            geometry: square(10.0),
        }
    }

    fn pieces() -> Vec<IntersectionFeature> {
        vec![
            piece(">10km", 2019, 4.0),
            piece("0-5km", 2019, 1.0),
            piece("0-5km", 2019, 2.0),
            piece("5-10km", 2020, 0.5),
            piece("0-5km", 2021, 1.5),
        ]
    }

    fn muni(name: &str, ring_id: &str, year: i32, area_ha: f64) -> SubdivisionFeature {
        SubdivisionFeature {
            municipality: name.to_string(),
            ring_id: ring_id.to_string(),
            year,
            area_ha,
        }
    }

    fn build(tmp: &TempStore, municipalities: Option<&[SubdivisionFeature]>) -> StoreSummary {
        let rings = rings();
        let intersections = pieces();
        build_store(
            &tmp.path(),
            &StoreInput {
                rings: &rings,
                intersections: &intersections,
                municipalities,
            },
            &NullProgress,
        )
        .unwrap()
    }

    #[test]
    fn build_materializes_aggregates() {
        let tmp = TempStore::new("build");
        let summary = build(&tmp, None);
        assert_eq!(summary.rings, 3);
        assert_eq!(summary.intersections, 5);
        assert_eq!(summary.by_ring_year, 4);
        assert_eq!(summary.by_ring, 3);
        assert_eq!(summary.by_municipality, None);

        let store = Store::open(&tmp.path()).unwrap();
        assert_eq!(store.year_bounds().unwrap(), Some((2019, 2021)));
        assert_eq!(store.ring_ids().unwrap(), vec!["0-5km", "5-10km", ">10km"]);

        let series = store.time_series(&QueryFilter::default()).unwrap();
        let keys: Vec<(i32, &str)> = series
            .iter()
            .map(|r| (r.year, r.ring_id.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![(2019, "0-5km"), (2019, ">10km"), (2020, "5-10km"), (2021, "0-5km")]
        );
        assert!((series[0].area_ha - 3.0).abs() < 1e-12);
        assert!(!store.has_municipalities().unwrap());
    }

    #[test]
    fn totals_follow_the_filter() {
        let tmp = TempStore::new("totals");
        build(&tmp, None);
        let store = Store::open(&tmp.path()).unwrap();

        let all = store.totals(&QueryFilter::default()).unwrap();
        assert_eq!(all[0].ring_id, "0-5km");
        assert!((all[0].area_ha - 4.5).abs() < 1e-12);
        assert_eq!(all[1].ring_id, ">10km");

        let filter = QueryFilter {
            year_min: Some(2020),
            year_max: Some(2021),
            ring_ids: Some(vec!["0-5km".to_string(), "5-10km".to_string()]),
        };
        let filtered = store.totals(&filter).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].ring_id, "0-5km");
        assert!((filtered[0].area_ha - 1.5).abs() < 1e-12);
        assert!((filtered[1].area_ha - 0.5).abs() < 1e-12);

        let series = store.time_series(&filter).unwrap();
        let summed: f64 = series.iter().map(|r| r.area_ha).sum();
        let total: f64 = filtered.iter().map(|r| r.area_ha).sum();
        assert!((summed - total).abs() < 1e-12);
    }

    #[test]
    fn empty_ring_selection_matches_nothing() {
        let tmp = TempStore::new("empty_rings");
        build(&tmp, None);
        let store = Store::open(&tmp.path()).unwrap();

        let filter = QueryFilter {
            ring_ids: Some(Vec::new()),
            ..QueryFilter::default()
        };
        assert!(store.time_series(&filter).unwrap().is_empty());
        assert!(store.totals(&filter).unwrap().is_empty());

        let inverted = QueryFilter {
            year_min: Some(2021),
            year_max: Some(2019),
            ring_ids: None,
        };
        assert!(store.totals(&inverted).unwrap().is_empty());
    }

    #[test]
    fn municipality_tables_are_optional() {
        let tmp = TempStore::new("municipalities");
        let municipal = vec![
            muni("Boa Vista", "0-5km", 2019, 2.0),
            muni("Caracaraí", "0-5km", 2019, 1.0),
            muni("Caracaraí", ">10km", 2021, 3.0),
            muni("Mucajaí", "5-10km", 2020, 0.5),
        ];
        let summary = build(&tmp, Some(&municipal));
        assert_eq!(summary.by_municipality, Some(3));

        let store = Store::open(&tmp.path()).unwrap();
        assert!(store.has_municipalities().unwrap());

        let top = store
            .municipality_totals(&QueryFilter::default(), 2)
            .unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].municipality, "Caracaraí");
        assert!((top[0].area_ha - 4.0).abs() < 1e-12);

        let early = QueryFilter {
            year_max: Some(2019),
            ..QueryFilter::default()
        };
        let top = store.municipality_totals(&early, 10).unwrap();
        assert_eq!(top[0].municipality, "Boa Vista");
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn rebuild_replaces_previous_store() {
        let tmp = TempStore::new("rebuild");
        build(&tmp, None);
        let summary = build(&tmp, None);
        assert_eq!(summary.intersections, 5);
    }

    #[test]
    fn empty_overlay_builds_empty_tables() {
        let tmp = TempStore::new("empty");
        let rings = rings();
        let summary = build_store(
            &tmp.path(),
            &StoreInput {
                rings: &rings,
                intersections: &[],
                municipalities: None,
            },
            &NullProgress,
        )
        .unwrap();
        assert_eq!(summary.by_ring_year, 0);

        let store = Store::open(&tmp.path()).unwrap();
        assert_eq!(store.year_bounds().unwrap(), None);
        assert!(store.totals(&QueryFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn missing_store_is_reported() {
        let tmp = TempStore::new("missing");
        let err = Store::open(&tmp.path()).unwrap_err();
        assert!(matches!(err, DbError::MissingStore { .. }));
    }
}
