//! CRS reprojection backed by `proj4rs` (pure Rust).

use deforest_rings_models::Crs;
use geo::{Coord, MapCoords};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::GeometryError;

/// Source and target projections for a non-identity transform.
struct ProjPair {
    source: Proj,
    target: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

/// Reusable coordinate transformer between two [`Crs`] values.
///
/// When source and target are the same CRS the transformer is an
/// identity and geometries are cloned unchanged.
pub struct Reprojector {
    from: Crs,
    to: Crs,
    pair: Option<ProjPair>,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("identity", &self.pair.is_none())
            .finish()
    }
}

fn build_proj(crs: &Crs) -> Result<Proj, GeometryError> {
    let def = crs.proj_string().ok_or_else(|| GeometryError::Projection {
        message: format!("{crs} has no built-in definition; use a '+proj=' string instead"),
    })?;
    Proj::from_proj_string(def).map_err(|e| GeometryError::Projection {
        message: format!("invalid projection {crs}: {e:?}"),
    })
}

impl Reprojector {
    /// Creates a transformer from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if either CRS has no usable
    /// PROJ.4 definition.
    pub fn new(from: &Crs, to: &Crs) -> Result<Self, GeometryError> {
        let pair = if from == to {
            None
        } else {
            Some(ProjPair {
                source: build_proj(from)?,
                target: build_proj(to)?,
                source_is_geographic: from.is_geographic(),
                target_is_geographic: to.is_geographic(),
            })
        };

        Ok(Self {
            from: from.clone(),
            to: to.clone(),
            pair,
        })
    }

    /// Whether this transformer leaves coordinates untouched.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.pair.is_none()
    }

    /// Transforms one coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if the transformation fails
    /// or produces a non-finite coordinate.
    pub fn coord(&self, c: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        let Some(pair) = &self.pair else {
            return Ok(c);
        };

        let (x, y) = if pair.source_is_geographic {
            (c.x.to_radians(), c.y.to_radians())
        } else {
            (c.x, c.y)
        };

        let mut point = (x, y, 0.0);
        transform(&pair.source, &pair.target, &mut point).map_err(|e| {
            GeometryError::Projection {
                message: format!(
                    "failed to transform ({}, {}) from {} to {}: {e:?}",
                    c.x, c.y, self.from, self.to
                ),
            }
        })?;

        let (x, y) = if pair.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !x.is_finite() || !y.is_finite() {
            return Err(GeometryError::Projection {
                message: format!(
                    "({}, {}) has no finite image in {}",
                    c.x, c.y, self.to
                ),
            });
        }

        Ok(Coord { x, y })
    }

    /// Transforms every coordinate of a geometry.
    ///
    /// # Errors
    ///
    /// Returns the first coordinate error encountered.
    pub fn geometry<G>(&self, geometry: &G) -> Result<G, GeometryError>
    where
        G: MapCoords<f64, f64, Output = G> + Clone,
    {
        if self.is_identity() {
            return Ok(geometry.clone());
        }
        geometry.try_map_coords(|c| self.coord(c))
    }
}

#[cfg(test)]
mod tests {
    use deforest_rings_models::crs::EPSG_WEB_MERCATOR;
    use geo::{Area as _, MultiPolygon, polygon};

    use super::*;

    #[test]
    fn identity_keeps_coordinates() {
        let r = Reprojector::new(&Crs::wgs84(), &Crs::wgs84()).unwrap();
        assert!(r.is_identity());
        let c = r.coord(Coord { x: -60.7, y: 2.8 }).unwrap();
        assert!((c.x + 60.7).abs() < f64::EPSILON);
        assert!((c.y - 2.8).abs() < f64::EPSILON);
    }

    #[test]
    fn wgs84_to_web_mercator_known_point() {
        let r = Reprojector::new(&Crs::wgs84(), &Crs::Epsg(EPSG_WEB_MERCATOR)).unwrap();
        let c = r.coord(Coord { x: 180.0, y: 0.0 }).unwrap();
        assert!((c.x - 20_037_508.342_789).abs() < 1.0, "x = {}", c.x);
        assert!(c.y.abs() < 1e-6);
    }

    #[test]
    fn roundtrip_through_equal_area() {
        let forward = Reprojector::new(&Crs::wgs84(), &Crs::equal_area_default()).unwrap();
        let back = Reprojector::new(&Crs::equal_area_default(), &Crs::wgs84()).unwrap();
        let original = Coord { x: -61.2, y: 2.4 };
        let projected = forward.coord(original).unwrap();
        let restored = back.coord(projected).unwrap();
        assert!((restored.x - original.x).abs() < 1e-7);
        assert!((restored.y - original.y).abs() < 1e-7);
    }

    #[test]
    fn equal_area_square_degree_near_equator() {
        // One square degree at the equator is roughly 111.3 km x 110.6 km.
        let forward = Reprojector::new(&Crs::wgs84(), &Crs::equal_area_default()).unwrap();
        let cell = MultiPolygon::new(vec![polygon![
            (x: -61.0, y: 0.0),
            (x: -60.0, y: 0.0),
            (x: -60.0, y: 1.0),
            (x: -61.0, y: 1.0),
        ]]);
        let projected = forward.geometry(&cell).unwrap();
        let km2 = projected.unsigned_area() / 1e6;
        assert!((km2 - 12_308.0).abs() / 12_308.0 < 0.01, "area = {km2} km2");
    }

    #[test]
    fn unknown_epsg_is_an_error() {
        let err = Reprojector::new(&Crs::wgs84(), &Crs::Epsg(32633)).unwrap_err();
        assert!(matches!(err, GeometryError::Projection { .. }));
    }
}
