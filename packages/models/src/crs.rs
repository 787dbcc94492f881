//! Coordinate reference system identifiers.
//!
//! A [`Crs`] is either an EPSG code from a small built-in table or a raw
//! PROJ.4 definition string. Only the identity and its PROJ.4 form live
//! here; the actual transformation is done by the geometry crate.

use std::fmt;
use std::str::FromStr;

/// WGS 84 geographic.
pub const EPSG_WGS84: u32 = 4326;

/// SIRGAS 2000 geographic.
pub const EPSG_SIRGAS2000: u32 = 4674;

/// Web Mercator.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// SIRGAS 2000 / Brazil Polyconic.
pub const EPSG_BRAZIL_POLYCONIC: u32 = 5880;

/// South America Albers Equal Area Conic on the GRS80 ellipsoid, metres.
pub const SOUTH_AMERICA_ALBERS: &str = "+proj=aea +lat_0=-32 +lon_0=-60 +lat_1=-5 +lat_2=-42 +x_0=0 +y_0=0 +ellps=GRS80 +units=m +no_defs";

/// EPSG codes with a known PROJ.4 definition.
const EPSG_DEFINITIONS: &[(u32, &str)] = &[
    (EPSG_WGS84, "+proj=longlat +datum=WGS84 +no_defs"),
    (
        EPSG_SIRGAS2000,
        "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs",
    ),
    (
        EPSG_WEB_MERCATOR,
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs",
    ),
    (
        EPSG_BRAZIL_POLYCONIC,
        "+proj=poly +lat_0=0 +lon_0=-54 +x_0=5000000 +y_0=10000000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
    ),
];

/// A coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// An EPSG code.
    Epsg(u32),
    /// A raw PROJ.4 definition.
    Proj(String),
}

/// Error returned when a CRS string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized CRS '{input}': expected 'EPSG:<code>', an OGC URN, or a '+proj=' string")]
pub struct CrsParseError {
    /// The rejected input.
    pub input: String,
}

impl Crs {
    /// WGS 84 geographic coordinates.
    #[must_use]
    pub const fn wgs84() -> Self {
        Self::Epsg(EPSG_WGS84)
    }

    /// The default planar equal-area CRS.
    #[must_use]
    pub fn equal_area_default() -> Self {
        Self::Proj(SOUTH_AMERICA_ALBERS.to_string())
    }

    /// PROJ.4 definition, or `None` for an EPSG code outside the
    /// built-in table.
    #[must_use]
    pub fn proj_string(&self) -> Option<&str> {
        match self {
            Self::Epsg(code) => EPSG_DEFINITIONS
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, def)| *def),
            Self::Proj(def) => Some(def.as_str()),
        }
    }

    /// Whether coordinates are longitude/latitude in degrees.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        self.proj_string()
            .is_some_and(|def| def.contains("+proj=longlat") || def.contains("+proj=latlong"))
    }

    /// Parses the `crs.properties.name` value of a legacy `GeoJSON` CRS
    /// member, e.g. `urn:ogc:def:crs:EPSG::5880` or
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`.
    #[must_use]
    pub fn from_urn(name: &str) -> Option<Self> {
        let name = name.trim();
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Self::wgs84());
        }
        if let Some(pos) = upper.find("EPSG") {
            let code = upper[pos + 4..].trim_start_matches(':');
            let code = code.rsplit(':').next().unwrap_or(code);
            return code.parse().ok().map(Self::Epsg);
        }
        None
    }

    /// The URN form used when writing a `GeoJSON` CRS member, if this CRS
    /// has an EPSG code.
    #[must_use]
    pub fn urn(&self) -> Option<String> {
        match self {
            Self::Epsg(code) => Some(format!("urn:ogc:def:crs:EPSG::{code}")),
            Self::Proj(_) => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epsg(code) => write!(f, "EPSG:{code}"),
            Self::Proj(def) => f.write_str(def),
        }
    }
}

impl FromStr for Crs {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.starts_with('+') {
            return Ok(Self::Proj(trimmed.to_string()));
        }
        if let Some(code) = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("EPSG:"))
            .and_then(|_| trimmed[5..].parse::<u32>().ok())
        {
            return Ok(Self::Epsg(code));
        }
        Self::from_urn(trimmed).ok_or_else(|| CrsParseError {
            input: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epsg_codes() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::wgs84());
        assert_eq!("epsg:5880".parse::<Crs>().unwrap(), Crs::Epsg(5880));
    }

    #[test]
    fn parses_urns() {
        assert_eq!(
            Crs::from_urn("urn:ogc:def:crs:EPSG::5880"),
            Some(Crs::Epsg(5880))
        );
        assert_eq!(
            Crs::from_urn("urn:ogc:def:crs:OGC:1.3:CRS84"),
            Some(Crs::wgs84())
        );
        assert_eq!(Crs::from_urn("something else"), None);
    }

    #[test]
    fn parses_proj_strings() {
        let crs: Crs = SOUTH_AMERICA_ALBERS.parse().unwrap();
        assert_eq!(crs, Crs::equal_area_default());
        assert!(!crs.is_geographic());
        assert!(crs.urn().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!("not a crs".parse::<Crs>().is_err());
    }

    #[test]
    fn geographic_detection() {
        assert!(Crs::wgs84().is_geographic());
        assert!(Crs::Epsg(EPSG_SIRGAS2000).is_geographic());
        assert!(!Crs::Epsg(EPSG_BRAZIL_POLYCONIC).is_geographic());
        assert!(Crs::Epsg(32633).proj_string().is_none());
    }

    #[test]
    fn display_roundtrip() {
        let crs = Crs::Epsg(3857);
        assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
    }
}
