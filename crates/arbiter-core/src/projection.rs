//! Geographic to planar projection.
//!
//! Corridors are buffered and measured in meters, so every path goes through
//! one UTM zone fixed for the deployment's operating region.

use serde::{Deserialize, Serialize};

use crate::error::{ArbiterError, Result};
use crate::models::GeoPoint;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const FALSE_EASTING_M: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH_M: f64 = 10_000_000.0;
const UTM_MIN_LAT: f64 = -80.0;
const UTM_MAX_LAT: f64 = 84.0;

/// Default zone, EPSG:32636 (33°E to 39°E, northern hemisphere).
pub const DEFAULT_UTM_ZONE: u8 = 36;

/// Furthest a point may sit from the zone's central meridian.
pub const MAX_ZONE_OFFSET_DEG: f64 = 9.0;

/// Planar point in meters (easting, northing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    #[default]
    North,
    South,
}

/// Transverse Mercator forward projection for a single UTM zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmProjection {
    zone: u8,
    hemisphere: Hemisphere,
    central_meridian_deg: f64,
}

impl Default for UtmProjection {
    fn default() -> Self {
        Self {
            zone: DEFAULT_UTM_ZONE,
            hemisphere: Hemisphere::North,
            central_meridian_deg: central_meridian(DEFAULT_UTM_ZONE),
        }
    }
}

impl UtmProjection {
    pub fn new(zone: u8, hemisphere: Hemisphere) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(ArbiterError::InvalidZone(zone));
        }
        Ok(Self {
            zone,
            hemisphere,
            central_meridian_deg: central_meridian(zone),
        })
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    pub fn central_meridian_deg(&self) -> f64 {
        self.central_meridian_deg
    }

    /// Project a geographic point to UTM easting/northing.
    pub fn project(&self, point: &GeoPoint) -> Result<PlanarPoint> {
        self.check_domain(point)?;

        let e2 = WGS84_F * (2.0 - WGS84_F);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);

        let phi = point.lat.to_radians();
        let dlambda = wrap_degrees(point.lng - self.central_meridian_deg).to_radians();

        let sin_phi = phi.sin();
        let cos_phi = phi.cos();
        let tan_phi = phi.tan();

        let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * dlambda;

        // Meridional arc length from the equator.
        let m = WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = UTM_K0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
            + FALSE_EASTING_M;

        let mut y = UTM_K0
            * (m + n
                * tan_phi
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

        if self.hemisphere == Hemisphere::South {
            y += FALSE_NORTHING_SOUTH_M;
        }

        Ok(PlanarPoint { x, y })
    }

    /// Project every point, failing on the first out-of-domain coordinate.
    pub fn project_all(&self, points: &[GeoPoint]) -> Result<Vec<PlanarPoint>> {
        points.iter().map(|p| self.project(p)).collect()
    }

    fn check_domain(&self, point: &GeoPoint) -> Result<()> {
        let invalid = |reason| ArbiterError::InvalidCoordinate {
            lat: point.lat,
            lng: point.lng,
            reason,
        };

        if !point.lat.is_finite() || !point.lng.is_finite() {
            return Err(invalid("coordinate is not a finite number"));
        }
        if !(UTM_MIN_LAT..=UTM_MAX_LAT).contains(&point.lat) {
            return Err(invalid("latitude outside the UTM domain [-80, 84]"));
        }
        if !(-180.0..=180.0).contains(&point.lng) {
            return Err(invalid("longitude outside [-180, 180]"));
        }
        if wrap_degrees(point.lng - self.central_meridian_deg).abs() > MAX_ZONE_OFFSET_DEG {
            return Err(invalid("longitude too far from the configured UTM zone"));
        }
        Ok(())
    }
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

fn wrap_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Offset a point by a local east/north displacement in meters.
///
/// Accurate for the few-kilometer offsets used to lay out simulated fleets.
pub fn offset_geo(origin: &GeoPoint, east_m: f64, north_m: f64) -> GeoPoint {
    let lat = origin.lat + north_m / meters_per_deg_lat(origin.lat).max(1e-9);
    let lng = origin.lng + east_m / meters_per_deg_lon(origin.lat).max(1e-9);
    GeoPoint { lat, lng }
}
