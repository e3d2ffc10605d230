/*!
 * Geographic calculations.
 *
 * Everything here is a simple (approximate) calculation suited to regional scale maps. Outage
 * reports within a single province or utility service area are well within the range where these
 * approximations hold up.
 */
use std::fmt::{self, Display};

pub use enclosing_circle::{enclosing_circle, enclosing_circle_with_rng, Circle, Point};
pub(crate) use enclosing_circle::welzl;
pub(crate) use grid_index::GridIndex;

mod enclosing_circle;
mod grid_index;

/// Kilometers per degree of latitude used by the local planar projection.
pub(crate) const KM_PER_DEGREE: f64 = 111.32;

const DEG2RAD: f64 = 2.0 * std::f64::consts::PI / 360.0;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    /// Check whether both the latitude and longitude are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Test if these coordinates are within `eps` of each other in both latitude and longitude.
    pub fn is_close(&self, other: Coord, eps: f64) -> bool {
        (self.lat - other.lat).abs() <= eps && (self.lon - other.lon).abs() <= eps
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A latitude-longitude aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// The lower left (southwest) corner.
    pub ll: Coord,
    /// The upper right (northeast) corner.
    pub ur: Coord,
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox {
            ll: Coord {
                lat: f64::INFINITY,
                lon: f64::INFINITY,
            },
            ur: Coord {
                lat: -f64::INFINITY,
                lon: -f64::INFINITY,
            },
        }
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "[{} -> {}]", self.ll, self.ur)
    }
}

impl BoundingBox {
    /// The smallest box containing all the coordinates, `None` if there are none.
    pub fn from_coords<I: IntoIterator<Item = Coord>>(coords: I) -> Option<Self> {
        let mut bbox = BoundingBox::default();
        let mut any = false;

        for coord in coords {
            bbox.expand_to(coord);
            any = true;
        }

        if any {
            Some(bbox)
        } else {
            None
        }
    }

    /// Grow the box, if needed, to include `coord`.
    pub fn expand_to(&mut self, coord: Coord) {
        self.ll.lat = self.ll.lat.min(coord.lat);
        self.ll.lon = self.ll.lon.min(coord.lon);
        self.ur.lat = self.ur.lat.max(coord.lat);
        self.ur.lon = self.ur.lon.max(coord.lon);
    }

    /// Check if two boxes overlap, boxes within `eps` of touching count as overlapping.
    pub fn overlap(&self, other: &BoundingBox, eps: f64) -> bool {
        self.ll.lat <= other.ur.lat + eps
            && other.ll.lat <= self.ur.lat + eps
            && self.ll.lon <= other.ur.lon + eps
            && other.ll.lon <= self.ur.lon + eps
    }
}

/// Anything with a location and an extent on the Earth's surface.
pub trait Geo {
    /// The geographic center of the object.
    fn centroid(&self) -> Coord;

    /// A box that contains the whole object.
    fn bounding_box(&self) -> BoundingBox;
}

/**
 * The simple great circle distance calculation.
 *
 * #Arguments
 * * lat1 - the latitude of the first point in degrees.
 * * lon1 - the longitude of the first point in degrees.
 * * lat2 - the latitude of the second point in degrees.
 * * lon2 - the longitude of the second point in degrees.
 *
 * #Returns
 * The distance between the points in kilometers.
 */
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0090;

    let lat1_r = lat1 * DEG2RAD;
    let lon1_r = lon1 * DEG2RAD;
    let lat2_r = lat2 * DEG2RAD;
    let lon2_r = lon2 * DEG2RAD;

    let dlat2 = (lat2_r - lat1_r) / 2.0;
    let dlon2 = (lon2_r - lon1_r) / 2.0;

    let sin2_dlat = f64::powi(f64::sin(dlat2), 2);
    let sin2_dlon = f64::powi(f64::sin(dlon2), 2);

    // Clamp so rounding can't push the argument of asin past 1 for antipodal points.
    let h = (sin2_dlat + sin2_dlon * f64::cos(lat1_r) * f64::cos(lat2_r)).min(1.0);

    2.0 * f64::asin(f64::sqrt(h)) * EARTH_RADIUS_KM
}

/**
 * A coordinate mapped onto an approximate local kilometer grid.
 *
 * The longitude scale uses the cosine of each point's own latitude rather than that of a shared
 * origin. Pairs of points far apart in latitude are distorted, and the whole thing falls apart
 * near the poles, but the clustering thresholds used by map callers were tuned against exactly
 * this distance, so it must not be swapped for a geodesic calculation.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x_km: f64,
    pub y_km: f64,
}

impl ProjectedPoint {
    pub fn project(coord: Coord) -> Self {
        let x_km = coord.lat * KM_PER_DEGREE;
        let y_km = coord.lon * KM_PER_DEGREE * f64::cos(coord.lat * DEG2RAD);

        ProjectedPoint { x_km, y_km }
    }

    /// Map back to latitude and longitude.
    ///
    /// At the poles the longitude scale is zero and the longitude comes back as 0.0.
    pub fn unproject(&self) -> Coord {
        let lat = self.x_km / KM_PER_DEGREE;
        let scale = KM_PER_DEGREE * f64::cos(lat * DEG2RAD);

        let lon = if scale.abs() < f64::EPSILON {
            0.0
        } else {
            self.y_km / scale
        };

        Coord { lat, lon }
    }

    pub fn distance_squared(&self, other: &ProjectedPoint) -> f64 {
        let dx = self.x_km - other.x_km;
        let dy = self.y_km - other.y_km;
        dx * dx + dy * dy
    }
}

impl From<ProjectedPoint> for Point {
    fn from(pp: ProjectedPoint) -> Self {
        Point {
            x: pp.x_km,
            y: pp.y_km,
        }
    }
}

impl From<Point> for ProjectedPoint {
    fn from(p: Point) -> Self {
        ProjectedPoint {
            x_km: p.x,
            y_km: p.y,
        }
    }
}
