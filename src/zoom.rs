/*!
 * Map zoom levels and the clustering threshold used at each.
 *
 * The thresholds follow the usual web map tile scheme where each zoom level halves the ground
 * distance covered by a pixel. Markers closer together than roughly a marker's width on screen are
 * merged into a single cluster.
 */
use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// The most detailed zoom level supported.
pub const MAX_ZOOM: u8 = 20;

/// Clustering threshold in kilometers for each zoom level, indexed by the level.
const THRESHOLDS_KM: [f64; MAX_ZOOM as usize + 1] = [
    5000.0, // 0 - the whole world
    2500.0, 1250.0, 600.0, 300.0, 150.0, // 1 - 5, continents to countries
    80.0, 40.0, 20.0, 10.0, 5.0, // 6 - 10, regions to cities
    2.5, 1.2, 0.6, 0.3, 0.15, // 11 - 15, towns to neighborhoods
    0.08, 0.04, 0.02, 0.01, 0.005, // 16 - 20, streets to buildings
];

/// A map zoom level from 0 (whole world) to [MAX_ZOOM].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoomLevel(u8);

impl ZoomLevel {
    /// Create a zoom level, `None` if `level` is greater than [MAX_ZOOM].
    pub fn new(level: u8) -> Option<Self> {
        if level <= MAX_ZOOM {
            Some(ZoomLevel(level))
        } else {
            None
        }
    }

    /// Map clients usually report fractional zoom levels while animating. Round down to the
    /// nearest whole level and clamp into range, NaN maps to the whole world view.
    pub fn from_fractional(zoom: f64) -> Self {
        if zoom.is_nan() || zoom <= 0.0 {
            ZoomLevel(0)
        } else if zoom >= MAX_ZOOM as f64 {
            ZoomLevel(MAX_ZOOM)
        } else {
            ZoomLevel(zoom.floor() as u8)
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// The clustering threshold for this level in kilometers.
    pub fn threshold_km(&self) -> f64 {
        THRESHOLDS_KM[self.0 as usize]
    }

    /// Iterate over every zoom level from the whole world down to [MAX_ZOOM].
    pub fn all() -> impl Iterator<Item = ZoomLevel> {
        (0..=MAX_ZOOM).map(ZoomLevel)
    }
}

impl Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ZoomLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(level) = s.parse::<u8>() {
            return ZoomLevel::new(level)
                .ok_or_else(|| format!("zoom level {} is past the maximum of {}", level, MAX_ZOOM));
        }

        match s.parse::<f64>() {
            Ok(zoom) if zoom.is_finite() && (0.0..=MAX_ZOOM as f64).contains(&zoom) => {
                Ok(ZoomLevel::from_fractional(zoom))
            }
            _ => Err(format!("invalid zoom level: '{}'", s)),
        }
    }
}
