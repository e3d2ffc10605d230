/*!
 * A single power outage report.
 *
 * Reports are created by the caller from whatever feed the utility publishes and are never
 * modified by the clustering code.
 */
use crate::{
    geo::{BoundingBox, Coord, Geo},
    OutageResult,
};
use chrono::{DateTime, Duration, Utc};

/// The area reported as affected by an outage.
#[derive(Debug, Clone, PartialEq)]
pub enum AffectedArea {
    /// A well-known-text geometry, as published by most utility feeds.
    Wkt(String),
    /// A ring of coordinates, the first and last vertex may or may not repeat.
    Ring(Vec<Coord>),
}

impl AffectedArea {
    /// Get the outer ring of the area as coordinates.
    ///
    /// Only `POLYGON` and `MULTIPOLYGON` geometries are understood, for a multipolygon this is the
    /// outer ring of the first polygon. Returns `None` if the text can't be parsed or the ring
    /// has fewer than 3 vertices.
    pub fn outer_ring(&self) -> Option<Vec<Coord>> {
        match self {
            Self::Ring(coords) if coords.len() >= 3 => Some(coords.clone()),
            Self::Ring(_) => None,
            Self::Wkt(text) => parse_wkt_outer_ring(text),
        }
    }
}

fn parse_wkt_outer_ring(text: &str) -> Option<Vec<Coord>> {
    let text = text.trim();
    let upper = text.to_ascii_uppercase();
    if !(upper.starts_with("POLYGON") || upper.starts_with("MULTIPOLYGON")) {
        return None;
    }

    // Skip the geometry name and the run of opening parens, the first ring ends at the first
    // closing paren.
    let body = &text[text.find('(')?..];
    let body = body.trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let body = &body[..body.find(')')?];

    let mut ring = Vec::with_capacity(16);
    for vertex in body.split(',') {
        let mut parts = vertex.split_whitespace();
        // WKT order is x y, which is lon lat.
        let lon: f64 = parts.next()?.parse().ok()?;
        let lat: f64 = parts.next()?.parse().ok()?;

        let coord = Coord { lat, lon };
        if !coord.is_finite() {
            return None;
        }
        ring.push(coord);
    }

    if ring.len() >= 3 {
        Some(ring)
    } else {
        None
    }
}

/// An outage report with a location, who reported it, and when.
#[derive(Debug, Clone, PartialEq)]
pub struct OutageRecord {
    id: String,
    provider: String,
    coord: Coord,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    area: Option<AffectedArea>,
}

impl OutageRecord {
    pub fn new<S: Into<String>, P: Into<String>>(
        id: S,
        provider: P,
        coord: Coord,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        area: Option<AffectedArea>,
    ) -> Self {
        OutageRecord {
            id: id.into(),
            provider: provider.into(),
            coord,
            start,
            end,
            area,
        }
    }

    /// Build a record from epoch timestamps in seconds.
    pub fn from_timestamps<S: Into<String>, P: Into<String>>(
        id: S,
        provider: P,
        coord: Coord,
        start: i64,
        end: Option<i64>,
        area: Option<AffectedArea>,
    ) -> OutageResult<Self> {
        let start = parse_timestamp(start)?;
        let end = end.map(parse_timestamp).transpose()?;

        Ok(Self::new(id, provider, coord, start, end, area))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The utility or agency that reported this outage.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn lat(&self) -> f64 {
        self.coord.lat
    }

    pub fn lon(&self) -> f64 {
        self.coord.lon
    }

    /// When the outage started. This is the primary timestamp of a record.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// When power was restored, `None` if it's still out.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn area(&self) -> Option<&AffectedArea> {
        self.area.as_ref()
    }

    pub fn is_ongoing(&self) -> bool {
        self.end.is_none()
    }

    /// How long the outage lasted, or has lasted so far as of `now` if it's ongoing.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.end.unwrap_or(now) - self.start
    }
}

impl Geo for OutageRecord {
    fn centroid(&self) -> Coord {
        self.coord
    }

    fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            ll: self.coord,
            ur: self.coord,
        };

        if let Some(ring) = self.area.as_ref().and_then(AffectedArea::outer_ring) {
            for coord in ring {
                bbox.expand_to(coord);
            }
        }

        bbox
    }
}

fn parse_timestamp(ts: i64) -> OutageResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| format!("timestamp out of range: {}", ts).into())
}
