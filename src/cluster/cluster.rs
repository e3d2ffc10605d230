use crate::{
    error::ClusterError,
    geo::{self, BoundingBox, Circle, Coord, Geo, GridIndex, Point, ProjectedPoint},
    outage::{AffectedArea, OutageRecord},
};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet as HashSet;
use strum::{EnumIter, IntoStaticStr};

/// Rough size categories for styling clusters on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum SizeClass {
    /// One outage report.
    #[strum(serialize = "single")]
    Single,
    /// 2 to 9 reports.
    #[strum(serialize = "small")]
    Small,
    /// 10 to 99 reports.
    #[strum(serialize = "medium")]
    Medium,
    /// 100 or more reports.
    #[strum(serialize = "large")]
    Large,
}

impl SizeClass {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 | 1 => Self::Single,
            2..=9 => Self::Small,
            10..=99 => Self::Medium,
            _ => Self::Large,
        }
    }

    /// Get a short, lower case name suitable for a style id.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/**
 * The aggregate properties of a connected group of OutageRecord objects.
 */
#[derive(Debug, Clone)]
pub struct Cluster {
    /// The records in the order they were discovered by the flood fill.
    members: Vec<OutageRecord>,
    /// Average latitude and longitude of the members.
    center: Coord,
    /// The great circle distance from the center to the farthest member in kilometers.
    radius_km: f64,
    /// Every provider that reported a member, in the order first seen.
    providers: Vec<String>,
    /// The area of the first member, in discovery order, that had one.
    area: Option<AffectedArea>,
    /// The latest start time of any member.
    representative_time: DateTime<Utc>,
}

impl Cluster {
    /**
     * Group OutageRecord objects into clusters.
     *
     * Two records end up in the same cluster if they are connected by a chain of records where
     * each link is no more than `threshold_km` long. This is single-linkage clustering, so a
     * cluster can be much wider than `threshold_km`. Distances are measured on the approximate
     * kilometer grid of [ProjectedPoint].
     *
     * A threshold of zero puts every record in its own cluster.
     *
     * #Arguments
     * records - the outage reports, they are copied into the clusters.
     * threshold_km - the maximum distance between linked records.
     *
     * #Returns
     * The clusters in the order they were discovered while iterating over `records`. Every record
     * appears in exactly one cluster. Fails if the threshold is negative or not finite, or if any
     * record has a non-finite coordinate.
     */
    pub fn from_records(
        records: &[OutageRecord],
        threshold_km: f64,
    ) -> Result<Vec<Self>, ClusterError> {
        if !threshold_km.is_finite() || threshold_km < 0.0 {
            return Err(ClusterError::InvalidThreshold(threshold_km));
        }

        if let Some((index, rec)) = records
            .iter()
            .enumerate()
            .find(|(_, rec)| !rec.coord().is_finite())
        {
            return Err(ClusterError::NonFiniteCoordinate {
                index,
                id: rec.id().to_owned(),
                lat: rec.lat(),
                lon: rec.lon(),
            });
        }

        let groups: Vec<Vec<usize>> = if threshold_km == 0.0 {
            (0..records.len()).map(|i| vec![i]).collect()
        } else {
            let points: Vec<ProjectedPoint> = records
                .iter()
                .map(|rec| ProjectedPoint::project(rec.coord()))
                .collect();

            flood_fill(&points, threshold_km)
        };

        log::debug!(
            "grouped {} records into {} clusters at {} km",
            records.len(),
            groups.len(),
            threshold_km
        );

        Ok(groups
            .into_iter()
            .map(|group| Self::from_group(records, &group))
            .collect())
    }

    fn from_group(records: &[OutageRecord], group: &[usize]) -> Self {
        debug_assert!(!group.is_empty());

        let members: Vec<OutageRecord> = group.iter().map(|&i| records[i].clone()).collect();

        let mut lat = 0.0;
        let mut lon = 0.0;
        for rec in &members {
            lat += rec.lat();
            lon += rec.lon();
        }
        let center = Coord {
            lat: lat / members.len() as f64,
            lon: lon / members.len() as f64,
        };

        let radius_km = members
            .iter()
            .map(|rec| geo::great_circle_distance(rec.lat(), rec.lon(), center.lat, center.lon))
            .fold(0.0, f64::max);

        let mut seen: HashSet<&str> = HashSet::default();
        let mut providers = Vec::with_capacity(1);
        for rec in &members {
            if seen.insert(rec.provider()) {
                providers.push(rec.provider().to_owned());
            }
        }

        let area = members.iter().find_map(|rec| rec.area().cloned());

        // Never empty, see debug_assert above.
        let representative_time = members
            .iter()
            .map(OutageRecord::start)
            .max()
            .unwrap_or_else(|| members[0].start());

        Cluster {
            members,
            center,
            radius_km,
            providers,
            area,
            representative_time,
        }
    }

    /// The records in this cluster, in discovery order.
    pub fn members(&self) -> &[OutageRecord] {
        &self.members
    }

    /// The number of records in this cluster.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// The mean latitude and longitude of the members.
    pub fn center(&self) -> Coord {
        self.center
    }

    /// Distance from the center to the farthest member in kilometers.
    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Providers that reported outages in this cluster, first seen first, no duplicates.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// The first affected area reported by any of the members.
    pub fn area(&self) -> Option<&AffectedArea> {
        self.area.as_ref()
    }

    /// The latest start time of any member.
    pub fn representative_time(&self) -> DateTime<Utc> {
        self.representative_time
    }

    /// The earliest start time of any member.
    pub fn earliest_start(&self) -> DateTime<Utc> {
        self.members
            .iter()
            .map(OutageRecord::start)
            .min()
            .unwrap_or(self.representative_time)
    }

    /// Number of members still without power.
    pub fn num_ongoing(&self) -> usize {
        self.members.iter().filter(|rec| rec.is_ongoing()).count()
    }

    pub fn size_class(&self) -> SizeClass {
        SizeClass::for_count(self.members.len())
    }

    /// The minimum enclosing circle of the members on the projected kilometer grid.
    pub fn enclosing_circle(&self) -> Circle {
        let points: Vec<Point> = self
            .members
            .iter()
            .map(|rec| Point::from(ProjectedPoint::project(rec.coord())))
            .collect();

        geo::welzl(points, &mut rand::thread_rng())
    }

    /// The center of the enclosing circle as a coordinate and its radius in kilometers.
    ///
    /// This is what a map should draw to show the extent of a cluster, it is usually tighter than
    /// [Cluster::radius_km] around [Cluster::center].
    pub fn display_extent(&self) -> (Coord, f64) {
        let circle = self.enclosing_circle();
        let center = ProjectedPoint::from(circle.center).unproject();

        (center, circle.radius)
    }
}

impl Geo for Cluster {
    fn centroid(&self) -> Coord {
        self.center
    }

    fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::default();
        for rec in &self.members {
            let rec_box = rec.bounding_box();
            bbox.expand_to(rec_box.ll);
            bbox.expand_to(rec_box.ur);
        }
        bbox
    }
}

/// Find the groups of points connected by links of at most `threshold_km`.
///
/// Groups are built with an iterative depth first search so there are no recursion limits on
/// big inputs. The outer loop is over `points` in order, which makes the result deterministic.
fn flood_fill(points: &[ProjectedPoint], threshold_km: f64) -> Vec<Vec<usize>> {
    let index = GridIndex::build_for(points, threshold_km);
    let threshold2 = threshold_km * threshold_km;

    let mut visited = vec![false; points.len()];
    let mut stack: Vec<usize> = Vec::with_capacity(64);
    let mut groups: Vec<Vec<usize>> = vec![];

    for start in 0..points.len() {
        if visited[start] {
            continue;
        }

        let mut group = vec![];
        stack.push(start);

        while let Some(curr) = stack.pop() {
            if visited[curr] {
                continue;
            }
            visited[curr] = true;
            group.push(curr);

            let curr_pt = &points[curr];
            for &candidate in index.candidates(curr_pt) {
                if !visited[candidate] && curr_pt.distance_squared(&points[candidate]) <= threshold2
                {
                    stack.push(candidate);
                }
            }
        }

        groups.push(group);
    }

    log::trace!(
        "flood fill used {} grid cells for {} points",
        index.num_cells(),
        points.len()
    );

    groups
}
