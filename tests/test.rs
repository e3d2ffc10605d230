use chrono::{TimeZone, Utc};
use outagemap::{
    enclosing_circle, enclosing_circle_with_rng, Cluster, ClusterError, ClusterList, Coord,
    OutageRecord, Point, ProjectedPoint, ZoomLevel, MAX_ZOOM,
};
use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustc_hash::FxHashMap as HashMap;

/*-------------------------------------------------------------------------------------------------
 *                                          Helpers
 *-----------------------------------------------------------------------------------------------*/
fn record(id: usize, lat: f64, lon: f64) -> OutageRecord {
    let start = Utc.timestamp_opt(1_650_000_000 + id as i64 * 60, 0).unwrap();
    OutageRecord::new(
        id.to_string(),
        "Test Power & Light",
        Coord { lat, lon },
        start,
        None,
        None,
    )
}

fn records_from(coords: &[(f64, f64)]) -> Vec<OutageRecord> {
    coords
        .iter()
        .enumerate()
        .map(|(i, &(lat, lon))| record(i, lat, lon))
        .collect()
}

/// Map each record id to the index of the cluster it landed in.
fn assignments(clusters: &[Cluster]) -> HashMap<String, usize> {
    let mut map = HashMap::default();
    for (i, cluster) in clusters.iter().enumerate() {
        for rec in cluster.members() {
            let prev = map.insert(rec.id().to_owned(), i);
            assert!(prev.is_none(), "record {} in two clusters", rec.id());
        }
    }
    map
}

fn projected_distance(a: &OutageRecord, b: &OutageRecord) -> f64 {
    ProjectedPoint::project(a.coord())
        .distance_squared(&ProjectedPoint::project(b.coord()))
        .sqrt()
}

/// A scatter of coordinates within roughly 50 km of Ottawa.
#[derive(Debug, Clone)]
struct Scatter(Vec<(f64, f64)>);

impl Arbitrary for Scatter {
    fn arbitrary(g: &mut Gen) -> Self {
        let n = usize::arbitrary(g) % 80;
        let coords = (0..n)
            .map(|_| {
                let lat = 45.0 + f64::from(u16::arbitrary(g)) / f64::from(u16::MAX) * 0.5;
                let lon = -75.5 + f64::from(u16::arbitrary(g)) / f64::from(u16::MAX) * 0.5;
                (lat, lon)
            })
            .collect();

        Scatter(coords)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let coords = self.0.clone();
        Box::new((0..coords.len()).rev().map(move |n| Scatter(coords[..n].to_vec())))
    }
}

/// A small threshold between about 10 m and 20 km.
#[derive(Debug, Clone, Copy)]
struct Threshold(f64);

impl Arbitrary for Threshold {
    fn arbitrary(g: &mut Gen) -> Self {
        Threshold(0.01 + f64::from(u16::arbitrary(g)) / f64::from(u16::MAX) * 20.0)
    }
}

/// Points spread over `scale` units around an offset from the origin.
#[derive(Debug, Clone)]
struct ScaledCloud {
    points: Vec<Point>,
    scale: f64,
}

/// Where clouds get placed, includes lat/lon style and large planar offsets.
const OFFSETS: [(f64, f64); 5] = [
    (0.0, 0.0),
    (45.0, -75.0),
    (-33.87, 151.21),
    (5.0e3, -2.0e3),
    (1.0e4, 1.0e4),
];

fn unit(g: &mut Gen) -> f64 {
    f64::from(u32::arbitrary(g)) / f64::from(u32::MAX)
}

/// A scale from 1e-6 up to 1e4.
fn scale(g: &mut Gen) -> f64 {
    10.0_f64.powi(i32::from(u8::arbitrary(g) % 11) - 6)
}

impl Arbitrary for ScaledCloud {
    fn arbitrary(g: &mut Gen) -> Self {
        let scale = scale(g);
        let (ox, oy) = *g.choose(&OFFSETS).unwrap_or(&(0.0, 0.0));

        let n = 1 + usize::arbitrary(g) % 40;
        let points = (0..n)
            .map(|_| Point::new(ox + unit(g) * scale, oy + unit(g) * scale))
            .collect();

        ScaledCloud { points, scale }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let cloud = self.clone();
        Box::new((1..cloud.points.len()).rev().map(move |n| ScaledCloud {
            points: cloud.points[..n].to_vec(),
            scale: cloud.scale,
        }))
    }
}

/// Allowed slop for containment: 1e-6 at unit scale and above, shrinking with the cloud, plus
/// what rounding at the offset's magnitude can't avoid.
fn containment_tolerance(points: &[Point], scale: f64) -> f64 {
    let magnitude = points
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(1.0, f64::max);

    1.0e-6 * scale.min(1.0) + 1.0e-11 * magnitude
}

/*-------------------------------------------------------------------------------------------------
 *                                   Clustering properties
 *-----------------------------------------------------------------------------------------------*/
quickcheck! {
    fn prop_clusters_partition_records(scatter: Scatter, threshold: Threshold) -> bool {
        let records = records_from(&scatter.0);
        let clusters = Cluster::from_records(&records, threshold.0).unwrap();

        let assigned = assignments(&clusters);
        assigned.len() == records.len()
            && clusters.iter().all(|c| c.count() > 0)
            && records.iter().all(|r| assigned.contains_key(r.id()))
    }

    fn prop_linked_records_share_a_cluster(scatter: Scatter, threshold: Threshold) -> bool {
        let records = records_from(&scatter.0);
        let clusters = Cluster::from_records(&records, threshold.0).unwrap();
        let assigned = assignments(&clusters);

        for (i, a) in records.iter().enumerate() {
            for b in &records[(i + 1)..] {
                if projected_distance(a, b) <= threshold.0 && assigned[a.id()] != assigned[b.id()] {
                    return false;
                }
            }
        }

        // Every member of a multi member cluster has a neighbor within the threshold.
        clusters.iter().filter(|c| c.count() > 1).all(|c| {
            let members = c.members();
            members.iter().enumerate().all(|(i, a)| {
                members
                    .iter()
                    .enumerate()
                    .any(|(j, b)| i != j && projected_distance(a, b) <= threshold.0)
            })
        })
    }

    fn prop_larger_threshold_only_merges(scatter: Scatter, t1: Threshold, t2: Threshold) -> bool {
        let (small, large) = if t1.0 <= t2.0 { (t1.0, t2.0) } else { (t2.0, t1.0) };

        let records = records_from(&scatter.0);
        let fine = Cluster::from_records(&records, small).unwrap();
        let coarse = Cluster::from_records(&records, large).unwrap();
        let coarse_assigned = assignments(&coarse);

        coarse.len() <= fine.len()
            && fine.iter().all(|c| {
                let target = coarse_assigned[c.members()[0].id()];
                c.members().iter().all(|r| coarse_assigned[r.id()] == target)
            })
    }

    fn prop_clustering_is_deterministic(scatter: Scatter, threshold: Threshold) -> bool {
        let records = records_from(&scatter.0);

        let ids = |clusters: Vec<Cluster>| -> Vec<Vec<String>> {
            clusters
                .iter()
                .map(|c| c.members().iter().map(|r| r.id().to_owned()).collect())
                .collect()
        };

        let first = ids(Cluster::from_records(&records, threshold.0).unwrap());
        let second = ids(Cluster::from_records(&records, threshold.0).unwrap());

        first == second
    }

    fn prop_enclosing_circle_contains_points(raw: Vec<(u16, u16)>, seed: u64) -> TestResult {
        if raw.is_empty() {
            return TestResult::discard();
        }

        // Up to 100 km on a side.
        let points: Vec<Point> = raw
            .iter()
            .map(|&(x, y)| Point::new(f64::from(x) / 655.35, f64::from(y) / 655.35))
            .collect();

        let circle = enclosing_circle_with_rng(&points, &mut StdRng::seed_from_u64(seed)).unwrap();

        TestResult::from_bool(
            points
                .iter()
                .all(|p| p.distance(&circle.center) <= circle.radius + 1.0e-6),
        )
    }
}

quickcheck! {
    fn prop_enclosing_circle_contains_points_at_any_scale(cloud: ScaledCloud, seed: u64) -> bool {
        let circle =
            enclosing_circle_with_rng(&cloud.points, &mut StdRng::seed_from_u64(seed)).unwrap();
        let tolerance = containment_tolerance(&cloud.points, cloud.scale);

        cloud
            .points
            .iter()
            .all(|p| p.distance(&circle.center) <= circle.radius + tolerance)
    }

    fn prop_near_collinear_triples_stay_small(
        exponent: u8,
        offset: u8,
        along: u16,
        dir: (i16, i16),
        seed: u64
    ) -> TestResult {
        if dir == (0, 0) {
            return TestResult::discard();
        }

        let scale = 10.0_f64.powi(i32::from(exponent % 11) - 6);
        let (ox, oy) = OFFSETS[usize::from(offset) % OFFSETS.len()];

        let (dx, dy) = (f64::from(dir.0), f64::from(dir.1));
        let norm = dx.hypot(dy);
        let (ux, uy) = (dx / norm, dy / norm);

        let a = Point::new(ox, oy);
        let b = Point::new(ox + ux * scale, oy + uy * scale);
        // Somewhere along the segment and a tiny relative distance off of it.
        let t = f64::from(along) / f64::from(u16::MAX);
        let h = scale * 1.0e-13;
        let c = Point::new(ox + ux * scale * t - uy * h, oy + uy * scale * t + ux * h);

        let points = [a, b, c];
        let circle = enclosing_circle_with_rng(&points, &mut StdRng::seed_from_u64(seed)).unwrap();
        let tolerance = containment_tolerance(&points, scale);

        let longest = a.distance(&b).max(a.distance(&c)).max(b.distance(&c));

        TestResult::from_bool(
            points
                .iter()
                .all(|p| p.distance(&circle.center) <= circle.radius + tolerance)
                && circle.radius <= longest / 2.0 + tolerance,
        )
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                      Reference scenarios
 *-----------------------------------------------------------------------------------------------*/
#[test]
fn test_two_nearby_outages() {
    let records = records_from(&[(45.0, -75.0), (45.001, -75.001)]);

    let merged = Cluster::from_records(&records, 1.0).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].count(), 2);

    let split = Cluster::from_records(&records, 0.05).unwrap();
    assert_eq!(split.len(), 2);
    assert!(split.iter().all(|c| c.count() == 1));
}

#[test]
fn test_regional_scatter_fragments_at_small_thresholds() {
    let mut rng = StdRng::seed_from_u64(20_220_415);

    // 100 points in a box about 500 km on a side.
    let coords: Vec<(f64, f64)> = (0..100)
        .map(|_| {
            let lat = rng.gen_range(42.75..47.25);
            let lon = rng.gen_range(-78.2..-71.8);
            (lat, lon)
        })
        .collect();
    let records = records_from(&coords);

    let coarse = Cluster::from_records(&records, 10.0).unwrap();
    let fine = Cluster::from_records(&records, 1.0).unwrap();

    assert!(fine.len() >= coarse.len());
    assert_eq!(coarse.iter().map(Cluster::count).sum::<usize>(), 100);
    assert_eq!(fine.iter().map(Cluster::count).sum::<usize>(), 100);
    // Points this sparse are nearly all alone at 1 km.
    assert!(fine.len() > 90, "{}", fine.len());
}

#[test]
fn test_chained_outages_form_one_cluster() {
    // Each link is about 0.79 km, the ends are about 3.2 km apart.
    let coords: Vec<(f64, f64)> = (0..5).map(|i| (45.0, -75.0 - 0.01 * i as f64)).collect();
    let records = records_from(&coords);

    let clusters = Cluster::from_records(&records, 1.0).unwrap();
    assert_eq!(clusters.len(), 1);
    assert!(projected_distance(&records[0], &records[4]) > 3.0);
}

#[test]
fn test_invalid_input_is_rejected() {
    let records = records_from(&[(45.0, -75.0)]);

    assert!(matches!(
        Cluster::from_records(&records, -1.0),
        Err(ClusterError::InvalidThreshold(_))
    ));
    assert!(matches!(
        Cluster::from_records(&records, f64::NAN),
        Err(ClusterError::InvalidThreshold(_))
    ));

    let bad = records_from(&[(45.0, -75.0), (f64::NAN, -75.0)]);
    assert!(matches!(
        Cluster::from_records(&bad, 1.0),
        Err(ClusterError::NonFiniteCoordinate { index: 1, .. })
    ));

    assert!(Cluster::from_records(&[], 1.0).unwrap().is_empty());
}

#[test]
fn test_right_triangle_circle() {
    let points = [
        Point::new(0.0, 0.0),
        Point::new(3.0, 0.0),
        Point::new(0.0, 4.0),
    ];

    let circle = enclosing_circle(&points).unwrap();

    assert!((circle.center.x - 1.5).abs() < 1.0e-9);
    assert!((circle.center.y - 2.0).abs() < 1.0e-9);
    assert!((circle.radius - 2.5).abs() < 1.0e-9);
}

#[test]
fn test_degenerate_circles() {
    let one = enclosing_circle(&[Point::new(7.0, -2.0)]).unwrap();
    assert_eq!(one.radius, 0.0);
    assert_eq!(one.center, Point::new(7.0, -2.0));

    let same = enclosing_circle(&[Point::new(1.0, 1.0); 10]).unwrap();
    assert_eq!(same.radius, 0.0);

    let two = enclosing_circle(&[Point::new(-1.0, 0.0), Point::new(1.0, 0.0)]).unwrap();
    assert!((two.radius - 1.0).abs() < 1.0e-12);
    assert!(two.center.distance(&Point::new(0.0, 0.0)) < 1.0e-12);

    assert_eq!(enclosing_circle(&[]), Err(ClusterError::EmptyPointSet));
}

/*-------------------------------------------------------------------------------------------------
 *                                  Zoom levels and export
 *-----------------------------------------------------------------------------------------------*/
#[test]
fn test_zoom_thresholds_never_grow() {
    let mut prev = f64::INFINITY;
    for level in 0..=MAX_ZOOM {
        let zoom = ZoomLevel::new(level).unwrap();
        assert!(zoom.threshold_km() <= prev);
        prev = zoom.threshold_km();
    }
}

#[test]
fn test_zoom_levels_cluster_coarse_to_fine() {
    let mut rng = StdRng::seed_from_u64(7);
    let coords: Vec<(f64, f64)> = (0..200)
        .map(|_| (rng.gen_range(44.0..46.0), rng.gen_range(-77.0..-73.0)))
        .collect();
    let records = records_from(&coords);

    let counts: Vec<usize> = ZoomLevel::all()
        .map(|zoom| ClusterList::for_zoom("scatter", &records, zoom).unwrap().len())
        .collect();

    assert_eq!(counts[0], 1);
    assert_eq!(counts[MAX_ZOOM as usize], 200);
    for pair in counts.windows(2) {
        assert!(pair[0] <= pair[1], "{:?}", counts);
    }
}

#[test]
fn test_kml_export_has_placemark_per_cluster() {
    let records = records_from(&[
        (45.0, -75.0),
        (45.0, -75.001),
        (45.5, -75.5),
        (43.7, -79.4),
        (46.8, -71.2),
    ]);
    let list = ClusterList::from_records("scenario", &records, 1.0).unwrap();
    assert_eq!(list.len(), 4);

    let path = std::env::temp_dir().join(format!("outagemap-export-{}.kml", std::process::id()));
    list.save_kml(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    // A center for each cluster plus an extent for the only multi member cluster.
    assert_eq!(text.matches("<Placemark>").count(), 5);
    assert_eq!(text.matches("<Point>").count(), 4);
    assert!(text.contains("Test Power &amp; Light") || text.contains("Test Power & Light"));
    assert!(text.ends_with("</Document>\n</kml>\n"));
}

#[test]
fn test_csv_to_clusters() {
    let path = std::env::temp_dir().join(format!("outagemap-input-{}.csv", std::process::id()));
    std::fs::write(
        &path,
        concat!(
            "id,provider,latitude,longitude,start,end,polygon\n",
            "a,Hydro Ottawa,45.0,-75.0,1650000000,,\n",
            "b,Hydro Ottawa,45.001,-75.001,1650000100,,\n",
            "c,Hydro Quebec,NaN,-73.5,1650000200,,\n",
            "d,Hydro Quebec,45.5,-73.6,1650000300,1650007200,\n",
        ),
    )
    .unwrap();

    let records = outagemap::read_outage_csv(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(records.len(), 3);

    let list = ClusterList::from_records("input", &records, 1.0).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.total_records(), 3);

    let largest = list.largest().unwrap();
    assert_eq!(largest.count(), 2);
    assert_eq!(largest.providers(), ["Hydro Ottawa".to_owned()]);
    assert_eq!(largest.representative_time().timestamp(), 1_650_000_100);
}
