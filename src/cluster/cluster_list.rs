use crate::{
    cluster::{Cluster, SizeClass},
    error::ClusterError,
    geo::{BoundingBox, Geo, ProjectedPoint},
    kml::{KmlFile, KmlWriter, KmzFile},
    outage::OutageRecord,
    zoom::ZoomLevel,
    OutageResult,
};
use std::{fmt::Write, path::Path};
use strum::IntoEnumIterator;

/// Number of vertices used to draw an enclosing circle as a polygon.
const CIRCLE_VERTICES: usize = 48;

/**
 * Keep a cluster list with metadata about how it was derived.
 */
#[derive(Debug, Clone)]
pub struct ClusterList {
    /// Where the records came from, usually a file name.
    pub source: String,
    /// The threshold used to link records, kilometers.
    pub threshold_km: f64,
    /// The map zoom level the threshold was derived from, if any.
    pub zoom: Option<ZoomLevel>,
    /// List of Cluster objects associated with the above metadata.
    pub clusters: Vec<Cluster>,
}

impl ClusterList {
    /// Cluster the records with a fixed threshold.
    pub fn from_records<S: Into<String>>(
        source: S,
        records: &[OutageRecord],
        threshold_km: f64,
    ) -> Result<Self, ClusterError> {
        let clusters = Cluster::from_records(records, threshold_km)?;

        Ok(ClusterList {
            source: source.into(),
            threshold_km,
            zoom: None,
            clusters,
        })
    }

    /// Cluster the records for display at a map zoom level.
    pub fn for_zoom<S: Into<String>>(
        source: S,
        records: &[OutageRecord],
        zoom: ZoomLevel,
    ) -> Result<Self, ClusterError> {
        let mut list = Self::from_records(source, records, zoom.threshold_km())?;
        list.zoom = Some(zoom);
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    /// The cluster with the most members, the first one found wins a tie.
    pub fn largest(&self) -> Option<&Cluster> {
        self.clusters.iter().fold(None, |biggest, cluster| match biggest {
            Some(big) if big.count() >= cluster.count() => Some(big),
            _ => Some(cluster),
        })
    }

    /// The total number of records across all the clusters.
    pub fn total_records(&self) -> usize {
        self.clusters.iter().map(Cluster::count).sum()
    }

    /// A box around every record in every cluster, `None` if the list is empty.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_coords(
            self.clusters
                .iter()
                .map(Geo::bounding_box)
                .flat_map(|bbox| [bbox.ll, bbox.ur]),
        )
    }

    /**
     * Drop the clusters that are completely outside of a map viewport.
     *
     * A cluster is kept if any part of its bounding box touches `viewport`, so clusters that
     * straddle the edge of the map are still drawn.
     *
     * #Returns
     * The number of clusters that were removed.
     */
    pub fn retain_within(&mut self, viewport: &BoundingBox) -> usize {
        let before = self.clusters.len();
        self.clusters
            .retain(|cluster| cluster.bounding_box().overlap(viewport, 0.0));
        before - self.clusters.len()
    }

    /// Save this list in a KML file.
    pub fn save_kml<P: AsRef<Path>>(&self, kml_path: P) -> OutageResult<()> {
        let mut kml = KmlFile::new(kml_path)?;
        self.write_kml(&mut kml)?;
        kml.finish()
    }

    /// Save this list in a KMZ file.
    pub fn save_kmz<P: AsRef<Path>>(&self, kmz_path: P) -> OutageResult<()> {
        let mut kmz = KmzFile::new(kmz_path)?;
        self.write_kml(&mut kmz)?;
        kmz.finish()
    }

    /// Write the clusters as KML folders, one per cluster.
    ///
    /// The document header and footer are the responsibility of the writer.
    pub fn write_kml<K: KmlWriter>(&self, kml: &mut K) -> OutageResult<()> {
        for size in SizeClass::iter() {
            let (icon_scale, color) = match size {
                SizeClass::Single => (0.6, "7f00ffff"),
                SizeClass::Small => (0.8, "7f00aaff"),
                SizeClass::Medium => (1.0, "7f0055ff"),
                SizeClass::Large => (1.3, "7f0000ff"),
            };

            kml.start_style(Some(size.name()))?;
            kml.create_icon_style(
                Some("http://maps.google.com/mapfiles/kml/shapes/caution.png"),
                icon_scale,
            )?;
            kml.create_poly_style(Some(color), true, true)?;
            kml.finish_style()?;
        }

        let mut folder_name = String::with_capacity(64);
        let _ = write!(&mut folder_name, "{} @ {:.3} km", self.source, self.threshold_km);
        if let Some(zoom) = self.zoom {
            let _ = write!(&mut folder_name, " (zoom {})", zoom);
        }
        kml.start_folder(Some(&folder_name), None, true)?;

        let mut name = String::with_capacity(32);
        let mut description = String::with_capacity(256);
        let mut style_url = String::with_capacity(16);
        for (i, cluster) in self.iter().enumerate() {
            name.clear();
            let _ = write!(&mut name, "cluster {} ({})", i, cluster.count());

            description.clear();
            let _ = write!(
                &mut description,
                concat!(
                    "Outages: {}<br/>",
                    "Ongoing: {}<br/>",
                    "Providers: {}<br/>",
                    "Radius: {:.2} km<br/>",
                    "Latest Start: {}<br/>",
                ),
                cluster.count(),
                cluster.num_ongoing(),
                cluster.providers().join(", "),
                cluster.radius_km(),
                cluster.representative_time(),
            );

            style_url.clear();
            let _ = write!(&mut style_url, "#{}", cluster.size_class().name());

            kml.start_folder(Some(&name), None, false)?;

            kml.start_placemark(Some(&name), Some(&description), Some(&style_url))?;
            kml.timespan(cluster.earliest_start(), cluster.representative_time())?;
            let center = cluster.center();
            kml.create_point(center.lat, center.lon, 0.0)?;
            kml.finish_placemark()?;

            let circle = cluster.enclosing_circle();
            if circle.radius > 0.0 {
                kml.start_placemark(Some("extent"), None, Some(&style_url))?;
                kml.start_polygon(false, true, Some("clampToGround"))?;
                kml.polygon_start_outer_ring()?;
                kml.start_linear_ring()?;
                for i in 0..=CIRCLE_VERTICES {
                    let theta = 2.0 * std::f64::consts::PI * (i % CIRCLE_VERTICES) as f64
                        / CIRCLE_VERTICES as f64;
                    let vertex = ProjectedPoint {
                        x_km: circle.center.x + circle.radius * theta.cos(),
                        y_km: circle.center.y + circle.radius * theta.sin(),
                    }
                    .unproject();
                    kml.linear_ring_add_vertex(vertex.lat, vertex.lon, 0.0)?;
                }
                kml.finish_linear_ring()?;
                kml.polygon_finish_outer_ring()?;
                kml.finish_polygon()?;
                kml.finish_placemark()?;
            }

            if let Some(ring) = cluster.area().and_then(|area| area.outer_ring()) {
                kml.start_placemark(Some("affected area"), None, Some(&style_url))?;
                kml.start_polygon(false, true, Some("clampToGround"))?;
                kml.polygon_start_outer_ring()?;
                kml.start_linear_ring()?;
                for coord in &ring {
                    kml.linear_ring_add_vertex(coord.lat, coord.lon, 0.0)?;
                }
                // Close the loop.
                if ring.first() != ring.last() {
                    kml.linear_ring_add_vertex(ring[0].lat, ring[0].lon, 0.0)?;
                }
                kml.finish_linear_ring()?;
                kml.polygon_finish_outer_ring()?;
                kml.finish_polygon()?;
                kml.finish_placemark()?;
            }

            kml.finish_folder()?;
        }

        kml.finish_folder()?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{geo::Coord, outage::AffectedArea};
    use chrono::{TimeZone, Utc};

    struct MemoryKml(Vec<u8>);

    impl KmlWriter for MemoryKml {
        fn output(&mut self) -> &mut dyn std::io::Write {
            &mut self.0
        }
    }

    fn records() -> Vec<OutageRecord> {
        let start = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
        let area = AffectedArea::Wkt("POLYGON((-75.01 45,-75 45,-75 45.01))".to_owned());

        vec![
            OutageRecord::new(
                "a",
                "Hydro Ottawa",
                Coord { lat: 45.0, lon: -75.0 },
                start,
                None,
                Some(area),
            ),
            OutageRecord::new(
                "b",
                "Hydro Ottawa",
                Coord {
                    lat: 45.0,
                    lon: -75.002,
                },
                start,
                None,
                None,
            ),
            OutageRecord::new(
                "c",
                "Hydro One",
                Coord { lat: 43.7, lon: -79.4 },
                start,
                None,
                None,
            ),
        ]
    }

    #[test]
    fn test_list_summaries() {
        let list = ClusterList::from_records("test.csv", &records(), 1.0).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.total_records(), 3);
        assert_eq!(list.largest().map(Cluster::count), Some(2));
        assert!(list.zoom.is_none());

        let empty = ClusterList::from_records("empty.csv", &[], 1.0).unwrap();
        assert!(empty.is_empty());
        assert!(empty.largest().is_none());
    }

    #[test]
    fn test_for_zoom_records_threshold() {
        let zoom = ZoomLevel::new(2).unwrap();
        let list = ClusterList::for_zoom("test.csv", &records(), zoom).unwrap();

        assert_eq!(list.zoom, Some(zoom));
        assert_eq!(list.threshold_km, zoom.threshold_km());
        // Ottawa and Toronto merge at a continental zoom level.
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_write_kml() {
        let list = ClusterList::from_records("test.csv", &records(), 1.0).unwrap();

        let mut kml = MemoryKml(vec![]);
        list.write_kml(&mut kml).unwrap();
        let text = String::from_utf8(kml.0).unwrap();

        assert_eq!(text.matches("<Style id=").count(), 4);
        // Each cluster gets a center point, the two member cluster gets an extent and an area.
        assert_eq!(text.matches("<Point>").count(), 2);
        assert_eq!(text.matches("<Polygon>").count(), 2);
        assert!(text.contains("Providers: Hydro Ottawa<br/>"));
        assert!(text.contains("<styleUrl>#small</styleUrl>"));
        assert!(text.contains("<styleUrl>#single</styleUrl>"));
        assert_eq!(text.matches("<Folder>").count(), text.matches("</Folder>").count());
    }

    #[test]
    fn test_list_bounding_box() {
        let list = ClusterList::from_records("test.csv", &records(), 1.0).unwrap();
        let bbox = list.bounding_box().unwrap();

        // Record a's area reaches further than any record location.
        assert_eq!(bbox.ll, Coord { lat: 43.7, lon: -79.4 });
        assert_eq!(bbox.ur, Coord { lat: 45.01, lon: -75.0 });

        let empty = ClusterList::from_records("empty.csv", &[], 1.0).unwrap();
        assert!(empty.bounding_box().is_none());
    }

    #[test]
    fn test_retain_within_viewport() {
        let ottawa = BoundingBox {
            ll: Coord { lat: 44.5, lon: -76.0 },
            ur: Coord { lat: 45.5, lon: -75.0 },
        };

        let mut list = ClusterList::from_records("test.csv", &records(), 1.0).unwrap();
        assert_eq!(list.retain_within(&ottawa), 1);
        assert_eq!(list.len(), 1);
        assert_eq!(list.total_records(), 2);
        assert!(list.iter().all(|c| c.providers() == ["Hydro Ottawa"]));

        // Touching the edge of the viewport is enough to stay.
        let edge = BoundingBox {
            ll: Coord { lat: 45.01, lon: -75.0 },
            ur: Coord { lat: 46.0, lon: -74.0 },
        };
        let mut list = ClusterList::from_records("test.csv", &records(), 1.0).unwrap();
        assert_eq!(list.retain_within(&edge), 1);
        assert_eq!(list.total_records(), 2);

        let nowhere = BoundingBox {
            ll: Coord { lat: 10.0, lon: 10.0 },
            ur: Coord { lat: 11.0, lon: 11.0 },
        };
        assert_eq!(list.retain_within(&nowhere), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_cdata_terminator_in_provider() {
        let start = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
        let recs = vec![OutageRecord::new(
            "odd",
            "Odd]]>Power",
            Coord { lat: 45.0, lon: -75.0 },
            start,
            None,
            None,
        )];
        let list = ClusterList::from_records("odd.csv", &recs, 1.0).unwrap();

        let mut kml = MemoryKml(vec![]);
        list.write_kml(&mut kml).unwrap();
        let text = String::from_utf8(kml.0).unwrap();

        assert!(text.contains("Odd]]]]><![CDATA[>Power"));
        // The one description is split into two sections.
        assert_eq!(text.matches("<![CDATA[").count(), 2);
        assert_eq!(text.matches("]]>").count(), 2);
    }
}
