//! Group geolocated power outage reports into clusters for display on a map.
//!
//! Outage reports arrive as [OutageRecord]s. [Cluster::from_records] groups all the records that
//! are connected by a chain of records each within a distance threshold of the next, and the
//! threshold usually comes from the map zoom level via [ZoomLevel::threshold_km]. The extent of a
//! cluster can be reduced to a [Circle] with [enclosing_circle].

pub use cluster::{Cluster, ClusterList, SizeClass};
pub use csv_input::{read_outage_csv, read_outage_csv_from_reader};
pub use error::ClusterError;
pub use geo::{
    enclosing_circle, enclosing_circle_with_rng, great_circle_distance, BoundingBox, Circle,
    Coord, Geo, Point, ProjectedPoint,
};
pub use kml::{KmlFile, KmlWriter, KmzFile};
pub use outage::{AffectedArea, OutageRecord};
pub use zoom::{ZoomLevel, MAX_ZOOM};

/// Result type for anything that touches I/O.
pub type OutageResult<T> = Result<T, Box<dyn std::error::Error>>;

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod cluster;
mod csv_input;
mod error;
mod geo;
mod kml;
mod outage;
mod zoom;
