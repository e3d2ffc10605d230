/*!
 * Types and functions for working with clusters.
 *
 * A cluster describes the aggregate properties of a connected group (or cluster) of OutageRecord
 * objects.
 */

pub use cluster::{Cluster, SizeClass};
pub use cluster_list::ClusterList;

mod cluster;
mod cluster_list;
