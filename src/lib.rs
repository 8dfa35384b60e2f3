//! Cellgrid - hierarchical cell data model for a GPU-cluster scheduler
//!
//! Cellgrid defines the shared vocabulary a cell scheduler and its
//! collaborators speak: how physical hardware is described as a typed tree of
//! cells, how tenant virtual clusters carve guaranteed and reserved slices out
//! of that tree, how a pod's scheduling request and its eventual binding are
//! represented, and how cluster-wide cell occupancy is reported.
//!
//! The scheduling algorithm itself (cell selection, preemption execution,
//! bin-packing) is an external consumer of this model and is not part of this
//! crate, and neither is the API server or Kubernetes informer glue that
//! produces and transports these entities.
//!
//! # Modules
//!
//! - [`ids`] - Opaque identifier types (cell types, addresses, reservations)
//! - [`topology`] - Physical cluster topology: cell types and cell trees
//! - [`vcluster`] - Virtual cluster composition atop the physical topology
//! - [`scheduling`] - Pod scheduling requests and affinity groups
//! - [`bind`] - Scheduler bind results and per-pod placements
//! - [`status`] - Live physical/virtual cell occupancy snapshots
//! - [`api`] - Externally exposed API objects and error payloads
//! - [`config`] - Cluster configuration loading and validation
//! - [`error`] - Error types for the model

#![deny(missing_docs)]

pub mod api;
pub mod bind;
pub mod config;
pub mod error;
pub mod ids;
pub mod scheduling;
pub mod status;
pub mod topology;
pub mod vcluster;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Priority Bands
// =============================================================================
// Pod priorities form a total order. Guaranteed pods occupy the range
// [MIN_GUARANTEED_PRIORITY, MAX_GUARANTEED_PRIORITY]; opportunistic pods use
// the dedicated band below it and are preemptable by any guaranteed pod.

/// Priority of opportunistic (best-effort) pods.
///
/// Opportunistic pods consume otherwise-free capacity and are preemptable by
/// any pod with a guaranteed priority.
pub const OPPORTUNISTIC_PRIORITY: i32 = -1;

/// Lowest priority a guaranteed pod may request
pub const MIN_GUARANTEED_PRIORITY: i32 = 0;

/// Highest priority a guaranteed pod may request
pub const MAX_GUARANTEED_PRIORITY: i32 = 1000;

/// Suffix appended to a physical cell address to form the address of its
/// synthetic opportunistic virtual cell
pub const OPPORTUNISTIC_CELL_SUFFIX: &str = "-opp";
