//! Virtual cluster composition atop the physical topology
//!
//! A tenant's virtual cluster is a set of guaranteed cell allocations drawn
//! from the general pool plus references to standing reservations. Resolution
//! against a validated [`ClusterTopology`] answers which physical cells the
//! virtual cluster may draw from; over-subscription is a configuration error
//! at load time, never at scheduling time.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::{CellAddress, CellType, ReservationId, VirtualClusterName};
use crate::topology::{ClusterTopology, PhysicalCellSpec};

/// A count of guaranteed cells of one type
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCellSpec {
    /// How many cells of this type the virtual cluster is guaranteed
    pub cell_number: u32,

    /// The cell type requested
    pub cell_type: CellType,
}

/// A reference to a standing reservation
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReservedCellSpec {
    /// The reservation the virtual cluster holds
    pub reservation_id: ReservationId,
}

/// A tenant's virtual cluster definition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualClusterSpec {
    /// Guaranteed cells drawn from the general (unreserved) pool
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_cells: Vec<VirtualCellSpec>,

    /// Standing reservations held by this virtual cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved_cells: Vec<ReservedCellSpec>,
}

impl VirtualClusterSpec {
    /// Resolve which physical cells this virtual cluster may draw from.
    ///
    /// Guaranteed cells resolve by type and count against the unreserved
    /// pool; reserved cells resolve by reservation id against cells tagged
    /// with that id. A cell count exceeding the available physical cells of
    /// that type, or a reservation id no physical cell carries, is a
    /// configuration error.
    pub fn resolve(&self, topology: &ClusterTopology) -> crate::Result<ResolvedVirtualCluster> {
        let reserved_addresses: BTreeSet<&CellAddress> =
            topology.reserved_cells().values().flatten().collect();

        // Requests for the same type may be split across entries; they draw
        // on one shared pool, so aggregate before checking availability
        let mut requested: BTreeMap<&CellType, u64> = BTreeMap::new();
        for request in &self.virtual_cells {
            *requested.entry(&request.cell_type).or_default() += u64::from(request.cell_number);
        }

        let mut guaranteed: BTreeMap<CellType, Vec<CellAddress>> = BTreeMap::new();
        for (cell_type, cell_number) in requested {
            let pool = unreserved_cells_of_type(
                &topology.spec().physical_cells,
                cell_type,
                &reserved_addresses,
            );
            if cell_number > pool.len() as u64 {
                return Err(crate::Error::config(format!(
                    "virtual cluster requests {cell_number} cells of type {cell_type}, \
                     only {} available",
                    pool.len()
                )));
            }
            guaranteed.insert(cell_type.clone(), pool);
        }

        let mut reserved: BTreeMap<ReservationId, Vec<CellAddress>> = BTreeMap::new();
        for reference in &self.reserved_cells {
            match topology.reserved_cells().get(&reference.reservation_id) {
                Some(cells) => {
                    reserved.insert(reference.reservation_id.clone(), cells.clone());
                }
                None => {
                    return Err(crate::Error::config(format!(
                        "reservation {} is not present in the physical topology",
                        reference.reservation_id
                    )));
                }
            }
        }

        Ok(ResolvedVirtualCluster { guaranteed, reserved })
    }

    /// Whether this virtual cluster holds the given reservation
    pub fn holds_reservation(&self, id: &ReservationId) -> bool {
        self.reserved_cells.iter().any(|r| r.reservation_id == *id)
    }
}

/// Collect the addresses of cells of `cell_type` outside any reservation
fn unreserved_cells_of_type(
    cells: &[PhysicalCellSpec],
    cell_type: &CellType,
    reserved: &BTreeSet<&CellAddress>,
) -> Vec<CellAddress> {
    let mut out = Vec::new();
    for cell in cells {
        if cell.cell_type == *cell_type && !reserved.contains(&cell.cell_address) {
            out.push(cell.cell_address.clone());
        }
        out.extend(unreserved_cells_of_type(&cell.cell_children, cell_type, reserved));
    }
    out
}

/// The physical cells a virtual cluster may draw from, derived by
/// [`VirtualClusterSpec::resolve`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedVirtualCluster {
    guaranteed: BTreeMap<CellType, Vec<CellAddress>>,
    reserved: BTreeMap<ReservationId, Vec<CellAddress>>,
}

impl ResolvedVirtualCluster {
    /// Eligible unreserved cells per requested type
    pub fn guaranteed_pool(&self) -> &BTreeMap<CellType, Vec<CellAddress>> {
        &self.guaranteed
    }

    /// Cells covered by each reservation the virtual cluster holds
    pub fn reserved_cells(&self) -> &BTreeMap<ReservationId, Vec<CellAddress>> {
        &self.reserved
    }
}

/// Validate a full set of virtual clusters against the topology.
///
/// Beyond per-cluster resolution, checks that the aggregate guaranteed demand
/// per cell type does not exceed the unreserved supply, and that no
/// reservation is claimed by more than one virtual cluster.
pub fn validate_virtual_clusters(
    clusters: &BTreeMap<VirtualClusterName, VirtualClusterSpec>,
    topology: &ClusterTopology,
) -> crate::Result<()> {
    let mut demand: BTreeMap<&CellType, u64> = BTreeMap::new();
    let mut claimed: BTreeMap<&ReservationId, &VirtualClusterName> = BTreeMap::new();

    for (name, spec) in clusters {
        spec.resolve(topology)?;

        for request in &spec.virtual_cells {
            *demand.entry(&request.cell_type).or_default() += u64::from(request.cell_number);
        }
        for reference in &spec.reserved_cells {
            if let Some(owner) = claimed.insert(&reference.reservation_id, name) {
                return Err(crate::Error::config(format!(
                    "reservation {} is claimed by both {owner} and {name}",
                    reference.reservation_id
                )));
            }
        }
    }

    for (cell_type, requested) in demand {
        let available = topology.unreserved_cell_count(cell_type) as u64;
        if requested > available {
            return Err(crate::Error::config(format!(
                "virtual clusters request {requested} cells of type {cell_type} in total, \
                 only {available} available"
            )));
        }
    }

    debug!(clusters = clusters.len(), "validated virtual cluster definitions");
    Ok(())
}
