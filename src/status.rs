//! Live physical/virtual cell occupancy snapshots
//!
//! A [`ClusterStatus`] is a derived view, rebuilt on every status query or
//! allocation change and never persisted. It carries two forests: the
//! physical cell forest and, per virtual cluster, a virtual cell forest.
//! Correspondence between the two views is expressed as address
//! cross-references in each direction; the snapshot owns both forests and
//! neither side owns the other. [`ClusterStatus::validate`] checks the
//! cross-reference table both ways, so a partially assembled snapshot with
//! one-sided references is never observable to readers.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{CellAddress, CellType, VirtualClusterName};
use crate::OPPORTUNISTIC_PRIORITY;

/// Occupancy state of a cell. Closed set.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum CellState {
    /// The cell is unoccupied
    #[default]
    Free,
    /// The cell is occupied by a pod
    Used,
    /// The cell is unhealthy and withheld from scheduling
    Bad,
}

impl std::fmt::Display for CellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "Free"),
            Self::Used => write!(f, "Used"),
            Self::Bad => write!(f, "Bad"),
        }
    }
}

/// Live state shared by physical and virtual cells
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CellStatus {
    /// GPU model of the cell, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,

    /// The cell's type
    pub cell_type: CellType,

    /// The cell's address (physical or virtual grammar, see
    /// [`CellAddress`])
    pub cell_address: CellAddress,

    /// Occupancy state
    pub state: CellState,

    /// Priority of whatever occupies the cell;
    /// [`OPPORTUNISTIC_PRIORITY`] for best-effort occupancy
    pub priority: i32,
}

/// Live state of one physical cell
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalCellStatus {
    /// Shared cell state
    #[serde(flatten)]
    pub cell: CellStatus,

    /// Child cells
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PhysicalCellStatus>,

    /// Virtual cluster currently owning this cell, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vc: Option<VirtualClusterName>,

    /// Address of the corresponding virtual cell in the owning virtual
    /// cluster's forest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_cell: Option<CellAddress>,
}

/// Live state of one virtual cell
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCellStatus {
    /// Shared cell state
    #[serde(flatten)]
    pub cell: CellStatus,

    /// Child cells
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VirtualCellStatus>,

    /// Address of the physical cell backing this virtual cell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_cell: Option<CellAddress>,
}

impl VirtualCellStatus {
    /// The opportunistic projection of a physical cell.
    ///
    /// Represents "this physical cell is currently occupied by a best-effort
    /// job" uniformly alongside genuine virtual-cell ownership, without a
    /// real virtual cluster entry: same GPU and cell type, address suffixed
    /// with [`crate::OPPORTUNISTIC_CELL_SUFFIX`], state forced to `Used`,
    /// priority forced to the opportunistic band, back-reference to the
    /// originating physical cell. The input is not modified and gains no
    /// forward reference; the projection is pure.
    pub fn opportunistic(physical: &PhysicalCellStatus) -> VirtualCellStatus {
        VirtualCellStatus {
            cell: CellStatus {
                gpu_type: physical.cell.gpu_type.clone(),
                cell_type: physical.cell.cell_type.clone(),
                cell_address: physical.cell.cell_address.opportunistic(),
                state: CellState::Used,
                priority: OPPORTUNISTIC_PRIORITY,
            },
            children: vec![],
            physical_cell: Some(physical.cell.cell_address.clone()),
        }
    }
}

/// Top-level occupancy snapshot: the physical forest plus each virtual
/// cluster's forest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Status of cells in the physical cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub physical_cluster: Vec<PhysicalCellStatus>,

    /// Status of cells in each virtual cluster
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub virtual_clusters: BTreeMap<VirtualClusterName, Vec<VirtualCellStatus>>,
}

impl ClusterStatus {
    /// Check that the snapshot is internally consistent.
    ///
    /// Builds address indexes over both forests and verifies the
    /// physical/virtual correspondence table in both directions: a physical
    /// cell naming a virtual cell requires that virtual cell to exist, to
    /// name this physical cell back, and to live in the forest of the
    /// virtual cluster recorded as the cell's owner; a virtual cell backed
    /// by a physical cell requires that physical cell to exist and, when the
    /// physical cell carries a forward reference, to point back here. The
    /// forward reference may be absent: the opportunistic projection sets
    /// only the back-reference. Dangling references, reference pairs that
    /// disagree, and duplicate addresses are rejected, so producers can only
    /// publish fully formed snapshots.
    pub fn validate(&self) -> crate::Result<()> {
        let mut physical: BTreeMap<&CellAddress, &PhysicalCellStatus> = BTreeMap::new();
        for root in &self.physical_cluster {
            index_physical(root, &mut physical)?;
        }

        let mut virtual_cells: BTreeMap<&CellAddress, (&VirtualClusterName, &VirtualCellStatus)> =
            BTreeMap::new();
        for (vc, roots) in &self.virtual_clusters {
            for root in roots {
                index_virtual(vc, root, &mut virtual_cells)?;
            }
        }

        for (&address, &cell) in &physical {
            if let Some(counterpart) = &cell.virtual_cell {
                let (vc, virtual_cell) = *virtual_cells.get(counterpart).ok_or_else(|| {
                    crate::Error::validation(format!(
                        "physical cell {address} references missing virtual cell {counterpart}"
                    ))
                })?;
                if virtual_cell.physical_cell.as_ref() != Some(address) {
                    return Err(crate::Error::validation(format!(
                        "virtual cell {counterpart} does not reference physical cell {address} back"
                    )));
                }
                if cell.vc.as_ref() != Some(vc) {
                    return Err(crate::Error::validation(format!(
                        "physical cell {address} references virtual cell {counterpart} of \
                         cluster {vc} but records a different owner"
                    )));
                }
            }
        }

        for (&address, &(_, cell)) in &virtual_cells {
            if let Some(counterpart) = &cell.physical_cell {
                let physical_cell = *physical.get(counterpart).ok_or_else(|| {
                    crate::Error::validation(format!(
                        "virtual cell {address} references missing physical cell {counterpart}"
                    ))
                })?;
                // The opportunistic projection carries a back-reference only,
                // so a physical cell without a forward reference is fine; a
                // forward reference, when present, must point back here.
                if let Some(forward) = &physical_cell.virtual_cell {
                    if forward != address {
                        return Err(crate::Error::validation(format!(
                            "physical cell {counterpart} references virtual cell {forward}, \
                             virtual cell {address} expects it back"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn index_physical<'a>(
    cell: &'a PhysicalCellStatus,
    index: &mut BTreeMap<&'a CellAddress, &'a PhysicalCellStatus>,
) -> crate::Result<()> {
    if index.insert(&cell.cell.cell_address, cell).is_some() {
        return Err(crate::Error::validation(format!(
            "duplicate physical cell address {} in snapshot",
            cell.cell.cell_address
        )));
    }
    for child in &cell.children {
        index_physical(child, index)?;
    }
    Ok(())
}

fn index_virtual<'a>(
    vc: &'a VirtualClusterName,
    cell: &'a VirtualCellStatus,
    index: &mut BTreeMap<&'a CellAddress, (&'a VirtualClusterName, &'a VirtualCellStatus)>,
) -> crate::Result<()> {
    if index.insert(&cell.cell.cell_address, (vc, cell)).is_some() {
        return Err(crate::Error::validation(format!(
            "duplicate virtual cell address {} in snapshot",
            cell.cell.cell_address
        )));
    }
    for child in &cell.children {
        index_virtual(vc, child, index)?;
    }
    Ok(())
}
