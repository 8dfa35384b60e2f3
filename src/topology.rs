//! Physical cluster topology: cell types and cell trees
//!
//! The physical cluster is described as a forest of typed cells. A cell type
//! declares what its children look like (`CellTypeSpec`); a cell instance
//! (`PhysicalCellSpec`) is a recursively nested tree whose shape must match
//! its type declaration exactly. Validation produces a [`ClusterTopology`],
//! the only form in which topology is exposed to the rest of the system: a
//! structurally invalid spec is rejected whole, never partially accepted.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::{CellAddress, CellType, ReservationId};

/// Declares the children of a cell type.
///
/// A type whose `child_cell_type` is itself declared in the cluster's
/// `cell_types` map is an internal level of the hierarchy; an undeclared
/// child type is a device level (GPUs), below which no further cell types
/// exist. `is_node_level` marks the boundary between hardware cells and
/// scheduling below a machine: a node-level type's children are always
/// devices, never declared cell types.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CellTypeSpec {
    /// Cell type of this type's children
    pub child_cell_type: CellType,

    /// How many children each cell of this type has
    pub child_cell_number: u32,

    /// Whether cells of this type sit at the node (machine) level
    #[serde(default)]
    pub is_node_level: bool,
}

/// One physical cell instance
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalCellSpec {
    /// The cell's type, which fixes the shape of its subtree
    pub cell_type: CellType,

    /// The cell's address, unique across the whole physical cluster
    pub cell_address: CellAddress,

    /// Standing reservation this cell belongs to.
    ///
    /// A reservation set on a cell applies to all of its descendants unless a
    /// descendant sets its own reservation id, which overrides the ancestor's
    /// for that descendant's subtree. Reservations may be set at any level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,

    /// Child cells, owned by this cell
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_children: Vec<PhysicalCellSpec>,
}

/// The physical cluster definition: cell type declarations plus the cell
/// instance forest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalClusterSpec {
    /// Cell type declarations, keyed by type name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cell_types: BTreeMap<CellType, CellTypeSpec>,

    /// Root physical cells
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub physical_cells: Vec<PhysicalCellSpec>,
}

impl PhysicalClusterSpec {
    /// Validate the spec and derive the indexed topology.
    ///
    /// Rejected as configuration errors: child count or type mismatches
    /// against the `CellTypeSpec` declarations, root cells of undeclared
    /// types, device-level cells with children, node-level types whose child
    /// type is itself declared, cyclic type chains, and duplicate cell
    /// addresses.
    pub fn validate(self) -> crate::Result<ClusterTopology> {
        let chains = self.validate_cell_types()?;

        let mut counts: BTreeMap<CellType, usize> = BTreeMap::new();
        let mut reservations: BTreeMap<ReservationId, Vec<CellAddress>> = BTreeMap::new();
        let mut addresses: BTreeSet<CellAddress> = BTreeSet::new();

        for cell in &self.physical_cells {
            if !self.cell_types.contains_key(&cell.cell_type) {
                return Err(crate::Error::config(format!(
                    "root cell {} references unknown cell type {}",
                    cell.cell_address, cell.cell_type
                )));
            }
            self.validate_cell(cell, None, &mut counts, &mut reservations, &mut addresses)?;
        }

        debug!(
            cell_types = self.cell_types.len(),
            cells = addresses.len(),
            reservations = reservations.len(),
            "validated physical cluster topology"
        );

        Ok(ClusterTopology {
            spec: self,
            chains,
            counts,
            reservations,
        })
    }

    /// Check the type declarations and build the root-to-leaf chain for every
    /// declared type
    fn validate_cell_types(&self) -> crate::Result<BTreeMap<CellType, Vec<CellType>>> {
        let mut chains = BTreeMap::new();
        for (ty, spec) in &self.cell_types {
            if spec.child_cell_number == 0 {
                return Err(crate::Error::config(format!(
                    "cell type {ty} declares zero children"
                )));
            }
            if spec.is_node_level && self.cell_types.contains_key(&spec.child_cell_type) {
                return Err(crate::Error::config(format!(
                    "node-level cell type {ty} has declared cell type {} as child; \
                     children of a node-level cell must be devices",
                    spec.child_cell_type
                )));
            }

            let mut chain = vec![ty.clone()];
            let mut current = spec;
            loop {
                let next = &current.child_cell_type;
                if chain.contains(next) {
                    return Err(crate::Error::config(format!(
                        "cyclic cell type chain at {next} starting from {ty}"
                    )));
                }
                chain.push(next.clone());
                match self.cell_types.get(next) {
                    Some(next_spec) => current = next_spec,
                    // Undeclared child type: the device level, chain ends
                    None => break,
                }
            }
            chains.insert(ty.clone(), chain);
        }
        Ok(chains)
    }

    fn validate_cell(
        &self,
        cell: &PhysicalCellSpec,
        inherited: Option<&ReservationId>,
        counts: &mut BTreeMap<CellType, usize>,
        reservations: &mut BTreeMap<ReservationId, Vec<CellAddress>>,
        addresses: &mut BTreeSet<CellAddress>,
    ) -> crate::Result<()> {
        if !addresses.insert(cell.cell_address.clone()) {
            return Err(crate::Error::config(format!(
                "duplicate cell address {}",
                cell.cell_address
            )));
        }
        *counts.entry(cell.cell_type.clone()).or_default() += 1;

        // Descendant reservation overrides the inherited one for this subtree
        let effective = cell.reservation_id.as_ref().or(inherited);
        if let Some(id) = effective {
            reservations
                .entry(id.clone())
                .or_default()
                .push(cell.cell_address.clone());
        }

        match self.cell_types.get(&cell.cell_type) {
            Some(type_spec) => {
                if cell.cell_children.len() != type_spec.child_cell_number as usize {
                    return Err(crate::Error::config(format!(
                        "cell {} declares {} children, cell type {} expects {}",
                        cell.cell_address,
                        cell.cell_children.len(),
                        cell.cell_type,
                        type_spec.child_cell_number
                    )));
                }
                for child in &cell.cell_children {
                    if child.cell_type != type_spec.child_cell_type {
                        return Err(crate::Error::config(format!(
                            "cell {} has child {} of type {}, cell type {} expects children of type {}",
                            cell.cell_address,
                            child.cell_address,
                            child.cell_type,
                            cell.cell_type,
                            type_spec.child_cell_type
                        )));
                    }
                    self.validate_cell(child, effective, counts, reservations, addresses)?;
                }
            }
            // Device-level cell: nothing below it is modeled as a cell
            None => {
                if !cell.cell_children.is_empty() {
                    return Err(crate::Error::config(format!(
                        "device cell {} of undeclared type {} must not have children",
                        cell.cell_address, cell.cell_type
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A validated physical cluster topology.
///
/// Owns the validated [`PhysicalClusterSpec`] plus derived indexes. Loaded
/// once and treated as immutable for the lifetime of a scheduler instance;
/// concurrent readers never observe mutation.
#[derive(Clone, Debug)]
pub struct ClusterTopology {
    spec: PhysicalClusterSpec,
    chains: BTreeMap<CellType, Vec<CellType>>,
    counts: BTreeMap<CellType, usize>,
    reservations: BTreeMap<ReservationId, Vec<CellAddress>>,
}

impl ClusterTopology {
    /// The underlying validated spec
    pub fn spec(&self) -> &PhysicalClusterSpec {
        &self.spec
    }

    /// Ordered cell types from the given type down to the device leaf.
    ///
    /// Returns `None` for types not declared in the topology.
    pub fn cell_chain(&self, cell_type: &CellType) -> Option<&[CellType]> {
        self.chains.get(cell_type).map(Vec::as_slice)
    }

    /// Number of physical cell instances of the given type
    pub fn cell_count(&self, cell_type: &CellType) -> usize {
        self.counts.get(cell_type).copied().unwrap_or(0)
    }

    /// Number of physical cell instances of the given type not covered by any
    /// reservation
    pub fn unreserved_cell_count(&self, cell_type: &CellType) -> usize {
        let reserved = self
            .reservations
            .values()
            .flatten()
            .filter(|addr| {
                self.find_cell(addr)
                    .is_some_and(|c| c.cell_type == *cell_type)
            })
            .count();
        self.cell_count(cell_type).saturating_sub(reserved)
    }

    /// Effective reservation index: every cell address reserved under each
    /// reservation id, with descendants inheriting their ancestor's id unless
    /// they set their own
    pub fn reserved_cells(&self) -> &BTreeMap<ReservationId, Vec<CellAddress>> {
        &self.reservations
    }

    /// Whether the topology carries any cell reserved under the given id
    pub fn contains_reservation(&self, id: &ReservationId) -> bool {
        self.reservations.contains_key(id)
    }

    /// Whether the given type is declared as node-level
    pub fn is_node_level(&self, cell_type: &CellType) -> bool {
        self.spec
            .cell_types
            .get(cell_type)
            .is_some_and(|t| t.is_node_level)
    }

    /// Find a cell by address anywhere in the forest
    pub fn find_cell(&self, address: &CellAddress) -> Option<&PhysicalCellSpec> {
        fn walk<'a>(
            cells: &'a [PhysicalCellSpec],
            address: &CellAddress,
        ) -> Option<&'a PhysicalCellSpec> {
            for cell in cells {
                if cell.cell_address == *address {
                    return Some(cell);
                }
                if let Some(found) = walk(&cell.cell_children, address) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.spec.physical_cells, address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_node(address: &str, gpus: u32) -> PhysicalCellSpec {
        PhysicalCellSpec {
            cell_type: CellType::new("node"),
            cell_address: CellAddress::new(address),
            reservation_id: None,
            cell_children: (0..gpus)
                .map(|i| PhysicalCellSpec {
                    cell_type: CellType::new("gpu"),
                    cell_address: CellAddress::new(format!("{address}/{i}")),
                    reservation_id: None,
                    cell_children: vec![],
                })
                .collect(),
        }
    }

    fn node_type(children: u32) -> CellTypeSpec {
        CellTypeSpec {
            child_cell_type: CellType::new("gpu"),
            child_cell_number: children,
            is_node_level: true,
        }
    }

    fn eight_gpu_cluster() -> PhysicalClusterSpec {
        PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![gpu_node("node0", 8)],
        }
    }

    #[test]
    fn valid_topology_is_accepted() {
        let topo = eight_gpu_cluster().validate().expect("valid topology");
        assert_eq!(topo.cell_count(&CellType::new("node")), 1);
        assert_eq!(topo.cell_count(&CellType::new("gpu")), 8);
        assert_eq!(
            topo.cell_chain(&CellType::new("node")).unwrap(),
            &[CellType::new("node"), CellType::new("gpu")]
        );
        assert!(topo.is_node_level(&CellType::new("node")));
    }

    #[test]
    fn child_count_mismatch_is_rejected() {
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![gpu_node("node0", 4)],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("declares 4 children"));
        assert!(err.to_string().contains("expects 8"));
    }

    #[test]
    fn child_type_mismatch_is_rejected() {
        let mut cell = gpu_node("node0", 8);
        cell.cell_children[3].cell_type = CellType::new("fpga");
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![cell],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("expects children of type gpu"));
    }

    #[test]
    fn unknown_root_type_is_rejected() {
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::new(),
            physical_cells: vec![gpu_node("node0", 8)],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("unknown cell type node"));
    }

    #[test]
    fn device_cell_with_children_is_rejected() {
        let mut cell = gpu_node("node0", 8);
        cell.cell_children[0].cell_children.push(PhysicalCellSpec {
            cell_type: CellType::new("stream"),
            cell_address: CellAddress::new("node0/0/0"),
            reservation_id: None,
            cell_children: vec![],
        });
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![cell],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("must not have children"));
    }

    #[test]
    fn node_level_type_with_declared_child_is_rejected() {
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([
                (CellType::new("node"), node_type(8)),
                (
                    CellType::new("gpu"),
                    CellTypeSpec {
                        child_cell_type: CellType::new("stream"),
                        child_cell_number: 2,
                        is_node_level: false,
                    },
                ),
            ]),
            physical_cells: vec![],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("node-level cell type node"));
    }

    #[test]
    fn cyclic_type_chain_is_rejected() {
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([
                (
                    CellType::new("rack"),
                    CellTypeSpec {
                        child_cell_type: CellType::new("pod"),
                        child_cell_number: 2,
                        is_node_level: false,
                    },
                ),
                (
                    CellType::new("pod"),
                    CellTypeSpec {
                        child_cell_type: CellType::new("rack"),
                        child_cell_number: 2,
                        is_node_level: false,
                    },
                ),
            ]),
            physical_cells: vec![],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("cyclic cell type chain"));
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![gpu_node("node0", 8), gpu_node("node0", 8)],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate cell address node0"));
    }

    #[test]
    fn reservation_covers_all_descendants() {
        let mut cell = gpu_node("node0", 8);
        cell.reservation_id = Some(ReservationId::new("rsv-a"));
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![cell],
        };
        let topo = spec.validate().expect("valid topology");
        let reserved = topo.reserved_cells();
        // The node plus its 8 GPUs are all reserved under rsv-a
        assert_eq!(reserved[&ReservationId::new("rsv-a")].len(), 9);
        assert!(topo.contains_reservation(&ReservationId::new("rsv-a")));
    }

    #[test]
    fn descendant_reservation_overrides_ancestor() {
        let mut cell = gpu_node("node0", 8);
        cell.reservation_id = Some(ReservationId::new("rsv-a"));
        cell.cell_children[0].reservation_id = Some(ReservationId::new("rsv-b"));
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![cell],
        };
        let topo = spec.validate().expect("valid topology");
        let reserved = topo.reserved_cells();
        assert_eq!(reserved[&ReservationId::new("rsv-a")].len(), 8);
        assert_eq!(
            reserved[&ReservationId::new("rsv-b")],
            vec![CellAddress::new("node0/0")]
        );
    }

    #[test]
    fn unreserved_count_excludes_reserved_cells() {
        let mut reserved_node = gpu_node("node1", 8);
        reserved_node.reservation_id = Some(ReservationId::new("rsv-a"));
        let spec = PhysicalClusterSpec {
            cell_types: BTreeMap::from([(CellType::new("node"), node_type(8))]),
            physical_cells: vec![gpu_node("node0", 8), reserved_node],
        };
        let topo = spec.validate().expect("valid topology");
        assert_eq!(topo.cell_count(&CellType::new("node")), 2);
        assert_eq!(topo.unreserved_cell_count(&CellType::new("node")), 1);
        assert_eq!(topo.unreserved_cell_count(&CellType::new("gpu")), 8);
    }

    #[test]
    fn find_cell_walks_the_forest() {
        let topo = eight_gpu_cluster().validate().expect("valid topology");
        let cell = topo.find_cell(&CellAddress::new("node0/5")).unwrap();
        assert_eq!(cell.cell_type, CellType::new("gpu"));
        assert!(topo.find_cell(&CellAddress::new("node9")).is_none());
    }

    #[test]
    fn spec_uses_camel_case_wire_names() {
        let yaml = r#"
cellTypes:
  node:
    childCellType: gpu
    childCellNumber: 8
    isNodeLevel: true
physicalCells:
  - cellType: node
    cellAddress: node0
    cellChildren:
      - { cellType: gpu, cellAddress: node0/0 }
      - { cellType: gpu, cellAddress: node0/1 }
      - { cellType: gpu, cellAddress: node0/2 }
      - { cellType: gpu, cellAddress: node0/3 }
      - { cellType: gpu, cellAddress: node0/4 }
      - { cellType: gpu, cellAddress: node0/5 }
      - { cellType: gpu, cellAddress: node0/6 }
      - { cellType: gpu, cellAddress: node0/7 }
"#;
        let spec: PhysicalClusterSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec, eight_gpu_cluster());
        spec.validate().expect("valid topology");
    }
}
