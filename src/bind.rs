//! Scheduler bind results and per-pod placements
//!
//! A [`PodBindInfo`] is the scheduler's answer to one pod's request: the node
//! and GPU indices to isolate, the cell chain selected, and the placement of
//! every member of the pod's affinity group. Carrying the whole group's
//! placement in each pod's result is what makes gang atomicity checkable:
//! a result that does not cover the full member set is invalid, and the
//! whole group fails rather than binding partially.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::CellType;
use crate::scheduling::PodSchedulingSpec;

/// The scheduler's bind decision for one pod
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodBindInfo {
    /// Node to bind the pod to
    pub node: String,

    /// GPU indices on the node to isolate for the pod
    pub gpu_isolation: Vec<u32>,

    /// The cell chain selected, named by its root cell type; the full
    /// root-to-leaf type sequence is recoverable from the topology
    pub cell_chain: CellType,

    /// Placement of every member of the pod's affinity group, one entry per
    /// member role. A pod scheduled independently has exactly one entry.
    pub affinity_group_bind_info: Vec<AffinityGroupMemberBindInfo>,
}

/// Placements for one affinity-group member role
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffinityGroupMemberBindInfo {
    /// One placement per pod of the role
    pub pod_placements: Vec<PodPlacementInfo>,
}

/// One pod's physical placement.
///
/// The preassigned cell types are needed later to re-locate which virtual
/// cells correspond to an already-bound pod.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodPlacementInfo {
    /// Node the pod landed on
    pub physical_node: String,

    /// Physical GPU indices assigned to the pod
    pub physical_gpu_indices: Vec<u32>,

    /// Preassigned cell types used by the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preassigned_cell_types: Vec<CellType>,
}

impl PodBindInfo {
    /// Total number of pod placements across the whole group
    pub fn total_placement_count(&self) -> usize {
        self.affinity_group_bind_info
            .iter()
            .map(|m| m.pod_placements.len())
            .sum()
    }

    /// Check this bind result against the request it answers.
    ///
    /// With an affinity group, the result must cover every member: one entry
    /// per member role, `pod_number` placements per role, and each
    /// placement's GPU count equal to the role's `gpu_number`. Without a
    /// group, the result carries exactly one entry with one placement for
    /// the pod itself. Any shortfall fails the whole bind; a
    /// partial group binding is not a valid terminal state.
    pub fn validate_for(&self, request: &PodSchedulingSpec) -> crate::Result<()> {
        if self.gpu_isolation.len() != request.gpu_number as usize {
            return Err(crate::Error::validation(format!(
                "bind isolates {} GPUs, pod requested {}",
                self.gpu_isolation.len(),
                request.gpu_number
            )));
        }
        match &request.affinity_group {
            None => {
                if self.affinity_group_bind_info.len() != 1
                    || self.affinity_group_bind_info[0].pod_placements.len() != 1
                {
                    return Err(crate::Error::validation(
                        "independently scheduled pod must have exactly one placement",
                    ));
                }
                Ok(())
            }
            Some(group) => {
                if self.affinity_group_bind_info.len() != group.members.len() {
                    return Err(crate::Error::validation(format!(
                        "bind covers {} member roles of affinity group {}, expected {}",
                        self.affinity_group_bind_info.len(),
                        group.name,
                        group.members.len()
                    )));
                }
                for (member, bind) in group.members.iter().zip(&self.affinity_group_bind_info) {
                    if bind.pod_placements.len() != member.pod_number as usize {
                        return Err(crate::Error::validation(format!(
                            "bind places {} pods for a role of affinity group {}, expected {}",
                            bind.pod_placements.len(),
                            group.name,
                            member.pod_number
                        )));
                    }
                    for placement in &bind.pod_placements {
                        if placement.physical_gpu_indices.len() != member.gpu_number as usize {
                            return Err(crate::Error::validation(format!(
                                "placement on {} assigns {} GPUs, role expects {}",
                                placement.physical_node,
                                placement.physical_gpu_indices.len(),
                                member.gpu_number
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
