//! Pod scheduling requests and affinity groups
//!
//! A [`PodSchedulingSpec`] is one pod's request to the scheduler: which
//! virtual cluster it belongs to, its priority, its GPU requirements, and
//! optionally the affinity group it is gang-scheduled with. Requests are
//! validated before any scheduling attempt; an invalid request is returned to
//! the submitter, never retried automatically.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ReservationId, VirtualClusterName};
use crate::vcluster::VirtualClusterSpec;
use crate::{MAX_GUARANTEED_PRIORITY, MIN_GUARANTEED_PRIORITY, OPPORTUNISTIC_PRIORITY};

/// One pod's scheduling request
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodSchedulingSpec {
    /// Virtual cluster the pod is submitted against
    pub virtual_cluster: VirtualClusterName,

    /// Pod priority. Guaranteed pods use
    /// [`MIN_GUARANTEED_PRIORITY`]..=[`MAX_GUARANTEED_PRIORITY`]; higher
    /// preempts lower. Best-effort pods use [`OPPORTUNISTIC_PRIORITY`] and
    /// are preemptable by any guaranteed pod.
    pub priority: i32,

    /// Reservation the pod targets. Must be held by the pod's virtual
    /// cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,

    /// Required GPU model; `None` accepts any type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,

    /// Number of GPUs the pod needs
    pub gpu_number: u32,

    /// Whether the pod's affinity group releases its resources atomically:
    /// releasing one member releases all
    #[serde(default)]
    pub gang_release_enable: bool,

    /// Whether preemption of this pod is lazy: the pod is marked preempted
    /// and killed later instead of being evicted immediately
    #[serde(default)]
    pub lazy_preemption_enable: bool,

    /// Affinity group the pod is gang-scheduled with; absent means the pod
    /// is scheduled independently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_group: Option<AffinityGroupSpec>,
}

impl PodSchedulingSpec {
    /// Whether the pod runs in the opportunistic (best-effort) band
    pub fn is_opportunistic(&self) -> bool {
        self.priority == OPPORTUNISTIC_PRIORITY
    }

    /// Validate the request shape.
    ///
    /// Checks the priority band, the GPU count, and, when an affinity group
    /// is present, that the group is well formed and that the pod's
    /// `gpu_number` matches one of the group's member roles.
    pub fn validate(&self) -> crate::Result<()> {
        if self.virtual_cluster.is_empty() {
            return Err(crate::Error::validation("virtual cluster name is empty"));
        }
        if self.priority != OPPORTUNISTIC_PRIORITY
            && !(MIN_GUARANTEED_PRIORITY..=MAX_GUARANTEED_PRIORITY).contains(&self.priority)
        {
            return Err(crate::Error::validation(format!(
                "priority {} is outside the guaranteed range \
                 [{MIN_GUARANTEED_PRIORITY}, {MAX_GUARANTEED_PRIORITY}] and is not the \
                 opportunistic priority {OPPORTUNISTIC_PRIORITY}",
                self.priority
            )));
        }
        if self.gpu_number == 0 {
            return Err(crate::Error::validation("gpu number must be at least 1"));
        }
        if let Some(group) = &self.affinity_group {
            group.validate()?;
            if !group
                .members
                .iter()
                .any(|m| m.gpu_number == self.gpu_number)
            {
                return Err(crate::Error::validation(format!(
                    "pod requests {} GPUs but affinity group {} has no member role \
                     with that GPU number",
                    self.gpu_number, group.name
                )));
            }
        }
        Ok(())
    }

    /// Validate the pod's reservation targeting against its virtual cluster.
    ///
    /// A targeted reservation must be among the reservations the virtual
    /// cluster holds; a mismatch is a request-validation error.
    pub fn validate_reservation(&self, cluster: &VirtualClusterSpec) -> crate::Result<()> {
        if let Some(id) = &self.reservation_id {
            if !cluster.holds_reservation(id) {
                return Err(crate::Error::validation(format!(
                    "reservation {id} is not reserved for virtual cluster {}",
                    self.virtual_cluster
                )));
            }
        }
        Ok(())
    }
}

/// A named gang-scheduling unit: a set of pods placed (and, with gang
/// release, released) together
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffinityGroupSpec {
    /// Group name, unique among live groups
    pub name: String,

    /// Member roles of the group
    pub members: Vec<AffinityGroupMemberSpec>,
}

impl AffinityGroupSpec {
    /// Total number of pods across all member roles
    pub fn total_pod_count(&self) -> u32 {
        self.members.iter().map(|m| m.pod_number).sum()
    }

    /// Total number of GPUs the whole group needs
    pub fn total_gpu_count(&self) -> u32 {
        self.members.iter().map(|m| m.pod_number * m.gpu_number).sum()
    }

    /// Validate the group shape
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::validation("affinity group name is empty"));
        }
        if self.members.is_empty() {
            return Err(crate::Error::validation(format!(
                "affinity group {} has no members",
                self.name
            )));
        }
        for member in &self.members {
            if member.pod_number == 0 || member.gpu_number == 0 {
                return Err(crate::Error::validation(format!(
                    "affinity group {} has a member role with zero pods or zero GPUs",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// One member role of an affinity group: `pod_number` pods of `gpu_number`
/// GPUs apiece
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffinityGroupMemberSpec {
    /// Number of pods in this role
    pub pod_number: u32,

    /// GPUs each pod of this role needs
    pub gpu_number: u32,
}
