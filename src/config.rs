//! Cluster configuration loading and validation
//!
//! The physical topology and the virtual cluster definitions arrive together
//! in one YAML configuration file, loaded once at startup and treated as
//! immutable for the lifetime of a scheduler instance. Loading is strict:
//! a malformed topology or an over-subscribed virtual cluster is fatal at
//! load time and is never coerced into a partial model.

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ids::VirtualClusterName;
use crate::topology::{ClusterTopology, PhysicalClusterSpec};
use crate::vcluster::{validate_virtual_clusters, VirtualClusterSpec};

/// The scheduler's cluster configuration: the physical topology plus the
/// per-tenant virtual cluster definitions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// The physical cluster definition
    pub physical_cluster: PhysicalClusterSpec,

    /// Virtual cluster definitions, keyed by tenant cluster name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub virtual_clusters: BTreeMap<VirtualClusterName, VirtualClusterSpec>,
}

impl ClusterConfig {
    /// Parse a configuration from YAML
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| crate::Error::serialization(e.to_string()))
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&yaml)?;
        info!(path = %path.display(), "loaded cluster configuration");
        Ok(config)
    }

    /// Validate the whole configuration and derive the indexed topology.
    ///
    /// Runs topology validation plus per-cluster resolution and the
    /// cross-cluster checks (aggregate demand against supply, single
    /// ownership of each reservation).
    pub fn validate(&self) -> crate::Result<ClusterTopology> {
        let topology = self.physical_cluster.clone().validate()?;
        validate_virtual_clusters(&self.virtual_clusters, &topology)?;
        info!(
            virtual_clusters = self.virtual_clusters.len(),
            "validated cluster configuration"
        );
        Ok(topology)
    }

    /// Look up a virtual cluster definition by name
    pub fn virtual_cluster(&self, name: &VirtualClusterName) -> crate::Result<&VirtualClusterSpec> {
        self.virtual_clusters
            .get(name)
            .ok_or_else(|| crate::Error::not_found(format!("virtual cluster {name}")))
    }
}
