//! Externally exposed API objects and error payloads
//!
//! These types are what the web/API layer serves to clients: affinity group
//! status objects aligned with Kubernetes list/object conventions, the route
//! discovery payload, and the structured error body. They are read-only to
//! consumers; the scheduler is the only producer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Object metadata, aligned with the Kubernetes `metadata` block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object name
    pub name: String,
}

/// List of affinity groups, aligned with Kubernetes list conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AffinityGroupList {
    /// The groups
    pub items: Vec<AffinityGroup>,
}

/// An affinity group as exposed on the status API
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AffinityGroup {
    /// Group metadata
    pub metadata: ObjectMeta,

    /// Group status
    pub status: AffinityGroupStatus,
}

/// Status of an affinity group
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffinityGroupStatus {
    /// Set when a higher-priority group has lazily preempted this one;
    /// absent means not preempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lazy_preemption_status: Option<LazyPreemptionStatus>,
}

impl AffinityGroupStatus {
    /// Record a lazy preemption.
    ///
    /// The status is monotonic: it is set exactly once, when the preemptor
    /// first marks this group, and later calls do not overwrite it. It is
    /// cleared only by the group's own termination and recreation. Returns
    /// whether this call set the status.
    pub fn mark_lazy_preempted(&mut self, preemptor: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.lazy_preemption_status.is_some() {
            return false;
        }
        self.lazy_preemption_status = Some(LazyPreemptionStatus {
            preemptor: preemptor.into(),
            preemption_time: at,
        });
        true
    }
}

/// Record of a lazy preemption: the group is marked and killed later instead
/// of being evicted immediately
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LazyPreemptionStatus {
    /// The affinity group that lazily preempted this one
    pub preemptor: String,

    /// When the preemption was recorded
    pub preemption_time: DateTime<Utc>,
}

/// Structured error payload served by the web/API layer.
///
/// Carries an HTTP-status-style code and a human-readable message; internal
/// state never leaks beyond the message string.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, thiserror::Error)]
#[error("Code: {code}, Message: {message}")]
pub struct WebServerError {
    /// HTTP-status-style code
    pub code: u16,

    /// Human-readable message
    pub message: String,
}

impl WebServerError {
    /// Create an error with the given code and message
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&crate::Error> for WebServerError {
    /// Map an internal failure cause to an HTTP-style error body
    fn from(err: &crate::Error) -> Self {
        let code = match err {
            crate::Error::Validation(_) | crate::Error::Config(_) => 400,
            crate::Error::NotFound(_) => 404,
            _ => 500,
        };
        Self::new(code, err.to_string())
    }
}

/// Routes exposed by the API surface, for introspection/discovery
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct WebServerPaths {
    /// The route strings
    pub paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_server_error_renders_code_and_message() {
        let err = WebServerError::new(404, "cell not found");
        assert_eq!(err.to_string(), "Code: 404, Message: cell not found");
    }

    #[test]
    fn web_server_error_maps_internal_causes_to_http_codes() {
        let err = WebServerError::from(&crate::Error::validation("bad request"));
        assert_eq!(err.code, 400);
        assert!(err.message.contains("bad request"));

        let err = WebServerError::from(&crate::Error::not_found("virtual cluster vc9"));
        assert_eq!(err.code, 404);

        let err = WebServerError::from(&crate::Error::serialization("broken yaml"));
        assert_eq!(err.code, 500);
    }

    #[test]
    fn web_server_error_serializes_as_code_and_message() {
        let err = WebServerError::new(404, "cell not found");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"code":404,"message":"cell not found"}"#);
    }

    // ==========================================================================
    // Story Tests: Lazy Preemption Lifecycle
    // ==========================================================================
    //
    // A lazily preempted group is marked, not killed: the status names the
    // preemptor and the time, and stays put across unrelated status queries
    // until the group itself terminates.

    /// Story: a fresh group is not preempted
    #[test]
    fn story_fresh_group_has_no_preemption_status() {
        let group = AffinityGroup {
            metadata: ObjectMeta {
                name: "groupA".to_string(),
            },
            status: AffinityGroupStatus::default(),
        };
        assert!(group.status.lazy_preemption_status.is_none());
    }

    /// Story: preemption is recorded exactly once
    ///
    /// groupB lazily preempts groupA. A later, unrelated preemption attempt
    /// must not overwrite the original record.
    #[test]
    fn story_preemption_status_is_write_once() {
        let t0 = Utc::now();
        let mut status = AffinityGroupStatus::default();

        assert!(status.mark_lazy_preempted("groupB", t0));
        let recorded = status.lazy_preemption_status.clone().unwrap();
        assert_eq!(recorded.preemptor, "groupB");
        assert_eq!(recorded.preemption_time, t0);

        // A second preemptor arrives later; the original record stands
        assert!(!status.mark_lazy_preempted("groupC", Utc::now()));
        assert_eq!(status.lazy_preemption_status.unwrap(), recorded);
    }

    /// Story: the status survives repeated unrelated queries
    ///
    /// Serving the group over the API is a read; round-tripping the object
    /// must not change the preemption record.
    #[test]
    fn story_preemption_status_survives_status_queries() {
        let mut status = AffinityGroupStatus::default();
        status.mark_lazy_preempted("groupB", Utc::now());

        let group = AffinityGroup {
            metadata: ObjectMeta {
                name: "groupA".to_string(),
            },
            status,
        };
        let json = serde_json::to_string(&group).unwrap();
        let served: AffinityGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(served, group);
        assert_eq!(
            served.status.lazy_preemption_status.unwrap().preemptor,
            "groupB"
        );
    }

    #[test]
    fn group_list_uses_kubernetes_conventions() {
        let list = AffinityGroupList {
            items: vec![AffinityGroup {
                metadata: ObjectMeta {
                    name: "groupA".to_string(),
                },
                status: AffinityGroupStatus::default(),
            }],
        };
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["items"][0]["metadata"]["name"], "groupA");
    }

    #[test]
    fn paths_payload_round_trips() {
        let paths = WebServerPaths {
            paths: vec!["/v1/inspect/clusterstatus".to_string()],
        };
        let json = serde_json::to_string(&paths).unwrap();
        let parsed: WebServerPaths = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, paths);
    }
}
