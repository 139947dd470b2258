//! NetworkFilesystem CRD: exposes a storage volume as an NFS share
//!
//! The record shares its name with the backing volume, its share-manager,
//! its VolumeAttachment and its Service/Endpoints pair.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::NetworkFsCondition;

/// NetworkFilesystem requests that a volume be exported as a network share.
///
/// Example:
/// ```yaml
/// apiVersion: harvesterhci.io/v1beta1
/// kind: NetworkFilesystem
/// metadata:
///   name: pvc-5b2d1f0e
///   namespace: harvester-system
/// spec:
///   desiredState: Enabled
///   preferredNode: node-1
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "harvesterhci.io",
    version = "v1beta1",
    kind = "NetworkFilesystem",
    namespaced,
    status = "NetworkFilesystemStatus",
    shortname = "netfs",
    printcolumn = r#"{"name":"Desired","type":"string","jsonPath":".spec.desiredState"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.endpointStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFilesystemSpec {
    /// Target state, set externally. Only Enabled and Disabled are acted on.
    pub desired_state: NetworkFsState,

    /// Node the volume should preferably be attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_node: Option<String>,
}

/// Lifecycle phase of a network filesystem
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkFsState {
    /// Status initialized, no transition attempted yet
    Unknown,
    /// Volume detached and share-manager stopped
    Disabled,
    /// Attachment requested, waiting for the share-manager and endpoint
    Enabling,
    /// Share exported at a resolved endpoint
    Enabled,
    /// Detachment requested, waiting for the share-manager to stop
    Disabling,
}

impl std::fmt::Display for NetworkFsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Enabling => write!(f, "Enabling"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabling => write!(f, "Disabling"),
        }
    }
}

/// Readiness of the resolved network address
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Not evaluated yet
    #[default]
    Unknown,
    /// Endpoint holds a reachable address
    Ready,
    /// Endpoint has no address yet
    NotReady,
}

/// Export protocol
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkFsType {
    /// NFS export served by the share-manager
    #[default]
    NFS,
}

/// Observed state of a NetworkFilesystem
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFilesystemStatus {
    /// Current lifecycle phase; absent until the first reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NetworkFsState>,

    /// Readiness of `endpoint`
    #[serde(default)]
    pub endpoint_status: EndpointStatus,

    /// Export protocol
    #[serde(rename = "type", default)]
    pub fs_type: NetworkFsType,

    /// Resolved address of the export, empty until ready
    #[serde(default)]
    pub endpoint: String,

    /// Mount options declared on the backing volume
    #[serde(default)]
    pub mount_options: String,

    /// One condition per type, in first-seen order
    #[serde(default)]
    pub conditions: Vec<NetworkFsCondition>,
}

impl NetworkFilesystem {
    /// Current lifecycle phase, `None` when the status is uninitialized
    pub fn state(&self) -> Option<NetworkFsState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    /// Whether the record carries a deletion marker
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Node ID for attachment tickets, empty when no preference is set
    pub fn preferred_node_id(&self) -> &str {
        self.spec.preferred_node.as_deref().unwrap_or_default()
    }
}
