//! Storage subsystem resources read or patched by the reconcilers
//!
//! Only the fields the controller touches are modeled. Writes go through
//! merge patches, so unmodeled fields are never rewritten.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Ticket parameter controlling whether the volume frontend is exposed
pub const ATTACHMENT_PARAMETER_DISABLE_FRONTEND: &str = "disableFrontend";

/// Share-manager process serving the export for one volume
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "ShareManager",
    namespaced,
    status = "ShareManagerStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ShareManagerSpec {
    /// Share-manager image
    #[serde(default)]
    pub image: String,
}

/// Observed state of a share-manager
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareManagerStatus {
    /// Process state
    #[serde(default)]
    pub state: ShareManagerState,

    /// Export address reported by the share-manager
    #[serde(default)]
    pub endpoint: String,

    /// Node currently owning the share-manager
    #[serde(default, rename = "ownerID")]
    pub owner_id: String,
}

/// Share-manager process state
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShareManagerState {
    /// Waiting to be scheduled
    Pending,
    /// Pod is starting
    Starting,
    /// Export is being served
    Running,
    /// Pod is shutting down
    Stopping,
    /// No process running
    Stopped,
    /// Process failed
    Error,
    /// Not scheduled, state not reported, or a state this controller does
    /// not recognize
    #[default]
    #[serde(other)]
    Unknown,
}

impl ShareManager {
    /// Current process state, Unknown when no status is reported
    pub fn state(&self) -> ShareManagerState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }
}

/// Record of which consumers have a volume attached
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "VolumeAttachment",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAttachmentSpec {
    /// Tickets keyed by ticket ID
    #[serde(default)]
    pub attachment_tickets: BTreeMap<String, AttachmentTicket>,

    /// Name of the attached volume
    #[serde(default)]
    pub volume: String,
}

/// A named request for access to a volume
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AttachmentTicket {
    /// Ticket ID, equal to its key in the ticket map
    pub id: String,

    /// Consumer type
    #[serde(rename = "type")]
    pub type_: AttacherType,

    /// Node to attach to, empty for no preference
    #[serde(rename = "nodeID", default)]
    pub node_id: String,

    /// Attacher parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Generation the storage subsystem has observed for this ticket
    #[serde(default, skip_serializing_if = "is_zero")]
    pub generation: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Consumer types understood by the storage subsystem
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum AttacherType {
    /// Kubernetes CSI attach
    #[serde(rename = "csi-attacher")]
    CsiAttacher,
    /// Share-manager controller for RWX volumes
    #[serde(rename = "share-manager-controller")]
    ShareManagerController,
    /// Storage subsystem API
    #[serde(rename = "longhorn-api")]
    LonghornApi,
    /// Snapshot controller
    #[serde(rename = "snapshot-controller")]
    SnapshotController,
    /// Backup controller
    #[serde(rename = "backup-controller")]
    BackupController,
    /// Volume clone controller
    #[serde(rename = "volume-clone-controller")]
    VolumeCloneController,
    /// Volume restore controller
    #[serde(rename = "volume-restore-controller")]
    VolumeRestoreController,
    /// Volume eviction controller
    #[serde(rename = "volume-eviction-controller")]
    VolumeEvictionController,
    /// Volume expansion controller
    #[serde(rename = "volume-expansion-controller")]
    VolumeExpansionController,
    /// Any attacher type this controller does not know about
    #[default]
    #[serde(rename = "unknown", other)]
    Unknown,
}
