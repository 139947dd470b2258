//! Custom Resource Definitions
//!
//! `NetworkFilesystem` is owned by this controller. `ShareManager` and
//! `VolumeAttachment` belong to the storage subsystem and are modeled only as
//! far as the reconcilers read or patch them.

mod conditions;
mod longhorn;
mod network_filesystem;

pub use conditions::{
    upsert_condition, upsert_readiness, ConditionStatus, NetworkFsCondition,
    NetworkFsConditionType,
};
pub use longhorn::{
    AttacherType, AttachmentTicket, ShareManager, ShareManagerSpec, ShareManagerState,
    ShareManagerStatus, VolumeAttachment, VolumeAttachmentSpec,
    ATTACHMENT_PARAMETER_DISABLE_FRONTEND,
};
pub use network_filesystem::{
    EndpointStatus, NetworkFilesystem, NetworkFilesystemSpec, NetworkFilesystemStatus,
    NetworkFsState, NetworkFsType,
};
