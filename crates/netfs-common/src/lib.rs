//! Common types for the network filesystem controller: CRDs, conditions,
//! errors, configuration and event publishing.

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod events;

pub use config::Config;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace holding NetworkFilesystem records
pub const DEFAULT_NAMESPACE: &str = "harvester-system";

/// Default namespace of the storage subsystem (ShareManagers, VolumeAttachments, Services)
pub const LONGHORN_NAMESPACE: &str = "longhorn-system";

/// Name prefix shared by every storage-backed volume and its Service/Endpoints
pub const BACKING_VOLUME_PREFIX: &str = "pvc-";

/// Port name the share-manager exposes for the NFS export
pub const NFS_PORT_NAME: &str = "nfs";

/// CSI volume attribute holding the declared NFS mount options
pub const NFS_OPTIONS_ATTRIBUTE: &str = "nfsOptions";

/// Field manager used for every write issued by this controller
pub const FIELD_MANAGER: &str = "networkfs-controller";
