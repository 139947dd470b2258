//! Resource-store access for the reconcilers
//!
//! Reconcilers only talk to Kubernetes through [`KubeClient`], so they can
//! be exercised against mocks in tests.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolume, Service};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use netfs_common::crd::{NetworkFilesystem, ShareManager, VolumeAttachment};
use netfs_common::{Config, Error, FIELD_MANAGER};

/// Trait abstracting the Kubernetes operations both reconcilers need
///
/// Lookups return `Ok(None)` when the object does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a NetworkFilesystem from the controller namespace
    async fn get_network_filesystem(&self, name: &str)
        -> Result<Option<NetworkFilesystem>, Error>;

    /// Write the status of a NetworkFilesystem
    ///
    /// The write is conditional on the record's resourceVersion, so a stale
    /// copy fails with a conflict instead of overwriting a newer status.
    async fn update_network_filesystem_status(
        &self,
        nfs: &NetworkFilesystem,
    ) -> Result<NetworkFilesystem, Error>;

    /// Get the share-manager serving the volume
    async fn get_share_manager(&self, name: &str) -> Result<Option<ShareManager>, Error>;

    /// Get the volume's attachment record
    async fn get_volume_attachment(&self, name: &str) -> Result<Option<VolumeAttachment>, Error>;

    /// Apply a JSON merge patch to a VolumeAttachment
    async fn patch_volume_attachment(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Get the Service exposing the share-manager
    async fn get_service(&self, name: &str) -> Result<Option<Service>, Error>;

    /// Get the Endpoints backing a headless Service
    async fn get_endpoints(&self, name: &str) -> Result<Option<Endpoints>, Error>;

    /// Get the PersistentVolume backing the filesystem
    async fn get_persistent_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    config: Arc<Config>,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    fn longhorn_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.config.longhorn_namespace)
    }
}

async fn get_optional<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_network_filesystem(
        &self,
        name: &str,
    ) -> Result<Option<NetworkFilesystem>, Error> {
        let api: Api<NetworkFilesystem> =
            Api::namespaced(self.client.clone(), &self.config.namespace);
        get_optional(&api, name).await
    }

    async fn update_network_filesystem_status(
        &self,
        nfs: &NetworkFilesystem,
    ) -> Result<NetworkFilesystem, Error> {
        let name = nfs.name_any();
        let namespace = nfs
            .namespace()
            .unwrap_or_else(|| self.config.namespace.clone());
        let api: Api<NetworkFilesystem> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({
            "metadata": { "resourceVersion": nfs.resource_version() },
            "status": nfs.status,
        });
        let updated = api
            .patch_status(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(networkfs = %name, "status updated");
        Ok(updated)
    }

    async fn get_share_manager(&self, name: &str) -> Result<Option<ShareManager>, Error> {
        get_optional(&self.longhorn_api::<ShareManager>(), name).await
    }

    async fn get_volume_attachment(&self, name: &str) -> Result<Option<VolumeAttachment>, Error> {
        get_optional(&self.longhorn_api::<VolumeAttachment>(), name).await
    }

    async fn patch_volume_attachment(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error> {
        self.longhorn_api::<VolumeAttachment>()
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Option<Service>, Error> {
        get_optional(&self.longhorn_api::<Service>(), name).await
    }

    async fn get_endpoints(&self, name: &str) -> Result<Option<Endpoints>, Error> {
        get_optional(&self.longhorn_api::<Endpoints>(), name).await
    }

    async fn get_persistent_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        get_optional(&api, name).await
    }
}
