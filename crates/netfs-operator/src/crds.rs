//! CRD installation utilities
//!
//! The operator installs its own CRD on startup using server-side apply, so
//! the installed schema always matches the running version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use netfs_common::crd::NetworkFilesystem;
use netfs_common::FIELD_MANAGER;

/// Name of the NetworkFilesystem CRD object
pub const NETWORK_FILESYSTEM_CRD: &str = "networkfilesystems.harvesterhci.io";

/// Render the NetworkFilesystem CRD as YAML
pub fn crd_yaml() -> anyhow::Result<String> {
    serde_yaml::to_string(&NetworkFilesystem::crd())
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))
}

/// Install or update the NetworkFilesystem CRD
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing {} CRD...", NETWORK_FILESYSTEM_CRD);
    crds.patch(
        NETWORK_FILESYSTEM_CRD,
        &params,
        &Patch::Apply(&NetworkFilesystem::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", NETWORK_FILESYSTEM_CRD, e))?;

    tracing::info!("NetworkFilesystem CRD installed/updated");
    Ok(())
}
