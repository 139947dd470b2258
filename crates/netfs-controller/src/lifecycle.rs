//! NetworkFilesystem lifecycle controller
//!
//! Drives each record through
//! `Disabled -> Enabling -> Enabled -> Disabling -> Disabled`.
//! Every invocation reads the record and the storage resources it depends
//! on, computes the next status, and writes it only when it differs from
//! the observed one. Waiting on another component is either a retryable
//! error (requeued with backoff) or a silent no-op that relies on the next
//! change event from the ShareManager, VolumeAttachment, Service or
//! Endpoints watch.

use std::sync::Arc;

use k8s_openapi::api::core::v1::PersistentVolume;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use netfs_common::crd::{
    upsert_readiness, EndpointStatus, NetworkFilesystem, NetworkFilesystemStatus,
    NetworkFsCondition, NetworkFsState, NetworkFsType, ShareManagerState,
};
use netfs_common::events::{EventPublisher, FsEvent, KubeEventPublisher};
use netfs_common::{Config, Error, NFS_OPTIONS_ATTRIBUTE};

use crate::attachment::{csi_ticket_id, share_manager_ticket_id, update_attachment};
use crate::client::{KubeClient, KubeClientImpl};
use crate::endpoint::{resolve_from_subsets, service_address, EndpointResolution, ServiceAddress};
use crate::locks::NameLocks;
use crate::requeue_delay;

/// Name reported on Events emitted by the controllers
pub const CONTROLLER_NAME: &str = "networkfs-controller";

/// Shared context for both reconcilers
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Event publisher for transition events
    pub events: Arc<dyn EventPublisher>,
    /// Process configuration
    pub config: Arc<Config>,
    /// Per-name lock shared with the endpoint-sync controller
    pub locks: Arc<NameLocks>,
}

impl Context {
    /// Create a context backed by a real Kubernetes client
    pub fn new(client: Client, config: Arc<Config>, locks: Arc<NameLocks>) -> Self {
        let instance = (!config.node_name.is_empty()).then(|| config.node_name.clone());
        Self {
            kube: Arc::new(KubeClientImpl::new(client.clone(), config.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME, instance)),
            config,
            locks,
        }
    }

    /// Create a context from explicit parts
    pub fn from_parts(
        kube: Arc<dyn KubeClient>,
        events: Arc<dyn EventPublisher>,
        config: Arc<Config>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self {
            kube,
            events,
            config,
            locks,
        }
    }

    async fn publish(&self, nfs: &NetworkFilesystem, event: FsEvent) {
        self.events.publish(&nfs.object_ref(&()), event).await;
    }
}

/// Reconcile a NetworkFilesystem
///
/// Skips records being deleted. Otherwise takes the per-name lock,
/// re-reads the latest copy of the record and applies at most one status
/// write.
#[instrument(skip(nfs, ctx), fields(networkfs = %nfs.name_any()))]
pub async fn reconcile(nfs: Arc<NetworkFilesystem>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = nfs.name_any();
    if nfs.is_deleting() {
        info!("skipping network filesystem being deleted");
        return Ok(Action::await_change());
    }

    let _guard = ctx.locks.lock(&name).await;

    let latest = match ctx.kube.get_network_filesystem(&name).await? {
        Some(latest) if !latest.is_deleting() => latest,
        _ => {
            debug!("network filesystem gone before reconciliation");
            return Ok(Action::await_change());
        }
    };

    if reconcile_state(&latest, &ctx).await?.is_some() {
        debug!("status written, waiting for the resulting change event");
    }
    Ok(Action::await_change())
}

/// Compute and apply the next lifecycle step for `nfs`.
///
/// Returns the updated record when a status write happened, `None` when
/// the record is converged or waiting on an upstream event.
pub async fn reconcile_state(
    nfs: &NetworkFilesystem,
    ctx: &Context,
) -> Result<Option<NetworkFilesystem>, Error> {
    let name = nfs.name_any();
    let desired = nfs.spec.desired_state;

    let Some(current) = nfs.state() else {
        info!(networkfs = %name, "initializing status");
        let mut updated = nfs.clone();
        updated.status = Some(NetworkFilesystemStatus {
            state: Some(NetworkFsState::Unknown),
            endpoint_status: EndpointStatus::Unknown,
            fs_type: NetworkFsType::NFS,
            ..Default::default()
        });
        return write_status(ctx, nfs, updated).await;
    };

    if current == desired {
        debug!(networkfs = %name, state = %current, "already in desired state");
        return Ok(None);
    }

    match desired {
        NetworkFsState::Enabled => enable(nfs, current, ctx).await,
        NetworkFsState::Disabled => disable(nfs, current, ctx).await,
        other => {
            error!(networkfs = %name, desired = %other, "unknown desired state, ignoring");
            Ok(None)
        }
    }
}

async fn disable(
    nfs: &NetworkFilesystem,
    current: NetworkFsState,
    ctx: &Context,
) -> Result<Option<NetworkFilesystem>, Error> {
    let name = nfs.name_any();

    if current == NetworkFsState::Disabling {
        return finish_disable(nfs, ctx).await;
    }

    info!(networkfs = %name, state = %current, "disabling network filesystem");
    update_attachment(ctx.kube.as_ref(), nfs, false).await?;

    let mut updated = nfs.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    if current == NetworkFsState::Unknown {
        // never enabled, nothing to drain
        mark_disabled(status);
    } else {
        status.state = Some(NetworkFsState::Disabling);
    }

    let written = write_status(ctx, nfs, updated).await?;
    if let Some(ref written) = written {
        let settled = written.state() == Some(NetworkFsState::Disabled);
        ctx.publish(written, FsEvent::tickets_cleared(settled)).await;
    }
    Ok(written)
}

/// Promote `Disabling` to `Disabled` once the volume is fully released:
/// neither of our tickets remains and the share-manager serves nothing.
async fn finish_disable(
    nfs: &NetworkFilesystem,
    ctx: &Context,
) -> Result<Option<NetworkFilesystem>, Error> {
    let name = nfs.name_any();

    let detached = match ctx.kube.get_volume_attachment(&name).await? {
        Some(va) => {
            let tickets = &va.spec.attachment_tickets;
            !tickets.contains_key(&csi_ticket_id(&name))
                && !tickets.contains_key(&share_manager_ticket_id(&name))
        }
        None => true,
    };
    let stopped = match ctx.kube.get_share_manager(&name).await? {
        Some(sm) => !is_serving(sm.state()),
        None => true,
    };

    if !detached || !stopped {
        debug!(networkfs = %name, detached, stopped, "waiting for volume to be released");
        return Ok(None);
    }

    info!(networkfs = %name, "volume released, network filesystem disabled");
    let mut updated = nfs.clone();
    mark_disabled(updated.status.get_or_insert_with(Default::default));

    let written = write_status(ctx, nfs, updated).await?;
    if let Some(ref written) = written {
        ctx.publish(written, FsEvent::disabled()).await;
    }
    Ok(written)
}

/// Whether a share-manager in `state` may still hold the volume.
///
/// Stopped, Error and Unknown share-managers serve nothing; once our
/// tickets are gone no process will start for them.
fn is_serving(state: ShareManagerState) -> bool {
    matches!(
        state,
        ShareManagerState::Pending
            | ShareManagerState::Starting
            | ShareManagerState::Running
            | ShareManagerState::Stopping
    )
}

fn mark_disabled(status: &mut NetworkFilesystemStatus) {
    status.state = Some(NetworkFsState::Disabled);
    status.endpoint_status = EndpointStatus::NotReady;
    status.fs_type = NetworkFsType::NFS;
    status.endpoint.clear();
    upsert_readiness(
        &mut status.conditions,
        NetworkFsCondition::not_ready("Disabled", "Network filesystem is disabled"),
    );
}

async fn enable(
    nfs: &NetworkFilesystem,
    current: NetworkFsState,
    ctx: &Context,
) -> Result<Option<NetworkFilesystem>, Error> {
    let name = nfs.name_any();
    info!(networkfs = %name, state = %current, "enabling network filesystem");

    if current == NetworkFsState::Disabling {
        // a disable must fully complete before a new enable may begin
        if let Some(written) = finish_disable(nfs, ctx).await? {
            return Ok(Some(written));
        }
        info!(networkfs = %name, "waiting for the previous disable to finish");
        return Err(Error::waiting(
            &name,
            "previous operation (disable) must finish before enabling",
        ));
    }

    let share_manager = ctx
        .kube
        .get_share_manager(&name)
        .await?
        .ok_or_else(|| Error::not_found("ShareManager", &name))?;

    if current != NetworkFsState::Enabling {
        // Enabled returned as converged and Disabling was drained above
        debug_assert!(matches!(
            current,
            NetworkFsState::Disabled | NetworkFsState::Unknown
        ));

        info!(networkfs = %name, "installing attachment tickets to start the share-manager");
        update_attachment(ctx.kube.as_ref(), nfs, true).await?;

        let mut updated = nfs.clone();
        let status = updated.status.get_or_insert_with(Default::default);
        status.state = Some(NetworkFsState::Enabling);
        status.endpoint_status = EndpointStatus::NotReady;
        status.fs_type = NetworkFsType::NFS;

        let written = write_status(ctx, nfs, updated).await?;
        if let Some(ref written) = written {
            ctx.publish(written, FsEvent::enabling()).await;
        }
        return Ok(written);
    }

    if share_manager.state() != ShareManagerState::Running {
        info!(networkfs = %name, share_manager = ?share_manager.state(), "waiting for share-manager");
        return Err(Error::waiting(&name, "share-manager is not running"));
    }

    let address = match resolve_address(&name, ctx).await {
        Ok(EndpointResolution::Ready(address)) => address,
        Ok(EndpointResolution::Pending(reason)) => {
            info!(networkfs = %name, reason, "endpoint not ready yet");
            return Ok(None);
        }
        Err(e) => {
            if let Error::EndpointShape { .. } = e {
                ctx.publish(nfs, FsEvent::endpoint_misconfigured(e.to_string()))
                    .await;
            }
            return Err(e);
        }
    };

    let mount_options = ctx
        .kube
        .get_persistent_volume(&name)
        .await?
        .and_then(|pv| nfs_mount_options(&pv))
        .unwrap_or_default();

    let mut updated = nfs.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    status.state = Some(NetworkFsState::Enabled);
    status.fs_type = NetworkFsType::NFS;
    status.endpoint_status = EndpointStatus::Ready;
    status.endpoint = address.clone();
    status.mount_options = mount_options;
    upsert_readiness(&mut status.conditions, NetworkFsCondition::ready());

    let written = write_status(ctx, nfs, updated).await?;
    if let Some(ref written) = written {
        info!(networkfs = %name, endpoint = %address, "network filesystem enabled");
        ctx.publish(written, FsEvent::enabled(&address)).await;
    }
    Ok(written)
}

/// Resolve the export address: the cluster IP when the Service has one,
/// the single endpoint subset when it is headless.
async fn resolve_address(name: &str, ctx: &Context) -> Result<EndpointResolution, Error> {
    let service = ctx
        .kube
        .get_service(name)
        .await?
        .ok_or_else(|| Error::not_found("Service", name))?;

    match service_address(&service) {
        ServiceAddress::Assigned(ip) => Ok(EndpointResolution::Ready(ip)),
        ServiceAddress::Unassigned => Ok(EndpointResolution::Pending(
            "service has no cluster IP yet",
        )),
        ServiceAddress::Headless => {
            let endpoints = ctx.kube.get_endpoints(name).await?;
            resolve_from_subsets(name, endpoints.as_ref())
        }
    }
}

/// Mount options declared on the volume's CSI attributes
pub fn nfs_mount_options(pv: &PersistentVolume) -> Option<String> {
    pv.spec
        .as_ref()?
        .csi
        .as_ref()?
        .volume_attributes
        .as_ref()?
        .get(NFS_OPTIONS_ATTRIBUTE)
        .cloned()
}

/// Write `updated`'s status unless it equals `observed`'s.
pub(crate) async fn write_status(
    ctx: &Context,
    observed: &NetworkFilesystem,
    updated: NetworkFilesystem,
) -> Result<Option<NetworkFilesystem>, Error> {
    if observed.status == updated.status {
        debug!(networkfs = %observed.name_any(), "status unchanged, skipping update");
        return Ok(None);
    }
    ctx.kube
        .update_network_filesystem_status(&updated)
        .await
        .map(Some)
}

/// Error policy for NetworkFilesystem reconciliation
pub fn error_policy(nfs: Arc<NetworkFilesystem>, error: &Error, _ctx: Arc<Context>) -> Action {
    match error {
        Error::Waiting { .. } | Error::NotFound { .. } => {
            info!(networkfs = %nfs.name_any(), %error, "reconciliation waiting, will retry")
        }
        _ => warn!(?error, networkfs = %nfs.name_any(), "reconciliation failed"),
    }
    Action::requeue(requeue_delay(error))
}
