//! Controller runner - builds the controller futures
//!
//! The lifecycle controller watches NetworkFilesystem records and is
//! re-triggered by changes to the ShareManager, VolumeAttachment and
//! Endpoints objects of the same name. The endpoint-sync controller watches
//! Services. Both share one context and one per-name lock table.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use netfs_common::crd::{NetworkFilesystem, ShareManager, VolumeAttachment};
use netfs_common::{Config, BACKING_VOLUME_PREFIX};
use netfs_controller::{lifecycle, service_sync, Context, NameLocks};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller future ready to be polled
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the lifecycle and endpoint-sync controller futures
pub fn build_controllers(client: Client, config: Arc<Config>) -> Vec<ControllerFuture> {
    let locks = Arc::new(NameLocks::new());
    let ctx = Arc::new(Context::new(client.clone(), config.clone(), locks));

    let records: Api<NetworkFilesystem> = Api::namespaced(client.clone(), &config.namespace);
    let share_managers: Api<ShareManager> =
        Api::namespaced(client.clone(), &config.longhorn_namespace);
    let attachments: Api<VolumeAttachment> =
        Api::namespaced(client.clone(), &config.longhorn_namespace);
    let endpoints: Api<Endpoints> = Api::namespaced(client.clone(), &config.longhorn_namespace);
    let services: Api<Service> = Api::namespaced(client, &config.longhorn_namespace);

    let lifecycle_ctrl = Controller::new(records, watcher_config())
        .watches(
            share_managers,
            watcher_config(),
            record_for(config.namespace.clone()),
        )
        .watches(
            attachments,
            watcher_config(),
            record_for(config.namespace.clone()),
        )
        .watches(
            endpoints,
            watcher_config(),
            record_for(config.namespace.clone()),
        )
        .shutdown_on_signal()
        .run(lifecycle::reconcile, lifecycle::error_policy, ctx.clone())
        .for_each(log_reconcile_result("NetworkFilesystem"));

    let sync_ctrl = Controller::new(services, watcher_config())
        .shutdown_on_signal()
        .run(service_sync::reconcile, service_sync::error_policy, ctx)
        .for_each(log_reconcile_result("EndpointSync"));

    tracing::info!(namespace = %config.namespace, "- NetworkFilesystem controller");
    tracing::info!(namespace = %config.longhorn_namespace, "- EndpointSync controller");

    vec![Box::pin(lifecycle_ctrl), Box::pin(sync_ctrl)]
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Map a storage-namespace object to the NetworkFilesystem of the same name
fn record_for<K: Resource>(
    namespace: String,
) -> impl Fn(K) -> Option<ObjectRef<NetworkFilesystem>> + Send + Sync + 'static {
    move |obj| record_ref(obj.meta().name.as_deref(), &namespace)
}

fn record_ref(name: Option<&str>, namespace: &str) -> Option<ObjectRef<NetworkFilesystem>> {
    let name = name?;
    name.starts_with(BACKING_VOLUME_PREFIX)
        .then(|| ObjectRef::new(name).within(namespace))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
