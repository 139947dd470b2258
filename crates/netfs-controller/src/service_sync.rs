//! Endpoint-sync controller
//!
//! Watches the storage subsystem's `pvc-*` Services and mirrors their
//! cluster IP into the matching NetworkFilesystem's status. It never
//! promotes a record to Enabled; the lifecycle controller does that after
//! validating the share-manager independently.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use netfs_common::crd::{
    upsert_condition, upsert_readiness, EndpointStatus, NetworkFilesystem, NetworkFsCondition,
    NetworkFsState, NetworkFsType,
};
use netfs_common::events::FsEvent;
use netfs_common::{Error, BACKING_VOLUME_PREFIX};

use crate::endpoint::{service_address, ServiceAddress};
use crate::lifecycle::{write_status, Context};
use crate::requeue_delay;

/// Reconcile a Service change into the NetworkFilesystem of the same name
#[instrument(skip(service, ctx), fields(service = %service.name_any()))]
pub async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = service.name_any();
    if service.meta().deletion_timestamp.is_some() {
        info!("skipping service being deleted");
        return Ok(Action::await_change());
    }
    if !name.starts_with(BACKING_VOLUME_PREFIX) {
        return Ok(Action::await_change());
    }

    let _guard = ctx.locks.lock(&name).await;
    sync_endpoint(&service, &ctx).await?;
    Ok(Action::await_change())
}

/// Push the Service's address into the record's status.
///
/// Returns the updated record when a status write happened.
pub async fn sync_endpoint(
    service: &Service,
    ctx: &Context,
) -> Result<Option<NetworkFilesystem>, Error> {
    let name = service.name_any();
    info!(networkfs = %name, "handling service change");

    let Some(nfs) = ctx.kube.get_network_filesystem(&name).await? else {
        debug!(networkfs = %name, "no network filesystem for service");
        return Ok(None);
    };
    if nfs.is_deleting() {
        return Ok(None);
    }
    if nfs.spec.desired_state != NetworkFsState::Enabled {
        info!(networkfs = %name, "network filesystem not enabled, skipping endpoint sync");
        return Ok(None);
    }
    // tickets are installed and prior disables finished only once the
    // lifecycle controller has moved the record to Enabling
    if !matches!(
        nfs.state(),
        Some(NetworkFsState::Enabling | NetworkFsState::Enabled)
    ) {
        debug!(networkfs = %name, state = ?nfs.state(), "lifecycle has not started enabling yet");
        return Ok(None);
    }

    let address = match service_address(service) {
        ServiceAddress::Headless => {
            debug!(networkfs = %name, "headless service, endpoint resolved from subsets");
            return Ok(None);
        }
        ServiceAddress::Unassigned => None,
        ServiceAddress::Assigned(ip) => Some(ip),
    };

    let mut updated = nfs.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    let previous = status.endpoint.clone();
    status.fs_type = NetworkFsType::NFS;
    status.state = Some(NetworkFsState::Enabling);

    match address {
        None => {
            status.endpoint.clear();
            status.endpoint_status = EndpointStatus::NotReady;
            upsert_readiness(
                &mut status.conditions,
                NetworkFsCondition::not_ready(
                    "ServiceNotReady",
                    "Service did not contain the corresponding address",
                ),
            );
        }
        Some(ref ip) => {
            if previous != *ip {
                upsert_condition(
                    &mut status.conditions,
                    NetworkFsCondition::endpoint_changed(&previous, ip),
                );
            }
            status.endpoint = ip.clone();
            status.endpoint_status = EndpointStatus::Ready;
            upsert_readiness(&mut status.conditions, NetworkFsCondition::ready());
        }
    }

    let written = write_status(ctx, &nfs, updated).await?;
    if let (Some(written), Some(ip)) = (&written, &address) {
        if previous != *ip {
            info!(networkfs = %name, previous = %previous, endpoint = %ip, "endpoint changed");
            ctx.events
                .publish(
                    &written.object_ref(&()),
                    FsEvent::endpoint_changed(&previous, ip),
                )
                .await;
        }
    }
    Ok(written)
}

/// Error policy for Service reconciliation
pub fn error_policy(service: Arc<Service>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(?error, service = %service.name_any(), "endpoint sync failed");
    Action::requeue(requeue_delay(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use netfs_common::crd::{
        ConditionStatus, NetworkFilesystemSpec, NetworkFilesystemStatus, NetworkFsConditionType,
    };
    use netfs_common::events::NoopEventPublisher;
    use netfs_common::Config;

    use crate::client::MockKubeClient;
    use crate::endpoint::tests::service;
    use crate::locks::NameLocks;

    const NAME: &str = "pvc-1";

    fn sample_nfs(desired: NetworkFsState, state: NetworkFsState, endpoint: &str) -> NetworkFilesystem {
        let mut nfs = NetworkFilesystem::new(
            NAME,
            NetworkFilesystemSpec {
                desired_state: desired,
                preferred_node: None,
            },
        );
        nfs.metadata.resource_version = Some("7".to_string());
        nfs.status = Some(NetworkFilesystemStatus {
            state: Some(state),
            endpoint: endpoint.to_string(),
            ..Default::default()
        });
        nfs
    }

    type StatusCapture = Arc<Mutex<Vec<NetworkFilesystemStatus>>>;

    fn mock_with(nfs: Option<NetworkFilesystem>) -> (MockKubeClient, StatusCapture) {
        let mut mock = MockKubeClient::new();
        let captured: StatusCapture = Arc::new(Mutex::new(Vec::new()));

        mock.expect_get_network_filesystem()
            .returning(move |_| Ok(nfs.clone()));
        let statuses = captured.clone();
        mock.expect_update_network_filesystem_status()
            .returning(move |nfs| {
                statuses
                    .lock()
                    .unwrap()
                    .push(nfs.status.clone().unwrap_or_default());
                Ok(nfs.clone())
            });

        (mock, captured)
    }

    fn context(mock: MockKubeClient) -> Context {
        Context::from_parts(
            Arc::new(mock),
            Arc::new(NoopEventPublisher),
            Arc::new(Config::default()),
            Arc::new(NameLocks::new()),
        )
    }

    fn condition(
        status: &NetworkFilesystemStatus,
        type_: NetworkFsConditionType,
    ) -> Option<&NetworkFsCondition> {
        status.conditions.iter().find(|c| c.type_ == type_)
    }

    #[tokio::test]
    async fn unrelated_service_is_ignored() {
        // no expectations: any lookup panics
        let ctx = Arc::new(context(MockKubeClient::new()));
        let action = reconcile(Arc::new(service("kube-dns", "10.96.0.10")), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn deleting_service_is_ignored() {
        let mut svc = service(NAME, "10.0.0.5");
        svc.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        let ctx = Arc::new(context(MockKubeClient::new()));
        assert!(reconcile(Arc::new(svc), ctx).await.is_ok());
    }

    #[tokio::test]
    async fn missing_record_is_a_noop() {
        let (mock, captured) = mock_with(None);
        let written = sync_endpoint(&service(NAME, "10.0.0.5"), &context(mock))
            .await
            .unwrap();
        assert!(written.is_none());
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_record_is_left_alone() {
        let nfs = sample_nfs(NetworkFsState::Disabled, NetworkFsState::Enabled, "10.0.0.5");
        let (mock, captured) = mock_with(Some(nfs));

        sync_endpoint(&service(NAME, "10.0.0.6"), &context(mock))
            .await
            .unwrap();

        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_still_disabling_is_left_alone() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Disabling, "");
        let (mock, captured) = mock_with(Some(nfs));

        sync_endpoint(&service(NAME, "10.0.0.5"), &context(mock))
            .await
            .unwrap();

        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn headless_service_is_left_to_lifecycle() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Enabling, "");
        let (mock, captured) = mock_with(Some(nfs));

        sync_endpoint(&service(NAME, "None"), &context(mock))
            .await
            .unwrap();

        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unassigned_address_marks_not_ready() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Enabling, "10.0.0.5");
        let (mock, captured) = mock_with(Some(nfs));

        sync_endpoint(&service(NAME, ""), &context(mock))
            .await
            .unwrap();

        let statuses = captured.lock().unwrap();
        assert_eq!(statuses.len(), 1);
        let status = &statuses[0];
        assert_eq!(status.endpoint, "");
        assert_eq!(status.endpoint_status, EndpointStatus::NotReady);
        assert_eq!(status.state, Some(NetworkFsState::Enabling));
        let not_ready = condition(status, NetworkFsConditionType::NotReady).unwrap();
        assert_eq!(not_ready.status, ConditionStatus::True);
        let ready = condition(status, NetworkFsConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
    }

    #[tokio::test]
    async fn recovered_address_clears_not_ready() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Enabled, "10.0.0.5");
        let (mock, _) = mock_with(Some(nfs));
        let lost = sync_endpoint(&service(NAME, ""), &context(mock))
            .await
            .unwrap()
            .unwrap();

        let (mock, captured) = mock_with(Some(lost));
        sync_endpoint(&service(NAME, "10.0.0.5"), &context(mock))
            .await
            .unwrap();

        let statuses = captured.lock().unwrap();
        let status = &statuses[0];
        assert_eq!(status.endpoint_status, EndpointStatus::Ready);
        assert_eq!(
            condition(status, NetworkFsConditionType::Ready).map(|c| c.status),
            Some(ConditionStatus::True)
        );
        assert_eq!(
            condition(status, NetworkFsConditionType::NotReady).map(|c| c.status),
            Some(ConditionStatus::False)
        );
    }

    #[tokio::test]
    async fn first_address_is_recorded_as_initialized() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Enabling, "");
        let (mock, captured) = mock_with(Some(nfs));

        sync_endpoint(&service(NAME, "10.0.0.5"), &context(mock))
            .await
            .unwrap();

        let statuses = captured.lock().unwrap();
        let status = &statuses[0];
        assert_eq!(status.endpoint, "10.0.0.5");
        assert_eq!(status.endpoint_status, EndpointStatus::Ready);
        assert_eq!(status.fs_type, NetworkFsType::NFS);
        assert_eq!(status.state, Some(NetworkFsState::Enabling));
        let changed = condition(status, NetworkFsConditionType::EndpointChanged).unwrap();
        assert_eq!(changed.message, "Endpoint address is initialized with 10.0.0.5");
        assert!(condition(status, NetworkFsConditionType::Ready).is_some());
    }

    #[tokio::test]
    async fn changed_address_names_previous_one() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Enabled, "10.0.0.5");
        let (mock, captured) = mock_with(Some(nfs));

        sync_endpoint(&service(NAME, "10.0.0.6"), &context(mock))
            .await
            .unwrap();

        let statuses = captured.lock().unwrap();
        let status = &statuses[0];
        assert_eq!(status.endpoint, "10.0.0.6");
        // never promotes; the lifecycle controller re-validates
        assert_eq!(status.state, Some(NetworkFsState::Enabling));
        let changed = condition(status, NetworkFsConditionType::EndpointChanged).unwrap();
        assert_eq!(
            changed.message,
            "Endpoint address is changed, previous address is 10.0.0.5"
        );
    }

    #[tokio::test]
    async fn resync_with_same_address_issues_no_write() {
        let nfs = sample_nfs(NetworkFsState::Enabled, NetworkFsState::Enabling, "");
        let (mock, captured) = mock_with(Some(nfs));
        let ctx = context(mock);

        let written = sync_endpoint(&service(NAME, "10.0.0.5"), &ctx)
            .await
            .unwrap()
            .unwrap();

        let (mock, captured_again) = mock_with(Some(written));
        let ctx = context(mock);
        let second = sync_endpoint(&service(NAME, "10.0.0.5"), &ctx)
            .await
            .unwrap();

        assert_eq!(captured.lock().unwrap().len(), 1);
        assert!(second.is_none());
        assert!(captured_again.lock().unwrap().is_empty());
    }
}
