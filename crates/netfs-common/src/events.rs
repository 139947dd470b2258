//! Kubernetes Events emitted on NetworkFilesystem transitions
//!
//! Publishing never fails reconciliation; a rejected event is logged and
//! dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Event reasons
pub mod reasons {
    /// Attachment tickets installed
    pub const ENABLING: &str = "Enabling";
    /// Export address published
    pub const ENABLED: &str = "Enabled";
    /// Attachment tickets cleared, drain in progress
    pub const DISABLING: &str = "Disabling";
    /// Volume released
    pub const DISABLED: &str = "Disabled";
    /// Service address moved
    pub const ENDPOINT_CHANGED: &str = "EndpointChanged";
    /// Headless Service whose endpoints are not exactly one address and port
    pub const ENDPOINT_MISCONFIGURED: &str = "EndpointMisconfigured";
}

/// Event actions
pub mod actions {
    /// Main reconcile pass
    pub const RECONCILE: &str = "Reconcile";
    /// Installing or clearing attachment tickets
    pub const ATTACH: &str = "Attach";
    /// Endpoint address synchronization
    pub const SYNC_ENDPOINT: &str = "SyncEndpoint";
}

/// One transition worth surfacing on a NetworkFilesystem
#[derive(Clone, Debug, PartialEq)]
pub struct FsEvent {
    /// Normal or Warning
    pub type_: EventType,
    /// Machine-readable reason
    pub reason: &'static str,
    /// Action taken
    pub action: &'static str,
    /// Human-readable note
    pub note: String,
}

impl FsEvent {
    fn normal(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason,
            action,
            note: note.into(),
        }
    }

    /// Tickets installed for a disabled or new filesystem
    pub fn enabling() -> Self {
        Self::normal(reasons::ENABLING, actions::ATTACH, "Attachment tickets installed")
    }

    /// Export address resolved and published
    pub fn enabled(address: &str) -> Self {
        Self::normal(
            reasons::ENABLED,
            actions::RECONCILE,
            format!("Exported at {address}"),
        )
    }

    /// Tickets cleared; `settled` when nothing was ever attached and the
    /// record went straight to Disabled
    pub fn tickets_cleared(settled: bool) -> Self {
        let reason = if settled {
            reasons::DISABLED
        } else {
            reasons::DISABLING
        };
        Self::normal(reason, actions::ATTACH, "Attachment tickets cleared")
    }

    /// Volume released after a drain
    pub fn disabled() -> Self {
        Self::normal(
            reasons::DISABLED,
            actions::RECONCILE,
            "Share-manager stopped and volume detached",
        )
    }

    /// Service address moved; `previous` is empty on first assignment
    pub fn endpoint_changed(previous: &str, current: &str) -> Self {
        let note = if previous.is_empty() {
            format!("Endpoint address is initialized with {current}")
        } else {
            format!("Endpoint address changed from {previous} to {current}")
        };
        Self::normal(reasons::ENDPOINT_CHANGED, actions::SYNC_ENDPOINT, note)
    }

    /// Service endpoints are not exactly one address and port
    pub fn endpoint_misconfigured(detail: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reasons::ENDPOINT_MISCONFIGURED,
            action: actions::RECONCILE,
            note: detail.into(),
        }
    }
}

/// Sink for [`FsEvent`]s
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event` against `target`
    async fn publish(&self, target: &ObjectReference, event: FsEvent);
}

/// Publishes through the cluster's events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `instance` identifies this replica, usually the node name
    pub fn new(client: Client, controller_name: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, target: &ObjectReference, event: FsEvent) {
        let FsEvent {
            type_,
            reason,
            action,
            note,
        } = event;
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, target).await {
            warn!(
                reason,
                object = ?target.name,
                error = %e,
                "dropping network filesystem event"
            );
        }
    }
}

/// Discards every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _target: &ObjectReference, _event: FsEvent) {}
}
