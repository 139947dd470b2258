//! Status conditions and the merge rule used to fold them into a status

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kinds of condition reported on a NetworkFilesystem
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkFsConditionType {
    /// Endpoint holds a reachable address
    Ready,
    /// Endpoint has no address
    NotReady,
    /// Endpoint address was initialized or changed
    EndpointChanged,
}

/// Kubernetes-style condition for NetworkFilesystem status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFsCondition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: NetworkFsConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Last time the condition's status flipped
    pub last_transition_time: DateTime<Utc>,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,
}

impl NetworkFsCondition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: NetworkFsConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            last_transition_time: Utc::now(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Endpoint resolved to an address
    pub fn ready() -> Self {
        Self::new(
            NetworkFsConditionType::Ready,
            ConditionStatus::True,
            "EndpointReady",
            "Endpoint contains the corresponding address",
        )
    }

    /// Endpoint has no address
    pub fn not_ready(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            NetworkFsConditionType::NotReady,
            ConditionStatus::True,
            reason,
            message,
        )
    }

    /// Endpoint address moved from `previous` to `current`
    ///
    /// An empty `previous` means the address is being set for the first time.
    pub fn endpoint_changed(previous: &str, current: &str) -> Self {
        let message = if previous.is_empty() {
            format!("Endpoint address is initialized with {current}")
        } else {
            format!("Endpoint address is changed, previous address is {previous}")
        };
        Self::new(
            NetworkFsConditionType::EndpointChanged,
            ConditionStatus::True,
            "EndpointChanged",
            message,
        )
    }
}

/// Fold `condition` into `conditions`, keeping one entry per type.
///
/// An existing entry keeps its position and gets the new status, reason and
/// message; its transition time only moves when the status value flips.
/// Unseen types are appended.
pub fn upsert_condition(conditions: &mut Vec<NetworkFsCondition>, condition: NetworkFsCondition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status != condition.status {
                existing.last_transition_time = condition.last_transition_time;
            }
            existing.status = condition.status;
            existing.reason = condition.reason;
            existing.message = condition.message;
        }
        None => conditions.push(condition),
    }
}

/// Fold a Ready or NotReady condition and mirror it onto its counterpart.
///
/// Ready and NotReady always carry opposite statuses, so a recovered
/// endpoint never reports both as True. Other types are upserted as is.
pub fn upsert_readiness(conditions: &mut Vec<NetworkFsCondition>, condition: NetworkFsCondition) {
    let counterpart = match condition.type_ {
        NetworkFsConditionType::Ready => NetworkFsConditionType::NotReady,
        NetworkFsConditionType::NotReady => NetworkFsConditionType::Ready,
        NetworkFsConditionType::EndpointChanged => {
            return upsert_condition(conditions, condition);
        }
    };
    let inverse = match condition.status {
        ConditionStatus::True => ConditionStatus::False,
        ConditionStatus::False => ConditionStatus::True,
        ConditionStatus::Unknown => ConditionStatus::Unknown,
    };
    let mirrored = NetworkFsCondition {
        type_: counterpart,
        status: inverse,
        ..condition.clone()
    };
    upsert_condition(conditions, condition);
    upsert_condition(conditions, mirrored);
}
