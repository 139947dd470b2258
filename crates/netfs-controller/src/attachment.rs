//! Attachment ticket management for the backing volume
//!
//! An enabled filesystem holds exactly two tickets on its VolumeAttachment:
//! one for the CSI attacher and one for the share-manager controller. A
//! disabled filesystem holds none. Writes happen only when the computed
//! ticket map differs from the observed one.

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::{debug, info};

use netfs_common::crd::{
    AttacherType, AttachmentTicket, NetworkFilesystem, VolumeAttachment,
    ATTACHMENT_PARAMETER_DISABLE_FRONTEND,
};
use netfs_common::Error;

use crate::client::KubeClient;

/// Ticket ID used for the CSI attacher
pub fn csi_ticket_id(name: &str) -> String {
    format!("csi-{name}")
}

/// Ticket ID used for the share-manager controller
pub fn share_manager_ticket_id(name: &str) -> String {
    format!("share-manager-controller-{name}")
}

fn new_ticket(id: String, type_: AttacherType, node_id: &str) -> AttachmentTicket {
    AttachmentTicket {
        id,
        type_,
        node_id: node_id.to_string(),
        parameters: BTreeMap::from([(
            ATTACHMENT_PARAMETER_DISABLE_FRONTEND.to_string(),
            "false".to_string(),
        )]),
        generation: 0,
    }
}

/// Compute the ticket map a filesystem should hold.
///
/// Detaching yields an empty map. Attaching yields the two canonical
/// tickets; a ticket already present under its ID is carried over verbatim.
pub fn desired_tickets(
    name: &str,
    node_id: &str,
    observed: &BTreeMap<String, AttachmentTicket>,
    attach: bool,
) -> BTreeMap<String, AttachmentTicket> {
    if !attach {
        return BTreeMap::new();
    }

    [
        (csi_ticket_id(name), AttacherType::CsiAttacher),
        (share_manager_ticket_id(name), AttacherType::ShareManagerController),
    ]
    .into_iter()
    .map(|(id, type_)| {
        let ticket = observed
            .get(&id)
            .cloned()
            .unwrap_or_else(|| new_ticket(id.clone(), type_, node_id));
        (id, ticket)
    })
    .collect()
}

/// Build the merge patch turning `va`'s tickets into `desired`.
///
/// Returns `None` when nothing differs. Added or changed tickets appear as
/// objects, dropped ticket IDs as `null`. The observed resourceVersion is
/// included so the patch fails on a stale read.
pub fn tickets_patch(
    va: &VolumeAttachment,
    desired: &BTreeMap<String, AttachmentTicket>,
) -> Result<Option<serde_json::Value>, Error> {
    let observed = &va.spec.attachment_tickets;
    if observed == desired {
        return Ok(None);
    }

    let mut tickets = serde_json::Map::new();
    for (id, ticket) in desired {
        if observed.get(id) != Some(ticket) {
            tickets.insert(id.clone(), serde_json::to_value(ticket)?);
        }
    }
    for id in observed.keys().filter(|id| !desired.contains_key(*id)) {
        tickets.insert(id.clone(), serde_json::Value::Null);
    }

    Ok(Some(serde_json::json!({
        "metadata": { "resourceVersion": va.resource_version() },
        "spec": { "attachmentTickets": tickets },
    })))
}

/// Install (`attach = true`) or clear the filesystem's attachment tickets.
///
/// Issues at most one write. Returns whether a write was issued.
pub async fn update_attachment(
    kube: &dyn KubeClient,
    nfs: &NetworkFilesystem,
    attach: bool,
) -> Result<bool, Error> {
    let name = nfs.name_any();
    info!(networkfs = %name, attach, "updating volume attachment");

    let va = kube
        .get_volume_attachment(&name)
        .await?
        .ok_or_else(|| Error::not_found("VolumeAttachment", &name))?;

    let desired = desired_tickets(
        &name,
        nfs.preferred_node_id(),
        &va.spec.attachment_tickets,
        attach,
    );

    match tickets_patch(&va, &desired)? {
        Some(patch) => {
            kube.patch_volume_attachment(&name, &patch).await?;
            Ok(true)
        }
        None => {
            debug!(networkfs = %name, "attachment tickets already up to date");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use std::sync::{Arc, Mutex};
    use netfs_common::crd::{NetworkFilesystemSpec, NetworkFsState, VolumeAttachmentSpec};

    fn sample_nfs(preferred_node: Option<&str>) -> NetworkFilesystem {
        NetworkFilesystem::new(
            "pvc-1",
            NetworkFilesystemSpec {
                desired_state: NetworkFsState::Enabled,
                preferred_node: preferred_node.map(String::from),
            },
        )
    }

    fn sample_va(tickets: BTreeMap<String, AttachmentTicket>) -> VolumeAttachment {
        let mut va = VolumeAttachment::new(
            "pvc-1",
            VolumeAttachmentSpec {
                attachment_tickets: tickets,
                volume: "pvc-1".to_string(),
            },
        );
        va.metadata.resource_version = Some("42".to_string());
        va
    }

    fn foreign_ticket(id: &str) -> AttachmentTicket {
        AttachmentTicket {
            id: id.to_string(),
            type_: AttacherType::LonghornApi,
            node_id: "node-9".to_string(),
            parameters: BTreeMap::new(),
            generation: 1,
        }
    }

    #[test]
    fn attach_builds_two_canonical_tickets() {
        let tickets = desired_tickets("pvc-1", "node-1", &BTreeMap::new(), true);

        assert_eq!(tickets.len(), 2);
        let csi = &tickets["csi-pvc-1"];
        assert_eq!(csi.type_, AttacherType::CsiAttacher);
        assert_eq!(csi.node_id, "node-1");
        assert_eq!(csi.parameters["disableFrontend"], "false");
        let sm = &tickets["share-manager-controller-pvc-1"];
        assert_eq!(sm.type_, AttacherType::ShareManagerController);
    }

    #[test]
    fn attach_preserves_existing_ticket_verbatim() {
        let mut existing = new_ticket(csi_ticket_id("pvc-1"), AttacherType::CsiAttacher, "node-7");
        existing.generation = 5;
        let observed = BTreeMap::from([(existing.id.clone(), existing.clone())]);

        let tickets = desired_tickets("pvc-1", "node-1", &observed, true);

        assert_eq!(tickets["csi-pvc-1"], existing);
        assert_eq!(tickets["share-manager-controller-pvc-1"].node_id, "node-1");
    }

    #[test]
    fn detach_yields_no_tickets() {
        let observed = desired_tickets("pvc-1", "", &BTreeMap::new(), true);
        assert!(desired_tickets("pvc-1", "", &observed, false).is_empty());
    }

    #[test]
    fn patch_is_none_when_tickets_match() {
        let tickets = desired_tickets("pvc-1", "", &BTreeMap::new(), true);
        let va = sample_va(tickets.clone());
        assert!(tickets_patch(&va, &tickets).unwrap().is_none());
    }

    #[test]
    fn patch_adds_missing_and_nulls_dropped_tickets() {
        let mut observed = BTreeMap::new();
        observed.insert("other".to_string(), foreign_ticket("other"));
        let csi = new_ticket(csi_ticket_id("pvc-1"), AttacherType::CsiAttacher, "");
        observed.insert(csi.id.clone(), csi);
        let va = sample_va(observed.clone());

        let desired = desired_tickets("pvc-1", "", &observed, true);
        let patch = tickets_patch(&va, &desired).unwrap().unwrap();

        let tickets = &patch["spec"]["attachmentTickets"];
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert!(tickets["other"].is_null());
        assert_eq!(
            tickets["share-manager-controller-pvc-1"]["type"],
            "share-manager-controller"
        );
        // unchanged ticket is left out of the patch
        assert!(tickets.get("csi-pvc-1").is_none());
    }

    #[tokio::test]
    async fn attach_with_both_tickets_present_issues_no_write() {
        let tickets = desired_tickets("pvc-1", "", &BTreeMap::new(), true);
        let va = sample_va(tickets);

        let mut mock = MockKubeClient::new();
        mock.expect_get_volume_attachment()
            .returning(move |_| Ok(Some(va.clone())));
        mock.expect_patch_volume_attachment().never();

        let wrote = update_attachment(&mock, &sample_nfs(None), true).await.unwrap();
        assert!(!wrote);
    }

    #[tokio::test]
    async fn detach_clears_all_tickets_in_one_write() {
        let tickets = desired_tickets("pvc-1", "node-1", &BTreeMap::new(), true);
        let va = sample_va(tickets);

        let patches = Arc::new(Mutex::new(Vec::new()));
        let captured = patches.clone();

        let mut mock = MockKubeClient::new();
        mock.expect_get_volume_attachment()
            .returning(move |_| Ok(Some(va.clone())));
        mock.expect_patch_volume_attachment()
            .times(1)
            .returning(move |name, patch| {
                captured
                    .lock()
                    .expect("mutex should not be poisoned")
                    .push((name.to_string(), patch.clone()));
                Ok(())
            });

        let wrote = update_attachment(&mock, &sample_nfs(Some("node-1")), false)
            .await
            .unwrap();
        assert!(wrote);

        let patches = patches.lock().expect("mutex should not be poisoned");
        let (name, patch) = &patches[0];
        let tickets = &patch["spec"]["attachmentTickets"];
        assert_eq!(name, "pvc-1");
        assert!(tickets["csi-pvc-1"].is_null());
        assert!(tickets["share-manager-controller-pvc-1"].is_null());
    }

    #[tokio::test]
    async fn missing_volume_attachment_is_retryable() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_volume_attachment().returning(|_| Ok(None));

        let err = update_attachment(&mock, &sample_nfs(None), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(err.is_retryable());
    }
}
