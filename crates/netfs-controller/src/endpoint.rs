//! Resolution of the export address from a Service and its Endpoints
//!
//! A Service with a cluster IP is addressed by that IP. A headless Service
//! is addressed through its single endpoint subset, which must carry one
//! address and one port named `nfs`.

use k8s_openapi::api::core::v1::{Endpoints, Service};

use netfs_common::{Error, NFS_PORT_NAME};

const HEADLESS_CLUSTER_IP: &str = "None";

/// Cluster address of a Service
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceAddress {
    /// `clusterIP: None`; addresses come from the endpoint subset
    Headless,
    /// Cluster IP not allocated yet
    Unassigned,
    /// Allocated cluster IP
    Assigned(String),
}

/// Classify a Service by its cluster IP
pub fn service_address(service: &Service) -> ServiceAddress {
    match service
        .spec
        .as_ref()
        .and_then(|s| s.cluster_ip.as_deref())
        .unwrap_or_default()
    {
        HEADLESS_CLUSTER_IP => ServiceAddress::Headless,
        "" => ServiceAddress::Unassigned,
        ip => ServiceAddress::Assigned(ip.to_string()),
    }
}

/// Outcome of endpoint resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointResolution {
    /// Address the share is reachable at
    Ready(String),
    /// Address not published yet; the next upstream change retriggers
    Pending(&'static str),
}

/// Resolve the address of a headless Service from its Endpoints.
///
/// Missing Endpoints, no subsets, or a subset without ready addresses are
/// pending. More than one subset, address or port, or a port not named
/// `nfs`, is a shape violation.
pub fn resolve_from_subsets(
    name: &str,
    endpoints: Option<&Endpoints>,
) -> Result<EndpointResolution, Error> {
    let subsets = endpoints
        .and_then(|e| e.subsets.as_deref())
        .unwrap_or_default();

    let subset = match subsets {
        [] => return Ok(EndpointResolution::Pending("endpoint has no subsets")),
        [subset] => subset,
        _ => {
            return Err(Error::endpoint_shape(
                name,
                format!("expected one subset, found {}", subsets.len()),
            ))
        }
    };

    let addresses = subset.addresses.as_deref().unwrap_or_default();
    let ports = subset.ports.as_deref().unwrap_or_default();

    if addresses.len() > 1 {
        return Err(Error::endpoint_shape(
            name,
            format!("expected one address, found {}", addresses.len()),
        ));
    }
    if ports.len() > 1 {
        return Err(Error::endpoint_shape(
            name,
            format!("expected one port, found {}", ports.len()),
        ));
    }
    match ports.first() {
        Some(port) if port.name.as_deref() == Some(NFS_PORT_NAME) => {}
        _ => {
            return Err(Error::endpoint_shape(
                name,
                format!("no port named {NFS_PORT_NAME}"),
            ))
        }
    }

    match addresses.first() {
        Some(address) if !address.ip.is_empty() => {
            Ok(EndpointResolution::Ready(address.ip.clone()))
        }
        _ => Ok(EndpointResolution::Pending("endpoint has no ready address")),
    }
}
