//! Process-wide configuration injected into both reconcilers at startup

use crate::{DEFAULT_NAMESPACE, LONGHORN_NAMESPACE};

/// Controller configuration
///
/// Built once from command-line flags and shared by reference; nothing
/// here changes after startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Namespace holding NetworkFilesystem records
    pub namespace: String,
    /// Name of the node this controller instance runs on
    pub node_name: String,
    /// Namespace of the storage subsystem's resources
    pub longhorn_namespace: String,
}

impl Config {
    /// Create a configuration for the given namespace and node
    pub fn new(namespace: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            node_name: node_name.into(),
            longhorn_namespace: LONGHORN_NAMESPACE.to_string(),
        }
    }

    /// Override the storage subsystem namespace
    pub fn with_longhorn_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.longhorn_namespace = namespace.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_well_known_namespaces() {
        let config = Config::default();
        assert_eq!(config.namespace, "harvester-system");
        assert_eq!(config.longhorn_namespace, "longhorn-system");
        assert!(config.node_name.is_empty());
    }

    #[test]
    fn longhorn_namespace_override() {
        let config = Config::new("storage", "node-1").with_longhorn_namespace("lh");
        assert_eq!(config.namespace, "storage");
        assert_eq!(config.node_name, "node-1");
        assert_eq!(config.longhorn_namespace, "lh");
    }
}
