use std::fmt;

use crate::CONFIG_ROOT;

/// Backend path of a single entry
pub fn config_path(
    namespace: &str,
    environment: &str,
    key: &str,
) -> String {
    format!("/{CONFIG_ROOT}/{namespace}/{environment}/{key}")
}

/// Prefix covering every entry of one namespace/environment pair
pub fn config_prefix(
    namespace: &str,
    environment: &str,
) -> String {
    format!("/{CONFIG_ROOT}/{namespace}/{environment}/")
}

/// A backend path split into its addressing parts.
///
/// `key` may contain further `/` segments, and is empty for a path naming
/// only the namespace and environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub namespace: String,
    pub environment: String,
    pub key: String,
}

impl ConfigKey {
    pub fn new(
        namespace: impl Into<String>,
        environment: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            environment: environment.into(),
            key: key.into(),
        }
    }

    /// Returns `None` for paths outside the configuration root.
    pub fn parse(path: &str) -> Option<Self> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parts.len() < 3 || parts[0] != CONFIG_ROOT {
            return None;
        }
        Some(Self::new(parts[1], parts[2], parts[3..].join("/")))
    }

    pub fn path(&self) -> String {
        config_path(&self.namespace, &self.environment, &self.key)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.environment, self.key)
    }
}
