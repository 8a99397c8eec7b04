// -
// Backend key layout

/// Root of the configuration namespace in the backend store
pub const CONFIG_ROOT: &str = "config";

/// Watch prefix covering every configuration key
pub const CONFIG_WATCH_PREFIX: &str = "/config/";

/// Default etcd client port when an endpoint omits it
pub const DEFAULT_STORE_PORT: u16 = 2379;

// -
// Push protocol

pub(crate) const CONNECTED_GREETING: &str = "Connected to config updates";

/// Error marker recorded for endpoints in the down-set
pub const SIMULATED_DOWN: &str = "simulated down";

// -
// Health check probe key

pub(crate) const HEALTH_NAMESPACE: &str = "_health";
pub(crate) const HEALTH_ENVIRONMENT: &str = "test";
pub(crate) const HEALTH_KEY: &str = "check";
