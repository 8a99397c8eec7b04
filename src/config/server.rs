use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Write logs to `{log_dir}/confwatch.log` instead of stdout
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.log_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::InvalidConfig("server.log_dir cannot be empty".into()));
            }
        }
        Ok(())
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
