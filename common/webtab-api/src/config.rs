use crate::event::MAX_STDOUT_CHUNK;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

/// User-facing config for the server.  Every field is optional in the yaml file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,

    /// The request path that is upgraded to a websocket.  Other paths are rejected.
    pub path: String,

    /// The program launched for each new tab
    pub shell: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,

    /// The initial (cols, rows) of each new tab
    pub dimensions: (u16, u16),

    /// The largest chunk of tab output carried by a single frame
    pub max_chunk: usize,

    /// How long a closing connection waits for the close frame to be written
    pub close_timeout_ms: u64,

    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 7681,
            path: "/ws".to_string(),
            shell: default_shell(),
            args: Vec::new(),
            env: HashMap::new(),
            working_directory: None,
            dimensions: (80, 24),
            max_chunk: 32 * 1024,
            close_timeout_ms: 1000,
            log_file: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            bail!("path must begin with '/', found {:?}", self.path);
        }

        if self.max_chunk == 0 {
            bail!("max_chunk must be greater than zero");
        }

        if self.max_chunk > MAX_STDOUT_CHUNK {
            bail!(
                "max_chunk must be at most {} bytes, found {}",
                MAX_STDOUT_CHUNK,
                self.max_chunk
            );
        }

        if self.shell.is_empty() {
            bail!("shell must not be empty");
        }

        Ok(())
    }
}

fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

pub fn dotdir_path() -> Result<PathBuf> {
    let mut dir = dirs::home_dir().ok_or_else(|| anyhow::Error::msg("home_dir not found"))?;

    dir.push(".webtab");

    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    let mut path = dotdir_path()?;
    path.push("webtab.yml");
    Ok(path)
}

/// Loads the config from an explicit path, or from ~/.webtab/webtab.yml if it exists.
///
/// An explicit path must exist.  Without one, a missing file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<ServerConfig> {
    let config = match explicit {
        Some(path) => read_config(path)?,
        None => {
            let path = config_path()?;

            if path.is_file() {
                read_config(path.as_path())?
            } else {
                log::debug!("File {:?} does not exist, using defaults", path.as_path());
                ServerConfig::default()
            }
        }
    };

    config.validate()?;
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<ServerConfig> {
    let file = File::open(path).with_context(|| format!("failed to open config {:?}", path))?;
    let reader = BufReader::new(file);
    let config = serde_yaml::from_reader(reader)
        .with_context(|| format!("failed to parse config {:?}", path))?;

    Ok(config)
}

pub fn write_config(path: &Path, config: &ServerConfig) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_yaml::to_writer(writer, config)?;
    Ok(())
}
