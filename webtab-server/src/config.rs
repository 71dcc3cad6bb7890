use std::time::Duration;
use webtab_api::{config::ServerConfig, event::MAX_STDOUT_CHUNK};
use webtab_pty_process::{PtyOptions, Size};

/// The settings a connection session needs, derived from the server config
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub pty: PtyOptions,
    pub max_chunk: usize,
    pub close_timeout: Duration,
}

impl From<&ServerConfig> for ConnectionConfig {
    fn from(config: &ServerConfig) -> Self {
        let mut pty = PtyOptions::new(config.shell.as_str());
        pty.args = config.args.clone();
        pty.env = config.env.clone();
        pty.working_directory = config.working_directory.clone();
        pty.dimensions = Size::from(config.dimensions);

        ConnectionConfig {
            pty,
            max_chunk: config.max_chunk.clamp(1, MAX_STDOUT_CHUNK),
            close_timeout: config.close_timeout(),
        }
    }
}
