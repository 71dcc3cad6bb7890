#![cfg(test)]

use anyhow::bail;
use futures::{SinkExt, StreamExt};
use log::*;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use webtab_api::{
    command::{Command, SendInput},
    config::ServerConfig,
    event::{Event, StdOutStream},
    frame::{self, Decoded, FrameBuffer},
    tab::TabId,
    transport::Outgoing,
};
use webtab_pty_process::unix::UnixPtySystem;
use webtab_websocket::{WebsocketInbound, WebsocketOutbound};

use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::sync::Once;

static INIT: Once = Once::new();

/// Setup function that is only run once, even if called multiple times.
fn setup() {
    INIT.call_once(|| {
        TermLogger::init(
            LevelFilter::Info,
            simplelog::ConfigBuilder::new()
                .set_time_format_str("%H:%M:%S%.3f TST")
                .build(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )
        .unwrap();
    });
}

/// A server listening on an ephemeral localhost port, running /bin/sh in each tab.
pub struct TestServer {
    address: String,
    path: String,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        setup();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local = listener.local_addr()?;

        let mut config = ServerConfig::default();
        config.address = local.ip();
        config.port = local.port();
        config.shell = "/bin/sh".to_string();
        config.env.insert("PS1".to_string(), "$ ".to_string());
        config.close_timeout_ms = 250;

        let path = config.path.clone();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(webtab_server::serve(
            listener,
            Arc::new(UnixPtySystem::new()),
            Arc::new(config),
            shutdown.clone(),
        ));

        info!("test server listening on {}", local);

        Ok(Self {
            address: local.to_string(),
            path,
            shutdown,
            handle,
        })
    }

    pub fn url(&self) -> String {
        self.url_for(self.path.as_str())
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("ws://{}{}", self.address, path)
    }

    pub async fn connect(&self) -> anyhow::Result<TestClient> {
        let (inbound, outbound) = webtab_websocket::connect(self.url().as_str()).await?;

        Ok(TestClient {
            inbound,
            outbound,
            frames: FrameBuffer::new(),
        })
    }

    /// Cancels the listener, and waits for every connection to drain
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        self.handle.await??;
        Ok(())
    }
}

/// A websocket client speaking the webtab protocol
pub struct TestClient {
    inbound: WebsocketInbound,
    outbound: WebsocketOutbound,
    frames: FrameBuffer,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn send(&mut self, command: &Command) -> anyhow::Result<()> {
        let frame = frame::encode(command)?;
        self.outbound.send(Outgoing::Frame(frame)).await?;
        Ok(())
    }

    /// Sends raw bytes, which may hold a partial frame, or several frames
    pub async fn send_bytes(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.outbound.send(Outgoing::Frame(bytes)).await?;
        Ok(())
    }

    /// The next event from the server, or None if the server closed the socket
    pub async fn next_event(&mut self) -> anyhow::Result<Option<Event>> {
        loop {
            match self.frames.next_frame::<Event>()? {
                Decoded::Frame { value, .. } => return Ok(Some(value)),
                Decoded::Malformed { error, .. } => bail!("malformed event: {}", error),
                Decoded::NeedMoreData => {}
            }

            match self.inbound.next().await {
                Some(Ok(bytes)) => self.frames.push(bytes.as_slice()),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    pub async fn expect_event(&mut self, timeout_ms: u64) -> anyhow::Result<Event> {
        let duration = Duration::from_millis(timeout_ms);
        match time::timeout(duration, self.next_event()).await {
            Ok(Ok(Some(event))) => Ok(event),
            Ok(Ok(None)) => bail!("the server closed the connection"),
            Ok(Err(e)) => Err(e),
            Err(_) => bail!("no event within {} ms", timeout_ms),
        }
    }

    /// Reads until the server ends the socket, discarding any remaining events
    pub async fn await_close(&mut self, timeout_ms: u64) -> anyhow::Result<()> {
        let drain = async {
            while let Ok(Some(event)) = self.next_event().await {
                debug!("discarding event {:?}", event);
            }
        };

        match time::timeout(Duration::from_millis(timeout_ms), drain).await {
            Ok(()) => Ok(()),
            Err(_) => bail!("the server did not close the socket within {} ms", timeout_ms),
        }
    }

    /// Opens a tab, and returns the id assigned by the server.
    ///
    /// Output from other tabs that arrives first is discarded.
    pub async fn open_tab(&mut self) -> anyhow::Result<TabId> {
        self.send(&Command::OpenNewTab).await?;

        loop {
            if let Event::TabOpened(opened) = self.expect_event(5000).await? {
                return Ok(opened.id);
            }
        }
    }

    /// Collects stdout from `tab` until it contains `needle`, and returns everything collected
    pub async fn await_stdout(
        &mut self,
        tab: TabId,
        needle: &str,
        timeout_ms: u64,
    ) -> anyhow::Result<String> {
        let duration = Duration::from_millis(timeout_ms);
        match time::timeout(duration, self.collect_stdout(tab, needle)).await {
            Ok(result) => result,
            Err(_) => bail!("{} did not print {:?} within {} ms", tab, needle, timeout_ms),
        }
    }

    async fn collect_stdout(&mut self, tab: TabId, needle: &str) -> anyhow::Result<String> {
        let mut output = Vec::new();

        loop {
            match self.next_event().await? {
                Some(Event::StdOutStream(StdOutStream { tab_id, data })) if tab_id == tab => {
                    output.extend(data);
                    let text = String::from_utf8_lossy(output.as_slice()).to_string();
                    if text.contains(needle) {
                        return Ok(text);
                    }
                }
                Some(event) => debug!("skipping event {:?}", event),
                None => bail!("the server closed the connection"),
            }
        }
    }

    /// Asks the shell in `tab` for its pid
    pub async fn shell_pid(&mut self, tab: TabId) -> anyhow::Result<i32> {
        self.send(&Command::SendInput(SendInput {
            tab_id: tab,
            payload: b"echo pid=$$.\n".to_vec(),
        }))
        .await?;

        // the terminal echoes the command line before the shell runs it
        let mut output = String::new();
        loop {
            output += self.await_stdout(tab, "\n", 5000).await?.as_str();
            if let Some(pid) = parse_pid(output.as_str()) {
                return Ok(pid);
            }
        }
    }
}

/// Finds the first `pid=<digits>.` marker.  The echoed command line (`pid=$$.`) does not match.
fn parse_pid(output: &str) -> Option<i32> {
    output.match_indices("pid=").find_map(|(index, marker)| {
        let rest = &output[index + marker.len()..];
        let end = rest.find('.')?;
        rest[..end].parse().ok()
    })
}

/// Whether a process with the given pid still exists
#[allow(dead_code)]
pub fn process_exists(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Polls until `condition` holds, or fails after `timeout_ms`
#[allow(dead_code)]
pub async fn await_condition<F: FnMut() -> bool>(
    mut condition: F,
    timeout_ms: u64,
) -> anyhow::Result<()> {
    let poll = async {
        while !condition() {
            time::sleep(Duration::from_millis(20)).await;
        }
    };

    match time::timeout(Duration::from_millis(timeout_ms), poll).await {
        Ok(()) => Ok(()),
        Err(_) => bail!("condition not met within {} ms", timeout_ms),
    }
}
