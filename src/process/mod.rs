//! Server process lifecycle
//!
//! Exactly one server process is tracked at a time. It binds a fixed port,
//! so every trial starts by reclaiming that port from whatever still holds it.

pub mod interface;

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::Config;
use crate::shaping::commands::{AdminCommand, CommandRunner, SystemRunner};
use crate::shaping::ShapingController;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// Interval between readiness checks after a spawn
const READY_POLL: Duration = Duration::from_millis(20);

/// Kernel socket tables, with whether the table is UDP
const SOCKET_TABLES: &[(&str, bool)] = &[
    ("/proc/net/tcp", false),
    ("/proc/net/tcp6", false),
    ("/proc/net/udp", true),
    ("/proc/net/udp6", true),
];

/// `st` column value of a listening TCP socket
const TCP_LISTEN: &str = "0A";

/// A spawned server and the port it binds
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
    pid: Option<u32>,
    port: u16,
}

impl ServerHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Launch parameters for the server executable
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub program: PathBuf,
    pub address: String,
    pub port: u16,
    pub output: PathBuf,
}

impl ServerSpec {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.server_bin.clone(),
            address: config.server_address.clone(),
            port: config.server_port,
            output: config.server_output.clone(),
        }
    }
}

/// Owns the server process and the fixed port
pub struct ProcessManager {
    spec: ServerSpec,
    reclaim_pause: Duration,
    runner: Arc<dyn CommandRunner>,
    shaping: Arc<ShapingController>,
    server: Option<ServerHandle>,
    logger: Logger,
}

impl ProcessManager {
    pub fn new(config: &Config, shaping: Arc<ShapingController>, logger: Logger) -> Self {
        Self::with_runner(
            ServerSpec::from_config(config),
            config.reclaim_pause(),
            Arc::new(SystemRunner),
            shaping,
            logger,
        )
    }

    pub fn with_runner(
        spec: ServerSpec,
        reclaim_pause: Duration,
        runner: Arc<dyn CommandRunner>,
        shaping: Arc<ShapingController>,
        logger: Logger,
    ) -> Self {
        Self {
            spec,
            reclaim_pause,
            runner,
            shaping,
            server: None,
            logger,
        }
    }

    pub fn port(&self) -> u16 {
        self.spec.port
    }

    pub fn server(&self) -> Option<&ServerHandle> {
        self.server.as_ref()
    }

    /// Free the server port.
    ///
    /// Kills a still-tracked server, then whatever else holds the port,
    /// pauses, and probes the port. A port that is still busy yields
    /// [`AppError::PortConflict`], which callers treat as a warning.
    pub async fn reclaim(&mut self) -> Result<()> {
        self.terminate().await;

        let port = self.spec.port;
        let fuser = AdminCommand::new("fuser", &["-k", &format!("{}/tcp", port), &format!("{}/udp", port)]);
        match self.runner.run(&fuser) {
            // fuser exits 1 when nothing held the port
            Ok(output) if output.success => {
                self.logger.debug(&format!("Killed processes holding port {}", port)).log();
            }
            Ok(_) => {}
            Err(e) => {
                self.logger.trace(&format!("fuser unavailable: {}", e)).log();
            }
        }

        tokio::time::sleep(self.reclaim_pause).await;

        if port_is_free(&self.spec.address, port) {
            Ok(())
        } else {
            Err(AppError::port_conflict(format!(
                "port {} on {} is still in use after reclaim",
                port, self.spec.address
            )))
        }
    }

    /// Start the server; any previously tracked server is killed first
    pub async fn spawn(&mut self) -> Result<&ServerHandle> {
        self.terminate().await;

        let child = Command::new(&self.spec.program)
            .arg(&self.spec.address)
            .arg(self.spec.port.to_string())
            .arg(&self.spec.output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::process_exit(format!(
                    "failed to start server '{}': {}",
                    self.spec.program.display(),
                    e
                ))
            })?;

        let pid = child.id();
        self.logger
            .debug("Server started")
            .field("pid", pid)
            .field("port", self.spec.port)
            .log();

        let port = self.spec.port;
        Ok(&*self.server.insert(ServerHandle { child, pid, port }))
    }

    /// Wait until something listens on the server port, for at most the
    /// reclaim pause. Returns `false` when the server exited first, the
    /// bound elapsed, or socket tables are unavailable.
    ///
    /// The port is observed through the kernel's socket tables rather than
    /// by binding or connecting, so the server never sees the check.
    pub async fn await_ready(&mut self) -> bool {
        let deadline = Instant::now() + self.reclaim_pause;
        loop {
            if port_in_use(self.spec.port) == Some(true) {
                return true;
            }
            if self.server_exited() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(READY_POLL.min(deadline - now)).await;
        }
    }

    /// Wait for the tracked server to exit on its own and return its exit
    /// code (-1 when killed by a signal). No timeout is imposed here.
    pub async fn wait_exit(&mut self) -> Result<i32> {
        let handle = self
            .server
            .as_mut()
            .ok_or_else(|| AppError::internal("no server is running"))?;

        let status = handle.child.wait().await?;
        self.server = None;
        Ok(status.code().unwrap_or(-1))
    }

    /// True when no server is tracked or the tracked one already exited
    pub fn server_exited(&mut self) -> bool {
        match self.server.as_mut() {
            Some(handle) => !matches!(handle.child.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Kill and reap the tracked server, if any
    pub async fn terminate(&mut self) {
        if let Some(mut handle) = self.server.take() {
            if let Err(e) = handle.child.kill().await {
                self.logger
                    .debug(&format!("Server kill failed: {}", e))
                    .field("pid", handle.pid)
                    .log();
            }
        }
    }

    /// Stop the server and return the interface to its unshaped baseline
    pub async fn teardown(&mut self) {
        self.terminate().await;
        self.shaping.reset();
    }
}

/// Probe a port by binding it
pub fn port_is_free(address: &str, port: u16) -> bool {
    TcpListener::bind((address, port)).is_ok()
}

/// Whether a listening TCP socket or any UDP socket is on `port`, from
/// `/proc/net`. `None` when no socket table can be read.
pub fn port_in_use(port: u16) -> Option<bool> {
    let mut readable = false;
    for (table, udp) in SOCKET_TABLES {
        let Ok(contents) = std::fs::read_to_string(table) else {
            continue;
        };
        readable = true;
        if table_has_port(&contents, port, *udp) {
            return Some(true);
        }
    }
    readable.then_some(false)
}

// Rows look like `  0: 0100007F:1388 00000000:0000 0A ...`
fn table_has_port(contents: &str, port: u16, udp: bool) -> bool {
    contents.lines().skip(1).any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return false;
        }
        let local_port = fields[1]
            .rsplit(':')
            .next()
            .and_then(|hex| u16::from_str_radix(hex, 16).ok());
        local_port == Some(port) && (udp || fields[3] == TCP_LISTEN)
    })
}
