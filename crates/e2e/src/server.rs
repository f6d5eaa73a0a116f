//! Application under test - attach to a running instance or spawn one

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::playwright::duration_secs;

/// How to reach (and optionally start) the application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL the browser and health check use
    pub base_url: String,

    /// Command that starts the application; `None` attaches to a running one
    pub command: Option<Vec<String>>,

    /// Working directory for `command`
    pub workdir: Option<PathBuf>,

    /// Extra environment for `command`
    pub env: BTreeMap<String, String>,

    /// Path polled until it answers with a success status
    pub health_path: String,

    #[serde(with = "duration_secs")]
    pub startup_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            command: None,
            workdir: None,
            env: BTreeMap::new(),
            health_path: "/".to_string(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// Handle to the application; owns the process when we spawned it
pub struct AppHandle {
    child: Option<Child>,
    base_url: String,
}

impl AppHandle {
    /// Spawn the application if configured, then wait for it to answer
    pub async fn start(config: &AppConfig) -> E2eResult<Self> {
        let child = match &config.command {
            Some(argv) => Some(spawn(argv, config)?),
            None => None,
        };

        let handle = AppHandle {
            child,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        };

        handle.wait_for_healthy(&config.health_path, config.startup_timeout).await?;

        info!("Application is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for the application to respond to health checks
    async fn wait_for_healthy(&self, health_path: &str, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for application at {}...", health_url);
                    }
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether this handle started the process itself
    pub fn is_owned(&self) -> bool {
        self.child.is_some()
    }

    /// Stop the application if we spawned it
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        info!("Stopping application (pid: {})", child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = child.kill();
        let _ = child.wait();

        Ok(())
    }
}

impl Drop for AppHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn spawn(argv: &[String], config: &AppConfig) -> E2eResult<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| E2eError::InvalidConfig("app command is empty".to_string()))?;

    info!("Spawning application: {}", argv.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(&config.env)
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = &config.workdir {
        cmd.current_dir(dir);
    }

    cmd.spawn()
        .map_err(|e| E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e)))
}
