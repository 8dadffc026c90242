//! Demo launcher - one coordinator and a set of units as child processes

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{Config, DemoConfig};

/// How long a child gets to exit after SIGTERM before it is killed
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Launches `sc serve` plus one `sc unit` per configured identifier
pub struct Demo {
    config: DemoConfig,
    /// Address the coordinator child listens on and every unit connects to
    coordinator_addr: String,
    config_path: Option<PathBuf>,
    log_level: Option<String>,
}

impl Demo {
    pub fn new(config: &Config, config_path: Option<PathBuf>, log_level: Option<String>) -> Self {
        Self {
            config: config.demo.clone(),
            coordinator_addr: config.coordinator.bind.clone(),
            config_path,
            log_level,
        }
    }

    /// Global flags every child inherits
    fn inherited_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        if let Some(level) = &self.log_level {
            args.push("--log-level".to_string());
            args.push(level.clone());
        }
        args
    }

    fn serve_args(&self) -> Vec<String> {
        vec!["serve".to_string(), "--bind".to_string(), self.coordinator_addr.clone()]
    }

    fn unit_args(&self, id: &str) -> Vec<String> {
        vec![
            "unit".to_string(),
            id.to_string(),
            "--server".to_string(),
            self.coordinator_addr.clone(),
        ]
    }

    fn spawn(&self, name: &str, args: &[String]) -> Result<Child> {
        let exe = std::env::current_exe().context("Failed to get current executable")?;
        debug!(?exe, name, ?args, "Demo::spawn: called");

        let child = Command::new(&exe)
            .args(self.inherited_args())
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context(format!("Failed to spawn {}", name))?;

        info!(name, pid = ?child.id(), "Process started");
        Ok(child)
    }

    /// Run every process for the configured duration, then stop them all
    pub async fn run(&self) -> Result<()> {
        let mut children = vec![("coordinator".to_string(), self.spawn("coordinator", &self.serve_args())?)];

        tokio::time::sleep(Duration::from_millis(self.config.startup_delay_ms)).await;

        for id in &self.config.units {
            match self.spawn(id, &self.unit_args(id)) {
                Ok(child) => children.push((id.clone(), child)),
                Err(e) => {
                    stop_all(&mut children).await;
                    return Err(e);
                }
            }
        }

        let duration = Duration::from_secs(self.config.duration_secs);
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!(?duration, "Demo duration elapsed");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Ctrl+C received");
            }
        }

        // Units first, so the coordinator sees them leave
        children.reverse();
        stop_all(&mut children).await;
        info!("Demo finished");
        Ok(())
    }
}

async fn stop_all(children: &mut [(String, Child)]) {
    for (name, child) in children.iter_mut() {
        if let Err(e) = stop_child(name, child).await {
            warn!(%name, error = %e, "Failed to stop process");
        }
    }
}

/// SIGTERM, then SIGKILL if the child outlives the grace period
async fn stop_child(name: &str, child: &mut Child) -> Result<()> {
    if child.try_wait()?.is_some() {
        debug!(name, "stop_child: already exited");
        return Ok(());
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            debug!(name, pid, "stop_child: sending SIGTERM");
            kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context("Failed to send SIGTERM")?;
        }
    }

    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(status) => {
            let status = status?;
            info!(name, %status, "Process stopped");
        }
        Err(_) => {
            warn!(name, "Process did not stop gracefully, killing it");
            child.kill().await.context("Failed to kill process")?;
        }
    }
    Ok(())
}
