//! Handing a prepared installation to the game

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::catalogue::{DepotPin, ModId};

/// Everything needed to start the game against a prepared tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    /// Mods active for this launch, dependencies first
    pub mods: Vec<ModId>,
    /// Set when launching from a depot copy
    pub depot: Option<DepotPin>,
}

#[async_trait]
pub trait HostLauncher: Send + Sync {
    /// Start the game; returns once the process is running
    async fn launch(&self, request: &LaunchRequest) -> anyhow::Result<()>;
}

/// Starts the executable as a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl HostLauncher for ProcessLauncher {
    async fn launch(&self, request: &LaunchRequest) -> anyhow::Result<()> {
        let child = tokio::process::Command::new(&request.executable)
            .current_dir(&request.working_dir)
            .spawn()
            .with_context(|| format!("could not start {}", request.executable.display()))?;

        info!(
            "Started {} (pid {:?}) with {} mods",
            request.executable.display(),
            child.id(),
            request.mods.len()
        );
        Ok(())
    }
}
