//! Interface level repair of stuck BGP sessions
//!
//! Toggling receive pause frames forces the NIC to renegotiate the link,
//! which brings wedged unnumbered BGP sessions back. The repair is best
//! effort: nothing checks whether the session recovered afterwards.

use crate::{NodeInitError, Result};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

pub const ETHTOOL: &str = "ethtool";

/// Outcome of an external command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub success: bool,
    /// Exit code, absent when killed by a signal
    pub code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<ActionOutput>;
}

/// CommandRunner spawning real processes
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<ActionOutput> {
        let output = Command::new(program).args(args).output().await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ActionOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }
}

/// Arguments toggling receive pause frames on `interface`
pub fn pause_args(interface: &str, enabled: bool) -> Vec<String> {
    let state = if enabled { "on" } else { "off" };
    vec![
        "--pause".to_string(),
        interface.to_string(),
        "rx".to_string(),
        state.to_string(),
    ]
}

/// Cycles receive flow control on interfaces with broken sessions
pub struct SessionRepairer {
    runner: Arc<dyn CommandRunner>,
}

impl SessionRepairer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Disable, then re-enable receive pause frames on `interface`.
    ///
    /// Stops at the first failing step.
    pub async fn repair(&self, interface: &str) -> Result<()> {
        info!("BGP session on interface {:?} is broken, trying to repair", interface);

        for enabled in [false, true] {
            let args = pause_args(interface, enabled);
            let action = format!("{} {}", ETHTOOL, args.join(" "));
            debug!("Executing {:?}", action);

            let output = self
                .runner
                .run(ETHTOOL, &args)
                .await
                .map_err(|e| NodeInitError::RepairAction {
                    action: action.clone(),
                    code: None,
                    output: e.to_string(),
                })?;

            if !output.success {
                return Err(NodeInitError::RepairAction {
                    action,
                    code: output.code,
                    output: output.output,
                });
            }
        }

        info!("Repaired interface {:?}", interface);
        Ok(())
    }
}
