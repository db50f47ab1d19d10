//! Gesture effectors — dry-run logging and external command.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autotap_core::config::{EffectorConfig, EffectorKind};
use autotap_core::error::{AutoTapError, Result};
use autotap_core::traits::{GestureEffector, TapOutcome, TapRequest};

/// Build the effector selected in the config.
pub fn build_effector(config: &EffectorConfig) -> Result<Arc<dyn GestureEffector>> {
    let effector: Arc<dyn GestureEffector> = match config.kind {
        EffectorKind::Log => Arc::new(LogEffector::new(Duration::from_millis(
            config.tap_duration_ms,
        ))),
        EffectorKind::Command => Arc::new(CommandEffector::new(
            &config.command,
            Duration::from_millis(config.timeout_ms),
        )?),
    };
    Ok(effector)
}

/// Dry run: logs every tap and holds it for the stroke duration.
pub struct LogEffector {
    tap_duration: Duration,
    taps: AtomicU64,
}

impl LogEffector {
    pub fn new(tap_duration: Duration) -> Self {
        Self {
            tap_duration,
            taps: AtomicU64::new(0),
        }
    }

    /// Taps performed so far.
    pub fn tap_count(&self) -> u64 {
        self.taps.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GestureEffector for LogEffector {
    fn name(&self) -> &str {
        "log"
    }

    async fn perform(&self, request: &TapRequest) -> Result<TapOutcome> {
        let n = self.taps.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            "👆 Tap #{n} at ({:.0}, {:.0}) size {:.0} [config {} / point {}]",
            request.x,
            request.y,
            request.size,
            request.configuration_id,
            request.point_id
        );
        tokio::time::sleep(self.tap_duration).await;
        Ok(TapOutcome::Completed)
    }
}

/// Spawns an external program per tap, e.g. `adb shell input tap {x} {y}`.
pub struct CommandEffector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEffector {
    /// `template` is an argv; `{x}`, `{y}` and `{size}` are substituted per tap.
    pub fn new(template: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = template
            .split_first()
            .ok_or_else(|| AutoTapError::Config("effector.command must not be empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    /// Arguments for one request.
    pub fn render_args(&self, request: &TapRequest) -> Vec<String> {
        let x = format!("{:.0}", request.x);
        let y = format!("{:.0}", request.y);
        let size = format!("{:.0}", request.size);
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{x}", &x)
                    .replace("{y}", &y)
                    .replace("{size}", &size)
            })
            .collect()
    }
}

#[async_trait]
impl GestureEffector for CommandEffector {
    fn name(&self) -> &str {
        "command"
    }

    async fn perform(&self, request: &TapRequest) -> Result<TapOutcome> {
        let args = self.render_args(request);
        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AutoTapError::Effector(format!("cannot run '{}': {e}", self.program)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                tracing::warn!(
                    "⏱️ '{}' did not finish within {:?}, tap abandoned",
                    self.program,
                    self.timeout
                );
                Ok(TapOutcome::Cancelled)
            }
            Ok(Err(e)) => Err(AutoTapError::Effector(format!(
                "waiting for '{}': {e}",
                self.program
            ))),
            Ok(Ok(output)) if output.status.success() => Ok(TapOutcome::Completed),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let reason = if stderr.is_empty() {
                    format!("'{}' exited with {}", self.program, output.status)
                } else {
                    stderr
                };
                Ok(TapOutcome::Failed(reason))
            }
        }
    }
}
