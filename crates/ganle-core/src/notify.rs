//! Outbound system notifications.

use anyhow::{
  Context,
  anyhow
};
use async_trait::async_trait;
use tracing::{
  debug,
  info
};

/// Delivery is best effort; callers log
/// failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(
    &self,
    title: &str,
    body: &str
  ) -> anyhow::Result<()>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
  async fn notify(
    &self,
    title: &str,
    body: &str
  ) -> anyhow::Result<()> {
    info!(title, body, "notification");
    Ok(())
  }
}

/// Shows a desktop notification through
/// `notify-send` on Linux and `osascript` on
/// macOS.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
  async fn notify(
    &self,
    title: &str,
    body: &str
  ) -> anyhow::Result<()> {
    let mut command = desktop_command(title, body)?;
    let output = command
      .output()
      .await
      .context("failed to spawn notifier")?;

    if !output.status.success() {
      return Err(anyhow!(
        "notifier exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      ));
    }

    debug!(title, "emitted desktop notification");
    Ok(())
  }
}

#[cfg(target_os = "macos")]
fn desktop_command(
  title: &str,
  body: &str
) -> anyhow::Result<tokio::process::Command> {
  let script = format!(
    r#"display notification "{}" with title "{}""#,
    escape_applescript(body),
    escape_applescript(title)
  );
  let mut command =
    tokio::process::Command::new("osascript");
  command.arg("-e").arg(script);
  Ok(command)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn desktop_command(
  title: &str,
  body: &str
) -> anyhow::Result<tokio::process::Command> {
  let mut command =
    tokio::process::Command::new("notify-send");
  command
    .arg("--app-name=ganle")
    .arg(title)
    .arg(body);
  Ok(command)
}

#[cfg(not(unix))]
fn desktop_command(
  _title: &str,
  _body: &str
) -> anyhow::Result<tokio::process::Command> {
  Err(anyhow!(
    "desktop notifications are not supported \
     on this platform"
  ))
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn escape_applescript(raw: &str) -> String {
  raw.replace('\\', "\\\\").replace('"', "\\\"")
}
