use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{
  debug,
  info,
  warn
};

/// A spawned fixed-interval loop. The first
/// tick fires immediately.
pub(crate) struct Periodic {
  name:   &'static str,
  cancel: CancellationToken,
  handle: JoinHandle<()>
}

pub(crate) fn spawn_periodic<F, Fut>(
  name: &'static str,
  every: Duration,
  mut tick: F
) -> Periodic
where
  F: FnMut() -> Fut + Send + 'static,
  Fut: Future<Output = ()> + Send + 'static
{
  let every =
    every.max(Duration::from_millis(1));
  let cancel = CancellationToken::new();
  let token = cancel.clone();

  let handle = tokio::spawn(async move {
    let mut interval =
      tokio::time::interval(every);
    interval.set_missed_tick_behavior(
      MissedTickBehavior::Delay
    );
    info!(
      task = name,
      period_ms = every.as_millis() as u64,
      "periodic task started"
    );

    loop {
      tokio::select! {
        biased;
        _ = token.cancelled() => {
          info!(task = name, "periodic task stopped");
          break;
        }
        _ = interval.tick() => {
          debug!(task = name, "periodic tick");
          tick().await;
        }
      }
    }
  });

  Periodic {
    name,
    cancel,
    handle
  }
}

impl Periodic {
  pub(crate) async fn stop(self) {
    self.cancel.cancel();
    if let Err(err) = self.handle.await {
      warn!(
        task = self.name,
        error = %err,
        "periodic task ended abnormally"
      );
    }
  }
}
