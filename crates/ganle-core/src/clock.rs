//! Process clock shared by every
//! date-relative view computation.
//!
//! Views read "now" from here instead of the
//! wall clock so a whole render pass sees one
//! instant, and so observers can re-derive
//! exactly when the minute rolls over.

use std::sync::Arc;
use std::time::Duration;

use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{
  debug,
  info
};

use crate::schedule::{
  Periodic,
  spawn_periodic
};

pub const DEFAULT_TICK: Duration =
  Duration::from_secs(60);

/// Source of "now" read on every tick.
pub type NowFn =
  Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Read side of the clock.
#[derive(Debug, Clone)]
pub struct ClockHandle {
  now: watch::Receiver<DateTime<Utc>>,
  tz:  Tz
}

impl ClockHandle {
  /// A handle frozen at `now`; it never
  /// ticks.
  pub fn fixed(
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let (_tx, rx) = watch::channel(now);
    Self { now: rx, tz }
  }

  pub fn now(&self) -> DateTime<Utc> {
    *self.now.borrow()
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }

  pub fn today(&self) -> NaiveDate {
    self
      .now()
      .with_timezone(&self.tz)
      .date_naive()
  }

  pub fn subscribe(
    &self
  ) -> watch::Receiver<DateTime<Utc>> {
    self.now.clone()
  }
}

pub struct Clock {
  sender: Arc<watch::Sender<DateTime<Utc>>>,
  source: NowFn,
  tz:     Tz,
  period: Duration,
  ticker: Option<Periodic>
}

impl Clock {
  pub fn new(
    period: Duration,
    tz: Tz
  ) -> Self {
    Self::starting_at(Utc::now(), period, tz)
  }

  /// A clock whose first reading is `at`.
  /// Once started it jumps to the wall clock,
  /// or to whatever [`with_source`](Self::with_source)
  /// supplies.
  pub fn starting_at(
    at: DateTime<Utc>,
    period: Duration,
    tz: Tz
  ) -> Self {
    let (sender, _) = watch::channel(at);
    Self {
      sender: Arc::new(sender),
      source: Arc::new(Utc::now),
      tz,
      period,
      ticker: None
    }
  }

  pub fn with_source(
    mut self,
    source: impl Fn() -> DateTime<Utc>
    + Send
    + Sync
    + 'static
  ) -> Self {
    self.source = Arc::new(source);
    self
  }

  pub fn handle(&self) -> ClockHandle {
    ClockHandle {
      now: self.sender.subscribe(),
      tz:  self.tz
    }
  }

  /// Moves the clock forward to `at`.
  /// Earlier instants are ignored.
  pub fn advance_to(
    &self,
    at: DateTime<Utc>
  ) -> bool {
    advance(&self.sender, at)
  }

  pub fn is_running(&self) -> bool {
    self.ticker.is_some()
  }

  /// Returns `false` if already running.
  pub fn start(&mut self) -> bool {
    if self.ticker.is_some() {
      debug!("clock already running");
      return false;
    }

    let sender = Arc::clone(&self.sender);
    let source = Arc::clone(&self.source);
    self.ticker = Some(spawn_periodic(
      "clock",
      self.period,
      move || {
        let sender = Arc::clone(&sender);
        let now = source();
        async move {
          advance(&sender, now);
        }
      }
    ));
    info!(
      period_secs = self.period.as_secs(),
      timezone = %self.tz,
      "clock started"
    );
    true
  }

  pub async fn stop(&mut self) -> bool {
    match self.ticker.take() {
      | Some(ticker) => {
        ticker.stop().await;
        true
      }
      | None => false
    }
  }
}

fn advance(
  sender: &watch::Sender<DateTime<Utc>>,
  at: DateTime<Utc>
) -> bool {
  sender.send_if_modified(|now| {
    if at > *now {
      *now = at;
      true
    } else {
      false
    }
  })
}
