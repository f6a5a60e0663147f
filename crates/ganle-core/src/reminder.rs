//! Due-reminder polling.
//!
//! The backend decides due-ness; this side
//! only asks, keeps the most recent answer as
//! the in-app alert and fires a system
//! notification for it.

use std::sync::Arc;
use std::time::Duration;

use ganle_shared::TaskDto;
use tracing::{
  debug,
  info,
  warn
};

use crate::cache::CacheHandle;
use crate::gateway::SharedGateway;
use crate::notify::Notifier;
use crate::schedule::{
  Periodic,
  spawn_periodic
};

pub const DEFAULT_POLL: Duration =
  Duration::from_secs(30);
pub const DEFAULT_TITLE: &str = "Task due soon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertState {
  Idle,
  Pending(TaskDto)
}

/// One poll cycle, detached from any timer.
#[derive(Clone)]
pub struct ReminderPoller {
  gateway:  SharedGateway,
  cache:    CacheHandle,
  notifier: Arc<dyn Notifier>,
  title:    Arc<str>
}

impl ReminderPoller {
  pub fn new(
    gateway: SharedGateway,
    cache: CacheHandle,
    notifier: Arc<dyn Notifier>
  ) -> Self {
    Self {
      gateway,
      cache,
      notifier,
      title: Arc::from(DEFAULT_TITLE)
    }
  }

  pub fn with_title(
    mut self,
    title: &str
  ) -> Self {
    self.title = Arc::from(title);
    self
  }

  /// Asks the backend for the task due now.
  /// A returned task replaces any alert still
  /// pending and triggers a notification
  /// without waiting for it.
  pub async fn poll_once(&self) -> Option<TaskDto> {
    let due = match self.gateway.check_reminders().await {
      | Ok(Some(task)) => task,
      | Ok(None) => {
        debug!("no reminder due");
        return None;
      }
      | Err(err) => {
        warn!(error = %err, "reminder check failed");
        return None;
      }
    };

    let replaced = self.cache.update(|cache| {
      cache.pending_reminder.replace(due.clone())
    });
    info!(
      task_id = %due.id,
      replaced = ?replaced.map(|task| task.id),
      "reminder pending"
    );

    let notifier = Arc::clone(&self.notifier);
    let title = Arc::clone(&self.title);
    let body = due.title.clone();
    tokio::spawn(async move {
      if let Err(err) =
        notifier.notify(&title, &body).await
      {
        warn!(error = %err, "failed to deliver reminder notification");
      }
    });

    Some(due)
  }

  pub fn alert(&self) -> AlertState {
    self.cache.read(|cache| {
      match &cache.pending_reminder {
        | Some(task) => AlertState::Pending(task.clone()),
        | None => AlertState::Idle
      }
    })
  }

  /// Returns to idle. `false` if nothing was
  /// pending.
  pub fn dismiss(&self) -> bool {
    let dismissed = self.cache.update_if(
      |cache| cache.pending_reminder.take(),
      Option::is_some
    );
    match dismissed {
      | Some(task) => {
        debug!(task_id = %task.id, "reminder dismissed");
        true
      }
      | None => false
    }
  }
}

pub struct ReminderScheduler {
  poller: ReminderPoller,
  period: Duration,
  ticker: Option<Periodic>
}

impl ReminderScheduler {
  pub fn new(
    poller: ReminderPoller,
    period: Duration
  ) -> Self {
    Self {
      poller,
      period,
      ticker: None
    }
  }

  pub fn poller(&self) -> &ReminderPoller {
    &self.poller
  }

  pub fn is_running(&self) -> bool {
    self.ticker.is_some()
  }

  /// Polls once right away, then every
  /// period. Returns `false` if already
  /// running.
  pub fn start(&mut self) -> bool {
    if self.ticker.is_some() {
      debug!("reminder scheduler already running");
      return false;
    }

    let poller = self.poller.clone();
    self.ticker = Some(spawn_periodic(
      "reminders",
      self.period,
      move || {
        let poller = poller.clone();
        async move {
          poller.poll_once().await;
        }
      }
    ));
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
