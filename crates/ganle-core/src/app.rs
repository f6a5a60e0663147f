//! Wires the cache, clock, reminder
//! scheduler and mutation coordinator into
//! one owned application context.

use std::sync::Arc;
use std::time::Duration;

use ganle_shared::ViewSelector;
use tracing::{
  debug,
  info
};

use crate::cache::{
  CacheHandle,
  EntityCache
};
use crate::clock::{
  Clock,
  ClockHandle
};
use crate::config::ClientConfig;
use crate::coordinator::{
  MutationCoordinator,
  Reconciled
};
use crate::gateway::SharedGateway;
use crate::notify::Notifier;
use crate::reminder::{
  AlertState,
  ReminderPoller,
  ReminderScheduler
};
use crate::views::{
  self,
  ViewEngine,
  ViewSnapshot
};

pub struct AppContext {
  cache:       CacheHandle,
  clock:       Clock,
  reminders:   ReminderScheduler,
  coordinator: MutationCoordinator
}

impl AppContext {
  pub fn new(
    gateway: SharedGateway,
    notifier: Arc<dyn Notifier>,
    clock: Clock,
    reminder_poll: Duration
  ) -> Self {
    let cache = CacheHandle::default();
    let poller = ReminderPoller::new(
      Arc::clone(&gateway),
      cache.clone(),
      notifier
    );
    let coordinator = MutationCoordinator::new(
      gateway,
      cache.clone(),
      clock.handle()
    );

    Self {
      cache,
      clock,
      reminders: ReminderScheduler::new(
        poller,
        reminder_poll
      ),
      coordinator
    }
  }

  pub fn from_config(
    gateway: SharedGateway,
    notifier: Arc<dyn Notifier>,
    cfg: &ClientConfig
  ) -> anyhow::Result<Self> {
    let clock = Clock::new(cfg.clock_tick(), cfg.tz()?);
    let mut app =
      Self::new(gateway, notifier, clock, cfg.reminder_poll());
    let poller = app
      .reminders
      .poller()
      .clone()
      .with_title(&cfg.reminder_title);
    app.reminders =
      ReminderScheduler::new(poller, cfg.reminder_poll());
    Ok(app)
  }

  /// Loads everything from the backend, then
  /// starts the clock and reminder timers.
  pub async fn start(&mut self) -> Reconciled {
    let loaded = self.coordinator.load_all().await;
    let clock_started = self.clock.start();
    let reminders_started = self.reminders.start();
    info!(
      ?loaded,
      clock_started, reminders_started, "application started"
    );
    loaded
  }

  pub async fn shutdown(&mut self) {
    let clock = self.clock.stop().await;
    let reminders = self.reminders.stop().await;
    info!(clock, reminders, "application stopped");
  }

  pub fn is_running(&self) -> bool {
    self.clock.is_running()
      || self.reminders.is_running()
  }

  pub fn coordinator(&self) -> &MutationCoordinator {
    &self.coordinator
  }

  pub fn cache(&self) -> &CacheHandle {
    &self.cache
  }

  pub fn clock(&self) -> &Clock {
    &self.clock
  }

  pub fn clock_handle(&self) -> ClockHandle {
    self.clock.handle()
  }

  pub fn reminder_poller(&self) -> &ReminderPoller {
    self.reminders.poller()
  }

  pub fn set_view(&self, view: ViewSelector) {
    debug!(view = %view, "view selected");
    self.cache.update_if(
      |cache| {
        let changed = cache.current_view != view;
        cache.current_view = view;
        changed
      },
      |changed| *changed
    );
  }

  pub fn set_search(&self, query: &str) {
    self.cache.update_if(
      |cache| {
        let changed = cache.search_query != query;
        cache.search_query = query.to_string();
        changed
      },
      |changed| *changed
    );
  }

  pub fn toggle_sidebar(&self) -> bool {
    self.cache.update(|cache| {
      cache.sidebar_collapsed = !cache.sidebar_collapsed;
      cache.sidebar_collapsed
    })
  }

  pub fn alert(&self) -> AlertState {
    self.reminders.poller().alert()
  }

  pub fn dismiss_reminder(&self) -> bool {
    self.reminders.poller().dismiss()
  }

  pub fn snapshot(&self) -> ViewSnapshot {
    let today = self.clock.handle().today();
    self
      .cache
      .read(|cache| views::snapshot(cache, today))
  }

  pub fn state(&self) -> EntityCache {
    self.cache.snapshot()
  }

  pub fn view_engine(&self) -> ViewEngine {
    ViewEngine::new(self.cache.clone(), self.clock.handle())
  }
}
