//! Derived task lists and counters.
//!
//! Everything here is a pure function of the
//! cache contents and the clock's current
//! date. [`ViewEngine`] bundles the inputs
//! and knows when any of them changed.

use chrono::{
  Duration,
  NaiveDate
};
use ganle_shared::{
  SmartList,
  TaskDto,
  ViewSelector
};
use tokio::sync::watch;

use crate::cache::{
  CacheHandle,
  EntityCache
};
use crate::clock::ClockHandle;

const WEEK_HORIZON_DAYS: i64 = 7;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct ViewCounts {
  pub today:     usize,
  pub week:      usize,
  pub all:       usize,
  pub completed: usize,
  pub favorite:  usize
}

impl ViewCounts {
  pub fn get(&self, list: SmartList) -> usize {
    match list {
      | SmartList::Today => self.today,
      | SmartList::Week => self.week,
      | SmartList::All => self.all,
      | SmartList::Completed => {
        self.completed
      }
      | SmartList::Favorite => self.favorite
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
  pub view:   ViewSelector,
  pub title:  String,
  pub tasks:  Vec<TaskDto>,
  pub counts: ViewCounts
}

/// Date keys the smart lists compare due
/// dates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DateWindow {
  today:    String,
  week_end: String
}

impl DateWindow {
  pub(crate) fn new(today: NaiveDate) -> Self {
    let week_end = today
      + Duration::days(WEEK_HORIZON_DAYS);
    Self {
      today:    today
        .format("%Y-%m-%d")
        .to_string(),
      week_end: week_end
        .format("%Y-%m-%d")
        .to_string()
    }
  }

  fn is_today(&self, task: &TaskDto) -> bool {
    task.due_day() == Some(self.today.as_str())
  }

  fn within_week(
    &self,
    task: &TaskDto
  ) -> bool {
    task
      .due_day()
      .is_some_and(|day| day <= self.week_end.as_str())
  }
}

pub(crate) fn matches_view(
  task: &TaskDto,
  view: &ViewSelector,
  window: &DateWindow
) -> bool {
  match view {
    | ViewSelector::Smart(list) => {
      match list {
        | SmartList::Today => {
          window.is_today(task)
        }
        | SmartList::Week => {
          window.within_week(task)
        }
        | SmartList::All => true,
        | SmartList::Completed => {
          task.is_completed()
        }
        | SmartList::Favorite => task.favorite
      }
    }
    | ViewSelector::Project(id) => {
      task.project_id.as_deref()
        == Some(id.as_str())
    }
    | ViewSelector::Tag(id) => task.has_tag(id)
  }
}

/// Positions in `cache.tasks` of the tasks
/// currently visible, in display order.
pub fn visible_positions(
  cache: &EntityCache,
  today: NaiveDate
) -> Vec<usize> {
  let window = DateWindow::new(today);
  let query = cache.search_query.to_lowercase();

  cache
    .tasks
    .iter()
    .enumerate()
    .filter(|(_, task)| {
      query.is_empty()
        || task.matches_query(&query)
    })
    .filter(|(_, task)| {
      matches_view(
        task,
        &cache.current_view,
        &window
      )
    })
    .map(|(idx, _)| idx)
    .collect()
}

pub fn visible_tasks(
  cache: &EntityCache,
  today: NaiveDate
) -> Vec<TaskDto> {
  visible_positions(cache, today)
    .into_iter()
    .map(|idx| cache.tasks[idx].clone())
    .collect()
}

/// Sidebar counters. Independent of the
/// active view and of the search query.
pub fn counts(
  tasks: &[TaskDto],
  today: NaiveDate
) -> ViewCounts {
  let window = DateWindow::new(today);
  let mut counts = ViewCounts::default();

  for task in tasks {
    if task.is_completed() {
      counts.completed += 1;
      continue;
    }
    counts.all += 1;
    if window.is_today(task) {
      counts.today += 1;
    }
    if window.within_week(task) {
      counts.week += 1;
    }
    if task.favorite {
      counts.favorite += 1;
    }
  }

  counts
}

pub fn project_pending_count(
  tasks: &[TaskDto],
  project_id: &str
) -> usize {
  tasks
    .iter()
    .filter(|task| {
      !task.is_completed()
        && task.project_id.as_deref()
          == Some(project_id)
    })
    .count()
}

pub fn tag_pending_count(
  tasks: &[TaskDto],
  tag_id: &str
) -> usize {
  tasks
    .iter()
    .filter(|task| {
      !task.is_completed()
        && task.has_tag(tag_id)
    })
    .count()
}

pub fn smart_list_title(
  list: SmartList
) -> &'static str {
  match list {
    | SmartList::Today => "Today",
    | SmartList::Week => "Next 7 Days",
    | SmartList::All => "All Tasks",
    | SmartList::Completed => "Completed",
    | SmartList::Favorite => "Favorites"
  }
}

pub fn view_title(
  cache: &EntityCache
) -> String {
  match &cache.current_view {
    | ViewSelector::Smart(list) => {
      smart_list_title(*list).to_string()
    }
    | ViewSelector::Project(id) => cache
      .project(id)
      .map(|project| project.name.trim())
      .filter(|name| !name.is_empty())
      .unwrap_or("Project")
      .to_string(),
    | ViewSelector::Tag(id) => cache
      .tag(id)
      .map(|tag| tag.name.trim())
      .filter(|name| !name.is_empty())
      .unwrap_or("Tag")
      .to_string()
  }
}

pub fn snapshot(
  cache: &EntityCache,
  today: NaiveDate
) -> ViewSnapshot {
  ViewSnapshot {
    view:   cache.current_view.clone(),
    title:  view_title(cache),
    tasks:  visible_tasks(cache, today),
    counts: counts(&cache.tasks, today)
  }
}

/// Re-derives views whenever the cache or
/// the clock moves.
pub struct ViewEngine {
  cache:     CacheHandle,
  clock:     ClockHandle,
  revisions: watch::Receiver<u64>,
  ticks: watch::Receiver<chrono::DateTime<chrono::Utc>>
}

impl ViewEngine {
  pub fn new(
    cache: CacheHandle,
    clock: ClockHandle
  ) -> Self {
    let revisions = cache.subscribe();
    let ticks = clock.subscribe();
    Self {
      cache,
      clock,
      revisions,
      ticks
    }
  }

  pub fn snapshot(&self) -> ViewSnapshot {
    let today = self.clock.today();
    self
      .cache
      .read(|cache| snapshot(cache, today))
  }

  /// Waits until any input changed. Returns
  /// `false` once neither input can change
  /// anymore.
  pub async fn changed(&mut self) -> bool {
    if self.ticks.has_changed().is_err() {
      return self.revisions.changed().await.is_ok();
    }

    let clock_closed = tokio::select! {
      rev = self.revisions.changed() => {
        return rev.is_ok();
      }
      tick = self.ticks.changed() => tick.is_err(),
    };

    if clock_closed {
      return self.revisions.changed().await.is_ok();
    }
    true
  }
}
