//! The single in-memory copy of tasks,
//! projects and tags the interface renders
//! from.

use std::sync::Arc;

use ganle_shared::{
  ProjectDto,
  SettingsDto,
  TagDto,
  TaskDto,
  ViewSelector
};
use parking_lot::RwLock;
use tokio::sync::watch;

/// Where an entity with an unknown identity
/// lands on upsert.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Placement {
  Front,
  Back
}

#[derive(Debug, Clone, Default)]
pub struct EntityCache {
  pub tasks:             Vec<TaskDto>,
  pub projects:          Vec<ProjectDto>,
  pub tags:              Vec<TagDto>,
  pub current_view:      ViewSelector,
  pub search_query:      String,
  pub settings:          SettingsDto,
  pub minimal_mode:      bool,
  pub sidebar_collapsed: bool,
  /// In-app reminder alert waiting for
  /// dismissal.
  pub pending_reminder:  Option<TaskDto>,
  /// Set when local order has advanced past
  /// what the backend acknowledged.
  pub diverged:          bool
}

impl EntityCache {
  pub fn replace_tasks(
    &mut self,
    tasks: Vec<TaskDto>
  ) {
    self.tasks = tasks;
  }

  pub fn replace_projects(
    &mut self,
    projects: Vec<ProjectDto>
  ) {
    self.projects = projects;
  }

  pub fn replace_tags(
    &mut self,
    tags: Vec<TagDto>
  ) {
    self.tags = tags;
  }

  pub fn task(
    &self,
    id: &str
  ) -> Option<&TaskDto> {
    self.tasks.iter().find(|task| task.id == id)
  }

  pub fn task_position(
    &self,
    id: &str
  ) -> Option<usize> {
    self
      .tasks
      .iter()
      .position(|task| task.id == id)
  }

  pub fn project(
    &self,
    id: &str
  ) -> Option<&ProjectDto> {
    self
      .projects
      .iter()
      .find(|project| project.id == id)
  }

  pub fn tag(
    &self,
    id: &str
  ) -> Option<&TagDto> {
    self.tags.iter().find(|tag| tag.id == id)
  }

  pub fn upsert_task(
    &mut self,
    task: TaskDto,
    placement: Placement
  ) {
    upsert(
      &mut self.tasks,
      task,
      placement,
      |t| t.id.as_str()
    );
  }

  /// Replaces a known task in place. An
  /// unknown id is left out: the task may
  /// have been removed while the response was
  /// in flight.
  pub fn replace_task(
    &mut self,
    task: TaskDto
  ) -> bool {
    replace(&mut self.tasks, task, |t| {
      t.id.as_str()
    })
  }

  pub fn replace_tag(
    &mut self,
    tag: TagDto
  ) -> bool {
    replace(&mut self.tags, tag, |t| {
      t.id.as_str()
    })
  }

  pub fn replace_project(
    &mut self,
    project: ProjectDto
  ) -> bool {
    replace(&mut self.projects, project, |p| {
      p.id.as_str()
    })
  }

  pub fn upsert_tag(&mut self, tag: TagDto) {
    upsert(
      &mut self.tags,
      tag,
      Placement::Back,
      |t| t.id.as_str()
    );
  }

  pub fn upsert_project(
    &mut self,
    project: ProjectDto
  ) {
    upsert(
      &mut self.projects,
      project,
      Placement::Back,
      |p| p.id.as_str()
    );
  }

  pub fn remove_task(
    &mut self,
    id: &str
  ) -> Option<TaskDto> {
    let idx = self.task_position(id)?;
    Some(self.tasks.remove(idx))
  }

  pub fn remove_tag(
    &mut self,
    id: &str
  ) -> Option<TagDto> {
    let idx = self
      .tags
      .iter()
      .position(|tag| tag.id == id)?;
    Some(self.tags.remove(idx))
  }

  pub fn remove_project(
    &mut self,
    id: &str
  ) -> Option<ProjectDto> {
    let idx = self
      .projects
      .iter()
      .position(|project| project.id == id)?;
    Some(self.projects.remove(idx))
  }

  /// Removes the task at `from` and inserts
  /// it at `to`, both positions in the
  /// backing list.
  pub fn move_task(
    &mut self,
    from: usize,
    to: usize
  ) -> bool {
    if from >= self.tasks.len()
      || to >= self.tasks.len()
    {
      return false;
    }
    let task = self.tasks.remove(from);
    self.tasks.insert(to, task);
    true
  }

  /// Listed tasks move to the front in the
  /// given order; unknown ids are ignored and
  /// the rest keep their relative order.
  pub fn reorder_by_ids(
    &mut self,
    ordered: &[String]
  ) {
    let mut front =
      Vec::with_capacity(ordered.len());
    for id in ordered {
      if let Some(idx) = self.task_position(id) {
        front.push(self.tasks.remove(idx));
      }
    }
    front.append(&mut self.tasks);
    self.tasks = front;
  }
}

fn upsert<T>(
  items: &mut Vec<T>,
  item: T,
  placement: Placement,
  key: impl Fn(&T) -> &str
) {
  let existing = items
    .iter()
    .position(|candidate| key(candidate) == key(&item));
  match (existing, placement) {
    | (Some(idx), _) => items[idx] = item,
    | (None, Placement::Front) => {
      items.insert(0, item)
    }
    | (None, Placement::Back) => items.push(item)
  }
}

fn replace<T>(
  items: &mut Vec<T>,
  item: T,
  key: impl Fn(&T) -> &str
) -> bool {
  match items
    .iter()
    .position(|candidate| key(candidate) == key(&item))
  {
    | Some(idx) => {
      items[idx] = item;
      true
    }
    | None => false
  }
}

/// Shared handle to the cache. Writes that
/// change something bump a revision
/// observers can await.
///
/// The lock is only ever held inside the
/// closures passed to [`read`](Self::read)
/// and [`update`](Self::update), never across
/// an `.await`.
#[derive(Clone)]
pub struct CacheHandle {
  inner:    Arc<RwLock<EntityCache>>,
  revision: Arc<watch::Sender<u64>>
}

impl Default for CacheHandle {
  fn default() -> Self {
    Self::new(EntityCache::default())
  }
}

impl CacheHandle {
  pub fn new(cache: EntityCache) -> Self {
    let (revision, _) = watch::channel(0);
    Self {
      inner:    Arc::new(RwLock::new(cache)),
      revision: Arc::new(revision)
    }
  }

  pub fn read<R>(
    &self,
    f: impl FnOnce(&EntityCache) -> R
  ) -> R {
    f(&self.inner.read())
  }

  pub fn update<R>(
    &self,
    f: impl FnOnce(&mut EntityCache) -> R
  ) -> R {
    self.update_if(f, |_| true)
  }

  /// Like [`update`](Self::update), but the
  /// revision only moves when `changed`
  /// accepts the closure's result.
  pub fn update_if<R>(
    &self,
    f: impl FnOnce(&mut EntityCache) -> R,
    changed: impl FnOnce(&R) -> bool
  ) -> R {
    let result = f(&mut self.inner.write());
    let modified = changed(&result);
    self.revision.send_if_modified(|rev| {
      if modified {
        *rev += 1;
      }
      modified
    });
    result
  }

  pub fn snapshot(&self) -> EntityCache {
    self.read(EntityCache::clone)
  }

  pub fn revision(&self) -> u64 {
    *self.revision.borrow()
  }

  pub fn subscribe(
    &self
  ) -> watch::Receiver<u64> {
    self.revision.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use ganle_shared::{
    RepeatRule,
    TaskPriority,
    TaskStatus
  };

  use super::*;

  fn task(id: &str) -> TaskDto {
    TaskDto {
      id:           id.to_string(),
      title:        id.to_uppercase(),
      description:  String::new(),
      status:       TaskStatus::Todo,
      priority:     TaskPriority::Medium,
      project_id:   None,
      tags:         vec![],
      subtasks:     vec![],
      due_date:     None,
      reminder:     None,
      repeat:       RepeatRule::None,
      favorite:     false,
      created_at:   String::new(),
      updated_at:   String::new(),
      completed_at: None
    }
  }

  fn ids(cache: &EntityCache) -> Vec<&str> {
    cache
      .tasks
      .iter()
      .map(|t| t.id.as_str())
      .collect()
  }

  #[test]
  fn upsert_replaces_in_place_and_inserts_new() {
    let mut cache = EntityCache::default();
    cache.replace_tasks(vec![
      task("a"),
      task("b"),
      task("c"),
    ]);

    let mut renamed = task("b");
    renamed.title = "renamed".into();
    cache.upsert_task(renamed, Placement::Front);
    assert_eq!(ids(&cache), ["a", "b", "c"]);
    assert_eq!(
      cache.task("b").map(|t| t.title.as_str()),
      Some("renamed")
    );

    cache.upsert_task(task("d"), Placement::Front);
    cache.upsert_task(task("e"), Placement::Back);
    assert_eq!(
      ids(&cache),
      ["d", "a", "b", "c", "e"]
    );
  }

  #[test]
  fn remove_and_move_keep_other_order() {
    let mut cache = EntityCache::default();
    cache.replace_tasks(vec![
      task("a"),
      task("b"),
      task("c"),
      task("d"),
    ]);

    assert!(cache.remove_task("b").is_some());
    assert!(cache.remove_task("missing").is_none());
    assert_eq!(ids(&cache), ["a", "c", "d"]);

    assert!(cache.move_task(0, 2));
    assert_eq!(ids(&cache), ["c", "d", "a"]);
    assert!(!cache.move_task(0, 3));
  }

  #[test]
  fn reorder_by_ids_moves_listed_tasks_to_front() {
    let mut cache = EntityCache::default();
    cache.replace_tasks(vec![
      task("a"),
      task("b"),
      task("c"),
      task("d"),
    ]);

    cache.reorder_by_ids(&[
      "c".to_string(),
      "zzz".to_string(),
      "a".to_string(),
    ]);
    assert_eq!(ids(&cache), ["c", "a", "b", "d"]);
  }

  #[test]
  fn replace_skips_unknown_ids() {
    let mut cache = EntityCache::default();
    cache.replace_tasks(vec![task("a"), task("b")]);

    let mut renamed = task("b");
    renamed.title = "renamed".into();
    assert!(cache.replace_task(renamed));
    assert!(!cache.replace_task(task("gone")));
    assert_eq!(ids(&cache), ["a", "b"]);
    assert_eq!(
      cache.task("b").map(|t| t.title.as_str()),
      Some("renamed")
    );
  }

  #[test]
  fn unchanged_update_keeps_revision() {
    let handle = CacheHandle::default();
    let rx = handle.subscribe();

    let taken = handle.update_if(
      |cache| cache.pending_reminder.take(),
      Option::is_some
    );
    assert!(taken.is_none());
    assert_eq!(handle.revision(), 0);
    assert!(!rx.has_changed().unwrap_or(true));

    handle.update_if(
      |cache| {
        cache.diverged = true;
        true
      },
      |changed| *changed
    );
    assert_eq!(handle.revision(), 1);
  }

  #[test]
  fn every_update_bumps_revision() {
    let handle = CacheHandle::default();
    let rx = handle.subscribe();
    assert_eq!(handle.revision(), 0);

    handle.update(|cache| {
      cache.search_query = "milk".into()
    });
    handle.update(|cache| cache.diverged = true);

    assert_eq!(handle.revision(), 2);
    assert_eq!(*rx.borrow(), 2);
    assert_eq!(
      handle.read(|cache| cache.search_query.clone()),
      "milk"
    );
  }
}
