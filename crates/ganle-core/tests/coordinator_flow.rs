use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ganle_core::cache::CacheHandle;
use ganle_core::clock::ClockHandle;
use ganle_core::views;
use ganle_core::{MemoryBackend, MemorySnapshot, MutationCoordinator, NewTask, Reconciled, SharedGateway};
use ganle_shared::{
    ProjectDto, RepeatRule, SmartList, TagDto, TaskDto, TaskPatch, TaskPriority, TaskStatus,
    ViewSelector, WindowMode,
};
use pretty_assertions::assert_eq;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid instant")
}

fn today() -> NaiveDate {
    now().date_naive()
}

fn task(id: &str, title: &str, due: Option<&str>) -> TaskDto {
    TaskDto {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        status: TaskStatus::Todo,
        priority: TaskPriority::Medium,
        project_id: None,
        tags: vec![],
        subtasks: vec![],
        due_date: due.map(str::to_string),
        reminder: None,
        repeat: RepeatRule::None,
        favorite: false,
        created_at: "2024-04-30T08:00:00Z".to_string(),
        updated_at: "2024-04-30T08:00:00Z".to_string(),
        completed_at: None,
    }
}

async fn setup(snapshot: MemorySnapshot) -> (Arc<MemoryBackend>, MutationCoordinator) {
    let backend = Arc::new(MemoryBackend::seeded(snapshot).with_clock(now, chrono_tz::UTC));
    let gateway: SharedGateway = backend.clone();
    let coordinator = MutationCoordinator::new(
        gateway,
        CacheHandle::default(),
        ClockHandle::fixed(now(), chrono_tz::UTC),
    );
    assert_eq!(coordinator.load_all().await, Reconciled::Refetched);
    (backend, coordinator)
}

fn visible_titles(coordinator: &MutationCoordinator) -> Vec<String> {
    let cache = coordinator.cache().snapshot();
    views::visible_tasks(&cache, today())
        .into_iter()
        .map(|task| task.title)
        .collect()
}

fn cached(coordinator: &MutationCoordinator, id: &str) -> TaskDto {
    coordinator
        .cache()
        .read(|cache| cache.task(id).cloned())
        .expect("task in cache")
}

fn today_view() -> MemorySnapshot {
    MemorySnapshot {
        tasks: vec![
            task("a", "A", Some("2024-05-01")),
            task("x", "unscheduled", None),
            task("b", "B", Some("2024-05-01T10:00:00")),
            task("c", "C", Some("2024-05-01")),
        ],
        ..MemorySnapshot::default()
    }
}

#[tokio::test]
async fn completed_at_follows_status_on_every_path() {
    let (_backend, coordinator) = setup(MemorySnapshot {
        tasks: vec![task("t1", "Write report", None)],
        ..MemorySnapshot::default()
    })
    .await;

    assert_eq!(coordinator.toggle_status("t1").await, Reconciled::Refetched);
    let done = cached(&coordinator, "t1");
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.completed_at.as_deref(), Some("2024-05-01T09:00:00Z"));

    assert_eq!(coordinator.toggle_status("t1").await, Reconciled::Refetched);
    let reopened = cached(&coordinator, "t1");
    assert_eq!(reopened.status, TaskStatus::Todo);
    assert_eq!(reopened.completed_at, None);

    let patch = TaskPatch {
        status: Some(TaskStatus::Completed),
        ..TaskPatch::default()
    };
    assert_eq!(coordinator.update_task("t1", patch).await, Reconciled::Upserted);
    assert!(cached(&coordinator, "t1").completed_at.is_some());

    let patch = TaskPatch {
        status: Some(TaskStatus::InProgress),
        ..TaskPatch::default()
    };
    coordinator.update_task("t1", patch).await;
    let in_progress = cached(&coordinator, "t1");
    assert_eq!(in_progress.status, TaskStatus::InProgress);
    assert_eq!(in_progress.completed_at, None);
}

#[tokio::test]
async fn deleting_tag_strips_references_without_deleting_tasks() {
    let mut tagged = task("t1", "Buy milk", None);
    tagged.tags = vec!["tag-home".to_string(), "tag-errand".to_string()];
    let (_backend, coordinator) = setup(MemorySnapshot {
        tasks: vec![tagged],
        tags: vec![
            TagDto {
                id: "tag-home".into(),
                name: "home".into(),
                color: "#0a0".into(),
            },
            TagDto {
                id: "tag-errand".into(),
                name: "errand".into(),
                color: "#a00".into(),
            },
        ],
        ..MemorySnapshot::default()
    })
    .await;

    assert_eq!(coordinator.delete_tag("tag-home").await, Reconciled::Refetched);

    let remaining = coordinator.cache().read(|cache| {
        cache.tags.iter().map(|tag| tag.id.clone()).collect::<Vec<_>>()
    });
    assert_eq!(remaining, vec!["tag-errand".to_string()]);
    assert_eq!(cached(&coordinator, "t1").tags, vec!["tag-errand".to_string()]);
}

#[tokio::test]
async fn deleting_project_clears_task_references() {
    let mut planned = task("t1", "Plan sprint", None);
    planned.project_id = Some("project-work".to_string());
    let (_backend, coordinator) = setup(MemorySnapshot {
        tasks: vec![planned],
        projects: vec![ProjectDto {
            id: "project-work".into(),
            name: "Work".into(),
            color: "#00f".into(),
            icon: "briefcase".into(),
            archived: false,
            created_at: "2024-04-01T00:00:00Z".into(),
        }],
        ..MemorySnapshot::default()
    })
    .await;

    assert_eq!(
        coordinator.delete_project("project-work").await,
        Reconciled::Refetched
    );
    assert!(coordinator.cache().read(|cache| cache.projects.is_empty()));
    assert_eq!(cached(&coordinator, "t1").project_id, None);
}

#[tokio::test]
async fn completing_weekly_task_creates_next_instance() {
    let mut weekly = task("t1", "Water plants", Some("2024-05-01"));
    weekly.repeat = RepeatRule::Weekly;
    weekly.priority = TaskPriority::High;
    let (_backend, coordinator) = setup(MemorySnapshot {
        tasks: vec![weekly],
        ..MemorySnapshot::default()
    })
    .await;

    assert_eq!(coordinator.toggle_status("t1").await, Reconciled::Refetched);

    let tasks = coordinator.cache().read(|cache| cache.tasks.clone());
    assert_eq!(tasks.len(), 2);
    let next = tasks
        .iter()
        .find(|task| task.id != "t1")
        .expect("next instance");
    assert_eq!(next.title, "Water plants");
    assert_eq!(next.due_date.as_deref(), Some("2024-05-08"));
    assert_eq!(next.status, TaskStatus::Todo);
    assert_eq!(next.repeat, RepeatRule::Weekly);
    assert_eq!(next.priority, TaskPriority::High);
    assert!(next.id.starts_with("task-"));
}

#[tokio::test]
async fn set_task_repeat_refetches() {
    let (_backend, coordinator) = setup(MemorySnapshot {
        tasks: vec![task("t1", "Stretch", Some("2024-05-01"))],
        ..MemorySnapshot::default()
    })
    .await;

    assert_eq!(
        coordinator.set_task_repeat("t1", RepeatRule::Daily).await,
        Reconciled::Refetched
    );
    assert_eq!(cached(&coordinator, "t1").repeat, RepeatRule::Daily);
}

#[tokio::test]
async fn reorder_moves_first_visible_task_to_third() {
    let (backend, coordinator) = setup(today_view()).await;
    assert_eq!(visible_titles(&coordinator), vec!["A", "B", "C"]);

    assert_eq!(coordinator.reorder(0, 2).await, Reconciled::Local);
    assert_eq!(visible_titles(&coordinator), vec!["B", "C", "A"]);
    assert!(!coordinator.cache().read(|cache| cache.diverged));

    let persisted: Vec<String> = backend
        .snapshot()
        .tasks
        .into_iter()
        .filter(|task| task.due_date.is_some())
        .map(|task| task.title)
        .collect();
    assert_eq!(persisted, vec!["B", "C", "A"]);
}

#[tokio::test]
async fn reorder_keeps_local_order_when_persistence_fails() {
    let (backend, coordinator) = setup(today_view()).await;
    backend.fail_operation("reorder_tasks");

    assert_eq!(coordinator.reorder(0, 2).await, Reconciled::Diverged);
    assert_eq!(visible_titles(&coordinator), vec!["B", "C", "A"]);
    assert!(coordinator.cache().read(|cache| cache.diverged));

    backend.clear_failures();
    assert_eq!(coordinator.resync().await, Reconciled::Refetched);
    assert_eq!(visible_titles(&coordinator), vec!["A", "B", "C"]);
    assert!(!coordinator.cache().read(|cache| cache.diverged));
}

#[tokio::test]
async fn reorder_outside_visible_range_is_skipped() {
    let (_backend, coordinator) = setup(today_view()).await;
    let before = coordinator.cache().revision();

    assert_eq!(coordinator.reorder(0, 3).await, Reconciled::Skipped);
    assert_eq!(visible_titles(&coordinator), vec!["A", "B", "C"]);
    assert_eq!(coordinator.cache().revision(), before);
}

#[tokio::test]
async fn reorder_by_ids_is_local_only() {
    let (backend, coordinator) = setup(today_view()).await;
    let ordered = vec!["c".to_string(), "a".to_string()];

    assert_eq!(coordinator.reorder_by_ids(&ordered), Reconciled::Local);
    assert_eq!(visible_titles(&coordinator), vec!["C", "A", "B"]);
    assert_eq!(backend.snapshot().tasks[0].id, "a");
}

#[tokio::test]
async fn failed_mutation_leaves_cache_untouched() {
    let (backend, coordinator) = setup(today_view()).await;
    let before = coordinator.cache().read(|cache| cache.tasks.clone());

    backend.fail_operation("toggle_task_status");
    assert_eq!(coordinator.toggle_status("a").await, Reconciled::Aborted);
    assert_eq!(coordinator.delete_task("missing").await, Reconciled::Aborted);
    assert_eq!(
        coordinator.create_task(NewTask::titled("   ")).await,
        Reconciled::Aborted
    );

    let after = coordinator.cache().read(|cache| cache.tasks.clone());
    assert_eq!(after, before);
}

#[tokio::test]
async fn refetch_failure_marks_cache_diverged() {
    let (backend, coordinator) = setup(today_view()).await;
    backend.fail_operation("get_all_tasks");

    assert_eq!(coordinator.toggle_status("a").await, Reconciled::Diverged);
    assert!(coordinator.cache().read(|cache| cache.diverged));
    assert_eq!(cached(&coordinator, "a").status, TaskStatus::Completed);
}

#[tokio::test]
async fn create_task_inherits_current_view() {
    let (_backend, coordinator) = setup(MemorySnapshot::default()).await;

    coordinator.cache().update(|cache| {
        cache.current_view = ViewSelector::Project("project-work".to_string())
    });
    assert_eq!(
        coordinator.create_task(NewTask::titled("Plan sprint")).await,
        Reconciled::Upserted
    );

    coordinator.cache().update(|cache| {
        cache.current_view = ViewSelector::Tag("tag-home".to_string())
    });
    assert_eq!(
        coordinator
            .create_task(NewTask::titled("Fix sink").due("2024-05-03"))
            .await,
        Reconciled::Upserted
    );

    let tasks = coordinator.cache().read(|cache| cache.tasks.clone());
    assert_eq!(tasks[0].title, "Fix sink");
    assert_eq!(tasks[0].tags, vec!["tag-home".to_string()]);
    assert_eq!(tasks[0].project_id, None);
    assert_eq!(tasks[1].title, "Plan sprint");
    assert_eq!(tasks[1].project_id.as_deref(), Some("project-work"));
    assert!(tasks[1].tags.is_empty());
}

#[tokio::test]
async fn explicit_tag_wins_over_tag_view() {
    let (_backend, coordinator) = setup(MemorySnapshot::default()).await;
    coordinator.cache().update(|cache| {
        cache.current_view = ViewSelector::Tag("tag-home".to_string())
    });

    let mut new_task = NewTask::titled("Call bank");
    new_task.tag_id = Some("tag-errand".to_string());
    coordinator.create_task(new_task).await;

    let created = coordinator.cache().read(|cache| cache.tasks[0].clone());
    assert_eq!(created.tags, vec!["tag-errand".to_string()]);
}

#[tokio::test]
async fn subtask_operations_refetch_parent() {
    let (_backend, coordinator) = setup(MemorySnapshot {
        tasks: vec![task("t1", "Move house", None)],
        ..MemorySnapshot::default()
    })
    .await;

    assert_eq!(
        coordinator.add_subtask("t1", "Pack books").await,
        Reconciled::Refetched
    );
    let sub_id = cached(&coordinator, "t1").subtasks[0].id.clone();
    assert!(sub_id.starts_with("sub-"));

    coordinator.toggle_subtask("t1", &sub_id).await;
    assert!(cached(&coordinator, "t1").subtasks[0].completed);

    coordinator
        .update_subtask("t1", &sub_id, "Pack all books")
        .await;
    assert_eq!(cached(&coordinator, "t1").subtasks[0].title, "Pack all books");

    assert_eq!(
        coordinator.delete_subtask("t1", &sub_id).await,
        Reconciled::Refetched
    );
    assert!(cached(&coordinator, "t1").subtasks.is_empty());
}

#[tokio::test]
async fn favorite_and_delete_reconcile_locally() {
    let (_backend, coordinator) = setup(today_view()).await;

    assert_eq!(coordinator.toggle_favorite("b").await, Reconciled::Upserted);
    coordinator
        .cache()
        .update(|cache| cache.current_view = ViewSelector::Smart(SmartList::Favorite));
    assert_eq!(visible_titles(&coordinator), vec!["B"]);

    assert_eq!(coordinator.delete_task("b").await, Reconciled::Removed);
    assert!(visible_titles(&coordinator).is_empty());
}

#[tokio::test]
async fn late_update_does_not_resurrect_removed_task() {
    let (_backend, coordinator) = setup(today_view()).await;
    coordinator.cache().update(|cache| cache.remove_task("a"));
    let before = coordinator.cache().revision();

    assert_eq!(coordinator.toggle_favorite("a").await, Reconciled::Skipped);
    let patch = TaskPatch {
        title: Some("A again".into()),
        ..TaskPatch::default()
    };
    assert_eq!(coordinator.update_task("a", patch).await, Reconciled::Skipped);

    let ids: Vec<String> = coordinator
        .cache()
        .read(|cache| cache.tasks.iter().map(|task| task.id.clone()).collect());
    assert_eq!(ids, vec!["x", "b", "c"]);
    assert_eq!(coordinator.cache().revision(), before);
}

#[tokio::test]
async fn late_tag_update_does_not_resurrect_removed_tag() {
    let (_backend, coordinator) = setup(MemorySnapshot::default()).await;
    assert_eq!(coordinator.create_tag("home", "#0a0").await, Reconciled::Upserted);
    let tag_id = coordinator.cache().read(|cache| cache.tags[0].id.clone());
    coordinator.cache().update(|cache| cache.remove_tag(&tag_id));

    let renamed = ganle_shared::TagPatch {
        name: Some("household".into()),
        color: None,
    };
    assert_eq!(coordinator.update_tag(&tag_id, renamed).await, Reconciled::Skipped);
    assert!(coordinator.cache().read(|cache| cache.tags.is_empty()));
}

#[tokio::test]
async fn tag_and_project_crud_upsert_at_back() {
    let (_backend, coordinator) = setup(MemorySnapshot::default()).await;

    assert_eq!(coordinator.create_tag("home", "#0a0").await, Reconciled::Upserted);
    assert_eq!(coordinator.create_tag("work", "#00a").await, Reconciled::Upserted);
    assert_eq!(
        coordinator.create_project("Garden", "#0f0", "leaf").await,
        Reconciled::Upserted
    );

    let (tags, projects) = coordinator
        .cache()
        .read(|cache| (cache.tags.clone(), cache.projects.clone()));
    assert_eq!(tags[0].name, "home");
    assert_eq!(tags[1].name, "work");
    assert!(projects[0].id.starts_with("project-"));

    let renamed = ganle_shared::TagPatch {
        name: Some("household".into()),
        color: None,
    };
    coordinator.update_tag(&tags[0].id, renamed).await;
    assert_eq!(coordinator.cache().read(|cache| cache.tags[0].name.clone()), "household");

    let archived = ganle_shared::ProjectPatch {
        archived: Some(true),
        ..Default::default()
    };
    coordinator.update_project(&projects[0].id, archived).await;
    assert!(coordinator.cache().read(|cache| cache.projects[0].archived));
}

#[tokio::test]
async fn theme_and_window_mode_apply_locally_then_persist() {
    let (backend, coordinator) = setup(MemorySnapshot::default()).await;

    assert_eq!(coordinator.toggle_theme().await, Reconciled::Local);
    assert!(coordinator.cache().read(|cache| cache.settings.is_dark));
    assert!(backend.snapshot().settings.is_dark);

    assert_eq!(coordinator.toggle_minimal_mode().await, Reconciled::Local);
    assert_eq!(backend.window_mode(), Some(WindowMode::Minimal));

    backend.set_unavailable(Some("offline"));
    assert_eq!(coordinator.toggle_minimal_mode().await, Reconciled::Diverged);
    assert!(!coordinator.cache().read(|cache| cache.minimal_mode));
    assert_eq!(backend.window_mode(), Some(WindowMode::Minimal));
}
