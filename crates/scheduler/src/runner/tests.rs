#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::factory::{ItemValue, TaskFactory};
    use crate::package::{MemberState, PackageKind};
    use crate::runner::Scheduler;
    use crate::task::{Dispatch, Task, TaskError};
    use crate::tasks::{Callback, DialogPresenter, DIALOG, FUNCTION, PACKAGE};
    use crate::types::{Args, SchedulerConfig, TaskId, TaskKey, Tier};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Mock task for testing.
    struct Recorder {
        label: String,
        key: TaskKey,
        args: Args,
        runnable: Arc<AtomicBool>,
        one_shot: bool,
        fail: bool,
        log: Log,
    }

    impl Recorder {
        fn new(label: &str, log: &Log) -> Self {
            Self {
                label: label.to_string(),
                key: TaskKey::dialog(label),
                args: Args::Null,
                runnable: Arc::new(AtomicBool::new(true)),
                one_shot: true,
                fail: false,
                log: Arc::clone(log),
            }
        }

        fn keyed(mut self, key: &str, args: Args) -> Self {
            self.key = TaskKey::dialog(key);
            self.args = args;
            self
        }

        fn gated(mut self, runnable: &Arc<AtomicBool>) -> Self {
            self.runnable = Arc::clone(runnable);
            self
        }

        fn rearming(mut self) -> Self {
            self.one_shot = false;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl Task for Recorder {
        fn kind(&self) -> &str {
            "recorder"
        }
        fn key(&self) -> &TaskKey {
            &self.key
        }
        fn args(&self) -> &Args {
            &self.args
        }
        fn can_execute(&self, _scheduler: &Scheduler) -> bool {
            self.runnable.load(Ordering::Relaxed)
        }
        fn execute(&self, dispatch: &mut Dispatch<'_>) -> Result<(), TaskError> {
            self.log.lock().unwrap().push(self.label.clone());
            if self.fail {
                return Err(TaskError::Failed(format!("{} exploded", self.label)));
            }
            if self.one_shot {
                dispatch.finish();
            }
            Ok(())
        }
    }

    /// Presenter whose assets load on command.
    #[derive(Default)]
    struct Stage {
        loaded: AtomicBool,
        shown: Mutex<Vec<(String, Args)>>,
    }

    impl DialogPresenter for Stage {
        fn is_loaded(&self, _dialog_id: &str) -> bool {
            self.loaded.load(Ordering::Relaxed)
        }
        fn present(&self, dialog_id: &str, args: &Args) -> Result<(), TaskError> {
            self.shown.lock().unwrap().push((dialog_id.to_string(), args.clone()));
            Ok(())
        }
    }

    impl Stage {
        fn shown_ids(&self) -> Vec<String> {
            self.shown.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn scheduler() -> Scheduler {
        Scheduler::default()
    }

    fn staged(loaded: bool, timeout_secs: u64) -> (Scheduler, Arc<Stage>, Arc<ManualClock>) {
        let stage = Arc::new(Stage::default());
        stage.loaded.store(loaded, Ordering::Relaxed);
        let clock = Arc::new(ManualClock::new());
        let config = SchedulerConfig {
            package_timeout_secs: timeout_secs,
            ..SchedulerConfig::default()
        };
        let scheduler =
            Scheduler::new(config, TaskFactory::new(stage.clone())).with_clock(clock.clone());
        (scheduler, stage, clock)
    }

    // ── Dispatch order ──────────────────────────────────────────

    #[test]
    fn equal_ratings_dispatch_fifo() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        for label in ["a", "b", "c"] {
            s.add_task(Arc::new(Recorder::new(label, &log)), Tier::Low);
        }
        assert!(entries(&log).is_empty(), "busy flag holds low tasks");

        s.set_busy(false);
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
        assert!(s.is_empty());
    }

    #[test]
    fn higher_tier_dispatches_first() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        s.add_task(Arc::new(Recorder::new("low-1", &log)), Tier::Low);
        s.add_task(Arc::new(Recorder::new("low-2", &log)), Tier::Low);
        s.add_task(Arc::new(Recorder::new("high", &log)), Tier::High);

        s.set_busy(false);
        assert_eq!(entries(&log), vec!["high", "low-1", "low-2"]);
    }

    #[test]
    fn immediate_preempts_busy_flag() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        s.add_task(Arc::new(Recorder::new("low", &log)), Tier::Low);
        s.add_task(Arc::new(Recorder::new("now", &log)), Tier::Immediate);

        assert_eq!(entries(&log), vec!["now"]);
        assert_eq!(s.len(), 1);
        assert!(s.metrics().gated_dispatches > 0);
    }

    #[test]
    fn pending_blocking_task_suppresses_lower_tiers() {
        let log = log();
        let mut s = scheduler();
        let ready = Arc::new(AtomicBool::new(false));
        s.add_task(Arc::new(Recorder::new("blocker", &log).gated(&ready)), Tier::Blocking);
        s.add_task(Arc::new(Recorder::new("low", &log)), Tier::Low);
        s.add_task(Arc::new(Recorder::new("urgent", &log)), Tier::Immediate);

        assert!(entries(&log).is_empty(), "nothing below the blocker may run");
        assert!(s.metrics().blocked_scans >= 2);

        ready.store(true, Ordering::Relaxed);
        s.run();
        assert_eq!(entries(&log), vec!["blocker", "urgent", "low"]);
    }

    #[test]
    fn removing_blocker_releases_lower_tiers() {
        let log = log();
        let mut s = scheduler();
        let never = Arc::new(AtomicBool::new(false));
        let blocker = s.add_task(Arc::new(Recorder::new("blocker", &log).gated(&never)), Tier::Blocking);
        s.add_task(Arc::new(Recorder::new("low", &log)), Tier::Low);
        assert!(entries(&log).is_empty());

        let removed = s.remove_task(blocker).unwrap();
        assert!(removed.is_removed());
        assert_eq!(entries(&log), vec!["low"]);
    }

    #[test]
    fn tier_above_blocking_runs_past_blocker() {
        let log = log();
        let mut s = scheduler();
        let never = Arc::new(AtomicBool::new(false));
        s.add_task(Arc::new(Recorder::new("blocker", &log).gated(&never)), Tier::Blocking);
        s.add_task(Arc::new(Recorder::new("maintenance", &log)), Tier::Maintenance);
        assert_eq!(entries(&log), vec!["maintenance"]);
    }

    #[test]
    fn unrunnable_tasks_are_skipped() {
        let log = log();
        let mut s = scheduler();
        let later = Arc::new(AtomicBool::new(false));
        s.add_task(Arc::new(Recorder::new("waiting", &log).gated(&later)), Tier::High);
        s.add_task(Arc::new(Recorder::new("free", &log)), Tier::Low);
        assert_eq!(entries(&log), vec!["free"]);

        later.store(true, Ordering::Relaxed);
        s.run();
        assert_eq!(entries(&log), vec!["free", "waiting"]);
    }

    // ── Bag operations ──────────────────────────────────────────

    #[test]
    fn add_task_is_idempotent_per_reference() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        let task: Arc<dyn Task> = Arc::new(Recorder::new("once", &log));

        let first = s.add_task(Arc::clone(&task), Tier::Low);
        let second = s.add_task(Arc::clone(&task), Tier::High);

        assert_eq!(first, second);
        assert_eq!(s.len(), 1);
        let entry = s.task(first).unwrap();
        assert!(entry.priority().has_level(Tier::Low));
        assert!(entry.priority().has_level(Tier::High));
    }

    #[test]
    fn run_executes_one_task_per_call() {
        let log = log();
        let mut s = scheduler();
        s.add_task(Arc::new(Recorder::new("tick", &log).rearming()), Tier::Low);
        assert_eq!(entries(&log).len(), 1);

        s.run();
        s.run();
        assert_eq!(entries(&log).len(), 3);
        assert_eq!(s.len(), 1, "self-rearming task stays scheduled");
    }

    #[test]
    fn failed_task_is_removed() {
        let log = log();
        let mut s = scheduler();
        s.add_task(Arc::new(Recorder::new("boom", &log).rearming().failing()), Tier::Low);
        assert_eq!(entries(&log), vec!["boom"]);
        assert!(s.is_empty());
        assert_eq!(s.metrics().failed_executions, 1);
    }

    #[test]
    fn removing_unknown_task_is_none() {
        let mut s = scheduler();
        assert!(s.remove_task(TaskId(42)).is_none());
    }

    #[test]
    fn current_task_is_set_only_while_executing() {
        let mut s = scheduler();
        assert!(s.current_task().is_none());

        let seen = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);
        let callback = Callback::new(move |dispatch, _| {
            let id = dispatch.id();
            let running = dispatch.scheduler().current_task().map(|r| r.id);
            *seen_in.lock().unwrap() = Some((id, running));
            Ok(())
        });
        let id = s
            .add_item(FUNCTION, callback.into(), Args::Null, Tier::Low, None)
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), Some((id, Some(id))));
        assert!(s.current_task().is_none());
    }

    #[test]
    fn dispatch_chain_is_capped() {
        let log = log();
        let config = SchedulerConfig {
            max_dispatch_chain: 2,
            ..SchedulerConfig::default()
        };
        let mut s = Scheduler::new(config, TaskFactory::default());
        s.set_busy(true);
        for label in ["a", "b", "c"] {
            s.add_task(Arc::new(Recorder::new(label, &log)), Tier::Low);
        }

        s.set_busy(false);
        assert_eq!(entries(&log), vec!["a", "b"]);
        s.run();
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
    }

    #[test]
    fn reset_clears_state_and_sequence() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        s.add_task(Arc::new(Recorder::new("a", &log)), Tier::Low);
        s.add_task(Arc::new(Recorder::new("b", &log)), Tier::Low);
        s.create_package(PackageKind::Generic);

        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.packages().count(), 0);
        assert!(s.current_task().is_none());

        let id = s.add_task(Arc::new(Recorder::new("c", &log)), Tier::Low);
        assert_eq!(s.task(id).unwrap().priority().sequence(), 0);
    }

    // ── Lookup and duplicates ───────────────────────────────────

    #[test]
    fn find_tasks_by_key() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        s.add_task(Arc::new(Recorder::new("a", &log).keyed("shop", json!(1))), Tier::Low);
        s.add_task(Arc::new(Recorder::new("b", &log).keyed("shop", json!(2))), Tier::Low);
        s.add_task(Arc::new(Recorder::new("c", &log).keyed("news", json!(1))), Tier::Low);

        let shop = TaskKey::dialog("shop");
        assert!(s.has_task_with(&shop));
        assert_eq!(s.find_all_tasks_with(&shop).len(), 2);
        assert_eq!(s.find_task_with(&shop).unwrap().args(), &json!(1));
        assert!(!s.has_task_with(&TaskKey::dialog("missing")));
    }

    #[test]
    fn remove_duplicates_collapses_equal_args_only() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        for label in ["a", "b", "c"] {
            s.add_task(Arc::new(Recorder::new(label, &log).keyed("shop", json!({"x": 1}))), Tier::Low);
        }
        s.add_task(Arc::new(Recorder::new("d", &log).keyed("shop", json!({"x": 2}))), Tier::Low);
        let keep = s.add_task(Arc::new(Recorder::new("e", &log).keyed("shop", json!({"x": 1}))), Tier::Low);

        let removed = s.remove_duplicates_of(keep, &TaskKey::dialog("shop"));
        assert_eq!(removed, 3);
        assert_eq!(s.len(), 2);
        assert!(s.task(keep).is_some());
        assert_eq!(s.metrics().duplicates_removed, 3);
    }

    #[test]
    fn args_compare_structurally() {
        let log = log();
        let mut s = scheduler();
        s.set_busy(true);
        s.add_task(
            Arc::new(Recorder::new("a", &log).keyed("k", json!({"a": 1, "b": [1, 2]}))),
            Tier::Low,
        );
        let keep = s.add_task(
            Arc::new(Recorder::new("b", &log).keyed("k", json!({"b": [1, 2], "a": 1}))),
            Tier::Low,
        );
        assert_eq!(s.remove_duplicates_of(keep, &TaskKey::dialog("k")), 1);
    }

    #[test]
    fn add_item_dedupes_and_keeps_distinct_args() {
        let (mut s, _stage, _clock) = staged(true, 20);
        s.set_busy(true);
        s.add_item(DIALOG, "d1".into(), json!({"x": 1}), Tier::Low, None).unwrap();
        let second = s.add_item(DIALOG, "d1".into(), json!({"x": 1}), Tier::Low, None).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.tasks()[0].id(), second);

        s.add_item(DIALOG, "d1".into(), json!({"x": 2}), Tier::Low, None).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn construction_failure_yields_none() {
        let mut s = scheduler();
        assert!(s.add_item("tutorial", "spin".into(), Args::Null, Tier::Low, None).is_none());
        assert!(s.add_item(FUNCTION, "not-a-callback".into(), Args::Null, Tier::Low, None).is_none());
        assert!(s.is_empty());
        assert_eq!(s.metrics().construction_failures, 2);
    }

    #[test]
    fn remove_tasks_of_kind() {
        let log = log();
        let (mut s, _stage, _clock) = staged(true, 20);
        s.set_busy(true);
        s.add_item(DIALOG, "a".into(), Args::Null, Tier::Low, None);
        s.add_item(DIALOG, "b".into(), Args::Null, Tier::Low, None);
        s.add_task(Arc::new(Recorder::new("p", &log)), Tier::Low);

        assert_eq!(s.remove_tasks_of_kind(DIALOG), 2);
        assert_eq!(s.len(), 1);
        assert_eq!(s.tasks()[0].kind(), "recorder");
    }

    // ── Packages ────────────────────────────────────────────────

    #[test]
    fn package_runs_members_once_all_ready() {
        let mut s = scheduler();
        let order = log();
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();

        for label in ["first", "second"] {
            let order = Arc::clone(&order);
            let label = label.to_string();
            let callback = Callback::new(move |_, _| {
                order.lock().unwrap().push(label.clone());
                Ok(())
            });
            s.add_item(FUNCTION, callback.into(), Args::Null, Tier::Low, Some(package))
                .unwrap();
        }
        assert!(entries(&order).is_empty(), "members wait for the barrier");
        assert_eq!(s.package(package).unwrap().pending_count(), 2);

        s.tick();
        assert_eq!(entries(&order), vec!["first", "second"]);
        assert!(s.package(package).is_none());
        assert!(s.is_empty());
        assert_eq!(s.metrics().packages_completed, 1);
    }

    #[test]
    fn empty_package_never_runs() {
        let mut s = scheduler();
        let (package, task) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        s.tick();
        s.run();
        assert!(s.package(package).is_some());
        assert!(s.task(task).is_some());
        assert_eq!(s.metrics().executions_of(&TaskKey::Package(package).to_string()), 0);
    }

    #[test]
    fn stalled_package_is_torn_down() {
        let (mut s, stage, clock) = staged(false, 5);
        let (package, task) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        for id in ["a", "b", "c"] {
            s.add_item(DIALOG, id.into(), Args::Null, Tier::Low, Some(package)).unwrap();
        }

        clock.advance(Duration::from_secs(4));
        s.tick();
        assert!(s.package(package).is_some());

        clock.advance(Duration::from_secs(1));
        s.tick();
        assert!(s.package(package).is_none());
        assert!(s.task(task).is_none());
        assert!(!s.has_task_with(&TaskKey::Package(package)));
        assert_eq!(s.metrics().stall_timeouts, 1);
        assert_eq!(s.metrics().executions_of(&TaskKey::Package(package).to_string()), 1);
        assert!(stage.shown_ids().is_empty(), "pending members are discarded");
    }

    #[test]
    fn stall_timeout_runs_ready_members_even_when_busy() {
        let (mut s, stage, clock) = staged(false, 5);
        s.set_busy(true);
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let a = s.add_item(DIALOG, "a".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        s.add_item(DIALOG, "b".into(), Args::Null, Tier::Low, Some(package)).unwrap();

        assert!(s.mark_ready(package, a));
        clock.advance(Duration::from_secs(5));
        s.tick();

        assert_eq!(stage.shown_ids(), vec!["a"]);
        assert!(s.package(package).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn progress_restarts_stall_window() {
        let (mut s, _stage, clock) = staged(false, 5);
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let a = s.add_item(DIALOG, "a".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        s.add_item(DIALOG, "b".into(), Args::Null, Tier::Low, Some(package)).unwrap();

        clock.advance(Duration::from_secs(4));
        s.mark_ready(package, a);
        clock.advance(Duration::from_secs(4));
        s.tick();
        assert!(s.package(package).is_some());

        clock.advance(Duration::from_secs(1));
        s.tick();
        assert!(s.package(package).is_none());
    }

    #[test]
    fn stalled_package_without_owner_is_dropped() {
        let (mut s, _stage, clock) = staged(false, 5);
        let package = s.create_package(PackageKind::Generic);
        clock.advance(Duration::from_secs(5));
        s.tick();
        assert!(s.package(package).is_none());
        assert_eq!(s.metrics().stall_timeouts, 1);
    }

    #[test]
    fn new_member_after_completion_restarts_stall_timer() {
        let (mut s, stage, clock) = staged(false, 5);
        s.set_busy(true);
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let a = s.add_item(DIALOG, "a".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        assert!(s.mark_ready(package, a));
        assert!(!s.package(package).unwrap().timer().is_running());

        s.add_item(DIALOG, "b".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        assert!(s.package(package).unwrap().timer().is_running());

        clock.advance(Duration::from_secs(5));
        s.tick();
        assert!(s.package(package).is_none());
        assert_eq!(stage.shown_ids(), vec!["a"]);
        assert_eq!(s.metrics().stall_timeouts, 1);
    }

    #[test]
    fn cancelling_ready_members_restarts_stall_timer() {
        let (mut s, _stage, clock) = staged(false, 5);
        s.set_busy(true);
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let a = s.add_item(DIALOG, "a".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        s.mark_ready(package, a);

        s.remove_task(a);
        let pkg = s.package(package).unwrap();
        assert!(pkg.is_empty());
        assert!(pkg.timer().is_running());

        clock.advance(Duration::from_secs(5));
        s.tick();
        assert!(s.package(package).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn cancelling_last_pending_member_completes_package() {
        let (mut s, _stage, _clock) = staged(false, 5);
        s.set_busy(true);
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let a = s.add_item(DIALOG, "a".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        let b = s.add_item(DIALOG, "b".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        s.mark_ready(package, a);
        assert_eq!(s.metrics().packages_completed, 0);

        s.remove_task(b);
        assert!(s.package(package).unwrap().is_ready_to_run());
        assert_eq!(s.metrics().packages_completed, 1);
    }

    #[test]
    fn oversized_timeout_does_not_panic() {
        let config = SchedulerConfig::from_toml("package_timeout_secs = 9223372036854775807").unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut s = Scheduler::new(config, TaskFactory::default()).with_clock(clock.clone());

        let package = s.create_package(PackageKind::Generic);
        assert!(s.package(package).unwrap().timer().is_running());

        clock.advance(Duration::from_secs(1_000_000));
        s.tick();
        assert!(s.package(package).is_some());
    }

    #[test]
    fn re_adding_package_member_keeps_single_container() {
        let mut s = scheduler();
        s.set_busy(true);
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let member = s.add_item(DIALOG, "m".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        let handle = s.package(package).unwrap().get(member).unwrap().task().clone();

        let again = s.add_task(handle, Tier::High);
        assert_eq!(again, member);
        assert_eq!(s.len(), 1, "only the package task is in the bag");
        assert!(s.package(package).unwrap().get(member).unwrap().priority().has_level(Tier::High));
    }

    #[test]
    fn dialog_package_fills_declared_members() {
        let (mut s, stage, _clock) = staged(true, 20);
        let (package, _) = s.schedule_package(PackageKind::Dialog, Tier::Low).unwrap();
        let intro = s.add_item(DIALOG, "intro".into(), Args::Null, Tier::Low, Some(package)).unwrap();
        let reward = s.add_item(DIALOG, "reward".into(), Args::Null, Tier::Low, Some(package)).unwrap();

        s.tick();
        assert!(stage.shown_ids().is_empty(), "keyed packages do not poll members");

        let slot = s.deliver_item(package, DIALOG, "reward".into(), json!({"coins": 5}));
        assert_eq!(slot, Some(reward));
        let pkg = s.package(package).unwrap();
        assert_eq!(pkg.len(), 2);
        assert_eq!(pkg.position_of(reward), Some(1));
        assert_eq!(pkg.state_of(reward), Some(MemberState::Ready));

        assert_eq!(s.deliver_item(package, DIALOG, "bonus".into(), Args::Null), None);
        assert_eq!(s.package(package).unwrap().len(), 2);

        assert_eq!(s.deliver_item(package, DIALOG, "intro".into(), json!("hi")), Some(intro));
        assert!(s.package(package).is_none());
        let shown = stage.shown.lock().unwrap().clone();
        assert_eq!(
            shown,
            vec![
                ("intro".to_string(), json!("hi")),
                ("reward".to_string(), json!({"coins": 5})),
            ]
        );
    }

    #[test]
    fn function_package_delivers_new_args() {
        let mut s = scheduler();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let callback = Callback::new(move |_, args| {
            seen_in.lock().unwrap().push(args.clone());
            Ok(())
        });

        let (package, _) = s.schedule_package(PackageKind::Function, Tier::Low).unwrap();
        s.add_item(FUNCTION, callback.clone().into(), json!("placeholder"), Tier::Low, Some(package))
            .unwrap();
        assert!(s
            .add_item(DIALOG, "shop".into(), Args::Null, Tier::Low, Some(package))
            .is_none(), "function packages only take callbacks");

        s.deliver_item(package, FUNCTION, callback.into(), json!({"spins": 3}));
        assert_eq!(*seen.lock().unwrap(), vec![json!({"spins": 3})]);
    }

    #[test]
    fn cancelling_package_task_drops_package() {
        let mut s = scheduler();
        let (package, task) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        s.remove_task(task);
        assert!(s.package(package).is_none());
    }

    #[test]
    fn nested_package_lookup_and_completion() {
        let mut s = scheduler();
        let ran = log();
        let (parent, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        let child = s.create_package(PackageKind::Generic);
        s.add_item(PACKAGE, child.into(), Args::Null, Tier::Low, Some(parent)).unwrap();

        let ran_in = Arc::clone(&ran);
        let callback = Callback::new(move |_, _| {
            ran_in.lock().unwrap().push("leaf".to_string());
            Ok(())
        });
        let leaf_key = callback.key();
        s.add_item(FUNCTION, callback.into(), Args::Null, Tier::Low, Some(child)).unwrap();

        let owner = s.find_task_with(&leaf_key).unwrap();
        assert_eq!(owner.key(), &TaskKey::Package(parent));

        s.tick();
        assert!(entries(&ran).is_empty(), "parent waits for the child package");
        s.tick();
        assert_eq!(entries(&ran), vec!["leaf"]);
        assert_eq!(s.packages().count(), 0);
        assert!(s.is_empty());
        assert_eq!(s.metrics().packages_completed, 2);
    }

    #[test]
    fn package_routing_failures() {
        let mut s = scheduler();
        let missing = crate::types::PackageId(99);
        assert!(s
            .add_item(DIALOG, "a".into(), Args::Null, Tier::Low, Some(missing))
            .is_none());
        assert!(!s.mark_ready(missing, TaskId(0)));
        assert!(s.deliver_item(missing, DIALOG, "a".into(), Args::Null).is_none());

        let value = ItemValue::Dialog("a".into());
        let (package, _) = s.schedule_package(PackageKind::Generic, Tier::Low).unwrap();
        assert!(s.add_item(DIALOG, value, Args::Null, Tier::Low, Some(package)).is_some());
        assert!(!s.mark_ready(package, TaskId(1234)));
    }
}
