//! Full-flow test: mirror a fake scheduler into a fresh store, run one of
//! the discovered scripts through the run logger, and sync again.

use std::collections::HashMap;
use std::fs;

use chrono::{TimeZone, Utc};
use taskmirror::{
    AutomationConfig, LocalStore, MachineId, RawTask, Reconciler, RunLogger, RunOutcome,
    TaskService,
};

/// In-memory scheduler: one flat folder of tasks.
struct FakeScheduler {
    root: String,
    tasks: HashMap<String, Vec<RawTask>>,
}

impl FakeScheduler {
    fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            tasks: HashMap::new(),
        }
    }

    fn add_task(&mut self, name: &str, command: &str) {
        let root = self.root.clone();
        self.tasks.entry(root.clone()).or_default().push(RawTask {
            path: format!("{root}\\{name}"),
            state: 3,
            hidden: false,
            last_run: Some(Utc.with_ymd_and_hms(2024, 3, 8, 22, 0, 0).unwrap()),
            next_run: Some(Utc.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap()),
            last_result: 0,
            definition: format!("<Task><Actions><Command>{command}</Command></Actions></Task>"),
        });
    }
}

impl TaskService for FakeScheduler {
    fn folder_exists(&self, path: &str) -> anyhow::Result<bool> {
        Ok(path == self.root)
    }

    fn subfolders(&self, _path: &str) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn tasks(&self, path: &str) -> anyhow::Result<Vec<RawTask>> {
        Ok(self.tasks.get(path).cloned().unwrap_or_default())
    }
}

#[test]
fn sync_then_run_then_resync() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().expect("temp dir");
    let config = AutomationConfig::new(dir.path().join("home"), "\\Automation", "mirror.db");
    let machine = MachineId::new("WS-01");

    // Two launchers on disk; one of the scheduler entries points at a
    // launcher that does not exist.
    let launchers = dir.path().join("launchers");
    fs::create_dir_all(&launchers).unwrap();
    let nightly = launchers.join("nightly.bat");
    fs::write(
        &nightly,
        "cd \"C:\\work\\etl\"\n\
         \"C:\\Python\\python.exe\" \"C:\\scripts\\extract.py\"\n\
         \"C:\\Python\\python.exe\" \"C:\\scripts\\load.py\"\n",
    )
    .unwrap();
    let weekly = launchers.join("weekly.bat");
    fs::write(
        &weekly,
        ":: weekly refresh\n\"C:\\Python\\python.exe\" \"C:\\scripts\\refresh.py\"\n",
    )
    .unwrap();
    let ghost = launchers.join("ghost.bat");

    let mut scheduler = FakeScheduler::new("\\Automation");
    scheduler.add_task("nightly", &nightly.to_string_lossy());
    scheduler.add_task("weekly", &weekly.to_string_lossy());
    scheduler.add_task("ghost", &ghost.to_string_lossy());

    fs::create_dir_all(&config.home).unwrap();
    let store = LocalStore::new(config.db_path());
    store.initialize().unwrap();

    // First sync: three executors mirrored, one launcher missing.
    let reconciler = Reconciler::new(store.clone(), "\\Automation", machine.clone());
    let report = reconciler.sync(&scheduler).unwrap();
    assert_eq!(report.executors, 3);
    assert_eq!(report.tasks, 3);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].command.ends_with("ghost.bat"));

    let tasks = store.tasks(&machine).unwrap();
    let extract = tasks.iter().find(|t| t.script_id == "extract").unwrap();
    assert_eq!(extract.run_dir, "C:\\work\\etl");
    assert_eq!(
        extract.execution_command,
        "C:\\Python\\python.exe C:\\scripts\\extract.py",
    );

    // Run the extract script under a run logger.
    let mut logger = RunLogger::begin(&config, machine.clone(), "extract").unwrap();
    assert_eq!(logger.log_id(), 1_000_000);
    assert!(logger.log_path().ends_with("1000000"));
    logger.info("pulling 3 partitions").unwrap();
    {
        let mut progress = logger.progress(3);
        for _ in 0..3 {
            progress.advance(1).unwrap();
        }
        progress.finish().unwrap();
    }
    logger.warning("partition 2 was empty").unwrap();
    let outcome = logger.complete().unwrap();
    assert_eq!(outcome, RunOutcome::Warning);

    let runs = store.runs("extract").unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].result, "warning");
    assert_eq!(runs[0].records, 3);
    assert_eq!(runs[0].machine.as_deref(), Some("WS-01"));

    let log_file = config.logs_dir().join("1000000");
    let log = fs::read_to_string(log_file).unwrap();
    assert!(log.contains("starting execution for extract"));
    assert!(log.contains("+PROGRESS |----------| 100.0%"));
    assert!(log.contains("WARNING:"));
    assert!(log.contains("execution for extract completed."));

    // Second sync: identical mirror, run history untouched.
    let executors_before = store.executors(&machine).unwrap();
    let report = reconciler.sync(&scheduler).unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(store.executors(&machine).unwrap(), executors_before);
    assert_eq!(store.runs("extract").unwrap().len(), 1);

    // A second run allocates the next id with no gap.
    let logger = RunLogger::begin(&config, machine, "load").unwrap();
    assert_eq!(logger.log_id(), 1_000_001);
    assert_eq!(logger.complete().unwrap(), RunOutcome::NoRecords);
}
