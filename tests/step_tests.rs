mod support;

use gitkeeper::inventory::MULTI_PACK_INDEX_FILE;
use gitkeeper::{
    CommitGraphStep, ExecuteOutcome, GitOutput, InvokerConfig, MultiPackIndexStep, PackInventory,
    SharedResourceInvoker,
};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use support::{FakeGitFactory, Fixture, capture_logs};

const HOUR: Duration = Duration::from_secs(60 * 60);

fn failing_verify(subcommand: &'static str) -> FakeGitFactory {
    FakeGitFactory::with_responder(move |args| {
        if args.starts_with(&[subcommand, "verify"]) {
            GitOutput::new(Some(1), "checked 12 entries", "error: checksum mismatch")
        } else {
            GitOutput::success("")
        }
    })
}

fn inventory_for(fixture: &Fixture) -> Arc<SharedResourceInvoker<PackInventory>> {
    let pack_dir = fixture.config.pack_dir();
    Arc::new(
        SharedResourceInvoker::new(InvokerConfig::new(), move || PackInventory::scan(&pack_dir))
            .unwrap(),
    )
}

fn write_packs(fixture: &Fixture, names: &[&str]) {
    let pack_dir = fixture.config.pack_dir();
    for name in names {
        fs::write(pack_dir.join(format!("{}.pack", name)), b"PACK").unwrap();
        fs::write(pack_dir.join(format!("{}.idx", name)), b"IDX").unwrap();
    }
}

/// Run one cycle on this thread and stop it once the first git command is in flight
fn execute_and_stop_mid_command(
    task: &gitkeeper::MaintenanceTask,
    processes: &FakeGitFactory,
) -> (ExecuteOutcome, String) {
    thread::scope(|scope| {
        scope.spawn(|| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while processes.calls().is_empty() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            task.stop();
        });
        capture_logs(|| task.execute())
    })
}

fn repair_events(logs: &str) -> usize {
    logs.lines()
        .filter(|line| line.contains("auto-repair of corrupt"))
        .count()
}

#[test]
fn test_commit_graph_healthy_pass() {
    let fixture = Fixture::new();
    let processes = Arc::new(FakeGitFactory::succeeding());
    let task = fixture.task(CommitGraphStep::new(HOUR), &processes);

    assert_eq!(task.execute(), ExecuteOutcome::Completed);

    let commands = processes.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].starts_with("commit-graph verify --shallow --object-dir="));
    assert!(commands[1].starts_with("commit-graph write --reachable --split --object-dir="));
    assert!(task.last_run_file().read().unwrap().is_some());
}

#[test]
fn test_commit_graph_is_throttled_after_success() {
    let fixture = Fixture::new();
    let processes = Arc::new(FakeGitFactory::succeeding());
    let task = fixture.task(CommitGraphStep::new(HOUR), &processes);

    assert_eq!(task.execute(), ExecuteOutcome::Completed);
    assert_eq!(task.execute(), ExecuteOutcome::Completed);

    assert_eq!(processes.commands().len(), 2);
}

#[test]
fn test_commit_graph_write_failure_does_not_record_run() {
    let fixture = Fixture::new();
    let processes = Arc::new(FakeGitFactory::with_responder(|args| {
        if args.starts_with(&["commit-graph", "write"]) {
            GitOutput::failed(128, "fatal: unable to write")
        } else {
            GitOutput::success("")
        }
    }));
    let task = fixture.task(CommitGraphStep::new(HOUR), &processes);

    assert_eq!(task.execute(), ExecuteOutcome::Completed);
    assert_eq!(task.last_run_file().read().unwrap(), None);
    assert!(fixture.host.exit_requested().is_none());
}

#[test]
fn test_commit_graph_auto_repair() {
    let fixture = Fixture::new();
    let chain_dir = fixture.config.object_cache_root.join("info").join("commit-graphs");
    fs::create_dir_all(&chain_dir).unwrap();
    fs::write(chain_dir.join("commit-graph-chain"), b"deadbeef\n").unwrap();

    let processes = Arc::new(failing_verify("commit-graph"));
    let task = fixture.task(CommitGraphStep::new(HOUR), &processes);

    let (outcome, logs) = capture_logs(|| task.execute());

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert!(!chain_dir.exists());

    let commands = processes.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].starts_with("commit-graph verify"));
    assert!(commands[1].starts_with("commit-graph write --reachable --split"));

    assert_eq!(repair_events(&logs), 1);
    let event = logs
        .lines()
        .find(|line| line.contains("auto-repair of corrupt"))
        .unwrap();
    assert!(event.contains("ERROR"));
    assert!(event.contains("verify_output=checked 12 entries"));
    assert!(event.contains("verify_errors=error: checksum mismatch"));
    assert!(event.contains("delete_result=deleted"));
    assert!(event.contains("rewrite_exit_code=Some(0)"));

    assert!(task.last_run_file().read().unwrap().is_some());
    assert!(fixture.host.exit_requested().is_none());
}

#[test]
fn test_multi_pack_index_skips_single_pack() {
    let fixture = Fixture::new();
    write_packs(&fixture, &["pack-1111"]);

    let processes = Arc::new(FakeGitFactory::succeeding());
    let task = fixture.task(
        MultiPackIndexStep::new(HOUR, inventory_for(&fixture)),
        &processes,
    );

    assert_eq!(task.execute(), ExecuteOutcome::Completed);
    assert!(processes.commands().is_empty());
    assert_eq!(task.last_run_file().read().unwrap(), None);
}

#[test]
fn test_multi_pack_index_healthy_pass() {
    let fixture = Fixture::new();
    write_packs(&fixture, &["pack-1111", "pack-2222", "pack-3333"]);

    let processes = Arc::new(FakeGitFactory::succeeding());
    let inventory = inventory_for(&fixture);
    let task = fixture.task(MultiPackIndexStep::new(HOUR, inventory.clone()), &processes);

    assert_eq!(task.execute(), ExecuteOutcome::Completed);

    let commands = processes.commands();
    assert_eq!(commands.len(), 3);
    assert!(commands[0].starts_with("multi-pack-index verify --object-dir="));
    assert!(commands[1].starts_with("multi-pack-index expire --object-dir="));
    assert!(commands[2].starts_with("multi-pack-index write --object-dir="));
    assert!(task.last_run_file().read().unwrap().is_some());

    // The inventory handle was created once and is still cached
    assert_eq!(inventory.stats().created, 1);
}

#[test]
fn test_multi_pack_index_auto_repair() {
    let fixture = Fixture::new();
    write_packs(&fixture, &["pack-1111", "pack-2222"]);
    let midx = fixture.config.pack_dir().join(MULTI_PACK_INDEX_FILE);
    fs::write(&midx, b"MIDX-corrupt").unwrap();

    let processes = Arc::new(failing_verify("multi-pack-index"));
    let task = fixture.task(
        MultiPackIndexStep::new(HOUR, inventory_for(&fixture)),
        &processes,
    );

    let (outcome, logs) = capture_logs(|| task.execute());

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert!(!midx.exists());

    let commands = processes.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].starts_with("multi-pack-index verify"));
    assert!(commands[1].starts_with("multi-pack-index write"));
    assert_eq!(repair_events(&logs), 1);
    assert!(logs.contains("artifact=multi-pack-index"));
}

#[test]
fn test_multi_pack_index_skips_when_inventory_shut_down() {
    let fixture = Fixture::new();
    write_packs(&fixture, &["pack-1111", "pack-2222"]);

    let processes = Arc::new(FakeGitFactory::succeeding());
    let inventory = inventory_for(&fixture);
    inventory.shutdown();
    let task = fixture.task(MultiPackIndexStep::new(HOUR, inventory), &processes);

    assert_eq!(task.execute(), ExecuteOutcome::Completed);
    assert!(processes.commands().is_empty());
}

#[test]
fn test_repair_after_stop_deletes_without_rewrite() {
    let fixture = Fixture::new();
    let artifact = fixture.config.object_cache_root.join("info").join("commit-graph");
    fs::write(&artifact, b"broken").unwrap();

    let processes = Arc::new(FakeGitFactory::succeeding());
    let task = fixture.task(CommitGraphStep::new(HOUR), &processes);
    task.stop();

    let verify = GitOutput::failed(1, "error: bad graph");
    let report = task.repair_artifact("commit-graph", &artifact, &verify, |git| {
        git.invoke(&["commit-graph", "write"])
    });

    assert!(!artifact.exists());
    assert!(!report.rewrite_ran);
    assert!(!report.repaired());
    assert!(processes.commands().is_empty());
}

#[test]
fn test_stop_during_commit_graph_verify_keeps_chain() {
    let fixture = Fixture::new();
    let chain_dir = fixture.config.object_cache_root.join("info").join("commit-graphs");
    fs::create_dir_all(&chain_dir).unwrap();
    fs::write(chain_dir.join("commit-graph-chain"), b"deadbeef\n").unwrap();

    let processes = Arc::new(FakeGitFactory::succeeding().blocking_on("commit-graph"));
    let task = fixture.task(CommitGraphStep::new(HOUR), &processes);

    let (outcome, logs) = execute_and_stop_mid_command(&task, &processes);

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert!(chain_dir.join("commit-graph-chain").exists());
    assert_eq!(repair_events(&logs), 0);
    assert_eq!(processes.kills(), 1);
    assert_eq!(processes.commands().len(), 1);
    assert_eq!(task.last_run_file().read().unwrap(), None);
    assert!(fixture.host.exit_requested().is_none());
}

#[test]
fn test_stop_during_multi_pack_index_verify_keeps_index() {
    let fixture = Fixture::new();
    write_packs(&fixture, &["pack-1111", "pack-2222"]);
    let midx = fixture.config.pack_dir().join(MULTI_PACK_INDEX_FILE);
    fs::write(&midx, b"MIDX").unwrap();

    let processes = Arc::new(FakeGitFactory::succeeding().blocking_on("multi-pack-index"));
    let task = fixture.task(
        MultiPackIndexStep::new(HOUR, inventory_for(&fixture)),
        &processes,
    );

    let (outcome, logs) = execute_and_stop_mid_command(&task, &processes);

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert!(midx.exists());
    assert_eq!(repair_events(&logs), 0);
    assert_eq!(processes.kills(), 1);
    assert_eq!(processes.commands().len(), 1);
    assert_eq!(task.last_run_file().read().unwrap(), None);
    assert!(fixture.host.exit_requested().is_none());
}
