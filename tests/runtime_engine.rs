// tests/runtime_engine.rs

mod common;
use crate::common::{init_tracing, with_timeout, SlowSink};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use scriptrun::config::InterpreterConfig;
use scriptrun::engine::{
    present_session, CoreRuntime, RunReason, Runtime, RuntimeEvent, RuntimeOptions,
    TranscriptSink, INTERRUPTED_EXIT_CODE,
};
use scriptrun::exec::{
    CommandSpec, ExecutionSession, InterpreterRunner, ScriptRunner, SessionOptions,
    SessionSupervisor,
};
use scriptrun::fs::mock::MockFileSystem;
use scriptrun::fs::ScriptFileStore;
use scriptrun::types::{ExecutionState, OutputStream, Script};
use scriptrun_test_utils::{FakeLauncher, FakeProcess, FakeRunner, FakeStream};

struct Harness<R: ScriptRunner> {
    tx: mpsc::Sender<RuntimeEvent>,
    sink: Arc<TranscriptSink>,
    runtime: Runtime<R>,
}

fn harness<R: ScriptRunner>(runner: R, exit_when_finished: bool) -> Harness<R> {
    let (tx, rx) = mpsc::channel(16);
    let sink = Arc::new(TranscriptSink::new());
    let runtime = Runtime::new(
        CoreRuntime::new(RuntimeOptions { exit_when_finished }),
        rx,
        tx.clone(),
        SessionSupervisor::new(runner),
        sink.clone(),
    );
    Harness { tx, sink, runtime }
}

/// Runner writing scripts into an in-memory `/scratch`.
fn interpreter_runner(fs: &MockFileSystem, launcher: &FakeLauncher) -> InterpreterRunner {
    let store = ScriptFileStore::new(Arc::new(fs.clone()), "/scratch", "temp", "kts").unwrap();
    InterpreterRunner::new(
        InterpreterConfig::default(),
        store,
        Arc::new(launcher.clone()),
        SessionOptions::default(),
    )
}

fn run(content: &str) -> RuntimeEvent {
    RuntimeEvent::RunRequested {
        script: Script::new(content),
        reason: RunReason::Initial,
    }
}

fn long_running() -> FakeProcess {
    FakeProcess::new()
        .stdout_stream(FakeStream::Pending)
        .stderr_stream(FakeStream::Pending)
        .until_killed()
}

async fn wait_for_finished(sink: &TranscriptSink, count: usize) {
    with_timeout(async {
        while sink.finished_sessions().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn one_shot_returns_script_exit_code() {
    init_tracing();
    let runner = FakeRunner::new(FakeLauncher::new(
        FakeProcess::new().stdout("hello\n").stderr("warn\n").exit_code(3),
    ));
    let h = harness(runner, true);

    h.tx.send(run("println(\"hello\")")).await.unwrap();
    let code = with_timeout(h.runtime.run()).await.unwrap();

    assert_eq!(code, 3);
    let transcript = h.sink.transcript();
    assert_eq!(transcript.stream_text(OutputStream::Stdout), vec!["hello"]);
    assert_eq!(transcript.stream_text(OutputStream::Stderr), vec!["warn"]);

    let finished = h.sink.finished_sessions();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].1, ExecutionState::Completed { exit_code: 3 });
}

#[tokio::test]
async fn one_shot_launch_failure_exits_with_one() {
    let runner = FakeRunner::new(FakeLauncher::failing(std::io::ErrorKind::NotFound));
    let h = harness(runner, true);

    h.tx.send(run("x")).await.unwrap();
    let code = with_timeout(h.runtime.run()).await.unwrap();

    assert_eq!(code, 1);
    assert!(matches!(
        h.sink.finished_sessions()[0].1,
        ExecutionState::Failed(_)
    ));
}

#[tokio::test]
async fn one_shot_prepare_failure_is_an_error() {
    let runner = FakeRunner::new(FakeLauncher::new(FakeProcess::new())).failing_prepare();
    let h = harness(runner, true);

    h.tx.send(run("x")).await.unwrap();
    assert!(with_timeout(h.runtime.run()).await.is_err());
}

#[tokio::test]
async fn shutdown_cancels_running_session() {
    init_tracing();
    let runner = FakeRunner::new(FakeLauncher::new(long_running()));
    let launcher = runner.launcher().clone();
    let h = harness(runner, true);

    h.tx.send(run("while (true) {}")).await.unwrap();
    h.tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    let code = with_timeout(h.runtime.run()).await.unwrap();

    assert_eq!(code, INTERRUPTED_EXIT_CODE);
    assert_eq!(launcher.kill_count(), 1);
    assert!(h.sink.finished_sessions().is_empty());
}

#[tokio::test]
async fn watch_mode_reruns_and_supersedes() {
    init_tracing();
    let runner = FakeRunner::new(FakeLauncher::new(long_running()));
    let launcher = runner.launcher().clone();
    let scripts = runner.clone();
    let h = harness(runner, false);
    let tx = h.tx.clone();
    let task = tokio::spawn(h.runtime.run());

    tx.send(run("v1")).await.unwrap();
    tx.send(RuntimeEvent::RunRequested {
        script: Script::new("v2"),
        reason: RunReason::FileChanged,
    })
    .await
    .unwrap();
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();

    let code = with_timeout(task).await.unwrap().unwrap();
    assert_eq!(code, INTERRUPTED_EXIT_CODE);

    let contents: Vec<_> = scripts
        .scripts()
        .iter()
        .map(|s| s.content().to_string())
        .collect();
    assert_eq!(contents, vec!["v1", "v2"]);
    // v1 superseded by v2, v2 cancelled on shutdown. v1's teardown runs
    // detached, so it may land just after the runtime returned.
    with_timeout(async {
        while launcher.kill_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(launcher.kill_count(), 2);
}

#[tokio::test]
async fn watch_mode_keeps_running_after_completion() {
    let runner = FakeRunner::new(FakeLauncher::new(FakeProcess::new().stdout("tick\n")));
    let h = harness(runner, false);
    let tx = h.tx.clone();
    let sink = Arc::clone(&h.sink);
    let task = tokio::spawn(h.runtime.run());

    tx.send(run("a")).await.unwrap();
    wait_for_finished(&sink, 1).await;
    tx.send(run("b")).await.unwrap();
    wait_for_finished(&sink, 2).await;
    assert!(!task.is_finished());

    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    assert_eq!(with_timeout(task).await.unwrap().unwrap(), INTERRUPTED_EXIT_CODE);
    assert_eq!(
        sink.transcript().stream_text(OutputStream::Stdout),
        vec!["tick", "tick"]
    );
}

#[tokio::test]
async fn one_shot_removes_script_file_before_returning() {
    init_tracing();
    let fs = MockFileSystem::new();
    let launcher = FakeLauncher::new(FakeProcess::new().stdout("hi\n").exit_code(0));
    let h = harness(interpreter_runner(&fs, &launcher), true);

    h.tx.send(run("println(\"hi\")")).await.unwrap();
    let code = with_timeout(h.runtime.run()).await.unwrap();

    assert_eq!(code, 0);
    assert_eq!(launcher.launched().len(), 1);
    assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());
}

#[tokio::test]
async fn shutdown_removes_script_file_before_returning() {
    init_tracing();
    let fs = MockFileSystem::new();
    let launcher = FakeLauncher::new(long_running());
    let h = harness(interpreter_runner(&fs, &launcher), true);

    h.tx.send(run("while (true) {}")).await.unwrap();
    h.tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    let code = with_timeout(h.runtime.run()).await.unwrap();

    assert_eq!(code, INTERRUPTED_EXIT_CODE);
    assert_eq!(launcher.kill_count(), 1);
    assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());
}

#[tokio::test]
async fn superseded_script_files_are_removed_before_returning() {
    let fs = MockFileSystem::new();
    let launcher = FakeLauncher::new(long_running());
    let h = harness(interpreter_runner(&fs, &launcher), false);
    let tx = h.tx.clone();

    for content in ["v1", "v2", "v3"] {
        tx.send(run(content)).await.unwrap();
    }
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    let code = with_timeout(h.runtime.run()).await.unwrap();

    assert_eq!(code, INTERRUPTED_EXIT_CODE);
    assert_eq!(launcher.launched().len(), 3);
    assert_eq!(launcher.kill_count(), 3);
    assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_sink_receives_every_line() {
    init_tracing();
    let out: String = (0..3000).map(|i| format!("line {i}\n")).collect();
    let launcher = FakeLauncher::new(FakeProcess::new().stdout(&out).stderr("done\n"));
    let session = ExecutionSession::new(
        CommandSpec::new("fake-interpreter"),
        Arc::new(launcher),
        SessionOptions {
            output_buffer: 8,
            drain_timeout: Duration::from_millis(50),
        },
    );
    let sink = Arc::new(SlowSink::new(Duration::from_micros(100)));

    let outputs = session.subscribe_outputs();
    session.start().unwrap();
    let state = with_timeout(present_session(session.clone(), outputs, sink.clone())).await;

    assert_eq!(state, ExecutionState::Completed { exit_code: 0 });
    let transcript = sink.inner.transcript();
    let expected: Vec<String> = (0..3000).map(|i| format!("line {i}")).collect();
    assert_eq!(transcript.stream_text(OutputStream::Stdout), expected);
    assert_eq!(transcript.stream_text(OutputStream::Stderr), vec!["done"]);
    assert_eq!(sink.inner.finished_sessions().len(), 1);
}
