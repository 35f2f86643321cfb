use jobs::{ControllerError, JobController, JobStatus, TerminalStatus};
use media_sdk::{locate_binary, sdk_args, ProcessEngine, SdkError, SPAWN_FAILED};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stitch_config::{ConfigBuilder, JobConfiguration, RawOptions};

fn config() -> JobConfiguration {
    ConfigBuilder::new(RawOptions {
        inputs: vec!["left.insv".to_string(), "right.insv".to_string()],
        output: Some("out.mp4".to_string()),
        enable_flowstate: true,
        ..RawOptions::default()
    })
    .build()
    .unwrap()
}

#[test]
fn test_missing_binary_is_refused() {
    let engine = Arc::new(ProcessEngine::new(PathBuf::from(
        "/nonexistent/panostitch/MediaSDKTest",
    )));
    let controller = JobController::new(engine);
    match controller.submit(config()) {
        Err(ControllerError::Engine(err)) => assert_eq!(err.code, SPAWN_FAILED),
        other => panic!("expected spawn failure, got {other:?}"),
    }
    let state = controller.wait_until_terminal(Some(Duration::from_millis(10)));
    assert!(matches!(state.terminal, TerminalStatus::Failed(_)));
}

#[test]
fn test_locate_explicit_binary() {
    let missing = Path::new("/nonexistent/panostitch/MediaSDKTest");
    assert!(matches!(
        locate_binary(Some(missing)),
        Err(SdkError::BinaryNotFound(_))
    ));
}

#[cfg(unix)]
mod scripted {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    // Writing an executable while another thread forks can leave the file
    // busy; scripts are written and spawned one at a time.
    static SPAWN_LOCK: Mutex<()> = Mutex::new(());

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("stitcher.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn submit(dir: &Path, body: &str) -> (Arc<ProcessEngine>, JobController) {
        let _guard = SPAWN_LOCK.lock();
        let engine = Arc::new(ProcessEngine::new(write_script(dir, body)));
        let controller = JobController::new(engine.clone());
        controller.submit(config()).unwrap();
        (engine, controller)
    }

    #[test]
    fn test_success_reports_progress_then_completes() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args.txt");
        let body = format!(
            "printf '%s\\n' \"$@\" > '{}'\n\
             printf 'process = 10%%\\r'\n\
             printf 'process = 60%%\\r'\n\
             printf 'process = 100%%\\r'\n\
             echo 'stitch finished'\n\
             exit 0",
            args_file.display()
        );
        let (engine, controller) = submit(dir.path(), &body);
        let events = controller.events();
        let state = controller.wait_until_terminal(Some(Duration::from_secs(10)));
        engine.join();

        assert_eq!(state.terminal, TerminalStatus::Succeeded);
        assert_eq!(state.progress, 100);
        let statuses: Vec<JobStatus> = events.try_iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Submitted,
                JobStatus::Running,
                JobStatus::Progress(10),
                JobStatus::Progress(60),
                JobStatus::Progress(100),
                JobStatus::Completed,
            ]
        );

        let recorded: Vec<String> = fs::read_to_string(&args_file)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        let expected: Vec<String> = sdk_args(&config())
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(recorded, expected);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_library_dirs_lead_the_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("env.txt");
        let sdk_libs = dir.path().join("sdk-libs");
        let body = format!("echo \"$LD_LIBRARY_PATH\" > '{}'", env_file.display());
        let engine = {
            let _guard = SPAWN_LOCK.lock();
            let engine = Arc::new(
                ProcessEngine::new(write_script(dir.path(), &body))
                    .with_library_dirs(vec![sdk_libs.clone()]),
            );
            let controller = JobController::new(engine.clone());
            controller.submit(config()).unwrap();
            let state = controller.wait_until_terminal(Some(Duration::from_secs(10)));
            assert_eq!(state.terminal, TerminalStatus::Succeeded);
            engine
        };
        engine.join();

        let recorded = fs::read_to_string(&env_file).unwrap();
        let first = std::env::split_paths(recorded.trim_end()).next();
        assert_eq!(first, Some(sdk_libs));
    }

    #[test]
    fn test_reported_error_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, controller) = submit(
            dir.path(),
            "printf 'process = 20%%\\r'\necho 'error: bad input'\nexit 1",
        );
        let state = controller.wait_until_terminal(Some(Duration::from_secs(10)));
        engine.join();

        assert_eq!(state.terminal, TerminalStatus::Failed("bad input".to_string()));
        assert_eq!(state.progress, 20);
        assert_eq!(state.last_error.map(|e| e.code), Some(-1));
    }

    #[test]
    fn test_silent_nonzero_exit_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, controller) = submit(dir.path(), "exit 3");
        let state = controller.wait_until_terminal(Some(Duration::from_secs(10)));
        engine.join();

        match &state.terminal {
            TerminalStatus::Failed(message) => {
                assert!(message.starts_with("stitcher exited"), "{message}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(state.last_error.map(|e| e.code), Some(3));
    }

    #[test]
    fn test_cancel_kills_stitcher() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, controller) = submit(dir.path(), "printf 'process = 5%%\\r'\nexec sleep 10");
        let events = controller.events();
        let started = Instant::now();
        loop {
            let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
            if event.status == JobStatus::Progress(5) {
                break;
            }
        }

        controller.cancel().unwrap();
        let state = controller.wait_until_terminal(Some(Duration::from_secs(10)));
        engine.join();

        assert_eq!(state.terminal, TerminalStatus::Cancelled);
        assert_eq!(state.progress, 5);
        assert!(started.elapsed() < Duration::from_secs(8));
    }
}
