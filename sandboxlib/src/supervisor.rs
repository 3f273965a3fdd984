use crate::error::{Error, Result};
use crate::runtime::{Execution, LaunchSpec, Runtime};
use crate::types::{JobId, JobOptions};
use crate::workspace::{Workspace, LAUNCHER_FILE, LOG_FILE};
use futures::future::{self, FutureExt};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::{select, sync::oneshot, time};

/// Only the end of the log is read on each poll.
const TAIL_BYTES: u64 = 64 * 1024;

/// How a supervised execution ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub exit_code: i32,
    /// Last non-empty log line observed.
    pub progress: String,
}

/// Launches a job's execution environment and watches it until it exits.
#[derive(Clone)]
pub struct ExecutionSupervisor {
    runtime: Arc<dyn Runtime>,
    poll_interval: Duration,
    deadline: Option<Duration>,
}

impl ExecutionSupervisor {
    pub fn new(runtime: Arc<dyn Runtime>, poll_interval: Duration, deadline: Option<Duration>) -> Self {
        Self {
            runtime,
            poll_interval,
            deadline,
        }
    }

    /// Run the workspace's launcher to completion.
    ///
    /// `on_started` is called once the environment has been launched and `on_progress`
    /// every time the last log line changes. A message on `cancel_rx`, or the deadline
    /// passing, kills the environment and returns `Error::Cancelled` / `Error::TimedOut`.
    /// A cancel that arrives before launch skips the runtime entirely. A dropped cancel
    /// sender is ignored.
    pub async fn run<S, F>(
        &self,
        job_id: JobId,
        workspace: &Workspace,
        options: &JobOptions,
        on_started: S,
        mut on_progress: F,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> Result<Outcome>
    where
        S: FnOnce() + Send,
        F: FnMut(&str) + Send,
    {
        if cancel_rx.try_recv().is_ok() {
            tracing::info!(job_id = %job_id, "cancelled before launch");
            return Err(Error::Cancelled);
        }

        let spec = LaunchSpec {
            job_id,
            workspace: workspace.path().to_path_buf(),
            launcher: LAUNCHER_FILE.to_string(),
            log_file: LOG_FILE.to_string(),
            envs: options.clone(),
        };
        let mut execution = self.runtime.launch(&spec).await?;
        on_started();
        let log_path = workspace.log_path();

        let deadline = match self.deadline {
            Some(limit) => time::sleep(limit).left_future(),
            None => future::pending::<()>().right_future(),
        };
        tokio::pin!(deadline);
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut progress = String::new();
        let mut cancel_open = true;

        loop {
            select! {
                biased;

                cancelled = &mut cancel_rx, if cancel_open => {
                    if cancelled.is_ok() {
                        tracing::info!(job_id = %job_id, "cancelling execution");
                        terminate(&mut *execution).await;
                        return Err(Error::Cancelled);
                    }
                    // sender dropped, no cancel can arrive any more
                    cancel_open = false;
                }
                _ = &mut deadline => {
                    tracing::warn!(job_id = %job_id, "execution exceeded its deadline");
                    terminate(&mut *execution).await;
                    return Err(Error::TimedOut);
                }
                _ = ticker.tick() => {
                    let exited = match execution.has_exited().await {
                        Ok(exited) => exited,
                        Err(err) => {
                            terminate(&mut *execution).await;
                            return Err(err);
                        }
                    };
                    // read after the liveness check so the final line is never missed
                    if let Some(line) = last_log_line(&log_path).await {
                        if line != progress {
                            tracing::debug!(job_id = %job_id, progress = %line, "progress");
                            on_progress(&line);
                            progress = line;
                        }
                    }
                    if exited {
                        break;
                    }
                }
            }
        }

        // refuse cancels from here on, but honour one that was already accepted
        cancel_rx.close();
        let cancelled = cancel_open && cancel_rx.try_recv().is_ok();
        let exit_code = finish(&mut *execution).await;
        if cancelled {
            tracing::info!(job_id = %job_id, "execution exited after cancel was requested");
            return Err(Error::Cancelled);
        }
        let exit_code = exit_code?;
        tracing::info!(job_id = %job_id, exit_code, "execution exited");
        Ok(Outcome {
            exit_code,
            progress,
        })
    }
}

/// Best-effort kill and cleanup; the job is already failing.
async fn terminate(execution: &mut dyn Execution) {
    if let Err(err) = execution.kill().await {
        tracing::warn!(execution = %execution.id(), error = %err, "failed to kill execution environment");
    }
    let _ = finish(execution).await;
}

/// Collect the exit code, then remove the environment whether or not that worked.
async fn finish(execution: &mut dyn Execution) -> Result<i32> {
    let exit_code = execution.wait().await;
    if let Err(err) = execution.remove().await {
        tracing::warn!(execution = %execution.id(), error = %err, "failed to remove execution environment");
    }
    exit_code
}

/// The last non-empty line of the log, or `None` if there is no log yet.
async fn last_log_line(path: &Path) -> Option<String> {
    let mut file = tokio::fs::File::open(path).await.ok()?;
    let len = file.metadata().await.ok()?.len();
    let start = len.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(start)).await.ok()?;

    let mut tail = Vec::new();
    file.read_to_end(&mut tail).await.ok()?;
    let tail = String::from_utf8_lossy(&tail);
    let line = tail
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    Some(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ProcessRuntime;
    use crate::workspace::WorkspaceManager;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    async fn stage(launcher: &str) -> (tempfile::TempDir, Workspace) {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("launcher.sh");
        std::fs::write(&path, launcher).unwrap();
        let workspace = WorkspaceManager::new(None, path)
            .stage(b"print('hi')\n")
            .await
            .unwrap();
        (scratch, workspace)
    }

    fn supervisor(deadline: Option<Duration>) -> ExecutionSupervisor {
        ExecutionSupervisor::new(
            Arc::new(ProcessRuntime),
            Duration::from_millis(20),
            deadline,
        )
    }

    #[derive(Default)]
    struct CountingRuntime {
        launches: AtomicUsize,
    }

    #[async_trait]
    impl Runtime for CountingRuntime {
        async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn Execution>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            ProcessRuntime.launch(spec).await
        }
    }

    #[tokio::test]
    async fn reports_progress_and_exit_code() {
        let (_scratch, workspace) =
            stage("#!/bin/sh\necho step 1\nsleep 0.2\necho step 2\necho\nexit 3\n").await;
        let seen = Mutex::new(Vec::new());
        let started = AtomicBool::new(false);
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        let outcome = supervisor(None)
            .run(
                Uuid::new_v4(),
                &workspace,
                &JobOptions::new(),
                || started.store(true, Ordering::SeqCst),
                |line| seen.lock().unwrap().push(line.to_string()),
                cancel_rx,
            )
            .await
            .unwrap();

        assert!(started.load(Ordering::SeqCst));
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.progress, "step 2");
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.last().map(String::as_str), Some("step 2"));
        // consecutive duplicates are never reported
        assert!(seen.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[tokio::test]
    async fn options_reach_the_launcher() {
        let (_scratch, workspace) = stage("#!/bin/sh\necho \"$COMMIT_A\"\n").await;
        let mut options = JobOptions::new();
        options.insert("COMMIT_A".into(), "deadbeef".into());
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        let outcome = supervisor(None)
            .run(Uuid::new_v4(), &workspace, &options, || {}, |_| {}, cancel_rx)
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.progress, "deadbeef");
    }

    #[tokio::test]
    async fn cancel_before_launch_skips_the_runtime() {
        let (_scratch, workspace) = stage("#!/bin/sh\necho started\n").await;
        let runtime = Arc::new(CountingRuntime::default());
        let supervisor =
            ExecutionSupervisor::new(runtime.clone(), Duration::from_millis(20), None);
        let started = AtomicBool::new(false);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        cancel_tx.send(()).unwrap();

        let err = supervisor
            .run(
                Uuid::new_v4(),
                &workspace,
                &JobOptions::new(),
                || started.store(true, Ordering::SeqCst),
                |_| {},
                cancel_rx,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(runtime.launches.load(Ordering::SeqCst), 0);
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_kills_a_running_execution() {
        let (_scratch, workspace) = stage("#!/bin/sh\necho started\nsleep 30\n").await;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let mut cancel_tx = Some(cancel_tx);

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            supervisor(None).run(
                Uuid::new_v4(),
                &workspace,
                &JobOptions::new(),
                || {},
                |line| {
                    if line == "started" {
                        if let Some(cancel_tx) = cancel_tx.take() {
                            let _ = cancel_tx.send(());
                        }
                    }
                },
                cancel_rx,
            ),
        )
        .await
        .expect("cancel did not stop the execution")
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn cancel_accepted_before_exit_wins() {
        let (_scratch, workspace) = stage("#!/bin/sh\necho quick\n").await;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        // the cancel is pending before the first poll sees the launcher exit
        let err = supervisor(None)
            .run(
                Uuid::new_v4(),
                &workspace,
                &JobOptions::new(),
                move || {
                    let _ = cancel_tx.send(());
                },
                |_| {},
                cancel_rx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn dropped_cancel_sender_does_not_cancel() {
        let (_scratch, workspace) = stage("#!/bin/sh\nsleep 0.1\necho ok\n").await;
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        drop(cancel_tx);

        let outcome = supervisor(None)
            .run(Uuid::new_v4(), &workspace, &JobOptions::new(), || {}, |_| {}, cancel_rx)
            .await
            .unwrap();
        assert_eq!(outcome.progress, "ok");
    }

    #[tokio::test]
    async fn deadline_times_out() {
        let (_scratch, workspace) = stage("#!/bin/sh\nsleep 30\n").await;
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        let err = supervisor(Some(Duration::from_millis(200)))
            .run(Uuid::new_v4(), &workspace, &JobOptions::new(), || {}, |_| {}, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut));
    }

    struct FailingWait {
        removed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Execution for FailingWait {
        fn id(&self) -> String {
            "failing-wait".into()
        }

        async fn has_exited(&mut self) -> Result<bool> {
            Ok(true)
        }

        async fn wait(&mut self) -> Result<i32> {
            Err(Error::Runtime("exit status unavailable".into()))
        }

        async fn kill(&mut self) -> Result<()> {
            Ok(())
        }

        async fn remove(&mut self) -> Result<()> {
            self.removed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingWaitRuntime {
        removed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Runtime for FailingWaitRuntime {
        async fn launch(&self, _spec: &LaunchSpec) -> Result<Box<dyn Execution>> {
            Ok(Box::new(FailingWait {
                removed: self.removed.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn environment_is_removed_when_wait_fails() {
        let (_scratch, workspace) = stage("#!/bin/sh\n").await;
        let removed = Arc::new(AtomicBool::new(false));
        let supervisor = ExecutionSupervisor::new(
            Arc::new(FailingWaitRuntime {
                removed: removed.clone(),
            }),
            Duration::from_millis(20),
            None,
        );
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        let err = supervisor
            .run(Uuid::new_v4(), &workspace, &JobOptions::new(), || {}, |_| {}, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert!(removed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn last_line_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.txt");
        assert_eq!(last_log_line(&log).await, None);

        std::fs::write(&log, "first\n  second  \n\n   \n").unwrap();
        assert_eq!(last_log_line(&log).await.as_deref(), Some("second"));

        std::fs::write(&log, "").unwrap();
        assert_eq!(last_log_line(&log).await.as_deref(), Some(""));
    }
}
