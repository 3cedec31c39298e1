//! Sequential, stop-on-fail execution of external theme commands.

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::OrchestratorError;

/// Exit code reported when the program could not be found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when a command exceeded its timeout
pub const EXIT_TIMED_OUT: i32 = 124;
/// Exit code reported when a command was stopped by Ctrl+C
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code used when no better code is available
pub const EXIT_GENERIC_FAILURE: i32 = 1;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An external command bound to a working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTask {
    /// Theme (or other unit) this task belongs to
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
}

impl CommandTask {
    /// Bind a parsed command line to `dir`
    pub fn new(label: impl Into<String>, command: &CommandLine, dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: command.program.clone(),
            args: command.args.clone(),
            dir: dir.into(),
        }
    }
}

impl fmt::Display for CommandTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cd {}; {}", self.dir.display(), self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A command template split into program and arguments
///
/// Splitting is on whitespace only; no shell quoting is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn parse(line: &str) -> Result<Self, OrchestratorError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OrchestratorError::InvalidInput("command must not be empty".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Outcome of a single queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed { code: i32 },
    /// Never started: an earlier task failed or the run was cancelled
    Skipped,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: CommandTask,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

/// Aggregate result of draining a task queue
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub ran_any: bool,
    /// 0 on success or no-op, otherwise the first failing task's code
    pub exit_code: i32,
    pub cancelled: bool,
    pub results: Vec<TaskResult>,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.cancelled
    }

    pub fn failed_task(&self) -> Option<&TaskResult> {
        self.results
            .iter()
            .find(|r| matches!(r.outcome, TaskOutcome::Failed { .. }))
    }
}

/// Runs one task to completion and reports its exit code
pub trait TaskRunner {
    fn run(&self, task: &CommandTask) -> Result<i32, OrchestratorError>;
}

/// Runs tasks as child processes with inherited stdout/stderr
///
/// Each child leads its own process group so that a timeout or Ctrl+C stops
/// the whole tree it spawned, not just the direct child.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    shutdown: Arc<AtomicBool>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>, shutdown: Arc<AtomicBool>) -> Self {
        Self { timeout, shutdown }
    }

    fn wait(&self, child: &mut Child, task: &CommandTask) -> std::io::Result<i32> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(exit_code(status));
            }
            if self.shutdown.load(Ordering::Relaxed) {
                warn!("{}: interrupted, stopping command", task.label);
                kill_tree(child)?;
                return Ok(EXIT_INTERRUPTED);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    "{}: timed out after {}s",
                    task.label,
                    self.timeout.unwrap_or_default().as_secs()
                );
                kill_tree(child)?;
                return Ok(EXIT_TIMED_OUT);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl TaskRunner for ProcessRunner {
    fn run(&self, task: &CommandTask) -> Result<i32, OrchestratorError> {
        let mut command = Command::new(&task.program);
        command
            .args(&task.args)
            .current_dir(&task.dir)
            .stdin(Stdio::null());
        own_process_group(&mut command);

        let mut child = command
            .spawn()
            .map_err(|source| OrchestratorError::SpawnFailed {
                program: task.program.clone(),
                source,
            })?;

        Ok(self.wait(&mut child, task)?)
    }
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Kill the child's process group and reap the child
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: plain syscall; the group was created for this child by process_group(0)
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == -1 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already gone
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    child.wait()?;
    Ok(())
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    child.kill()?;
    child.wait()?;
    Ok(())
}

fn exit_code(status: ExitStatus) -> i32 {
    // Killed by a signal
    status.code().unwrap_or(EXIT_GENERIC_FAILURE)
}

fn spawn_failure_code(err: &OrchestratorError) -> i32 {
    match err {
        OrchestratorError::SpawnFailed { source, .. } if source.kind() == ErrorKind::NotFound => {
            EXIT_NOT_FOUND
        }
        _ => EXIT_GENERIC_FAILURE,
    }
}

/// Run `tasks` in order, stopping at the first failure
///
/// An empty queue succeeds without running anything. Once `shutdown` is set,
/// before or during a task, the remainder is skipped and the report is
/// marked cancelled.
pub fn execute<R: TaskRunner + ?Sized>(
    tasks: Vec<CommandTask>,
    runner: &R,
    shutdown: &AtomicBool,
) -> ExecutionReport {
    let mut report = ExecutionReport {
        results: Vec::with_capacity(tasks.len()),
        ..ExecutionReport::default()
    };
    let total = tasks.len();
    let mut halted = false;

    for (idx, task) in tasks.into_iter().enumerate() {
        if !halted && shutdown.load(Ordering::Relaxed) {
            warn!("Cancelled; skipping remaining {} task(s)", total - idx);
            report.cancelled = true;
            halted = true;
        }

        if halted {
            report.results.push(TaskResult {
                task,
                outcome: TaskOutcome::Skipped,
                duration: Duration::ZERO,
            });
            continue;
        }

        info!("[{}/{}] {}: {}", idx + 1, total, task.label, task);
        report.ran_any = true;
        let start = Instant::now();

        let code = match runner.run(&task) {
            Ok(code) => code,
            Err(e) => {
                error!("{}: {e}: {}", task.label, error_source(&e));
                spawn_failure_code(&e)
            }
        };

        let outcome = if code == 0 {
            TaskOutcome::Succeeded
        } else {
            error!("{}: command failed with exit code {code}", task.label);
            report.exit_code = code;
            halted = true;
            TaskOutcome::Failed { code }
        };

        report.results.push(TaskResult {
            task,
            outcome,
            duration: start.elapsed(),
        });

        if !report.cancelled && shutdown.load(Ordering::Relaxed) {
            warn!("Cancelled; skipping remaining {} task(s)", total - idx - 1);
            report.cancelled = true;
            halted = true;
        }
    }

    report
}

fn error_source(err: &OrchestratorError) -> String {
    std::error::Error::source(err)
        .map(|s| s.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Records invocations and answers with canned exit codes
    #[derive(Default)]
    struct ScriptedRunner {
        codes: HashMap<String, i32>,
        ran: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        fn failing(label: &str, code: i32) -> Self {
            let mut runner = Self::default();
            runner.codes.insert(label.to_string(), code);
            runner
        }
    }

    impl TaskRunner for ScriptedRunner {
        fn run(&self, task: &CommandTask) -> Result<i32, OrchestratorError> {
            self.ran.borrow_mut().push(task.label.clone());
            Ok(self.codes.get(&task.label).copied().unwrap_or(0))
        }
    }

    struct MissingProgramRunner;

    impl TaskRunner for MissingProgramRunner {
        fn run(&self, task: &CommandTask) -> Result<i32, OrchestratorError> {
            Err(OrchestratorError::SpawnFailed {
                program: task.program.clone(),
                source: std::io::Error::from(ErrorKind::NotFound),
            })
        }
    }

    fn tasks(labels: &[&str]) -> Vec<CommandTask> {
        let cmd = CommandLine::parse("npm run build").unwrap();
        labels
            .iter()
            .map(|l| CommandTask::new(*l, &cmd, format!("/themes/{l}")))
            .collect()
    }

    /// Behaves like a child killed by Ctrl+C: raises the flag, exits non-zero
    struct InterruptingRunner<'a> {
        shutdown: &'a AtomicBool,
        ran: RefCell<Vec<String>>,
    }

    impl TaskRunner for InterruptingRunner<'_> {
        fn run(&self, task: &CommandTask) -> Result<i32, OrchestratorError> {
            self.ran.borrow_mut().push(task.label.clone());
            self.shutdown.store(true, Ordering::SeqCst);
            Ok(EXIT_GENERIC_FAILURE)
        }
    }

    fn outcomes(report: &ExecutionReport) -> Vec<TaskOutcome> {
        report.results.iter().map(|r| r.outcome).collect()
    }

    #[test]
    fn test_command_line_parse() {
        let cmd = CommandLine::parse("  npm   run build ").unwrap();
        assert_eq!(cmd.program, "npm");
        assert_eq!(cmd.args, vec!["run", "build"]);
        assert_eq!(cmd.to_string(), "npm run build");
    }

    #[test]
    fn test_command_line_parse_empty() {
        assert!(matches!(
            CommandLine::parse("   "),
            Err(OrchestratorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_task_display() {
        let task = &tasks(&["site"])[0];
        assert_eq!(task.to_string(), "cd /themes/site; npm run build");
    }

    #[test]
    fn test_execute_empty_queue() {
        let runner = ScriptedRunner::default();
        let report = execute(Vec::new(), &runner, &AtomicBool::new(false));

        assert!(!report.ran_any);
        assert_eq!(report.exit_code, 0);
        assert!(report.success());
        assert!(runner.ran.borrow().is_empty());
    }

    #[test]
    fn test_execute_all_succeed_in_order() {
        let runner = ScriptedRunner::default();
        let report = execute(tasks(&["a", "b", "c"]), &runner, &AtomicBool::new(false));

        assert!(report.ran_any);
        assert_eq!(report.exit_code, 0);
        assert_eq!(*runner.ran.borrow(), vec!["a", "b", "c"]);
        assert_eq!(outcomes(&report), vec![TaskOutcome::Succeeded; 3]);
    }

    #[test]
    fn test_execute_stops_on_first_failure() {
        let runner = ScriptedRunner::failing("b", 3);
        let report = execute(tasks(&["a", "b", "c", "d"]), &runner, &AtomicBool::new(false));

        assert_eq!(report.exit_code, 3);
        assert!(!report.success());
        assert_eq!(*runner.ran.borrow(), vec!["a", "b"]);
        assert_eq!(
            outcomes(&report),
            vec![
                TaskOutcome::Succeeded,
                TaskOutcome::Failed { code: 3 },
                TaskOutcome::Skipped,
                TaskOutcome::Skipped,
            ]
        );
        assert_eq!(report.failed_task().unwrap().task.label, "b");
    }

    #[test]
    fn test_execute_first_task_fails() {
        let runner = ScriptedRunner::failing("a", 2);
        let report = execute(tasks(&["a", "b"]), &runner, &AtomicBool::new(false));

        assert!(report.ran_any);
        assert_eq!(report.exit_code, 2);
        assert_eq!(*runner.ran.borrow(), vec!["a"]);
    }

    #[test]
    fn test_execute_spawn_failure_not_found() {
        let report = execute(tasks(&["a", "b"]), &MissingProgramRunner, &AtomicBool::new(false));

        assert_eq!(report.exit_code, EXIT_NOT_FOUND);
        assert_eq!(
            outcomes(&report),
            vec![
                TaskOutcome::Failed {
                    code: EXIT_NOT_FOUND
                },
                TaskOutcome::Skipped
            ]
        );
    }

    #[test]
    fn test_execute_cancelled_before_start() {
        let runner = ScriptedRunner::default();
        let report = execute(tasks(&["a", "b"]), &runner, &AtomicBool::new(true));

        assert!(report.cancelled);
        assert!(!report.ran_any);
        assert!(!report.success());
        assert!(runner.ran.borrow().is_empty());
        assert_eq!(outcomes(&report), vec![TaskOutcome::Skipped; 2]);
    }

    #[test]
    fn test_execute_interrupted_mid_task_is_cancelled() {
        let shutdown = AtomicBool::new(false);
        let runner = InterruptingRunner {
            shutdown: &shutdown,
            ran: RefCell::default(),
        };

        let report = execute(tasks(&["a", "b", "c"]), &runner, &shutdown);

        assert!(report.cancelled);
        assert!(!report.success());
        assert_eq!(*runner.ran.borrow(), vec!["a"]);
        assert_eq!(
            outcomes(&report),
            vec![
                TaskOutcome::Failed {
                    code: EXIT_GENERIC_FAILURE
                },
                TaskOutcome::Skipped,
                TaskOutcome::Skipped,
            ]
        );
    }

    #[test]
    fn test_execute_interrupted_during_last_task_is_cancelled() {
        let shutdown = AtomicBool::new(false);
        let runner = InterruptingRunner {
            shutdown: &shutdown,
            ran: RefCell::default(),
        };

        let report = execute(tasks(&["only"]), &runner, &shutdown);

        assert!(report.cancelled);
        assert!(report.ran_any);
    }

    #[test]
    fn test_failed_task_and_duration_recorded() {
        let runner = ScriptedRunner::failing("a", 9);
        let report = execute(tasks(&["a"]), &runner, &AtomicBool::new(false));

        let failed = report.failed_task().unwrap();
        assert_eq!(failed.task.label, "a");
        assert!(failed.duration < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_reports_exit_codes() {
        let temp = tempfile::TempDir::new().unwrap();
        let runner = ProcessRunner::default();

        let ok = CommandTask::new("ok", &CommandLine::parse("true").unwrap(), temp.path());
        assert_eq!(runner.run(&ok).unwrap(), 0);

        let fail = CommandTask::new("fail", &CommandLine::parse("false").unwrap(), temp.path());
        assert_eq!(runner.run(&fail).unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_runs_in_task_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("build.sh"), "touch built.txt\nexit 4\n").unwrap();
        let task = CommandTask::new("site", &CommandLine::parse("sh build.sh").unwrap(), temp.path());

        let code = ProcessRunner::default().run(&task).unwrap();

        assert_eq!(code, 4);
        assert!(temp.path().join("built.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_timeout() {
        let temp = tempfile::TempDir::new().unwrap();
        let task = CommandTask::new("slow", &CommandLine::parse("sleep 5").unwrap(), temp.path());
        let runner = ProcessRunner::new(Some(Duration::from_millis(100)), Arc::default());

        assert_eq!(runner.run(&task).unwrap(), EXIT_TIMED_OUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_timeout_kills_grandchildren() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("build.sh"),
            "(sleep 1; touch late.txt) &\nsleep 5\n",
        )
        .unwrap();
        let task = CommandTask::new("site", &CommandLine::parse("sh build.sh").unwrap(), temp.path());
        let runner = ProcessRunner::new(Some(Duration::from_millis(200)), Arc::default());

        assert_eq!(runner.run(&task).unwrap(), EXIT_TIMED_OUT);
        thread::sleep(Duration::from_millis(1500));
        assert!(!temp.path().join("late.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_stops_on_shutdown() {
        let temp = tempfile::TempDir::new().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });
        let task = CommandTask::new("slow", &CommandLine::parse("sleep 5").unwrap(), temp.path());
        let start = Instant::now();

        let code = ProcessRunner::new(None, shutdown).run(&task).unwrap();

        trigger.join().unwrap();
        assert_eq!(code, EXIT_INTERRUPTED);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_process_runner_missing_program() {
        let temp = tempfile::TempDir::new().unwrap();
        let task = CommandTask::new(
            "x",
            &CommandLine::parse("definitely-not-a-real-program-4242").unwrap(),
            temp.path(),
        );
        let result = ProcessRunner::default().run(&task);
        assert!(matches!(result, Err(OrchestratorError::SpawnFailed { .. })));
    }
}
