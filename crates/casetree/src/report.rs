//! Test reporting — the `Reporter` contract, the console reporter used by
//! `harness = false` targets, and a silent recording reporter.
//!
//! Console output is streaming and tree-shaped:
//!
//! ```text
//! RUN  signup/valid payload
//! ✓ signup/valid payload (2ms)
//! RUN  signup/limits
//!   RUN  10
//!   ✓ 10
//!   RUN  200
//!     Error: expected 400, got 200
//!   ✗ 200
//! ✗ signup/limits
//! ```

use std::any::Any;
use std::io::IsTerminal;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

// ============================================================================
// Reporter contract
// ============================================================================

/// Status of the current sub-test scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Running,
    Passed,
    Failed,
    Skipped,
}

/// The test-reporting collaborator.
///
/// The execution engine depends only on [`error`](Reporter::error) being
/// usable from assert hooks and on [`run`](Reporter::run) providing the
/// grouping boundary when iterating cases or variants. Everything else is
/// for hook authors.
pub trait Reporter {
    /// Run `f` as a named sub-test. The boundary catches unwinds, so a
    /// panicking or fatally-aborted sub-test never takes down its siblings.
    fn run(&mut self, name: &str, f: &mut dyn FnMut(&mut dyn Reporter));
    fn log(&mut self, message: &str);
    /// Mark the current sub-test failed and continue.
    fn error(&mut self, message: &str);
    /// Mark the current sub-test failed and abort it by unwinding a
    /// [`FatalSignal`] to the enclosing [`run`](Reporter::run) boundary.
    fn fatal(&mut self, message: &str) -> !;
    /// Mark the current sub-test skipped. Does not unwind; callers return
    /// early themselves.
    fn skip(&mut self, reason: &str);
    fn status(&self) -> Status;

    fn failed(&self) -> bool {
        self.status() == Status::Failed
    }
}

/// Unwind payload carried by [`Reporter::fatal`]. A `run` boundary that
/// catches this payload treats the failure as already recorded.
pub struct FatalSignal;

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Results and configuration
// ============================================================================

/// Aggregated results from running a tree.
#[derive(Debug, Default, Clone)]
pub struct RunResult {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// One `<case path>: <message>` entry per reported failure.
    pub failures: Vec<String>,
}

/// Run configuration parsed from command-line args.
#[derive(Default)]
pub struct RunConfig {
    /// Only run cases whose joined path contains this (case-insensitive).
    pub filter: Option<String>,
    /// Only list case paths, don't run them.
    pub list: bool,
}

impl RunConfig {
    /// Parse from the process args (compatible with `cargo test -- <args>`).
    pub fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut filter = None;
        let mut list = false;

        for arg in args.iter().skip(1) {
            match arg.as_str() {
                "--list" => list = true,
                a if !a.starts_with('-') => filter = Some(a.to_string()),
                _ => {} // ignore unknown flags
            }
        }

        RunConfig { filter, list }
    }

    pub(crate) fn matches(&self, path: &str) -> bool {
        match &self.filter {
            Some(f) => path.to_lowercase().contains(&f.to_lowercase()),
            None => true,
        }
    }
}

// ============================================================================
// ANSI color helpers
// ============================================================================

fn color_enabled() -> bool {
    // Respect NO_COLOR (https://no-color.org/)
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn paint(enabled: bool, code: &str, s: &str) -> String {
    if enabled {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

fn green(enabled: bool, s: &str) -> String {
    paint(enabled, "32", s)
}

fn red(enabled: bool, s: &str) -> String {
    paint(enabled, "31", s)
}

fn yellow(enabled: bool, s: &str) -> String {
    paint(enabled, "33", s)
}

fn dim(enabled: bool, s: &str) -> String {
    paint(enabled, "2", s)
}

fn fmt_duration(d: Duration) -> String {
    if d < Duration::from_millis(1) {
        format!("{}µs", d.as_micros())
    } else if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if d < Duration::from_secs(60) {
        format!("{}s", d.as_secs())
    } else {
        format!("{}m{}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}

// ============================================================================
// Scope bookkeeping shared by the reporters
// ============================================================================

#[derive(Default)]
struct Scope {
    failed: bool,
    skipped: bool,
    subruns: usize,
}

fn handle_unwind(payload: Box<dyn Any + Send>) -> Option<String> {
    if payload.is::<FatalSignal>() {
        // Failure already recorded by fatal().
        None
    } else {
        Some(format!("panic: {}", panic_message(payload.as_ref())))
    }
}

// ============================================================================
// ConsoleReporter
// ============================================================================

/// Streaming console reporter for `harness = false` targets.
///
/// Prints `RUN` on entry and a colored status line with elapsed time on
/// exit; [`finish`](ConsoleReporter::finish) prints the summary.
pub struct ConsoleReporter {
    color: bool,
    started: Instant,
    path: Vec<String>,
    scopes: Vec<Scope>,
    result: RunResult,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter {
            color: color_enabled(),
            started: Instant::now(),
            path: Vec::new(),
            scopes: Vec::new(),
            result: RunResult::default(),
        }
    }

    pub fn result(&self) -> &RunResult {
        &self.result
    }

    fn indent(&self) -> String {
        "  ".repeat(self.scopes.len())
    }

    /// Print the summary and hand back the results.
    pub fn finish(self) -> RunResult {
        let elapsed = fmt_duration(self.started.elapsed());
        let c = self.color;
        let r = &self.result;

        let parts: Vec<String> = [
            (r.passed > 0).then(|| green(c, &format!("{} passed", r.passed))),
            (r.failed > 0).then(|| red(c, &format!("{} failed", r.failed))),
            (r.skipped > 0).then(|| yellow(c, &format!("{} skipped", r.skipped))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let summary = format!("{} ({})", parts.join(", "), dim(c, &elapsed));

        println!();
        if r.failed > 0 {
            println!("{}", red(c, "FAIL"));
            println!("{summary}");
            println!();
            println!("Failures:");
            for (i, failure) in r.failures.iter().enumerate() {
                println!("  {}. {}", i + 1, failure);
            }
            println!();
        } else {
            println!("{}", green(c, "PASS"));
            println!("{summary}");
        }

        self.result
    }
}

impl Reporter for ConsoleReporter {
    fn run(&mut self, name: &str, f: &mut dyn FnMut(&mut dyn Reporter)) {
        let indent = self.indent();
        println!("{indent}{}", dim(self.color, &format!("RUN  {name}")));

        self.path.push(name.to_string());
        self.scopes.push(Scope::default());
        let start = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| f(self)));
        if let Err(payload) = outcome {
            if let Some(msg) = handle_unwind(payload) {
                self.error(&msg);
            }
        }

        let scope = self.scopes.pop().expect("unbalanced reporter scope");
        self.path.pop();

        if scope.subruns == 0 {
            if scope.failed {
                self.result.failed += 1;
            } else if scope.skipped {
                self.result.skipped += 1;
            } else {
                self.result.passed += 1;
            }
        }

        let time = dim(self.color, &format!("({})", fmt_duration(start.elapsed())));
        if scope.failed {
            println!("{indent}{} {time}", red(self.color, &format!("✗ {name}")));
        } else if scope.skipped {
            println!("{indent}{} {time}", yellow(self.color, &format!("- {name}")));
        } else {
            println!("{indent}{} {name} {time}", green(self.color, "✓"));
        }

        if let Some(parent) = self.scopes.last_mut() {
            parent.subruns += 1;
            if scope.failed {
                parent.failed = true;
            }
        }
    }

    fn log(&mut self, message: &str) {
        let indent = self.indent();
        println!("{indent}{}", dim(self.color, message));
    }

    fn error(&mut self, message: &str) {
        let indent = self.indent();
        println!("{indent}{}", red(self.color, &format!("Error: {message}")));

        let entry = if self.path.is_empty() {
            message.to_string()
        } else {
            format!("{}: {}", self.path.join("/"), message)
        };
        self.result.failures.push(entry);

        match self.scopes.last_mut() {
            Some(scope) => scope.failed = true,
            None => self.result.failed += 1,
        }
    }

    fn fatal(&mut self, message: &str) -> ! {
        self.error(message);
        std::panic::panic_any(FatalSignal);
    }

    fn skip(&mut self, reason: &str) {
        let indent = self.indent();
        println!("{indent}{}", yellow(self.color, &format!("skip: {reason}")));
        if let Some(scope) = self.scopes.last_mut() {
            scope.skipped = true;
        }
    }

    fn status(&self) -> Status {
        match self.scopes.last() {
            Some(scope) if scope.failed => Status::Failed,
            Some(scope) if scope.skipped => Status::Skipped,
            Some(_) => Status::Running,
            None if self.result.failed > 0 => Status::Failed,
            None if self.result.passed + self.result.skipped > 0 => Status::Passed,
            None => Status::NotStarted,
        }
    }
}

// ============================================================================
// NullReporter
// ============================================================================

/// A reporter that records everything and prints nothing. Useful for
/// embedding the engine and for asserting on reporting behavior in tests.
#[derive(Default)]
pub struct NullReporter {
    pub result: RunResult,
    /// Full joined path of every `run` scope entered, in order.
    pub runs: Vec<String>,
    pub logs: Vec<String>,
    path: Vec<String>,
    scopes: Vec<Scope>,
}

impl NullReporter {
    pub fn new() -> Self {
        NullReporter::default()
    }
}

impl Reporter for NullReporter {
    fn run(&mut self, name: &str, f: &mut dyn FnMut(&mut dyn Reporter)) {
        self.path.push(name.to_string());
        self.runs.push(self.path.join("/"));
        self.scopes.push(Scope::default());

        let outcome = catch_unwind(AssertUnwindSafe(|| f(self)));
        if let Err(payload) = outcome {
            if let Some(msg) = handle_unwind(payload) {
                self.error(&msg);
            }
        }

        let scope = self.scopes.pop().expect("unbalanced reporter scope");
        self.path.pop();

        if scope.subruns == 0 {
            if scope.failed {
                self.result.failed += 1;
            } else if scope.skipped {
                self.result.skipped += 1;
            } else {
                self.result.passed += 1;
            }
        }

        if let Some(parent) = self.scopes.last_mut() {
            parent.subruns += 1;
            if scope.failed {
                parent.failed = true;
            }
        }
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn error(&mut self, message: &str) {
        let entry = if self.path.is_empty() {
            message.to_string()
        } else {
            format!("{}: {}", self.path.join("/"), message)
        };
        self.result.failures.push(entry);

        match self.scopes.last_mut() {
            Some(scope) => scope.failed = true,
            None => self.result.failed += 1,
        }
    }

    fn fatal(&mut self, message: &str) -> ! {
        self.error(message);
        std::panic::panic_any(FatalSignal);
    }

    fn skip(&mut self, _reason: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.skipped = true;
        }
    }

    fn status(&self) -> Status {
        match self.scopes.last() {
            Some(scope) if scope.failed => Status::Failed,
            Some(scope) if scope.skipped => Status::Skipped,
            Some(_) => Status::Running,
            None if self.result.failed > 0 => Status::Failed,
            None if self.result.passed + self.result.skipped > 0 => Status::Passed,
            None => Status::NotStarted,
        }
    }
}
