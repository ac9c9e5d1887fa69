//! Maps goal log output to named phases for progress display.

use dockit_core::{LogLine, LogSink, LogStream};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Login,
    Build,
    Push,
    Run,
    Link,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Check => "check",
            Phase::Login => "login",
            Phase::Build => "build",
            Phase::Push => "push",
            Phase::Run => "run",
            Phase::Link => "link",
        };
        f.write_str(name)
    }
}

// "Running docker build . -f Dockerfile", "Running /kaniko/executor --help"
static COMMAND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Running (?:\S*/)?(?:docker|executor)\s+(help|--help|login|build|push|run)\b")
        .unwrap()
});

static CHECK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Checking \w+ builder").unwrap());

static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Linking image ").unwrap());

// Builder output markers. Kaniko builds and pushes in one command.
static BUILD_OUTPUT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Sending build context to Docker daemon|Step \d+/\d+ : |#\d+ \[|(?:INFO\[\d+\] )?Building stage)")
        .unwrap()
});

static PUSH_OUTPUT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:The push refers to repository |(?:INFO\[\d+\] )?Pushing image to )").unwrap()
});

static LOGIN_OUTPUT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Login Succeeded").unwrap());

/// Forwards lines to an inner sink while tracking the current phase.
///
/// Goal lines are matched against the commands it announces. Process output
/// only moves the phase on well-known builder markers, never on arbitrary
/// text a build step happens to print.
pub struct ProgressReporter {
    inner: Arc<dyn LogSink>,
    phase: Mutex<Option<Phase>>,
}

impl ProgressReporter {
    pub fn new(inner: Arc<dyn LogSink>) -> Self {
        Self {
            inner,
            phase: Mutex::new(None),
        }
    }

    pub fn classify(line: &str) -> Option<Phase> {
        if CHECK_REGEX.is_match(line) {
            return Some(Phase::Check);
        }
        if LINK_REGEX.is_match(line) {
            return Some(Phase::Link);
        }
        let captures = COMMAND_REGEX.captures(line)?;
        match captures.get(1)?.as_str() {
            "help" | "--help" => Some(Phase::Check),
            "login" => Some(Phase::Login),
            "build" => Some(Phase::Build),
            "push" => Some(Phase::Push),
            "run" => Some(Phase::Run),
            _ => None,
        }
    }

    pub fn classify_output(line: &str) -> Option<Phase> {
        let line = line.trim_start();
        if BUILD_OUTPUT_REGEX.is_match(line) {
            Some(Phase::Build)
        } else if PUSH_OUTPUT_REGEX.is_match(line) {
            Some(Phase::Push)
        } else if LOGIN_OUTPUT_REGEX.is_match(line) {
            Some(Phase::Login)
        } else {
            None
        }
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.phase.lock().ok().and_then(|p| *p)
    }
}

impl LogSink for ProgressReporter {
    fn write(&self, line: LogLine) {
        let next = match line.stream {
            LogStream::System => Self::classify(&line.content),
            LogStream::Stdout | LogStream::Stderr => Self::classify_output(&line.content),
        };
        if let Some(next) = next {
            if let Ok(mut phase) = self.phase.lock() {
                if *phase != Some(next) {
                    info!(phase = %next, "Goal phase changed");
                    *phase = Some(next);
                }
            }
        }
        self.inner.write(line);
    }
}
