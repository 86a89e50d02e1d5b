// Copyright (C) 2024 Ethan Uppal.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3 of the License only.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

//! Executes a [`Plan`] step by step and always cleans up afterwards.

use std::{fmt, str::FromStr, time::Instant};

use owo_colors::OwoColorize;
use snafu::{whatever, Whatever};

use crate::{
    artifacts::{remove_artifacts, Cleanup},
    command::{Exit, ProcessRunner},
    plan::{Plan, Step},
};

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failing step.
    #[default]
    Abort,
    /// Run every step regardless of earlier failures.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = Whatever;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            _ => whatever!(
                "Unknown failure policy `{}` (expected `abort` or `continue`)",
                s
            ),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Continue => "continue",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exited(Exit),
    /// The process could not be started; holds the reason.
    NotStarted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub outcome: Outcome,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        matches!(&self.outcome, Outcome::Exited(exit) if exit.success())
    }
}

#[derive(Debug)]
pub struct Report {
    /// One entry per step that was attempted, in order.
    pub steps: Vec<StepReport>,
    pub cleanup: Cleanup,
}

impl Report {
    pub fn first_failure(&self) -> Option<&StepReport> {
        self.steps.iter().find(|report| !report.succeeded())
    }

    pub fn succeeded(&self) -> bool {
        self.first_failure().is_none() && self.cleanup.succeeded()
    }

    /// The process exit code for the whole run: `0` on success, otherwise the
    /// exit code of the first failing step, or `1` when that step has no
    /// usable code or only the cleanup failed.
    pub fn exit_code(&self) -> u8 {
        if let Some(failure) = self.first_failure() {
            return match &failure.outcome {
                Outcome::Exited(exit) => exit
                    .code()
                    .and_then(|code| u8::try_from(code).ok())
                    .filter(|code| *code != 0)
                    .unwrap_or(1),
                Outcome::NotStarted(_) => 1,
            };
        }
        if self.cleanup.succeeded() { 0 } else { 1 }
    }

    /// Names what went wrong first, e.g. `make exited with exit code 2`, or
    /// `None` if the run succeeded.
    pub fn failure_summary(&self) -> Option<String> {
        if let Some(failure) = self.first_failure() {
            return Some(match &failure.outcome {
                Outcome::Exited(exit) => {
                    format!("{} exited with {}", failure.step, exit)
                }
                Outcome::NotStarted(_) => {
                    format!("{} could not be started", failure.step)
                }
            });
        }
        self.cleanup.failed.first().map(|(path, reason)| {
            format!("cleanup could not remove {} ({})", path, reason)
        })
    }
}

/// Runs the steps of `plan` in order with `runner`, following `policy` on
/// failure, then removes the plan's artifacts no matter how the steps went.
pub fn run(
    plan: &Plan,
    runner: &mut impl ProcessRunner,
    policy: FailurePolicy,
) -> Report {
    let mut steps = vec![];

    for (step, invocation) in plan.steps() {
        eprintln!(
            "{} {} ({})",
            format!("{:>12}", step.status()).bold().green(),
            invocation.program,
            invocation.current_dir
        );
        log::debug!("{}: `{}`", step, invocation);

        let start = Instant::now();
        let outcome = match runner.run(invocation) {
            Ok(exit) => Outcome::Exited(exit),
            Err(error) => {
                Outcome::NotStarted(snafu::Report::from_error(error).to_string())
            }
        };
        let report = StepReport {
            step: *step,
            outcome,
        };

        if report.succeeded() {
            let duration = start.elapsed();
            eprintln!(
                "{} {} in {}.{:02}s",
                format!("{:>12}", "Finished").bold().green(),
                step,
                duration.as_secs(),
                duration.subsec_millis() / 10
            );
        } else {
            let reason = match &report.outcome {
                Outcome::Exited(exit) => exit.to_string(),
                Outcome::NotStarted(reason) => reason.clone(),
            };
            eprintln!(
                "{} {} ({})",
                format!("{:>12}", "FAILED").bold().bright_red(),
                step,
                reason
            );
        }

        let failed = !report.succeeded();
        steps.push(report);
        if failed && policy == FailurePolicy::Abort {
            log::info!("Aborting remaining steps after failed {}", step);
            break;
        }
    }

    let cleanup = remove_artifacts(plan.artifacts());
    for path in &cleanup.removed {
        eprintln!("{} {}", format!("{:>12}", "Removed").bold().cyan(), path);
    }

    Report { steps, cleanup }
}
