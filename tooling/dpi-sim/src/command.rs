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

use std::{
    borrow::Cow,
    fmt,
    process::{Command, ExitStatus},
    time::Duration,
};

use camino::Utf8PathBuf;
use indicatif::ProgressBar;
use snafu::{ResultExt, Whatever};

/// A fully-resolved subprocess: what to run, with which arguments, and where.
///
/// The working directory is per-invocation; running an invocation never
/// changes the working directory of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Utf8PathBuf,
    /// Whether output is collected (and only shown on failure) instead of
    /// inherited.
    pub capture: bool,
}

impl Invocation {
    pub fn new(
        program: impl Into<String>,
        current_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            current_dir: current_dir.into(),
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(&self.current_dir);
        command
    }
}

fn shell_quote(word: &str) -> Cow<'_, str> {
    let is_plain = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c)
        });
    if is_plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// How a subprocess finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    code: Option<i32>,
}

impl Exit {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// The process ended without an exit code, e.g. it was killed by a
    /// signal.
    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("termination by signal"),
        }
    }
}

/// Runs [`Invocation`]s. An `Err` means the process could not be run at all;
/// a process that ran and failed is an `Ok` with an unsuccessful [`Exit`].
pub trait ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Exit, Whatever>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Default)]
pub struct SystemRunner {
    /// Show a spinner while a captured invocation is running.
    pub spinner: bool,
}

impl ProcessRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Exit, Whatever> {
        log::debug!("Running `{}` in {}", invocation, invocation.current_dir);
        let mut command = invocation.to_command();

        if !invocation.capture {
            let status = command.status().whatever_context(format!(
                "Invocation of `{}` failed",
                invocation.program
            ))?;
            return Ok(status.into());
        }

        let spinner = self.spinner.then(|| {
            let spinner = ProgressBar::new_spinner()
                .with_message(invocation.program.clone());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });

        let output = command.output().whatever_context(format!(
            "Invocation of `{}` failed",
            invocation.program
        ));
        if let Some(spinner) = &spinner {
            spinner.finish_and_clear();
        }
        let output = output?;

        if !output.status.success() {
            eprintln!(
                "Invocation of {} failed with {}\n\n--- STDOUT ---\n{}\n\n--- STDERR ---\n{}",
                invocation.program,
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(output.status.into())
    }
}
