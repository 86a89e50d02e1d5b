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

//! Turns a [`SimConfig`] into the ordered list of subprocesses that build and
//! run the simulation.

// hardcoded knowledge:
// - verilator names the generated makefile V${top_module}.mk
// - make runs inside the object directory, so anything the compiler or linker
//   sees must be an absolute path

use std::fmt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use snafu::{whatever, Whatever};

use crate::{command::Invocation, config::SimConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BuildDependency,
    Verilate,
    Make,
    RunTest,
}

impl Step {
    /// Cargo-style status verb shown while the step runs.
    pub fn status(&self) -> &'static str {
        match self {
            Step::BuildDependency => "Building",
            Step::Verilate => "Verilating",
            Step::Make => "Compiling",
            Step::RunTest => "Running",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::BuildDependency => "dependency build",
            Step::Verilate => "verilator",
            Step::Make => "make",
            Step::RunTest => "simulation",
        })
    }
}

/// Joins relative paths onto the project directory, dropping `.` components.
fn resolve(project_directory: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let mut resolved = project_directory.to_path_buf();
    for component in path.components() {
        if component != Utf8Component::CurDir {
            resolved.push(component);
        }
    }
    resolved
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct Plan {
    steps: Vec<(Step, Invocation)>,
    artifacts: Vec<Utf8PathBuf>,
}

impl Plan {
    /// `project_directory` should be absolute; it is where verilator, make,
    /// and the simulation run. `test_args` are forwarded to the simulation
    /// binary.
    pub fn new(
        config: &SimConfig,
        project_directory: &Utf8Path,
        test_args: &[String],
    ) -> Result<Self, Whatever> {
        if !is_identifier(&config.top_module) {
            whatever!(
                "Top module name `{}` is not a plain identifier",
                config.top_module
            );
        }
        if config.binary.is_empty() || config.binary.contains('/') {
            whatever!(
                "Binary name `{}` must be a non-empty file name",
                config.binary
            );
        }

        let library = resolve(project_directory, &config.dependency.library);
        let Some(library_directory) = library.parent() else {
            whatever!("Library path {} has no parent directory", library);
        };
        let binary = project_directory.join(&config.binary);

        let build_dependency = Invocation::new(
            &config.dependency.program,
            resolve(project_directory, &config.dependency.directory),
        )
        .args(&config.dependency.args)
        .captured();

        let mut verilate = Invocation::new(&config.verilator, project_directory)
            .args(["--cc", "--exe", "-sv", "-o"])
            .arg(binary.as_str())
            .args(["--vpi", "--top-module"])
            .arg(&config.top_module)
            .arg(config.harness.as_str())
            .arg(config.design.as_str())
            .arg(format!("-I{}", config.include_directory))
            .arg(library.as_str())
            .args(["-CFLAGS", "-DVERILATOR", "-CFLAGS", "-fPIC"]);
        for include in &config.cflags_include_directories {
            verilate = verilate
                .arg("-CFLAGS")
                .arg(format!("-I{}", resolve(project_directory, include)));
        }
        let verilate = verilate
            .arg("-LDFLAGS")
            .arg(format!("-Wl,-rpath,{}", library_directory))
            .args(&config.extra_verilator_args)
            .captured();

        let make = Invocation::new(&config.make, project_directory)
            .arg("-C")
            .arg(config.object_directory.as_str())
            .arg("-f")
            .arg(format!("V{}.mk", config.top_module))
            .captured();

        let run_test =
            Invocation::new(binary.as_str(), project_directory).args(test_args);

        Ok(Self {
            steps: vec![
                (Step::BuildDependency, build_dependency),
                (Step::Verilate, verilate),
                (Step::Make, make),
                (Step::RunTest, run_test),
            ],
            artifacts: vec![
                binary,
                resolve(project_directory, &config.object_directory),
            ],
        })
    }

    /// Drops the dependency build, for when the library is already up to
    /// date.
    pub fn skip_dependency(mut self) -> Self {
        self.steps.retain(|(step, _)| *step != Step::BuildDependency);
        self
    }

    pub fn steps(&self) -> &[(Step, Invocation)] {
        &self.steps
    }

    /// Everything the plan leaves on disk, removed once it finishes.
    pub fn artifacts(&self) -> &[Utf8PathBuf] {
        &self.artifacts
    }
}

/// Checks that the inputs the plan depends on exist before anything runs.
pub fn check(
    config: &SimConfig,
    project_directory: &Utf8Path,
    skip_dependency: bool,
) -> Result<(), Whatever> {
    if !is_identifier(&config.top_module) {
        whatever!(
            "Top module name `{}` is not a plain identifier",
            config.top_module
        );
    }

    for (what, path) in [
        ("Harness", &config.harness),
        ("Design", &config.design),
    ] {
        let path = resolve(project_directory, path);
        if !path.is_file() {
            whatever!("{} {} does not exist or is not a file", what, path);
        }
    }

    if skip_dependency {
        let library = resolve(project_directory, &config.dependency.library);
        if !library.is_file() {
            whatever!(
                "Library {} does not exist and the dependency build is skipped",
                library
            );
        }
    } else {
        let directory =
            resolve(project_directory, &config.dependency.directory);
        if !directory.is_dir() {
            whatever!(
                "Dependency directory {} does not exist or is not a directory",
                directory
            );
        }
    }

    Ok(())
}
