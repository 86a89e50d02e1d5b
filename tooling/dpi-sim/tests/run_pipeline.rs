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

use std::{collections::HashMap, env, fs, path::PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use dpi_sim::{
    command::{Exit, Invocation, ProcessRunner},
    config::SimConfig,
    pipeline::{self, FailurePolicy, Outcome},
    plan::{Plan, Step},
};
use snafu::{whatever, OptionExt, ResultExt, Whatever};
use tempfile::TempDir;

/// Stands in for verilator and friends: records every invocation, creates the
/// files the real tools would, and fails on request.
struct RecordingRunner {
    project: Utf8PathBuf,
    invocations: Vec<Invocation>,
    process_directories: Vec<PathBuf>,
    exits: HashMap<String, Exit>,
    unspawnable: Vec<String>,
}

impl RecordingRunner {
    fn new(project: &Utf8Path) -> Self {
        Self {
            project: project.to_path_buf(),
            invocations: vec![],
            process_directories: vec![],
            exits: HashMap::new(),
            unspawnable: vec![],
        }
    }

    fn exit_with(mut self, program: &str, code: i32) -> Self {
        self.exits.insert(program.to_string(), Exit::from_code(code));
        self
    }

    fn fail_to_spawn(mut self, program: &str) -> Self {
        self.unspawnable.push(program.to_string());
        self
    }

    fn programs(&self) -> Vec<&str> {
        self.invocations
            .iter()
            .map(|invocation| invocation.program.as_str())
            .collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Exit, Whatever> {
        self.invocations.push(invocation.clone());
        self.process_directories.push(
            env::current_dir()
                .whatever_context("Failed to read working directory")?,
        );

        if self.unspawnable.contains(&invocation.program) {
            whatever!("No such file or directory: {}", invocation.program);
        }

        match invocation.program.as_str() {
            "verilator" => {
                fs::create_dir_all(self.project.join("obj_dir"))
                    .whatever_context("Failed to fake obj_dir")?;
                fs::write(self.project.join("obj_dir/VTestModule.mk"), "")
                    .whatever_context("Failed to fake makefile")?;
            }
            "make" => fs::write(self.project.join("test"), "")
                .whatever_context("Failed to fake test binary")?,
            _ => {}
        }

        Ok(self
            .exits
            .get(&invocation.program)
            .copied()
            .unwrap_or(Exit::from_code(0)))
    }
}

/// A project directory nested one level down, so the default `..` dependency
/// directory stays inside the scratch space.
fn scratch_project() -> Result<(TempDir, Utf8PathBuf), Whatever> {
    let scratch = tempfile::tempdir()
        .whatever_context("Failed to create scratch directory")?;
    let root = Utf8Path::from_path(scratch.path())
        .whatever_context("Scratch directory is not UTF-8")?
        .canonicalize_utf8()
        .whatever_context("Failed to canonicalize scratch directory")?;
    let project = root.join("sim");
    fs::create_dir_all(&project)
        .whatever_context("Failed to create project directory")?;
    fs::write(project.join("verilator_main.cc"), "int main() {}\n")
        .whatever_context("Failed to write harness")?;
    fs::write(project.join("test.v"), "module TestModule; endmodule\n")
        .whatever_context("Failed to write design")?;
    Ok((scratch, project))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
#[snafu::report]
fn default_plan_reproduces_the_build_script() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    let plan = Plan::new(&SimConfig::default(), &project, &[])?;

    let steps = plan.steps();
    assert_eq!(steps.len(), 4);

    assert_eq!(steps[0].0, Step::BuildDependency);
    assert_eq!(
        steps[0].1,
        Invocation::new("cargo", project.join(".."))
            .args(["build", "--release"])
            .captured()
    );

    assert_eq!(steps[1].0, Step::Verilate);
    assert_eq!(steps[1].1.program, "verilator");
    assert_eq!(steps[1].1.current_dir, project);
    assert_eq!(
        steps[1].1.args,
        strings(&[
            "--cc",
            "--exe",
            "-sv",
            "-o",
            &format!("{project}/test"),
            "--vpi",
            "--top-module",
            "TestModule",
            "verilator_main.cc",
            "test.v",
            "-I.",
            &format!("{project}/../target/release/libdpi_memory.so"),
            "-CFLAGS",
            "-DVERILATOR",
            "-CFLAGS",
            "-fPIC",
            "-CFLAGS",
            &format!("-I{project}"),
            "-CFLAGS",
            &format!("-I{project}/../include"),
            "-LDFLAGS",
            &format!("-Wl,-rpath,{project}/../target/release"),
        ])
    );

    assert_eq!(steps[2].0, Step::Make);
    assert_eq!(
        steps[2].1,
        Invocation::new("make", project.clone())
            .args(["-C", "obj_dir", "-f", "VTestModule.mk"])
            .captured()
    );

    assert_eq!(steps[3].0, Step::RunTest);
    assert_eq!(
        steps[3].1,
        Invocation::new(project.join("test").as_str(), project.clone())
    );

    assert_eq!(plan.artifacts(), [project.join("test"), project.join("obj_dir")]);

    Ok(())
}

#[test]
#[snafu::report]
fn successful_run_leaves_nothing_behind() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    let plan = Plan::new(&SimConfig::default(), &project, &[])?;
    let mut runner = RecordingRunner::new(&project);
    let starting_directory =
        env::current_dir().whatever_context("Failed to read working directory")?;

    let report = pipeline::run(&plan, &mut runner, FailurePolicy::Abort);

    assert!(report.succeeded());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        runner.programs(),
        ["cargo", "verilator", "make", project.join("test").as_str()]
    );

    // the dependency is built in its own directory, every later step in the
    // project, and this process never moves
    assert_eq!(runner.invocations[0].current_dir, project.join(".."));
    for invocation in &runner.invocations[1..] {
        assert_eq!(invocation.current_dir, project);
    }
    assert!(runner
        .process_directories
        .iter()
        .all(|directory| *directory == starting_directory));

    assert!(!project.join("test").exists());
    assert!(!project.join("obj_dir").exists());
    assert_eq!(report.cleanup.removed.len(), 2);

    Ok(())
}

#[test]
#[snafu::report]
fn abort_stops_at_first_failure_but_still_cleans_up() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    let plan = Plan::new(&SimConfig::default(), &project, &[])?;
    let mut runner = RecordingRunner::new(&project).exit_with("make", 2);

    let report = pipeline::run(&plan, &mut runner, FailurePolicy::Abort);

    assert_eq!(runner.programs(), ["cargo", "verilator", "make"]);
    assert_eq!(report.steps.len(), 3);
    assert_eq!(
        report.first_failure().map(|failure| failure.step),
        Some(Step::Make)
    );
    assert_eq!(report.exit_code(), 2);

    assert!(!project.join("test").exists());
    assert!(!project.join("obj_dir").exists());

    Ok(())
}

#[test]
#[snafu::report]
fn continue_runs_everything_and_reports_the_first_failure(
) -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    let binary = project.join("test");
    let plan = Plan::new(&SimConfig::default(), &project, &[])?;
    let mut runner = RecordingRunner::new(&project)
        .exit_with("make", 2)
        .exit_with(binary.as_str(), 5);

    let report = pipeline::run(&plan, &mut runner, FailurePolicy::Continue);

    assert_eq!(runner.programs().len(), 4);
    assert_eq!(
        report
            .steps
            .iter()
            .map(|step| step.succeeded())
            .collect::<Vec<_>>(),
        [true, true, false, false]
    );
    assert_eq!(report.exit_code(), 2);
    assert!(!binary.exists());
    assert!(!project.join("obj_dir").exists());

    Ok(())
}

#[test]
#[snafu::report]
fn spawn_failure_counts_as_a_failed_step() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    // left over from an earlier interrupted run
    fs::create_dir_all(project.join("obj_dir"))
        .whatever_context("Failed to create stale obj_dir")?;

    let plan = Plan::new(&SimConfig::default(), &project, &[])?;
    let mut runner = RecordingRunner::new(&project).fail_to_spawn("cargo");

    let report = pipeline::run(&plan, &mut runner, FailurePolicy::Abort);

    assert_eq!(report.steps.len(), 1);
    assert!(matches!(
        &report.steps[0].outcome,
        Outcome::NotStarted(reason) if reason.contains("No such file")
    ));
    assert_eq!(report.exit_code(), 1);
    assert!(!project.join("obj_dir").exists());

    Ok(())
}

#[test]
#[snafu::report]
fn overrides_and_test_arguments_reach_the_commands() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    fs::write(
        project.join("dpi-sim.toml"),
        r#"
        top_module = "Core"
        verilator = "/opt/verilator/bin/verilator"
        extra_verilator_args = ["--trace"]

        [dependency]
        library = "/opt/dpi/libdpi_memory.so"
        "#,
    )
    .whatever_context("Failed to write config")?;

    let config = SimConfig::load(&project, None)?;
    let plan = Plan::new(&config, &project, &strings(&["+verbose", "--seed=3"]))?
        .skip_dependency();
    let steps = plan.steps();

    assert_eq!(steps.len(), 3);
    let verilate = &steps[0].1;
    assert_eq!(verilate.program, "/opt/verilator/bin/verilator");
    assert!(verilate.args.windows(2).any(|pair| pair == ["--top-module", "Core"]));
    assert!(verilate.args.contains(&"/opt/dpi/libdpi_memory.so".to_string()));
    assert!(verilate.args.contains(&"-Wl,-rpath,/opt/dpi".to_string()));
    assert_eq!(verilate.args.last().map(String::as_str), Some("--trace"));

    assert_eq!(steps[1].1.args, strings(&["-C", "obj_dir", "-f", "VCore.mk"]));
    assert_eq!(steps[2].1.args, strings(&["+verbose", "--seed=3"]));

    Ok(())
}

#[test]
#[snafu::report]
fn explicit_config_must_exist() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    let missing = project.join("elsewhere.toml");
    assert!(SimConfig::load(&project, Some(missing.as_path())).is_err());
    assert_eq!(SimConfig::load(&project, None)?, SimConfig::default());
    Ok(())
}

#[test]
#[snafu::report]
fn check_reports_missing_inputs() -> Result<(), Whatever> {
    let (_scratch, project) = scratch_project()?;
    let config = SimConfig::default();
    dpi_sim::plan::check(&config, &project, false)?;

    // the library has not been built
    assert!(dpi_sim::plan::check(&config, &project, true).is_err());

    fs::remove_file(project.join("test.v"))
        .whatever_context("Failed to remove design")?;
    let error = dpi_sim::plan::check(&config, &project, false)
        .err()
        .whatever_context("Missing design was accepted")?;
    assert!(error.to_string().contains("test.v"));

    Ok(())
}

#[cfg(unix)]
#[test]
#[snafu::report]
fn system_runner_propagates_the_simulation_exit_code() -> Result<(), Whatever> {
    use std::os::unix::fs::PermissionsExt;

    use dpi_sim::command::SystemRunner;

    let (_scratch, project) = scratch_project()?;
    let config = SimConfig {
        verilator: "true".into(),
        make: "true".into(),
        dependency: dpi_sim::config::DependencyConfig {
            program: "true".into(),
            ..Default::default()
        },
        ..SimConfig::default()
    };

    // stands in for the binary make would have linked
    let binary = project.join("test");
    fs::write(&binary, "#!/bin/sh\nexit 3\n")
        .whatever_context("Failed to write fake simulation")?;
    fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))
        .whatever_context("Failed to make fake simulation executable")?;

    let plan = Plan::new(&config, &project, &[])?;
    let report =
        pipeline::run(&plan, &mut SystemRunner::default(), FailurePolicy::Abort);

    assert_eq!(report.steps.len(), 4);
    assert_eq!(
        report.first_failure().map(|failure| failure.step),
        Some(Step::RunTest)
    );
    assert_eq!(report.exit_code(), 3);
    assert!(!binary.exists());

    Ok(())
}
