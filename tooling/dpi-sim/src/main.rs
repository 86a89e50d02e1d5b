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

use std::{env::current_dir, process::ExitCode};

use argh::FromArgs;
use camino::Utf8PathBuf;
use dpi_sim::{
    artifacts::remove_artifacts,
    command::SystemRunner,
    config::SimConfig,
    pipeline::{self, FailurePolicy},
    plan::{self, Plan},
};
use owo_colors::OwoColorize;
use snafu::{ResultExt, Whatever};

/// Build, run, and clean up a Verilator simulation linked against
/// libdpi_memory
#[derive(FromArgs)]
struct DpiSimCommand {
    /// the directory holding the harness and design (defaults to the current
    /// directory)
    #[argh(option, short = 'C')]
    project: Option<Utf8PathBuf>,

    /// a configuration file to use instead of dpi-sim.toml in the project
    /// directory
    #[argh(option)]
    config: Option<Utf8PathBuf>,

    /// log progress at info level (RUST_LOG takes precedence)
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    subcommand: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Run(RunSubcommand),
    Plan(PlanSubcommand),
    Clean(CleanSubcommand),
    Check(CheckSubcommand),
}

/// rebuild the library, verilate, compile, and run the simulation, then clean
/// up
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunSubcommand {
    /// use the library as it is instead of rebuilding it first
    #[argh(switch)]
    skip_dependency: bool,

    /// keep running later steps after one fails
    #[argh(switch)]
    keep_going: bool,

    /// override the top module name
    #[argh(option)]
    top_module: Option<String>,

    /// override the verilator executable
    #[argh(option)]
    verilator: Option<String>,

    /// override the make executable
    #[argh(option)]
    make: Option<String>,

    /// arguments forwarded to the simulation binary (after `--`)
    #[argh(positional)]
    test_args: Vec<String>,
}

/// print the commands `run` would execute without executing them
#[derive(FromArgs)]
#[argh(subcommand, name = "plan")]
struct PlanSubcommand {
    /// leave out the library rebuild
    #[argh(switch)]
    skip_dependency: bool,
}

/// remove the simulation binary and verilator's object directory
#[derive(FromArgs)]
#[argh(subcommand, name = "clean")]
struct CleanSubcommand {}

/// check that the configuration and input files are usable
#[derive(FromArgs)]
#[argh(subcommand, name = "check")]
struct CheckSubcommand {
    /// require the library to exist already instead of the dependency
    /// directory
    #[argh(switch)]
    skip_dependency: bool,
}

fn project_directory(
    project: Option<Utf8PathBuf>,
) -> Result<Utf8PathBuf, Whatever> {
    let directory = match project {
        Some(project) => project,
        None => Utf8PathBuf::from_path_buf(
            current_dir()
                .whatever_context("Failed to determine current directory")?,
        )
        .map_err(|_| "?")
        .whatever_context("Failed to parse current directory as UTF-8")?,
    };
    directory.canonicalize_utf8().whatever_context(format!(
        "Failed to resolve project directory {}",
        directory
    ))
}

fn execute(command: DpiSimCommand) -> Result<u8, Whatever> {
    let project = project_directory(command.project)?;
    let mut config = SimConfig::load(&project, command.config.as_deref())?;

    match command.subcommand {
        Subcommand::Run(run) => {
            if let Some(top_module) = run.top_module {
                config.top_module = top_module;
            }
            if let Some(verilator) = run.verilator {
                config.verilator = verilator;
            }
            if let Some(make) = run.make {
                config.make = make;
            }
            if run.keep_going {
                config.failure_policy = FailurePolicy::Continue;
            }

            plan::check(&config, &project, run.skip_dependency)?;
            let mut plan = Plan::new(&config, &project, &run.test_args)?;
            if run.skip_dependency {
                plan = plan.skip_dependency();
            }

            log::info!(
                "Running {} step(s) with failure policy `{}`",
                plan.steps().len(),
                config.failure_policy
            );
            let mut runner = SystemRunner { spinner: true };
            let report = pipeline::run(&plan, &mut runner, config.failure_policy);

            let code = report.exit_code();
            match report.failure_summary() {
                None => eprintln!(
                    "{} simulation of {}",
                    format!("{:>12}", "PASSED").bold().bright_green(),
                    config.top_module
                ),
                Some(summary) => eprintln!(
                    "{} simulation of {}: {} (exiting with {})",
                    format!("{:>12}", "FAILED").bold().bright_red(),
                    config.top_module,
                    summary,
                    code
                ),
            }
            Ok(code)
        }
        Subcommand::Plan(options) => {
            let mut plan = Plan::new(&config, &project, &[])?;
            if options.skip_dependency {
                plan = plan.skip_dependency();
            }
            for (step, invocation) in plan.steps() {
                println!("# {} (in {})", step, invocation.current_dir);
                println!("{}", invocation);
            }
            for artifact in plan.artifacts() {
                println!("# afterwards: remove {}", artifact);
            }
            Ok(0)
        }
        Subcommand::Clean(_clean_subcommand) => {
            let plan = Plan::new(&config, &project, &[])?;
            let removed = remove_artifacts(plan.artifacts()).into_result()?;
            if removed.is_empty() {
                println!("Nothing to clean");
            }
            for path in removed {
                println!("{} {}", format!("{:>12}", "Removed").bold().cyan(), path);
            }
            Ok(0)
        }
        Subcommand::Check(options) => {
            Plan::new(&config, &project, &[])?;
            plan::check(&config, &project, options.skip_dependency)?;
            println!("Everything looks good!");
            Ok(0)
        }
    }
}

/// Renders `error` and its causes as one block without a trailing newline.
fn error_message(error: Whatever) -> String {
    let report = snafu::Report::from_error(error).to_string();
    format!("Error: {}", report.trim_end())
}

fn main() -> ExitCode {
    let command: DpiSimCommand = argh::from_env();

    let default_level = if command.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    )
    .init();

    match execute(command) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("{}", error_message(error));
            ExitCode::FAILURE
        }
    }
}
