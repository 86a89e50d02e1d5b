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

//! Settings for a simulation run, optionally read from `dpi-sim.toml`.
//!
//! Every field defaults to the value the old build script hardcoded, so
//! a project laid out like the DPI memory test harness needs no config file
//! at all.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use snafu::{whatever, ResultExt, Whatever};

use crate::pipeline::FailurePolicy;

pub const CONFIG_FILE_NAME: &str = "dpi-sim.toml";

/// How to rebuild the DPI library before verilating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyConfig {
    /// Where the build command runs, relative to the project directory.
    pub directory: Utf8PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// The shared library produced by the build, relative to the project
    /// directory.
    pub library: Utf8PathBuf,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            directory: "..".into(),
            program: "cargo".into(),
            args: vec!["build".into(), "--release".into()],
            library: "../target/release/libdpi_memory.so".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub dependency: DependencyConfig,
    /// The name of the `verilator` executable, interpreted in some way by the
    /// OS/shell.
    pub verilator: String,
    pub make: String,
    pub top_module: String,
    /// C++ `main` driving the verilated model.
    pub harness: Utf8PathBuf,
    /// The (System)Verilog source defining the top module.
    pub design: Utf8PathBuf,
    /// Passed to verilator as `-I<dir>`.
    pub include_directory: Utf8PathBuf,
    /// Passed to the C++ compiler as `-CFLAGS -I<dir>`.
    pub cflags_include_directories: Vec<Utf8PathBuf>,
    /// Name of the simulation executable, written to the project directory.
    pub binary: String,
    /// Verilator's `--Mdir`, which verilator defaults to `obj_dir`.
    pub object_directory: Utf8PathBuf,
    pub extra_verilator_args: Vec<String>,
    pub failure_policy: FailurePolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dependency: DependencyConfig::default(),
            verilator: "verilator".into(),
            make: "make".into(),
            top_module: "TestModule".into(),
            harness: "verilator_main.cc".into(),
            design: "test.v".into(),
            include_directory: ".".into(),
            cflags_include_directories: vec![".".into(), "../include".into()],
            binary: "test".into(),
            object_directory: "obj_dir".into(),
            extra_verilator_args: vec![],
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn expect_string(key: &str, value: &toml::Value) -> Result<String, Whatever> {
    match value.as_str() {
        Some(string) => Ok(string.to_string()),
        None => whatever!(
            "Expected `{}` to be a string but found {}",
            key,
            value.type_str()
        ),
    }
}

fn expect_string_array(
    key: &str,
    value: &toml::Value,
) -> Result<Vec<String>, Whatever> {
    let Some(array) = value.as_array() else {
        whatever!(
            "Expected `{}` to be an array of strings but found {}",
            key,
            value.type_str()
        );
    };
    array
        .iter()
        .enumerate()
        .map(|(index, element)| {
            expect_string(&format!("{}[{}]", key, index), element)
        })
        .collect()
}

fn expect_table<'a>(
    key: &str,
    value: &'a toml::Value,
) -> Result<&'a toml::Table, Whatever> {
    match value.as_table() {
        Some(table) => Ok(table),
        None => whatever!(
            "Expected `{}` to be a table but found {}",
            key,
            value.type_str()
        ),
    }
}

impl SimConfig {
    /// Parses the contents of a config file. Keys that are absent keep their
    /// defaults; unknown keys are rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, Whatever> {
        let document: toml::Table = toml::from_str(contents)
            .whatever_context("Failed to parse configuration as TOML")?;

        let mut config = Self::default();
        for (key, value) in &document {
            match key.as_str() {
                "dependency" => {
                    for (inner_key, value) in expect_table(key, value)? {
                        let qualified = format!("dependency.{}", inner_key);
                        let dependency = &mut config.dependency;
                        match inner_key.as_str() {
                            "directory" => {
                                dependency.directory =
                                    expect_string(&qualified, value)?.into()
                            }
                            "program" => {
                                dependency.program =
                                    expect_string(&qualified, value)?
                            }
                            "args" => {
                                dependency.args =
                                    expect_string_array(&qualified, value)?
                            }
                            "library" => {
                                dependency.library =
                                    expect_string(&qualified, value)?.into()
                            }
                            _ => whatever!("Unknown configuration key `{}`", qualified),
                        }
                    }
                }
                "verilator" => config.verilator = expect_string(key, value)?,
                "make" => config.make = expect_string(key, value)?,
                "top_module" => config.top_module = expect_string(key, value)?,
                "harness" => config.harness = expect_string(key, value)?.into(),
                "design" => config.design = expect_string(key, value)?.into(),
                "include_directory" => {
                    config.include_directory = expect_string(key, value)?.into()
                }
                "cflags_include_directories" => {
                    config.cflags_include_directories =
                        expect_string_array(key, value)?
                            .into_iter()
                            .map(Utf8PathBuf::from)
                            .collect()
                }
                "binary" => config.binary = expect_string(key, value)?,
                "object_directory" => {
                    config.object_directory = expect_string(key, value)?.into()
                }
                "extra_verilator_args" => {
                    config.extra_verilator_args =
                        expect_string_array(key, value)?
                }
                "failure_policy" => {
                    config.failure_policy = expect_string(key, value)?
                        .parse()
                        .whatever_context("Invalid `failure_policy`")?
                }
                _ => whatever!("Unknown configuration key `{}`", key),
            }
        }

        Ok(config)
    }

    /// Loads `explicit_path` if given (it must exist), otherwise
    /// [`CONFIG_FILE_NAME`] in the project directory if present, otherwise
    /// the defaults.
    pub fn load(
        project_directory: &Utf8Path,
        explicit_path: Option<&Utf8Path>,
    ) -> Result<Self, Whatever> {
        let path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = project_directory.join(CONFIG_FILE_NAME);
                if !path.is_file() {
                    log::info!("No {} found, using defaults", path);
                    return Ok(Self::default());
                }
                path
            }
        };

        log::info!("Reading configuration from {}", path);
        let contents = fs::read_to_string(&path).whatever_context(format!(
            "Failed to read configuration file {}",
            path
        ))?;
        Self::from_toml_str(&contents).whatever_context(format!(
            "Invalid configuration file {}",
            path
        ))
    }
}
