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

use std::{fs, io};

use camino::Utf8PathBuf;
use snafu::{whatever, Whatever};

/// What [`remove_artifacts`] did.
#[derive(Debug, Default)]
pub struct Cleanup {
    pub removed: Vec<Utf8PathBuf>,
    /// Paths that exist but could not be removed, with the reason.
    pub failed: Vec<(Utf8PathBuf, String)>,
}

impl Cleanup {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<Utf8PathBuf>, Whatever> {
        if let Some((path, reason)) = self.failed.first() {
            whatever!("Failed to remove {}: {}", path, reason);
        }
        Ok(self.removed)
    }
}

fn remove(path: &Utf8PathBuf) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(false);
        }
        Err(error) => return Err(error),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

/// Removes every path in `paths`: directories recursively, anything else
/// directly. Paths that do not exist are skipped. A failure on one path does
/// not stop the others from being attempted.
pub fn remove_artifacts(paths: &[Utf8PathBuf]) -> Cleanup {
    let mut cleanup = Cleanup::default();
    for path in paths {
        match remove(path) {
            Ok(true) => {
                log::info!("Removed {}", path);
                cleanup.removed.push(path.clone());
            }
            Ok(false) => log::debug!("{} does not exist", path),
            Err(error) => {
                log::warn!("Failed to remove {}: {}", path, error);
                cleanup.failed.push((path.clone(), error.to_string()));
            }
        }
    }
    cleanup
}
