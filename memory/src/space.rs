// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Address spaces built from non-overlapping [`Region`]s.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, LazyLock, Mutex},
};

use dashmap::DashMap;
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::region::{Region, RegionError, RegionInfo, Word};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SpaceError {
    #[snafu(display("Region name `{name}` is already in use"))]
    Renamed { name: String },
    #[snafu(display(
        "Region `{name}` [{info}] overlaps existing region `{existing}` [{existing_info}]"
    ))]
    Overlap {
        name: String,
        info: RegionInfo,
        existing: String,
        existing_info: RegionInfo,
    },
    #[snafu(display("No region named `{name}`"))]
    NoSuchRegion { name: String },
    #[snafu(display("Address {addr:#x} is not mapped to any region"))]
    Unmapped { addr: u64 },
    #[snafu(display("Failed to access region `{name}`"))]
    Access { name: String, source: RegionError },
}

/// A set of named regions, indexed by base address.
#[derive(Default)]
pub struct Space {
    regions: BTreeMap<u64, (String, Arc<Region>)>,
}

impl Space {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `region` under `name`. Fails if the name is taken or the region
    /// intersects one already in the space.
    pub fn add_region(
        &mut self,
        name: &str,
        region: &Arc<Region>,
    ) -> Result<Arc<Region>, SpaceError> {
        ensure!(
            !self.regions.values().any(|(existing, _)| existing == name),
            RenamedSnafu { name }
        );
        if let Some((existing, other)) = self
            .regions
            .values()
            .find(|(_, other)| other.info.overlaps(&region.info))
        {
            return OverlapSnafu {
                name,
                info: region.info,
                existing,
                existing_info: other.info,
            }
            .fail();
        }

        self.regions
            .insert(region.info.base, (name.to_string(), Arc::clone(region)));
        Ok(Arc::clone(region))
    }

    /// Unmaps the region called `name`, returning it if it existed.
    pub fn delete_region(&mut self, name: &str) -> Option<Arc<Region>> {
        let base = self
            .regions
            .iter()
            .find_map(|(base, (existing, _))| (existing == name).then_some(*base))?;
        self.regions.remove(&base).map(|(_, region)| region)
    }

    pub fn region(&self, name: &str) -> Option<Arc<Region>> {
        self.regions
            .values()
            .find(|(existing, _)| existing == name)
            .map(|(_, region)| Arc::clone(region))
    }

    /// The region whose address range contains `addr`.
    pub fn region_at(
        &self,
        addr: u64,
    ) -> Result<(&str, &Arc<Region>), SpaceError> {
        self.regions
            .range(..=addr)
            .next_back()
            .filter(|(_, (_, region))| region.info.contains(addr))
            .map(|(_, (name, region))| (name.as_str(), region))
            .context(UnmappedSnafu { addr })
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &Arc<Region>)> {
        self.regions
            .values()
            .map(|(name, region)| (name.as_str(), region))
    }

    pub fn read<W: Word>(&self, addr: u64) -> Result<W, SpaceError> {
        let (name, region) = self.region_at(addr)?;
        region.read(addr).context(AccessSnafu { name })
    }

    pub fn write<W: Word>(&self, addr: u64, value: W) -> Result<(), SpaceError> {
        let (name, region) = self.region_at(addr)?;
        region.write(addr, value).context(AccessSnafu { name })
    }

    /// Byte accesses must stay inside the single region containing `addr`.
    pub fn read_bytes(
        &self,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), SpaceError> {
        let (name, region) = self.region_at(addr)?;
        region.read_bytes(addr, data).context(AccessSnafu { name })
    }

    pub fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<(), SpaceError> {
        let (name, region) = self.region_at(addr)?;
        region.write_bytes(addr, data).context(AccessSnafu { name })
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "regions:")?;
        for (name, region) in self.regions() {
            writeln!(
                f,
                "   {:<10}({:^7})  : {}",
                name,
                region.kind(),
                region.info
            )?;
        }
        Ok(())
    }
}

/// Process-wide registry of named spaces. Spaces are created on first lookup
/// and live until the process exits.
#[derive(Default)]
pub struct SpaceTable {
    spaces: DashMap<String, Arc<Mutex<Space>>>,
}

impl SpaceTable {
    pub fn get_space(&self, name: &str) -> Arc<Mutex<Space>> {
        self.spaces
            .entry(name.to_string())
            .or_insert_with(|| {
                log::info!("Creating address space `{}`", name);
                Arc::new(Mutex::new(Space::new()))
            })
            .value()
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.spaces.contains_key(name)
    }
}

pub static SPACE_TABLE: LazyLock<SpaceTable> = LazyLock::new(SpaceTable::default);
