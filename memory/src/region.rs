// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Contiguous ranges of simulated memory.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use snafu::{ensure, OptionExt, Snafu};

/// A fixed-width integer that can be loaded from or stored to a [`Region`]
/// in little-endian byte order.
pub trait Word: Copy + fmt::Debug + 'static {
    /// The width of the word in bytes.
    const WIDTH: usize;

    /// `bytes` must be exactly [`Word::WIDTH`] long.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// `bytes` must be exactly [`Word::WIDTH`] long.
    fn write_le_slice(self, bytes: &mut [u8]);
}

macro_rules! impl_word {
    ($($ty:ty),*) => {$(
        impl Word for $ty {
            const WIDTH: usize = size_of::<$ty>();

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buffer = [0u8; size_of::<$ty>()];
                buffer.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buffer)
            }

            fn write_le_slice(self, bytes: &mut [u8]) {
                bytes.copy_from_slice(&self.to_le_bytes());
            }
        }
    )*};
}

impl_word!(u8, u16, u32, u64);

/// The address range covered by a region. An empty range (`size == 0`)
/// contains no address and overlaps nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub base: u64,
    pub size: u64,
}

impl RegionInfo {
    /// The last address inside the region (inclusive). For an empty range
    /// this is `base`.
    pub fn last(&self) -> u64 {
        self.base.saturating_add(self.size.saturating_sub(1))
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.size > 0 && addr >= self.base && addr <= self.last()
    }

    pub fn overlaps(&self, other: &RegionInfo) -> bool {
        self.size > 0
            && other.size > 0
            && self.base <= other.last()
            && other.base <= self.last()
    }
}

impl fmt::Display for RegionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x} -> {:#018x}", self.base, self.last())
    }
}

/// Errors from creating or accessing a [`Region`].
#[derive(Debug, Snafu)]
pub enum RegionError {
    #[snafu(display("Region at {base:#x} has size zero"))]
    ZeroSize { base: u64 },
    #[snafu(display(
        "Region at {base:#x} with size {size:#x} extends past the end of the address space"
    ))]
    Wraps { base: u64, size: u64 },
    #[snafu(display(
        "Region at {base:#x} with size {size:#x} cannot be allocated on this host"
    ))]
    TooLarge { base: u64, size: u64 },
    #[snafu(display(
        "Access of {len} byte(s) at {addr:#x} is outside region [{info}]"
    ))]
    OutOfBounds {
        addr: u64,
        len: usize,
        info: RegionInfo,
    },
}

enum Backing {
    Heap(RwLock<Vec<u8>>),
    Remap(Arc<Region>),
}

/// A contiguous block of simulated memory. A region either owns its bytes
/// ([`Region::heap`]) or forwards every access to another region
/// ([`Region::remap`]).
pub struct Region {
    pub info: RegionInfo,
    backing: Backing,
}

impl Region {
    fn checked_info(base: u64, size: u64) -> Result<RegionInfo, RegionError> {
        ensure!(size > 0, ZeroSizeSnafu { base });
        ensure!(
            base.checked_add(size - 1).is_some(),
            WrapsSnafu { base, size }
        );
        Ok(RegionInfo { base, size })
    }

    /// Allocates `size` zeroed bytes mapped at `base`.
    pub fn heap(base: u64, size: u64) -> Result<Arc<Region>, RegionError> {
        let info = Self::checked_info(base, size)?;
        let length =
            usize::try_from(size).ok().context(TooLargeSnafu { base, size })?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(length)
            .ok()
            .context(TooLargeSnafu { base, size })?;
        bytes.resize(length, 0);
        Ok(Arc::new(Region {
            info,
            backing: Backing::Heap(RwLock::new(bytes)),
        }))
    }

    /// Maps `target` a second time at `base`. Writes through either region
    /// are visible through the other.
    pub fn remap(
        base: u64,
        target: &Arc<Region>,
    ) -> Result<Arc<Region>, RegionError> {
        let info = Self::checked_info(base, target.info.size)?;
        Ok(Arc::new(Region {
            info,
            backing: Backing::Remap(Arc::clone(target)),
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self.backing {
            Backing::Heap(_) => "heap",
            Backing::Remap(_) => "remap",
        }
    }

    /// Offset of `addr` into this region, provided `len` bytes starting there
    /// are in bounds.
    fn offset(&self, addr: u64, len: usize) -> Result<usize, RegionError> {
        let out_of_bounds = OutOfBoundsSnafu {
            addr,
            len,
            info: self.info,
        };
        let offset = addr.checked_sub(self.info.base).context(out_of_bounds)?;
        let end = offset.checked_add(len as u64).context(out_of_bounds)?;
        ensure!(end <= self.info.size, out_of_bounds);
        usize::try_from(offset).ok().context(out_of_bounds)
    }

    pub fn read_bytes(
        &self,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), RegionError> {
        let offset = self.offset(addr, data.len())?;
        match &self.backing {
            Backing::Heap(bytes) => {
                let bytes = bytes.read().unwrap_or_else(PoisonError::into_inner);
                data.copy_from_slice(&bytes[offset..offset + data.len()]);
                Ok(())
            }
            Backing::Remap(target) => {
                target.read_bytes(target.info.base + offset as u64, data)
            }
        }
    }

    pub fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<(), RegionError> {
        let offset = self.offset(addr, data.len())?;
        match &self.backing {
            Backing::Heap(bytes) => {
                let mut bytes =
                    bytes.write().unwrap_or_else(PoisonError::into_inner);
                bytes[offset..offset + data.len()].copy_from_slice(data);
                Ok(())
            }
            Backing::Remap(target) => {
                target.write_bytes(target.info.base + offset as u64, data)
            }
        }
    }

    pub fn read<W: Word>(&self, addr: u64) -> Result<W, RegionError> {
        let mut buffer = [0u8; 8];
        let buffer = &mut buffer[..W::WIDTH];
        self.read_bytes(addr, buffer)?;
        Ok(W::from_le_slice(buffer))
    }

    pub fn write<W: Word>(&self, addr: u64, value: W) -> Result<(), RegionError> {
        let mut buffer = [0u8; 8];
        let buffer = &mut buffer[..W::WIDTH];
        value.write_le_slice(buffer);
        self.write_bytes(addr, buffer)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("kind", &self.kind())
            .field("info", &self.info)
            .finish()
    }
}
