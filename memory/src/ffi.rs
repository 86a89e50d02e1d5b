// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! C entry points imported by the simulation harness through DPI.
//!
//! Every function takes the address space by name as a NUL-terminated string
//! and returns `0` on success or `-1` on failure. Failures are reported
//! through the `log` crate since there is no other channel back to the
//! simulator.

use std::{
    ffi::CStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use libc::{c_char, c_int};
use snafu::{OptionExt, Snafu};

use crate::{
    region::{Region, RegionError},
    space::{NoSuchRegionSnafu, Space, SpaceError, SPACE_TABLE},
};

#[derive(Debug, Snafu)]
enum FfiError {
    #[snafu(display("Argument `{argument}` is null or not valid UTF-8"))]
    InvalidString { argument: &'static str },
    #[snafu(display("Output pointer is null"))]
    NullOutput,
    #[snafu(transparent)]
    Space { source: SpaceError },
    #[snafu(transparent)]
    Region { source: RegionError },
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn string_argument<'a>(
    ptr: *const c_char,
    argument: &'static str,
) -> Result<&'a str, FfiError> {
    if ptr.is_null() {
        return InvalidStringSnafu { argument }.fail();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .context(InvalidStringSnafu { argument })
}

fn lock(space: &Arc<Mutex<Space>>) -> MutexGuard<'_, Space> {
    space.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
///
/// See [`string_argument`].
unsafe fn space_argument(
    ptr: *const c_char,
) -> Result<Arc<Mutex<Space>>, FfiError> {
    let name = unsafe { string_argument(ptr, "space") }?;
    Ok(SPACE_TABLE.get_space(name))
}

fn status(operation: &str, result: Result<(), FfiError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(error) => {
            log::error!("{}: {}", operation, snafu::Report::from_error(error));
            -1
        }
    }
}

/// Maps `size` zeroed bytes at `base` as region `name` of `space`.
///
/// # Safety
///
/// `space` and `name` must each be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dpi_memory_add_heap(
    space: *const c_char,
    name: *const c_char,
    base: u64,
    size: u64,
) -> c_int {
    status(
        "dpi_memory_add_heap",
        (|| -> Result<(), FfiError> {
            let space = unsafe { space_argument(space) }?;
            let name = unsafe { string_argument(name, "name") }?;
            let region = Region::heap(base, size)?;
            lock(&space).add_region(name, &region)?;
            Ok(())
        })(),
    )
}

/// Maps the existing region `target` a second time at `base` as `name`.
///
/// # Safety
///
/// `space`, `name` and `target` must each be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dpi_memory_add_remap(
    space: *const c_char,
    name: *const c_char,
    target: *const c_char,
    base: u64,
) -> c_int {
    status(
        "dpi_memory_add_remap",
        (|| -> Result<(), FfiError> {
            let space = unsafe { space_argument(space) }?;
            let name = unsafe { string_argument(name, "name") }?;
            let target = unsafe { string_argument(target, "target") }?;
            let mut space = lock(&space);
            let target_region = space
                .region(target)
                .context(NoSuchRegionSnafu { name: target })?;
            let region = Region::remap(base, &target_region)?;
            space.add_region(name, &region)?;
            Ok(())
        })(),
    )
}

/// Unmaps region `name` from `space`.
///
/// # Safety
///
/// `space` and `name` must each be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dpi_memory_delete(
    space: *const c_char,
    name: *const c_char,
) -> c_int {
    status(
        "dpi_memory_delete",
        (|| -> Result<(), FfiError> {
            let space = unsafe { space_argument(space) }?;
            let name = unsafe { string_argument(name, "name") }?;
            lock(&space)
                .delete_region(name)
                .context(NoSuchRegionSnafu { name })?;
            Ok(())
        })(),
    )
}

macro_rules! dpi_access {
    ($read:ident, $write:ident, $ty:ty) => {
        /// # Safety
        ///
        /// `space` must be null or a NUL-terminated string, and `data` must
        /// be null or valid for writes.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $read(
            space: *const c_char,
            addr: u64,
            data: *mut $ty,
        ) -> c_int {
            status(
                stringify!($read),
                (|| -> Result<(), FfiError> {
                    let space = unsafe { space_argument(space) }?;
                    let value = lock(&space).read::<$ty>(addr)?;
                    let data =
                        unsafe { data.as_mut() }.context(NullOutputSnafu)?;
                    *data = value;
                    Ok(())
                })(),
            )
        }

        /// # Safety
        ///
        /// `space` must be null or a NUL-terminated string.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $write(
            space: *const c_char,
            addr: u64,
            data: $ty,
        ) -> c_int {
            status(
                stringify!($write),
                (|| -> Result<(), FfiError> {
                    let space = unsafe { space_argument(space) }?;
                    lock(&space).write::<$ty>(addr, data)?;
                    Ok(())
                })(),
            )
        }
    };
}

dpi_access!(dpi_memory_read_u8, dpi_memory_write_u8, u8);
dpi_access!(dpi_memory_read_u16, dpi_memory_write_u16, u16);
dpi_access!(dpi_memory_read_u32, dpi_memory_write_u32, u32);
dpi_access!(dpi_memory_read_u64, dpi_memory_write_u64, u64);
