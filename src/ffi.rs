//! Thin C-ABI shim (spec §6, out-of-scope consumer surface kept only as a
//! thin translation layer).
//!
//! Grounded on `original_source/src/rtl/sdmlib.{h,cpp}`: the original itself
//! is a thin wrapper translating a handle-based C API onto the C++
//! `database`/`manifold` classes, returning `sdm_status` integers. This
//! module does the same translation for [`crate::store::Store`], nothing
//! more — no argument parsing, no line tokenizing, no CLI. Feature-gated
//! behind `ffi` since spec.md scopes the CLI/tokenizer/GUI consumers that
//! would actually call this out entirely.

#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, CStr};
use std::ptr;

use crate::config::StoreOptions;
use crate::error::Status;
use crate::store::Store;
use crate::{learn, query};

/// Opaque handle returned to C callers. Never dereferenced by them.
pub struct SdmHandle(Store);

unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Result<&'a str, Status> {
    if ptr.is_null() {
        return Err(Status::Runtime);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| Status::Runtime)
}

/// Open (or create) a store at `path`. Returns a handle on success, or null
/// and writes the failure status to `out_status`.
///
/// # Safety
/// `path` must be a valid, NUL-terminated C string. `out_status` must be a
/// valid pointer to a writable `i32`, or null if the caller doesn't care.
#[no_mangle]
pub unsafe extern "C" fn sdm_open(
    path: *const c_char,
    out_status: *mut i32,
) -> *mut SdmHandle {
    let result = (|| -> Result<SdmHandle, Status> {
        let path = unsafe { cstr_to_str(path) }?;
        Store::open(path, StoreOptions::default())
            .map(SdmHandle)
            .map_err(|e| Status::from(&e))
    })();

    match result {
        Ok(handle) => {
            if !out_status.is_null() {
                unsafe { *out_status = Status::Ok as i32 };
            }
            Box::into_raw(Box::new(handle))
        }
        Err(status) => {
            if !out_status.is_null() {
                unsafe { *out_status = status as i32 };
            }
            ptr::null_mut()
        }
    }
}

/// Close and free a handle opened with [`sdm_open`].
///
/// # Safety
/// `handle` must be a pointer returned by [`sdm_open`] and not already
/// freed.
#[no_mangle]
pub unsafe extern "C" fn sdm_close(handle: *mut SdmHandle) -> i32 {
    if handle.is_null() {
        return Status::Runtime as i32;
    }
    let boxed = unsafe { Box::from_raw(handle) };
    match boxed.0.close() {
        Ok(()) => Status::Ok as i32,
        Err(e) => Status::from(&e) as i32,
    }
}

/// Ensure a named vector exists. Returns `Created`/`Existed`/an error
/// status.
///
/// # Safety
/// `handle` must be a live pointer from [`sdm_open`]; `space` and `name`
/// must be valid NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn sdm_named_vector(
    handle: *const SdmHandle,
    space: *const c_char,
    name: *const c_char,
) -> i32 {
    let Some(store) = (unsafe { handle.as_ref() }) else {
        return Status::Runtime as i32;
    };
    let result = (|| -> Result<Status, Status> {
        let space = unsafe { cstr_to_str(space) }?;
        let name = unsafe { cstr_to_str(name) }?;
        learn::named_vector(&store.0, space, name)
            .map(Status::from)
            .map_err(|e| Status::from(&e))
    })();
    result.unwrap_or_else(|s| s) as i32
}

/// Learn `source` into `target`, rotated by `shift`. Both names are
/// resolved within the same `space` — the full cross-space form lives at
/// [`learn::superpose`] for in-process Rust callers.
///
/// # Safety
/// Same pointer requirements as [`sdm_named_vector`].
#[no_mangle]
pub unsafe extern "C" fn sdm_superpose(
    handle: *const SdmHandle,
    space: *const c_char,
    target: *const c_char,
    source: *const c_char,
    shift: u32,
) -> i32 {
    let Some(store) = (unsafe { handle.as_ref() }) else {
        return Status::Runtime as i32;
    };
    let result = (|| -> Result<Status, Status> {
        let space = unsafe { cstr_to_str(space) }?;
        let target = unsafe { cstr_to_str(target) }?;
        let source = unsafe { cstr_to_str(source) }?;
        learn::superpose(&store.0, space, target, space, source, shift)
            .map(Status::from)
            .map_err(|e| Status::from(&e))
    })();
    result.unwrap_or_else(|s| s) as i32
}

/// Forget `source` from `target`, rotated by `shift`, both within `space`.
///
/// # Safety
/// Same pointer requirements as [`sdm_named_vector`].
#[no_mangle]
pub unsafe extern "C" fn sdm_subtract(
    handle: *const SdmHandle,
    space: *const c_char,
    target: *const c_char,
    source: *const c_char,
    shift: u32,
) -> i32 {
    let Some(store) = (unsafe { handle.as_ref() }) else {
        return Status::Runtime as i32;
    };
    let result = (|| -> Result<(), Status> {
        let space = unsafe { cstr_to_str(space) }?;
        let target = unsafe { cstr_to_str(target) }?;
        let source = unsafe { cstr_to_str(source) }?;
        learn::subtract(&store.0, space, target, space, source, shift)
            .map_err(|e| Status::from(&e))
    })();
    match result {
        Ok(()) => Status::Ok as i32,
        Err(s) => s as i32,
    }
}

/// Write `out_similarity` with the similarity of `a` and `b` in `space`.
///
/// # Safety
/// Same pointer requirements as [`sdm_named_vector`], plus `out_similarity`
/// must be a valid pointer to a writable `f64`.
#[no_mangle]
pub unsafe extern "C" fn sdm_similarity(
    handle: *const SdmHandle,
    space: *const c_char,
    a: *const c_char,
    b: *const c_char,
    out_similarity: *mut f64,
) -> i32 {
    let Some(store) = (unsafe { handle.as_ref() }) else {
        return Status::Runtime as i32;
    };
    let result = (|| -> Result<f64, Status> {
        let space = unsafe { cstr_to_str(space) }?;
        let a = unsafe { cstr_to_str(a) }?;
        let b = unsafe { cstr_to_str(b) }?;
        query::similarity(&store.0, space, a, b).map_err(|e| Status::from(&e))
    })();
    match result {
        Ok(sim) => {
            if !out_similarity.is_null() {
                unsafe { *out_similarity = sim };
            }
            Status::Ok as i32
        }
        Err(s) => s as i32,
    }
}
