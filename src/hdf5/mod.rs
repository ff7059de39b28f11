//! # HDF5 Library Layer
//!
//! Thin, owning wrappers around the raw HDF5 C API (`hdf5-sys`). Every
//! identifier the library hands out (file, group, dataset, dataspace,
//! datatype, attribute, property list, dereferenced object) is held by an
//! owning value whose `Drop` releases it, so a handle acquired on any
//! path — success or failure — is closed on every exit path. The table
//! operations above this layer never touch a raw `hid_t` they do not own.
//!
//! ## Initialisation
//!
//! The library is initialised once per process on first use. The default
//! error auto-print is disabled at the same time: instead of a registered
//! global callback (whose lifetime would have to outlive every logger),
//! the error stack of a failing call is walked synchronously by
//! [`handles::H5Error::capture`] and logged at `trace!` level.
//!
//! ## Locking
//!
//! The HDF5 C library is treated as non-thread-safe. A process-global
//! reentrant mutex serialises all library access; every public connection
//! operation holds it for its full duration. The lock is reentrant so
//! that operations may call each other (an insert probes table existence,
//! for example) without deadlocking.
//!
//! ## Module Organization
//!
//! - [`handles`]: owning wrappers and error-stack capture
//! - [`dtypes`]: datatype builders and the `#[repr(C)]` record structs
//!   exchanged with the library (column index entries, type attributes,
//!   variable-length descriptors)

pub mod dtypes;
pub mod handles;

use std::ptr;
use std::sync::Once;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

static LIBRARY_LOCK: ReentrantMutex<()> = ReentrantMutex::new(());
static LIBRARY_INIT: Once = Once::new();

/// Acquires the process-global HDF5 library lock, initialising the
/// library on first use.
pub(crate) fn library_lock() -> ReentrantMutexGuard<'static, ()> {
    let guard = LIBRARY_LOCK.lock();
    LIBRARY_INIT.call_once(|| {
        // SAFETY: plain library calls; H5open is idempotent and
        // H5Eset_auto2 with a null handler merely silences the default
        // stderr printer.
        unsafe {
            hdf5_sys::h5::H5open();
            hdf5_sys::h5e::H5Eset_auto2(hdf5_sys::h5e::H5E_DEFAULT, None, ptr::null_mut());
        }
    });
    guard
}
