//! # Owning Handle Wrappers
//!
//! One owning type per HDF5 identifier class. Construction validates the
//! raw id (negative means failure, in which case the library error stack
//! is captured and logged); `Drop` releases the id with the matching
//! close call. Close failures on the unwind path are logged at `trace!`
//! and swallowed — they never override the primary error.
//!
//! The wrappers are deliberately thin: they expose exactly the calls the
//! table layout needs, take and return raw `hid_t` only where a borrowed
//! location id is required (`H5S_ALL`, a parent file id), and leave
//! buffer-shape reasoning to the caller. Bulk `read`/`write` are `unsafe`
//! because the library trusts the caller that the buffer matches the
//! selection.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_uint, c_void};
use std::path::Path;
use std::ptr;

use hdf5_sys::h5::{herr_t, hsize_t};
use hdf5_sys::h5a::{
    H5Aclose, H5Acreate2, H5Aget_space, H5Aget_type, H5Aopen, H5Aread, H5Awrite,
};
use hdf5_sys::h5d::{
    H5Dclose, H5Dcreate2, H5Dget_space, H5Dget_type, H5Dopen2, H5Dread, H5Dset_extent,
    H5Dvlen_reclaim, H5Dwrite,
};
use hdf5_sys::h5e::{
    H5E_direction_t, H5E_error2_t, H5Eclose_stack, H5Eget_current_stack, H5Eget_msg, H5Ewalk2,
};
use hdf5_sys::h5f::{
    H5Fclose, H5Fcreate, H5Fflush, H5Fis_hdf5, H5Fopen, H5F_scope_t, H5F_ACC_EXCL, H5F_ACC_RDWR,
};
use hdf5_sys::h5g::{H5Gclose, H5Gcreate2, H5Gopen2};
use hdf5_sys::h5i::{hid_t, H5I_type_t, H5Iget_type};
use hdf5_sys::h5o::H5Oclose;
use hdf5_sys::h5p::{H5Pclose, H5Pcreate, H5Pset_chunk, H5P_DATASET_CREATE, H5P_DEFAULT};
use hdf5_sys::h5r::{hobj_ref_t, H5R_type_t, H5Rcreate, H5Rdereference2};
use hdf5_sys::h5s::{
    H5S_seloper_t, H5Sclose, H5Screate_simple, H5Sget_simple_extent_dims,
    H5Sget_simple_extent_ndims, H5Sselect_elements, H5Sselect_hyperslab,
};
use hdf5_sys::h5t::{
    H5T_class_t, H5Tclose, H5Tcommit2, H5Tcopy, H5Tcreate, H5Tinsert, H5Tset_size, H5Tset_tag,
    H5Tvlen_create, H5T_VARIABLE,
};
use tracing::trace;

use crate::config::constants::ERR_MSG_SIZE_MAX;
use crate::error::TdbError;

/// Marker for a failed HDF5 library call.
///
/// Constructing one via [`H5Error::capture`] walks the library error
/// stack and logs each frame at `trace!`. The marker is then mapped to a
/// [`TdbError`] at the call site, attaching the operation-level message.
#[derive(Debug)]
pub struct H5Error;

impl H5Error {
    /// Captures and logs the pending library error stack.
    pub(crate) fn capture() -> Self {
        // SAFETY: H5Eget_current_stack transfers ownership of the stack,
        // which is released below; the walk only reads it.
        unsafe {
            let stack = H5Eget_current_stack();
            if stack >= 0 {
                H5Ewalk2(
                    stack,
                    H5E_direction_t::H5E_WALK_DOWNWARD,
                    Some(error_walk_cb),
                    ptr::null_mut(),
                );
                H5Eclose_stack(stack);
            }
        }
        H5Error
    }

    /// A failure that did not come from the library (no stack to walk).
    pub(crate) fn silent() -> Self {
        H5Error
    }

    /// Logs `msg` at error level and converts to `GeneralError`.
    pub(crate) fn general(self, msg: &str) -> TdbError {
        tracing::error!("{msg}");
        TdbError::GeneralError
    }

    /// Logs `msg` at error level and converts to `IoError`.
    pub(crate) fn io(self, msg: &str) -> TdbError {
        tracing::error!("{msg}");
        TdbError::IoError
    }
}

extern "C" fn error_walk_cb(
    n: c_uint,
    err_desc: *const H5E_error2_t,
    _client_data: *mut c_void,
) -> herr_t {
    if err_desc.is_null() {
        return -1;
    }
    // SAFETY: the library hands us a valid frame for the duration of the
    // callback; the message buffers are NUL-terminated by H5Eget_msg.
    unsafe {
        let err = &*err_desc;

        let mut maj_msg = [0 as c_char; ERR_MSG_SIZE_MAX];
        if H5Eget_msg(err.maj_num, ptr::null_mut(), maj_msg.as_mut_ptr(), ERR_MSG_SIZE_MAX) < 0 {
            return -1;
        }
        let mut min_msg = [0 as c_char; ERR_MSG_SIZE_MAX];
        if H5Eget_msg(err.min_num, ptr::null_mut(), min_msg.as_mut_ptr(), ERR_MSG_SIZE_MAX) < 0 {
            return -1;
        }

        let func = if err.func_name.is_null() {
            "?".into()
        } else {
            CStr::from_ptr(err.func_name).to_string_lossy()
        };
        trace!(
            "HDF5 error[{n}]: {func} - {}: {}",
            CStr::from_ptr(maj_msg.as_ptr()).to_string_lossy(),
            CStr::from_ptr(min_msg.as_ptr()).to_string_lossy()
        );
    }
    0
}

fn to_cstring(s: &str) -> Result<CString, H5Error> {
    CString::new(s).map_err(|_| H5Error::silent())
}

fn path_to_cstring(path: &Path) -> Result<CString, H5Error> {
    CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| H5Error::silent())
}

fn check(id: hid_t) -> Result<hid_t, H5Error> {
    if id < 0 {
        Err(H5Error::capture())
    } else {
        Ok(id)
    }
}

fn check_err(status: herr_t) -> Result<(), H5Error> {
    if status < 0 {
        Err(H5Error::capture())
    } else {
        Ok(())
    }
}

macro_rules! owning_handle {
    ($(#[$attr:meta])* $name:ident, $close:ident, $what:expr) => {
        $(#[$attr])*
        #[derive(Debug)]
        pub struct $name(hid_t);

        impl $name {
            pub(crate) fn from_raw(id: hid_t) -> Result<Self, H5Error> {
                check(id).map(Self)
            }

            pub fn id(&self) -> hid_t {
                self.0
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                // SAFETY: self.0 is a valid, owned identifier.
                if unsafe { $close(self.0) } < 0 {
                    trace!(concat!("error while cleaning up ", $what));
                }
            }
        }
    };
}

owning_handle!(
    /// An open table file. Connections cache one per table.
    FileHandle, H5Fclose, "file handle"
);
owning_handle!(
    /// A group, such as `/meta`.
    Group, H5Gclose, "group"
);
owning_handle!(
    /// A dataset opened or created by path.
    Dataset, H5Dclose, "dataset"
);
owning_handle!(
    /// A dataspace (file- or memory-side extent plus selection).
    Dataspace, H5Sclose, "data space"
);
owning_handle!(
    /// A (possibly committed) datatype.
    Datatype, H5Tclose, "datatype"
);
owning_handle!(
    /// An attribute on a group or dataset.
    Attribute, H5Aclose, "attribute"
);
owning_handle!(
    /// A property list.
    PropertyList, H5Pclose, "property list"
);
owning_handle!(
    /// An object obtained by dereferencing an object reference; released
    /// through the generic object close.
    ObjectHandle, H5Oclose, "dereferenced object"
);

impl FileHandle {
    /// Creates a new file, failing if it already exists.
    pub fn create_exclusive(path: &Path) -> Result<Self, H5Error> {
        let cpath = path_to_cstring(path)?;
        // SAFETY: cpath is NUL-terminated; default property lists.
        Self::from_raw(unsafe {
            H5Fcreate(cpath.as_ptr(), H5F_ACC_EXCL, H5P_DEFAULT, H5P_DEFAULT)
        })
    }

    /// Opens an existing file for reading and writing.
    pub fn open_read_write(path: &Path) -> Result<Self, H5Error> {
        let cpath = path_to_cstring(path)?;
        // SAFETY: cpath is NUL-terminated; default property list.
        Self::from_raw(unsafe { H5Fopen(cpath.as_ptr(), H5F_ACC_RDWR, H5P_DEFAULT) })
    }

    /// Flushes this file's buffers to disk.
    pub fn flush_local(&self) -> Result<(), H5Error> {
        // SAFETY: self.0 is a valid file id.
        check_err(unsafe { H5Fflush(self.0, H5F_scope_t::H5F_SCOPE_LOCAL) })
    }
}

/// Checks whether `path` carries the HDF5 signature.
pub fn is_hdf5_file(path: &Path) -> Result<bool, H5Error> {
    let cpath = path_to_cstring(path)?;
    // SAFETY: cpath is NUL-terminated.
    let status = unsafe { H5Fis_hdf5(cpath.as_ptr()) };
    if status < 0 {
        Err(H5Error::capture())
    } else {
        Ok(status > 0)
    }
}

impl Group {
    pub fn create(loc: hid_t, name: &str) -> Result<Self, H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: cname is NUL-terminated; default property lists.
        Self::from_raw(unsafe {
            H5Gcreate2(loc, cname.as_ptr(), H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        })
    }

    pub fn open(loc: hid_t, name: &str) -> Result<Self, H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: cname is NUL-terminated.
        Self::from_raw(unsafe { H5Gopen2(loc, cname.as_ptr(), H5P_DEFAULT) })
    }
}

impl Dataset {
    pub fn create(
        loc: hid_t,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
        create_plist: &PropertyList,
    ) -> Result<Self, H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: all ids are valid owned handles; cname is NUL-terminated.
        Self::from_raw(unsafe {
            H5Dcreate2(
                loc,
                cname.as_ptr(),
                dtype.id(),
                space.id(),
                H5P_DEFAULT,
                create_plist.id(),
                H5P_DEFAULT,
            )
        })
    }

    pub fn open(loc: hid_t, name: &str) -> Result<Self, H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: cname is NUL-terminated.
        Self::from_raw(unsafe { H5Dopen2(loc, cname.as_ptr(), H5P_DEFAULT) })
    }

    pub fn space(&self) -> Result<Dataspace, H5Error> {
        // SAFETY: self.0 is a valid dataset id.
        Dataspace::from_raw(unsafe { H5Dget_space(self.0) })
    }

    pub fn dtype(&self) -> Result<Datatype, H5Error> {
        // SAFETY: self.0 is a valid dataset id.
        Datatype::from_raw(unsafe { H5Dget_type(self.0) })
    }

    /// Reads through the given memory/file selections into `buf`.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for writes of the full memory selection in the
    /// given memory type.
    pub unsafe fn read(
        &self,
        mem_type: hid_t,
        mem_space: hid_t,
        file_space: hid_t,
        buf: *mut c_void,
    ) -> Result<(), H5Error> {
        check_err(H5Dread(self.0, mem_type, mem_space, file_space, H5P_DEFAULT, buf))
    }

    /// Writes `buf` through the given memory/file selections.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for reads of the full memory selection in the
    /// given memory type; variable-length descriptors inside it must
    /// point at live buffers.
    pub unsafe fn write(
        &self,
        mem_type: hid_t,
        mem_space: hid_t,
        file_space: hid_t,
        buf: *const c_void,
    ) -> Result<(), H5Error> {
        check_err(H5Dwrite(self.0, mem_type, mem_space, file_space, H5P_DEFAULT, buf))
    }
}

/// Object-level operations shared by datasets reached through references.
impl ObjectHandle {
    /// Resolves an object reference relative to an open file.
    pub fn dereference(file: hid_t, reference: hobj_ref_t) -> Result<Self, H5Error> {
        // SAFETY: the reference is passed by pointer and only read.
        Self::from_raw(unsafe {
            H5Rdereference2(
                file,
                H5P_DEFAULT,
                H5R_type_t::H5R_OBJECT,
                &reference as *const hobj_ref_t as *const c_void,
            )
        })
    }

    /// True iff the dereferenced object is a dataset.
    pub fn is_dataset(&self) -> bool {
        // SAFETY: self.0 is a valid object id.
        unsafe { H5Iget_type(self.0) == H5I_type_t::H5I_DATASET }
    }

    pub fn space(&self) -> Result<Dataspace, H5Error> {
        // SAFETY: self.0 is a valid dataset-object id.
        Dataspace::from_raw(unsafe { H5Dget_space(self.0) })
    }

    pub fn dtype(&self) -> Result<Datatype, H5Error> {
        // SAFETY: self.0 is a valid dataset-object id.
        Datatype::from_raw(unsafe { H5Dget_type(self.0) })
    }

    /// Changes the extent of the underlying chunked dataset.
    pub fn set_extent(&self, dims: &[hsize_t]) -> Result<(), H5Error> {
        // SAFETY: dims matches the dataset rank (checked by the library).
        check_err(unsafe { H5Dset_extent(self.0, dims.as_ptr()) })
    }

    /// See [`Dataset::read`].
    ///
    /// # Safety
    ///
    /// As for [`Dataset::read`].
    pub unsafe fn read(
        &self,
        mem_type: hid_t,
        mem_space: hid_t,
        file_space: hid_t,
        buf: *mut c_void,
    ) -> Result<(), H5Error> {
        check_err(H5Dread(self.0, mem_type, mem_space, file_space, H5P_DEFAULT, buf))
    }

    /// See [`Dataset::write`].
    ///
    /// # Safety
    ///
    /// As for [`Dataset::write`].
    pub unsafe fn write(
        &self,
        mem_type: hid_t,
        mem_space: hid_t,
        file_space: hid_t,
        buf: *const c_void,
    ) -> Result<(), H5Error> {
        check_err(H5Dwrite(self.0, mem_type, mem_space, file_space, H5P_DEFAULT, buf))
    }
}

/// Creates an object reference to the object at `name` within `loc`.
pub fn object_reference(loc: hid_t, name: &str) -> Result<hobj_ref_t, H5Error> {
    let cname = to_cstring(name)?;
    let mut reference: hobj_ref_t = 0;
    // SAFETY: reference receives exactly one hobj_ref_t; the space id is
    // unused for object references.
    check_err(unsafe {
        H5Rcreate(
            &mut reference as *mut hobj_ref_t as *mut c_void,
            loc,
            cname.as_ptr(),
            H5R_type_t::H5R_OBJECT,
            -1,
        )
    })?;
    Ok(reference)
}

impl Dataspace {
    /// Creates a simple dataspace; `maxdims = None` means the maximum
    /// equals the initial extent.
    pub fn create_simple(dims: &[hsize_t], maxdims: Option<&[hsize_t]>) -> Result<Self, H5Error> {
        debug_assert!(maxdims.map_or(true, |m| m.len() == dims.len()));
        let maxdims_ptr = maxdims.map_or(ptr::null(), |m| m.as_ptr());
        // SAFETY: dims/maxdims have the advertised rank.
        Self::from_raw(unsafe {
            H5Screate_simple(dims.len() as i32, dims.as_ptr(), maxdims_ptr)
        })
    }

    pub fn rank(&self) -> Result<usize, H5Error> {
        // SAFETY: self.0 is a valid dataspace id.
        let rank = unsafe { H5Sget_simple_extent_ndims(self.0) };
        if rank < 0 {
            Err(H5Error::capture())
        } else {
            Ok(rank as usize)
        }
    }

    /// Current extent of a dataspace of known rank `N`.
    pub fn extent<const N: usize>(&self) -> Result<[hsize_t; N], H5Error> {
        if self.rank()? != N {
            return Err(H5Error::silent());
        }
        let mut dims = [0 as hsize_t; N];
        // SAFETY: dims has exactly the dataspace rank.
        let rc = unsafe { H5Sget_simple_extent_dims(self.0, dims.as_mut_ptr(), ptr::null_mut()) };
        if rc < 0 {
            return Err(H5Error::capture());
        }
        Ok(dims)
    }

    /// Replaces the selection with the hyperslab `[start, start+count)`.
    pub fn select_hyperslab(&self, start: &[hsize_t], count: &[hsize_t]) -> Result<(), H5Error> {
        debug_assert_eq!(start.len(), count.len());
        // SAFETY: start/count match the dataspace rank (library-checked).
        check_err(unsafe {
            H5Sselect_hyperslab(
                self.0,
                H5S_seloper_t::H5S_SELECT_SET,
                start.as_ptr(),
                ptr::null(),
                count.as_ptr(),
                ptr::null(),
            )
        })
    }

    /// Replaces the selection with the given 1-D point coordinates.
    /// Points are read back in selection order.
    pub fn select_elements(&self, coords: &[hsize_t]) -> Result<(), H5Error> {
        // SAFETY: coords holds coords.len() rank-1 points.
        check_err(unsafe {
            H5Sselect_elements(
                self.0,
                H5S_seloper_t::H5S_SELECT_SET,
                coords.len(),
                coords.as_ptr(),
            )
        })
    }
}

impl Datatype {
    pub fn create_compound(size: usize) -> Result<Self, H5Error> {
        // SAFETY: plain type creation.
        Self::from_raw(unsafe { H5Tcreate(H5T_class_t::H5T_COMPOUND, size) })
    }

    pub fn create_opaque(size: usize) -> Result<Self, H5Error> {
        // SAFETY: plain type creation.
        Self::from_raw(unsafe { H5Tcreate(H5T_class_t::H5T_OPAQUE, size) })
    }

    pub fn copy(base: hid_t) -> Result<Self, H5Error> {
        // SAFETY: base is a valid (usually predefined) type id.
        Self::from_raw(unsafe { H5Tcopy(base) })
    }

    pub fn vlen(base: hid_t) -> Result<Self, H5Error> {
        // SAFETY: base is a valid (usually predefined) type id.
        Self::from_raw(unsafe { H5Tvlen_create(base) })
    }

    pub fn set_tag(&self, tag: &str) -> Result<(), H5Error> {
        let ctag = to_cstring(tag)?;
        // SAFETY: ctag is NUL-terminated.
        check_err(unsafe { H5Tset_tag(self.0, ctag.as_ptr()) })
    }

    pub fn set_variable_size(&self) -> Result<(), H5Error> {
        // SAFETY: self.0 is a string type.
        check_err(unsafe { H5Tset_size(self.0, H5T_VARIABLE) })
    }

    pub fn insert(&self, name: &str, offset: usize, member: &Datatype) -> Result<(), H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: offset was computed with offset_of! on the matching
        // #[repr(C)] struct.
        check_err(unsafe { H5Tinsert(self.0, cname.as_ptr(), offset, member.id()) })
    }

    /// Commits this type at `path`, making it a named type of the file.
    pub fn commit(&self, loc: hid_t, path: &str) -> Result<(), H5Error> {
        let cpath = to_cstring(path)?;
        // SAFETY: default property lists.
        check_err(unsafe {
            H5Tcommit2(loc, cpath.as_ptr(), self.0, H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        })
    }
}

impl Attribute {
    pub fn create(
        loc: hid_t,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
    ) -> Result<Self, H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: all ids are valid; default property lists.
        Self::from_raw(unsafe {
            H5Acreate2(loc, cname.as_ptr(), dtype.id(), space.id(), H5P_DEFAULT, H5P_DEFAULT)
        })
    }

    pub fn open(loc: hid_t, name: &str) -> Result<Self, H5Error> {
        let cname = to_cstring(name)?;
        // SAFETY: cname is NUL-terminated.
        Self::from_raw(unsafe { H5Aopen(loc, cname.as_ptr(), H5P_DEFAULT) })
    }

    pub fn dtype(&self) -> Result<Datatype, H5Error> {
        // SAFETY: self.0 is a valid attribute id.
        Datatype::from_raw(unsafe { H5Aget_type(self.0) })
    }

    pub fn space(&self) -> Result<Dataspace, H5Error> {
        // SAFETY: self.0 is a valid attribute id.
        Dataspace::from_raw(unsafe { H5Aget_space(self.0) })
    }

    /// # Safety
    ///
    /// `buf` must be valid for writes of one element of `mem_type`.
    pub unsafe fn read(&self, mem_type: hid_t, buf: *mut c_void) -> Result<(), H5Error> {
        check_err(H5Aread(self.0, mem_type, buf))
    }

    /// # Safety
    ///
    /// `buf` must be valid for reads of one element of `mem_type`.
    pub unsafe fn write(&self, mem_type: hid_t, buf: *const c_void) -> Result<(), H5Error> {
        check_err(H5Awrite(self.0, mem_type, buf))
    }
}

impl PropertyList {
    pub fn dataset_create() -> Result<Self, H5Error> {
        // SAFETY: the dataset-create class id is a library global, valid
        // once the library is initialised.
        Self::from_raw(unsafe { H5Pcreate(*H5P_DATASET_CREATE) })
    }

    pub fn set_chunk(&self, dims: &[hsize_t]) -> Result<(), H5Error> {
        // SAFETY: dims carries the advertised rank.
        check_err(unsafe { H5Pset_chunk(self.0, dims.len() as i32, dims.as_ptr()) })
    }
}

/// Releases library-allocated variable-length buffers produced by a read.
///
/// # Safety
///
/// `buf` must be the buffer previously filled by a read of `dtype` over
/// `space`, and must not be used afterwards.
pub unsafe fn vlen_reclaim(
    dtype: &Datatype,
    space: &Dataspace,
    buf: *mut c_void,
) -> Result<(), H5Error> {
    check_err(H5Dvlen_reclaim(dtype.id(), space.id(), H5P_DEFAULT, buf))
}
