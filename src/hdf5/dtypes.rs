//! # Layout Datatypes
//!
//! Builders for every datatype the table layout uses, plus the
//! `#[repr(C)]` record structs exchanged with the library.
//!
//! ## Records and compounds
//!
//! HDF5 compound types describe C struct layouts: member offsets inside
//! the in-memory struct plus per-member types. Each compound built here
//! is paired with a `#[repr(C)]` struct whose field offsets (via
//! `offset_of!`) parameterise the compound, so the library reads and
//! writes the structs directly.
//!
//! Partial compounds (a subset of the members at their natural offsets in
//! a smaller struct) let introspection read just the column names or just
//! the dataset references out of the column index; the library matches
//! members by name.
//!
//! ## Variable-length memory
//!
//! Variable-length members (`name`, `domain` strings; cell blobs) travel
//! as library-allocated pointers on read. Helpers here copy them into
//! owned Rust values and release the library buffers immediately, so no
//! raw pointer outlives the call that produced it.

use std::mem::offset_of;
use std::os::raw::{c_char, c_void};

use hdf5_sys::h5r::hobj_ref_t;
use hdf5_sys::h5t::{hvl_t, H5T_C_S1, H5T_NATIVE_UCHAR, H5T_NATIVE_UINT64, H5T_STD_REF_OBJ};

use crate::types::ColumnType;

use super::handles::{Attribute, Datatype, H5Error};

/// In-memory mirror of the committed `/meta/dataset_type` compound.
#[repr(C)]
#[derive(Debug)]
pub struct TypeAttrRecord {
    pub domain: *mut c_char,
    pub name: *mut c_char,
    pub size: u64,
}

/// In-memory mirror of the committed `/meta/column_index_type` compound.
#[repr(C)]
#[derive(Debug)]
pub struct ColumnIndexRecord {
    pub name: *mut c_char,
    pub dataset_ref: hobj_ref_t,
    pub dataset_column: u64,
}

/// Name-only projection of the column index.
#[repr(C)]
#[derive(Debug)]
pub struct ColumnNameRecord {
    pub name: *mut c_char,
}

/// Reference-only projection of the column index.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ColumnRefRecord {
    pub dataset_ref: hobj_ref_t,
}

/// Reference-and-offset projection of the column index.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ColumnLocRecord {
    pub dataset_ref: hobj_ref_t,
    pub dataset_column: u64,
}

/// Element byte size of a per-type dataset: the opaque size for fixed
/// types, the descriptor size for variable-length types.
pub fn elem_byte_size(column_type: &ColumnType) -> u64 {
    if column_type.is_variable_length() {
        std::mem::size_of::<hvl_t>() as u64
    } else {
        column_type.size
    }
}

/// A variable-length UTF-8 string type (compound member type).
pub fn vlen_string_type() -> Result<Datatype, H5Error> {
    let dtype = Datatype::copy(*H5T_C_S1)?;
    dtype.set_variable_size()?;
    Ok(dtype)
}

/// The element type of a per-type dataset: tagged opaque for fixed
/// types, a variable-length byte sequence otherwise.
pub fn column_data_type(column_type: &ColumnType) -> Result<Datatype, H5Error> {
    if column_type.is_variable_length() {
        Datatype::vlen(*H5T_NATIVE_UCHAR)
    } else {
        let dtype = Datatype::create_opaque(column_type.size as usize)?;
        dtype.set_tag(&column_type.tag())?;
        Ok(dtype)
    }
}

/// The `/meta/dataset_type` compound.
pub fn type_attr_type() -> Result<Datatype, H5Error> {
    let compound = Datatype::create_compound(std::mem::size_of::<TypeAttrRecord>())?;
    let string = vlen_string_type()?;
    compound.insert("domain", offset_of!(TypeAttrRecord, domain), &string)?;
    compound.insert("name", offset_of!(TypeAttrRecord, name), &string)?;
    let size = Datatype::copy(*H5T_NATIVE_UINT64)?;
    compound.insert("size", offset_of!(TypeAttrRecord, size), &size)?;
    Ok(compound)
}

/// The `/meta/column_index_type` compound.
pub fn column_index_type() -> Result<Datatype, H5Error> {
    let compound = Datatype::create_compound(std::mem::size_of::<ColumnIndexRecord>())?;
    let string = vlen_string_type()?;
    compound.insert("name", offset_of!(ColumnIndexRecord, name), &string)?;
    let reference = Datatype::copy(*H5T_STD_REF_OBJ)?;
    compound.insert("dataset_ref", offset_of!(ColumnIndexRecord, dataset_ref), &reference)?;
    let column = Datatype::copy(*H5T_NATIVE_UINT64)?;
    compound.insert(
        "dataset_column",
        offset_of!(ColumnIndexRecord, dataset_column),
        &column,
    )?;
    Ok(compound)
}

/// Memory compound reading only the `name` member of the column index.
pub fn column_name_slice_type() -> Result<Datatype, H5Error> {
    let compound = Datatype::create_compound(std::mem::size_of::<ColumnNameRecord>())?;
    let string = vlen_string_type()?;
    compound.insert("name", offset_of!(ColumnNameRecord, name), &string)?;
    Ok(compound)
}

/// Memory compound reading only the `dataset_ref` member.
pub fn column_ref_slice_type() -> Result<Datatype, H5Error> {
    let compound = Datatype::create_compound(std::mem::size_of::<ColumnRefRecord>())?;
    let reference = Datatype::copy(*H5T_STD_REF_OBJ)?;
    compound.insert("dataset_ref", offset_of!(ColumnRefRecord, dataset_ref), &reference)?;
    Ok(compound)
}

/// Memory compound reading the `dataset_ref` and `dataset_column`
/// members.
pub fn column_loc_slice_type() -> Result<Datatype, H5Error> {
    let compound = Datatype::create_compound(std::mem::size_of::<ColumnLocRecord>())?;
    let reference = Datatype::copy(*H5T_STD_REF_OBJ)?;
    compound.insert("dataset_ref", offset_of!(ColumnLocRecord, dataset_ref), &reference)?;
    let column = Datatype::copy(*H5T_NATIVE_UINT64)?;
    compound.insert(
        "dataset_column",
        offset_of!(ColumnLocRecord, dataset_column),
        &column,
    )?;
    Ok(compound)
}

/// Copies a library-owned C string into an owned `String`.
///
/// # Safety
///
/// `ptr` must be NUL-terminated or null. Null yields the empty string.
pub unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Reads a dataset's `type` attribute into an owned [`ColumnType`].
///
/// The variable-length strings the library allocates during the read are
/// copied and reclaimed before this returns.
pub fn read_type_attribute(attr: &Attribute) -> Result<ColumnType, H5Error> {
    let attr_type = attr.dtype()?;
    let attr_space = attr.space()?;

    let mut record = TypeAttrRecord {
        domain: std::ptr::null_mut(),
        name: std::ptr::null_mut(),
        size: 0,
    };
    // SAFETY: record matches the attribute's compound layout; the strings
    // it receives are copied and reclaimed below.
    unsafe {
        attr.read(attr_type.id(), &mut record as *mut TypeAttrRecord as *mut c_void)?;
        let column_type = ColumnType::new(
            owned_string(record.domain),
            owned_string(record.name),
            record.size,
        );
        super::handles::vlen_reclaim(
            &attr_type,
            &attr_space,
            &mut record as *mut TypeAttrRecord as *mut c_void,
        )?;
        Ok(column_type)
    }
}

/// Writes a [`ColumnType`] into a dataset's `type` attribute using the
/// committed attribute type.
pub fn write_type_attribute(
    attr: &Attribute,
    attr_type: &Datatype,
    column_type: &ColumnType,
) -> Result<(), H5Error> {
    let domain = std::ffi::CString::new(column_type.domain.as_str()).map_err(|_| H5Error::silent())?;
    let name = std::ffi::CString::new(column_type.name.as_str()).map_err(|_| H5Error::silent())?;
    let record = TypeAttrRecord {
        domain: domain.as_ptr() as *mut c_char,
        name: name.as_ptr() as *mut c_char,
        size: column_type.size,
    };
    // SAFETY: record matches the committed compound layout and the
    // CStrings outlive the write.
    unsafe { attr.write(attr_type.id(), &record as *const TypeAttrRecord as *const c_void) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layouts_are_stable() {
        assert_eq!(offset_of!(TypeAttrRecord, domain), 0);
        assert_eq!(offset_of!(TypeAttrRecord, name), 8);
        assert_eq!(offset_of!(TypeAttrRecord, size), 16);
        assert_eq!(std::mem::size_of::<TypeAttrRecord>(), 24);

        assert_eq!(offset_of!(ColumnIndexRecord, name), 0);
        assert_eq!(offset_of!(ColumnIndexRecord, dataset_ref), 8);
        assert_eq!(offset_of!(ColumnIndexRecord, dataset_column), 16);
        assert_eq!(std::mem::size_of::<ColumnIndexRecord>(), 24);
    }

    #[test]
    fn elem_sizes() {
        assert_eq!(elem_byte_size(&ColumnType::new("d", "u32", 4)), 4);
        assert_eq!(
            elem_byte_size(&ColumnType::new("d", "str", 0)),
            std::mem::size_of::<hvl_t>() as u64
        );
    }
}
