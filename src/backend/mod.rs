//! Decoder seam for the two container sub-interfaces.
//!
//! A container file exposes two independent namespaces:
//!
//! - **SD** (scientific datasets): named n-dimensional arrays, reached through
//!   a [`MultidimSession`] opened directly on the file path.
//! - **VS** (vdata): named row-oriented records, reached through a
//!   [`TabularSession`] started from a low-level [`FileHandle`].
//!
//! The byte-level decoding lives behind these traits. [`Container`] only drives
//! their lifecycle: open, attach, read, detach, end, close.
//!
//! ## Adding a Decoder
//!
//! ```rust,ignore
//! use eoshdf::backend::Backend;
//!
//! pub struct MyDecoder;
//!
//! impl Backend for MyDecoder {
//!     type File = MyFile;
//!     type Multidim = MySdSession;
//!
//!     fn open_file(&self, path: &Path) -> Result<MyFile, DecodeError> { /* ... */ }
//!     fn open_multidim(&self, path: &Path) -> Result<MySdSession, DecodeError> { /* ... */ }
//! }
//! ```
//!
//! [`Container`]: crate::Container

pub mod memory;
pub mod npy_dir;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::array::{DataType, RawArray};
use crate::error::{AttachError, DecodeError};

pub use memory::{MemoryBackend, MemoryFile, SessionStats};
pub use npy_dir::{NpyDirBackend, NpyLayout};

/// Vdata header tag (`DFTAG_VH`).
pub const VDATA_TAG: u16 = 1962;

/// Vdata interlace mode: fields of one record are stored together.
pub const FULL_INTERLACE: u8 = 0;

/// Catalog metadata of one VS record (vdata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularInfo {
    /// Vdata class name (often empty)
    pub class: String,
    /// Reference number within the file
    pub reference: u16,
    /// Number of records (rows)
    pub records: usize,
    /// Number of fields per record
    pub fields: usize,
    /// Number of attributes attached to the vdata
    pub attributes: usize,
    /// Size of one record in bytes
    pub record_size: usize,
    /// HDF tag of the vdata
    pub tag: u16,
    /// Interlace mode
    pub interlace: u8,
}

impl TabularInfo {
    /// Describe a vdata from the shape of its decoded array.
    ///
    /// The first axis counts records, the remaining axes are flattened into
    /// fields. A 0-d array is a single record with a single field.
    pub fn from_shape(shape: &[usize], data_type: DataType, reference: u16) -> Self {
        let records = shape.first().copied().unwrap_or(1);
        let fields = shape.iter().skip(1).product::<usize>();
        Self {
            class: String::new(),
            reference,
            records,
            fields,
            attributes: 0,
            record_size: fields * data_type.size(),
            tag: VDATA_TAG,
            interlace: FULL_INTERLACE,
        }
    }
}

/// Reference number of the vdata at catalog position `index` (1-based).
///
/// HDF4 reference numbers are 16-bit, so a catalog past `u16::MAX` entries
/// cannot be described.
pub fn reference_number(index: usize) -> Result<u16, DecodeError> {
    index
        .checked_add(1)
        .and_then(|r| u16::try_from(r).ok())
        .ok_or_else(|| {
            DecodeError::malformed(format!(
                "vdata #{} exceeds the 16-bit reference number range",
                index
            ))
        })
}

/// Catalog metadata of one SD record (scientific dataset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultidimInfo {
    /// Dimension names, one per axis
    pub dim_names: Vec<String>,
    /// Length of each axis
    pub shape: Vec<usize>,
    /// Native element type
    pub data_type: DataType,
    /// Index of the dataset within the file
    pub index: usize,
}

impl MultidimInfo {
    /// Build info with default dimension names (`fakeDim0`, `fakeDim1`, ...).
    pub fn with_default_dims(shape: Vec<usize>, data_type: DataType, index: usize) -> Self {
        let dim_names = (0..shape.len()).map(|i| format!("fakeDim{}", i)).collect();
        Self {
            dim_names,
            shape,
            data_type,
            index,
        }
    }
}

/// A decoder able to open both sub-interfaces of a container file.
pub trait Backend {
    /// Low-level file handle that VS sessions are started from.
    type File: FileHandle;

    /// SD interface session.
    type Multidim: MultidimSession;

    /// Open the low-level file handle.
    fn open_file(&self, path: &Path) -> Result<Self::File, DecodeError>;

    /// Open an SD session on the file.
    fn open_multidim(&self, path: &Path) -> Result<Self::Multidim, DecodeError>;
}

/// Low-level file handle tied to a VS session.
pub trait FileHandle {
    /// VS interface session.
    type Tabular: TabularSession;

    /// Start the VS interface on this file.
    fn start_tabular(&mut self) -> Result<Self::Tabular, DecodeError>;

    /// Close the file. Any VS session started from it must be ended first.
    fn close(self) -> Result<(), DecodeError>;
}

/// Open VS interface.
pub trait TabularSession {
    /// Record handle returned by [`TabularSession::attach`].
    type Record: Record;

    /// List every vdata in the decoder's native order.
    fn catalog(&mut self) -> Result<Vec<(String, TabularInfo)>, DecodeError>;

    /// Attach to a vdata by name.
    fn attach(&mut self, name: &str) -> Result<Self::Record, AttachError>;

    /// End the VS interface.
    fn end(self) -> Result<(), DecodeError>;
}

/// Open SD interface.
pub trait MultidimSession {
    /// Record handle returned by [`MultidimSession::select`].
    type Record: Record;

    /// List every scientific dataset keyed by name.
    fn catalog(&mut self) -> Result<HashMap<String, MultidimInfo>, DecodeError>;

    /// Select a scientific dataset by name.
    fn select(&mut self, name: &str) -> Result<Self::Record, AttachError>;

    /// End the SD interface.
    fn end(self) -> Result<(), DecodeError>;
}

/// A record attached for a single read.
pub trait Record {
    /// Read every element in the record's native type and shape.
    fn read(&mut self) -> Result<RawArray, DecodeError>;

    /// Release the record.
    fn detach(self) -> Result<(), DecodeError>;
}

/// Read a record in full and detach it.
///
/// Detach runs even when the read fails; the read error wins.
pub(crate) fn read_and_detach<R: Record>(mut record: R) -> Result<RawArray, DecodeError> {
    let data = record.read();
    let detached = record.detach();
    let data = data?;
    detached?;
    Ok(data)
}
