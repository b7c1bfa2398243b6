//! eoshdf - Simple reader for NASA EOS HDF4 containers
//!
//! An HDF4 file exposes datasets through two independent interfaces: the
//! scientific dataset (SD) interface for n-dimensional arrays and the vdata
//! (VS) interface for row-oriented records. [`Container`] hides that split:
//! ask for a dataset by name and it is looked up in SD first, then in VS.
//!
//! ```rust,ignore
//! use eoshdf::Container;
//!
//! let mut eos = Container::open("example.hdf");
//! println!("{:?}", eos.list_datasets()?);
//! let data = eos.read_data("example_dataset")?;
//! ```
//!
//! Read data is returned as-is: no conversion factors or missing value masking
//! are applied. Apply them yourself from the product documentation.
//!
//! Decoding is delegated to a [`backend::Backend`]. The crate ships an
//! in-memory decoder and one over directories of `.npy` arrays.

mod array;
pub mod backend;
mod container;
mod error;

pub use array::{DataType, Element, RawArray};
pub use backend::{MultidimInfo, TabularInfo};
pub use container::Container;
pub use error::{AttachError, DecodeError, Error, Result};
