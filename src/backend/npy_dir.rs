//! File-backed decoder over a directory of NumPy `.npy` arrays.
//!
//! The container path is a directory with one subdirectory per interface:
//!
//! ```text
//! granule/
//!   sd/temperature.npy   (any shape)
//!   vs/lat.npy           (records, or records × fields)
//! ```
//!
//! Subdirectory names come from [`NpyLayout`]. A missing subdirectory is an
//! empty interface, not an error.

use std::collections::HashMap;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use serde::{Deserialize, Serialize};

use crate::array::RawArray;
use crate::backend::{
    Backend, FileHandle, MultidimInfo, MultidimSession, Record, TabularInfo, TabularSession,
    reference_number,
};
use crate::error::{AttachError, DecodeError};

/// Directory layout of an `.npy` container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpyLayout {
    /// Subdirectory holding SD records
    pub multidim_dir: String,
    /// Subdirectory holding VS records
    pub tabular_dir: String,
}

impl Default for NpyLayout {
    fn default() -> Self {
        Self {
            multidim_dir: "sd".to_string(),
            tabular_dir: "vs".to_string(),
        }
    }
}

impl NpyLayout {
    /// Parse a layout from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Decoder for `.npy` directory containers.
#[derive(Debug, Clone, Default)]
pub struct NpyDirBackend {
    layout: NpyLayout,
}

impl NpyDirBackend {
    /// Create a backend with the default `sd`/`vs` layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with a custom layout.
    pub fn with_layout(layout: NpyLayout) -> Self {
        Self { layout }
    }

    /// The directory layout in use.
    pub fn layout(&self) -> &NpyLayout {
        &self.layout
    }
}

fn check_root(path: &Path) -> Result<(), DecodeError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(DecodeError::file_not_found(path))
    }
}

impl Backend for NpyDirBackend {
    type File = NpyFile;
    type Multidim = NpyMultidim;

    fn open_file(&self, path: &Path) -> Result<NpyFile, DecodeError> {
        check_root(path)?;
        Ok(NpyFile {
            dir: path.join(&self.layout.tabular_dir),
        })
    }

    fn open_multidim(&self, path: &Path) -> Result<NpyMultidim, DecodeError> {
        check_root(path)?;
        Ok(NpyMultidim {
            dir: path.join(&self.layout.multidim_dir),
        })
    }
}

/// Low-level handle of an `.npy` container.
#[derive(Debug)]
pub struct NpyFile {
    dir: PathBuf,
}

impl FileHandle for NpyFile {
    type Tabular = NpyTabular;

    fn start_tabular(&mut self) -> Result<NpyTabular, DecodeError> {
        Ok(NpyTabular {
            dir: self.dir.clone(),
        })
    }

    fn close(self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// VS session of an `.npy` container.
#[derive(Debug)]
pub struct NpyTabular {
    dir: PathBuf,
}

impl TabularSession for NpyTabular {
    type Record = NpyRecord;

    fn catalog(&mut self) -> Result<Vec<(String, TabularInfo)>, DecodeError> {
        decodable_records(&self.dir)?
            .into_iter()
            .enumerate()
            .map(|(i, (name, data))| -> Result<_, DecodeError> {
                let info =
                    TabularInfo::from_shape(data.shape(), data.data_type(), reference_number(i)?);
                Ok((name, info))
            })
            .collect()
    }

    fn attach(&mut self, name: &str) -> Result<NpyRecord, AttachError> {
        NpyRecord::attach(&self.dir, name)
    }

    fn end(self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// SD session of an `.npy` container.
#[derive(Debug)]
pub struct NpyMultidim {
    dir: PathBuf,
}

impl MultidimSession for NpyMultidim {
    type Record = NpyRecord;

    fn catalog(&mut self) -> Result<HashMap<String, MultidimInfo>, DecodeError> {
        let catalog = decodable_records(&self.dir)?
            .into_iter()
            .enumerate()
            .map(|(index, (name, data))| {
                let info =
                    MultidimInfo::with_default_dims(data.shape().to_vec(), data.data_type(), index);
                (name, info)
            })
            .collect();
        Ok(catalog)
    }

    fn select(&mut self, name: &str) -> Result<NpyRecord, AttachError> {
        NpyRecord::attach(&self.dir, name)
    }

    fn end(self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Attached `.npy` record. The file is only read on [`Record::read`].
#[derive(Debug)]
pub struct NpyRecord {
    path: PathBuf,
}

impl NpyRecord {
    fn attach(dir: &Path, name: &str) -> Result<Self, AttachError> {
        if !is_plain_name(name) {
            return Err(AttachError::not_found(name));
        }
        let path = dir.join(format!("{}.npy", name));
        if !path.is_file() {
            return Err(AttachError::not_found(name));
        }
        log::trace!("NpyDirBackend: attached {}", path.display());
        Ok(Self { path })
    }
}

impl Record for NpyRecord {
    fn read(&mut self) -> Result<RawArray, DecodeError> {
        read_npy_file(&self.path)
    }

    fn detach(self) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Record names map to file stems, so anything that would escape the
/// interface directory cannot name a record.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// `.npy` files in `dir` as `(name, path)`, sorted by name.
fn list_records(dir: &Path) -> Result<Vec<(String, PathBuf)>, DecodeError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("npy") {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(name) => records.push((name.to_string(), path.clone())),
            None => log::warn!("NpyDirBackend: skipping non-UTF-8 name {}", path.display()),
        }
    }
    records.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(records)
}

/// Decoded records in `dir`, sorted by name.
///
/// A file that does not decode is left out with a warning, so one bad record
/// does not hide the rest of the interface. Reading it by name still reports
/// the decode error.
fn decodable_records(dir: &Path) -> Result<Vec<(String, RawArray)>, DecodeError> {
    let mut records = Vec::new();
    for (name, path) in list_records(dir)? {
        match read_npy_file(&path) {
            Ok(data) => records.push((name, data)),
            Err(e) => log::warn!("NpyDirBackend: leaving {} out of catalog: {}", name, e),
        }
    }
    Ok(records)
}

/// Read an `.npy` file in whatever element type it was written with.
fn read_npy_file(path: &Path) -> Result<RawArray, DecodeError> {
    let bytes = std::fs::read(path)?;

    // Each attempt only fails on the dtype check until the right type is hit
    macro_rules! try_read {
        ($($ty:ty),*) => {
            $(
                match ArrayD::<$ty>::read_npy(Cursor::new(bytes.as_slice())) {
                    Ok(array) => {
                        log::debug!(
                            "NpyDirBackend: read {} as {} with shape {:?}",
                            path.display(),
                            stringify!($ty),
                            array.shape()
                        );
                        return Ok(RawArray::from(array));
                    }
                    Err(ReadNpyError::WrongDescriptor(_)) => {}
                    Err(e) => {
                        return Err(DecodeError::malformed(format!("{}: {}", path.display(), e)));
                    }
                }
            )*
        };
    }

    try_read!(f32, f64, i16, u16, i32, u32, u8, i8);

    Err(DecodeError::UnsupportedType {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataType;
    use ndarray::array;
    use ndarray_npy::write_npy;

    fn container() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sd")).unwrap();
        std::fs::create_dir(dir.path().join("vs")).unwrap();
        write_npy(
            dir.path().join("sd/temperature.npy"),
            &array![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]],
        )
        .unwrap();
        write_npy(dir.path().join("vs/lon.npy"), &array![1i32, 2]).unwrap();
        write_npy(dir.path().join("vs/lat.npy"), &array![[10u16], [20], [30], [40]]).unwrap();
        std::fs::write(dir.path().join("vs/README.txt"), "not a record").unwrap();
        dir
    }

    #[test]
    fn test_layout_defaults_and_json() {
        assert_eq!(NpyLayout::default().multidim_dir, "sd");

        let layout = NpyLayout::from_json(r#"{ "tabular_dir": "vdata" }"#).unwrap();
        assert_eq!(layout.multidim_dir, "sd");
        assert_eq!(layout.tabular_dir, "vdata");
    }

    #[test]
    fn test_open_requires_directory() {
        let backend = NpyDirBackend::new();
        let err = backend
            .open_multidim(Path::new("/nonexistent/granule"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::FileNotFound { .. }));
    }

    #[test]
    fn test_tabular_catalog_sorted_by_name() {
        let dir = container();
        let mut file = NpyDirBackend::new().open_file(dir.path()).unwrap();
        let mut vs = file.start_tabular().unwrap();

        let catalog = vs.catalog().unwrap();
        let names: Vec<_> = catalog.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lat", "lon"]);

        let lat = &catalog[0].1;
        assert_eq!(lat.records, 4);
        assert_eq!(lat.fields, 1);
        assert_eq!(lat.record_size, 2);
        assert_eq!(lat.reference, 1);
    }

    #[test]
    fn test_multidim_read_keeps_native_type() {
        let dir = container();
        let mut sd = NpyDirBackend::new().open_multidim(dir.path()).unwrap();

        let catalog = sd.catalog().unwrap();
        let info = &catalog["temperature"];
        assert_eq!(info.shape, vec![2, 3]);
        assert_eq!(info.data_type, DataType::Float64);

        let mut record = sd.select("temperature").unwrap();
        let data = record.read().unwrap();
        assert_eq!(data.data_type(), DataType::Float64);
        assert_eq!(data.shape(), &[2, 3]);
    }

    #[test]
    fn test_missing_subdirectory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut sd = NpyDirBackend::new().open_multidim(dir.path()).unwrap();
        assert!(sd.catalog().unwrap().is_empty());
        assert!(matches!(sd.select("x"), Err(AttachError::NotFound { .. })));
    }

    #[test]
    fn test_path_like_names_are_not_found() {
        let dir = container();
        let mut sd = NpyDirBackend::new().open_multidim(dir.path()).unwrap();
        for name in ["", ".", "..", "../vs/lat", "sub/name"] {
            assert!(
                matches!(sd.select(name), Err(AttachError::NotFound { .. })),
                "{name:?} should not resolve"
            );
        }
    }

    #[test]
    fn test_unsupported_dtype() {
        let dir = container();
        write_npy(dir.path().join("sd/flags.npy"), &array![1i64, 2, 3]).unwrap();
        let mut sd = NpyDirBackend::new().open_multidim(dir.path()).unwrap();

        let mut record = sd.select("flags").unwrap();
        assert!(matches!(
            record.read(),
            Err(DecodeError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_catalog_skips_undecodable_records() {
        let dir = container();
        write_npy(dir.path().join("sd/flags.npy"), &array![1i64, 2, 3]).unwrap();
        std::fs::write(dir.path().join("vs/broken.npy"), b"\x93NUMPY\x01\x00").unwrap();
        let backend = NpyDirBackend::new();

        let mut sd = backend.open_multidim(dir.path()).unwrap();
        let multidim = sd.catalog().unwrap();
        assert_eq!(multidim.len(), 1);
        assert!(multidim.contains_key("temperature"));

        let mut file = backend.open_file(dir.path()).unwrap();
        let mut vs = file.start_tabular().unwrap();
        let names: Vec<_> = vs.catalog().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["lat", "lon"]);
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let dir = container();
        std::fs::write(dir.path().join("sd/broken.npy"), b"\x93NUMPY\x01\x00").unwrap();
        let mut sd = NpyDirBackend::new().open_multidim(dir.path()).unwrap();

        let mut record = sd.select("broken").unwrap();
        assert!(matches!(record.read(), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_custom_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("vdata")).unwrap();
        write_npy(dir.path().join("vdata/time.npy"), &array![0.5f32, 1.5]).unwrap();

        let layout = NpyLayout::from_json(r#"{ "tabular_dir": "vdata" }"#).unwrap();
        let backend = NpyDirBackend::with_layout(layout);
        let mut file = backend.open_file(dir.path()).unwrap();
        let mut vs = file.start_tabular().unwrap();

        assert!(vs.attach("time").is_ok());
    }
}
