//! In-memory decoder.
//!
//! Holds already-decoded records keyed by container path. Every lifecycle call
//! is counted in [`SessionStats`], which makes lazy session handling visible to
//! tests. Failures can be injected at attach, read, session start and session
//! end.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::array::RawArray;
use crate::backend::{
    Backend, FileHandle, MultidimInfo, MultidimSession, Record, TabularInfo, TabularSession,
    reference_number,
};
use crate::error::{AttachError, DecodeError};

/// Counters for every lifecycle call made against a [`MemoryBackend`].
///
/// A release that reports an error still counts as released.
#[derive(Debug, Default)]
pub struct SessionStats {
    files_opened: Cell<usize>,
    files_closed: Cell<usize>,
    tabular_started: Cell<usize>,
    tabular_ended: Cell<usize>,
    multidim_opened: Cell<usize>,
    multidim_ended: Cell<usize>,
    attached: Cell<usize>,
    detached: Cell<usize>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl SessionStats {
    /// Low-level file handles opened.
    pub fn files_opened(&self) -> usize {
        self.files_opened.get()
    }

    /// Low-level file handles closed.
    pub fn files_closed(&self) -> usize {
        self.files_closed.get()
    }

    /// VS sessions started.
    pub fn tabular_started(&self) -> usize {
        self.tabular_started.get()
    }

    /// VS sessions ended.
    pub fn tabular_ended(&self) -> usize {
        self.tabular_ended.get()
    }

    /// SD sessions opened.
    pub fn multidim_opened(&self) -> usize {
        self.multidim_opened.get()
    }

    /// SD sessions ended.
    pub fn multidim_ended(&self) -> usize {
        self.multidim_ended.get()
    }

    /// Records attached (VS) or selected (SD).
    pub fn attached(&self) -> usize {
        self.attached.get()
    }

    /// Records detached.
    pub fn detached(&self) -> usize {
        self.detached.get()
    }

    /// Total sessions acquired on either interface.
    pub fn sessions_opened(&self) -> usize {
        self.tabular_started() + self.multidim_opened()
    }

    /// Whether every acquired handle has been released.
    pub fn all_released(&self) -> bool {
        self.files_opened() == self.files_closed()
            && self.tabular_started() == self.tabular_ended()
            && self.multidim_opened() == self.multidim_ended()
            && self.attached() == self.detached()
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Data(RawArray),
    /// Attaching fails with a decode error carrying this message.
    Broken(String),
    /// Attaching works, reading fails with this message.
    Unreadable(String),
}

/// Decoded contents of one container file.
///
/// Broken and unreadable records are not listed in catalogs.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    multidim: Vec<(String, Entry)>,
    tabular: Vec<(String, Entry)>,
    tabular_start_failure: Option<String>,
    tabular_end_failure: Option<String>,
    multidim_end_failure: Option<String>,
}

impl MemoryFile {
    /// Create an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an SD record.
    pub fn with_multidim(mut self, name: impl Into<String>, data: impl Into<RawArray>) -> Self {
        self.multidim.push((name.into(), Entry::Data(data.into())));
        self
    }

    /// Add a VS record. Catalog order is insertion order.
    pub fn with_tabular(mut self, name: impl Into<String>, data: impl Into<RawArray>) -> Self {
        self.tabular.push((name.into(), Entry::Data(data.into())));
        self
    }

    /// Add an SD record whose select fails with a decode error.
    pub fn with_broken_multidim(
        mut self,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.multidim
            .push((name.into(), Entry::Broken(message.into())));
        self
    }

    /// Add a VS record whose attach fails with a decode error.
    pub fn with_broken_tabular(
        mut self,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.tabular.push((name.into(), Entry::Broken(message.into())));
        self
    }

    /// Add an SD record that selects fine but fails to read.
    pub fn with_unreadable_multidim(
        mut self,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.multidim
            .push((name.into(), Entry::Unreadable(message.into())));
        self
    }

    /// Add a VS record that attaches fine but fails to read.
    pub fn with_unreadable_tabular(
        mut self,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.tabular
            .push((name.into(), Entry::Unreadable(message.into())));
        self
    }

    /// Make starting the VS interface fail.
    pub fn with_failing_tabular_start(mut self, message: impl Into<String>) -> Self {
        self.tabular_start_failure = Some(message.into());
        self
    }

    /// Make ending the VS interface report an error.
    pub fn with_failing_tabular_end(mut self, message: impl Into<String>) -> Self {
        self.tabular_end_failure = Some(message.into());
        self
    }

    /// Make ending the SD interface report an error.
    pub fn with_failing_multidim_end(mut self, message: impl Into<String>) -> Self {
        self.multidim_end_failure = Some(message.into());
        self
    }
}

/// Resolve `name` to its data, or to the read error it was set up with.
fn find_entry(
    entries: &[(String, Entry)],
    name: &str,
) -> Result<Result<RawArray, String>, AttachError> {
    match entries.iter().find(|(n, _)| n == name) {
        Some((_, Entry::Data(data))) => Ok(Ok(data.clone())),
        Some((_, Entry::Unreadable(message))) => Ok(Err(message.clone())),
        Some((_, Entry::Broken(message))) => Err(DecodeError::malformed(message.clone()).into()),
        None => Err(AttachError::not_found(name)),
    }
}

/// Listed entries with their position in the listing.
fn listed(entries: &[(String, Entry)]) -> impl Iterator<Item = (usize, (&String, &RawArray))> {
    entries
        .iter()
        .filter_map(|(name, entry)| match entry {
            Entry::Data(data) => Some((name, data)),
            Entry::Broken(_) | Entry::Unreadable(_) => None,
        })
        .enumerate()
}

fn end_result(failure: Option<&str>) -> Result<(), DecodeError> {
    match failure {
        Some(message) => Err(DecodeError::malformed(message)),
        None => Ok(()),
    }
}

/// In-memory decoder keyed by container path.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    files: HashMap<PathBuf, Rc<MemoryFile>>,
    stats: Rc<SessionStats>,
}

impl MemoryBackend {
    /// Create a backend with no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the contents of a container file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, file: MemoryFile) -> Self {
        self.files.insert(path.into(), Rc::new(file));
        self
    }

    /// Lifecycle counters shared by every handle this backend opened.
    pub fn stats(&self) -> Rc<SessionStats> {
        Rc::clone(&self.stats)
    }

    fn lookup(&self, path: &Path) -> Result<Rc<MemoryFile>, DecodeError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| DecodeError::file_not_found(path))
    }
}

impl Backend for MemoryBackend {
    type File = MemoryFileHandle;
    type Multidim = MemoryMultidim;

    fn open_file(&self, path: &Path) -> Result<MemoryFileHandle, DecodeError> {
        let contents = self.lookup(path)?;
        bump(&self.stats.files_opened);
        Ok(MemoryFileHandle {
            contents,
            stats: self.stats(),
        })
    }

    fn open_multidim(&self, path: &Path) -> Result<MemoryMultidim, DecodeError> {
        let contents = self.lookup(path)?;
        bump(&self.stats.multidim_opened);
        Ok(MemoryMultidim {
            contents,
            stats: self.stats(),
        })
    }
}

/// Low-level file handle of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryFileHandle {
    contents: Rc<MemoryFile>,
    stats: Rc<SessionStats>,
}

impl FileHandle for MemoryFileHandle {
    type Tabular = MemoryTabular;

    fn start_tabular(&mut self) -> Result<MemoryTabular, DecodeError> {
        if let Some(message) = &self.contents.tabular_start_failure {
            return Err(DecodeError::malformed(message.clone()));
        }
        bump(&self.stats.tabular_started);
        Ok(MemoryTabular {
            contents: Rc::clone(&self.contents),
            stats: Rc::clone(&self.stats),
        })
    }

    fn close(self) -> Result<(), DecodeError> {
        if self.stats.tabular_ended() < self.stats.tabular_started() {
            return Err(DecodeError::malformed(
                "file closed while a VS session is still open",
            ));
        }
        bump(&self.stats.files_closed);
        Ok(())
    }
}

/// VS session of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryTabular {
    contents: Rc<MemoryFile>,
    stats: Rc<SessionStats>,
}

impl TabularSession for MemoryTabular {
    type Record = MemoryRecord;

    fn catalog(&mut self) -> Result<Vec<(String, TabularInfo)>, DecodeError> {
        listed(&self.contents.tabular)
            .map(|(i, (name, data))| -> Result<_, DecodeError> {
                let info =
                    TabularInfo::from_shape(data.shape(), data.data_type(), reference_number(i)?);
                Ok((name.clone(), info))
            })
            .collect()
    }

    fn attach(&mut self, name: &str) -> Result<MemoryRecord, AttachError> {
        let data = find_entry(&self.contents.tabular, name)?;
        bump(&self.stats.attached);
        Ok(MemoryRecord {
            data: Some(data),
            stats: Rc::clone(&self.stats),
        })
    }

    fn end(self) -> Result<(), DecodeError> {
        bump(&self.stats.tabular_ended);
        end_result(self.contents.tabular_end_failure.as_deref())
    }
}

/// SD session of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryMultidim {
    contents: Rc<MemoryFile>,
    stats: Rc<SessionStats>,
}

impl MultidimSession for MemoryMultidim {
    type Record = MemoryRecord;

    fn catalog(&mut self) -> Result<HashMap<String, MultidimInfo>, DecodeError> {
        let catalog = listed(&self.contents.multidim)
            .map(|(index, (name, data))| {
                let info =
                    MultidimInfo::with_default_dims(data.shape().to_vec(), data.data_type(), index);
                (name.clone(), info)
            })
            .collect();
        Ok(catalog)
    }

    fn select(&mut self, name: &str) -> Result<MemoryRecord, AttachError> {
        let data = find_entry(&self.contents.multidim, name)?;
        bump(&self.stats.attached);
        Ok(MemoryRecord {
            data: Some(data),
            stats: Rc::clone(&self.stats),
        })
    }

    fn end(self) -> Result<(), DecodeError> {
        bump(&self.stats.multidim_ended);
        end_result(self.contents.multidim_end_failure.as_deref())
    }
}

/// Attached record of a [`MemoryBackend`]. Can be read once.
#[derive(Debug)]
pub struct MemoryRecord {
    data: Option<Result<RawArray, String>>,
    stats: Rc<SessionStats>,
}

impl Record for MemoryRecord {
    fn read(&mut self) -> Result<RawArray, DecodeError> {
        match self.data.take() {
            Some(Ok(data)) => Ok(data),
            Some(Err(message)) => Err(DecodeError::malformed(message)),
            None => Err(DecodeError::malformed("record already read")),
        }
    }

    fn detach(self) -> Result<(), DecodeError> {
        bump(&self.stats.detached);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn, array};

    fn backend() -> MemoryBackend {
        MemoryBackend::new().with_file(
            "granule.hdf",
            MemoryFile::new()
                .with_multidim("temperature", array![[1.0f32, 2.0], [3.0, 4.0]].into_dyn())
                .with_tabular("lat", array![[10i16], [20], [30]].into_dyn())
                .with_broken_tabular("corrupt", "bad vdata")
                .with_unreadable_tabular("truncated", "short read"),
        )
    }

    #[test]
    fn test_unknown_path_is_decode_error() {
        let backend = backend();
        let err = backend.open_multidim(Path::new("other.hdf")).unwrap_err();
        assert!(matches!(err, DecodeError::FileNotFound { .. }));
        assert_eq!(backend.stats().multidim_opened(), 0);
    }

    #[test]
    fn test_tabular_catalog_skips_broken() {
        let backend = backend();
        let mut file = backend.open_file(Path::new("granule.hdf")).unwrap();
        let mut vs = file.start_tabular().unwrap();

        let catalog = vs.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].0, "lat");
        assert_eq!(catalog[0].1.records, 3);
        assert_eq!(catalog[0].1.fields, 1);
        assert_eq!(catalog[0].1.record_size, 2);
        assert_eq!(catalog[0].1.reference, 1);

        vs.end().unwrap();
        file.close().unwrap();
        assert!(backend.stats().all_released());
    }

    #[test]
    fn test_attach_distinguishes_missing_from_broken() {
        let backend = backend();
        let mut file = backend.open_file(Path::new("granule.hdf")).unwrap();
        let mut vs = file.start_tabular().unwrap();

        assert!(matches!(
            vs.attach("nope"),
            Err(AttachError::NotFound { name }) if name == "nope"
        ));
        assert!(matches!(
            vs.attach("corrupt"),
            Err(AttachError::Decode(DecodeError::Malformed { .. }))
        ));
        assert_eq!(backend.stats().attached(), 0);
    }

    #[test]
    fn test_unreadable_record_attaches_then_fails() {
        let backend = backend();
        let mut file = backend.open_file(Path::new("granule.hdf")).unwrap();
        let mut vs = file.start_tabular().unwrap();

        let mut record = vs.attach("truncated").unwrap();
        assert!(matches!(
            record.read(),
            Err(DecodeError::Malformed { message }) if message == "short read"
        ));
        record.detach().unwrap();
        assert_eq!(backend.stats().attached(), backend.stats().detached());
    }

    #[test]
    fn test_close_file_before_ending_session_fails() {
        let backend = backend();
        let mut file = backend.open_file(Path::new("granule.hdf")).unwrap();
        let _vs = file.start_tabular().unwrap();

        assert!(file.close().is_err());
    }

    #[test]
    fn test_failing_tabular_start_counts_nothing() {
        let backend = MemoryBackend::new().with_file(
            "granule.hdf",
            MemoryFile::new().with_failing_tabular_start("no vdata interface"),
        );
        let mut file = backend.open_file(Path::new("granule.hdf")).unwrap();

        assert!(file.start_tabular().is_err());
        assert_eq!(backend.stats().tabular_started(), 0);
        file.close().unwrap();
        assert!(backend.stats().all_released());
    }

    #[test]
    fn test_catalog_past_reference_range_is_error() {
        let file = (0..=u16::MAX as usize).fold(MemoryFile::new(), |file, i| {
            file.with_tabular(format!("v{}", i), ArrayD::<u8>::zeros(IxDyn(&[1])))
        });
        let backend = MemoryBackend::new().with_file("big.hdf", file);
        let mut handle = backend.open_file(Path::new("big.hdf")).unwrap();
        let mut vs = handle.start_tabular().unwrap();

        assert!(matches!(vs.catalog(), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_multidim_catalog_uses_default_dim_names() {
        let backend = backend();
        let mut sd = backend.open_multidim(Path::new("granule.hdf")).unwrap();

        let catalog = sd.catalog().unwrap();
        let info = &catalog["temperature"];
        assert_eq!(info.shape, vec![2, 2]);
        assert_eq!(info.dim_names, vec!["fakeDim0", "fakeDim1"]);
        assert_eq!(info.data_type, crate::DataType::Float32);
    }
}
