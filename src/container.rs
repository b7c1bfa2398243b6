//! Container handle: lazy sessions and name resolution across SD and VS.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::ArrayD;

use crate::array::{Element, RawArray};
use crate::backend::{
    Backend, FileHandle, MultidimInfo, MultidimSession, NpyDirBackend, TabularInfo,
    TabularSession, read_and_detach,
};
use crate::error::{AttachError, DecodeError, Error, Result};

type TabularOf<B> = <<B as Backend>::File as FileHandle>::Tabular;

/// An open VS session together with the file handle it was started from.
struct TabularState<B: Backend> {
    file: B::File,
    session: TabularOf<B>,
}

/// Reader for one container file.
///
/// Construction does no I/O. The SD and VS sessions are opened the first time
/// an operation needs them and stay open until [`Container::close`] or drop.
///
/// ```rust,ignore
/// use eoshdf::Container;
///
/// let mut granule = Container::open("MOD06_L2.A2015001.hdf");
/// for name in granule.list_datasets()? {
///     println!("{}", name);
/// }
/// let cloud_top = granule.read_data("Cloud_Top_Temperature")?;
/// granule.close()?;
/// ```
///
/// No scale factors, offsets or fill values are applied to read data.
pub struct Container<B: Backend = NpyDirBackend> {
    path: PathBuf,
    backend: B,
    tabular: Option<TabularState<B>>,
    multidim: Option<B::Multidim>,
}

impl Container<NpyDirBackend> {
    /// Create a handle for `path` using the `.npy` directory decoder.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(path, NpyDirBackend::new())
    }
}

impl<B: Backend> Container<B> {
    /// Create a handle for `path` using `backend` to decode it.
    pub fn with_backend(path: impl Into<PathBuf>, backend: B) -> Self {
        Self {
            path: path.into(),
            backend,
            tabular: None,
            multidim: None,
        }
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The decoder backing this handle.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the VS session is currently open.
    pub fn is_tabular_open(&self) -> bool {
        self.tabular.is_some()
    }

    /// Whether the SD session is currently open.
    pub fn is_multidim_open(&self) -> bool {
        self.multidim.is_some()
    }

    /// Release every open session.
    ///
    /// The VS session is ended before its file handle is closed; the SD
    /// session is ended independently. All steps run even if one fails, and
    /// the first failure is returned. Calling this with nothing open does
    /// nothing. A later read opens sessions again.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error: Option<DecodeError> = None;

        if let Some(TabularState { file, session }) = self.tabular.take() {
            log::debug!("Ending VS session for {}", self.path.display());
            if let Err(e) = session.end() {
                first_error.get_or_insert(e);
            }
            if let Err(e) = file.close() {
                first_error.get_or_insert(e);
            }
        }

        if let Some(session) = self.multidim.take() {
            log::debug!("Ending SD session for {}", self.path.display());
            if let Err(e) = session.end() {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn multidim_session(&mut self) -> Result<&mut B::Multidim, DecodeError> {
        let session = match self.multidim.take() {
            Some(session) => session,
            None => {
                log::debug!("Opening SD session for {}", self.path.display());
                self.backend.open_multidim(&self.path)?
            }
        };
        Ok(self.multidim.insert(session))
    }

    fn tabular_session(&mut self) -> Result<&mut TabularOf<B>, DecodeError> {
        let state = match self.tabular.take() {
            Some(state) => state,
            None => {
                log::debug!("Opening VS session for {}", self.path.display());
                let mut file = self.backend.open_file(&self.path)?;
                let session = match file.start_tabular() {
                    Ok(session) => session,
                    Err(e) => {
                        if let Err(close_err) = file.close() {
                            log::warn!(
                                "Closing {} after failed VS start: {}",
                                self.path.display(),
                                close_err
                            );
                        }
                        return Err(e);
                    }
                };
                TabularState { file, session }
            }
        };
        Ok(&mut self.tabular.insert(state).session)
    }

    /// Every dataset name from both interfaces, sorted.
    ///
    /// A name present in both interfaces is listed twice. Some listed names
    /// may be internal bookkeeping records rather than science data.
    pub fn list_datasets(&mut self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .list_tabular_datasets()?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.extend(self.list_multidim_datasets()?.into_keys());
        names.sort();
        Ok(names)
    }

    /// VS catalog in the decoder's native order.
    pub fn list_tabular_datasets(&mut self) -> Result<Vec<(String, TabularInfo)>> {
        Ok(self.tabular_session()?.catalog()?)
    }

    /// SD catalog keyed by dataset name.
    pub fn list_multidim_datasets(&mut self) -> Result<HashMap<String, MultidimInfo>> {
        Ok(self.multidim_session()?.catalog()?)
    }

    fn fetch_multidim(&mut self, name: &str) -> Result<RawArray, AttachError> {
        let record = self.multidim_session()?.select(name)?;
        Ok(read_and_detach(record)?)
    }

    fn fetch_tabular(&mut self, name: &str) -> Result<RawArray, AttachError> {
        let record = self.tabular_session()?.attach(name)?;
        Ok(read_and_detach(record)?)
    }

    /// Read a dataset as `f64`. See [`Container::read_data_as`].
    pub fn read_data(&mut self, name: &str) -> Result<ArrayD<f64>> {
        self.read_data_as(name)
    }

    /// Read a dataset from whichever interface holds it.
    ///
    /// The SD interface is tried first and keeps the native shape. If the
    /// name is not an SD dataset, the VS interface is tried and the result is
    /// flattened to one dimension. Decoder failures other than "not found"
    /// are returned without trying the other interface.
    pub fn read_data_as<T: Element>(&mut self, name: &str) -> Result<ArrayD<T>> {
        match self.fetch_multidim(name) {
            Ok(data) => return Ok(data.cast()),
            Err(AttachError::NotFound { .. }) => {
                log::trace!("{} is not an SD dataset, trying VS", name);
            }
            Err(AttachError::Decode(e)) => return Err(e.into()),
        }
        self.read_tabular_data_as(name)
    }

    /// Read an SD dataset as `f64`.
    pub fn read_multidim_data(&mut self, name: &str) -> Result<ArrayD<f64>> {
        self.read_multidim_data_as(name)
    }

    /// Read an SD dataset, keeping its native shape.
    pub fn read_multidim_data_as<T: Element>(&mut self, name: &str) -> Result<ArrayD<T>> {
        match self.fetch_multidim(name) {
            Ok(data) => Ok(data.cast()),
            Err(AttachError::NotFound { .. }) => Err(Error::dataset_not_found(name)),
            Err(AttachError::Decode(e)) => Err(e.into()),
        }
    }

    /// Read a VS dataset as `f64`.
    pub fn read_tabular_data(&mut self, name: &str) -> Result<ArrayD<f64>> {
        self.read_tabular_data_as(name)
    }

    /// Read a VS dataset, flattened to one dimension.
    ///
    /// Decoders may report vdata as records × fields; the result is always
    /// the row-major flattening of that.
    pub fn read_tabular_data_as<T: Element>(&mut self, name: &str) -> Result<ArrayD<T>> {
        match self.fetch_tabular(name) {
            Ok(data) => Ok(data.cast_flat()),
            Err(AttachError::NotFound { .. }) => Err(Error::dataset_not_found(name)),
            Err(AttachError::Decode(e)) => Err(e.into()),
        }
    }

    /// Alias of [`Container::read_tabular_data`].
    pub fn read_1d_data(&mut self, name: &str) -> Result<ArrayD<f64>> {
        self.read_tabular_data(name)
    }

    /// Alias of [`Container::read_multidim_data`].
    pub fn read_2d_data(&mut self, name: &str) -> Result<ArrayD<f64>> {
        self.read_multidim_data(name)
    }
}

impl<B: Backend> Drop for Container<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Error closing {}: {}", self.path.display(), e);
        }
    }
}

impl<B: Backend> std::fmt::Debug for Container<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("tabular_open", &self.is_tabular_open())
            .field("multidim_open", &self.is_multidim_open())
            .finish()
    }
}
