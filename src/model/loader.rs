//! Model loading and the process-wide model handle.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{ArrayD, IxDyn};
use once_cell::sync::OnceCell;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::StyleTensor;

use super::store::ModelStore;

/// Preferred graph file name inside a model directory.
pub const MODEL_FILENAME: &str = "model.onnx";

/// Graph file of a TensorFlow SavedModel, which ONNX Runtime cannot load.
const SAVED_MODEL_FILENAME: &str = "saved_model.pb";

/// A loaded style-transfer network.
pub trait StyleModel: Send + Sync {
    /// Run the network on a content and a style tensor.
    ///
    /// Returns every model output in order; the stylized image is at index 0.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn infer(&self, content: &StyleTensor, style: &StyleTensor) -> Result<Vec<ArrayD<f32>>>;
}

/// Style-transfer network executed by ONNX Runtime.
pub struct OnnxStyleModel {
    session: Mutex<Session>,
    path: PathBuf,
}

impl OnnxStyleModel {
    /// Load the graph found in `model_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if no graph file exists or ONNX Runtime rejects it.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = find_model_file(model_dir)?;
        let name = path.display().to_string();

        tracing::info!("Loading style transfer model from {name}");

        let session = Session::builder()
            .map_err(|source| Error::ModelLoad {
                name: name.clone(),
                source,
            })?
            .commit_from_file(&path)
            .map_err(|source| Error::ModelLoad { name, source })?;

        Ok(Self {
            session: Mutex::new(session),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for OnnxStyleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxStyleModel")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StyleModel for OnnxStyleModel {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn infer(&self, content: &StyleTensor, style: &StyleTensor) -> Result<Vec<ArrayD<f32>>> {
        let content_value = Tensor::from_array(content.clone().into_array())
            .map_err(|source| Error::Inference { source })?;
        let style_value = Tensor::from_array(style.clone().into_array())
            .map_err(|source| Error::Inference { source })?;

        // A poisoned lock only means another inference panicked
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let outputs = session
            .run(ort::inputs![content_value, style_value])
            .map_err(|source| Error::Inference { source })?;

        let arrays = outputs
            .values()
            .map(|value| {
                let (shape, data) = value
                    .try_extract_tensor::<f32>()
                    .map_err(|source| Error::Inference { source })?;
                // Safe: tensor dimensions are always non-negative
                let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
                ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
                    .map_err(|e| Error::shape(format!("{dims:?}"), e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Model returned {} output(s)", arrays.len());
        Ok(arrays)
    }
}

/// Locate the graph file: `model.onnx` at the top, else the first `*.onnx` below.
fn find_model_file(model_dir: &Path) -> Result<PathBuf> {
    let preferred = model_dir.join(MODEL_FILENAME);
    if preferred.is_file() {
        return Ok(preferred);
    }

    let mut saved_model = None;
    let mut pending = vec![model_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for path in &entries {
            if path.is_file() && path.extension().is_some_and(|ext| ext == "onnx") {
                return Ok(path.clone());
            }
            if saved_model.is_none()
                && path.file_name().is_some_and(|n| n == SAVED_MODEL_FILENAME)
            {
                saved_model = Some(path.clone());
            }
        }
        // Depth-first, visiting subdirectories in name order
        pending.extend(entries.into_iter().filter(|p| p.is_dir()).rev());
    }

    if let Some(path) = saved_model {
        return Err(Error::UnsupportedModelFormat {
            path,
            reason: "TensorFlow SavedModel found; point the model URL at an archive \
                     containing an ONNX export"
                .to_string(),
        });
    }

    Err(Error::MissingModelFile {
        path: model_dir.to_path_buf(),
    })
}

type Loader = dyn Fn() -> Result<Arc<dyn StyleModel>> + Send + Sync;

/// Lazily loaded, process-lifetime model.
///
/// The first successful [`get`](Self::get) runs the loader; later calls return
/// the same model. A failed load leaves the handle unloaded so the next call
/// retries. Concurrent first calls block until one loader finishes.
pub struct ModelHandle {
    cell: OnceCell<Arc<dyn StyleModel>>,
    loader: Box<Loader>,
}

impl ModelHandle {
    /// Handle that fetches `url` into `model_dir` and loads it with ONNX Runtime.
    #[must_use]
    pub fn remote(
        url: impl Into<String>,
        model_dir: impl Into<PathBuf>,
        show_progress: bool,
    ) -> Self {
        let url = url.into();
        let model_dir = model_dir.into();
        Self::with_loader(move || {
            let path = ModelStore::new()
                .show_progress(show_progress)
                .ensure_local(&url, &model_dir)?;
            let model: Arc<dyn StyleModel> = Arc::new(OnnxStyleModel::load(&path)?);
            Ok(model)
        })
    }

    /// Handle backed by a custom loader.
    pub fn with_loader<L>(loader: L) -> Self
    where
        L: Fn() -> Result<Arc<dyn StyleModel>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Handle wrapping an already loaded model.
    #[must_use]
    pub fn preloaded(model: Arc<dyn StyleModel>) -> Self {
        let handle = Self::with_loader(|| {
            Err(Error::InvalidParameter {
                name: "loader".to_string(),
                reason: "preloaded handle has no loader".to_string(),
            })
        });
        // Cannot fail: the cell was just created
        let _ = handle.cell.set(model);
        handle
    }

    /// Return the loaded model, loading it on first use.
    ///
    /// # Errors
    ///
    /// Propagates any download, extraction, or load error; the handle stays unloaded.
    pub fn get(&self) -> Result<Arc<dyn StyleModel>> {
        self.cell
            .get_or_try_init(|| (self.loader)())
            .map(Arc::clone)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
