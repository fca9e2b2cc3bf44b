//! Load-once model handle
//!
//! Lifecycle: `Uninitialized → Loading → Ready | Failed`. The first caller of
//! [`ModelHandle::get`] loads the artifact under a mutex; everyone after that
//! reads the cached outcome. A failed load is never retried.

use super::{LearnedModel, ModelError, ModelLoader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

enum State {
    Uninitialized,
    Loading,
    Ready(Arc<dyn LearnedModel>),
    Failed(String),
}

/// Externally visible lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    NotConfigured,
    NotLoaded,
    Loading,
    Loaded,
    Failed(String),
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::NotConfigured => "not_configured",
            ModelStatus::NotLoaded => "not_loaded",
            ModelStatus::Loading => "loading",
            ModelStatus::Loaded => "loaded",
            ModelStatus::Failed(_) => "failed",
        }
    }
}

/// Shared, lazily loaded learned model
pub struct ModelHandle {
    path: Option<PathBuf>,
    loader: Option<Arc<dyn ModelLoader>>,
    state: RwLock<State>,
    init: Mutex<()>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("path", &self.path)
            .field("status", &self.status())
            .finish()
    }
}

impl ModelHandle {
    /// Handle that loads `path` with `loader` on first use
    ///
    /// `None` for the path means no model is configured.
    pub fn new(path: Option<PathBuf>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            path,
            loader: Some(loader),
            state: RwLock::new(State::Uninitialized),
            init: Mutex::new(()),
        }
    }

    /// Handle with no model
    pub fn disabled() -> Self {
        Self {
            path: None,
            loader: None,
            state: RwLock::new(State::Uninitialized),
            init: Mutex::new(()),
        }
    }

    /// Handle around an already constructed model
    pub fn preloaded(model: Arc<dyn LearnedModel>) -> Self {
        Self {
            path: None,
            loader: None,
            state: RwLock::new(State::Ready(model)),
            init: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached model, loading it on the first call
    pub fn get(&self) -> Option<Arc<dyn LearnedModel>> {
        if let Some(done) = self.cached() {
            return done;
        }
        let (path, loader) = match (&self.path, &self.loader) {
            (Some(path), Some(loader)) => (path, loader),
            _ => return None,
        };

        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(done) = self.cached() {
            return done;
        }

        self.set(State::Loading);
        match loader.load(path) {
            Ok(model) => {
                info!(path = %path.display(), model = model.name(), "Model loaded");
                self.set(State::Ready(model.clone()));
                Some(model)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Model load failed, continuing without it for this process"
                );
                self.set(State::Failed(e.to_string()));
                None
            }
        }
    }

    /// Like [`get`](Self::get) but reports why no model is available
    pub fn require(&self) -> Result<Arc<dyn LearnedModel>, ModelError> {
        match self.get() {
            Some(model) => Ok(model),
            None => match self.status() {
                ModelStatus::Failed(reason) => Err(ModelError::Load(reason)),
                _ => Err(ModelError::NotConfigured),
            },
        }
    }

    pub fn status(&self) -> ModelStatus {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            State::Ready(_) => ModelStatus::Loaded,
            State::Failed(reason) => ModelStatus::Failed(reason.clone()),
            State::Loading => ModelStatus::Loading,
            State::Uninitialized if self.path.is_none() => ModelStatus::NotConfigured,
            State::Uninitialized => ModelStatus::NotLoaded,
        }
    }

    /// `Some(outcome)` once loading has finished
    fn cached(&self) -> Option<Option<Arc<dyn LearnedModel>>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            State::Ready(model) => Some(Some(model.clone())),
            State::Failed(_) => Some(None),
            State::Uninitialized | State::Loading => None,
        }
    }

    fn set(&self, next: State) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearProbe, ModelInput};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: AtomicUsize,
        fail: bool,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, _path: &Path) -> Result<Arc<dyn LearnedModel>, ModelError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            if self.fail {
                Err(ModelError::Load("corrupt artifact".to_string()))
            } else {
                Ok(Arc::new(LinearProbe::new("counting", 0.0, vec![1.0])))
            }
        }
    }

    fn counting(fail: bool) -> Arc<CountingLoader> {
        Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail,
        })
    }

    #[test]
    fn test_concurrent_get_loads_once() {
        let loader = counting(false);
        let handle = Arc::new(ModelHandle::new(Some(PathBuf::from("model.json")), loader.clone()));
        assert_eq!(handle.status(), ModelStatus::NotLoaded);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || handle.get().is_some())
            })
            .collect();
        for t in threads {
            assert!(t.join().unwrap());
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(handle.status(), ModelStatus::Loaded);
    }

    #[test]
    fn test_failure_is_permanent() {
        let loader = counting(true);
        let handle = ModelHandle::new(Some(PathBuf::from("model.json")), loader.clone());

        assert!(handle.get().is_none());
        assert!(handle.get().is_none());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(handle.status().as_str(), "failed");
        assert!(matches!(handle.require(), Err(ModelError::Load(_))));
    }

    #[test]
    fn test_unconfigured_handles() {
        let handle = ModelHandle::new(None, counting(false));
        assert!(handle.get().is_none());
        assert_eq!(handle.status(), ModelStatus::NotConfigured);

        let disabled = ModelHandle::disabled();
        assert!(matches!(disabled.require(), Err(ModelError::NotConfigured)));
    }

    #[test]
    fn test_preloaded_handle() {
        let handle = ModelHandle::preloaded(Arc::new(LinearProbe::new("p", 1.0, vec![0.0])));
        assert_eq!(handle.status(), ModelStatus::Loaded);
        let model = handle.get().unwrap();
        let logits = model.infer(&ModelInput::waveform(&[0.0; 4]).unwrap()).unwrap();
        assert_eq!(logits, vec![1.0]);
    }
}
