use crate::{
    error::{ConfigError, InferError, LoadError, PredictError},
    model::{InferenceEngine, ModelSource},
    tensor::Tensor,
};
use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

/// Lifecycle state of the cached inference session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No session loaded, or the last one was discarded.
    Uninitialized,
    /// A session is loaded and idle.
    Ready,
    /// A forward pass is executing.
    Running,
}

impl SessionState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
        }
    }
}

// Every write replaces the whole value, so a poisoned guard is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single guarded slot holding the lazily loaded session of an engine.
///
/// The session is loaded on first use, reused by every later call and dropped
/// as soon as a forward pass through it fails. It is only ever replaced as a
/// whole, never patched.
pub struct SessionSlot<E: InferenceEngine> {
    engine: E,
    source: ModelSource,
    expected_outputs: usize,
    session: Mutex<Option<E::Session>>,
    state: Mutex<SessionState>,
    loads: AtomicUsize,
}

impl<E: InferenceEngine> SessionSlot<E> {
    /// Creates an empty slot. Nothing is loaded until [`SessionSlot::acquire`].
    ///
    /// # Arguments
    /// * `engine` - The backend that loads and runs the model
    /// * `source` - Locator handed to the engine's `load`
    /// * `expected_outputs` - Catalog size the model's output must match
    pub fn new(engine: E, source: ModelSource, expected_outputs: usize) -> Self {
        Self {
            engine,
            source,
            expected_outputs,
            session: Mutex::new(None),
            state: Mutex::new(SessionState::Uninitialized),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Returns the current state of the slot.
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// How many times the model has been loaded so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    /// Locks the slot, loading the session first if there is none.
    ///
    /// The returned handle holds the slot exclusively, so forward passes never
    /// interleave.
    pub fn acquire(&self) -> Result<ActiveSession<'_, E>, PredictError> {
        let mut guard = lock(&self.session);

        if guard.is_some() {
            log::debug!("Using existing session");
        } else {
            log::info!("Loading model from {}", self.source.describe());
            self.loads.fetch_add(1, Ordering::SeqCst);

            let session = self.engine.load(&self.source).map_err(|e| {
                log::error!("Failed to load model from {}: {e}", self.source.describe());
                LoadError::new(self.source.describe(), e)
            })?;

            if let Some(outputs) = self.engine.output_len(&session) {
                if outputs != self.expected_outputs {
                    log::error!(
                        "Model declares {outputs} outputs, catalog has {}",
                        self.expected_outputs
                    );
                    return Err(ConfigError::OutputMismatch {
                        expected: self.expected_outputs,
                        actual: outputs,
                    }
                    .into());
                }
            }

            log::info!("Model loaded successfully");
            *guard = Some(session);
            self.set_state(SessionState::Ready);
        }

        Ok(ActiveSession { slot: self, guard })
    }

    /// Drops the cached session; the next [`SessionSlot::acquire`] reloads.
    pub fn invalidate(&self) {
        let mut guard = lock(&self.session);
        if guard.take().is_some() {
            log::info!("Session invalidated");
        }
        self.set_state(SessionState::Uninitialized);
    }
}

/// Exclusive access to a loaded session.
pub struct ActiveSession<'a, E: InferenceEngine> {
    slot: &'a SessionSlot<E>,
    guard: MutexGuard<'a, Option<E::Session>>,
}

impl<E: InferenceEngine> ActiveSession<'_, E> {
    /// Runs one forward pass. On failure the session is discarded.
    pub fn run(&mut self, tensor: &Tensor) -> Result<Vec<f32>, InferError> {
        let Some(session) = self.guard.as_mut() else {
            return Err(InferError::new("session was invalidated"));
        };

        self.slot.set_state(SessionState::Running);
        let result = match self.slot.engine.run(session, tensor) {
            Ok(scores) if scores.iter().all(|s| s.is_finite()) => Ok(scores),
            Ok(_) => Err(InferError::new("engine returned non-finite scores")),
            Err(e) => Err(InferError::new(e)),
        };

        match result {
            Ok(scores) => {
                self.slot.set_state(SessionState::Ready);
                Ok(scores)
            }
            Err(e) => {
                log::warn!("Forward pass failed, discarding session: {}", e.source);
                *self.guard = None;
                self.slot.set_state(SessionState::Uninitialized);
                Err(e)
            }
        }
    }
}
