//! Single-flight ownership of a loaded engine handle.

use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Builds an engine handle for an identity. Runs on the blocking pool.
pub trait EngineLoader<I, H>: Send + Sync {
    fn load(&self, identity: &I) -> Result<H>;
}

impl<I, H, F> EngineLoader<I, H> for F
where
    F: Fn(&I) -> Result<H> + Send + Sync,
{
    fn load(&self, identity: &I) -> Result<H> {
        self(identity)
    }
}

struct Loaded<I, H> {
    identity: I,
    handle: H,
}

/// Owns at most one fully constructed engine handle.
///
/// Loads are serialized by `load_lock`; readers never wait on it. Inference
/// callers clone the handle out and run without holding any lock. The lock
/// travels with the construction task, so a load abandoned on timeout still
/// blocks the next one until its constructor returns.
pub struct ModelState<I, H> {
    kind: &'static str,
    loader: Arc<dyn EngineLoader<I, H>>,
    load_timeout: Duration,
    load_lock: Arc<Mutex<()>>,
    slot: RwLock<Option<Arc<Loaded<I, H>>>>,
}

impl<I, H> ModelState<I, H>
where
    I: Clone + PartialEq + Debug + Send + Sync + 'static,
    H: Clone + Send + Sync + 'static,
{
    pub fn new(
        kind: &'static str,
        loader: Arc<dyn EngineLoader<I, H>>,
        load_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            loader,
            load_timeout,
            load_lock: Arc::new(Mutex::new(())),
            slot: RwLock::new(None),
        }
    }

    /// Load `identity`, replacing any different model.
    ///
    /// A no-op when the same identity is already loaded. On failure or timeout
    /// the state is left absent, even if another model was loaded before.
    pub async fn load(&self, identity: I) -> Result<()> {
        let guard = self.load_lock.clone().lock_owned().await;

        if self.current().is_some_and(|l| l.identity == identity) {
            debug!("{} model {:?} already loaded", self.kind, identity);
            return Ok(());
        }

        if self.take().is_some() {
            info!("Unloaded previous {} model before reload", self.kind);
        }

        info!("Loading {} model {:?}", self.kind, identity);
        let start = std::time::Instant::now();

        let loader = self.loader.clone();
        let target = identity.clone();
        let task = tokio::task::spawn_blocking(move || (loader.load(&target), guard));

        let (handle, _guard) = match tokio::time::timeout(self.load_timeout, task).await {
            Err(_) => {
                warn!(
                    "{} model load timed out after {:?}",
                    self.kind, self.load_timeout
                );
                return Err(Error::Timeout(format!(
                    "{} model load exceeded {:?}",
                    self.kind, self.load_timeout
                )));
            }
            Ok(Err(join)) => {
                warn!("{} model load task failed: {}", self.kind, join);
                return Err(Error::ModelLoad(format!("Load task failed: {}", join)));
            }
            Ok(Ok((Err(e), _))) => {
                warn!("{} model load failed: {}", self.kind, e);
                return Err(match e {
                    Error::ModelLoad(_) | Error::Timeout(_) => e,
                    other => Error::ModelLoad(other.to_string()),
                });
            }
            Ok(Ok((Ok(handle), guard))) => (handle, guard),
        };

        *self.slot.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Loaded { identity, handle }));
        info!(
            "{} model loaded in {:.2}s",
            self.kind,
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }

    /// Drop the loaded handle, waiting for any load in flight.
    pub async fn unload(&self) {
        let _guard = self.load_lock.lock().await;
        if self.take().is_some() {
            info!("{} model unloaded", self.kind);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    pub fn identity(&self) -> Option<I> {
        self.current().map(|l| l.identity.clone())
    }

    pub fn handle(&self) -> Option<H> {
        self.current().map(|l| l.handle.clone())
    }

    /// Handle or [`Error::EngineNotReady`].
    pub fn require(&self) -> Result<H> {
        self.handle()
            .ok_or_else(|| Error::EngineNotReady(format!("{} model is not loaded", self.kind)))
    }

    fn current(&self) -> Option<Arc<Loaded<I, H>>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take(&self) -> Option<Arc<Loaded<I, H>>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLoader {
        builds: AtomicUsize,
        active: AtomicUsize,
        peak_active: AtomicUsize,
        fail_on: Option<&'static str>,
        delay: Option<Duration>,
    }

    impl EngineLoader<String, Arc<String>> for CountingLoader {
        fn load(&self, identity: &String) -> Result<Arc<String>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(active, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail_on == Some(identity.as_str()) {
                return Err(Error::Bridge("weights missing".into()));
            }
            Ok(Arc::new(format!("engine:{identity}")))
        }
    }

    fn state(loader: Arc<CountingLoader>, timeout: Duration) -> ModelState<String, Arc<String>> {
        ModelState::new("test", loader, timeout)
    }

    #[tokio::test]
    async fn starts_absent() {
        let state = state(Arc::new(CountingLoader::default()), Duration::from_secs(5));
        assert!(!state.is_ready());
        assert!(state.identity().is_none());
        assert!(matches!(state.require(), Err(Error::EngineNotReady(_))));
    }

    #[tokio::test]
    async fn same_identity_is_constructed_once() {
        let loader = Arc::new(CountingLoader::default());
        let state = state(loader.clone(), Duration::from_secs(5));

        state.load("kokoro/a".to_string()).await.unwrap();
        state.load("kokoro/a".to_string()).await.unwrap();

        assert_eq!(loader.builds.load(Ordering::SeqCst), 1);
        assert_eq!(state.handle().unwrap().as_str(), "engine:kokoro/a");
    }

    #[tokio::test]
    async fn concurrent_loads_are_serialized() {
        let loader = Arc::new(CountingLoader {
            delay: Some(Duration::from_millis(30)),
            ..Default::default()
        });
        let state = Arc::new(state(loader.clone(), Duration::from_secs(5)));

        let (a, b) = tokio::join!(
            state.load("kokoro/a".to_string()),
            state.load("kokoro/a".to_string())
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(loader.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_identity_swaps_handle() {
        let loader = Arc::new(CountingLoader::default());
        let state = state(loader.clone(), Duration::from_secs(5));

        state.load("kokoro/a".to_string()).await.unwrap();
        state.load("kokoro/b".to_string()).await.unwrap();

        assert_eq!(loader.builds.load(Ordering::SeqCst), 2);
        assert_eq!(state.identity().as_deref(), Some("kokoro/b"));
    }

    #[tokio::test]
    async fn failed_reload_leaves_state_absent() {
        let loader = Arc::new(CountingLoader {
            fail_on: Some("broken"),
            ..Default::default()
        });
        let state = state(loader, Duration::from_secs(5));

        state.load("kokoro/a".to_string()).await.unwrap();
        let err = state.load("broken".to_string()).await.unwrap_err();

        assert!(matches!(err, Error::ModelLoad(ref m) if m.contains("weights missing")));
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn load_timeout_reverts_to_absent() {
        let loader = Arc::new(CountingLoader {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let state = state(loader, Duration::from_millis(20));

        let err = state.load("slow".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(ref m) if m.contains("20ms")));
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn timed_out_construction_blocks_the_next_load() {
        let loader = Arc::new(CountingLoader {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let state = state(loader.clone(), Duration::from_millis(50));

        assert!(state.load("a".to_string()).await.is_err());
        assert!(state.load("b".to_string()).await.is_err());
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(loader.builds.load(Ordering::SeqCst), 2);
        assert_eq!(loader.peak_active.load(Ordering::SeqCst), 1);
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn unload_waits_for_abandoned_construction() {
        let loader = Arc::new(CountingLoader {
            delay: Some(Duration::from_millis(150)),
            ..Default::default()
        });
        let state = state(loader.clone(), Duration::from_millis(20));

        assert!(state.load("a".to_string()).await.is_err());
        state.unload().await;
        assert_eq!(loader.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unload_clears_handle() {
        let state = state(Arc::new(CountingLoader::default()), Duration::from_secs(5));
        state.load("kokoro/a".to_string()).await.unwrap();
        state.unload().await;
        assert!(!state.is_ready());
    }
}
