//! Lifespan Lifecycle
//!
//! Startup and shutdown hooks around the process-wide [`LifespanState`].
//! Hook failures (errors or panics) are logged and never propagated: the
//! server stays reachable when optional bootstrapping fails, and shutdown
//! always completes.

use {
    crate::lifespan::LifespanState,
    crate::logging,
    futures_util::future::{BoxFuture, FutureExt},
    std::{future::Future, panic::AssertUnwindSafe, sync::Arc},
};

/// A startup or shutdown hook operating on the shared lifespan state.
pub type LifespanHook =
    Box<dyn FnOnce(Arc<LifespanState>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Box an async closure as a [`LifespanHook`].
pub fn lifespan_hook<F, Fut>(hook: F) -> LifespanHook
where
    F: FnOnce(Arc<LifespanState>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |state| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(hook(state)) })
}

#[derive(Default)]
pub struct LifecycleManager {
    on_startup: Option<LifespanHook>,
    on_shutdown: Option<LifespanHook>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Arc<LifespanState>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_startup = Some(lifespan_hook(hook));
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Arc<LifespanState>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_shutdown = Some(lifespan_hook(hook));
        self
    }

    /// Create the lifespan state and run the registered startup hook.
    /// The hook runs at most once across calls.
    pub async fn start(&mut self) -> Arc<LifespanState> {
        Self::run_startup(self.on_startup.take()).await
    }

    /// Run the registered shutdown hook and release the state.
    pub async fn stop(&mut self, state: &Arc<LifespanState>) {
        Self::run_shutdown(state, self.on_shutdown.take()).await
    }

    /// Create an empty state, hand it to `hook`, and return it whether or
    /// not the hook succeeded.
    pub async fn run_startup(hook: Option<LifespanHook>) -> Arc<LifespanState> {
        let state = Arc::new(LifespanState::new());
        if let Some(hook) = hook {
            run_supervised("startup", hook, Arc::clone(&state)).await;
        }
        logging::log_lifespan_started(state.len());
        state
    }

    /// Hand `state` to `hook` for cleanup, then clear it.
    pub async fn run_shutdown(state: &Arc<LifespanState>, hook: Option<LifespanHook>) {
        if let Some(hook) = hook {
            run_supervised("shutdown", hook, Arc::clone(state)).await;
        }
        state.clear();
        logging::log_lifespan_stopped();
    }
}

async fn run_supervised(phase: &str, hook: LifespanHook, state: Arc<LifespanState>) {
    let outcome = AssertUnwindSafe(async move { hook(state).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => logging::log_hook_failure(phase, &e),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            logging::log_hook_failure(phase, &anyhow::anyhow!("hook panicked: {reason}"));
        }
    }
}
