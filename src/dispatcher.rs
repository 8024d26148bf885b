//! Handler Dispatch
//!
//! Handlers come in two shapes: `Fn(args)` and `Fn(args, Context)`. The
//! shape is classified once, when the closure is turned into a [`Handler`],
//! and dispatch is then a match on that tag. A context is only built for
//! handlers that take one.
//!
//! ```rust,ignore
//! let mut registry = HandlerRegistry::new();
//! registry.register("echo", |args: Value| async move { Ok::<_, anyhow::Error>(args) });
//! registry.register("whoami", |_args: Value, ctx: Context| async move {
//!     Ok::<_, anyhow::Error>(json!({ "server": ctx.identity().name }))
//! });
//! ```

use {
    crate::context::Context,
    crate::error::McpError,
    crate::factory::ContextFactory,
    crate::logging,
    crate::types::RequestMeta,
    futures_util::future::BoxFuture,
    serde::{de::DeserializeOwned, Serialize},
    serde_json::Value,
    std::{collections::HashMap, future::Future, sync::Arc, time::Instant},
    tracing::Instrument,
};

/// Result type returned by handlers; errors are the handler's own.
pub type HandlerResult = anyhow::Result<Value>;

type UnaryFn = Arc<dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type BinaryFn = Arc<dyn Fn(Value, Context) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A handler classified by whether it takes a [`Context`].
#[derive(Clone)]
pub enum Handler {
    Unary(UnaryFn),
    Binary(BinaryFn),
}

impl Handler {
    /// Handler taking only its arguments.
    pub fn unary<F, Fut>(handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Handler::Unary(Arc::new(move |args| -> BoxFuture<'static, HandlerResult> {
            Box::pin(handler(args))
        }))
    }

    /// Handler taking its arguments and the request context.
    pub fn with_context<F, Fut>(handler: F) -> Self
    where
        F: Fn(Value, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Handler::Binary(Arc::new(
            move |args, ctx| -> BoxFuture<'static, HandlerResult> { Box::pin(handler(args, ctx)) },
        ))
    }

    /// Typed unary handler: arguments are deserialized into `I` and the
    /// output serialized back to JSON. Conversion failures surface as the
    /// handler's error.
    pub fn typed<I, O, F, Fut>(handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::unary(move |args| {
            let handler = Arc::clone(&handler);
            async move {
                let input: I = serde_json::from_value(args)?;
                let output = handler(input).await?;
                Ok::<Value, anyhow::Error>(serde_json::to_value(output)?)
            }
        })
    }

    /// Typed handler that also receives the request context.
    pub fn typed_with_context<I, O, F, Fut>(handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::with_context(move |args, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let input: I = serde_json::from_value(args)?;
                let output = handler(input, ctx).await?;
                Ok::<Value, anyhow::Error>(serde_json::to_value(output)?)
            }
        })
    }

    pub fn needs_context(&self) -> bool {
        matches!(self, Handler::Binary(_))
    }

    /// Run the handler, building a context from `factory` only when the
    /// handler takes one. The handler's result is returned untouched.
    pub async fn invoke(
        &self,
        args: Value,
        factory: &ContextFactory,
        meta: Option<RequestMeta>,
    ) -> HandlerResult {
        match self {
            Handler::Unary(f) => f(args).await,
            Handler::Binary(f) => {
                let ctx = factory.build_context(meta);
                let span = logging::request_span(&ctx);
                f(args, ctx).instrument(span).await
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Unary(_) => f.write_str("Handler::Unary"),
            Handler::Binary(_) => f.write_str("Handler::Binary"),
        }
    }
}

/// Marker: closure takes only its arguments.
pub struct ArgsOnly;
/// Marker: closure takes its arguments and a [`Context`].
pub struct WithContext;

/// Conversion of a closure into a classified [`Handler`]. The marker is
/// inferred from the closure's parameter list.
pub trait IntoHandler<Marker> {
    fn into_handler(self) -> Handler;
}

impl<F, Fut> IntoHandler<ArgsOnly> for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::unary(self)
    }
}

impl<F, Fut> IntoHandler<WithContext> for F
where
    F: Fn(Value, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::with_context(self)
    }
}

impl IntoHandler<Handler> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

/// Named handlers, classified at registration.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a handler under `name`.
    pub fn register<M>(&mut self, name: impl Into<String>, handler: impl IntoHandler<M>) -> &mut Self {
        self.handlers.insert(name.into(), handler.into_handler());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub struct HandlerDispatcher {
    factory: Arc<ContextFactory>,
    registry: HandlerRegistry,
}

impl HandlerDispatcher {
    pub fn new(factory: Arc<ContextFactory>, registry: HandlerRegistry) -> Self {
        Self { factory, registry }
    }

    pub fn factory(&self) -> &Arc<ContextFactory> {
        &self.factory
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Invoke an already resolved handler.
    pub async fn invoke(
        &self,
        handler: &Handler,
        args: Value,
        meta: Option<RequestMeta>,
    ) -> HandlerResult {
        handler.invoke(args, &self.factory, meta).await
    }

    /// Resolve `name` in the registry and invoke it.
    ///
    /// # Errors
    /// [`McpError::UnknownTool`] for an unregistered name; otherwise exactly
    /// what the handler returned.
    pub async fn call(&self, name: &str, args: Value, meta: Option<RequestMeta>) -> HandlerResult {
        let handler = self
            .registry
            .get(name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        logging::log_handler_start(name, handler.needs_context());
        let started = Instant::now();
        let result = self
            .invoke(handler, args, meta)
            .instrument(logging::handler_span(name))
            .await;

        match &result {
            Ok(_) => logging::log_handler_success(name, started.elapsed()),
            Err(e) => logging::log_handler_error(name, e, started.elapsed()),
        }
        result
    }
}
