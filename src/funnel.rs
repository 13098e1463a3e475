use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{BotError, Result};

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, error: Arc<BotError>);
}

#[async_trait]
impl<F, Fut> ErrorHandler for F
where
    F: Fn(Arc<BotError>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, error: Arc<BotError>) {
        (self)(error).await
    }
}

/// Single chokepoint for failures raised by bot operations and handlers.
///
/// Until an error handler is registered, errors are returned to the caller.
/// Once one is, every error is delivered to the error handlers on a spawned
/// task and the caller gets its fallback value instead. Registration cannot
/// be undone.
#[derive(Default)]
pub struct ErrorFunnel {
    has_catcher: AtomicBool,
    handlers: RwLock<Vec<Arc<dyn ErrorHandler>>>,
}

impl ErrorFunnel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn ErrorHandler>) {
        match self.handlers.write() {
            Ok(mut handlers) => handlers.push(handler),
            Err(poisoned) => poisoned.into_inner().push(handler),
        }
        self.has_catcher.store(true, Ordering::SeqCst);
    }

    pub fn has_catcher(&self) -> bool {
        self.has_catcher.load(Ordering::SeqCst)
    }

    /// Route `error`: notify the error handlers and return `fallback`, or
    /// hand the error back when nobody is listening.
    pub fn handle<T>(&self, error: BotError, fallback: T) -> Result<T> {
        if !self.has_catcher() {
            return Err(error);
        }

        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        debug!("Routing error to {} error handler(s): {error}", handlers.len());

        let error = Arc::new(error);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    for handler in handlers {
                        handler.handle(error.clone()).await;
                    }
                });
            }
            Err(_) => warn!("No async runtime to deliver error: {error}"),
        }

        Ok(fallback)
    }
}
