use super::Message;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::error;

type BoxFuture = Pin<Box<dyn Future<Output = Message> + Send + 'static>>;
type BlockingJob = Box<dyn FnOnce() -> Message + Send + 'static>;

/// Deferred work requested by a page. Resolving an effect yields exactly one
/// message for the runtime; effects never touch page state themselves.
pub(crate) enum Effect {
    /// Delivered on the next loop iteration.
    Now(Message),
    /// Delivered once `delay` has passed.
    After { delay: Duration, message: Message },
    /// Async I/O such as HTTP calls or the authorization flow.
    Task(BoxFuture),
    /// Synchronous work that may block, e.g. SQLite queries.
    Blocking(BlockingJob),
}

impl Effect {
    pub(crate) fn now(message: Message) -> Self {
        Effect::Now(message)
    }

    pub(crate) fn after(delay: Duration, message: Message) -> Self {
        Effect::After { delay, message }
    }

    pub(crate) fn task(future: impl Future<Output = Message> + Send + 'static) -> Self {
        Effect::Task(Box::pin(future))
    }

    pub(crate) fn blocking(job: impl FnOnce() -> Message + Send + 'static) -> Self {
        Effect::Blocking(Box::new(job))
    }

    /// Runs the effect to completion. `None` only when a blocking job
    /// panicked and produced nothing.
    pub(crate) async fn resolve(self) -> Option<Message> {
        match self {
            Effect::Now(message) => Some(message),
            Effect::After { delay, message } => {
                tokio::time::sleep(delay).await;
                Some(message)
            }
            Effect::Task(future) => Some(future.await),
            Effect::Blocking(job) => match tokio::task::spawn_blocking(job).await {
                Ok(message) => Some(message),
                Err(err) => {
                    error!(error = %err, "Blocking effect failed");
                    None
                }
            },
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Effect::Now(_) => "now",
            Effect::After { .. } => "after",
            Effect::Task(_) => "task",
            Effect::Blocking(_) => "blocking",
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::After { delay, .. } => write!(f, "Effect::After({delay:?})"),
            other => write!(f, "Effect::{}", other.kind()),
        }
    }
}

/// Launches effects on the tokio runtime and feeds their results back into
/// the loop's channel.
#[derive(Clone)]
pub(crate) struct EffectScheduler {
    handle: Handle,
    tx: mpsc::Sender<Message>,
}

impl EffectScheduler {
    pub(crate) fn new(handle: Handle, tx: mpsc::Sender<Message>) -> Self {
        Self { handle, tx }
    }

    pub(crate) fn spawn_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.spawn(effect);
        }
    }

    pub(crate) fn spawn(&self, effect: Effect) {
        let effect = match effect {
            Effect::Now(message) => {
                let _ = self.tx.send(message);
                return;
            }
            other => other,
        };
        let tx = self.tx.clone();
        self.handle.spawn(async move {
            if let Some(message) = effect.resolve().await {
                // The loop may already be gone during shutdown.
                let _ = tx.send(message);
            }
        });
    }
}
