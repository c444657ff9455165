mod audit;
mod expire;
mod retention;
mod webhook;

pub use audit::*;
pub use expire::*;
pub use retention::*;
pub use webhook::*;

use std::future::Future;

/// Spawn a background worker under a supervisor: a panicking iteration is
/// caught at the task boundary, logged, and the loop restarts. A clean
/// return (shutdown) ends the supervisor too.
pub fn spawn_supervised<F, Fut>(name: &'static str, factory: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let handle = tokio::spawn(factory());
            match handle.await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(worker = name, error = %e, "worker crashed, restarting");
                }
            }
        }
    });
}
