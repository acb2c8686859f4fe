//! Collapses concurrent identical reads into one call.
//!
//! The first caller for a key starts the work on its own task; later
//! callers attach to the same shared future and observe the identical
//! result. The record is removed as soon as the work settles, whether or
//! not anyone is still waiting.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::domain::errors::RequestError;

type SharedCall<T> = Shared<BoxFuture<'static, Result<T, RequestError>>>;

struct InFlight<T: Clone> {
    generation: u64,
    call: SharedCall<T>,
}

struct Registry<T: Clone> {
    calls: HashMap<String, InFlight<T>>,
    next_generation: u64,
}

pub struct RequestDeduplicator<T: Clone> {
    registry: Arc<Mutex<Registry<T>>>,
}

fn lock<T: Clone>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                calls: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Run `factory` for `key` unless an identical call is already running.
    pub async fn dedupe<F, Fut>(&self, key: &str, factory: F) -> Result<T, RequestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        let call = {
            let mut registry = lock(&self.registry);

            if let Some(existing) = registry.calls.get(key) {
                debug!(key, "attaching to in-flight request");
                existing.call.clone()
            } else {
                let generation = registry.next_generation;
                registry.next_generation += 1;

                let owner = Arc::clone(&self.registry);
                let owned_key = key.to_string();
                let work = factory();
                let handle = tokio::spawn(async move {
                    let result = work.await;
                    let mut registry = lock(&owner);
                    if registry
                        .calls
                        .get(&owned_key)
                        .is_some_and(|c| c.generation == generation)
                    {
                        registry.calls.remove(&owned_key);
                    }
                    result
                });

                let call: SharedCall<T> = async move {
                    handle
                        .await
                        .unwrap_or_else(|err| Err(RequestError::Aborted(err.to_string())))
                }
                .boxed()
                .shared();

                registry.calls.insert(
                    key.to_string(),
                    InFlight {
                        generation,
                        call: call.clone(),
                    },
                );
                call
            }
        };

        call.await
    }

    /// Keys with a call currently outstanding.
    pub fn in_flight(&self) -> Vec<String> {
        lock(&self.registry).calls.keys().cloned().collect()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.registry).calls.contains_key(key)
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
