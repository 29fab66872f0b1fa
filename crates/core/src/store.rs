use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::request::{ApprovalRequest, RequestId};
use crate::errors::EngineError;

/// Owns request aggregates and serializes writers per request. Mutations
/// go through `with_request` so invariants hold under concurrency: one
/// writer per request, distinct requests fully concurrent. The storage
/// engine behind a production deployment is an external collaborator;
/// this trait is the seam it plugs into.
pub trait RequestStore: Send + Sync {
    fn insert(&self, request: ApprovalRequest) -> Result<(), EngineError>;

    /// A point-in-time snapshot of the aggregate.
    fn get(&self, id: &RequestId) -> Result<ApprovalRequest, EngineError>;

    fn ids(&self) -> Vec<RequestId>;

    /// Runs `mutate` with exclusive access to the aggregate. An `Err`
    /// leaves whatever `mutate` wrote: callers must mutate only after all
    /// their checks pass (the state machine functions are written this
    /// way).
    fn with_request<T, F>(&self, id: &RequestId, mutate: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut ApprovalRequest) -> Result<T, EngineError>;
}

#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<Mutex<HashMap<RequestId, Arc<Mutex<ApprovalRequest>>>>>,
}

impl InMemoryRequestStore {
    fn entry(&self, id: &RequestId) -> Result<Arc<Mutex<ApprovalRequest>>, EngineError> {
        let requests = lock(&self.requests);
        requests
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::RequestNotFound(id.0.clone()))
    }
}

impl RequestStore for InMemoryRequestStore {
    fn insert(&self, request: ApprovalRequest) -> Result<(), EngineError> {
        let mut requests = lock(&self.requests);
        if requests.contains_key(&request.id) {
            return Err(EngineError::Validation(format!(
                "request `{}` already exists",
                request.id.0
            )));
        }
        requests.insert(request.id.clone(), Arc::new(Mutex::new(request)));
        Ok(())
    }

    fn get(&self, id: &RequestId) -> Result<ApprovalRequest, EngineError> {
        let entry = self.entry(id)?;
        let request = lock(&entry);
        Ok(request.clone())
    }

    fn ids(&self) -> Vec<RequestId> {
        let requests = lock(&self.requests);
        let mut ids: Vec<RequestId> = requests.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn with_request<T, F>(&self, id: &RequestId, mutate: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut ApprovalRequest) -> Result<T, EngineError>,
    {
        // The registry lock is released before the per-request lock is
        // taken, so a slow mutation on one request never blocks another.
        let entry = self.entry(id)?;
        let mut request = lock(&entry);
        mutate(&mut request)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
