use crate::{constants::FIRST_HANDLE_ID, errors::ErrorCode, ReentrantRwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Handle ID type - safer than raw pointers
pub type HandleId = u64;

/// Global handle registry for locks handed out over the C ABI.
///
/// Lookups clone the `Arc` and drop the registry mutex before returning, so
/// a caller spinning inside a lock never blocks other handle operations.
struct HandleRegistry {
    handles: Mutex<HashMap<HandleId, Arc<ReentrantRwLock>>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(FIRST_HANDLE_ID),
        }
    }

    fn register(&self, lock: ReentrantRwLock) -> Result<HandleId, ErrorCode> {
        let handle_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut handles = self.handles.lock().map_err(|_| ErrorCode::Poisoned)?;
        handles.insert(handle_id, Arc::new(lock));
        Ok(handle_id)
    }

    fn get(&self, handle_id: HandleId) -> Result<Arc<ReentrantRwLock>, ErrorCode> {
        if handle_id == 0 {
            return Err(ErrorCode::InvalidHandle);
        }
        let handles = self.handles.lock().map_err(|_| ErrorCode::Poisoned)?;
        handles
            .get(&handle_id)
            .cloned()
            .ok_or(ErrorCode::InvalidHandle)
    }

    fn unregister(&self, handle_id: HandleId) -> Result<(), ErrorCode> {
        if handle_id == 0 {
            return Err(ErrorCode::InvalidHandle);
        }
        let mut handles = self.handles.lock().map_err(|_| ErrorCode::Poisoned)?;
        match handles.remove(&handle_id) {
            Some(_) => Ok(()),
            None => Err(ErrorCode::InvalidHandle),
        }
    }
}

static REGISTRY: OnceLock<HandleRegistry> = OnceLock::new();

fn get_registry() -> &'static HandleRegistry {
    REGISTRY.get_or_init(HandleRegistry::new)
}

/// Register a new lock and return its handle ID
pub fn register_handle(lock: ReentrantRwLock) -> Result<HandleId, ErrorCode> {
    get_registry().register(lock)
}

/// Resolve a handle to a shared reference of its lock
pub fn get_handle(handle_id: HandleId) -> Result<Arc<ReentrantRwLock>, ErrorCode> {
    get_registry().get(handle_id)
}

/// Unregister a lock. Threads still inside it keep it alive until they leave.
pub fn unregister_handle(handle_id: HandleId) -> Result<(), ErrorCode> {
    get_registry().unregister(handle_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_registry() {
        let registry = HandleRegistry::new();

        assert_eq!(registry.get(0).unwrap_err(), ErrorCode::InvalidHandle);
        assert_eq!(registry.unregister(999).unwrap_err(), ErrorCode::InvalidHandle);

        let id = registry.register(ReentrantRwLock::new()).unwrap();
        assert_ne!(id, 0);
        let lock = registry.get(id).unwrap();
        assert!(lock.is_idle().unwrap());

        registry.unregister(id).unwrap();
        assert!(registry.get(id).is_err());
        // the clone taken before unregistering is still usable
        assert!(lock.is_idle().unwrap());
    }
}
