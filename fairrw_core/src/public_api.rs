use crate::{
    errors::{map_error, set_last_error, ErrorCode},
    handle_registry::{get_handle, register_handle, unregister_handle, HandleId},
    types::HolderId,
    ReentrantRwLock,
};
use std::sync::Arc;

// ─────────────────────────── helpers ─────────────────────────────────── //

/// Record `code` as the thread's last error and hand it back.
#[inline]
fn finish(code: ErrorCode) -> ErrorCode {
    set_last_error(code);
    code
}

// ─── small helper to turn Result<T,ErrorCode> into early-return ──────────
macro_rules! try_c { ($expr:expr) => { match $expr {
    Ok(v)  => v,
    Err(e) => return finish(e),
}}}

#[inline]
fn with_lock<F>(h: HandleId, f: F) -> ErrorCode
where
    F: FnOnce(&Arc<ReentrantRwLock>) -> Result<(), crate::errors::Error>,
{
    let lock = try_c!(get_handle(h));
    match f(&lock) {
        Ok(()) => finish(ErrorCode::Success),
        Err(e) => finish(map_error(&e)),
    }
}

// ───────────────────────── lifetime ──────────────────────────────────── //

/// Create a lock.
/// Returns `Success` **and** stores the handle in `*out`
/// -- or an error code otherwise.
#[no_mangle]
pub extern "C" fn fairrw_open(out: *mut HandleId) -> ErrorCode {
    if out.is_null() {
        return finish(ErrorCode::NullPointer);
    }
    let id = try_c!(register_handle(ReentrantRwLock::new()));
    unsafe { *out = id };
    finish(ErrorCode::Success)
}

/// Forget a handle. Callers still spinning inside the lock finish normally.
#[no_mangle]
pub extern "C" fn fairrw_close(h: HandleId) -> ErrorCode {
    try_c!(unregister_handle(h));
    finish(ErrorCode::Success)
}

/// Identity of the calling thread, suitable as the `holder` argument.
#[no_mangle]
pub extern "C" fn fairrw_current_holder() -> u64 {
    HolderId::current().as_raw()
}

// ───────────────────────── locking ───────────────────────────────────── //

/// `holder` is either a value from `fairrw_current_holder` or a caller-chosen
/// id below 2^63. Equal ids are one holder: a second write by the same id is
/// a reentrant grant, not a wait.
#[no_mangle]
pub extern "C" fn fairrw_acquire_write(h: HandleId, holder: u64) -> ErrorCode {
    with_lock(h, |lock| lock.acquire_write(HolderId::from_raw(holder)))
}

#[no_mangle]
pub extern "C" fn fairrw_release_write(h: HandleId, holder: u64) -> ErrorCode {
    with_lock(h, |lock| lock.release_write(HolderId::from_raw(holder)))
}

#[no_mangle]
pub extern "C" fn fairrw_acquire_read(h: HandleId, holder: u64) -> ErrorCode {
    with_lock(h, |lock| lock.acquire_read(HolderId::from_raw(holder)))
}

#[no_mangle]
pub extern "C" fn fairrw_release_read(h: HandleId, holder: u64) -> ErrorCode {
    with_lock(h, |lock| lock.release_read(HolderId::from_raw(holder)))
}

// ───────────────────────── introspection ─────────────────────────────── //

#[no_mangle]
pub extern "C" fn fairrw_queue_len(h: HandleId, out: *mut usize) -> ErrorCode {
    if out.is_null() {
        return finish(ErrorCode::NullPointer);
    }
    with_lock(h, |lock| {
        let len = lock.queue_len()?;
        unsafe { *out = len };
        Ok(())
    })
}
