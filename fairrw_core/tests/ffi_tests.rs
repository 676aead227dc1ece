use fairrw_core::errors::{fairrw_last_error, fairrw_strerror};
use fairrw_core::public_api::*;
use fairrw_core::ErrorCode;
use std::ffi::CStr;
use std::ptr;

fn open() -> u64 {
    let mut h = 0u64;
    assert_eq!(fairrw_open(&mut h), ErrorCode::Success);
    assert_ne!(h, 0, "handle ids start at 1");
    h
}

fn queue_len(h: u64) -> usize {
    let mut len = usize::MAX;
    assert_eq!(fairrw_queue_len(h, &mut len), ErrorCode::Success);
    len
}

#[test]
fn open_acquire_release_close() {
    let h = open();
    let me = fairrw_current_holder();

    assert_eq!(fairrw_acquire_write(h, me), ErrorCode::Success);
    assert_eq!(fairrw_acquire_write(h, me), ErrorCode::Success);
    assert_eq!(queue_len(h), 1);
    assert_eq!(fairrw_release_write(h, me), ErrorCode::Success);
    assert_eq!(fairrw_release_write(h, me), ErrorCode::Success);
    assert_eq!(queue_len(h), 0);

    assert_eq!(fairrw_acquire_read(h, me), ErrorCode::Success);
    assert_eq!(fairrw_acquire_read(h, me), ErrorCode::Success);
    assert_eq!(queue_len(h), 2);
    assert_eq!(fairrw_release_read(h, me), ErrorCode::Success);
    assert_eq!(fairrw_release_read(h, me), ErrorCode::Success);
    assert_eq!(queue_len(h), 0);

    assert_eq!(fairrw_close(h), ErrorCode::Success);
    assert_eq!(fairrw_last_error(), ErrorCode::Success);
}

#[test]
fn unknown_handles_are_rejected() {
    let me = fairrw_current_holder();
    assert_eq!(fairrw_acquire_write(0, me), ErrorCode::InvalidHandle);
    assert_eq!(fairrw_last_error(), ErrorCode::InvalidHandle);
    assert_eq!(fairrw_release_read(u64::MAX, me), ErrorCode::InvalidHandle);

    let h = open();
    assert_eq!(fairrw_close(h), ErrorCode::Success);
    assert_eq!(fairrw_close(h), ErrorCode::InvalidHandle);
    assert_eq!(fairrw_acquire_read(h, me), ErrorCode::InvalidHandle);
}

#[test]
fn null_out_pointers_are_rejected() {
    assert_eq!(fairrw_open(ptr::null_mut()), ErrorCode::NullPointer);
    assert_eq!(fairrw_last_error(), ErrorCode::NullPointer);

    let h = open();
    assert_eq!(fairrw_queue_len(h, ptr::null_mut()), ErrorCode::NullPointer);
    assert_eq!(fairrw_close(h), ErrorCode::Success);
}

#[test]
fn usage_errors_map_to_codes() {
    let h = open();
    let me = fairrw_current_holder();

    assert_eq!(fairrw_release_write(h, me), ErrorCode::UnmatchedRelease);
    assert_eq!(fairrw_last_error(), ErrorCode::UnmatchedRelease);
    assert_eq!(fairrw_release_read(h, me), ErrorCode::UnmatchedRelease);

    assert_eq!(fairrw_acquire_read(h, me), ErrorCode::Success);
    assert_eq!(fairrw_acquire_write(h, me), ErrorCode::WouldDeadlock);
    assert_eq!(fairrw_last_error(), ErrorCode::WouldDeadlock);
    assert_eq!(queue_len(h), 1, "refused upgrade leaves the queue alone");
    assert_eq!(fairrw_release_read(h, me), ErrorCode::Success);

    assert_eq!(fairrw_close(h), ErrorCode::Success);
}

#[test]
fn holders_are_distinct_per_thread() {
    let here = fairrw_current_holder();
    assert_eq!(here, fairrw_current_holder());
    let there = std::thread::spawn(|| fairrw_current_holder()).join().unwrap();
    assert_ne!(here, there);
    assert!(here >= 1 << 63 && there >= 1 << 63, "thread ids share the raw id range");
}

#[test]
fn strerror_is_a_static_c_string() {
    for code in [
        ErrorCode::Success,
        ErrorCode::UnmatchedRelease,
        ErrorCode::WouldDeadlock,
        ErrorCode::Poisoned,
        ErrorCode::InvalidHandle,
        ErrorCode::NullPointer,
        ErrorCode::Unknown,
    ] {
        let s = unsafe { CStr::from_ptr(fairrw_strerror(code)) };
        assert_eq!(s.to_str().unwrap(), code.as_str());
    }
}
