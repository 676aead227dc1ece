//! Error handling and C-ABI error codes for fairrw

use std::cell::RefCell;
use std::fmt;
use std::os::raw::c_char;

use crate::types::{EntryKind, HolderId};

/// Usage errors surfaced by the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Release without a matching held acquisition. State is left untouched.
    UnmatchedRelease { kind: EntryKind },
    /// The request could only ever be granted after the caller released
    /// something it already holds.
    WouldDeadlock { holder: HolderId, kind: EntryKind },
    /// A previous operation panicked inside the critical section.
    Poisoned,
    InvalidHandle,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnmatchedRelease { kind } => {
                write!(f, "{kind} release without a matching acquisition")
            }
            Error::WouldDeadlock { holder, kind } => {
                write!(f, "holder {holder} would deadlock acquiring a {kind} lock it cannot be granted")
            }
            Error::Poisoned => f.write_str("lock state poisoned by a panic"),
            Error::InvalidHandle => f.write_str("invalid handle"),
        }
    }
}

impl std::error::Error for Error {}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    UnmatchedRelease = 1,
    WouldDeadlock = 2,
    Poisoned = 3,
    InvalidHandle = 4,
    NullPointer = 5,
    Unknown = 255,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::UnmatchedRelease => "Unmatched release",
            ErrorCode::WouldDeadlock => "Would deadlock",
            ErrorCode::Poisoned => "Lock state poisoned",
            ErrorCode::InvalidHandle => "Invalid handle",
            ErrorCode::NullPointer => "Null pointer",
            ErrorCode::Unknown => "Unknown error",
        }
    }

    fn as_c_str(self) -> &'static [u8] {
        match self {
            ErrorCode::Success => b"Success\0",
            ErrorCode::UnmatchedRelease => b"Unmatched release\0",
            ErrorCode::WouldDeadlock => b"Would deadlock\0",
            ErrorCode::Poisoned => b"Lock state poisoned\0",
            ErrorCode::InvalidHandle => b"Invalid handle\0",
            ErrorCode::NullPointer => b"Null pointer\0",
            ErrorCode::Unknown => b"Unknown error\0",
        }
    }
}

// Thread-local last error for C-ABI
thread_local! {
    static LAST_ERROR: RefCell<ErrorCode> = const { RefCell::new(ErrorCode::Success) };
}

pub fn set_last_error(code: ErrorCode) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = code);
}

pub fn get_last_error() -> ErrorCode {
    LAST_ERROR.with(|cell| *cell.borrow())
}

#[no_mangle]
pub extern "C" fn fairrw_last_error() -> ErrorCode {
    get_last_error()
}

#[no_mangle]
pub extern "C" fn fairrw_strerror(code: ErrorCode) -> *const c_char {
    code.as_c_str().as_ptr() as *const c_char
}

// Map internal Error to ErrorCode
pub fn map_error(e: &Error) -> ErrorCode {
    match e {
        Error::UnmatchedRelease { .. } => ErrorCode::UnmatchedRelease,
        Error::WouldDeadlock { .. } => ErrorCode::WouldDeadlock,
        Error::Poisoned => ErrorCode::Poisoned,
        Error::InvalidHandle => ErrorCode::InvalidHandle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn last_error_is_thread_local() {
        set_last_error(ErrorCode::WouldDeadlock);
        let other = std::thread::spawn(get_last_error).join().unwrap();
        assert_eq!(other, ErrorCode::Success);
        assert_eq!(get_last_error(), ErrorCode::WouldDeadlock);
        set_last_error(ErrorCode::Success);
    }

    #[test]
    fn strerror_matches_as_str() {
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

    #[test]
    fn display_names_the_kind() {
        let e = Error::UnmatchedRelease { kind: EntryKind::Reader };
        assert_eq!(e.to_string(), "reader release without a matching acquisition");
        assert_eq!(map_error(&e), ErrorCode::UnmatchedRelease);
    }
}
