//! Last-error slot for sentinel-returning boundary calls.
//!
//! The slot is per thread: a failure on one thread never shows up in
//! another thread's `current_error`. Successful calls leave it untouched,
//! so callers clear it before the call they want to observe.

use std::cell::Cell;

use crate::serial::{ErrorKind, SerialError};

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(ErrorKind::NONE_CODE) };
}

/// Code of the most recent failure on this thread, `0` if none since the last clear.
pub fn current_error() -> i32 {
    LAST_ERROR.with(|slot| slot.get())
}

pub fn current_error_kind() -> Option<ErrorKind> {
    ErrorKind::from_code(current_error())
}

pub fn clear_error() {
    LAST_ERROR.with(|slot| slot.set(ErrorKind::NONE_CODE));
}

pub(crate) fn set_error(error: &SerialError) {
    let code = error.kind().code();
    log::debug!("Boundary call failed ({}): {}", code, error);
    LAST_ERROR.with(|slot| slot.set(code));
}

/// Turn a result into its value, or record the error and return `fallback`.
pub(crate) fn or_sentinel<T>(result: Result<T, SerialError>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            set_error(&e);
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        clear_error();
        assert_eq!(current_error(), 0);
        assert_eq!(current_error_kind(), None);

        set_error(&SerialError::InvalidHandle);
        assert_eq!(current_error(), ErrorKind::InvalidHandle.code());
        assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));

        // success does not reset the slot
        assert_eq!(or_sentinel(Ok(5), -1), 5);
        assert_eq!(current_error_kind(), Some(ErrorKind::InvalidHandle));

        clear_error();
        assert_eq!(current_error(), 0);
    }

    #[test]
    fn test_slot_is_per_thread() {
        clear_error();
        set_error(&SerialError::invalid_parameter("offset"));

        let other = std::thread::spawn(|| {
            let before = current_error();
            set_error(&SerialError::InvalidHandle);
            before
        })
        .join()
        .unwrap();

        assert_eq!(other, 0);
        assert_eq!(current_error_kind(), Some(ErrorKind::InvalidParameter));
        clear_error();
    }
}
