//! Blocking wait and wake on a 32-bit atomic word.
//!
//! Linux uses process-private futexes. Other targets fall back to sleeping
//! between loads, which makes `wake_all` a no-op there.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Blocks while `word` holds `expected`, up to `timeout` if given.
///
/// Returns `true` once the word was observed (with `Acquire`) to differ from
/// `expected`, `false` if the timeout elapsed first. A timeout too large to
/// add to the current instant means no deadline.
pub(crate) fn wait_while(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    loop {
        if word.load(Ordering::Acquire) != expected {
            return true;
        }
        let remaining = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => Some(remaining),
                _ => return word.load(Ordering::Acquire) != expected,
            },
            None => None,
        };
        sys::wait(word, expected, remaining);
    }
}

/// Wakes every thread blocked in [`wait_while`] on `word`.
pub(crate) fn wake_all(word: &AtomicU32) {
    sys::wake(word);
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ptr;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    pub(super) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
        let timespec = timeout.map(|timeout| libc::timespec {
            tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = timespec
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const libc::timespec);

        // SAFETY: `word` is a live, aligned u32 for the duration of the call.
        // EINTR, EAGAIN and ETIMEDOUT are all handled by the caller re-checking
        // the word, so the return value is not inspected.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                timespec_ptr,
                ptr::null::<u32>(),
                0u32,
            );
        }
    }

    pub(super) fn wake(word: &AtomicU32) {
        // SAFETY: `word` is a live, aligned u32 for the duration of the call.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    const SLEEP_SLICE: Duration = Duration::from_millis(1);

    pub(super) fn wait(_word: &AtomicU32, _expected: u32, timeout: Option<Duration>) {
        let slice = timeout.map_or(SLEEP_SLICE, |timeout| timeout.min(SLEEP_SLICE));
        std::thread::sleep(slice);
    }

    pub(super) fn wake(_word: &AtomicU32) {}
}
