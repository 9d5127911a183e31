//! Platform-specific helpers

use crate::StatusSink;

/// Ask the OS to prioritize the current thread.
///
/// Best effort only. The capture cadence benefits from a higher scheduling
/// priority, but an unprivileged process is usually denied the request, so
/// any failure is reported once and ignored.
#[cfg(unix)]
pub fn request_high_priority(status: &StatusSink) {
    // setpriority on the calling thread (who = 0 with PRIO_PROCESS targets
    // the calling process; negative nice needs privileges on most systems).
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -10) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) || err.raw_os_error() == Some(libc::EACCES) {
            tracing::debug!("high priority denied (not privileged)");
        } else {
            status.emit(&format!("Could not raise capture priority: {}", err));
        }
    } else {
        tracing::debug!("capture thread running at raised priority");
    }
}

#[cfg(not(unix))]
pub fn request_high_priority(_status: &StatusSink) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_request_never_panics() {
        // Succeeds or is denied depending on privileges; either way it must
        // return quietly.
        request_high_priority(&StatusSink::default());
    }
}
