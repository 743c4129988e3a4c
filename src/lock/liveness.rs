//! Process liveness probe.
//!
//! Answers "is this PID alive right now?" without blocking and without
//! touching the target process. Used only to decide whether a recorded lock
//! owner is still plausible.

/// PID of the calling process.
#[must_use]
pub fn current_pid() -> i64 {
    i64::from(std::process::id())
}

/// Whether a process with `pid` currently exists.
///
/// Non-positive PIDs and PIDs outside the platform range are never alive.
#[must_use]
pub fn is_alive(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    platform_is_alive(pid)
}

#[cfg(unix)]
fn platform_is_alive(pid: i64) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    // Null signal: existence and permission check only.
    match kill(Pid::from_raw(raw), None) {
        // EPERM: the process exists but belongs to another user.
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn platform_is_alive(pid: i64) -> bool {
    use windows_sys::Win32::Foundation::{
        CloseHandle, GetLastError, ERROR_ACCESS_DENIED, STILL_ACTIVE,
    };
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    let Ok(raw) = u32::try_from(pid) else {
        return false;
    };

    // SAFETY: OpenProcess has no preconditions; a null handle signals failure.
    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, raw) };
    if handle.is_null() {
        // SAFETY: reads the calling thread's last-error slot.
        return unsafe { GetLastError() } == ERROR_ACCESS_DENIED;
    }

    let mut exit_code: u32 = 0;
    // SAFETY: `handle` is a valid process handle and `exit_code` outlives the call.
    let queried = unsafe { GetExitCodeProcess(handle, &mut exit_code) } != 0;
    // SAFETY: `handle` was returned by OpenProcess and is closed exactly once.
    unsafe { CloseHandle(handle) };

    #[allow(clippy::cast_sign_loss)]
    let still_active = STILL_ACTIVE as u32;
    queried && exit_code == still_active
}

#[cfg(not(any(unix, windows)))]
fn platform_is_alive(_pid: i64) -> bool {
    false
}
