use crate::error::TreeError;

fn checked_pid(pid: u32) -> Result<libc::pid_t, TreeError> {
    // 0 and negative values address process groups, never a single process.
    if pid == 0 || pid > libc::pid_t::MAX as u32 {
        return Err(TreeError::NotFound(pid));
    }
    Ok(pid as libc::pid_t)
}

/// Send `signal` to one process, mapping errno to `TreeError`.
pub(crate) fn send(pid: u32, signal: libc::c_int) -> Result<(), TreeError> {
    let raw = checked_pid(pid)?;
    if unsafe { libc::kill(raw, signal) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Err(TreeError::NotFound(pid)),
        Some(libc::EPERM) => Err(TreeError::PermissionDenied(pid)),
        _ => Err(TreeError::Signal { pid, source: err }),
    }
}

/// kill(pid, 0): the process exists, zombie or not.
pub(crate) fn exists(pid: u32) -> bool {
    match send(pid, 0) {
        Ok(()) => true,
        Err(TreeError::PermissionDenied(_)) => true,
        Err(_) => false,
    }
}

pub(crate) fn terminate(pid: u32) -> Result<(), TreeError> {
    send(pid, libc::SIGTERM)
}

pub(crate) fn kill(pid: u32) -> Result<(), TreeError> {
    send(pid, libc::SIGKILL)
}
