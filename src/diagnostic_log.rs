use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Points standard error at `path`, opened for appending. stderrlog writes
/// there, so log lines end up in the file instead of on the terminal screen.
pub fn redirect_stderr(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let ret = unsafe { libc::dup2(file.as_raw_fd(), libc::STDERR_FILENO) };
    match ret {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}
