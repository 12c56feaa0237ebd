//! Starting a server process in the background
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// Start `program serve --host <host> --port <port>` detached from the caller
///
/// The child gets its own process group so it outlives the debugger session
/// that started it. Readiness is not awaited here; callers poll the port.
pub fn spawn_detached(program: &str, host: &str, port: u16) -> io::Result<Child> {
    let resolved = which::which(program).map_err(|e| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{program} not found in PATH: {e}"),
        )
    })?;

    tracing::debug!(program = %resolved.display(), %host, port, "starting server process");
    let child = Command::new(&resolved)
        .args(["serve", "--host", host, "--port", &port.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()?;

    tracing::debug!(pid = child.id(), "server process started");
    Ok(child)
}

/// Wait for `child` on a background thread so it is reaped when it exits
pub fn reap(mut child: Child) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let pid = child.id();
    thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || {
            let status = child.wait();
            match &status {
                Ok(status) => tracing::debug!(pid, %status, "server process exited"),
                Err(e) => tracing::warn!(pid, error = %e, "waiting for server process"),
            }
            status
        })
}
