//! Client side: find the daemon through the status file and talk to it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use mica_daemon::protocol;

/// Contents of the status file: the daemon's pid and the name of the
/// connection endpoint (a Unix socket path).
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub pid: u32,
    pub connection_name: String,
}

/// Read and validate the status file.
pub fn read_status(status_file: &Path) -> Result<DaemonStatus, String> {
    let text = fs::read_to_string(status_file)
        .map_err(|_| format!("No status file found at {}", status_file.display()))?;
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|_| "Malformed status file".to_owned())?;
    let pid = value
        .get("pid")
        .and_then(Value::as_u64)
        .ok_or_else(|| "Status file has no pid".to_owned())?;
    let connection_name = value
        .get("connection_name")
        .and_then(Value::as_str)
        .ok_or_else(|| "Status file has no connection_name".to_owned())?
        .to_owned();
    Ok(DaemonStatus {
        pid: pid as u32,
        connection_name,
    })
}

/// The socket path a daemon with this status file listens on.
pub fn socket_path(status_file: &Path) -> PathBuf {
    let mut path = status_file.as_os_str().to_owned();
    path.push(".sock");
    PathBuf::from(path)
}

/// Send one request frame and wait for the response.
#[cfg(unix)]
pub fn request(status_file: &Path, payload: &Value) -> Result<Value, String> {
    use std::os::unix::net::UnixStream;

    let status = read_status(status_file)?;
    let mut stream = UnixStream::connect(&status.connection_name)
        .map_err(|e| format!("Daemon is not responding: {e}"))?;
    let _ = stream.set_read_timeout(Some(Duration::from_secs(600)));
    protocol::send(&mut stream, payload).map_err(|e| format!("Send failed: {e}"))?;
    protocol::receive(&mut stream).map_err(|e| format!("Receive failed: {e}"))
}

#[cfg(not(unix))]
pub fn request(_status_file: &Path, _payload: &Value) -> Result<Value, String> {
    Err("The mica daemon requires a Unix-like platform".to_owned())
}

/// Is a daemon with this status file alive?
pub fn is_running(status_file: &Path) -> bool {
    read_status(status_file).is_ok()
}
