//! The `mica` binary: daemon driver.

use std::io::IsTerminal;
use std::path::Path;
use std::process::exit;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_json::{json, Value};

use micac::cli::{Cli, Command};
use micac::{client, tracing_setup};

fn main() {
    let cli = Cli::parse();
    tracing_setup::init(cli.log_file.as_deref());
    let code = dispatch(&cli);
    exit(code);
}

fn dispatch(cli: &Cli) -> i32 {
    let status_file = &cli.status_file;
    match &cli.command {
        Command::Start { flags } => start_daemon(cli, flags),
        Command::Restart { flags } => {
            let _ = send(status_file, &json!({"command": "stop"}));
            start_daemon(cli, flags)
        }
        Command::Stop => match send(status_file, &json!({"command": "stop"})) {
            Ok(resp) => print_response(&resp),
            Err(message) => fail(&message),
        },
        Command::Status { fswatcher_dump_file } => {
            let mut payload = json!({"command": "status"});
            if let Some(dump) = fswatcher_dump_file {
                payload["fswatcher_dump_file"] = Value::from(dump.display().to_string());
            }
            match send(status_file, &payload) {
                Ok(resp) => {
                    println!("{resp:#}");
                    0
                }
                Err(message) => fail(&message),
            }
        }
        Command::Check { files } => {
            checked_request(status_file, json!({"command": "check", "files": files}))
        }
        Command::Recheck { remove, update } => {
            let mut payload = json!({"command": "recheck"});
            if let Some(remove) = remove {
                payload["remove"] = json!(remove);
            }
            if let Some(update) = update {
                payload["update"] = json!(update);
            }
            checked_request(status_file, payload)
        }
        Command::Run { args } => run_with_restart(cli, args),
        Command::Suggest { function, callsites } => {
            let payload =
                json!({"command": "suggest", "function": function, "callsites": callsites});
            match send(status_file, &payload) {
                Ok(resp) => print_response(&resp),
                Err(message) => fail(&message),
            }
        }
        Command::Inspect { location, show } => {
            let payload = json!({"command": "inspect", "location": location, "show": show});
            match send(status_file, &payload) {
                Ok(resp) => print_response(&resp),
                Err(message) => fail(&message),
            }
        }
        Command::Daemon { timeout, flags } => daemon::serve(status_file, *timeout, flags),
        Command::Kill => kill_daemon(status_file),
    }
}

/// Add the terminal context every checking command carries.
fn with_tty(mut payload: Value) -> Value {
    payload["is_tty"] = Value::from(std::io::stdout().is_terminal());
    payload["terminal_width"] = Value::from(terminal_width());
    payload
}

fn terminal_width() -> u64 {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(80)
}

fn checked_request(status_file: &Path, payload: Value) -> i32 {
    match send(status_file, &with_tty(payload)) {
        Ok(resp) => print_response(&resp),
        Err(message) => fail(&message),
    }
}

fn run_with_restart(cli: &Cli, args: &[String]) -> i32 {
    let payload = with_tty(json!({
        "command": "run",
        "version": mica_daemon::VERSION,
        "args": args,
    }));
    if !client::is_running(&cli.status_file) {
        let flags: Vec<String> = args.iter().filter(|a| a.starts_with('-')).cloned().collect();
        let code = start_daemon(cli, &flags);
        if code != 0 {
            return code;
        }
    }
    match send(&cli.status_file, &payload) {
        Ok(resp) => {
            if let Some(reason) = resp.get("restart").and_then(Value::as_str) {
                eprintln!("Restarting: {reason}");
                let _ = send(&cli.status_file, &json!({"command": "stop"}));
                let flags: Vec<String> =
                    args.iter().filter(|a| a.starts_with('-')).cloned().collect();
                let code = start_daemon(cli, &flags);
                if code != 0 {
                    return code;
                }
                return match send(&cli.status_file, &payload) {
                    Ok(resp) => print_response(&resp),
                    Err(message) => fail(&message),
                };
            }
            print_response(&resp)
        }
        Err(message) => fail(&message),
    }
}

fn send(status_file: &Path, payload: &Value) -> Result<Value, String> {
    client::request(status_file, payload)
}

/// Print `out`/`err` and map the response to an exit code.
fn print_response(resp: &Value) -> i32 {
    if let Some(error) = resp.get("error").and_then(Value::as_str) {
        eprintln!("{error}");
        return 2;
    }
    if let Some(out) = resp.get("out").and_then(Value::as_str) {
        print!("{out}");
    }
    if let Some(err) = resp.get("err").and_then(Value::as_str) {
        eprint!("{err}");
    }
    resp.get("status")
        .and_then(Value::as_i64)
        .and_then(|s| i32::try_from(s).ok())
        .unwrap_or(0)
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    2
}

fn start_daemon(cli: &Cli, flags: &[String]) -> i32 {
    let Ok(exe) = std::env::current_exe() else {
        return fail("Cannot locate the mica executable");
    };
    let mut command = std::process::Command::new(exe);
    command.arg("--status-file").arg(&cli.status_file);
    if let Some(log_file) = &cli.log_file {
        command.arg("--log-file").arg(log_file);
    }
    command.arg("daemon").args(flags);
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    if command.spawn().is_err() {
        return fail("Failed to spawn the daemon");
    }
    // Wait for the status file to confirm the daemon is serving.
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if client::is_running(&cli.status_file) {
            println!("Daemon started");
            return 0;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    fail("Daemon did not start in time")
}

#[cfg(unix)]
fn kill_daemon(status_file: &Path) -> i32 {
    match client::read_status(status_file) {
        Ok(status) => {
            let outcome = std::process::Command::new("kill")
                .args(["-9", &status.pid.to_string()])
                .status();
            let _ = std::fs::remove_file(status_file);
            match outcome {
                Ok(s) if s.success() => 0,
                _ => fail("Failed to kill the daemon"),
            }
        }
        Err(message) => fail(&message),
    }
}

#[cfg(not(unix))]
fn kill_daemon(_status_file: &Path) -> i32 {
    fail("The mica daemon requires a Unix-like platform")
}

#[cfg(unix)]
mod daemon {
    //! Foreground daemon mode: bind the socket, write the status file,
    //! serve connections one at a time.

    use std::os::unix::net::UnixListener;
    use std::path::Path;
    use std::time::{Duration, Instant};

    use mica_daemon::{Options, ServeOutcome, Server};
    use micac::client::socket_path;

    pub fn serve(status_file: &Path, timeout: Option<u64>, flags: &[String]) -> i32 {
        let socket = socket_path(status_file);
        let _ = std::fs::remove_file(&socket);
        let listener = match UnixListener::bind(&socket) {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("Cannot bind {}: {e}", socket.display());
                return 2;
            }
        };

        let options = Options {
            flags: flags.to_vec(),
            timeout: timeout.map(Duration::from_secs),
            ..Options::default()
        };
        let mut server = Server::new(options, status_file);
        if server.write_status_file(&socket.display().to_string()).is_err() {
            eprintln!("Cannot write {}", status_file.display());
            return 2;
        }

        let idle_limit = server.timeout();
        // With a timeout configured, poll for connections so idleness can
        // be observed; otherwise block in accept.
        if idle_limit.is_some() {
            let _ = listener.set_nonblocking(true);
        }
        let mut last_activity = Instant::now();
        loop {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let _ = stream.set_nonblocking(false);
                    last_activity = Instant::now();
                    if server.handle_connection(&mut stream) == ServeOutcome::Stop {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if let Some(limit) = idle_limit {
                        if last_activity.elapsed() > limit {
                            // Idle expiry behaves like a clean stop.
                            server.shutdown();
                            break;
                        }
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
        let _ = std::fs::remove_file(&socket);
        0
    }
}

#[cfg(not(unix))]
mod daemon {
    use std::path::Path;

    pub fn serve(_status_file: &Path, _timeout: Option<u64>, _flags: &[String]) -> i32 {
        eprintln!("The mica daemon requires a Unix-like platform");
        2
    }
}
