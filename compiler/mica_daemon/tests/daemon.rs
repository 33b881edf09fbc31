//! Request/response state machine tests over an in-memory transport.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use mica_daemon::protocol::{decode_frames, encode_frames};
use mica_daemon::{Options, ServeOutcome, Server};

/// One in-memory connection: requests are pre-encoded, responses
/// accumulate in a buffer.
struct Duplex {
    incoming: Cursor<Vec<u8>>,
    outgoing: Vec<u8>,
}

impl Duplex {
    fn new(requests: &[Value]) -> Self {
        Duplex {
            incoming: Cursor::new(encode_frames(requests)),
            outgoing: Vec::new(),
        }
    }

    fn responses(&self) -> Vec<Value> {
        decode_frames(&self.outgoing).unwrap()
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.incoming.read(buf)
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.outgoing.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    server: Server,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let status_file = dir.path().join("daemon.status");
        let server = Server::new(Options::default(), status_file);
        Fixture { dir, server }
    }

    fn status_file(&self) -> PathBuf {
        self.dir.path().join("daemon.status")
    }

    fn write(&self, name: &str, text: &str) -> String {
        let path = self.dir.path().join(name);
        fs::write(&path, text).unwrap();
        path.display().to_string()
    }

    fn roundtrip(&mut self, requests: &[Value]) -> (Vec<Value>, ServeOutcome) {
        let mut conn = Duplex::new(requests);
        let outcome = self.server.handle_connection(&mut conn);
        (conn.responses(), outcome)
    }
}

#[test]
fn unknown_command_is_reported() {
    let mut fixture = Fixture::new();
    let (responses, _) = fixture.roundtrip(&[json!({"command": "frobnicate"})]);
    assert_eq!(responses[0]["error"], "Unrecognized command 'frobnicate'");
}

#[test]
fn non_string_command_is_rejected() {
    let mut fixture = Fixture::new();
    let (responses, _) = fixture.roundtrip(&[json!({"command": 42})]);
    assert_eq!(responses[0]["error"], "Command is not a string");
}

#[test]
fn missing_command_is_rejected() {
    let mut fixture = Fixture::new();
    let (responses, _) = fixture.roundtrip(&[json!({"files": []})]);
    assert_eq!(responses[0]["error"], "No command found in request");
}

#[test]
fn every_response_carries_metadata() {
    let mut fixture = Fixture::new();
    let (responses, _) = fixture.roundtrip(&[json!({"command": "status"})]);
    let resp = &responses[0];
    assert!(resp["platform"].is_string());
    assert_eq!(resp["python_version"], "3_8");
    assert!(resp["memory_rss_mib"].is_number());
    assert!(resp["memory_vms_mib"].is_number());
    assert!(resp["memory_maxrss_mib"].is_number());
}

#[test]
fn recheck_suggest_inspect_require_a_check_first() {
    let mut fixture = Fixture::new();
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "recheck"}),
        json!({"command": "suggest", "function": "m.f"}),
        json!({"command": "inspect", "show": "type", "location": "m.X"}),
    ]);
    assert_eq!(
        responses[0]["error"],
        "Command 'recheck' is only valid after a 'check' command"
    );
    assert_eq!(
        responses[1]["error"],
        "Command 'suggest' is only valid after a 'check' command"
    );
    assert_eq!(
        responses[2]["error"],
        "Command 'inspect' is only valid after a 'check' command"
    );
}

#[test]
fn clean_check_returns_status_zero_and_summary() {
    let mut fixture = Fixture::new();
    let lib = fixture.write("lib.py", "def f(x: float) -> None:\n");
    let main = fixture.write("main.py", "import lib\nlib.f(1)\n");
    let (responses, _) =
        fixture.roundtrip(&[json!({"command": "check", "files": [lib, main],
                                   "is_tty": false, "terminal_width": 80})]);
    let resp = &responses[0];
    assert_eq!(resp["status"], 0);
    assert_eq!(resp["err"], "");
    assert_eq!(
        resp["out"].as_str().unwrap(),
        "Success: no issues found in 2 source files\n"
    );
}

#[test]
fn check_of_missing_file_is_a_discovery_error() {
    let mut fixture = Fixture::new();
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "check", "files": ["nope.py"], "is_tty": false, "terminal_width": 80}),
    ]);
    let resp = &responses[0];
    assert_eq!(resp["status"], 2);
    assert_eq!(resp["out"], "");
    assert_eq!(
        resp["err"],
        "mica: can't read file 'nope.py': No such file or directory\n"
    );
}

#[test]
fn recheck_after_signature_narrowing_reports_the_caller() {
    let mut fixture = Fixture::new();
    let lib = fixture.write("lib.py", "def f(x: float) -> None:\n");
    let main = fixture.write("main.py", "import lib\nlib.f(1)\n");
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "check", "files": [lib.clone(), main],
               "is_tty": false, "terminal_width": 80}),
    ]);
    assert_eq!(responses[0]["status"], 0);

    fixture.write("lib.py", "def f(x: bool) -> None:\n");
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "recheck", "update": [lib], "is_tty": false, "terminal_width": 80}),
    ]);
    let resp = &responses[0];
    assert_eq!(resp["status"], 1);
    let out = resp["out"].as_str().unwrap();
    assert!(
        out.contains(
            "error: Argument 1 to \"f\" has incompatible type \"int\"; expected \"bool\""
        ),
        "unexpected out: {out}"
    );
    assert!(out.contains("Found 1 error in 1 file (checked 2 source files)"));
}

#[test]
fn recheck_with_remove_reports_missing_module() {
    let mut fixture = Fixture::new();
    let a = fixture.write("a.py", "X = 1\n");
    let b = fixture.write("b.py", "import a\nY = a.X + 1\n");
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "check", "files": [a.clone(), b],
               "is_tty": false, "terminal_width": 80}),
    ]);
    assert_eq!(responses[0]["status"], 0);

    fs::remove_file(&a).unwrap();
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "recheck", "remove": [a], "is_tty": false, "terminal_width": 80}),
    ]);
    let resp = &responses[0];
    assert_eq!(resp["status"], 1);
    let out = resp["out"].as_str().unwrap();
    assert!(
        out.contains(
            "error: Cannot find implementation or library stub for module named \"a\""
        ),
        "unexpected out: {out}"
    );
}

#[test]
fn empty_recheck_reproduces_previous_result() {
    let mut fixture = Fixture::new();
    let lib = fixture.write("lib.py", "def f(x: bool) -> None:\n");
    let main = fixture.write("main.py", "import lib\nlib.f(1)\n");
    let (first, _) = fixture.roundtrip(&[
        json!({"command": "check", "files": [lib, main], "is_tty": false, "terminal_width": 80}),
    ]);
    let (second, _) = fixture.roundtrip(&[
        json!({"command": "recheck", "is_tty": false, "terminal_width": 80}),
    ]);
    assert_eq!(first[0]["status"], second[0]["status"]);
    assert_eq!(first[0]["out"], second[0]["out"]);
}

#[test]
fn run_restarts_on_configuration_change() {
    let mut fixture = Fixture::new();
    let lib = fixture.write("lib.py", "X = 1\n");
    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "run", "version": mica_daemon::VERSION,
               "args": ["--strict", lib.clone()], "is_tty": false, "terminal_width": 80}),
    ]);
    assert_eq!(responses[0]["restart"], "configuration changed");

    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "run", "version": "0.0.0-other",
               "args": [lib.clone()], "is_tty": false, "terminal_width": 80}),
    ]);
    assert_eq!(responses[0]["restart"], "mica version changed");

    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "run", "version": mica_daemon::VERSION,
               "args": [lib], "is_tty": false, "terminal_width": 80}),
    ]);
    assert_eq!(responses[0]["status"], 0);
}

#[test]
fn suggest_and_inspect_after_check() {
    let mut fixture = Fixture::new();
    let lib = fixture.write("lib.py", "def f(x: int) -> bool:\nX = 1\n");
    let (_, _) = fixture.roundtrip(&[
        json!({"command": "check", "files": [lib], "is_tty": false, "terminal_width": 80}),
    ]);

    let (responses, _) = fixture.roundtrip(&[
        json!({"command": "suggest", "function": "lib.f", "callsites": false}),
        json!({"command": "suggest", "function": "lib.missing", "callsites": false}),
        json!({"command": "inspect", "show": "type", "location": "lib.X"}),
        json!({"command": "inspect", "show": "type", "location": "lib.gone"}),
    ]);
    assert_eq!(responses[0]["out"], "(int) -> bool");
    assert_eq!(responses[1]["error"], "Unknown function lib.missing");
    assert_eq!(responses[2]["out"], "var:int");
    assert_eq!(
        responses[3]["error"],
        "Can't find expression at 'lib.gone'"
    );
}

#[test]
fn stop_unlinks_the_status_file_and_ends_serving() {
    let mut fixture = Fixture::new();
    fixture.server.write_status_file("test-connection").unwrap();
    let status = fixture.status_file();
    assert!(status.is_file());
    let content = fs::read_to_string(&status).unwrap();
    assert!(content.ends_with('\n'));
    let parsed: Value = serde_json::from_str(content.trim()).unwrap();
    assert!(parsed["pid"].is_number());
    assert_eq!(parsed["connection_name"], "test-connection");

    let (responses, outcome) = fixture.roundtrip(&[json!({"command": "stop"})]);
    assert_eq!(outcome, ServeOutcome::Stop);
    assert!(responses[0].get("error").is_none());
    assert!(!status.is_file());
}

#[test]
fn disconnect_between_frames_keeps_the_daemon_alive() {
    let mut fixture = Fixture::new();
    let (_, outcome) = fixture.roundtrip(&[json!({"command": "status"})]);
    assert_eq!(outcome, ServeOutcome::Continue);
    // The next connection still works.
    let (responses, _) = fixture.roundtrip(&[json!({"command": "status"})]);
    assert!(responses[0]["memory_rss_mib"].is_number());
}
