//! The daemon server: session state and command dispatch.
//!
//! One server owns one fine-grained manager and one watcher for its
//! whole process lifetime. The session moves `Uninitialized → Initialized`
//! on the first successful `check`/`run` and stays there until `stop`;
//! `recheck`, `suggest`, and `inspect` before that point answer with an
//! error instead of touching any state.
//!
//! A status file recording `{pid, connection_name}` is written before the
//! first request is served and unlinked exactly once on clean stop. Any
//! panic escaping a handler is reported to the client as
//! `Daemon crashed!` plus the panic payload, then re-raised so the
//! process dies loudly rather than limping on with suspect state.

use std::fs;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};

use mica_diagnostic::{count_stats, format_error_summary, format_success_summary, Diagnostic, Severity};
use mica_fine::{BasicAnalyzer, BuildSource, FileSystemWatcher, FineGrainedManager, SymbolSig};

use crate::meminfo::get_meminfo;
use crate::protocol::{self, ProtocolError};

/// Daemon version, compared by `run` to decide on restarts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server configuration snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Raw flags the daemon was started with.
    pub flags: Vec<String>,
    pub python_version: (u32, u32),
    pub platform: String,
    /// Idle timeout; expiry behaves like a clean `stop`.
    pub timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            flags: Vec::new(),
            python_version: (3, 8),
            platform: std::env::consts::OS.to_owned(),
            timeout: None,
        }
    }
}

impl Options {
    /// Stable text form used to detect configuration changes.
    pub fn snapshot(&self) -> String {
        format!(
            "{:?}|{}_{}|{}",
            self.flags, self.python_version.0, self.python_version.1, self.platform
        )
    }
}

/// What `handle_connection` tells the accept loop to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Keep accepting connections.
    Continue,
    /// Clean shutdown was requested (or the idle timeout expired).
    Stop,
}

/// The daemon.
pub struct Server {
    options: Options,
    options_snapshot: String,
    manager: Option<FineGrainedManager<BasicAnalyzer>>,
    watcher: FileSystemWatcher,
    previous_sources: Vec<BuildSource>,
    status_file: PathBuf,
    status_unlinked: bool,
}

impl Server {
    /// Create a server. A stale status file from a previous run is
    /// removed immediately.
    pub fn new(options: Options, status_file: impl Into<PathBuf>) -> Server {
        let status_file = status_file.into();
        if status_file.is_file() {
            let _ = fs::remove_file(&status_file);
        }
        let options_snapshot = options.snapshot();
        Server {
            options,
            options_snapshot,
            manager: None,
            watcher: FileSystemWatcher::new(),
            previous_sources: Vec::new(),
            status_file,
            status_unlinked: false,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }

    /// Write the status file; must happen before serving the first
    /// request so a concurrent server can detect this one.
    pub fn write_status_file(&self, connection_name: &str) -> std::io::Result<()> {
        let payload = json!({
            "pid": std::process::id(),
            "connection_name": connection_name,
        });
        let mut text = payload.to_string();
        text.push('\n');
        fs::write(&self.status_file, text)
    }

    fn unlink_status_file(&mut self) {
        if !self.status_unlinked {
            self.status_unlinked = true;
            let _ = fs::remove_file(&self.status_file);
        }
    }

    /// Clean shutdown without a `stop` command — used when the idle
    /// timeout expires. Unlinks the status file like `stop` does.
    pub fn shutdown(&mut self) {
        self.unlink_status_file();
    }

    fn response_metadata(&self) -> Vec<(String, Value)> {
        vec![
            ("platform".to_owned(), Value::from(self.options.platform.clone())),
            (
                "python_version".to_owned(),
                Value::from(format!(
                    "{}_{}",
                    self.options.python_version.0, self.options.python_version.1
                )),
            ),
        ]
    }

    fn add_metadata(&self, resp: &mut Value) {
        if let Value::Object(map) = resp {
            for (key, value) in self.response_metadata() {
                map.insert(key, value);
            }
        }
    }

    /// Process frames from one connection until it closes or `stop`
    /// arrives. Responses are written strictly in request order.
    pub fn handle_connection(&mut self, conn: &mut (impl Read + Write)) -> ServeOutcome {
        loop {
            let data = match protocol::receive(conn) {
                Ok(data) => data,
                Err(ProtocolError::Closed) => return ServeOutcome::Continue,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping connection");
                    return ServeOutcome::Continue;
                }
            };

            let mut command: Option<String> = None;
            let mut resp = match data.get("command") {
                None => json!({"error": "No command found in request"}),
                Some(Value::String(name)) => {
                    command = Some(name.clone());
                    let name = name.clone();
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| self.run_command(&name, &data)));
                    match outcome {
                        Ok(resp) => resp,
                        Err(payload) => {
                            // Internal invariant violation: report, then
                            // re-raise to terminate the process.
                            let message = panic_message(payload.as_ref());
                            let mut resp =
                                json!({"error": format!("Daemon crashed!\n{message}")});
                            self.add_metadata(&mut resp);
                            let _ = protocol::send(conn, &resp);
                            self.unlink_status_file();
                            panic::resume_unwind(payload);
                        }
                    }
                }
                Some(_) => json!({"error": "Command is not a string"}),
            };

            self.add_metadata(&mut resp);
            if let Err(e) = protocol::send(conn, &resp) {
                // Maybe the client hung up; the next connection will tell.
                tracing::debug!(error = %e, "client went away mid-response");
            }
            if command.as_deref() == Some("stop") {
                return ServeOutcome::Stop;
            }
        }
    }

    /// Run a specific command from the registry.
    fn run_command(&mut self, command: &str, data: &Value) -> Value {
        tracing::debug!(command, "dispatch");
        match command {
            "status" => self.cmd_status(data),
            "check" => self.cmd_check(data),
            "recheck" => self.cmd_recheck(data),
            "run" => self.cmd_run(data),
            "suggest" => self.cmd_suggest(data),
            "inspect" => self.cmd_inspect(data),
            "hang" => {
                std::thread::sleep(Duration::from_secs(100));
                json!({})
            }
            "stop" => self.cmd_stop(),
            other => json!({"error": format!("Unrecognized command '{other}'")}),
        }
    }

    // ── Command handlers ────────────────────────────────────────────

    fn cmd_status(&mut self, data: &Value) -> Value {
        let mut res = get_meminfo();
        if let Some(dump_file) = data.get("fswatcher_dump_file").and_then(Value::as_str) {
            let dump = self.watcher.dump_file_data();
            if let Ok(text) = serde_json::to_string(&dump) {
                let _ = fs::write(dump_file, text);
            }
        }
        if let Value::Object(map) = &mut res {
            map.insert("initialized".to_owned(), Value::from(self.manager.is_some()));
        }
        res
    }

    fn cmd_stop(&mut self) -> Value {
        // Remove the status file before completing the response so a
        // subsequent command cannot mistake a dying server for a live
        // one.
        self.unlink_status_file();
        json!({})
    }

    fn cmd_check(&mut self, data: &Value) -> Value {
        let Some(files) = string_list(data, "files") else {
            return config_error("check requires a list of files");
        };
        match self.build_sources(&files) {
            Ok(sources) => self.check(&sources),
            Err(message) => config_error(&message),
        }
    }

    fn cmd_recheck(&mut self, data: &Value) -> Value {
        if self.manager.is_none() {
            return json!({
                "error": "Command 'recheck' is only valid after a 'check' command"
            });
        }
        let remove = string_list(data, "remove");
        let update = string_list(data, "update");

        let mut sources = self.previous_sources.clone();
        if let Some(remove) = &remove {
            let removals: Vec<PathBuf> = remove.iter().map(PathBuf::from).collect();
            sources.retain(|s| !removals.contains(&s.path));
        }
        if let Some(update) = &update {
            let known: Vec<PathBuf> = sources.iter().map(|s| s.path.clone()).collect();
            for path in update {
                let path_buf = PathBuf::from(path);
                if !known.contains(&path_buf) {
                    match module_for_path(&path_buf) {
                        Ok(module) => sources.push(BuildSource::new(&module, path_buf)),
                        Err(message) => return config_error(&message),
                    }
                }
            }
        }
        self.fine_grained_increment(sources, remove, update)
    }

    fn cmd_run(&mut self, data: &Value) -> Value {
        let version = data.get("version").and_then(Value::as_str).unwrap_or("");
        let Some(args) = string_list(data, "args") else {
            return config_error("run requires an argument list");
        };
        let (flags, files): (Vec<String>, Vec<String>) =
            args.into_iter().partition(|a| a.starts_with('-'));

        let mut requested = self.options.clone();
        requested.flags = flags;
        if requested.snapshot() != self.options_snapshot {
            return json!({"restart": "configuration changed"});
        }
        if !version.is_empty() && version != VERSION {
            return json!({"restart": "mica version changed"});
        }
        if files.is_empty() {
            return config_error("no files given");
        }
        match self.build_sources(&files) {
            Ok(sources) => self.check(&sources),
            Err(message) => config_error(&message),
        }
    }

    fn cmd_suggest(&mut self, data: &Value) -> Value {
        let Some(manager) = &self.manager else {
            return json!({
                "error": "Command 'suggest' is only valid after a 'check' command"
            });
        };
        let Some(function) = data.get("function").and_then(Value::as_str) else {
            return json!({"error": "suggest requires a function name"});
        };
        let Some((module, _name)) = function.rsplit_once('.') else {
            return json!({"error": format!("Unknown function {function}")});
        };
        let sig = manager
            .graph
            .get(module)
            .and_then(|node| node.targets.get(function))
            .and_then(|target| {
                target
                    .outputs
                    .values()
                    .find(|sig| matches!(sig, SymbolSig::Func(_)))
                    .cloned()
            });
        match sig {
            Some(sig) => {
                let pool = manager.analyzer().pool();
                let rendered = sig
                    .fingerprint(pool)
                    .trim_start_matches("def:")
                    .to_owned();
                json!({"out": rendered})
            }
            None => json!({"error": format!("Unknown function {function}")}),
        }
    }

    fn cmd_inspect(&mut self, data: &Value) -> Value {
        let Some(manager) = &self.manager else {
            return json!({
                "error": "Command 'inspect' is only valid after a 'check' command"
            });
        };
        let location = data.get("location").and_then(Value::as_str).unwrap_or("");
        let Some((module, name)) = location.rsplit_once('.') else {
            return json!({"error": format!("Can't find expression at '{location}'")});
        };
        let sig = manager
            .graph
            .get(module)
            .map(|node| node.exports())
            .and_then(|exports| exports.get(name).cloned());
        match sig {
            Some(sig) => {
                let pool = manager.analyzer().pool();
                json!({"out": sig.fingerprint(pool)})
            }
            None => json!({"error": format!("Can't find expression at '{location}'")}),
        }
    }

    // ── Checking machinery ──────────────────────────────────────────

    fn build_sources(&self, files: &[String]) -> Result<Vec<BuildSource>, String> {
        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let path = PathBuf::from(file);
            if !path.is_file() {
                return Err(format!(
                    "mica: can't read file '{file}': No such file or directory"
                ));
            }
            let module = module_for_path(&path)?;
            sources.push(BuildSource::new(&module, path));
        }
        Ok(sources)
    }

    fn check(&mut self, sources: &[BuildSource]) -> Value {
        if self.manager.is_none() {
            let mut manager = FineGrainedManager::new(BasicAnalyzer::new());
            self.watcher
                .add_watched_paths(sources.iter().map(|s| s.path.clone()));
            let diagnostics = manager.initialize(sources);
            self.manager = Some(manager);
            self.previous_sources = sources.to_vec();
            respond(&diagnostics, sources.len())
        } else {
            self.fine_grained_increment(sources.to_vec(), None, None)
        }
    }

    fn fine_grained_increment(
        &mut self,
        sources: Vec<BuildSource>,
        remove: Option<Vec<String>>,
        update: Option<Vec<String>>,
    ) -> Value {
        let changed_paths = if remove.is_none() && update.is_none() {
            // Stat the world.
            self.watcher
                .add_watched_paths(sources.iter().map(|s| s.path.clone()));
            self.watcher.find_changed()
        } else {
            // Trust the caller's lists; no global stat pass.
            self.watcher.update_changed(
                remove.unwrap_or_default().iter().map(PathBuf::from),
                update.unwrap_or_default().iter().map(PathBuf::from),
            )
        };

        // Added or modified modules. The watcher snapshots fresh paths
        // without emitting a change, so modules new to the build are
        // picked up here by comparing against the previous source list.
        let previous_modules: Vec<&str> = self
            .previous_sources
            .iter()
            .map(|s| s.module.as_str())
            .collect();
        let mut changed: Vec<(String, PathBuf)> = sources
            .iter()
            .filter(|s| {
                changed_paths.contains(&s.path)
                    || !previous_modules.contains(&s.module.as_str())
            })
            .map(|s| (s.module.clone(), s.path.clone()))
            .collect();

        // Modules dropped from the build.
        let current: Vec<&str> = sources.iter().map(|s| s.module.as_str()).collect();
        let mut removed: Vec<(String, PathBuf)> = self
            .previous_sources
            .iter()
            .filter(|s| !current.contains(&s.module.as_str()))
            .map(|s| (s.module.clone(), s.path.clone()))
            .collect();

        // A path whose module id changed counts as a remove at the old
        // name plus a change at the new one.
        for source in &sources {
            let old_module = self
                .previous_sources
                .iter()
                .find(|p| p.path == source.path)
                .map(|p| p.module.as_str());
            if let Some(old_module) = old_module {
                if old_module != source.module {
                    removed.push((old_module.to_owned(), source.path.clone()));
                    changed.push((source.module.clone(), source.path.clone()));
                }
            }
        }

        let Some(manager) = &mut self.manager else {
            return config_error("internal: increment without manager");
        };
        let diagnostics = manager.update(changed, removed);
        self.previous_sources = sources;
        respond(&diagnostics, self.previous_sources.len())
    }
}

fn module_for_path(path: &Path) -> Result<String, String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_owned)
        .ok_or_else(|| format!("mica: invalid source path '{}'", path.display()))
}

fn string_list(data: &Value, key: &str) -> Option<Vec<String>> {
    data.get(key)?.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    })
}

fn config_error(message: &str) -> Value {
    json!({"out": "", "err": format!("{message}\n"), "status": 2})
}

/// Build the `{out, err, status}` reply from sorted diagnostics.
fn respond(diagnostics: &[Diagnostic], n_sources: usize) -> Value {
    let mut lines: Vec<String> = diagnostics.iter().flat_map(Diagnostic::render).collect();
    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    if has_errors {
        let (n_errors, n_files) = count_stats(diagnostics);
        lines.push(format_error_summary(n_errors, n_files, n_sources));
    } else {
        lines.push(format_success_summary(n_sources));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    json!({
        "out": out,
        "err": "",
        "status": if has_errors { 1 } else { 0 },
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
