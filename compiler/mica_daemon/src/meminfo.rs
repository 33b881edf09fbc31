//! Process memory statistics for the `status` command.

use serde_json::{json, Value};

/// Memory usage keys reported by `status`: resident, virtual, and peak
/// resident sizes in MiB. On platforms without `/proc` the values are
/// zero rather than absent, so clients can rely on the keys existing.
pub fn get_meminfo() -> Value {
    let (rss_kib, vms_kib, peak_kib) = read_proc_status().unwrap_or((0, 0, 0));
    json!({
        "memory_rss_mib": kib_to_mib(rss_kib),
        "memory_vms_mib": kib_to_mib(vms_kib),
        "memory_maxrss_mib": kib_to_mib(peak_kib),
    })
}

fn kib_to_mib(kib: u64) -> f64 {
    (kib as f64) / 1024.0
}

fn read_proc_status() -> Option<(u64, u64, u64)> {
    let text = std::fs::read_to_string("/proc/self/status").ok()?;
    let mut rss = 0;
    let mut vms = 0;
    let mut peak = 0;
    for line in text.lines() {
        let field = match line.split(':').next() {
            Some(f) => f,
            None => continue,
        };
        let value = || {
            line.split_whitespace()
                .nth(1)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };
        match field {
            "VmRSS" => rss = value(),
            "VmSize" => vms = value(),
            "VmHWM" => peak = value(),
            _ => {}
        }
    }
    Some((rss, vms, peak))
}
