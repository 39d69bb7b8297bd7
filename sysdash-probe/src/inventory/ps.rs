use std::process::Command;

use super::{ProcessSource, RawProcess};
use crate::error::{ProbeError, Result};

/// Process table from `ps aux`.
pub struct PsCommand;

impl ProcessSource for PsCommand {
    fn list_processes(&self) -> Result<Vec<RawProcess>> {
        let output = Command::new("ps")
            .arg("aux")
            .output()
            .map_err(|e| ProbeError::InventoryUnavailable(format!("cannot run ps: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::InventoryUnavailable(format!(
                "ps exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `ps aux` output. Header skipped; rows with too few columns or
/// non-numeric pid/%CPU/%MEM are ignored.
///
/// USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND...
pub fn parse_ps_output(stdout: &str) -> Vec<RawProcess> {
    stdout
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 11 {
                return None;
            }
            Some(RawProcess {
                pid: parts[1].parse().ok()?,
                cpu_percent: parts[2].parse().ok()?,
                memory_percent: parts[3].parse().ok()?,
                command: parts[10..].join(" "),
            })
        })
        .collect()
}
