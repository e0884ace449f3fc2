//! Parsing of container engine output.
//!
//! Build output looks like `sha256:<64 hex>`; run output is the full
//! 64-hex container id. The control plane uses 12-character short ids, the
//! same width `docker ps -q` prints.

use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::error::{RuntimeError, RuntimeResult};

/// Width of short image and container ids.
pub const SHORT_ID_LEN: usize = 12;

/// Offset of the image id in build output (skips `sha256:`).
pub const BUILD_ID_OFFSET: usize = 7;

/// Short image id extracted from build output, for display.
pub fn build_identifier(output: &str) -> RuntimeResult<String> {
    let output = output.trim();
    output
        .get(BUILD_ID_OFFSET..BUILD_ID_OFFSET + SHORT_ID_LEN)
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::MalformedOutput {
            operation: "build",
            output: output.to_string(),
        })
}

/// Short container id extracted from run output.
pub fn instance_identifier(output: &str) -> RuntimeResult<String> {
    let output = output.trim();
    output
        .get(..SHORT_ID_LEN)
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::MalformedOutput {
            operation: "run",
            output: output.to_string(),
        })
}

/// One container id per line; blank lines are ignored.
pub fn parse_running(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// The address printed by an inspect IP query, if any.
pub fn parse_ip(output: &str) -> Option<IpAddr> {
    output.trim().trim_matches('"').parse().ok()
}
