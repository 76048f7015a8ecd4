use std::collections::BTreeMap;
use std::fmt;
use std::process::Command;
use std::str::FromStr;

use chrono::NaiveDateTime;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

/// Coarse operational state of a pool as reported by `zpool list`.
/// Unrecognized states are preserved verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum PoolHealth {
    Online,
    Degraded,
    Faulted,
    Offline,
    Unavail,
    Removed,
    Other(String),
}

impl PoolHealth {
    pub fn is_online(&self) -> bool {
        matches!(self, PoolHealth::Online)
    }
}

impl From<&str> for PoolHealth {
    fn from(s: &str) -> Self {
        match s {
            "ONLINE" => PoolHealth::Online,
            "DEGRADED" => PoolHealth::Degraded,
            "FAULTED" => PoolHealth::Faulted,
            "OFFLINE" => PoolHealth::Offline,
            "UNAVAIL" => PoolHealth::Unavail,
            "REMOVED" => PoolHealth::Removed,
            other => PoolHealth::Other(other.to_string()),
        }
    }
}

impl FromStr for PoolHealth {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolHealth::Online => write!(f, "ONLINE"),
            PoolHealth::Degraded => write!(f, "DEGRADED"),
            PoolHealth::Faulted => write!(f, "FAULTED"),
            PoolHealth::Offline => write!(f, "OFFLINE"),
            PoolHealth::Unavail => write!(f, "UNAVAIL"),
            PoolHealth::Removed => write!(f, "REMOVED"),
            PoolHealth::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Capacity figures exactly as `zpool list` prints them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PoolUsage {
    pub size: String,
    pub allocated: String,
    pub free: String,
    pub capacity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolErrors {
    pub read: u64,
    pub write: u64,
    pub cksum: u64,
}

impl PoolErrors {
    pub fn total(&self) -> u64 {
        self.read + self.write + self.cksum
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ScrubInfo {
    pub status: String,
    pub last_scrub: String,
    pub days_ago: Option<i64>,
}

impl Default for ScrubInfo {
    fn default() -> Self {
        ScrubInfo {
            status: "No scrub info found".to_string(),
            last_scrub: "Never".to_string(),
            days_ago: None,
        }
    }
}

/// The seam between report logic and the screen-scraped `zpool` CLI. Keeps
/// every invocation shape in one place so the text source can be swapped for
/// a structured one without touching the parsers' callers.
pub trait PoolCli {
    fn list(&self, columns: &str) -> Result<String, String>;
    fn status(&self, pool: Option<&str>) -> Result<String, String>;
}

pub struct ZpoolCommand;

impl ZpoolCommand {
    fn run(&self, args: &[&str]) -> Result<String, String> {
        debug!("Running: zpool {}", args.join(" "));
        let output = Command::new("zpool")
            .args(args)
            .output()
            .map_err(|e| format!("Failed to run zpool {}: {e}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "zpool {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl PoolCli for ZpoolCommand {
    fn list(&self, columns: &str) -> Result<String, String> {
        self.run(&["list", "-H", "-o", columns])
    }

    fn status(&self, pool: Option<&str>) -> Result<String, String> {
        match pool {
            Some(name) => self.run(&["status", name]),
            None => self.run(&["status"]),
        }
    }
}

/// Parse `zpool list -H -o name,health` output: one tab-separated
/// `name<TAB>health` record per non-blank line.
pub fn parse_health(output: &str) -> BTreeMap<String, PoolHealth> {
    let mut pools = BTreeMap::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 2 {
            pools.insert(parts[0].to_string(), PoolHealth::from(parts[1]));
        }
    }
    pools
}

/// Parse `zpool list -H -o name,size,alloc,free,cap` output.
pub fn parse_usage(output: &str) -> BTreeMap<String, PoolUsage> {
    let mut pools = BTreeMap::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 5 {
            pools.insert(
                parts[0].to_string(),
                PoolUsage {
                    size: parts[1].to_string(),
                    allocated: parts[2].to_string(),
                    free: parts[3].to_string(),
                    capacity: parts[4].to_string(),
                },
            );
        }
    }
    pools
}

fn parse_count(token: &str) -> u64 {
    token.parse().unwrap_or(0)
}

/// Scan free-form `zpool status` text for per-pool read/write/cksum error
/// counts. A `pool:` line opens a new pool context with zeroed counts; any
/// later line containing the pool name (outside the `config:` header) has
/// its last three whitespace-separated tokens read as integers, each
/// independently defaulting to zero. Later matching lines overwrite earlier
/// ones, so the final vdev summary wins.
pub fn parse_errors(output: &str) -> BTreeMap<String, PoolErrors> {
    let mut pools = BTreeMap::new();
    let mut current_pool: Option<String> = None;

    for raw in output.lines() {
        let line = raw.trim();

        if let Some(rest) = line.strip_prefix("pool:") {
            let name = rest.trim().to_string();
            pools.insert(name.clone(), PoolErrors::default());
            current_pool = Some(name);
            continue;
        }

        if let Some(pool) = &current_pool {
            if line.contains(pool.as_str()) && !line.starts_with("config:") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 4 {
                    pools.insert(
                        pool.clone(),
                        PoolErrors {
                            read: parse_count(parts[parts.len() - 3]),
                            write: parse_count(parts[parts.len() - 2]),
                            cksum: parse_count(parts[parts.len() - 1]),
                        },
                    );
                }
            }
        }
    }

    pools
}

// Matches timestamps like "on Sun Dec 15 14:30:25 2024" embedded in scan lines.
static SCRUB_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"on\s+(\w{3}\s+\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\d{4})")
        .unwrap_or_else(|e| panic!("invalid scrub date regex: {e}"))
});

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Extract scrub status from one pool's `zpool status <pool>` output.
///
/// Takes the first line mentioning "scan" or "scrub" (case-insensitive),
/// appending the following line when it is indented deeper than the scan
/// line itself. If the block embeds a `<weekday> <month> <day> <HH:MM:SS>
/// <year>` timestamp, the scrub age is `now` minus that timestamp in whole
/// days; otherwise the age stays unknown and the last scrub reads "Never".
pub fn parse_scrub(output: &str, now: NaiveDateTime) -> ScrubInfo {
    let mut info = ScrubInfo::default();
    let lines: Vec<&str> = output.lines().collect();

    for (i, raw) in lines.iter().enumerate() {
        let lower = raw.to_lowercase();
        if !lower.contains("scan:") && !lower.contains("scrub:") {
            continue;
        }

        let mut full_line = raw.trim().to_string();
        if let Some(next) = lines.get(i + 1) {
            if !next.trim().is_empty() && indent_width(next) > indent_width(raw) {
                full_line.push(' ');
                full_line.push_str(next.trim());
            }
        }

        info.status = full_line.clone();

        if let Some(caps) = SCRUB_DATE_RE.captures(&full_line) {
            let date_str = &caps[1];
            match NaiveDateTime::parse_from_str(date_str, "%a %b %d %H:%M:%S %Y") {
                Ok(scrub_date) => {
                    info.last_scrub = scrub_date.format("%Y-%m-%d %H:%M").to_string();
                    info.days_ago = Some((now - scrub_date).num_days());
                }
                Err(e) => {
                    // Keep "Never"/unknown on bad dates
                    debug!("Unparseable scrub date '{date_str}': {e}");
                }
            }
        }

        // Only the first scan/scrub block counts
        break;
    }

    info
}

pub fn collect_health(cli: &dyn PoolCli) -> BTreeMap<String, PoolHealth> {
    match cli.list("name,health") {
        Ok(output) => parse_health(&output),
        Err(e) => {
            warn!("Could not query pool health: {e}");
            BTreeMap::new()
        }
    }
}

pub fn collect_usage(cli: &dyn PoolCli) -> BTreeMap<String, PoolUsage> {
    match cli.list("name,size,alloc,free,cap") {
        Ok(output) => parse_usage(&output),
        Err(e) => {
            warn!("Could not query pool usage: {e}");
            BTreeMap::new()
        }
    }
}

pub fn collect_errors(cli: &dyn PoolCli) -> BTreeMap<String, PoolErrors> {
    match cli.status(None) {
        Ok(output) => parse_errors(&output),
        Err(e) => {
            warn!("Could not query pool status: {e}");
            BTreeMap::new()
        }
    }
}

/// Re-invokes `status <pool>` once per pool, sequentially. O(pool count)
/// subprocess spawns, which is fine for the handful of pools a host carries.
pub fn collect_scrub(cli: &dyn PoolCli, now: NaiveDateTime) -> BTreeMap<String, ScrubInfo> {
    let names = match cli.list("name") {
        Ok(output) => output,
        Err(e) => {
            warn!("Could not list pools for scrub status: {e}");
            return BTreeMap::new();
        }
    };

    let mut pools = BTreeMap::new();
    for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
        match cli.status(Some(name)) {
            Ok(output) => {
                pools.insert(name.to_string(), parse_scrub(&output, now));
            }
            Err(e) => {
                warn!("Could not query scrub status for pool {name}: {e}");
                pools.insert(name.to_string(), ScrubInfo::default());
            }
        }
    }
    pools
}
