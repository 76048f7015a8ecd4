use std::collections::BTreeMap;

use crate::config::AlertThresholds;
use crate::zpool::{PoolErrors, PoolHealth, PoolUsage, ScrubInfo};

const STATUS_OK: &str = "✅";
const STATUS_WARNING: &str = "⚠️";
const STATUS_CRITICAL: &str = "❌";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Ok,
    Warning,
    Critical,
}

impl PoolStatus {
    pub fn glyph(&self) -> &'static str {
        match self {
            PoolStatus::Ok => STATUS_OK,
            PoolStatus::Warning => STATUS_WARNING,
            PoolStatus::Critical => STATUS_CRITICAL,
        }
    }
}

/// One merged, threshold-evaluated table row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolRow {
    pub pool: String,
    pub health: PoolHealth,
    pub size: String,
    pub allocated: String,
    pub free: String,
    pub capacity: String,
    pub errors: PoolErrors,
    pub last_scrub: String,
    pub days_ago: Option<i64>,
    pub status: PoolStatus,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ReportStats {
    pub total_pools: usize,
    pub healthy_pools: usize,
    pub total_errors: u64,
    pub stale_scrubs: usize,
}

/// Merge the four per-pool maps into rows. The health map is the canonical
/// pool set; pools missing from the other maps fall back to "N/A", zero
/// errors, and "Never" scrubbed.
pub fn merge_rows(
    health: &BTreeMap<String, PoolHealth>,
    usage: &BTreeMap<String, PoolUsage>,
    errors: &BTreeMap<String, PoolErrors>,
    scrub: &BTreeMap<String, ScrubInfo>,
    thresholds: &AlertThresholds,
) -> Vec<PoolRow> {
    health
        .iter()
        .map(|(pool, health)| {
            let usage = usage.get(pool);
            let errors = errors.get(pool).cloned().unwrap_or_default();
            let scrub = scrub.get(pool).cloned().unwrap_or_default();

            let errors_ok = errors.total() == 0;
            // Unknown scrub age counts as OK
            let scrub_ok = scrub
                .days_ago
                .map(|days| days <= thresholds.scrub_warning_days)
                .unwrap_or(true);

            let status = if health.is_online() && errors_ok && scrub_ok {
                PoolStatus::Ok
            } else if !health.is_online() || errors.total() > thresholds.error_critical {
                PoolStatus::Critical
            } else {
                PoolStatus::Warning
            };

            PoolRow {
                pool: pool.clone(),
                health: health.clone(),
                size: usage.map_or("N/A".to_string(), |u| u.size.clone()),
                allocated: usage.map_or("N/A".to_string(), |u| u.allocated.clone()),
                free: usage.map_or("N/A".to_string(), |u| u.free.clone()),
                capacity: usage.map_or("N/A".to_string(), |u| u.capacity.clone()),
                errors,
                last_scrub: scrub.last_scrub,
                days_ago: scrub.days_ago,
                status,
            }
        })
        .collect()
}

pub fn compute_stats(rows: &[PoolRow], thresholds: &AlertThresholds) -> ReportStats {
    ReportStats {
        total_pools: rows.len(),
        healthy_pools: rows.iter().filter(|r| r.health.is_online()).count(),
        total_errors: rows.iter().map(|r| r.errors.total()).sum(),
        stale_scrubs: rows
            .iter()
            .filter(|r| r.days_ago.is_some_and(|d| d > thresholds.scrub_warning_days))
            .count(),
    }
}

/// Capacity cell with a marker once the percentage crosses a threshold.
/// Both boundaries are inclusive, critical wins.
fn annotate_capacity(capacity: &str, thresholds: &AlertThresholds) -> String {
    let pct: Option<u32> = capacity.trim_end_matches('%').parse().ok();
    match pct {
        Some(p) if p >= thresholds.capacity_critical => format!("{capacity} {STATUS_CRITICAL}"),
        Some(p) if p >= thresholds.capacity_warning => format!("{capacity} {STATUS_WARNING}"),
        _ => capacity.to_string(),
    }
}

/// Scrub age cell; thresholds are exclusive here (an age exactly at the
/// warning threshold is still fine).
fn annotate_days(days_ago: Option<i64>, thresholds: &AlertThresholds) -> String {
    match days_ago {
        None => "N/A".to_string(),
        Some(d) if d > thresholds.scrub_critical_days => format!("{d} {STATUS_CRITICAL}"),
        Some(d) if d > thresholds.scrub_warning_days => format!("{d} {STATUS_WARNING}"),
        Some(d) => d.to_string(),
    }
}

fn pad(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    let mut out = String::from(cell);
    out.push_str(&" ".repeat(width.saturating_sub(len)));
    out
}

fn format_table(headers: &[&str], rows: &[Vec<String>], title: &str) -> String {
    if rows.is_empty() {
        return format!("{title}\nNo data available\n");
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut table = String::new();
    if !title.is_empty() {
        table.push_str(title);
        table.push('\n');
    }

    let header_cells: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| pad(h, widths[i]))
        .collect();
    table.push_str(&format!("| {} |\n", header_cells.join(" | ")));

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    table.push_str(&format!("|{}|\n", rule.join("|")));

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths[i]))
            .collect();
        table.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    table.push('\n');
    table
}

const TABLE_HEADERS: [&str; 12] = [
    "Pool", "Health", "Size", "Used", "Free", "Capacity", "Read Err", "Write Err", "Cksum Err",
    "Last Scrub", "Days Ago", "Status",
];

/// Render the full plain-text report: header, pool table, summary, warnings.
/// Pure function of its inputs, so rendering the same rows twice yields
/// byte-identical text.
pub fn render_report(
    rows: &[PoolRow],
    stats: &ReportStats,
    thresholds: &AlertThresholds,
    hostname: &str,
    generated_at: &str,
) -> String {
    let mut report = format!(
        "ZFS Status Report - {generated_at}\nHost: {hostname}\n{}\n\n",
        "=".repeat(120)
    );

    let table_rows: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.pool.clone(),
                r.health.to_string(),
                r.size.clone(),
                r.allocated.clone(),
                r.free.clone(),
                annotate_capacity(&r.capacity, thresholds),
                r.errors.read.to_string(),
                r.errors.write.to_string(),
                r.errors.cksum.to_string(),
                r.last_scrub.clone(),
                annotate_days(r.days_ago, thresholds),
                r.status.glyph().to_string(),
            ]
        })
        .collect();

    report.push_str(&format_table(&TABLE_HEADERS, &table_rows, "ZFS POOL STATUS:"));

    report.push_str(&format!("SUMMARY:\n{}\n", "-".repeat(60)));
    report.push_str(&format!("Total Pools: {}\n", stats.total_pools));
    report.push_str(&format!(
        "Healthy Pools: {}/{}\n",
        stats.healthy_pools, stats.total_pools
    ));
    report.push_str(&format!("Total Errors: {}\n", stats.total_errors));
    report.push_str(&format!(
        "Pools with old scrubs (>{} days): {}\n\n",
        thresholds.scrub_warning_days, stats.stale_scrubs
    ));

    let mut warnings = Vec::new();
    if stats.healthy_pools < stats.total_pools {
        warnings.push(format!(
            "{} pool(s) are not ONLINE",
            stats.total_pools - stats.healthy_pools
        ));
    }
    if stats.total_errors > 0 {
        warnings.push(format!("{} total errors detected", stats.total_errors));
    }
    if stats.stale_scrubs > 0 {
        warnings.push(format!("{} pool(s) need scrubbing", stats.stale_scrubs));
    }

    if warnings.is_empty() {
        report.push_str("✅ All pools are healthy with no errors and recent scrubs!\n");
    } else {
        report.push_str("⚠️  WARNINGS:\n");
        for warning in &warnings {
            report.push_str(&format!("   • {warning}\n"));
        }
    }

    report
}

/// Subject line for the report mail, highest-priority condition first:
/// unhealthy pools beat error counts beat stale scrubs.
pub fn subject(stats: &ReportStats) -> String {
    if stats.healthy_pools == stats.total_pools
        && stats.total_errors == 0
        && stats.stale_scrubs == 0
    {
        format!("✅ ZFS Report - All {} pools healthy", stats.total_pools)
    } else if stats.healthy_pools < stats.total_pools {
        format!(
            "❌ ZFS Report - {} pool(s) unhealthy",
            stats.total_pools - stats.healthy_pools
        )
    } else if stats.total_errors > 0 {
        format!("⚠️ ZFS Report - {} errors detected", stats.total_errors)
    } else if stats.stale_scrubs > 0 {
        format!("⚠️ ZFS Report - {} pool(s) need scrubbing", stats.stale_scrubs)
    } else {
        "✅ ZFS Report - All systems normal".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zpool::{self, PoolCli};
    use chrono::NaiveDate;

    fn thresholds() -> AlertThresholds {
        AlertThresholds::default()
    }

    fn online_pool(name: &str) -> (BTreeMap<String, PoolHealth>, BTreeMap<String, PoolUsage>) {
        let mut health = BTreeMap::new();
        health.insert(name.to_string(), PoolHealth::Online);
        let mut usage = BTreeMap::new();
        usage.insert(
            name.to_string(),
            PoolUsage {
                size: "10.9T".to_string(),
                allocated: "8.21T".to_string(),
                free: "2.69T".to_string(),
                capacity: "75%".to_string(),
            },
        );
        (health, usage)
    }

    #[test]
    fn rendering_is_idempotent() {
        let (health, usage) = online_pool("tank");
        let rows = merge_rows(&health, &usage, &BTreeMap::new(), &BTreeMap::new(), &thresholds());
        let stats = compute_stats(&rows, &thresholds());
        let a = render_report(&rows, &stats, &thresholds(), "nas01", "2025-01-14 06:00:00");
        let b = render_report(&rows, &stats, &thresholds(), "nas01", "2025-01-14 06:00:00");
        assert_eq!(a, b);
    }

    #[test]
    fn missing_maps_fall_back_to_defaults() {
        let mut health = BTreeMap::new();
        health.insert("tank".to_string(), PoolHealth::Online);
        let rows = merge_rows(
            &health,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &BTreeMap::new(),
            &thresholds(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size, "N/A");
        assert_eq!(rows[0].capacity, "N/A");
        assert_eq!(rows[0].errors.total(), 0);
        assert_eq!(rows[0].last_scrub, "Never");
        assert_eq!(rows[0].days_ago, None);
        // Unknown scrub age and zero errors leave an ONLINE pool all-clear
        assert_eq!(rows[0].status, PoolStatus::Ok);
    }

    #[test]
    fn capacity_critical_boundary_is_inclusive() {
        let t = thresholds();
        assert_eq!(annotate_capacity("90%", &t), "90% ❌");
        assert_eq!(annotate_capacity("89%", &t), "89% ⚠️");
        assert_eq!(annotate_capacity("80%", &t), "80% ⚠️");
        assert_eq!(annotate_capacity("79%", &t), "79%");
        assert_eq!(annotate_capacity("N/A", &t), "N/A");
    }

    #[test]
    fn scrub_age_boundary_is_exclusive() {
        let t = thresholds();
        assert_eq!(annotate_days(Some(30), &t), "30");
        assert_eq!(annotate_days(Some(31), &t), "31 ⚠️");
        assert_eq!(annotate_days(Some(90), &t), "90 ⚠️");
        assert_eq!(annotate_days(Some(91), &t), "91 ❌");
        assert_eq!(annotate_days(None, &t), "N/A");
    }

    #[test]
    fn degraded_pool_is_critical_regardless_of_errors_and_scrub() {
        let mut health = BTreeMap::new();
        health.insert("tank".to_string(), PoolHealth::Degraded);
        let rows = merge_rows(
            &health,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &BTreeMap::new(),
            &thresholds(),
        );
        assert_eq!(rows[0].status, PoolStatus::Critical);

        let stats = compute_stats(&rows, &thresholds());
        assert_eq!(subject(&stats), "❌ ZFS Report - 1 pool(s) unhealthy");
    }

    #[test]
    fn errors_above_critical_make_pool_critical() {
        let mut health = BTreeMap::new();
        health.insert("tank".to_string(), PoolHealth::Online);
        let mut errors = BTreeMap::new();
        errors.insert("tank".to_string(), PoolErrors { read: 11, write: 0, cksum: 0 });
        let rows = merge_rows(&health, &BTreeMap::new(), &errors, &BTreeMap::new(), &thresholds());
        assert_eq!(rows[0].status, PoolStatus::Critical);
    }

    #[test]
    fn few_errors_make_pool_warning_not_critical() {
        let mut health = BTreeMap::new();
        health.insert("tank".to_string(), PoolHealth::Online);
        let mut errors = BTreeMap::new();
        errors.insert("tank".to_string(), PoolErrors { read: 1, write: 0, cksum: 1 });
        let rows = merge_rows(&health, &BTreeMap::new(), &errors, &BTreeMap::new(), &thresholds());
        assert_eq!(rows[0].status, PoolStatus::Warning);
    }

    #[test]
    fn subject_priority_order() {
        let mut stats = ReportStats {
            total_pools: 3,
            healthy_pools: 3,
            total_errors: 0,
            stale_scrubs: 0,
        };
        assert_eq!(subject(&stats), "✅ ZFS Report - All 3 pools healthy");

        stats.stale_scrubs = 2;
        assert_eq!(subject(&stats), "⚠️ ZFS Report - 2 pool(s) need scrubbing");

        stats.total_errors = 5;
        assert_eq!(subject(&stats), "⚠️ ZFS Report - 5 errors detected");

        stats.healthy_pools = 1;
        assert_eq!(subject(&stats), "❌ ZFS Report - 2 pool(s) unhealthy");
    }

    struct StubCli {
        health: &'static str,
        usage: &'static str,
        names: &'static str,
        status: &'static str,
    }

    impl PoolCli for StubCli {
        fn list(&self, columns: &str) -> Result<String, String> {
            match columns {
                "name,health" => Ok(self.health.to_string()),
                "name,size,alloc,free,cap" => Ok(self.usage.to_string()),
                "name" => Ok(self.names.to_string()),
                other => Err(format!("unexpected columns {other}")),
            }
        }

        fn status(&self, _pool: Option<&str>) -> Result<String, String> {
            Ok(self.status.to_string())
        }
    }

    #[test]
    fn warning_pool_end_to_end() {
        // ONLINE, 85% full, zero errors, scrubbed 45 days ago (warn 30, crit 90)
        let cli = StubCli {
            health: "tank\tONLINE",
            usage: "tank\t10.9T\t9.26T\t1.64T\t85%",
            names: "tank",
            status: "  pool: tank\n state: ONLINE\n  scan: scrub repaired 0B in 05:23:11 with 0 errors on Sun Dec 15 14:30:25 2024\nconfig:\n\n\tNAME  STATE  READ WRITE CKSUM\n\ttank  ONLINE  0  0  0\n",
        };
        let now = NaiveDate::from_ymd_opt(2025, 1, 29)
            .unwrap()
            .and_hms_opt(14, 30, 25)
            .unwrap();

        let health = zpool::collect_health(&cli);
        let usage = zpool::collect_usage(&cli);
        let errors = zpool::collect_errors(&cli);
        let scrub = zpool::collect_scrub(&cli, now);

        let t = thresholds();
        let rows = merge_rows(&health, &usage, &errors, &scrub, &t);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].days_ago, Some(45));
        assert_eq!(rows[0].status, PoolStatus::Warning);

        let stats = compute_stats(&rows, &t);
        assert_eq!(stats.stale_scrubs, 1);

        let report = render_report(&rows, &stats, &t, "nas01", "2025-01-29 14:30:25");
        assert!(report.contains("85% ⚠️"));
        assert!(report.contains("45 ⚠️"));
        assert!(report.contains("Pools with old scrubs (>30 days): 1"));
        assert!(report.contains("• 1 pool(s) need scrubbing"));
        assert!(report.contains("2024-12-15 14:30"));
    }

    #[test]
    fn all_clear_report_has_no_warnings_block() {
        let (health, usage) = online_pool("tank");
        let rows = merge_rows(&health, &usage, &BTreeMap::new(), &BTreeMap::new(), &thresholds());
        let stats = compute_stats(&rows, &thresholds());
        let report = render_report(&rows, &stats, &thresholds(), "nas01", "2025-01-14 06:00:00");
        assert!(report.contains("All pools are healthy with no errors and recent scrubs!"));
        assert!(!report.contains("WARNINGS:"));
    }

    #[test]
    fn table_columns_align_on_widest_cell() {
        let (health, usage) = online_pool("tank");
        let rows = merge_rows(&health, &usage, &BTreeMap::new(), &BTreeMap::new(), &thresholds());
        let stats = compute_stats(&rows, &thresholds());
        let report = render_report(&rows, &stats, &thresholds(), "nas01", "2025-01-14 06:00:00");

        let table_lines: Vec<&str> = report
            .lines()
            .filter(|l| l.starts_with('|'))
            .collect();
        assert_eq!(table_lines.len(), 3);
        // Header, rule, and data row all span the same number of columns
        assert_eq!(table_lines[0].matches('|').count(), table_lines[1].matches('|').count());
        assert_eq!(table_lines[0].matches('|').count(), table_lines[2].matches('|').count());
    }
}
