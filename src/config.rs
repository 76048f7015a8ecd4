use std::env;
use std::fs;
use std::path::Path;

pub const CONFIG_PATH: &str = "zfs_config.yaml";

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Config {
    pub email: EmailConfig,
    #[serde(default)]
    pub alert_thresholds: AlertThresholds,
    #[serde(default)]
    pub report_settings: ReportSettings,
    pub debug: Option<bool>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct AlertThresholds {
    #[serde(default = "default_capacity_warning")]
    pub capacity_warning: u32,
    #[serde(default = "default_capacity_critical")]
    pub capacity_critical: u32,
    #[serde(default = "default_scrub_warning_days")]
    pub scrub_warning_days: i64,
    #[serde(default = "default_scrub_critical_days")]
    pub scrub_critical_days: i64,
    #[serde(default = "default_error_warning")]
    pub error_warning: u64,
    #[serde(default = "default_error_critical")]
    pub error_critical: u64,
}

fn default_capacity_warning() -> u32 {
    80
}
fn default_capacity_critical() -> u32 {
    90
}
fn default_scrub_warning_days() -> i64 {
    30
}
fn default_scrub_critical_days() -> i64 {
    90
}
fn default_error_warning() -> u64 {
    1
}
fn default_error_critical() -> u64 {
    10
}

impl Default for AlertThresholds {
    fn default() -> Self {
        AlertThresholds {
            capacity_warning: default_capacity_warning(),
            capacity_critical: default_capacity_critical(),
            scrub_warning_days: default_scrub_warning_days(),
            scrub_critical_days: default_scrub_critical_days(),
            error_warning: default_error_warning(),
            error_critical: default_error_critical(),
        }
    }
}

// Parsed from the config and kept in the template, but not yet consulted by
// the report logic. See DESIGN.md.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct ReportSettings {
    #[serde(default = "default_true")]
    pub include_healthy_pools: bool,
    #[serde(default = "default_true")]
    pub email_on_success: bool,
    #[serde(default)]
    pub email_on_warnings_only: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            include_healthy_pools: true,
            email_on_success: true,
            email_on_warnings_only: false,
        }
    }
}

const SAMPLE_CONFIG: &str = "\
email:
  smtp_server: smtp.gmail.com
  smtp_port: 587
  username: your-email@gmail.com
  password: your-app-password
  from_address: your-email@gmail.com
  to_addresses:
    - admin@yourcompany.com
    - backup-admin@yourcompany.com
alert_thresholds:
  capacity_warning: 80
  capacity_critical: 90
  scrub_warning_days: 30
  scrub_critical_days: 90
  error_warning: 1
  error_critical: 10
report_settings:
  include_healthy_pools: true
  email_on_success: true
  email_on_warnings_only: false
debug: false
";

/// Outcome of `load_config`: either a usable config, or a freshly written
/// sample file the operator must edit before the tool can run.
pub enum LoadOutcome {
    Loaded(Config),
    TemplateCreated,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoadOutcome, String> {
    if !path.as_ref().exists() {
        write_sample_config(&path)?;
        return Ok(LoadOutcome::TemplateCreated);
    }

    // Check file permissions on Unix systems; the file holds SMTP credentials
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&path) {
            let mode = metadata.permissions().mode();
            if mode & 0o044 != 0 {
                eprintln!(
                    "[SECURITY WARNING] Configuration file {} is readable by group/others. Consider: chmod 600 {}",
                    path.as_ref().display(),
                    path.as_ref().display()
                );
            }
        }
    }

    let data = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read config file {}: {e}", path.as_ref().display()))?;

    let config: Config =
        serde_yaml::from_str(&data).map_err(|e| format!("Failed to parse config YAML: {e}"))?;

    validate_config(&config)?;

    let config = apply_env_overrides(config);

    Ok(LoadOutcome::Loaded(config))
}

fn write_sample_config<P: AsRef<Path>>(path: P) -> Result<(), String> {
    fs::write(&path, SAMPLE_CONFIG)
        .map_err(|e| format!("Failed to write sample config {}: {e}", path.as_ref().display()))
}

fn apply_env_overrides(mut config: Config) -> Config {
    // SMTP credentials can come from the environment instead of the file
    if let Ok(user) = env::var("ZFS_REPORT_SMTP_USER") {
        if !user.trim().is_empty() {
            config.email.username = user;
        }
    }

    if let Ok(pass) = env::var("ZFS_REPORT_SMTP_PASS") {
        if !pass.trim().is_empty() {
            config.email.password = pass;
        }
    }

    config
}

fn validate_config(config: &Config) -> Result<(), String> {
    let mut missing_keys = Vec::new();
    let mut warnings = Vec::new();

    if config.email.smtp_server.trim().is_empty() {
        missing_keys.push("email.smtp_server".to_string());
    }
    if config.email.smtp_port == 0 {
        missing_keys.push("email.smtp_port (must be 1-65535)".to_string());
    }
    if config.email.from_address.trim().is_empty() || !config.email.from_address.contains('@') {
        missing_keys.push("email.from_address (must be a valid email address)".to_string());
    }

    let recipients = config
        .email
        .to_addresses
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .count();
    if recipients == 0 {
        missing_keys.push("email.to_addresses (at least one recipient required)".to_string());
    }
    for addr in &config.email.to_addresses {
        let a = addr.trim();
        if !a.is_empty() && !a.contains('@') {
            missing_keys.push(format!("email.to_addresses ('{a}' appears invalid)"));
        }
    }

    let t = &config.alert_thresholds;
    if t.capacity_warning > 100 || t.capacity_critical > 100 {
        missing_keys.push("alert_thresholds.capacity_* (must be 0-100)".to_string());
    }
    if t.capacity_warning > t.capacity_critical {
        warnings.push(format!(
            "capacity_warning ({}) is above capacity_critical ({}); critical will trigger first",
            t.capacity_warning, t.capacity_critical
        ));
    }
    if t.scrub_warning_days < 0 || t.scrub_critical_days < 0 {
        missing_keys.push("alert_thresholds.scrub_*_days (must be non-negative)".to_string());
    }
    if t.scrub_warning_days > t.scrub_critical_days {
        warnings.push(format!(
            "scrub_warning_days ({}) is above scrub_critical_days ({})",
            t.scrub_warning_days, t.scrub_critical_days
        ));
    }
    if t.error_warning > t.error_critical {
        warnings.push(format!(
            "error_warning ({}) is above error_critical ({})",
            t.error_warning, t.error_critical
        ));
    }

    if config.debug.unwrap_or(false) {
        warnings.push(
            "Debug mode is enabled. This may expose sensitive information in logs.".to_string(),
        );
    }

    if !missing_keys.is_empty() {
        return Err(format!(
            "Missing or invalid required configuration keys: {}",
            missing_keys.join(", ")
        ));
    }
    if !warnings.is_empty() {
        eprintln!("[CONFIG WARNING] {}", warnings.join(" | "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("zfsreport-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn sample_config_is_written_when_missing() {
        let path = temp_path("missing.yaml");
        let _ = fs::remove_file(&path);

        match load_config(&path) {
            Ok(LoadOutcome::TemplateCreated) => {}
            _ => panic!("expected template creation"),
        }
        assert!(path.exists());

        // The template itself must be loadable on a second run
        match load_config(&path) {
            Ok(LoadOutcome::Loaded(cfg)) => {
                assert_eq!(cfg.email.smtp_port, 587);
                assert_eq!(cfg.email.to_addresses.len(), 2);
                assert_eq!(cfg.alert_thresholds.capacity_warning, 80);
                assert!(cfg.report_settings.include_healthy_pools);
            }
            _ => panic!("expected loaded config"),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn thresholds_default_when_section_missing() {
        let cfg: Config = serde_yaml::from_str(
            "email:\n  smtp_server: mail.example.com\n  smtp_port: 587\n  username: u\n  password: p\n  from_address: a@b.c\n  to_addresses: [x@y.z]\n",
        )
        .unwrap();
        assert_eq!(cfg.alert_thresholds.capacity_warning, 80);
        assert_eq!(cfg.alert_thresholds.capacity_critical, 90);
        assert_eq!(cfg.alert_thresholds.scrub_warning_days, 30);
        assert_eq!(cfg.alert_thresholds.scrub_critical_days, 90);
        assert_eq!(cfg.alert_thresholds.error_warning, 1);
        assert_eq!(cfg.alert_thresholds.error_critical, 10);
    }

    #[test]
    fn partial_thresholds_keep_remaining_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "email:\n  smtp_server: mail.example.com\n  smtp_port: 587\n  username: u\n  password: p\n  from_address: a@b.c\n  to_addresses: [x@y.z]\nalert_thresholds:\n  capacity_warning: 70\n",
        )
        .unwrap();
        assert_eq!(cfg.alert_thresholds.capacity_warning, 70);
        assert_eq!(cfg.alert_thresholds.capacity_critical, 90);
    }

    #[test]
    fn malformed_config_is_fatal() {
        let path = temp_path("malformed.yaml");
        fs::write(&path, "email: [not, a, mapping").unwrap();
        assert!(load_config(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_recipients_rejected() {
        let cfg: Config = serde_yaml::from_str(
            "email:\n  smtp_server: mail.example.com\n  smtp_port: 587\n  username: u\n  password: p\n  from_address: a@b.c\n  to_addresses: []\n",
        )
        .unwrap();
        assert!(validate_config(&cfg).is_err());
    }
}
