//! Configuration validation utilities and rules

use crate::{
    error::{AppError, Result},
    models::Config,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Grids larger than this get a duration estimate
const LARGE_GRID: usize = 100;

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration with comprehensive checks
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();

        // Basic validation (tokens, ranges, address)
        config.validate()?;

        warnings.extend(Self::validate_grid(config)?);
        warnings.extend(Self::validate_shaping(config));
        warnings.extend(Self::validate_timing(config));

        Ok(warnings)
    }

    /// Both executables must exist before any trial runs
    pub fn validate_executables(config: &Config) -> Result<()> {
        for (role, path) in [("client", &config.client_bin), ("server", &config.server_bin)] {
            if resolve_executable(path).is_none() {
                return Err(AppError::config(format!(
                    "{} executable '{}' not found or not executable",
                    role,
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn validate_grid(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();
        let grid = config.grid()?;

        for bandwidth in grid.bandwidths().iter().filter(|b| b.is_lenient()) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Bandwidth '{}' has no recognized unit (Mbps/Kbps); treating it as {} Mbps",
                    bandwidth.token(),
                    bandwidth.kbps() / 1000
                ),
            ));
        }

        for (name, tokens) in [
            ("DELAYS", &config.delays),
            ("BANDWIDTHS", &config.bandwidths),
            ("SIZES", &config.sizes),
        ] {
            let mut seen = HashSet::new();
            for token in tokens {
                if !seen.insert(token.as_str()) {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Warning,
                        format!("{} lists '{}' more than once; the cell will run twice", name, token),
                    ));
                }
            }
        }

        if grid.len() > LARGE_GRID {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Sweep has {} trials", grid.len()),
            ));
        }

        Ok(warnings)
    }

    fn validate_shaping(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if !config.enable_shaping {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Traffic shaping is disabled; every trial runs on the bare link".to_string(),
            ));
            return warnings;
        }

        let has_tcset = resolve_executable(Path::new("tcset")).is_some();
        let has_tc = resolve_executable(Path::new("tc")).is_some();

        if !has_tcset && !has_tc {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Neither tcset nor tc was found in PATH; trials will run unshaped".to_string(),
            ));
        } else if !has_tcset {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "tcset not found; shaping will use tc netem + tbf".to_string(),
            ));
        }

        warnings
    }

    fn validate_timing(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.retry_sleep_ms > config.timeout_seconds * 1000 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Retry sleep ({} ms) is longer than the attempt timeout ({} s)",
                    config.retry_sleep_ms, config.timeout_seconds
                ),
            ));
        }

        if let Ok(grid) = config.grid() {
            let worst = grid.len() as u64
                * (config.retries as u64 * (config.timeout_seconds + config.retry_sleep_ms / 1000)
                    + config.settle_ms / 1000
                    + config.server_exit_grace_seconds);
            if grid.len() > LARGE_GRID || worst > 24 * 3600 {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!("Worst-case sweep duration is about {:.1} hours", worst as f64 / 3600.0),
                ));
            }
        }

        warnings
    }
}

/// Resolve an executable: paths with a separator are checked directly,
/// bare names are looked up in PATH
pub fn resolve_executable(path: &Path) -> Option<PathBuf> {
    if path.components().count() > 1 || path.is_absolute() {
        return is_executable(path).then(|| path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> colored::Color {
        match self {
            Self::Info => colored::Color::Blue,
            Self::Warning => colored::Color::Yellow,
            Self::Error => colored::Color::Red,
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    /// Create a new validation warning
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        use colored::Colorize;
        let tag = if use_color {
            self.level.as_str().color(self.level.color()).bold().to_string()
        } else {
            self.level.as_str().to_string()
        };
        format!("[{}] {}", tag, self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
