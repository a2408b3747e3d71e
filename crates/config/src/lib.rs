//! Skript Engine Configuration
//!
//! Loads engine configuration from a `skript.conf` file of `key = value`
//! lines. Unknown keys are ignored and malformed values keep their defaults.

use skript_core::SkriptError;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "skript.conf";

/// Complete engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // ========== Scripts ==========
    /// Directory scanned for scripts (from "scripts_dir" option)
    pub scripts_dir: PathBuf,
    /// Script file extension, matched case-insensitively (from "script_extension" option)
    pub script_extension: String,
    /// File name prefix marking a disabled script (from "disabled_prefix" option)
    pub disabled_prefix: String,

    // ========== Parser ==========
    /// Maximum placeholder nesting depth before `TooDeeplyNested` (from "max_parse_depth" option)
    pub max_parse_depth: usize,
    /// Maximum number of hops in a converter chain (from "max_converter_chain" option)
    pub max_converter_chain: usize,
    /// Keep matching after the first candidate to report ambiguous lines (from "detect_ambiguity" option)
    pub detect_ambiguity: bool,
    /// Abort a script batch on its first error diagnostic (from "stop_on_first_error" option)
    pub stop_on_first_error: bool,

    // ========== Runtime ==========
    /// Log filter directive used by the binary (from "log_level" option)
    pub log_level: String,
    /// Reload scripts when their files change (from "watch" option)
    pub watch: bool,
    /// Quiet period before a changed file is reloaded (from "watch_debounce_ms" option)
    pub watch_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            script_extension: "sk".into(),
            disabled_prefix: "-".into(),
            max_parse_depth: 32,
            max_converter_chain: 3,
            detect_ambiguity: false,
            stop_on_first_error: false,
            log_level: "info".into(),
            watch: false,
            watch_debounce_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SkriptError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse(&content);

        // A relative scripts_dir is resolved against the config file's folder
        if config.scripts_dir.is_relative() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.scripts_dir = parent.join(&config.scripts_dir);
            }
        }

        Ok(config)
    }

    /// Load `skript.conf` from the working directory
    pub fn load_default() -> Result<Self, SkriptError> {
        Self::load_from_file(DEFAULT_CONFIG_FILE)
    }

    /// Parse configuration content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse key=value
            if let Some(eq_pos) = line.find('=') {
                let key = line[..eq_pos].trim();
                let value = line[eq_pos + 1..].trim();

                config.parse_option(key, value);
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key {
            "scripts_dir" => self.scripts_dir = PathBuf::from(value),
            "script_extension" => {
                self.script_extension = value.trim_start_matches('.').to_lowercase();
            }
            "disabled_prefix" => self.disabled_prefix = value.into(),
            "max_parse_depth" => {
                self.max_parse_depth = value.parse().unwrap_or(32).max(1);
            }
            "max_converter_chain" => {
                self.max_converter_chain = value.parse().unwrap_or(3).max(1);
            }
            "detect_ambiguity" => {
                self.detect_ambiguity = parse_bool(value).unwrap_or(false);
            }
            "stop_on_first_error" => {
                self.stop_on_first_error = parse_bool(value).unwrap_or(false);
            }
            "log_level" => self.log_level = value.to_lowercase(),
            "watch" => {
                self.watch = parse_bool(value).unwrap_or(false);
            }
            "watch_debounce_ms" => {
                self.watch_debounce_ms = value.parse().unwrap_or(250);
            }
            _ => {
                tracing::debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Whether a file name has the configured script extension
    pub fn is_script_file(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.script_extension))
            .unwrap_or(false)
    }

    /// Whether a file name marks a disabled script
    pub fn is_disabled(&self, file_name: &str) -> bool {
        !self.disabled_prefix.is_empty() && file_name.starts_with(&self.disabled_prefix)
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Engine configuration:");
        tracing::info!("  [scripts]");
        tracing::info!("    Directory: {}", self.scripts_dir.display());
        tracing::info!("    Extension: .{}", self.script_extension);
        tracing::info!("    Disabled prefix: {:?}", self.disabled_prefix);
        tracing::info!("  [parser]");
        tracing::info!("    Max parse depth: {}", self.max_parse_depth);
        tracing::info!("    Max converter chain: {}", self.max_converter_chain);
        tracing::info!("    Detect ambiguity: {}", self.detect_ambiguity);
        tracing::info!("    Stop on first error: {}", self.stop_on_first_error);
        tracing::info!("  [runtime]");
        tracing::info!("    Log level: {}", self.log_level);
        tracing::info!("    Watch: {} ({} ms debounce)", self.watch, self.watch_debounce_ms);
    }
}

/// Accepts the spellings script authors actually write in config files
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
