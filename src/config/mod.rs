// Configuration module
// Manages the INI config file holding job types, logging and authentication settings

mod document;
pub mod cli;
pub mod setup;

pub use cli::{CliArgs, Command};
pub use document::IniDocument;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{BatchAppsError, Result};

/// Default AAD resource for the Batch Apps service
pub const API_RESOURCE: &str = "https://batchapps.core.windows.net/";

const LOGGING: &str = "Logging";
const AUTHENTICATION: &str = "Authentication";
const DEFAULT_JOBTYPE_KEY: &str = "default_jobtype";
const DEPRECATED_DEFAULT_KEY: &str = "default_app";

/// Logging levels as stored in the config file
const LEVELS: [(&str, u8); 5] = [
    ("debug", 10),
    ("info", 20),
    ("warning", 30),
    ("error", 40),
    ("critical", 50),
];

/// Options used when loading a [`Configuration`]
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    /// Directory under which the data directory is created (default: home)
    pub data_path: Option<PathBuf>,
    /// Logging level override
    pub log_level: Option<String>,
    /// Job type to select instead of the configured default
    pub jobtype: Option<String>,
    /// Config file name
    pub name: String,
    /// Data directory name
    pub datadir: String,
    /// Force default configuration, overwriting any existing file
    pub default: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            data_path: None,
            log_level: None,
            jobtype: None,
            name: "batch_apps.ini".to_string(),
            datadir: "BatchAppsData".to_string(),
            default: false,
        }
    }
}

/// Optional updates applied by [`Configuration::aad_config`]
#[derive(Debug, Clone, Default)]
pub struct AadUpdate {
    pub account: Option<String>,
    pub key: Option<String>,
    pub client_id: Option<String>,
    pub tenant: Option<String>,
    pub redirect: Option<String>,
    pub endpoint: Option<String>,
}

/// Batch Apps client configuration backed by an INI file
#[derive(Debug, Clone)]
pub struct Configuration {
    doc: IniDocument,
    data_dir: PathBuf,
    cfg_file: PathBuf,
    write_file: bool,
    jobtype: String,
}

impl Configuration {
    /// Load the configuration, creating a default one if none exists
    pub fn new(options: ConfigOptions) -> Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let (write_file, data_dir) = match options.data_path {
            Some(ref path) if check_directory(path, &options.datadir) => {
                (true, path.join(&options.datadir))
            }
            _ => (
                check_directory(&home, &options.datadir),
                home.join(&options.datadir),
            ),
        };

        let mut config = Configuration {
            doc: IniDocument::new(),
            cfg_file: data_dir.join(&options.name),
            data_dir,
            write_file,
            jobtype: "Blender".to_string(),
        };

        if !options.default && config.cfg_file.is_file() {
            let text = std::fs::read_to_string(&config.cfg_file)?;
            // A broken file is reported, never replaced by the defaults
            config.doc = IniDocument::parse(&text).map_err(|e| {
                BatchAppsError::InvalidConfig(format!(
                    "Failed to load config {}: {:#}",
                    config.cfg_file.display(),
                    e
                ))
            })?;
            config.detect_default_jobtype();
        } else {
            config.set_defaults();
        }

        match options.log_level {
            Some(ref level) => {
                config.set_logging_level(level)?;
            }
            None => {
                let current = config
                    .doc
                    .get(LOGGING, "level")
                    .unwrap_or("30")
                    .to_string();
                config.apply_level(&current);
            }
        }

        if let Some(jobtype) = options.jobtype {
            config.jobtype = jobtype;
        }

        if !config.doc.has_section(&config.jobtype) {
            return Err(BatchAppsError::InvalidConfig(format!(
                "Config file has no setting for job type: {}. \
                 Please specify alternative config or job type.",
                config.jobtype
            )));
        }

        Ok(config)
    }

    /// Build a configuration from INI text without touching the filesystem
    pub fn from_ini(text: &str, jobtype: Option<&str>) -> Result<Self> {
        let doc = IniDocument::parse(text)
            .map_err(|e| BatchAppsError::InvalidConfig(e.to_string()))?;
        let mut config = Configuration {
            doc,
            data_dir: PathBuf::new(),
            cfg_file: PathBuf::new(),
            write_file: false,
            jobtype: "Blender".to_string(),
        };
        config.detect_default_jobtype();
        if let Some(jobtype) = jobtype {
            config.jobtype = jobtype.to_string();
        }
        if !config.doc.has_section(&config.jobtype) {
            return Err(BatchAppsError::InvalidConfig(format!(
                "Config file has no setting for job type: {}.",
                config.jobtype
            )));
        }
        Ok(config)
    }

    fn detect_default_jobtype(&mut self) {
        for section in self.doc.sections() {
            if self.doc.get(&section, DEFAULT_JOBTYPE_KEY) == Some("True") {
                self.jobtype = section;
                return;
            }
            if self.doc.get(&section, DEPRECATED_DEFAULT_KEY) == Some("True") {
                tracing::warn!(
                    "Use of setting 'default_app' is deprecated. Please use 'default_jobtype'."
                );
                self.jobtype = section;
                return;
            }
        }
    }

    /// Create the default config data and save it
    fn set_defaults(&mut self) {
        let doc = &mut self.doc;

        doc.set("Blender", "filename", "output");
        doc.set("Blender", "format", "png");
        doc.set("Blender", "start", "1");
        doc.set("Blender", "end", "10");
        doc.set("Blender", "command", "PNG");
        doc.set("Blender", DEFAULT_JOBTYPE_KEY, "True");

        doc.set("Test", "param1", "abc");
        doc.set("Test", "param2", "xyz");

        let log_file = self.data_dir.join("batch_apps.log");
        doc.set(LOGGING, "output", log_file.to_string_lossy().to_string());
        doc.set(LOGGING, "level", "30");

        doc.set(AUTHENTICATION, "endpoint", "");
        doc.set(AUTHENTICATION, "unattended_account", "");
        doc.set(AUTHENTICATION, "unattended_key", "");
        doc.set(AUTHENTICATION, "client_id", "");
        doc.set(AUTHENTICATION, "redirect_uri", "");
        doc.set(AUTHENTICATION, "tenant", "common");
        doc.set(AUTHENTICATION, "auth_uri", "/oauth2/authorize");
        doc.set(AUTHENTICATION, "token_uri", "/oauth2/token");
        doc.set(AUTHENTICATION, "root", "login.windows.net/");
        doc.set(AUTHENTICATION, "resource", API_RESOURCE);

        self.jobtype = "Blender".to_string();
        self.save_config();
    }

    /// Directory holding the config file, logs and token cache
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Full path of the config file
    pub fn config_file(&self) -> &Path {
        &self.cfg_file
    }

    /// Whether anything may be written to the data directory
    pub fn can_write(&self) -> bool {
        self.write_file
    }

    /// Configured log file path
    pub fn log_file(&self) -> Option<PathBuf> {
        if !self.write_file {
            return None;
        }
        match self.doc.get(LOGGING, "output") {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => Some(self.data_dir.join("batch_apps.log")),
        }
    }

    /// Save configuration settings to file
    ///
    /// Errors are logged rather than returned.
    pub fn save_config(&self) -> bool {
        if !self.write_file {
            tracing::warn!("Config file writing disabled - cannot save config changes");
            return false;
        }

        match std::fs::write(&self.cfg_file, self.doc.to_string()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "Failed to create configuration file: {}. Error: {}",
                    self.cfg_file.display(),
                    e
                );
                false
            }
        }
    }

    /// Delete the config file and reset to defaults
    pub fn clear_config(&mut self) -> bool {
        tracing::debug!("Attempting to clear config file {}", self.cfg_file.display());
        match std::fs::remove_file(&self.cfg_file) {
            Ok(()) => {
                self.doc = IniDocument::new();
                self.set_defaults();
                tracing::info!("Deleted config file and reset config to defaults");
                true
            }
            Err(e) => {
                tracing::error!(
                    "Failed to remove configuration file: {}. Error: {}",
                    self.cfg_file.display(),
                    e
                );
                false
            }
        }
    }

    /// Get the service endpoint without scheme
    pub fn endpoint(&self) -> Result<String> {
        if !self.doc.has_section(AUTHENTICATION) {
            return Err(BatchAppsError::InvalidConfig(
                "Config has no Authentication".to_string(),
            ));
        }

        let endpoint = if let Some(e) = self.doc.get(AUTHENTICATION, "endpoint") {
            e.to_string()
        } else if let Some(e) = self.doc.get(&self.jobtype, "endpoint") {
            tracing::warn!("Job type config in deprecated format. Please regenerate.");
            e.to_string()
        } else {
            return Err(BatchAppsError::InvalidConfig(format!(
                "No valid endpoint value for {}",
                self.jobtype
            )));
        };

        Ok(strip_scheme(&endpoint).to_string())
    }

    /// Change the service endpoint
    pub fn set_endpoint(&mut self, endpoint: &str) -> Result<String> {
        if !self.doc.has_section(AUTHENTICATION) {
            return Err(BatchAppsError::InvalidConfig(
                "Config has no Authentication".to_string(),
            ));
        }
        tracing::info!(
            "Changing endpoint from {} to {}",
            self.endpoint().unwrap_or_default(),
            endpoint
        );
        self.doc.set(AUTHENTICATION, "endpoint", endpoint);
        Ok(strip_scheme(endpoint).to_string())
    }

    /// Current logging level name
    pub fn logging_level(&self) -> Result<&'static str> {
        let level = self.doc.get(LOGGING, "level").ok_or_else(|| {
            BatchAppsError::InvalidConfig("No valid logging level found. Please set.".to_string())
        })?;
        Ok(level_name(parse_level(level).unwrap_or(30)))
    }

    /// Set the logging level by name or number
    ///
    /// Unrecognised values fall back to WARNING.
    pub fn set_logging_level(&mut self, level: &str) -> Result<&'static str> {
        if !self.doc.has_section(LOGGING) {
            self.doc.add_section(LOGGING);
        }
        Ok(self.apply_level(level))
    }

    fn apply_level(&mut self, level: &str) -> &'static str {
        let value = match parse_level(level) {
            Some(v) => v,
            None => {
                eprintln!(
                    "Logging level '{}' not recognized. Must be a string name such as \
                     'debug' or the associated integer. Defaulting to level WARNING.",
                    level
                );
                30
            }
        };
        self.doc.set(LOGGING, "level", value.to_string());
        tracing::debug!("Logging level set to {}", value);
        level_name(value)
    }

    /// Current job type
    pub fn current_jobtype(&self) -> &str {
        &self.jobtype
    }

    /// Switch the current job type
    pub fn set_current_jobtype(&mut self, jobtype: &str) -> Result<&str> {
        if !self.doc.has_section(jobtype) {
            return Err(BatchAppsError::InvalidConfig(format!(
                "No configuration for '{}' found. Please add it.",
                jobtype
            )));
        }
        tracing::info!("Setting job type from {} to {}", self.jobtype, jobtype);
        self.jobtype = jobtype.to_string();
        Ok(&self.jobtype)
    }

    /// All job types defined in the configuration
    pub fn list_jobtypes(&self) -> Result<Vec<String>> {
        if !self.doc.has_section(LOGGING) || !self.doc.has_section(AUTHENTICATION) {
            return Err(BatchAppsError::InvalidConfig(
                "Config missing key element".to_string(),
            ));
        }
        Ok(self
            .doc
            .sections()
            .into_iter()
            .filter(|s| s != LOGGING && s != AUTHENTICATION)
            .collect())
    }

    /// Default parameters of the current job type, in file order
    pub fn default_params(&self) -> Vec<(String, String)> {
        self.doc.items(&self.jobtype).unwrap_or_default()
    }

    /// Add a job type section with parameters
    pub fn add_jobtype<I, K, V>(&mut self, jobtype: &str, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        tracing::debug!("Configuring new job type: {}", jobtype);
        self.doc.add_section(jobtype);
        for (key, value) in params {
            self.doc.set(jobtype, key.as_ref(), value);
        }
    }

    /// Set a parameter of the current job type
    pub fn set(&mut self, param: &str, value: impl ToString) -> Result<()> {
        if !self.doc.has_section(&self.jobtype) {
            return Err(BatchAppsError::InvalidConfig(format!(
                "Current job type {} has no valid configuration to set to.",
                self.jobtype
            )));
        }
        let value = value.to_string();
        tracing::debug!("Setting {} parameter {} to {}", self.jobtype, param, value);
        self.doc.set(&self.jobtype, param, value);
        Ok(())
    }

    /// Get a parameter of the current job type
    pub fn get(&self, param: &str) -> Option<String> {
        let value = self.doc.get(&self.jobtype, param).map(str::to_string);
        if value.is_none() {
            tracing::warn!("Couldn't get {} parameter for {}", param, self.jobtype);
        }
        value
    }

    /// Remove a job type or a parameter of the current job type
    pub fn remove(&mut self, setting: &str) -> bool {
        if setting == LOGGING || setting == AUTHENTICATION || setting == self.jobtype {
            tracing::warn!("Cannot remove config for {}", setting);
            return false;
        }
        if self.doc.has_section(setting) {
            tracing::debug!("Removing {} from configuration", setting);
            return self.doc.remove_section(setting);
        }
        if self.doc.has_option(&self.jobtype, setting) {
            tracing::debug!("Removing {} parameter {}", self.jobtype, setting);
            return self.doc.remove_option(&self.jobtype, setting);
        }
        tracing::info!("Configuration has no job type or parameter {}", setting);
        false
    }

    /// Make the current job type the default one and save
    pub fn set_default_jobtype(&mut self) {
        for section in self.doc.sections() {
            self.doc.remove_option(&section, DEPRECATED_DEFAULT_KEY);
            self.doc.remove_option(&section, DEFAULT_JOBTYPE_KEY);
        }
        let jobtype = self.jobtype.clone();
        self.doc.set(&jobtype, DEFAULT_JOBTYPE_KEY, "True");
        if self.write_file {
            self.save_config();
        }
    }

    /// Apply updates to the authentication settings and return them
    ///
    /// With `validate` set, the settings required for the chosen auth
    /// flow must all be present.
    pub fn aad_config(
        &mut self,
        update: AadUpdate,
        unattended: bool,
        validate: bool,
    ) -> Result<BTreeMap<String, String>> {
        if !self.doc.has_section(AUTHENTICATION) {
            return Err(BatchAppsError::InvalidConfig(
                "Config file has no Auth details.".to_string(),
            ));
        }

        let updates = [
            ("unattended_account", update.account),
            ("unattended_key", update.key),
            ("client_id", update.client_id),
            ("tenant", update.tenant),
            ("redirect_uri", update.redirect),
            ("endpoint", update.endpoint),
        ];
        for (key, value) in updates {
            if let Some(value) = value {
                self.doc.set(AUTHENTICATION, key, value);
            }
        }

        if validate {
            self.validate_auth(unattended)
        } else {
            Ok(self.auth_items())
        }
    }

    /// Read-only view of the authentication settings
    pub fn auth_settings(&self, unattended: bool) -> Result<BTreeMap<String, String>> {
        if !self.doc.has_section(AUTHENTICATION) {
            return Err(BatchAppsError::InvalidConfig(
                "Config file has no Auth details.".to_string(),
            ));
        }
        self.validate_auth(unattended)
    }

    fn auth_items(&self) -> BTreeMap<String, String> {
        self.doc
            .items(AUTHENTICATION)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    fn validate_auth(&self, unattended: bool) -> Result<BTreeMap<String, String>> {
        let auth = self.auth_items();

        let mut required = vec!["endpoint", "resource", "root", "auth_uri", "token_uri"];
        if unattended {
            required.extend(["unattended_account", "unattended_key"]);
        } else {
            required.extend(["client_id", "tenant", "redirect_uri"]);
        }

        if let Some(missing) = required
            .iter()
            .find(|key| invalid_value(auth.get(**key).map(String::as_str)))
        {
            return Err(BatchAppsError::InvalidConfig(format!(
                "Authentication configuration incomplete. Missing data for: {}",
                missing
            )));
        }

        Ok(auth)
    }
}

/// Check that a directory (plus data dir) exists and can be written to
///
/// Nothing is logged here since logging is not configured yet.
fn check_directory(base: &Path, datadir: &str) -> bool {
    let dir = base.join(datadir);
    let marker = dir.join("aba_test");

    let result = (|| -> std::io::Result<()> {
        if !dir.is_dir() {
            std::fs::create_dir(&dir)?;
        }
        std::fs::write(&marker, "All good to go!")?;
        std::fs::remove_file(&marker)?;
        Ok(())
    })();

    match result {
        Ok(()) => true,
        Err(e) => {
            eprintln!(
                "\nBatch Apps client is unable to write to directory: {}\nError: {}\n\
                 Batch Apps session will continue without writing any data to disk.\n\
                 Warning: This includes logging.\n\
                 Please reconfigure output directory to enable file logging.\n",
                dir.display(),
                e
            );
            false
        }
    }
}

fn strip_scheme(endpoint: &str) -> &str {
    endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .unwrap_or(endpoint)
}

fn invalid_value(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.is_empty() || v.contains('{'),
    }
}

/// Parse a level name or number into its numeric value
pub fn parse_level(level: &str) -> Option<u8> {
    let lower = level.trim().to_lowercase();
    if let Some((_, value)) = LEVELS.iter().find(|(name, _)| *name == lower) {
        return Some(*value);
    }
    lower
        .parse::<u8>()
        .ok()
        .filter(|v| LEVELS.iter().any(|(_, value)| value == v))
}

/// Display name of a numeric level
pub fn level_name(level: u8) -> &'static str {
    match level {
        10 => "DEBUG",
        20 => "INFO",
        40 => "ERROR",
        50 => "CRITICAL",
        _ => "WARNING",
    }
}

/// Map a numeric level onto a tracing filter directive
pub fn level_filter(level: u8) -> &'static str {
    match level {
        10 => "debug",
        20 => "info",
        40 | 50 => "error",
        _ => "warn",
    }
}
