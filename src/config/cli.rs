// Command line interface
// Global options may also come from BATCHAPPS_* environment variables or a .env file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::ConfigOptions;

/// Batch Apps command line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Directory in which the BatchAppsData directory is kept (default: home)
    #[arg(short = 'd', long, env = "BATCHAPPS_DATA_PATH", global = true)]
    pub data_path: Option<String>,

    /// Log level (debug, info, warning, error, critical or 10-50)
    #[arg(short = 'l', long, env = "BATCHAPPS_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Job type to use instead of the configured default
    #[arg(short = 'j', long, env = "BATCHAPPS_JOBTYPE", global = true)]
    pub jobtype: Option<String>,

    /// Use the unattended (client credentials) session
    #[arg(short = 'u', long, env = "BATCHAPPS_UNATTENDED", global = true)]
    pub unattended: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    /// Options for loading the configuration file
    pub fn config_options(&self) -> ConfigOptions {
        ConfigOptions {
            data_path: self.data_path.as_deref().map(expand_tilde),
            log_level: self.log_level.clone(),
            jobtype: self.jobtype.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authenticate and cache a token
    Login {
        /// Use the client credentials flow
        #[arg(long)]
        unattended: bool,
        /// Hint that a Microsoft account is used
        #[arg(long)]
        msa: bool,
        /// Always show the login prompt
        #[arg(long)]
        prompt: bool,
    },
    /// Remove the cached token
    Logout,
    /// Inspect or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Manage user files
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
    /// Manage pools
    Pools {
        #[command(subcommand)]
        action: PoolsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the current settings
    Show,
    /// Change the service endpoint
    SetEndpoint { endpoint: String },
    /// Change the current job type
    SetJobtype {
        jobtype: String,
        /// Make it the default job type
        #[arg(long)]
        default: bool,
    },
    /// Set a parameter of the current job type
    Set { param: String, value: String },
    /// Remove a job type or a parameter of the current job type
    Remove { setting: String },
    /// Interactive authentication setup
    Setup,
    /// Delete the config file and restore defaults
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum JobsAction {
    /// List submitted jobs
    List {
        #[arg(long, default_value = "0")]
        index: u32,
        #[arg(long, default_value = "10")]
        per_call: u32,
        /// Only jobs whose name contains this string
        #[arg(long)]
        name: Option<String>,
    },
    /// Show one job
    Show { id: String },
    /// Submit a new job
    Submit {
        name: String,
        /// Required input files
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
        /// Add every file in a directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Name of the file the job starts from
        #[arg(long)]
        job_file: Option<String>,
        /// Job parameter as key=value
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Number of instances for the auto pool
        #[arg(long)]
        instances: Option<u32>,
        /// Run on an existing pool
        #[arg(long)]
        pool: Option<String>,
        /// Concurrent uploads
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Cancel a job
    Cancel { id: String },
    /// Reprocess failed tasks of a job
    Reprocess { id: String },
    /// Print job logs
    Logs {
        id: String,
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value = "100")]
        max_lines: u32,
    },
    /// List job outputs
    Outputs { id: String },
    /// Download the final job output
    Download {
        id: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Download the job preview image
    Thumbnail {
        id: String,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        filename: Option<String>,
    },
    /// List the tasks of a job
    Tasks { id: String },
    /// Poll a job until it stops
    Watch {
        id: String,
        #[arg(long, default_value = "10")]
        interval: u64,
        #[arg(long, default_value = "3600")]
        timeout: u64,
        /// Download completed task outputs here
        #[arg(long)]
        download: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FilesAction {
    /// List files in the cloud
    List,
    /// Look up cloud files by name
    Find { names: Vec<String> },
    /// Upload local files
    Upload {
        paths: Vec<PathBuf>,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        recursive: bool,
        #[arg(long, default_value = "*")]
        pattern: String,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        threads: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PoolsAction {
    /// List pools
    List,
    /// Show one pool
    Show { id: String },
    /// Create a pool
    Create {
        #[arg(long, default_value = "1")]
        target: u32,
        #[arg(long, default_value = "1")]
        max_tasks: u32,
        #[arg(long)]
        communication: bool,
    },
    /// Change the target size of a pool
    Resize { id: String, target: u32 },
    /// Delete a pool
    Delete { id: String },
    /// Delete every pool
    Clear,
}

/// Parse a `key=value` job parameter
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
