//! Driver Options
//!
//! Knobs the driver reads from its environment. Boolean knobs are parsed
//! leniently and the node-info resync interval falls back to its default on
//! bad input, so a typo in a deployment never keeps the driver from starting.

use crate::error::{Error, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default node-info resync interval in seconds
pub const DEFAULT_SYNC_NODE_INFO_INTERVAL_SECS: u64 = 15;

/// Default credentials file location
pub const DEFAULT_DRIVER_CONFIG: &str = "/driver-config/config.json";

// =============================================================================
// Raw Arguments
// =============================================================================

/// Driver knobs as they arrive from the command line or environment
#[derive(Args, Debug, Clone, Default)]
pub struct DriverArgs {
    /// Path of the mounted credentials file
    #[arg(long, env = "X_CSI_DRIVER_CONFIG", default_value = DEFAULT_DRIVER_CONFIG)]
    pub driver_config: PathBuf,

    /// Operating mode: controller, node, or empty for both
    #[arg(long, env = "X_CSI_MODE")]
    pub mode: Option<String>,

    /// Kubernetes node name
    #[arg(long, env = "X_CSI_NODENAME")]
    pub node_name: Option<String>,

    /// Probe arrays automatically on first use
    #[arg(long, env = "X_CSI_AUTO_PROBE")]
    pub auto_probe: Option<String>,

    /// Verbose driver logging
    #[arg(long, env = "X_CSI_DEBUG")]
    pub debug: Option<String>,

    /// Private mount directory used to unstage volumes from older releases
    #[arg(long, env = "X_CSI_PRIVATE_MOUNT_DIR")]
    pub private_mount_dir: Option<PathBuf>,

    /// Override for the ephemeral volume staging path
    #[arg(long, env = "X_CSI_EPHEMERAL_STAGING_PATH")]
    pub ephemeral_staging_path: Option<PathBuf>,

    /// Chroot for iSCSI administration
    #[arg(long, env = "X_CSI_ISCSI_CHROOT")]
    pub iscsi_chroot: Option<String>,

    /// Node-info resync interval in seconds
    #[arg(long, env = "X_CSI_SYNC_NODE_INFO_INTERVAL")]
    pub sync_node_info_interval: Option<String>,
}

// =============================================================================
// Driver Mode
// =============================================================================

/// Which services this driver instance runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Controller,
    Node,
    /// Both controller and node services
    All,
}

impl std::fmt::Display for DriverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverMode::Controller => write!(f, "controller"),
            DriverMode::Node => write!(f, "node"),
            DriverMode::All => write!(f, ""),
        }
    }
}

impl std::str::FromStr for DriverMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "controller" => Ok(DriverMode::Controller),
            "node" => Ok(DriverMode::Node),
            "" => Ok(DriverMode::All),
            other => Err(Error::Configuration(format!("invalid driver mode '{}'", other))),
        }
    }
}

// =============================================================================
// Driver Options
// =============================================================================

/// Normalized driver configuration
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub driver_config: PathBuf,
    pub mode: DriverMode,
    /// First DNS label of the node name
    pub node_name: String,
    /// Node name as configured
    pub long_node_name: String,
    pub auto_probe: bool,
    pub debug: bool,
    pub private_mount_dir: Option<PathBuf>,
    pub ephemeral_staging_path: Option<PathBuf>,
    pub chroot: String,
    pub sync_node_info_interval: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            driver_config: PathBuf::from(DEFAULT_DRIVER_CONFIG),
            mode: DriverMode::All,
            node_name: String::new(),
            long_node_name: String::new(),
            auto_probe: false,
            debug: false,
            private_mount_dir: None,
            ephemeral_staging_path: None,
            chroot: String::new(),
            sync_node_info_interval: Duration::from_secs(DEFAULT_SYNC_NODE_INFO_INTERVAL_SECS),
        }
    }
}

impl DriverOptions {
    /// Normalize raw arguments; only an unknown mode is rejected
    pub fn from_args(args: DriverArgs) -> Result<Self> {
        let mode = args.mode.as_deref().unwrap_or("").parse()?;

        let long_node_name = args.node_name.unwrap_or_default();
        let node_name = long_node_name
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            driver_config: args.driver_config,
            mode,
            node_name,
            long_node_name,
            auto_probe: parse_bool("X_CSI_AUTO_PROBE", args.auto_probe.as_deref()),
            debug: parse_bool("X_CSI_DEBUG", args.debug.as_deref()),
            private_mount_dir: args.private_mount_dir,
            ephemeral_staging_path: args.ephemeral_staging_path,
            chroot: args.iscsi_chroot.unwrap_or_default(),
            sync_node_info_interval: parse_interval(args.sync_node_info_interval.as_deref()),
        })
    }

    /// Whether this instance runs only the node services
    pub fn is_node_mode(&self) -> bool {
        self.mode == DriverMode::Node
    }
}

/// Parse a boolean knob; anything unparseable is false
fn parse_bool(name: &str, raw: Option<&str>) -> bool {
    let Some(raw) = raw else {
        return false;
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => true,
        "0" | "f" | "false" | "no" | "off" => false,
        _ => {
            debug!(knob = name, value = raw, "invalid boolean value, defaulting to false");
            false
        }
    }
}

/// Parse the resync interval in seconds, falling back to the default
fn parse_interval(raw: Option<&str>) -> Duration {
    let secs = match raw.map(|r| r.trim().parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => secs,
        Some(_) => {
            debug!(
                value = raw.unwrap_or_default(),
                "invalid node-info resync interval, using default"
            );
            DEFAULT_SYNC_NODE_INFO_INTERVAL_SECS
        }
        None => DEFAULT_SYNC_NODE_INFO_INTERVAL_SECS,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        driver: DriverArgs,
    }

    #[test]
    fn test_defaults() {
        let options = DriverOptions::from_args(DriverArgs::default()).unwrap();
        assert_eq!(options.mode, DriverMode::All);
        assert!(!options.auto_probe);
        assert!(!options.debug);
        assert_eq!(options.sync_node_info_interval, Duration::from_secs(15));
        assert!(!options.is_node_mode());
    }

    #[test]
    fn test_node_name_split() {
        let args = DriverArgs {
            node_name: Some("worker-1.cluster.local".into()),
            ..Default::default()
        };
        let options = DriverOptions::from_args(args).unwrap();
        assert_eq!(options.node_name, "worker-1");
        assert_eq!(options.long_node_name, "worker-1.cluster.local");
    }

    #[test]
    fn test_lenient_booleans() {
        assert!(parse_bool("x", Some("true")));
        assert!(parse_bool("x", Some("TRUE")));
        assert!(parse_bool("x", Some("1")));
        assert!(!parse_bool("x", Some("0")));
        assert!(!parse_bool("x", Some("maybe")));
        assert!(!parse_bool("x", None));
    }

    #[test]
    fn test_interval_falls_back_on_bad_input() {
        assert_eq!(parse_interval(Some("30")), Duration::from_secs(30));
        assert_eq!(parse_interval(Some("abc")), Duration::from_secs(15));
        assert_eq!(parse_interval(Some("0")), Duration::from_secs(15));
        assert_eq!(parse_interval(Some("-5")), Duration::from_secs(15));
        assert_eq!(parse_interval(None), Duration::from_secs(15));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("node".parse::<DriverMode>().unwrap(), DriverMode::Node);
        assert_eq!("Controller".parse::<DriverMode>().unwrap(), DriverMode::Controller);
        assert_eq!("".parse::<DriverMode>().unwrap(), DriverMode::All);
        assert!("sidecar".parse::<DriverMode>().is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = TestCli::parse_from([
            "test",
            "--mode",
            "node",
            "--auto-probe",
            "true",
            "--sync-node-info-interval",
            "oops",
            "--iscsi-chroot",
            "/noderoot",
        ]);
        let options = DriverOptions::from_args(cli.driver).unwrap();
        assert!(options.is_node_mode());
        assert!(options.auto_probe);
        assert_eq!(options.chroot, "/noderoot");
        assert_eq!(options.sync_node_info_interval, Duration::from_secs(15));
    }
}
