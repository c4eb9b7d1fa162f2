//! Linux Transport Connectors
//!
//! iSCSI sessions are managed with `iscsiadm` (optionally inside a chroot);
//! FC LUNs appear after a SCSI host rescan. In both cases the attached
//! device is discovered through `/dev/disk/by-path`.

use crate::context::RequestContext;
use crate::domain::ports::{
    ConnectorFactory, Device, FcConnector, FcVolumeInfo, IscsiConnector, IscsiVolumeInfo,
    TransportAdapters,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Location of the initiator name file, relative to the chroot
pub const INITIATOR_NAME_FILE: &str = "etc/iscsi/initiatorname.iscsi";

/// iscsiadm exit status when the session already exists
const ISCSI_ERR_SESS_EXISTS: i32 = 15;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Filesystem roots the connectors inspect
#[derive(Debug, Clone)]
pub struct LinuxPaths {
    pub sysfs: PathBuf,
    pub dev: PathBuf,
    pub device_timeout: Duration,
}

impl Default for LinuxPaths {
    fn default() -> Self {
        Self {
            sysfs: PathBuf::from("/sys"),
            dev: PathBuf::from("/dev"),
            device_timeout: Duration::from_secs(30),
        }
    }
}

/// Parse `InitiatorName=` lines from an initiator name file
pub fn parse_initiator_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.strip_prefix("InitiatorName="))
        .map(|iqn| iqn.trim().to_string())
        .filter(|iqn| !iqn.is_empty())
        .collect()
}

fn transport_error(protocol: &str, reason: impl ToString) -> Error {
    Error::Transport {
        protocol: protocol.to_string(),
        reason: reason.to_string(),
    }
}

/// Kernel device names are plain path components
fn check_device_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(Error::DeviceNotFound {
            device: name.to_string(),
        });
    }
    Ok(())
}

fn glob_paths(pattern: &Path) -> Result<Vec<PathBuf>> {
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern)
        .map_err(|e| Error::Internal(format!("bad glob '{}': {}", pattern, e)))?
        .filter_map(std::result::Result::ok)
        .collect();
    Ok(paths)
}

/// Resolve a by-path link to its device
async fn device_from_link(paths: &LinuxPaths, link: &Path) -> Result<Device> {
    let path = tokio::fs::canonicalize(link).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::DeviceNotFound {
            device: link.display().to_string(),
        })?;
    let wwn = tokio::fs::read_to_string(paths.sysfs.join("block").join(&name).join("device/wwid"))
        .await
        .ok()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty());
    Ok(Device { name, path, wwn })
}

/// Poll until a path matching `pattern` exists
async fn wait_for_device(paths: &LinuxPaths, pattern: &Path) -> Result<Device> {
    let deadline = tokio::time::Instant::now() + paths.device_timeout;
    loop {
        if let Some(link) = glob_paths(pattern)?.into_iter().next() {
            return device_from_link(paths, &link).await;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::DeviceNotFound {
                device: pattern.display().to_string(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Ask the kernel to drop a SCSI device
async fn delete_device(
    paths: &LinuxPaths,
    adapters: &TransportAdapters,
    ctx: &RequestContext,
    name: &str,
) -> Result<()> {
    check_device_name(name)?;
    let delete = paths.sysfs.join("block").join(name).join("device/delete");
    if tokio::fs::metadata(&delete).await.is_err() {
        adapters
            .logger
            .debug(ctx, &format!("device {} already removed", name));
        return Ok(());
    }
    tokio::fs::write(&delete, "1").await?;
    adapters.logger.info(ctx, &format!("device {} deleted", name));
    Ok(())
}

// =============================================================================
// iSCSI
// =============================================================================

pub struct LinuxIscsiConnector {
    chroot: String,
    adapters: TransportAdapters,
    paths: LinuxPaths,
}

impl LinuxIscsiConnector {
    pub fn new(chroot: &str, adapters: TransportAdapters, paths: LinuxPaths) -> Self {
        Self {
            chroot: chroot.to_string(),
            adapters,
            paths,
        }
    }

    fn root(&self) -> PathBuf {
        if self.chroot.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(&self.chroot)
        }
    }

    fn iscsiadm(&self) -> Command {
        if self.chroot.is_empty() {
            Command::new("iscsiadm")
        } else {
            let mut cmd = Command::new("chroot");
            cmd.arg(&self.chroot).arg("iscsiadm");
            cmd
        }
    }

    async fn login(&self, ctx: &RequestContext, target: &str, portal: &str) -> Result<()> {
        self.adapters
            .tracer
            .trace(ctx, &format!("iscsiadm login {} {}", target, portal));
        let output = self
            .iscsiadm()
            .args(["-m", "node", "-T", target, "-p", portal, "--login"])
            .output()
            .await
            .map_err(|e| transport_error("iSCSI", format!("iscsiadm: {}", e)))?;

        match output.status.code() {
            Some(0) | Some(ISCSI_ERR_SESS_EXISTS) => Ok(()),
            _ => Err(transport_error(
                "iSCSI",
                format!(
                    "login to {} via {} failed: {}",
                    target,
                    portal,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )),
        }
    }
}

#[async_trait]
impl IscsiConnector for LinuxIscsiConnector {
    async fn connect_volume(&self, ctx: &RequestContext, info: &IscsiVolumeInfo) -> Result<Device> {
        if info.targets.is_empty() {
            return Err(transport_error("iSCSI", "no targets given"));
        }

        let mut last_error = None;
        for target in &info.targets {
            if let Err(e) = self.login(ctx, &target.target, &target.portal).await {
                self.adapters.logger.error(ctx, &e.to_string());
                last_error = Some(e);
                continue;
            }
            let pattern = self.paths.dev.join(format!(
                "disk/by-path/ip-{}-iscsi-{}-lun-{}",
                target.portal, target.target, info.lun
            ));
            match wait_for_device(&self.paths, &pattern).await {
                Ok(device) => {
                    self.adapters
                        .logger
                        .info(ctx, &format!("iSCSI device {} attached", device.name));
                    return Ok(device);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| transport_error("iSCSI", "no usable target")))
    }

    async fn disconnect_volume_by_device_name(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        delete_device(&self.paths, &self.adapters, ctx, name).await
    }

    async fn initiator_names(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let file = self.root().join(INITIATOR_NAME_FILE);
        let content = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| transport_error("iSCSI", format!("{}: {}", file.display(), e)))?;
        let names = parse_initiator_names(&content);
        self.adapters
            .logger
            .debug(ctx, &format!("iSCSI initiators: {:?}", names));
        Ok(names)
    }
}

// =============================================================================
// Fibre Channel
// =============================================================================

pub struct LinuxFcConnector {
    adapters: TransportAdapters,
    paths: LinuxPaths,
}

impl LinuxFcConnector {
    pub fn new(adapters: TransportAdapters, paths: LinuxPaths) -> Self {
        Self { adapters, paths }
    }

    async fn rescan(&self, ctx: &RequestContext) -> Result<()> {
        for scan in glob_paths(&self.paths.sysfs.join("class/scsi_host/host*/scan"))? {
            if let Err(e) = tokio::fs::write(&scan, "- - -").await {
                self.adapters
                    .logger
                    .error(ctx, &format!("rescan {}: {}", scan.display(), e));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FcConnector for LinuxFcConnector {
    async fn connect_volume(&self, ctx: &RequestContext, info: &FcVolumeInfo) -> Result<Device> {
        if info.target_wwpns.is_empty() {
            return Err(transport_error("FC", "no target ports given"));
        }
        self.rescan(ctx).await?;

        let deadline = tokio::time::Instant::now() + self.paths.device_timeout;
        loop {
            for wwpn in &info.target_wwpns {
                let pattern = self.paths.dev.join(format!(
                    "disk/by-path/*-fc-0x{}-lun-{}",
                    wwpn.trim_start_matches("0x").to_lowercase(),
                    info.lun
                ));
                if let Some(link) = glob_paths(&pattern)?.into_iter().next() {
                    let device = device_from_link(&self.paths, &link).await?;
                    self.adapters
                        .logger
                        .info(ctx, &format!("FC device {} attached", device.name));
                    return Ok(device);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::DeviceNotFound {
                    device: format!("fc lun {}", info.lun),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn disconnect_volume_by_device_name(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        delete_device(&self.paths, &self.adapters, ctx, name).await
    }

    async fn initiator_ports(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let mut ports = Vec::new();
        for file in glob_paths(&self.paths.sysfs.join("class/fc_host/host*/port_name"))? {
            let raw = tokio::fs::read_to_string(&file).await?;
            let port = raw.trim().trim_start_matches("0x").to_lowercase();
            if !port.is_empty() {
                ports.push(port);
            }
        }
        self.adapters
            .logger
            .debug(ctx, &format!("FC initiator ports: {:?}", ports));
        Ok(ports)
    }
}

/// Builds the Linux connectors
#[derive(Debug, Default, Clone)]
pub struct LinuxConnectorFactory {
    paths: LinuxPaths,
}

impl LinuxConnectorFactory {
    pub fn new(paths: LinuxPaths) -> Self {
        Self { paths }
    }
}

impl ConnectorFactory for LinuxConnectorFactory {
    fn iscsi(&self, chroot: &str, adapters: TransportAdapters) -> Arc<dyn IscsiConnector> {
        Arc::new(LinuxIscsiConnector::new(chroot, adapters, self.paths.clone()))
    }

    fn fc(&self, _chroot: &str, adapters: TransportAdapters) -> Arc<dyn FcConnector> {
        Arc::new(LinuxFcConnector::new(adapters, self.paths.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::adapters::tracing_adapters;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn paths(root: &Path) -> LinuxPaths {
        LinuxPaths {
            sysfs: root.join("sys"),
            dev: root.join("dev"),
            device_timeout: Duration::from_millis(200),
        }
    }

    fn block_device(root: &Path, name: &str) {
        let dir = root.join("sys/block").join(name).join("device");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("delete"), "").unwrap();
        std::fs::write(dir.join("wwid"), "naa.600601601234\n").unwrap();
        std::fs::create_dir_all(root.join("dev")).unwrap();
        std::fs::write(root.join("dev").join(name), "").unwrap();
    }

    #[test]
    fn test_parse_initiator_names() {
        let content = "## DO NOT EDIT\n#InitiatorName=iqn.old\nInitiatorName=iqn.1993-08.org.debian:01:abc\n\n";
        assert_eq!(parse_initiator_names(content), vec!["iqn.1993-08.org.debian:01:abc"]);
        assert!(parse_initiator_names("").is_empty());
    }

    #[tokio::test]
    async fn test_initiator_names_read_from_chroot() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join(INITIATOR_NAME_FILE);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "InitiatorName=iqn.2004-10.com.example:node1\n").unwrap();

        let connector = LinuxIscsiConnector::new(
            tmp.path().to_str().unwrap(),
            tracing_adapters(),
            paths(tmp.path()),
        );
        let names = connector.initiator_names(&RequestContext::new()).await.unwrap();
        assert_eq!(names, vec!["iqn.2004-10.com.example:node1"]);
    }

    #[tokio::test]
    async fn test_disconnect_writes_delete() {
        let tmp = TempDir::new().unwrap();
        block_device(tmp.path(), "sdc");
        let connector = LinuxIscsiConnector::new("", tracing_adapters(), paths(tmp.path()));

        connector
            .disconnect_volume_by_device_name(&RequestContext::new(), "sdc")
            .await
            .unwrap();
        let written = std::fs::read_to_string(tmp.path().join("sys/block/sdc/device/delete")).unwrap();
        assert_eq!(written, "1");

        // Already gone
        connector
            .disconnect_volume_by_device_name(&RequestContext::new(), "sdz")
            .await
            .unwrap();

        assert_matches!(
            connector
                .disconnect_volume_by_device_name(&RequestContext::new(), "../sdc")
                .await,
            Err(Error::DeviceNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_fc_initiator_ports() {
        let tmp = TempDir::new().unwrap();
        for (host, wwpn) in [("host0", "0x10000090FA1B2C3D\n"), ("host1", "0x10000090fa1b2c3e\n")] {
            let dir = tmp.path().join("sys/class/fc_host").join(host);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("port_name"), wwpn).unwrap();
        }

        let connector = LinuxFcConnector::new(tracing_adapters(), paths(tmp.path()));
        let mut ports = connector.initiator_ports(&RequestContext::new()).await.unwrap();
        ports.sort();
        assert_eq!(ports, vec!["10000090fa1b2c3d", "10000090fa1b2c3e"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fc_connect_finds_device() {
        let tmp = TempDir::new().unwrap();
        block_device(tmp.path(), "sdd");
        let scan_dir = tmp.path().join("sys/class/scsi_host/host0");
        std::fs::create_dir_all(&scan_dir).unwrap();
        std::fs::write(scan_dir.join("scan"), "").unwrap();

        let by_path = tmp.path().join("dev/disk/by-path");
        std::fs::create_dir_all(&by_path).unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("dev/sdd"),
            by_path.join("pci-0000:3b:00.0-fc-0x500601693ee0132d-lun-4"),
        )
        .unwrap();

        let connector = LinuxFcConnector::new(tracing_adapters(), paths(tmp.path()));
        let device = connector
            .connect_volume(
                &RequestContext::new(),
                &FcVolumeInfo {
                    target_wwpns: vec!["500601693EE0132D".into()],
                    lun: 4,
                },
            )
            .await
            .unwrap();

        assert_eq!(device.name, "sdd");
        assert_eq!(device.wwn.as_deref(), Some("naa.600601601234"));
        assert_eq!(std::fs::read_to_string(scan_dir.join("scan")).unwrap(), "- - -");
    }

    #[tokio::test]
    async fn test_fc_connect_times_out() {
        let tmp = TempDir::new().unwrap();
        let connector = LinuxFcConnector::new(tracing_adapters(), paths(tmp.path()));
        let result = connector
            .connect_volume(
                &RequestContext::new(),
                &FcVolumeInfo {
                    target_wwpns: vec!["500601693ee0132d".into()],
                    lun: 1,
                },
            )
            .await;
        assert_matches!(result, Err(Error::DeviceNotFound { .. }));
    }
}
