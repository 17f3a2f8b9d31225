//! Host network link client
//!
//! Watches one interface (or the default route) through the kernel's view of
//! the network. The OS owns association; repairing the link means running the
//! configured reconnect command, e.g. `nmcli device connect wlan0`.

use super::{LinkClient, LinkError};
use crate::config::LinkSection;
use crate::protocol::MacAddress;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Documentation-range address used only to ask the kernel for a route; nothing is sent
const ROUTE_PROBE: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9);

const SYS_CLASS_NET: &str = "/sys/class/net";

pub struct HostLink {
    interface: Option<String>,
    reconnect_command: Vec<String>,
    sysfs_root: PathBuf,
}

impl HostLink {
    pub fn new(config: &LinkSection) -> Self {
        Self {
            interface: config.interface.clone(),
            reconnect_command: config.reconnect_command.clone(),
            sysfs_root: PathBuf::from(SYS_CLASS_NET),
        }
    }

    /// Read interface attributes from another root (tests)
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    fn read_attribute(&self, interface: &str, attribute: &str) -> std::io::Result<String> {
        let path = self.sysfs_root.join(interface).join(attribute);
        Ok(std::fs::read_to_string(path)?.trim().to_string())
    }

    /// First non-loopback interface, used for the hardware address when none is configured
    fn fallback_interface(&self) -> Option<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.sysfs_root)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();
        names.into_iter().next()
    }

    async fn run_reconnect_command(&self) -> Result<(), LinkError> {
        let Some((program, args)) = self.reconnect_command.split_first() else {
            debug!("No link reconnect command configured, relying on the OS");
            return Ok(());
        };

        let status = tokio::process::Command::new(program)
            .args(args)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkError::ReconnectFailed(format!(
                "{program} exited with {status}"
            )))
        }
    }
}

#[async_trait::async_trait]
impl LinkClient for HostLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        info!(interface = ?self.interface, "Reconnecting link");
        self.run_reconnect_command().await
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        // The reconnect command is expected to reset the association itself
        debug!(interface = ?self.interface, "Link disconnect requested");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        match &self.interface {
            Some(interface) => match self.read_attribute(interface, "operstate") {
                Ok(state) => state == "up" || state == "unknown",
                Err(e) => {
                    warn!("Cannot read operstate of {}: {}", interface, e);
                    false
                }
            },
            None => self.local_address().is_some(),
        }
    }

    fn local_address(&self) -> Option<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect(ROUTE_PROBE).ok()?;
        let address = socket.local_addr().ok()?.ip();
        (!address.is_unspecified()).then_some(address)
    }

    fn hardware_address(&self) -> Result<MacAddress, LinkError> {
        let interface = self
            .interface
            .clone()
            .or_else(|| self.fallback_interface())
            .ok_or_else(|| {
                LinkError::HardwareAddressUnavailable("no network interface found".to_string())
            })?;
        let text = self.read_attribute(&interface, "address")?;
        MacAddress::parse(&text).ok_or_else(|| {
            LinkError::HardwareAddressUnavailable(format!("{interface}: unparsable '{text}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_sysfs(interface: &str, operstate: &str, address: &str) -> TempDir {
        let root = TempDir::new().unwrap();
        let dir = root.path().join(interface);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("operstate"), format!("{operstate}\n")).unwrap();
        fs::write(dir.join("address"), format!("{address}\n")).unwrap();
        root
    }

    fn link_for(interface: Option<&str>, root: &TempDir) -> HostLink {
        let config = LinkSection {
            interface: interface.map(str::to_string),
            ..Default::default()
        };
        HostLink::new(&config).with_sysfs_root(root.path())
    }

    #[test]
    fn test_operstate_up_is_connected() {
        let root = fake_sysfs("wlan0", "up", "24:0a:c4:1a:2b:3c");
        assert!(link_for(Some("wlan0"), &root).is_connected());
    }

    #[test]
    fn test_operstate_down_is_disconnected() {
        let root = fake_sysfs("wlan0", "down", "24:0a:c4:1a:2b:3c");
        assert!(!link_for(Some("wlan0"), &root).is_connected());
    }

    #[test]
    fn test_missing_interface_is_disconnected() {
        let root = fake_sysfs("wlan0", "up", "24:0a:c4:1a:2b:3c");
        assert!(!link_for(Some("eth7"), &root).is_connected());
    }

    #[test]
    fn test_hardware_address_from_configured_interface() {
        let root = fake_sysfs("wlan0", "up", "24:0a:c4:1a:2b:3c");
        let mac = link_for(Some("wlan0"), &root).hardware_address().unwrap();
        assert_eq!(mac.0, [0x24, 0x0a, 0xc4, 0x1a, 0x2b, 0x3c]);
    }

    #[test]
    fn test_hardware_address_falls_back_to_first_interface() {
        let root = fake_sysfs("eth0", "up", "02:00:00:00:00:01");
        fs::create_dir_all(root.path().join("lo")).unwrap();
        let mac = link_for(None, &root).hardware_address().unwrap();
        assert_eq!(mac.0[5], 0x01);
    }

    #[test]
    fn test_unparsable_hardware_address() {
        let root = fake_sysfs("wlan0", "up", "garbage");
        let result = link_for(Some("wlan0"), &root).hardware_address();
        assert!(matches!(
            result,
            Err(LinkError::HardwareAddressUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_without_command_is_noop() {
        let root = fake_sysfs("wlan0", "up", "24:0a:c4:1a:2b:3c");
        let mut link = link_for(Some("wlan0"), &root);
        assert!(link.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_reconnect_command_is_reported() {
        let root = fake_sysfs("wlan0", "up", "24:0a:c4:1a:2b:3c");
        let config = LinkSection {
            interface: Some("wlan0".to_string()),
            reconnect_command: vec!["false".to_string()],
            ..Default::default()
        };
        let mut link = HostLink::new(&config).with_sysfs_root(root.path());
        assert!(matches!(
            link.connect().await,
            Err(LinkError::ReconnectFailed(_))
        ));
    }
}
