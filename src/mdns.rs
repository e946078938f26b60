//! mDNS service advertisement.
//!
//! Publishes `_esphomelib._tcp.local.` so a Home Assistant instance on
//! the same network discovers the satellite without configuration. The
//! TXT record carries the metadata the controller reads to identify an
//! ESPHome device. Registration failure is not fatal: the device can
//! still be added by address.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use anyhow::{anyhow, Context};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

use crate::state::ServerState;

pub const SERVICE_TYPE: &str = "_esphomelib._tcp.local.";

/// Registered advertisement; unregister before process exit.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsAdvertiser {
    /// Register the satellite on the local network.
    pub fn register(state: &ServerState, port: u16) -> anyhow::Result<Self> {
        let daemon = ServiceDaemon::new().context("failed to start mDNS daemon")?;

        let ip = first_routable_ipv4().ok_or_else(|| anyhow!("no routable IPv4 interface"))?;
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .map(|h| h.split('.').next().unwrap_or(&h).to_string())
            .unwrap_or_else(|| state.device_name.clone());

        let version = env!("CARGO_PKG_VERSION");
        let mut txt = HashMap::new();
        txt.insert("version".to_string(), version.to_string());
        txt.insert("platform".to_string(), std::env::consts::OS.to_string());
        txt.insert("board".to_string(), std::env::consts::ARCH.to_string());
        txt.insert("mac".to_string(), state.mac_address.clone());
        txt.insert("friendly_name".to_string(), state.device_name.clone());
        txt.insert("package_import".to_string(), "false".to_string());
        txt.insert(
            "project_name".to_string(),
            "voice_satellite.desktop".to_string(),
        );
        txt.insert("project_version".to_string(), version.to_string());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &state.device_name,
            &format!("{host}.local."),
            IpAddr::V4(ip),
            port,
            txt,
        )
        .context("invalid mDNS service info")?;
        let fullname = service.get_fullname().to_string();

        daemon
            .register(service)
            .context("failed to register mDNS service")?;
        info!(
            name = %state.device_name,
            %ip,
            port,
            mac = %state.mac_address,
            "mDNS service registered",
        );

        Ok(Self { daemon, fullname })
    }

    /// Unregister and shut the daemon down, blocking briefly for the
    /// goodbye packets to go out.
    pub fn unregister(self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(rx) => {
                if rx.recv_timeout(Duration::from_secs(2)).is_err() {
                    warn!("mDNS unregister did not confirm in time");
                }
            }
            Err(e) => warn!("mDNS unregister failed: {e}"),
        }
        let _ = self.daemon.shutdown();
        info!("mDNS service unregistered");
    }
}

/// First non-loopback IPv4 address of the host.
fn first_routable_ipv4() -> Option<Ipv4Addr> {
    if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some(v4.ip),
            _ => None,
        })
}
