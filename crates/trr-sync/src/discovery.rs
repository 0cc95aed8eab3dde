//! Best-effort LAN discovery via mDNS (spec.md §4.6 "Discovery"). Advertises
//! `_trrcms-sync._tcp` with `{api_version, hostname}` TXT records. Failure to
//! register (no multicast route, sandboxed network namespace, etc.) is
//! tolerated: the service simply falls back to the admin-visible IP list.

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

pub const SERVICE_TYPE: &str = "_trrcms-sync._tcp.local.";

/// Holds the daemon handle so the service is unregistered on drop.
pub struct Discovery {
    daemon: Option<ServiceDaemon>,
    fullname: String,
}

impl Discovery {
    /// Attempts to register `_trrcms-sync._tcp` for the given port. Never
    /// returns an error; a failed registration logs a warning and leaves
    /// `Discovery` inert.
    pub fn register(port: u16, api_version: &str) -> Self {
        let hostname = hostname();
        let fullname = format!("{hostname}.{SERVICE_TYPE}");

        let daemon = match ServiceDaemon::new() {
            Ok(d) => d,
            Err(e) => {
                warn!("mDNS unavailable, skipping discovery registration: {e}");
                return Self { daemon: None, fullname };
            }
        };

        let properties = [("api_version", api_version), ("hostname", hostname.as_str())];
        let service_info = match ServiceInfo::new(
            SERVICE_TYPE,
            &hostname,
            &format!("{hostname}.local."),
            "",
            port,
            &properties[..],
        ) {
            Ok(info) => info.enable_addr_auto(),
            Err(e) => {
                warn!("failed to build mDNS service info: {e}");
                return Self { daemon: Some(daemon), fullname };
            }
        };

        match daemon.register(service_info) {
            Ok(()) => info!("registered mDNS service {fullname} on port {port}"),
            Err(e) => warn!("mDNS registration failed, falling back to manual IP config: {e}"),
        }

        Self { daemon: Some(daemon), fullname }
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        if let Some(daemon) = &self.daemon {
            let _ = daemon.unregister(&self.fullname);
        }
    }
}

fn hostname() -> String {
    hostname_fallback().unwrap_or_else(|| "trrcms-host".to_string())
}

#[cfg(unix)]
fn hostname_fallback() -> Option<String> {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(unix))]
fn hostname_fallback() -> Option<String> {
    None
}
