//! Host facts for the heartbeat payload

use std::net::UdpSocket;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

const GIB: u64 = 1024 * 1024 * 1024;

/// Point-in-time host facts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostFacts {
    pub hostname: String,

    /// Primary outbound IPv4/IPv6 address, empty when unknown
    pub ip_address: String,

    /// User the agent observes as logged in, best effort
    pub os_user: String,

    /// Free space on the system volume, whole GiB
    pub disk_free_gb: u64,

    /// CPU usage percentage (0-100)
    pub cpu_usage: f32,

    /// Memory usage percentage (0-100)
    pub ram_usage: f32,
}

/// Samples host facts. CPU usage is a delta, so keep one probe alive
/// across samples.
pub struct HostProbe {
    system: System,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system }
    }

    pub fn sample(&mut self) -> HostFacts {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let memory_total = self.system.total_memory();
        let ram_usage = if memory_total > 0 {
            (self.system.used_memory() as f32 / memory_total as f32) * 100.0
        } else {
            0.0
        };

        HostFacts {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            ip_address: outbound_ip().unwrap_or_default(),
            os_user: current_user(),
            disk_free_gb: system_disk_free() / GIB,
            cpu_usage: self.system.global_cpu_usage(),
            ram_usage,
        }
    }
}

// connect() on UDP only selects a route, nothing is sent
fn outbound_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

fn system_disk_free() -> u64 {
    let disks = Disks::new_with_refreshed_list();

    let system_root = std::env::var("SystemDrive")
        .map(|drive| format!("{}\\", drive))
        .unwrap_or_else(|_| "/".to_string());

    disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new(&system_root))
        .or_else(|| disks.iter().max_by_key(|disk| disk.total_space()))
        .map(|disk| disk.available_space())
        .unwrap_or(0)
}
