//! Default entity wiring for a desktop host.
//!
//! Sensor readings come from `sysinfo`; buttons and services dispatch to
//! the platform command layer, which is a collaborator — the default
//! handlers here record the request and leave execution to whatever the
//! deployment wires in.

use std::sync::{Arc, Mutex};

use sysinfo::{Disks, System};
use tracing::info;

use super::buttons::ButtonEntity;
use super::sensors::SensorEntity;
use super::services::{ServiceArg, ServiceEntity};
use super::EntityHandlers;
use crate::protocol::messages::ServiceArgType;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Build the default entity set: system sensors, power buttons, and the
/// notification/utility services.
pub fn default_handlers() -> EntityHandlers {
    EntityHandlers {
        sensors: system_sensors(),
        buttons: system_buttons(),
        services: system_services(),
    }
}

fn system_sensors() -> Vec<SensorEntity> {
    let system = Arc::new(Mutex::new(System::new()));
    let disks = Arc::new(Mutex::new(Disks::new_with_refreshed_list()));

    let cpu = Arc::clone(&system);
    let mem_pct = Arc::clone(&system);
    let mem_used = Arc::clone(&system);
    let mem_total = Arc::clone(&system);
    let disk_pct = Arc::clone(&disks);
    let disk_used = Arc::clone(&disks);
    let disk_total = Arc::clone(&disks);

    vec![
        SensorEntity::new(0, "cpu_percent", "CPU Usage", "%", 1)
            .with_icon("mdi:cpu-64-bit")
            .with_read(move || {
                let mut sys = cpu.lock().unwrap();
                sys.refresh_cpu_usage();
                Some(sys.global_cpu_usage())
            }),
        SensorEntity::new(1, "memory_percent", "Memory Usage", "%", 1)
            .with_icon("mdi:memory")
            .with_read(move || {
                let mut sys = mem_pct.lock().unwrap();
                sys.refresh_memory();
                let total = sys.total_memory();
                if total == 0 {
                    return None;
                }
                Some((sys.used_memory() as f64 / total as f64 * 100.0) as f32)
            }),
        SensorEntity::new(2, "memory_used_gb", "Memory Used", "GB", 2)
            .with_icon("mdi:memory")
            .with_read(move || {
                let mut sys = mem_used.lock().unwrap();
                sys.refresh_memory();
                Some((sys.used_memory() as f64 / BYTES_PER_GB) as f32)
            }),
        SensorEntity::new(3, "memory_total_gb", "Memory Total", "GB", 2)
            .with_icon("mdi:memory")
            .with_read(move || {
                let mut sys = mem_total.lock().unwrap();
                sys.refresh_memory();
                Some((sys.total_memory() as f64 / BYTES_PER_GB) as f32)
            }),
        SensorEntity::new(4, "disk_percent", "Disk Usage", "%", 1)
            .with_icon("mdi:harddisk")
            .with_read(move || {
                let mut disks = disk_pct.lock().unwrap();
                disks.refresh(true);
                let disk = disks.list().first()?;
                let total = disk.total_space();
                if total == 0 {
                    return None;
                }
                let used = total - disk.available_space();
                Some((used as f64 / total as f64 * 100.0) as f32)
            }),
        SensorEntity::new(5, "disk_used_gb", "Disk Used", "GB", 1)
            .with_icon("mdi:harddisk")
            .with_read(move || {
                let mut disks = disk_used.lock().unwrap();
                disks.refresh(true);
                let disk = disks.list().first()?;
                Some(((disk.total_space() - disk.available_space()) as f64 / BYTES_PER_GB) as f32)
            }),
        SensorEntity::new(6, "disk_total_gb", "Disk Total", "GB", 1)
            .with_icon("mdi:harddisk")
            .with_read(move || {
                let mut disks = disk_total.lock().unwrap();
                disks.refresh(true);
                let disk = disks.list().first()?;
                Some((disk.total_space() as f64 / BYTES_PER_GB) as f32)
            }),
    ]
}

fn system_buttons() -> Vec<ButtonEntity> {
    let button = |key, object_id: &'static str, name: &str, icon: &str| {
        ButtonEntity::new(key, object_id, name, icon, move || {
            info!(command = object_id, "system command requested (no executor wired)");
        })
    };
    vec![
        button(100, "shutdown", "Shut Down", "mdi:power"),
        button(101, "restart", "Restart", "mdi:restart"),
        button(102, "sleep", "Sleep", "mdi:sleep"),
        button(104, "lock", "Lock", "mdi:lock"),
    ]
}

fn system_services() -> Vec<ServiceEntity> {
    vec![
        ServiceEntity::new(
            200,
            "notify",
            vec![
                ServiceArg::new("title", ServiceArgType::String),
                ServiceArg::new("message", ServiceArgType::String),
            ],
            |args| {
                info!(?args, "notification requested (no handler wired)");
            },
        ),
        ServiceEntity::new(
            202,
            "launch_app",
            vec![ServiceArg::new("app_name", ServiceArgType::String)],
            |args| {
                info!(?args, "app launch requested (no handler wired)");
            },
        ),
        ServiceEntity::new(
            203,
            "open_url",
            vec![ServiceArg::new("url", ServiceArgType::String)],
            |args| {
                info!(?args, "url open requested (no handler wired)");
            },
        ),
        ServiceEntity::new(
            204,
            "set_volume",
            vec![ServiceArg::new("volume", ServiceArgType::Int)],
            |args| {
                info!(?args, "volume change requested (no handler wired)");
            },
        ),
    ]
}
