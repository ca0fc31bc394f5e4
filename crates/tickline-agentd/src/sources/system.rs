use std::{fmt::Write, path::Path, sync::Mutex};

use chrono::{DateTime, Local};
use sysinfo::{Disks, System};
use tickline_core::{DataSource, SourceError, config::path};
use tickline_model::{ConfigDocument, Fields};

const GIB: f64 = (1u64 << 30) as f64;

/// Clock, CPU, memory and root-disk fields, each behind its `system_info.show_*` flag.
pub struct SystemSource {
    // Kept across fetches: CPU usage is the delta between two refreshes.
    system: Mutex<System>,
}

impl SystemSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn clock(
        &self,
        config: &ConfigDocument,
        now: DateTime<Local>,
        fields: &mut Fields,
    ) -> Result<(), SourceError> {
        if flag(config, "system_info.show_time") {
            let format = text(config, "time_format", "%H:%M:%S");
            fields.insert("time".into(), strftime(now, format)?);
        }
        if flag(config, "system_info.show_date") {
            let format = text(config, "date_format", "%Y-%m-%d");
            fields.insert("date".into(), strftime(now, format)?);
        }
        Ok(())
    }

    fn machine(&self, config: &ConfigDocument, fields: &mut Fields) {
        let show_cpu = flag(config, "system_info.show_cpu");
        let show_memory = flag(config, "system_info.show_memory");
        if show_cpu || show_memory {
            let mut system = self.system.lock().unwrap_or_else(|p| p.into_inner());
            if show_cpu {
                system.refresh_cpu_usage();
                fields.insert("cpu".into(), format!("{:.1}%", system.global_cpu_usage()));
            }
            if show_memory {
                system.refresh_memory();
                let (used, total) = (system.used_memory(), system.total_memory());
                fields.insert("memory".into(), format!("{:.1}%", percent(used, total)));
                fields.insert("memory_used_gb".into(), gigabytes(used));
                fields.insert("memory_total_gb".into(), gigabytes(total));
            }
        }

        if flag(config, "system_info.show_disk") {
            let disks = Disks::new_with_refreshed_list();
            if let Some(root) = disks.iter().find(|d| d.mount_point() == Path::new("/")) {
                let (free, total) = (root.available_space(), root.total_space());
                let used = total.saturating_sub(free);
                fields.insert("disk".into(), format!("{:.1}%", percent(used, total)));
                fields.insert("disk_free_gb".into(), gigabytes(free));
                fields.insert("disk_total_gb".into(), gigabytes(total));
            }
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SystemSource {
    fn supports(&self) -> &str {
        "system"
    }

    fn fetch(&self, config: &ConfigDocument) -> Result<Fields, SourceError> {
        let mut fields = Fields::new();
        self.clock(config, Local::now(), &mut fields)?;
        self.machine(config, &mut fields);
        Ok(fields)
    }
}

fn flag(config: &ConfigDocument, key: &str) -> bool {
    path::lookup(config, key)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn text<'a>(config: &'a ConfigDocument, key: &str, default: &'a str) -> &'a str {
    path::lookup(config, key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

/// strftime without panicking on a malformed pattern.
fn strftime(now: DateTime<Local>, format: &str) -> Result<String, SourceError> {
    let mut out = String::new();
    write!(out, "{}", now.format(format))
        .map_err(|_| SourceError::Failed(format!("invalid time format {format:?}")))?;
    Ok(out)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

fn gigabytes(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / GIB)
}
