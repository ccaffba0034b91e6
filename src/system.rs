//! Process and host resource sampling.

use std::collections::HashSet;
use std::fs;
use std::sync::Mutex;
use sysinfo::{CpuExt, System, SystemExt};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryUsage {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percent: f64,
}

impl MemoryUsage {
    pub fn new(total: u64, free: u64, used: u64) -> Self {
        let used_percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            free,
            used,
            used_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// TCP connection state as reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Established,
    Listen,
    Other(String),
}

impl ConnectionState {
    /// Map a `/proc/net/tcp` hex state code
    fn from_proc_code(code: &str) -> Self {
        match code {
            "01" => ConnectionState::Established,
            "0A" => ConnectionState::Listen,
            other => ConnectionState::Other(other.to_string()),
        }
    }
}

/// One sample of host and process resources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSnapshot {
    /// Usage percentage per logical CPU
    pub cpu: Vec<f64>,
    pub virtual_memory: MemoryUsage,
    pub swap: MemoryUsage,
    pub load: LoadAverage,
    pub open_files: u64,
    pub connections: Vec<ConnectionState>,
    pub threads: u64,
}

/// Source of resource snapshots
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ResourceSnapshot;

    fn physical_cores(&self) -> usize;

    fn logical_cores(&self) -> usize;
}

/// Sampler backed by `sysinfo` plus procfs for descriptors, sockets and threads
pub struct SysinfoSampler {
    system: Mutex<System>,
    physical_cores: usize,
    logical_cores: usize,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let logical_cores = system.cpus().len().max(1);
        let physical_cores = system
            .physical_core_count()
            .filter(|cores| *cores > 0)
            .unwrap_or(logical_cores);

        Self {
            system: Mutex::new(system),
            physical_cores,
            logical_cores,
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&self) -> ResourceSnapshot {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_cpu();
        system.refresh_memory();

        let load = system.load_average();

        ResourceSnapshot {
            cpu: system.cpus().iter().map(|cpu| cpu.cpu_usage() as f64).collect(),
            virtual_memory: MemoryUsage::new(
                system.total_memory(),
                system.free_memory(),
                system.used_memory(),
            ),
            swap: MemoryUsage::new(system.total_swap(), system.free_swap(), system.used_swap()),
            load: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            open_files: count_entries("/proc/self/fd"),
            connections: tcp_connections(),
            threads: count_entries("/proc/self/task"),
        }
    }

    fn physical_cores(&self) -> usize {
        self.physical_cores
    }

    fn logical_cores(&self) -> usize {
        self.logical_cores
    }
}

/// Number of entries in a procfs directory, zero when unavailable
fn count_entries(path: &str) -> u64 {
    fs::read_dir(path)
        .map(|entries| entries.filter_map(Result::ok).count() as u64)
        .unwrap_or(0)
}

/// TCP sockets owned by this process.
///
/// The procfs tables list every socket in the network namespace, so rows are
/// matched against the socket inodes held open in `/proc/self/fd`.
fn tcp_connections() -> Vec<ConnectionState> {
    let owned = socket_inodes();
    if owned.is_empty() {
        return Vec::new();
    }

    ["/proc/self/net/tcp", "/proc/self/net/tcp6"]
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .flat_map(|table| parse_tcp_table(&table, &owned))
        .collect()
}

fn socket_inodes() -> HashSet<u64> {
    let Ok(entries) = fs::read_dir("/proc/self/fd") else {
        return HashSet::new();
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| fs::read_link(entry.path()).ok())
        .filter_map(|target| parse_socket_link(&target.to_string_lossy()))
        .collect()
}

/// Inode of a `socket:[<inode>]` descriptor link
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// States of the rows in a `/proc/net/tcp` style table whose inode is in `owned`
fn parse_tcp_table(table: &str, owned: &HashSet<u64>) -> Vec<ConnectionState> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let inode: u64 = fields.get(9)?.parse().ok()?;
            if !owned.contains(&inode) {
                return None;
            }
            fields.get(3).map(|code| ConnectionState::from_proc_code(code))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_percent() {
        let usage = MemoryUsage::new(200, 50, 150);
        assert_eq!(usage.used_percent, 75.0);
        assert_eq!(MemoryUsage::new(0, 0, 0).used_percent, 0.0);
    }

    #[test]
    fn test_parse_tcp_table() {
        let table = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:23F4 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 1 1
   1: 0100007F:23F4 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 2 1
   2: 0100007F:C350 0100007F:23F4 06 00000000:00000000 00:00000000 00000000  1000        0 0 3
";
        let owned: HashSet<u64> = [1, 2, 3].into_iter().collect();
        assert_eq!(
            parse_tcp_table(table, &owned),
            vec![ConnectionState::Listen, ConnectionState::Established]
        );

        let all: HashSet<u64> = [0, 1, 2].into_iter().collect();
        assert_eq!(
            parse_tcp_table(table, &all),
            vec![
                ConnectionState::Listen,
                ConnectionState::Established,
                ConnectionState::Other("06".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_socket_link() {
        assert_eq!(parse_socket_link("socket:[41234]"), Some(41234));
        assert_eq!(parse_socket_link("pipe:[41234]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[test]
    fn test_sampler_reports_cores() {
        let sampler = SysinfoSampler::new();
        assert!(sampler.logical_cores() >= 1);
        assert!(sampler.physical_cores() >= 1);

        let snapshot = sampler.sample();
        assert!(snapshot.virtual_memory.used_percent >= 0.0);
    }
}
