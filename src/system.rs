//! Process and system facts from the /proc filesystem.
//!
//! These back the memory summary report and the `runtime:*` platform beans.

use std::fs;
use std::sync::Arc;

use tracing::warn;

use crate::registry::{BeanRegistry, DynamicBean, OperationInfo};
use crate::threads::{LocalThreads, ThreadWalker};

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// System memory information in bytes.
#[derive(Debug, Clone, Copy)]
pub struct MemoryInfo {
    pub total_ram: u64,
    pub total_swap: u64,
    pub available: u64,
}

/// Memory of the current process in bytes.
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemory {
    pub resident: u64,
    pub virtual_size: u64,
    pub peak_resident: u64,
}

/// `free,total,max` triple of the memory summary report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySummary {
    pub free: u64,
    pub total: u64,
    pub max: u64,
}

/// Reads load average from /proc/loadavg.
pub fn read_load_average() -> Result<LoadAverage, String> {
    let content = fs::read_to_string("/proc/loadavg")
        .map_err(|e| format!("Failed to read /proc/loadavg: {}", e))?;
    parse_load_average(&content)
}

/// Parses "0.00 0.01 0.05 1/234 5678".
pub fn parse_load_average(content: &str) -> Result<LoadAverage, String> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(format!(
            "Invalid /proc/loadavg format: expected at least 3 fields, got {}",
            parts.len()
        ));
    }

    let one_min = parts[0]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 1min load average: {}", e))?;
    let five_min = parts[1]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 5min load average: {}", e))?;
    let fifteen_min = parts[2]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 15min load average: {}", e))?;

    Ok(LoadAverage {
        one_min,
        five_min,
        fifteen_min,
    })
}

/// Reads MemTotal, SwapTotal and MemAvailable from /proc/meminfo.
pub fn read_memory_info() -> Result<MemoryInfo, String> {
    let content = fs::read_to_string("/proc/meminfo")
        .map_err(|e| format!("Failed to read /proc/meminfo: {}", e))?;
    parse_memory_info(&content)
}

pub fn parse_memory_info(content: &str) -> Result<MemoryInfo, String> {
    let total_ram = kb_field(content, "MemTotal:");
    let total_swap = kb_field(content, "SwapTotal:");
    let available = kb_field(content, "MemAvailable:");

    match (total_ram, total_swap, available) {
        (Some(ram), Some(swap), Some(available)) => Ok(MemoryInfo {
            total_ram: ram,
            total_swap: swap,
            available,
        }),
        _ => Err("Failed to parse MemTotal, SwapTotal or MemAvailable from /proc/meminfo".to_string()),
    }
}

/// Reads resident, virtual and peak resident size of this process.
pub fn read_process_memory() -> Result<ProcessMemory, String> {
    let statm = fs::read_to_string("/proc/self/statm")
        .map_err(|e| format!("Failed to read /proc/self/statm: {}", e))?;
    let status = fs::read_to_string("/proc/self/status")
        .map_err(|e| format!("Failed to read /proc/self/status: {}", e))?;
    parse_process_memory(&statm, &status, page_size())
}

pub fn parse_process_memory(
    statm: &str,
    status: &str,
    page_size: u64,
) -> Result<ProcessMemory, String> {
    let mut fields = statm.split_whitespace();
    let mut pages = || -> Result<u64, String> {
        fields
            .next()
            .ok_or_else(|| "Invalid /proc/self/statm format".to_string())?
            .parse::<u64>()
            .map_err(|e| format!("Failed to parse /proc/self/statm: {}", e))
    };
    let virtual_size = pages()? * page_size;
    let resident = pages()? * page_size;
    // VmHWM is absent in some containers; fall back to the current RSS.
    let peak_resident = kb_field(status, "VmHWM:").unwrap_or(resident);

    Ok(ProcessMemory {
        resident,
        virtual_size,
        peak_resident,
    })
}

/// Gets the number of CPU cores from /proc/cpuinfo.
pub fn get_cpu_core_count() -> Result<usize, String> {
    let content = fs::read_to_string("/proc/cpuinfo")
        .map_err(|e| format!("Failed to read /proc/cpuinfo: {}", e))?;

    let count = parse_cpu_count(&content);
    if count == 0 {
        return Err("No processors found in /proc/cpuinfo".to_string());
    }
    Ok(count)
}

pub fn parse_cpu_count(content: &str) -> usize {
    content
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count()
}

/// Available system memory, this process's resident size and total RAM.
pub fn memory_summary() -> Result<MemorySummary, String> {
    let system = read_memory_info()?;
    let process = read_process_memory()?;
    Ok(MemorySummary {
        free: system.available,
        total: process.resident,
        max: system.total_ram,
    })
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads configuration.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// Value of a "Key:   1234 kB" line, converted to bytes.
fn kb_field(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Registers the `runtime:*` platform beans.
pub fn register_platform_beans(registry: &BeanRegistry) {
    let memory = DynamicBean::new()
        .fallible_attribute("ResidentBytes", "long", "Resident set size of this process", || {
            read_process_memory().map(|m| m.resident.into())
        })
        .fallible_attribute("VirtualBytes", "long", "Virtual memory size of this process", || {
            read_process_memory().map(|m| m.virtual_size.into())
        })
        .fallible_attribute("PeakResidentBytes", "long", "Peak resident set size", || {
            read_process_memory().map(|m| m.peak_resident.into())
        })
        .fallible_attribute("TotalBytes", "long", "Total system RAM", || {
            read_memory_info().map(|m| m.total_ram.into())
        })
        .fallible_attribute("AvailableBytes", "long", "Memory available for new allocations", || {
            read_memory_info().map(|m| m.available.into())
        });

    let os = DynamicBean::new()
        .attribute("Name", "String", "Operating system name", || std::env::consts::OS)
        .attribute("Arch", "String", "CPU architecture", || std::env::consts::ARCH)
        .fallible_attribute("AvailableProcessors", "int", "Processor count", || {
            get_cpu_core_count().map(Into::into)
        })
        .fallible_attribute("SystemLoadAverage", "double", "One minute load average", || {
            read_load_average().map(|l| l.one_min.into())
        })
        .fallible_attribute("SystemLoadAverage5", "double", "Five minute load average", || {
            read_load_average().map(|l| l.five_min.into())
        })
        .fallible_attribute("SystemLoadAverage15", "double", "Fifteen minute load average", || {
            read_load_average().map(|l| l.fifteen_min.into())
        })
        .fallible_attribute("TotalSwapBytes", "long", "Total swap space", || {
            read_memory_info().map(|m| m.total_swap.into())
        });

    let threading = DynamicBean::new()
        .attribute("ThreadCount", "int", "Live tracked threads", || {
            ThreadWalker::new(LocalThreads).list_threads().len()
        })
        .attribute("ThreadGroupCount", "int", "Live thread groups", || {
            let walker = ThreadWalker::new(LocalThreads);
            walker.list_groups(&walker.find_root_group()).len()
        })
        .attribute("ProcessId", "int", "Operating system process id", || {
            u64::from(std::process::id())
        })
        .operation(OperationInfo::new("dumpAllThreads", "String", "Stack of every tracked thread"))
        .operation(
            OperationInfo::new("getThreadInfo", "ThreadInfo", "Snapshot of one thread")
                .param("long", "id")
                .param("int", "maxDepth"),
        );

    for (name, bean) in [
        ("runtime:type=Memory", memory),
        ("runtime:type=OperatingSystem", os),
        ("runtime:type=Threading", threading),
    ] {
        if let Err(e) = registry.register_named(name, Arc::new(bean)) {
            warn!("Failed to register platform bean {}: {}", name, e);
        }
    }
}
