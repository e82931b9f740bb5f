use crate::{Collector, Sample};
use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Samples the agent's own process: resident and virtual memory, cpu usage,
/// run time and disk I/O totals.
pub struct ProcessCollector {
    system: System,
    pid: Option<Pid>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow!("current process id is unavailable on this platform"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;

        let disk = process.disk_usage();
        Ok(vec![
            Sample::new("process.memory_rss", process.memory() as f64),
            Sample::new("process.memory_virtual", process.virtual_memory() as f64),
            Sample::new("process.cpu_usage", f64::from(process.cpu_usage())),
            Sample::new("process.run_time", process.run_time() as f64),
            Sample::new("process.disk_read_total", disk.total_read_bytes as f64),
            Sample::new("process.disk_written_total", disk.total_written_bytes as f64),
        ])
    }
}
