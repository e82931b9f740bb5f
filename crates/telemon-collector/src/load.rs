use crate::{Collector, Sample};
use anyhow::Result;
use sysinfo::System;

#[derive(Default)]
pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        let load_avg = System::load_average();

        Ok(vec![
            Sample::new("system.load_1", load_avg.one),
            Sample::new("system.load_5", load_avg.five),
            Sample::new("system.load_15", load_avg.fifteen),
            Sample::new("system.uptime", System::uptime() as f64),
        ])
    }
}
