//! Runtime samplers for the telemon agent.
//!
//! Each [`Collector`] reads one family of process or host statistics and
//! returns them as gauge [`Sample`]s. The agent's collect loop calls every
//! registered collector once per poll interval.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod process;
pub mod random;

use anyhow::Result;

/// A single gauge reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A runtime statistics sampler.
///
/// Implementations are registered in the agent's collect loop and called at
/// each poll interval. `Send` is required because the loop runs on its own
/// task.
pub trait Collector: Send {
    /// Returns the collector name (e.g., `"process"`), used for logging.
    fn name(&self) -> &str;

    /// Reads current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Sample>>;
}

/// The standard collector set used by the agent binary.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(process::ProcessCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(cpu::CpuCollector::new()),
        Box::new(load::LoadCollector::new()),
        Box::new(random::RandomCollector::new()),
    ]
}
