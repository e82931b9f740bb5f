use crate::{Collector, Sample};
use anyhow::Result;
use rand::Rng;

/// Emits `random_value`, a fresh random gauge each poll. Useful for checking
/// end to end that new values actually reach the server.
#[derive(Default)]
pub struct RandomCollector;

impl RandomCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for RandomCollector {
    fn name(&self) -> &str {
        "random"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        let value: u32 = rand::thread_rng().gen();
        Ok(vec![Sample::new("random_value", f64::from(value))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_sample() {
        let samples = RandomCollector::new().collect().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "random_value");
    }
}
