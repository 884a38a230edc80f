use std::error::Error;
use crate::logger::Logger;

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

inventory::collect!(ScenarioEntry);

/// Get all registered scenarios, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut scenarios: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    scenarios.sort_by_key(|s| s.short_name);
    scenarios
}

/// Record one validation check, logging it and collecting the message on failure
pub(crate) fn check(logger: &mut Logger, errors: &mut Vec<String>, passed: bool, msg: String) {
    if passed {
        crate::logln!(logger, crate::logger::LogEvent::Scenario, "✓ {}", msg);
    } else {
        crate::errln!(logger, crate::logger::LogEvent::Scenario, "✗ {}", msg);
        errors.push(msg);
    }
}

/// Turn collected validation failures into the scenario result
pub(crate) fn finish(scenario_name: &str, errors: Vec<String>) -> Result<(), Box<dyn Error>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into())
    }
}

pub mod constant_blend;
pub mod double_integrator_blend;
pub mod noise_scaling;
