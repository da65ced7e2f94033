use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::engine::project_lifetime;
use super::error::{EngineError, Result};
use super::policy::{TaxPolicy, TaxScenario};
use super::scenarios::builtin_scenarios;
use super::types::{LifeIncomeResult, Persona, SimulationConfig, TaxDistribution};

/// Lookup and execution surface over a fixed set of scenarios. Which one is
/// "current" is the caller's business.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    scenarios: Vec<TaxScenario>,
}

impl ScenarioRegistry {
    pub fn new(scenarios: Vec<TaxScenario>) -> Result<Self> {
        for (idx, scenario) in scenarios.iter().enumerate() {
            if scenarios[..idx].iter().any(|s| s.id() == scenario.id()) {
                return Err(EngineError::InvalidConfig {
                    field: "scenarios",
                    reason: format!("duplicate scenario id `{}`", scenario.id()),
                });
            }
        }
        Ok(Self { scenarios })
    }

    pub fn with_builtin() -> Result<Self> {
        Self::new(builtin_scenarios()?)
    }

    pub fn list_scenarios(&self) -> &[TaxScenario] {
        &self.scenarios
    }

    pub fn get_scenario(&self, id: &str) -> Result<&TaxScenario> {
        self.scenarios
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| EngineError::UnknownScenario(id.to_string()))
    }

    pub fn project(
        &self,
        persona: &Persona,
        scenario_id: &str,
        config: &SimulationConfig,
    ) -> Result<LifeIncomeResult> {
        project_lifetime(persona, self.get_scenario(scenario_id)?, config)
    }

    /// Runs the persona once per requested scenario. Every id is resolved
    /// before the first projection starts, so an unknown id computes nothing.
    pub fn run_comparison(
        &self,
        persona: &Persona,
        scenario_ids: &[String],
        config: &SimulationConfig,
    ) -> Result<Comparison> {
        let policies = scenario_ids
            .iter()
            .map(|id| self.get_scenario(id))
            .collect::<Result<Vec<_>>>()?;

        debug!(scenarios = policies.len(), "running comparison");

        let mut results = BTreeMap::new();
        let mut names = BTreeMap::new();
        for policy in policies {
            let result = project_lifetime(persona, policy, config)?;
            names.insert(policy.id().to_string(), policy.name().to_string());
            results.insert(policy.id().to_string(), result);
        }
        Ok(Comparison { results, names })
    }

    /// Summaries from each scenario's precomputed aggregate constants; no
    /// projection is run.
    pub fn reference_summaries(&self) -> Vec<ReferenceSummary> {
        self.scenarios
            .iter()
            .filter_map(|s| {
                s.reference_distribution().map(|distribution| ReferenceSummary {
                    id: s.id().to_string(),
                    name: s.name().to_string(),
                    shares: distribution.shares(),
                    distribution,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSummary {
    pub id: String,
    pub name: String,
    pub distribution: TaxDistribution,
    pub shares: TaxDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub id: String,
    pub name: String,
    pub distribution: TaxDistribution,
    pub lifetime_income: f64,
    pub effective_rate: f64,
    pub terminal_wealth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    results: BTreeMap<String, LifeIncomeResult>,
    #[serde(skip)]
    names: BTreeMap<String, String>,
}

impl Comparison {
    pub fn results(&self) -> &BTreeMap<String, LifeIncomeResult> {
        &self.results
    }

    pub fn get(&self, scenario_id: &str) -> Option<&LifeIncomeResult> {
        self.results.get(scenario_id)
    }

    pub fn summaries(&self) -> Vec<ScenarioSummary> {
        self.results
            .iter()
            .map(|(id, result)| ScenarioSummary {
                id: id.clone(),
                name: self.names.get(id).cloned().unwrap_or_else(|| id.clone()),
                distribution: result.tax_distribution(),
                lifetime_income: result.lifetime_income(),
                effective_rate: result.effective_tax_rate(),
                terminal_wealth: result.terminal_wealth(),
            })
            .collect()
    }

    pub fn into_results(self) -> BTreeMap<String, LifeIncomeResult> {
        self.results
    }
}
