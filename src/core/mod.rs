mod brackets;
mod engine;
mod error;
mod policy;
mod registry;
pub mod scenarios;
mod solver;
mod types;

pub use brackets::{Bracket, BracketSchedule, evaluate};
pub use engine::project_lifetime;
pub use error::{EngineError, Result};
pub use policy::{
    ClassAllowances, InheritanceAssessment, InheritanceTaxRule, Levy, ScenarioRules, TaxPolicy,
    TaxScenario,
};
pub use registry::{Comparison, ReferenceSummary, ScenarioRegistry, ScenarioSummary};
pub use solver::{FlatRateIteration, FlatRateSolveConfig, FlatRateSolveResult, solve_flat_rate};
pub use types::{
    InheritanceTerms, LifeIncomeResult, MAX_HORIZON_AGE, Persona, SimulationConfig, TaxClass,
    TaxDistribution, YearlyResult,
};
