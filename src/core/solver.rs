use serde::Serialize;

use super::brackets::BracketSchedule;
use super::engine::project_lifetime;
use super::error::{EngineError, Result};
use super::policy::{
    ClassAllowances, InheritanceAssessment, InheritanceTaxRule, Levy, ScenarioRules, TaxPolicy,
    TaxScenario,
};
use super::types::{Persona, SimulationConfig};

pub const CANDIDATE_SCENARIO_ID: &str = "flat-rate-candidate";
const MAX_SOLVER_ITERATIONS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatRateSolveConfig {
    pub search_min: f64,
    pub search_max: f64,
    /// Width of the final rate interval.
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for FlatRateSolveConfig {
    fn default() -> Self {
        Self {
            search_min: 0.0,
            search_max: 0.6,
            tolerance: 1e-5,
            max_iterations: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRateIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_rate: f64,
    pub lifetime_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRateSolveResult {
    pub reference_id: String,
    pub reference_lifetime_tax: f64,
    pub solved_rate: Option<f64>,
    pub achieved_lifetime_tax: Option<f64>,
    pub iterations: Vec<FlatRateIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Finds the single rate on income, wealth income and inheritances that
/// collects the same lifetime tax from `persona` as `reference`.
pub fn solve_flat_rate(
    persona: &Persona,
    reference: &dyn TaxPolicy,
    config: &SimulationConfig,
    solve: FlatRateSolveConfig,
) -> Result<FlatRateSolveResult> {
    validate_config(solve)?;

    let target = project_lifetime(persona, reference, config)?
        .tax_distribution()
        .total;
    let vat_rate = reference.vat_rate_override();
    let lifetime_tax = |rate: f64| -> Result<f64> {
        let candidate = candidate_policy(rate, vat_rate)?;
        Ok(project_lifetime(persona, &candidate, config)?
            .tax_distribution()
            .total)
    };

    let mut iterations = Vec::with_capacity(solve.max_iterations as usize);
    let low_tax = lifetime_tax(solve.search_min)?;
    let high_tax = lifetime_tax(solve.search_max)?;

    let mut solved_rate = None;
    let mut converged = false;
    let feasible;
    let message;

    if low_tax + 1e-9 >= target {
        solved_rate = Some(solve.search_min);
        converged = true;
        feasible = true;
        message = "Lower rate bound already matches the reference revenue.".to_string();
    } else if high_tax + 1e-9 < target {
        feasible = false;
        message = "No flat rate within the search bounds matches the reference revenue."
            .to_string();
    } else {
        let mut lo = solve.search_min;
        let mut hi = solve.search_max;
        let mut it = 0;
        while it < solve.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let tax = lifetime_tax(mid)?;
            iterations.push(FlatRateIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_rate: mid,
                lifetime_tax: tax,
            });

            if tax + 1e-9 >= target {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= solve.tolerance {
                converged = true;
                break;
            }
        }
        solved_rate = Some(hi);
        feasible = true;
        message = if converged {
            "Solved revenue-neutral flat rate.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    let achieved_lifetime_tax = match solved_rate {
        Some(rate) => Some(lifetime_tax(rate)?),
        None => None,
    };

    Ok(FlatRateSolveResult {
        reference_id: reference.id().to_string(),
        reference_lifetime_tax: target,
        solved_rate,
        achieved_lifetime_tax,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn candidate_policy(rate: f64, vat_rate: Option<f64>) -> Result<TaxScenario> {
    TaxScenario::new(
        CANDIDATE_SCENARIO_ID,
        "Flat-rate candidate",
        format!("Flat {:.4} on income, wealth income and inheritances.", rate),
        ScenarioRules {
            income: Levy::Flat { rate },
            inheritance: InheritanceTaxRule::uniform(
                BracketSchedule::flat("flat-rate-candidate.inheritance", rate)?,
                ClassAllowances::NONE,
                0.0,
                InheritanceAssessment::Separate,
            ),
            wealth: Levy::Exempt,
            wealth_income: Levy::Flat { rate },
            vat_rate,
            reference_distribution: None,
        },
    )
}

fn validate_config(solve: FlatRateSolveConfig) -> Result<()> {
    let fail = |field: &'static str, reason: &str| {
        Err(EngineError::InvalidConfig {
            field,
            reason: reason.to_string(),
        })
    };

    if !(0.0..=1.0).contains(&solve.search_min) || !(0.0..=1.0).contains(&solve.search_max) {
        return fail("searchMin/searchMax", "rate bounds must be between 0 and 1");
    }
    if solve.search_max <= solve.search_min {
        return fail("searchMax", "must be greater than searchMin");
    }
    if !solve.tolerance.is_finite() || solve.tolerance <= 0.0 {
        return fail("tolerance", "must be > 0");
    }
    if solve.max_iterations == 0 || solve.max_iterations > MAX_SOLVER_ITERATIONS {
        return fail(
            "maxIterations",
            &format!("must be between 1 and {MAX_SOLVER_ITERATIONS}"),
        );
    }
    Ok(())
}
