use tracing::debug;

use super::error::{EngineError, Result};
use super::policy::TaxPolicy;
use super::types::{LifeIncomeResult, Persona, SimulationConfig, YearlyResult};

/// Per-run constants resolved once before the yearly loop.
#[derive(Debug, Clone, Copy)]
struct RunConstants {
    vat_rate: f64,
    vat_applicable_rate: f64,
    growth_rate: f64,
    allow_negative_wealth: bool,
}

#[derive(Debug, Clone, Copy)]
struct InheritanceEvent {
    amount: f64,
    tax: f64,
}

/// Projects a persona year by year from `initial_age` to the horizon age
/// (inclusive) under one policy. Inputs are validated up front, so the loop
/// itself cannot fail.
pub fn project_lifetime(
    persona: &Persona,
    policy: &dyn TaxPolicy,
    config: &SimulationConfig,
) -> Result<LifeIncomeResult> {
    persona.validate()?;
    config.validate()?;
    if config.horizon_age < persona.initial_age {
        return Err(EngineError::InvalidConfig {
            field: "horizonAge",
            reason: format!("must be >= initialAge ({})", persona.initial_age),
        });
    }

    let constants = RunConstants {
        vat_rate: policy
            .vat_rate_override()
            .unwrap_or(config.vat_rate)
            .clamp(0.0, 1.0),
        vat_applicable_rate: config.vat_applicable_rate,
        growth_rate: config.assumed_growth_rate,
        allow_negative_wealth: config.allow_negative_wealth,
    };

    debug!(
        scenario = policy.id(),
        initial_age = persona.initial_age,
        horizon_age = config.horizon_age,
        vat_rate = constants.vat_rate,
        vat_rate_overridden = policy.vat_rate_override().is_some(),
        "projecting lifetime"
    );

    let year_count = (config.horizon_age - persona.initial_age + 1) as usize;
    let mut years = Vec::with_capacity(year_count);
    let mut wealth = 0.0;

    for (years_since_start, age) in (persona.initial_age..=config.horizon_age).enumerate() {
        let income = income_for_year(persona, config, years_since_start);
        let inheritance = inheritance_event(persona, policy, config, age);
        let year = advance_year(
            policy,
            constants,
            persona.savings_rate,
            age,
            income,
            wealth,
            inheritance,
        );
        wealth = year.wealth;
        years.push(year);
    }

    LifeIncomeResult::new(policy.id().to_string(), years)
}

fn income_for_year(persona: &Persona, config: &SimulationConfig, years_since_start: usize) -> f64 {
    if config.income_growth_rate == 0.0 {
        return persona.current_income;
    }
    persona.current_income * (1.0 + config.income_growth_rate).powi(years_since_start as i32)
}

/// Fires only in the year the persona reaches `inheritance_age`.
fn inheritance_event(
    persona: &Persona,
    policy: &dyn TaxPolicy,
    config: &SimulationConfig,
    age: u32,
) -> Option<InheritanceEvent> {
    if age != persona.inheritance_age || persona.inheritance_amount <= 0.0 {
        return None;
    }

    let terms = config.inheritance;
    let company_assets = persona.inheritance_amount * terms.company_share;
    let housing_and_financial = persona.inheritance_amount - company_assets;
    let tax = policy.calculate_inheritance_tax(
        housing_and_financial,
        company_assets,
        terms.hardship_exception,
        terms.tax_class,
    );
    Some(InheritanceEvent {
        amount: persona.inheritance_amount,
        tax,
    })
}

fn advance_year(
    policy: &dyn TaxPolicy,
    constants: RunConstants,
    savings_rate: f64,
    age: u32,
    income: f64,
    wealth: f64,
    inheritance: Option<InheritanceEvent>,
) -> YearlyResult {
    let income_tax = policy.calculate_income_tax(income);
    let disposable = income - income_tax;

    let spending = disposable * (1.0 - savings_rate);
    let vat = policy.calculate_vat(spending, constants.vat_rate, constants.vat_applicable_rate);

    let wealth_income = wealth * constants.growth_rate;
    let wealth_tax = policy.calculate_wealth_tax(wealth);
    let wealth_income_tax = policy.calculate_wealth_income_tax(wealth_income);

    let (inheritance, inheritance_tax) = inheritance
        .map(|event| (event.amount, event.tax))
        .unwrap_or((0.0, 0.0));

    let savings = income - income_tax - spending - vat;
    let net_return = wealth_income - wealth_income_tax - wealth_tax;
    let net_inheritance = inheritance - inheritance_tax;

    let mut end_wealth = wealth + net_return + net_inheritance + savings;
    if !constants.allow_negative_wealth {
        end_wealth = end_wealth.max(0.0);
    }

    let tax = income_tax + wealth_tax + wealth_income_tax + inheritance_tax + vat;
    let tax_rate = if income > 0.0 { tax / income } else { 0.0 };

    YearlyResult {
        age,
        income,
        income_tax,
        wealth: end_wealth,
        wealth_growth: end_wealth - wealth,
        wealth_income,
        wealth_tax,
        wealth_income_tax,
        inheritance,
        inheritance_tax,
        vat,
        spending,
        tax,
        tax_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scenarios::{flat_tax, status_quo, wealth_tax};
    use crate::core::types::{InheritanceTerms, TaxClass};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_persona() -> Persona {
        Persona {
            name: "Alex".to_string(),
            icon: "briefcase".to_string(),
            current_age: 30,
            initial_age: 30,
            current_income: 100_000.0,
            savings_rate: 0.10,
            inheritance_age: 60,
            inheritance_amount: 100_000.0,
        }
    }

    fn zero_growth_config() -> SimulationConfig {
        SimulationConfig {
            assumed_growth_rate: 0.0,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn flat_tax_oracle_first_year_and_inheritance_year() {
        let persona = sample_persona();
        let policy = flat_tax().expect("valid");
        let result =
            project_lifetime(&persona, &policy, &SimulationConfig::default()).expect("projects");

        let first = result.years()[0];
        assert_eq!(first.age, 30);
        assert_approx(first.income_tax, 16_130.0);
        assert_approx(first.inheritance, 0.0);

        let at_60 = result.year_at(60).expect("age 60 simulated");
        assert_approx(at_60.inheritance, 100_000.0);
        assert_approx(at_60.inheritance_tax, 16_130.0);
        assert!(at_60.inheritance_tax > 0.0);
    }

    #[test]
    fn first_year_cashflow_matches_hand_calculation() {
        let persona = sample_persona();
        let policy = flat_tax().expect("valid");
        let config = SimulationConfig {
            allow_negative_wealth: true,
            ..zero_growth_config()
        };
        let result = project_lifetime(&persona, &policy, &config).expect("projects");
        let first = result.years()[0];

        let disposable = 100_000.0 - 16_130.0;
        let spending = disposable * 0.9;
        let vat = spending * 0.7 * 0.1613;
        assert_approx(first.spending, 75_483.0);
        assert_approx(first.vat, vat);
        assert_approx(first.wealth, disposable - spending - vat);
        assert_approx(first.wealth_growth, disposable - spending - vat);
        assert_approx(first.tax, 16_130.0 + vat);
        assert_approx(first.tax_rate, (16_130.0 + vat) / 100_000.0);
    }

    #[test]
    fn spending_excludes_vat_charged_on_top() {
        let persona = sample_persona();
        let policy = status_quo().expect("valid");
        let config = zero_growth_config();
        let result = project_lifetime(&persona, &policy, &config).expect("projects");
        for year in result.years().iter().filter(|y| y.inheritance == 0.0) {
            let disposable = year.income - year.income_tax;
            assert_approx(year.spending, disposable * 0.9);
            assert_approx(year.vat, year.spending * 0.7 * 0.19);
        }
    }

    #[test]
    fn wealth_is_floored_at_zero_when_vat_exceeds_savings() {
        let mut persona = sample_persona();
        persona.savings_rate = 0.0;
        persona.inheritance_amount = 0.0;
        let policy = flat_tax().expect("valid");
        let config = SimulationConfig {
            horizon_age: 35,
            ..zero_growth_config()
        };
        let result = project_lifetime(&persona, &policy, &config).expect("projects");
        for year in result.years() {
            assert!(year.vat > 0.0);
            assert_approx(year.wealth, 0.0);
            assert_approx(year.wealth_growth, 0.0);
        }
    }

    #[test]
    fn floor_reports_applied_change_after_positive_wealth() {
        let mut persona = sample_persona();
        persona.savings_rate = 0.0;
        persona.inheritance_age = 30;
        persona.inheritance_amount = 20_000.0;
        let policy = flat_tax().expect("valid");
        let config = SimulationConfig {
            horizon_age: 34,
            ..zero_growth_config()
        };
        let result = project_lifetime(&persona, &policy, &config).expect("projects");

        let yearly_vat = (100_000.0 - 16_130.0) * 0.7 * 0.1613;
        let start = 20_000.0 * (1.0 - 0.1613) - yearly_vat;
        assert!(start > 0.0 && start < yearly_vat);
        assert_approx(result.years()[0].wealth, start);

        let second = result.years()[1];
        assert_approx(second.wealth, 0.0);
        assert_approx(second.wealth_growth, -start);
        let mut previous = 0.0;
        for year in result.years() {
            assert_approx(year.wealth, previous + year.wealth_growth);
            previous = year.wealth;
        }
    }

    #[test]
    fn negative_wealth_accumulates_when_allowed() {
        let mut persona = sample_persona();
        persona.savings_rate = 0.0;
        persona.inheritance_amount = 0.0;
        let policy = flat_tax().expect("valid");
        let config = SimulationConfig {
            horizon_age: 32,
            allow_negative_wealth: true,
            ..zero_growth_config()
        };
        let result = project_lifetime(&persona, &policy, &config).expect("projects");

        let yearly_vat = (100_000.0 - 16_130.0) * 0.7 * 0.1613;
        for (idx, year) in result.years().iter().enumerate() {
            assert_approx(year.wealth_growth, -yearly_vat);
            assert_approx(year.wealth, -yearly_vat * (idx + 1) as f64);
        }
    }

    #[test]
    fn rejects_horizon_beyond_cap_before_allocating() {
        let mut persona = sample_persona();
        persona.initial_age = 0;
        persona.current_age = 0;
        let config = SimulationConfig {
            horizon_age: u32::MAX,
            ..SimulationConfig::default()
        };
        let err = project_lifetime(&persona, &status_quo().expect("valid"), &config)
            .expect_err("must reject");
        assert!(matches!(err, EngineError::InvalidConfig { field: "horizonAge", .. }));
    }

    #[test]
    fn wealth_compounds_with_wealth_income_tax_drag() {
        let mut persona = sample_persona();
        persona.current_income = 0.0;
        persona.inheritance_age = 30;
        persona.inheritance_amount = 1_000_000.0;
        let policy = flat_tax().expect("valid");
        let config = SimulationConfig {
            horizon_age: 31,
            assumed_growth_rate: 0.05,
            ..SimulationConfig::default()
        };

        let result = project_lifetime(&persona, &policy, &config).expect("projects");
        let start = 1_000_000.0 * (1.0 - 0.1613);
        assert_approx(result.years()[0].wealth, start);

        let second = result.years()[1];
        assert_approx(second.wealth_income, start * 0.05);
        assert_approx(second.wealth_income_tax, start * 0.05 * 0.1613);
        assert_approx(second.wealth, start + start * 0.05 * (1.0 - 0.1613));
        assert_approx(second.tax_rate, 0.0);
    }

    #[test]
    fn wealth_tax_scenario_drags_terminal_wealth() {
        let mut persona = sample_persona();
        persona.inheritance_amount = 5_000_000.0;
        let config = SimulationConfig::default();
        let with_levy = project_lifetime(&persona, &wealth_tax().expect("valid"), &config)
            .expect("projects");
        let without = project_lifetime(&persona, &status_quo().expect("valid"), &config)
            .expect("projects");

        assert!(with_levy.terminal_wealth() < without.terminal_wealth());
        assert!(with_levy.tax_distribution().wealth_tax > 0.0);
        assert_approx(without.tax_distribution().wealth_tax, 0.0);
    }

    #[test]
    fn inheritance_outside_horizon_never_fires() {
        let mut persona = sample_persona();
        persona.inheritance_age = 95;
        let policy = status_quo().expect("valid");
        let result =
            project_lifetime(&persona, &policy, &SimulationConfig::default()).expect("projects");
        assert!(result.years().iter().all(|y| y.inheritance == 0.0));
        assert!(result.years().iter().all(|y| y.inheritance_tax == 0.0));
    }

    #[test]
    fn hardship_exception_suppresses_inheritance_tax() {
        let persona = sample_persona();
        let config = SimulationConfig {
            inheritance: InheritanceTerms {
                hardship_exception: true,
                ..InheritanceTerms::default()
            },
            ..SimulationConfig::default()
        };
        let result = project_lifetime(&persona, &flat_tax().expect("valid"), &config)
            .expect("projects");
        let at_60 = result.year_at(60).expect("simulated");
        assert_approx(at_60.inheritance, 100_000.0);
        assert_approx(at_60.inheritance_tax, 0.0);
    }

    #[test]
    fn tax_class_changes_inheritance_tax() {
        let mut persona = sample_persona();
        persona.inheritance_amount = 500_000.0;
        let policy = status_quo().expect("valid");
        let class_tax = |class| {
            let config = SimulationConfig {
                inheritance: InheritanceTerms {
                    tax_class: class,
                    ..InheritanceTerms::default()
                },
                ..SimulationConfig::default()
            };
            project_lifetime(&persona, &policy, &config)
                .expect("projects")
                .tax_distribution()
                .inheritance_tax
        };
        assert!(class_tax(TaxClass::I) < class_tax(TaxClass::II));
        assert!(class_tax(TaxClass::II) < class_tax(TaxClass::III));
    }

    #[test]
    fn zero_income_yields_zero_rates_not_errors() {
        let mut persona = sample_persona();
        persona.current_income = 0.0;
        persona.inheritance_amount = 0.0;
        let policy = status_quo().expect("valid");
        let result =
            project_lifetime(&persona, &policy, &SimulationConfig::default()).expect("projects");
        for year in result.years() {
            assert_approx(year.tax, 0.0);
            assert_approx(year.tax_rate, 0.0);
            assert_approx(year.wealth, 0.0);
        }
    }

    #[test]
    fn income_growth_compounds_yearly() {
        let persona = sample_persona();
        let config = SimulationConfig {
            income_growth_rate: 0.02,
            horizon_age: 32,
            ..SimulationConfig::default()
        };
        let result = project_lifetime(&persona, &status_quo().expect("valid"), &config)
            .expect("projects");
        let incomes = result.years().iter().map(|y| y.income).collect::<Vec<_>>();
        assert_approx(incomes[0], 100_000.0);
        assert_approx(incomes[1], 102_000.0);
        assert_approx(incomes[2], 104_040.0);
    }

    #[test]
    fn rejects_invalid_persona_before_running() {
        let mut persona = sample_persona();
        persona.savings_rate = -0.1;
        let policy = status_quo().expect("valid");
        let err = project_lifetime(&persona, &policy, &SimulationConfig::default())
            .expect_err("must reject");
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_horizon_before_initial_age() {
        let persona = sample_persona();
        let config = SimulationConfig {
            horizon_age: 29,
            ..SimulationConfig::default()
        };
        let err = project_lifetime(&persona, &status_quo().expect("valid"), &config)
            .expect_err("must reject");
        assert!(matches!(err, EngineError::InvalidConfig { field: "horizonAge", .. }));
    }

    #[test]
    fn reruns_are_identical() {
        let persona = sample_persona();
        let policy = status_quo().expect("valid");
        let config = SimulationConfig::default();
        let first = project_lifetime(&persona, &policy, &config).expect("projects");
        let second = project_lifetime(&persona, &policy, &config).expect("projects");
        assert_eq!(first, second);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_result_length_and_age_order(
            initial_age in 18u32..70,
            span in 0u32..60,
            income in 0u32..400_000,
            savings_bp in 0u32..10_001,
        ) {
            let mut persona = sample_persona();
            persona.initial_age = initial_age;
            persona.current_age = initial_age;
            persona.inheritance_age = initial_age;
            persona.current_income = income as f64;
            persona.savings_rate = savings_bp as f64 / 10_000.0;
            let config = SimulationConfig {
                horizon_age: initial_age + span,
                ..SimulationConfig::default()
            };

            let result = project_lifetime(&persona, &status_quo().expect("valid"), &config)
                .expect("projects");
            prop_assert_eq!(result.len(), (span + 1) as usize);
            for (idx, year) in result.years().iter().enumerate() {
                prop_assert_eq!(year.age, initial_age + idx as u32);
            }
        }

        #[test]
        fn prop_inheritance_fires_at_most_once(
            inheritance_offset in 0u32..80,
            amount in 1u32..10_000_000,
        ) {
            let mut persona = sample_persona();
            persona.inheritance_age = persona.initial_age + inheritance_offset;
            persona.inheritance_amount = amount as f64;
            let config = SimulationConfig::default();

            let result = project_lifetime(&persona, &flat_tax().expect("valid"), &config)
                .expect("projects");
            let firing = result
                .years()
                .iter()
                .filter(|y| y.inheritance != 0.0)
                .collect::<Vec<_>>();
            let taxed = result.years().iter().filter(|y| y.inheritance_tax != 0.0).count();
            if persona.inheritance_age <= config.horizon_age {
                prop_assert_eq!(firing.len(), 1);
                prop_assert_eq!(firing[0].age, persona.inheritance_age);
                prop_assert_eq!(taxed, 1);
            } else {
                prop_assert_eq!(firing.len(), 0);
                prop_assert_eq!(taxed, 0);
            }
        }

        #[test]
        fn prop_yearly_tax_identity_and_non_negative_wealth(
            income in 0u32..500_000,
            savings_bp in 0u32..10_001,
            growth_bp in 0u32..1_200,
            inheritance in 0u32..8_000_000,
        ) {
            let mut persona = sample_persona();
            persona.current_income = income as f64;
            persona.savings_rate = savings_bp as f64 / 10_000.0;
            persona.inheritance_amount = inheritance as f64;
            let config = SimulationConfig {
                assumed_growth_rate: growth_bp as f64 / 10_000.0,
                ..SimulationConfig::default()
            };

            let result = project_lifetime(&persona, &wealth_tax().expect("valid"), &config)
                .expect("projects");
            let mut previous_wealth = 0.0;
            for year in result.years() {
                let sum = year.income_tax + year.wealth_tax + year.wealth_income_tax
                    + year.inheritance_tax + year.vat;
                prop_assert!((year.tax - sum).abs() <= EPS);
                prop_assert!(year.wealth >= 0.0);
                prop_assert!((year.wealth - previous_wealth - year.wealth_growth).abs() <= 1e-3);
                previous_wealth = year.wealth;
            }
        }
    }
}
