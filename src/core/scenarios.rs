//! Built-in scenario tables. These are constant reference data; every
//! schedule is validated when the registry is assembled.

use super::brackets::{Bracket, BracketSchedule};
use super::error::Result;
use super::policy::{
    ClassAllowances, InheritanceAssessment, InheritanceTaxRule, Levy, ScenarioRules, TaxScenario,
};
use super::types::TaxDistribution;

pub const STATUS_QUO_ID: &str = "status-quo";
pub const FLAT_TAX_ID: &str = "flat-tax";
pub const WEALTH_TAX_ID: &str = "wealth-tax";
pub const INHERITANCE_REFORM_ID: &str = "inheritance-reform";

pub const FLAT_TAX_RATE: f64 = 0.1613;

const INCOME_BRACKETS: [Bracket; 5] = [
    Bracket::capped(11_604.0, 0.0),
    Bracket::capped(17_005.0, 0.14),
    Bracket::capped(66_760.0, 0.24),
    Bracket::capped(277_825.0, 0.42),
    Bracket::open(0.45),
];

const INHERITANCE_LIMITS: [f64; 6] = [
    75_000.0,
    300_000.0,
    600_000.0,
    6_000_000.0,
    13_000_000.0,
    26_000_000.0,
];
const INHERITANCE_RATES_I: [f64; 7] = [0.07, 0.11, 0.15, 0.19, 0.23, 0.27, 0.30];
const INHERITANCE_RATES_II: [f64; 7] = [0.15, 0.20, 0.25, 0.30, 0.35, 0.40, 0.43];
const INHERITANCE_RATES_III: [f64; 7] = [0.30, 0.30, 0.30, 0.30, 0.50, 0.50, 0.50];

const STATUS_QUO_ALLOWANCES: ClassAllowances = ClassAllowances {
    class_i: 400_000.0,
    class_ii: 20_000.0,
    class_iii: 20_000.0,
};
const COMPANY_RELIEF: f64 = 0.85;

const CAPITAL_INCOME_ALLOWANCE: f64 = 1_000.0;
const CAPITAL_INCOME_RATE: f64 = 0.25;

const WEALTH_TAX_ALLOWANCE: f64 = 2_000_000.0;
const WEALTH_TAX_RATE: f64 = 0.01;

const REFORM_INHERITANCE_ALLOWANCE: f64 = 1_000_000.0;
const REFORM_INHERITANCE_RATE: f64 = 0.10;

// Annual revenue estimates in billions.
const STATUS_QUO_REVENUE: TaxDistribution = TaxDistribution::new(300.0, 290.0, 0.0, 11.0, 9.0);
const FLAT_TAX_REVENUE: TaxDistribution = TaxDistribution::new(270.0, 250.0, 0.0, 30.0, 60.0);
const WEALTH_TAX_REVENUE: TaxDistribution = TaxDistribution::new(300.0, 290.0, 20.0, 11.0, 9.0);
const INHERITANCE_REFORM_REVENUE: TaxDistribution =
    TaxDistribution::new(300.0, 290.0, 0.0, 11.0, 20.0);

pub fn builtin_scenarios() -> Result<Vec<TaxScenario>> {
    Ok(vec![
        status_quo()?,
        flat_tax()?,
        wealth_tax()?,
        inheritance_reform()?,
    ])
}

pub fn status_quo() -> Result<TaxScenario> {
    TaxScenario::new(
        STATUS_QUO_ID,
        "Status quo",
        "Progressive income tax, class-based inheritance tax with company relief, \
         flat tax on capital income, no wealth tax.",
        ScenarioRules {
            income: income_levy()?,
            inheritance: class_inheritance_rule()?,
            wealth: Levy::Exempt,
            wealth_income: capital_income_levy()?,
            vat_rate: None,
            reference_distribution: Some(STATUS_QUO_REVENUE),
        },
    )
}

pub fn flat_tax() -> Result<TaxScenario> {
    TaxScenario::new(
        FLAT_TAX_ID,
        "Flat tax",
        "One rate for income, capital income, inheritances and consumption, no allowances.",
        ScenarioRules {
            income: Levy::Flat {
                rate: FLAT_TAX_RATE,
            },
            inheritance: InheritanceTaxRule::uniform(
                BracketSchedule::flat("flat-tax.inheritance", FLAT_TAX_RATE)?,
                ClassAllowances::NONE,
                0.0,
                InheritanceAssessment::Separate,
            ),
            wealth: Levy::Exempt,
            wealth_income: Levy::Flat {
                rate: FLAT_TAX_RATE,
            },
            vat_rate: Some(FLAT_TAX_RATE),
            reference_distribution: Some(FLAT_TAX_REVENUE),
        },
    )
}

pub fn wealth_tax() -> Result<TaxScenario> {
    TaxScenario::new(
        WEALTH_TAX_ID,
        "Wealth tax",
        "Status quo plus an annual levy on wealth above a personal allowance.",
        ScenarioRules {
            income: income_levy()?,
            inheritance: class_inheritance_rule()?,
            wealth: Levy::Progressive(BracketSchedule::with_allowance(
                "wealth-tax.wealth",
                WEALTH_TAX_ALLOWANCE,
                WEALTH_TAX_RATE,
            )?),
            wealth_income: capital_income_levy()?,
            vat_rate: None,
            reference_distribution: Some(WEALTH_TAX_REVENUE),
        },
    )
}

pub fn inheritance_reform() -> Result<TaxScenario> {
    TaxScenario::new(
        INHERITANCE_REFORM_ID,
        "Inheritance reform",
        "Status quo income taxation with a single low inheritance rate above a \
         lifetime allowance and no company relief.",
        ScenarioRules {
            income: income_levy()?,
            inheritance: InheritanceTaxRule::uniform(
                BracketSchedule::with_allowance(
                    "inheritance-reform.inheritance",
                    0.0,
                    REFORM_INHERITANCE_RATE,
                )?,
                ClassAllowances::uniform(REFORM_INHERITANCE_ALLOWANCE),
                0.0,
                InheritanceAssessment::Joint,
            ),
            wealth: Levy::Exempt,
            wealth_income: capital_income_levy()?,
            vat_rate: None,
            reference_distribution: Some(INHERITANCE_REFORM_REVENUE),
        },
    )
}

fn income_levy() -> Result<Levy> {
    Ok(Levy::Progressive(BracketSchedule::new(
        "income",
        INCOME_BRACKETS.to_vec(),
    )?))
}

fn capital_income_levy() -> Result<Levy> {
    Ok(Levy::Progressive(BracketSchedule::with_allowance(
        "capital-income",
        CAPITAL_INCOME_ALLOWANCE,
        CAPITAL_INCOME_RATE,
    )?))
}

fn class_inheritance_rule() -> Result<InheritanceTaxRule> {
    Ok(InheritanceTaxRule {
        class_i: inheritance_schedule("inheritance.class-i", &INHERITANCE_RATES_I)?,
        class_ii: inheritance_schedule("inheritance.class-ii", &INHERITANCE_RATES_II)?,
        class_iii: inheritance_schedule("inheritance.class-iii", &INHERITANCE_RATES_III)?,
        allowances: STATUS_QUO_ALLOWANCES,
        company_relief: COMPANY_RELIEF,
        assessment: InheritanceAssessment::Joint,
    })
}

fn inheritance_schedule(name: &str, rates: &[f64; 7]) -> Result<BracketSchedule> {
    let mut brackets = INHERITANCE_LIMITS
        .iter()
        .zip(rates.iter())
        .map(|(&limit, &rate)| Bracket::capped(limit, rate))
        .collect::<Vec<_>>();
    brackets.push(Bracket::open(rates[INHERITANCE_LIMITS.len()]));
    BracketSchedule::new(name, brackets)
}
