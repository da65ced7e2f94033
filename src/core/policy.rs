use serde::Serialize;

use super::brackets::BracketSchedule;
use super::error::{EngineError, Result};
use super::types::{TaxClass, TaxDistribution};

/// The five-operation contract every scenario satisfies. Implementations
/// are pure: no call may depend on an earlier one, and all of them accept
/// any non-negative input.
pub trait TaxPolicy: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn calculate_income_tax(&self, income: f64) -> f64;

    fn calculate_inheritance_tax(
        &self,
        taxable_housing_and_financial: f64,
        taxable_company_assets: f64,
        has_hardship_exception: bool,
        tax_class: TaxClass,
    ) -> f64;

    fn calculate_wealth_tax(&self, wealth: f64) -> f64;

    fn calculate_wealth_income_tax(&self, wealth_income: f64) -> f64;

    /// VAT charged on top of net spending. Only the `vat_applicable_rate`
    /// share of spending carries VAT.
    fn calculate_vat(&self, spending: f64, vat_rate: f64, vat_applicable_rate: f64) -> f64;

    /// Scenario-specific VAT rate replacing the engine default.
    fn vat_rate_override(&self) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Levy {
    Exempt,
    Flat { rate: f64 },
    Progressive(BracketSchedule),
}

impl Levy {
    pub fn apply(&self, amount: f64) -> f64 {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        match self {
            Levy::Exempt => 0.0,
            Levy::Flat { rate } => amount * rate,
            Levy::Progressive(schedule) => schedule.evaluate(amount),
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if let Levy::Flat { rate } = self {
            if !rate.is_finite() || !(0.0..=1.0).contains(rate) {
                return Err(EngineError::InvalidBrackets {
                    schedule: label.to_string(),
                    reason: format!("flat rate {rate} must be between 0 and 1"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InheritanceAssessment {
    /// Both components summed and evaluated once.
    Joint,
    /// Each component evaluated on its own and the results added.
    Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAllowances {
    pub class_i: f64,
    pub class_ii: f64,
    pub class_iii: f64,
}

impl ClassAllowances {
    pub const NONE: ClassAllowances = ClassAllowances::uniform(0.0);

    pub const fn uniform(amount: f64) -> Self {
        Self {
            class_i: amount,
            class_ii: amount,
            class_iii: amount,
        }
    }

    pub fn for_class(&self, class: TaxClass) -> f64 {
        match class {
            TaxClass::I => self.class_i,
            TaxClass::II => self.class_ii,
            TaxClass::III => self.class_iii,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritanceTaxRule {
    pub class_i: BracketSchedule,
    pub class_ii: BracketSchedule,
    pub class_iii: BracketSchedule,
    pub allowances: ClassAllowances,
    /// Exempt fraction of company assets.
    pub company_relief: f64,
    pub assessment: InheritanceAssessment,
}

impl InheritanceTaxRule {
    /// One schedule shared by all classes.
    pub fn uniform(
        schedule: BracketSchedule,
        allowances: ClassAllowances,
        company_relief: f64,
        assessment: InheritanceAssessment,
    ) -> Self {
        Self {
            class_i: schedule.clone(),
            class_ii: schedule.clone(),
            class_iii: schedule,
            allowances,
            company_relief,
            assessment,
        }
    }

    pub fn schedule_for(&self, class: TaxClass) -> &BracketSchedule {
        match class {
            TaxClass::I => &self.class_i,
            TaxClass::II => &self.class_ii,
            TaxClass::III => &self.class_iii,
        }
    }

    /// The class allowance is used against housing and financial assets
    /// first; any remainder shields company assets.
    pub fn assess(
        &self,
        housing_and_financial: f64,
        company_assets: f64,
        has_hardship_exception: bool,
        class: TaxClass,
    ) -> f64 {
        if has_hardship_exception {
            return 0.0;
        }

        let housing = non_negative(housing_and_financial);
        let company = non_negative(company_assets) * (1.0 - self.company_relief);
        let allowance = self.allowances.for_class(class).max(0.0);
        let schedule = self.schedule_for(class);

        let housing_taxable = (housing - allowance).max(0.0);
        let allowance_left = (allowance - housing).max(0.0);
        let company_taxable = (company - allowance_left).max(0.0);

        match self.assessment {
            InheritanceAssessment::Joint => schedule.evaluate(housing_taxable + company_taxable),
            InheritanceAssessment::Separate => {
                schedule.evaluate(housing_taxable) + schedule.evaluate(company_taxable)
            }
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.company_relief) {
            return Err(EngineError::InvalidBrackets {
                schedule: format!("{label}.inheritance"),
                reason: format!(
                    "company relief {} must be between 0 and 1",
                    self.company_relief
                ),
            });
        }
        for (class, allowance) in [
            ("I", self.allowances.class_i),
            ("II", self.allowances.class_ii),
            ("III", self.allowances.class_iii),
        ] {
            if !allowance.is_finite() || allowance < 0.0 {
                return Err(EngineError::InvalidBrackets {
                    schedule: format!("{label}.inheritance"),
                    reason: format!("class {class} allowance must be >= 0"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRules {
    pub income: Levy,
    pub inheritance: InheritanceTaxRule,
    pub wealth: Levy,
    pub wealth_income: Levy,
    pub vat_rate: Option<f64>,
    pub reference_distribution: Option<TaxDistribution>,
}

/// A named, immutable tax regime assembled from data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxScenario {
    id: String,
    name: String,
    description: String,
    income: Levy,
    inheritance: InheritanceTaxRule,
    wealth: Levy,
    wealth_income: Levy,
    vat_rate: Option<f64>,
    reference_distribution: Option<TaxDistribution>,
}

impl TaxScenario {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        rules: ScenarioRules,
    ) -> Result<Self> {
        let id = id.into();
        rules.income.validate(&format!("{id}.income"))?;
        rules.wealth.validate(&format!("{id}.wealth"))?;
        rules.wealth_income.validate(&format!("{id}.wealthIncome"))?;
        rules.inheritance.validate(&id)?;
        if let Some(rate) = rules.vat_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(EngineError::InvalidBrackets {
                    schedule: format!("{id}.vat"),
                    reason: format!("vat rate {rate} must be between 0 and 1"),
                });
            }
        }

        Ok(Self {
            id,
            name: name.into(),
            description: description.into(),
            income: rules.income,
            inheritance: rules.inheritance,
            wealth: rules.wealth,
            wealth_income: rules.wealth_income,
            vat_rate: rules.vat_rate,
            reference_distribution: rules.reference_distribution,
        })
    }

    pub fn reference_distribution(&self) -> Option<TaxDistribution> {
        self.reference_distribution
    }

    pub fn inheritance_rule(&self) -> &InheritanceTaxRule {
        &self.inheritance
    }
}

impl TaxPolicy for TaxScenario {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn calculate_income_tax(&self, income: f64) -> f64 {
        self.income.apply(income)
    }

    fn calculate_inheritance_tax(
        &self,
        taxable_housing_and_financial: f64,
        taxable_company_assets: f64,
        has_hardship_exception: bool,
        tax_class: TaxClass,
    ) -> f64 {
        self.inheritance.assess(
            taxable_housing_and_financial,
            taxable_company_assets,
            has_hardship_exception,
            tax_class,
        )
    }

    fn calculate_wealth_tax(&self, wealth: f64) -> f64 {
        self.wealth.apply(wealth)
    }

    fn calculate_wealth_income_tax(&self, wealth_income: f64) -> f64 {
        self.wealth_income.apply(wealth_income)
    }

    fn calculate_vat(&self, spending: f64, vat_rate: f64, vat_applicable_rate: f64) -> f64 {
        let vat_bearing = non_negative(spending) * vat_applicable_rate.clamp(0.0, 1.0);
        vat_bearing * vat_rate.clamp(0.0, 1.0)
    }

    fn vat_rate_override(&self) -> Option<f64> {
        self.vat_rate
    }
}

fn non_negative(amount: f64) -> f64 {
    if amount.is_finite() { amount.max(0.0) } else { 0.0 }
}
