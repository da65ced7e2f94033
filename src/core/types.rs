use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};

/// Highest horizon age a projection accepts.
pub const MAX_HORIZON_AGE: u32 = 150;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TaxClass {
    I,
    II,
    III,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub name: String,
    pub icon: String,
    pub current_age: u32,
    pub initial_age: u32,
    pub current_income: f64,
    pub savings_rate: f64,
    /// Only bounded below by `initial_age`. An inheritance between
    /// `initial_age` and `current_age` is a past event replayed by the
    /// projection.
    pub inheritance_age: u32,
    pub inheritance_amount: f64,
}

impl Persona {
    /// Rejects out-of-range fields before any year is simulated.
    pub fn validate(&self) -> Result<()> {
        let fail = |field: &'static str, reason: &str| {
            Err(EngineError::InvalidPersona {
                field,
                reason: reason.to_string(),
            })
        };

        if !self.current_income.is_finite() || self.current_income < 0.0 {
            return fail("currentIncome", "must be a finite amount >= 0");
        }
        if !(0.0..=1.0).contains(&self.savings_rate) {
            return fail("savingsRate", "must be between 0 and 1");
        }
        if !self.inheritance_amount.is_finite() || self.inheritance_amount < 0.0 {
            return fail("inheritanceAmount", "must be a finite amount >= 0");
        }
        if self.inheritance_age < self.initial_age {
            return fail("inheritanceAge", "must be >= initialAge");
        }
        if self.current_age < self.initial_age {
            return fail("currentAge", "must be >= initialAge");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InheritanceTerms {
    pub tax_class: TaxClass,
    /// Fraction of the inheritance held as company assets.
    pub company_share: f64,
    pub hardship_exception: bool,
}

impl Default for InheritanceTerms {
    fn default() -> Self {
        Self {
            tax_class: TaxClass::I,
            company_share: 0.0,
            hardship_exception: false,
        }
    }
}

/// Engine-wide constants for one projection. Supplied whole by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub horizon_age: u32,
    pub assumed_growth_rate: f64,
    pub income_growth_rate: f64,
    pub vat_rate: f64,
    pub vat_applicable_rate: f64,
    pub allow_negative_wealth: bool,
    pub inheritance: InheritanceTerms,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_age: 90,
            assumed_growth_rate: 0.05,
            income_growth_rate: 0.0,
            vat_rate: 0.19,
            vat_applicable_rate: 0.7,
            allow_negative_wealth: false,
            inheritance: InheritanceTerms::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |field: &'static str, reason: &str| {
            Err(EngineError::InvalidConfig {
                field,
                reason: reason.to_string(),
            })
        };

        if self.horizon_age > MAX_HORIZON_AGE {
            return fail("horizonAge", &format!("must be <= {MAX_HORIZON_AGE}"));
        }

        if !self.assumed_growth_rate.is_finite() || self.assumed_growth_rate <= -1.0 {
            return fail("assumedGrowthRate", "must be finite and > -1");
        }
        if !self.income_growth_rate.is_finite() || self.income_growth_rate <= -1.0 {
            return fail("incomeGrowthRate", "must be finite and > -1");
        }
        if !(0.0..=1.0).contains(&self.vat_rate) {
            return fail("vatRate", "must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&self.vat_applicable_rate) {
            return fail("vatApplicableRate", "must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&self.inheritance.company_share) {
            return fail("inheritance.companyShare", "must be between 0 and 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyResult {
    pub age: u32,
    pub income: f64,
    pub income_tax: f64,
    /// Wealth at the end of the year.
    pub wealth: f64,
    pub wealth_growth: f64,
    pub wealth_income: f64,
    pub wealth_tax: f64,
    pub wealth_income_tax: f64,
    pub inheritance: f64,
    pub inheritance_tax: f64,
    pub vat: f64,
    /// After-tax income not saved. VAT is charged on top of it.
    pub spending: f64,
    pub tax: f64,
    pub tax_rate: f64,
}

/// Yearly results for one persona under one scenario, ordered by age.
/// Never empty: the projector refuses to build a zero-length result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeIncomeResult {
    scenario_id: String,
    years: Vec<YearlyResult>,
}

impl LifeIncomeResult {
    pub(crate) fn new(scenario_id: String, years: Vec<YearlyResult>) -> Result<Self> {
        if years.is_empty() {
            return Err(EngineError::EmptyResult);
        }
        Ok(Self { scenario_id, years })
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn years(&self) -> &[YearlyResult] {
        &self.years
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn year_at(&self, age: u32) -> Option<&YearlyResult> {
        let first = self.years.first()?.age;
        let index = age.checked_sub(first)? as usize;
        self.years.get(index)
    }

    pub fn terminal_wealth(&self) -> f64 {
        self.years.last().map(|y| y.wealth).unwrap_or(0.0)
    }

    pub fn lifetime_income(&self) -> f64 {
        self.years.iter().map(|y| y.income).sum()
    }

    pub fn tax_distribution(&self) -> TaxDistribution {
        TaxDistribution::from_years(&self.years)
    }

    /// Lifetime tax divided by lifetime gross income.
    pub fn effective_tax_rate(&self) -> f64 {
        let income = self.lifetime_income();
        if income > 0.0 {
            self.tax_distribution().total / income
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxDistribution {
    pub income_tax: f64,
    pub vat: f64,
    pub wealth_tax: f64,
    pub wealth_income_tax: f64,
    pub inheritance_tax: f64,
    pub total: f64,
}

impl TaxDistribution {
    pub const fn new(
        income_tax: f64,
        vat: f64,
        wealth_tax: f64,
        wealth_income_tax: f64,
        inheritance_tax: f64,
    ) -> Self {
        Self {
            income_tax,
            vat,
            wealth_tax,
            wealth_income_tax,
            inheritance_tax,
            total: income_tax + vat + wealth_tax + wealth_income_tax + inheritance_tax,
        }
    }

    pub fn from_years(years: &[YearlyResult]) -> Self {
        let mut income_tax = 0.0;
        let mut vat = 0.0;
        let mut wealth_tax = 0.0;
        let mut wealth_income_tax = 0.0;
        let mut inheritance_tax = 0.0;
        for year in years {
            income_tax += year.income_tax;
            vat += year.vat;
            wealth_tax += year.wealth_tax;
            wealth_income_tax += year.wealth_income_tax;
            inheritance_tax += year.inheritance_tax;
        }
        Self::new(income_tax, vat, wealth_tax, wealth_income_tax, inheritance_tax)
    }

    /// Component shares of the total; all zero when nothing was taxed.
    pub fn shares(&self) -> TaxDistribution {
        if self.total <= 0.0 {
            return TaxDistribution::default();
        }
        TaxDistribution::new(
            self.income_tax / self.total,
            self.vat / self.total,
            self.wealth_tax / self.total,
            self.wealth_income_tax / self.total,
            self.inheritance_tax / self.total,
        )
    }
}
