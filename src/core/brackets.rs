use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};

/// One slice of a progressive schedule. `upper_limit: None` is the open-ended
/// catch-all and must be the final entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    pub upper_limit: Option<f64>,
    pub marginal_rate: f64,
}

impl Bracket {
    pub const fn capped(upper_limit: f64, marginal_rate: f64) -> Self {
        Self {
            upper_limit: Some(upper_limit),
            marginal_rate,
        }
    }

    pub const fn open(marginal_rate: f64) -> Self {
        Self {
            upper_limit: None,
            marginal_rate,
        }
    }
}

/// A validated marginal-rate schedule. Construction is the only place a
/// malformed table can be reported, so evaluation itself never fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSchedule {
    name: String,
    brackets: Vec<Bracket>,
}

impl BracketSchedule {
    pub fn new(name: impl Into<String>, brackets: Vec<Bracket>) -> Result<Self> {
        let name = name.into();
        validate_brackets(&name, &brackets)?;
        Ok(Self { name, brackets })
    }

    pub fn flat(name: impl Into<String>, rate: f64) -> Result<Self> {
        Self::new(name, vec![Bracket::open(rate)])
    }

    /// Tax-free up to `allowance`, `rate` on everything above it.
    pub fn with_allowance(name: impl Into<String>, allowance: f64, rate: f64) -> Result<Self> {
        if allowance <= 0.0 {
            return Self::flat(name, rate);
        }
        Self::new(
            name,
            vec![Bracket::capped(allowance, 0.0), Bracket::open(rate)],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    pub fn evaluate(&self, amount: f64) -> f64 {
        evaluate(amount, &self.brackets)
    }

    /// Rate applied to the next unit above `amount`.
    pub fn marginal_rate_at(&self, amount: f64) -> f64 {
        let amount = amount.max(0.0);
        self.brackets
            .iter()
            .find(|b| b.upper_limit.is_none_or(|limit| amount < limit))
            .map(|b| b.marginal_rate)
            .unwrap_or(0.0)
    }
}

/// Progressive marginal evaluation. A boundary amount belongs to the bracket
/// whose limit it is; negative or non-finite amounts are taxed as zero.
pub fn evaluate(amount: f64, brackets: &[Bracket]) -> f64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0.0;
    }

    let mut tax = 0.0;
    let mut previous_limit = 0.0;
    for bracket in brackets {
        let limit = bracket.upper_limit.unwrap_or(f64::INFINITY);
        let slice = (amount.min(limit) - previous_limit).max(0.0);
        tax += slice * bracket.marginal_rate;
        if amount <= limit {
            break;
        }
        previous_limit = limit;
    }
    tax
}

fn validate_brackets(name: &str, brackets: &[Bracket]) -> Result<()> {
    let fail = |reason: String| EngineError::InvalidBrackets {
        schedule: name.to_string(),
        reason,
    };

    if brackets.is_empty() {
        return Err(fail("schedule has no brackets".to_string()));
    }

    let last_index = brackets.len() - 1;
    let mut previous_limit = 0.0;
    for (idx, bracket) in brackets.iter().enumerate() {
        if !bracket.marginal_rate.is_finite() || !(0.0..=1.0).contains(&bracket.marginal_rate) {
            return Err(fail(format!(
                "bracket {idx} rate {} must be between 0 and 1",
                bracket.marginal_rate
            )));
        }
        match bracket.upper_limit {
            Some(limit) => {
                if idx == last_index {
                    return Err(fail("last bracket must be open-ended".to_string()));
                }
                if !limit.is_finite() || limit <= previous_limit {
                    return Err(fail(format!(
                        "bracket {idx} limit {limit} must be finite and above {previous_limit}"
                    )));
                }
                previous_limit = limit;
            }
            None if idx != last_index => {
                return Err(fail(format!(
                    "bracket {idx} is open-ended but is not the last bracket"
                )));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn three_band() -> BracketSchedule {
        BracketSchedule::new(
            "three-band",
            vec![
                Bracket::capped(11_604.0, 0.0),
                Bracket::capped(17_005.0, 0.14),
                Bracket::open(0.24),
            ],
        )
        .expect("valid schedule")
    }

    #[test]
    fn evaluates_three_band_oracle_points() {
        let schedule = three_band();
        assert_approx(schedule.evaluate(11_604.0), 0.0);
        assert_approx(schedule.evaluate(17_005.0), (17_005.0 - 11_604.0) * 0.14);
        assert_approx(
            schedule.evaluate(20_000.0),
            (17_005.0 - 11_604.0) * 0.14 + (20_000.0 - 17_005.0) * 0.24,
        );
    }

    #[test]
    fn zero_and_negative_amounts_are_untaxed() {
        let schedule = three_band();
        assert_approx(schedule.evaluate(0.0), 0.0);
        assert_approx(schedule.evaluate(-5_000.0), 0.0);
        assert_approx(schedule.evaluate(f64::NAN), 0.0);
    }

    #[test]
    fn boundary_unit_uses_lower_bracket_rate() {
        let schedule = three_band();
        assert_approx(schedule.marginal_rate_at(11_603.0), 0.0);
        assert_approx(schedule.marginal_rate_at(11_604.0), 0.14);
        assert_approx(schedule.marginal_rate_at(1e12), 0.24);
    }

    #[test]
    fn flat_schedule_multiplies() {
        let schedule = BracketSchedule::flat("flat", 0.1613).expect("valid");
        assert_approx(schedule.evaluate(100_000.0), 16_130.0);
    }

    #[test]
    fn allowance_schedule_taxes_excess_only() {
        let schedule = BracketSchedule::with_allowance("allowance", 1_000.0, 0.25).expect("valid");
        assert_approx(schedule.evaluate(800.0), 0.0);
        assert_approx(schedule.evaluate(3_000.0), 500.0);
    }

    #[test]
    fn rejects_missing_open_ended_bracket() {
        let err = BracketSchedule::new("bad", vec![Bracket::capped(10_000.0, 0.1)])
            .expect_err("must reject");
        assert!(err.to_string().contains("open-ended"));
    }

    #[test]
    fn rejects_non_increasing_limits() {
        let err = BracketSchedule::new(
            "bad",
            vec![
                Bracket::capped(10_000.0, 0.1),
                Bracket::capped(10_000.0, 0.2),
                Bracket::open(0.3),
            ],
        )
        .expect_err("must reject");
        assert!(matches!(err, EngineError::InvalidBrackets { .. }));
    }

    #[test]
    fn rejects_open_bracket_before_the_end() {
        let err = BracketSchedule::new("bad", vec![Bracket::open(0.1), Bracket::open(0.2)])
            .expect_err("must reject");
        assert!(err.to_string().contains("not the last"));
    }

    #[test]
    fn rejects_out_of_range_rates_and_empty_tables() {
        assert!(BracketSchedule::flat("bad", 1.5).is_err());
        assert!(BracketSchedule::flat("bad", -0.1).is_err());
        assert!(BracketSchedule::new("bad", Vec::new()).is_err());
    }

    #[test]
    fn serializes_open_limit_as_null() {
        let json = serde_json::to_string(&three_band()).expect("serializes");
        assert!(json.contains("\"upperLimit\":null"));
        assert!(json.contains("\"marginalRate\":0.24"));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_tax_is_non_decreasing_in_amount(
            a in 0u32..400_000,
            delta in 0u32..400_000,
        ) {
            let schedule = three_band();
            let low = a as f64;
            let high = low + delta as f64;
            prop_assert!(schedule.evaluate(low) <= schedule.evaluate(high) + EPS);
        }

        #[test]
        fn prop_tax_is_continuous_at_each_limit(offset_cents in 1u32..100) {
            let schedule = three_band();
            let eps = offset_cents as f64 / 100.0;
            for limit in [11_604.0_f64, 17_005.0] {
                let below = schedule.evaluate(limit - eps);
                let at = schedule.evaluate(limit);
                let above = schedule.evaluate(limit + eps);
                prop_assert!((at - below).abs() <= eps * 0.24 + EPS);
                prop_assert!((above - at).abs() <= eps * 0.24 + EPS);
            }
        }

        #[test]
        fn prop_tax_never_exceeds_amount_times_top_rate(amount in 0u32..5_000_000) {
            let schedule = three_band();
            let amount = amount as f64;
            let tax = schedule.evaluate(amount);
            prop_assert!(tax >= 0.0);
            prop_assert!(tax <= amount * 0.24 + EPS);
        }
    }
}
