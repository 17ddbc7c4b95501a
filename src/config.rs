//! Advisor configuration
//!
//! Economic assumptions and resource limits. Loaded from `ADVISOR_*`
//! environment variables, falling back to the documented defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AdvisorError;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorConfig {
    /// Annual inflation used to deflate projected totals
    pub inflation_rate: f64,
    /// Annual growth applied to a fund while it is being drawn down
    pub post_retirement_return: f64,
    /// Safe annual withdrawal fraction (the 4% rule)
    pub withdrawal_rule: f64,
    /// Depletion estimates stop after this many years
    pub depletion_cap_years: u32,
    /// Calculation results kept per session
    pub history_capacity: usize,
    /// Transcript messages kept per session
    pub transcript_capacity: usize,
    pub classifier_timeout: Duration,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            inflation_rate: 0.03,
            post_retirement_return: 0.04,
            withdrawal_rule: 0.04,
            depletion_cap_years: 100,
            history_capacity: 50,
            transcript_capacity: 200,
            classifier_timeout: Duration::from_secs(5),
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            inflation_rate: read_var("ADVISOR_INFLATION_RATE", defaults.inflation_rate)?,
            post_retirement_return: read_var(
                "ADVISOR_POST_RETIREMENT_RETURN",
                defaults.post_retirement_return,
            )?,
            withdrawal_rule: read_var("ADVISOR_WITHDRAWAL_RULE", defaults.withdrawal_rule)?,
            depletion_cap_years: read_var(
                "ADVISOR_DEPLETION_CAP_YEARS",
                defaults.depletion_cap_years,
            )?,
            history_capacity: read_var("ADVISOR_HISTORY_CAPACITY", defaults.history_capacity)?,
            transcript_capacity: read_var(
                "ADVISOR_TRANSCRIPT_CAPACITY",
                defaults.transcript_capacity,
            )?,
            classifier_timeout: Duration::from_millis(read_var(
                "ADVISOR_CLASSIFIER_TIMEOUT_MS",
                defaults.classifier_timeout.as_millis() as u64,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rate_ok = |r: f64| r.is_finite() && r > -1.0 && r < 1.0;

        if !rate_ok(self.inflation_rate) {
            return Err(config_error("inflation_rate", self.inflation_rate));
        }
        if !rate_ok(self.post_retirement_return) {
            return Err(config_error("post_retirement_return", self.post_retirement_return));
        }
        if !(self.withdrawal_rule.is_finite() && self.withdrawal_rule > 0.0 && self.withdrawal_rule <= 1.0) {
            return Err(config_error("withdrawal_rule", self.withdrawal_rule));
        }
        if self.depletion_cap_years == 0 {
            return Err(config_error("depletion_cap_years", 0));
        }
        if self.history_capacity == 0 {
            return Err(config_error("history_capacity", 0));
        }
        if self.transcript_capacity == 0 {
            return Err(config_error("transcript_capacity", 0));
        }
        Ok(())
    }
}

fn config_error(name: &str, value: impl std::fmt::Display) -> AdvisorError {
    AdvisorError::Config(format!("{} = {} is out of range", name, value))
}

fn read_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AdvisorError::Config(format!("{} could not be parsed: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
