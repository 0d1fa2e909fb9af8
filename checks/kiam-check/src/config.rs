use bon::Builder;
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_AWS_REGION: &str = "us-west-2";

pub const AWS_REGION_ENV: &str = "AWS_REGION";
pub const LAMBDA_COUNT_ENV: &str = "LAMBDA_COUNT";
pub const DEBUG_ENV: &str = "DEBUG";

/// Settings for one check run, resolved once from the environment.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(on(String, into))]
pub struct RunConfig {
    /// Region queried for Lambda functions.
    #[builder(default = DEFAULT_AWS_REGION.to_string())]
    pub region: String,

    /// Exact number of functions to expect. Zero means any non-zero count passes.
    #[builder(default)]
    pub expected_count: usize,

    #[builder(default)]
    pub debug: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunConfig {
    /// Resolves the config through `lookup`. Absent and empty values both
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let debug = match read(DEBUG_ENV) {
            Some(value) => {
                parse_bool_literal(&value).ok_or(ConfigError::InvalidDebug(value))?
            }
            None => false,
        };

        let region = match read(AWS_REGION_ENV) {
            Some(region) => {
                info!("Parsed AWS_REGION: {}", region);
                region
            }
            None => DEFAULT_AWS_REGION.to_string(),
        };

        let expected_count = match read(LAMBDA_COUNT_ENV) {
            Some(value) => {
                let count = parse_lambda_count(value)?;
                info!("Parsed LAMBDA_COUNT: {}", count);
                count
            }
            None => 0,
        };

        Ok(Self {
            region,
            expected_count,
            debug,
        })
    }

    pub fn is_constrained(&self) -> bool {
        self.expected_count != 0
    }
}

fn parse_lambda_count(value: String) -> Result<usize, ConfigError> {
    let count = match value.parse::<i64>() {
        Ok(count) => count,
        Err(source) => return Err(ConfigError::InvalidLambdaCount { value, source }),
    };

    usize::try_from(count).map_err(|_| ConfigError::NegativeLambdaCount(count))
}

/// Accepts the usual boolean spellings: `1`, `t`, `true` and friends.
pub fn parse_bool_literal(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
