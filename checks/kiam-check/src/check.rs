use std::fmt;

/// Result of one check run. Exactly one of these is reported per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    Failure(String),
}

impl CheckOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(reason) => write!(f, "failure: {}", reason),
        }
    }
}

/// Applies the count policy to the listed functions.
///
/// With `expected_count` set, the number of functions must match it exactly.
/// Otherwise any non-empty listing passes.
pub fn evaluate<T>(functions: &[T], expected_count: usize) -> CheckOutcome {
    let found = functions.len();

    if expected_count != 0 {
        if found != expected_count {
            return CheckOutcome::failure(format!(
                "mismatching count of Lambdas -- expected {}, but got {}",
                expected_count, found
            ));
        }
        return CheckOutcome::Success;
    }

    if found != 0 {
        return CheckOutcome::Success;
    }

    CheckOutcome::failure("could not find any Lambdas")
}
