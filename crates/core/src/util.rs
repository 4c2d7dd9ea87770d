/// A macro to unwrap an option to its `Some` value, and bail out of the current
/// function with an [anyhow::Error] if not. Can only be used in functions that
/// return an [anyhow::Result].
#[macro_export]
macro_rules! unwrap_or_bail {
    ($opt:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        match $opt {
            Some(v) => v,
            None => return Err(anyhow::anyhow!($fmt $(, $arg)*)),
        }
    };
}

/// A macro to measure the evaluation time of an expression. Wraps an
/// expression, logs how long it took to evaluate (at debug level unless a
/// level is given), and evaluates to the value of the expression.
#[macro_export]
macro_rules! timed {
    ($label:expr, $ex:expr) => {
        $crate::timed!($label, log::Level::Debug, $ex)
    };
    ($label:expr, $log_level:expr, $ex:expr) => {{
        let now = std::time::Instant::now();
        let value = $ex;
        let elapsed = now.elapsed();
        log::log!($log_level, "{} took {} ms", $label, elapsed.as_millis());
        value
    }};
}

/// Format a float for use inside a configuration signature. This uses the
/// shortest representation that round-trips, so two different values never
/// format the same and the same value always formats identically.
pub fn fts(value: f64) -> String {
    // Normalize negative zero, otherwise 0.0 and -0.0 would produce different
    // signatures for interchangeable configs
    if value == 0.0 {
        "0".into()
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts() {
        assert_eq!(fts(0.0), "0");
        assert_eq!(fts(-0.0), "0");
        assert_eq!(fts(1.5), "1.5");
        assert_eq!(fts(0.1 + 0.2), "0.30000000000000004");
        assert_ne!(fts(1.0), fts(1.0 + f64::EPSILON));
    }
}
