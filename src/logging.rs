use anyhow::{Result, anyhow};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when neither `--log-level` nor `PROVQL_LOG` is given.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Install a stderr subscriber filtered by `directive` (an `EnvFilter` string
/// such as `debug` or `provql::sql=debug,info`).
pub fn init_logging(directive: Option<&str>) -> Result<()> {
    let directive = directive.unwrap_or(DEFAULT_LOG_LEVEL);
    let env_filter = EnvFilter::try_new(directive)
        .map_err(|err| anyhow!("invalid log level '{directive}': {err}"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()
        .map_err(|err| anyhow!("logging already initialised: {err}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directive() {
        let err = init_logging(Some("provql=notalevel")).unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }
}
