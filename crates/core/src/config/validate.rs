use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Pipeline batch size and lease timeout are positive
/// - Every enabled stage has a non-zero interval
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let pipeline = &config.pipeline;
    if pipeline.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.batch_size cannot be 0".to_string(),
        ));
    }

    if pipeline.lease_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.lease_timeout_secs cannot be 0".to_string(),
        ));
    }

    if pipeline.job_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.job_attempts cannot be 0".to_string(),
        ));
    }

    for (name, schedule) in pipeline.stages.iter() {
        if schedule.enabled && schedule.interval_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.stages.{}.interval_secs cannot be 0",
                name.config_key()
            )));
        }
    }

    Ok(())
}
