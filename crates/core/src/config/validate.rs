use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.qbittorrent.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "qbittorrent.url cannot be empty".to_string(),
        ));
    }

    if config.qbittorrent.category.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "qbittorrent.category cannot be empty".to_string(),
        ));
    }

    if let Err(e) = url::Url::parse(config.feed.site_url.trim()) {
        return Err(ConfigError::ValidationError(format!(
            "feed.site_url is not a valid URL: {}",
            e
        )));
    }

    let reconciler = &config.reconciler;
    if !(0.0..=1.0).contains(&reconciler.title_match_threshold) {
        return Err(ConfigError::ValidationError(format!(
            "reconciler.title_match_threshold must be within [0, 1], got {}",
            reconciler.title_match_threshold
        )));
    }
    if reconciler.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "reconciler.poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if reconciler.poll_interval_ms > reconciler.poll_timeout_ms {
        return Err(ConfigError::ValidationError(
            "reconciler.poll_interval_ms cannot exceed reconciler.poll_timeout_ms".to_string(),
        ));
    }
    if reconciler.item_concurrency == 0 || reconciler.job_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "reconciler concurrency cannot be 0".to_string(),
        ));
    }
    if reconciler.missing_files_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "reconciler.missing_files_page_size cannot be 0".to_string(),
        ));
    }
    if matches!(reconciler.announce_interval_secs, Some(0))
        || matches!(reconciler.import_interval_secs, Some(0))
    {
        return Err(ConfigError::ValidationError(
            "reconciler intervals cannot be 0".to_string(),
        ));
    }

    Ok(())
}
