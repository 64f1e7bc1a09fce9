use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Parsing and validation, decoupled from the real environment so tests can
/// feed a plain map.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let csv = |var: &str, default: &str, sep: char| -> Vec<String> {
        or_default(var, default)
            .split(sep)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    };

    let database_url = optional("DATABASE_URL");
    let env = parse_environment(&or_default("SHOPDIR_ENV", "development"))?;

    let bind_addr = or_default("SHOPDIR_BIND_ADDR", "0.0.0.0:8080")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("SHOPDIR_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("SHOPDIR_LOG_LEVEL", "info");
    let regions_path = PathBuf::from(or_default(
        "SHOPDIR_REGIONS_PATH",
        "./config/regions.yaml",
    ));
    let target_regions = csv("SHOPDIR_TARGET_REGIONS", "08", ',');

    let db_max_connections = parse_u32("SHOPDIR_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SHOPDIR_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SHOPDIR_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "SHOPDIR_DB_MIN_CONNECTIONS",
            format!("{db_min_connections} exceeds SHOPDIR_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }

    let scraper_request_timeout_secs = parse_u64("SHOPDIR_SCRAPER_REQUEST_TIMEOUT_SECS", "20")?;
    let scraper_user_agent = or_default(
        "SHOPDIR_SCRAPER_USER_AGENT",
        "shopdir/0.1 (store-directory-collector)",
    );
    let scraper_max_retries = parse_u32("SHOPDIR_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_ms = parse_u64("SHOPDIR_SCRAPER_RETRY_BACKOFF_BASE_MS", "500")?;

    let batch_size = usize::try_from(parse_u32("SHOPDIR_BATCH_SIZE", "500")?)
        .map_err(|e| invalid("SHOPDIR_BATCH_SIZE", e.to_string()))?;
    if batch_size == 0 {
        return Err(invalid("SHOPDIR_BATCH_SIZE", "must be at least 1".to_string()));
    }
    let run_timeout_secs = match parse_u64("SHOPDIR_RUN_TIMEOUT_SECS", "3300")? {
        0 => None,
        secs => Some(secs),
    };

    let geocoding_enabled = parse_bool("SHOPDIR_GEOCODING_ENABLED", "true")?;
    let google_maps_api_key = optional("GOOGLE_MAPS_API_KEY");
    if geocoding_enabled && google_maps_api_key.is_none() {
        return Err(ConfigError::MissingEnvVar("GOOGLE_MAPS_API_KEY".to_string()));
    }
    let geocoding_rate_limit = parse_u32("SHOPDIR_GEOCODING_RATE_LIMIT", "50")?;
    if geocoding_rate_limit == 0 {
        return Err(invalid(
            "SHOPDIR_GEOCODING_RATE_LIMIT",
            "must be at least 1".to_string(),
        ));
    }
    let geocode_not_found_ttl_hours = parse_u64("SHOPDIR_GEOCODE_NOT_FOUND_TTL_HOURS", "168")?;
    let geocode_found_ttl_days = match parse_u64("SHOPDIR_GEOCODE_FOUND_TTL_DAYS", "0")? {
        0 => None,
        days => Some(days),
    };

    let slack_webhook_url = optional("SLACK_WEBHOOK_URL");
    let slack_channel = optional("SHOPDIR_SLACK_CHANNEL");
    let api_keys = csv("SHOPDIR_API_KEYS", "", ',');
    let scrape_schedule = csv("SHOPDIR_SCRAPE_SCHEDULE", "", ';');

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        regions_path,
        target_regions,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        batch_size,
        run_timeout_secs,
        geocoding_enabled,
        google_maps_api_key,
        geocoding_rate_limit,
        geocode_not_found_ttl_hours,
        geocode_found_ttl_days,
        slack_webhook_url,
        slack_channel,
        api_keys,
        scrape_schedule,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SHOPDIR_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
