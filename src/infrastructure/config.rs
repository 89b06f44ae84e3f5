use crate::infrastructure::error::CalendarError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

const CALENDAR_JSON: &str = "calendar.json";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_LOG_FILTER: &str = "venue_calendar=info";

#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub api_base_url: Url,
    pub venue_timezone: Tz,
    pub yearly_overview_weekends_only: bool,
    pub request_timeout: Option<Duration>,
    pub log_filter: String,
}

impl CalendarConfig {
    /// The venue's local date at `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.venue_timezone).date_naive()
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("valid fixed base url"),
            venue_timezone: Tz::UTC,
            yearly_overview_weekends_only: true,
            request_timeout: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn default_file() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "apiBaseUrl": DEFAULT_API_BASE_URL,
        "venueTimezone": DEFAULT_TIMEZONE,
        "yearlyOverviewWeekendsOnly": true,
        "requestTimeoutSeconds": null,
        "logFilter": DEFAULT_LOG_FILTER
    })
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), CalendarError> {
    fs::create_dir_all(config_dir)?;
    let path = config_dir.join(CALENDAR_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_file())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, CalendarError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CalendarError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(CalendarError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn load_calendar_config(config_dir: &Path) -> Result<CalendarConfig, CalendarError> {
    let path = config_dir.join(CALENDAR_JSON);
    let raw = read_config(&path)?;
    let defaults = CalendarConfig::default();

    let api_base_url = match read_str(&raw, "apiBaseUrl") {
        Some(value) => parse_base_url(value)?,
        None => defaults.api_base_url,
    };

    let venue_timezone = match read_str(&raw, "venueTimezone") {
        Some(value) => value.parse::<Tz>().map_err(|error| {
            CalendarError::InvalidConfig(format!(
                "invalid venueTimezone '{value}' in {}: {error}",
                path.display()
            ))
        })?,
        None => defaults.venue_timezone,
    };

    let yearly_overview_weekends_only = raw
        .get("yearlyOverviewWeekendsOnly")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(defaults.yearly_overview_weekends_only);

    let request_timeout = match raw.get("requestTimeoutSeconds") {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => {
            let seconds = value.as_u64().filter(|seconds| *seconds > 0).ok_or_else(|| {
                CalendarError::InvalidConfig(format!(
                    "requestTimeoutSeconds must be a positive integer in {}",
                    path.display()
                ))
            })?;
            Some(Duration::from_secs(seconds))
        }
    };

    let log_filter = read_str(&raw, "logFilter")
        .map(ToOwned::to_owned)
        .unwrap_or(defaults.log_filter);

    Ok(CalendarConfig {
        api_base_url,
        venue_timezone,
        yearly_overview_weekends_only,
        request_timeout,
        log_filter,
    })
}

/// Parse the API base URL, forcing a trailing slash so relative joins keep
/// the base path.
pub fn parse_base_url(value: &str) -> Result<Url, CalendarError> {
    let value = value.trim();
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|error| CalendarError::InvalidConfig(format!("invalid apiBaseUrl '{value}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(CalendarError::InvalidConfig(format!(
            "apiBaseUrl '{value}' cannot be a base"
        )));
    }
    Ok(url)
}
