use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub port: u16,
    pub scheduling: SchedulingConfig,
}

/// Clinic opening hours, slot grid and booking window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
    pub min_lead_days: u32,
    pub max_horizon_months: u32,
    pub poll_interval_secs: u64,
    pub utc_offset_minutes: i32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 18,
            slot_minutes: 30,
            min_lead_days: 2,
            max_horizon_months: 3,
            poll_interval_secs: 30,
            utc_offset_minutes: 0,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            start_hour: parse_or("AGENDA_START_HOUR", defaults.start_hour),
            end_hour: parse_or("AGENDA_END_HOUR", defaults.end_hour),
            slot_minutes: parse_or("AGENDA_SLOT_MINUTES", defaults.slot_minutes),
            min_lead_days: parse_or("AGENDA_MIN_LEAD_DAYS", defaults.min_lead_days),
            max_horizon_months: parse_or("AGENDA_MAX_HORIZON_MONTHS", defaults.max_horizon_months),
            poll_interval_secs: parse_or("AGENDA_POLL_SECONDS", defaults.poll_interval_secs),
            utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Calendar date at the clinic right now.
    pub fn clinic_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.clinic_offset()).date_naive()
    }

    /// Fixed clinic offset, UTC when the configured minutes are out of range.
    pub fn clinic_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!("CLINIC_UTC_OFFSET_MINUTES out of range, falling back to UTC");
                Utc.fix()
            })
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, agenda poller will be disabled");
                    String::new()
                }),
            port: parse_or("PORT", 3000),
            scheduling: SchedulingConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_poller_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_role_key.is_empty()
    }
}
