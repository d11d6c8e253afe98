use std::env;

use chrono::NaiveTime;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub whatsapp_api_url: String,
    pub whatsapp_api_token: String,
    pub tuning: QueueTuning,
}

/// Tuning constants for the estimation engine and reminder dispatcher.
/// The defaults mirror the values the clinic has been running with; none
/// of them is derived from measurement, so they stay configurable.
#[derive(Debug, Clone)]
pub struct QueueTuning {
    /// Minutes of service time assumed per queue position.
    pub slot_minutes: i64,
    /// Minutes added to a scope's shared delay by the overdue sweep.
    pub overdue_increment_minutes: i64,
    /// Placeholder delay stored on rows admitted while global pending is active.
    pub pending_placeholder_delay_minutes: i64,
    /// How far before the estimated call time a reminder targets.
    pub reminder_lead_minutes: i64,
    /// Tolerance around the reminder target, in minutes (window is +/- this).
    pub reminder_tolerance_minutes: i64,
    /// Capacity used when auto-creating a missing weekly quota row.
    pub default_weekly_quota: i64,
    /// Base time for future-dated walk-in estimates.
    pub walk_in_day_start: NaiveTime,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self {
            slot_minutes: 15,
            overdue_increment_minutes: 5,
            pending_placeholder_delay_minutes: 15,
            reminder_lead_minutes: 10,
            reminder_tolerance_minutes: 1,
            default_weekly_quota: 20,
            walk_in_day_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        }
    }
}

impl QueueTuning {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            slot_minutes: env_i64("QUEUE_SLOT_MINUTES", defaults.slot_minutes),
            overdue_increment_minutes: env_i64(
                "QUEUE_OVERDUE_INCREMENT_MINUTES",
                defaults.overdue_increment_minutes,
            ),
            pending_placeholder_delay_minutes: env_i64(
                "QUEUE_PENDING_PLACEHOLDER_MINUTES",
                defaults.pending_placeholder_delay_minutes,
            ),
            reminder_lead_minutes: env_i64(
                "REMINDER_LEAD_MINUTES",
                defaults.reminder_lead_minutes,
            ),
            reminder_tolerance_minutes: env_i64(
                "REMINDER_TOLERANCE_MINUTES",
                defaults.reminder_tolerance_minutes,
            ),
            default_weekly_quota: env_i64("DEFAULT_WEEKLY_QUOTA", defaults.default_weekly_quota),
            walk_in_day_start: env::var("WALK_IN_DAY_START")
                .ok()
                .and_then(|v| NaiveTime::parse_from_str(&v, "%H:%M").ok())
                .unwrap_or(defaults.walk_in_day_start),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY").unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            }),
            whatsapp_api_url: env::var("WHATSAPP_API_URL").unwrap_or_else(|_| {
                warn!("WHATSAPP_API_URL not set, using empty value");
                String::new()
            }),
            whatsapp_api_token: env::var("WHATSAPP_API_TOKEN").unwrap_or_else(|_| {
                warn!("WHATSAPP_API_TOKEN not set, using empty value");
                String::new()
            }),
            tuning: QueueTuning::from_env(),
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

    pub fn is_whatsapp_configured(&self) -> bool {
        !self.whatsapp_api_url.is_empty() && !self.whatsapp_api_token.is_empty()
    }
}
