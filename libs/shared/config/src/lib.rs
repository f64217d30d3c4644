use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_EMERGENCY_BONUS: f64 = 1000.0;
pub const DEFAULT_TIE_BREAK_DELTA: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub server_port: u16,
    pub assignment_emergency_bonus: f64,
    pub assignment_tie_break_delta: f64,
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
            server_port: parse_or_default("SERVER_PORT", DEFAULT_SERVER_PORT),
            assignment_emergency_bonus: parse_checked(
                "ASSIGNMENT_EMERGENCY_BONUS",
                DEFAULT_EMERGENCY_BONUS,
                is_valid_emergency_bonus,
            ),
            assignment_tie_break_delta: parse_checked(
                "ASSIGNMENT_TIE_BREAK_DELTA",
                DEFAULT_TIE_BREAK_DELTA,
                is_valid_tie_break_delta,
            ),
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
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            server_port: DEFAULT_SERVER_PORT,
            assignment_emergency_bonus: DEFAULT_EMERGENCY_BONUS,
            assignment_tie_break_delta: DEFAULT_TIE_BREAK_DELTA,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// NaN or infinite bonuses poison every emergency composite.
pub fn is_valid_emergency_bonus(value: f64) -> bool {
    value.is_finite()
}

/// A NaN delta makes every candidate a near-tie; a negative one disables tie-breaking.
pub fn is_valid_tie_break_delta(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn parse_checked(key: &str, default: f64, is_valid: fn(f64) -> bool) -> f64 {
    let value = parse_or_default(key, default);
    if is_valid(value) {
        value
    } else {
        warn!("{} is out of range ({}), using default {}", key, value, default);
        default
    }
}
