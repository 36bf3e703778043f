use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
pub fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

pub fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

pub fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Active profile name from `FEDQUERY_PROFILE`, uppercased (empty = default).
pub fn active_profile() -> String {
    env_or("FEDQUERY_PROFILE", "").to_uppercase()
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    pub fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_server_env() {
        for k in ["FEDQUERY_PROFILE", "HOST", "PORT", "CORS_ORIGIN", "PROD_PORT"] {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_server_env();

        let cfg = ServerConfig::from_env_profiled("");

        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.cors_origin, "*");
    }

    #[test]
    fn from_env_reads_vars() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_server_env();

        env::set_var("HOST", "127.0.0.1");
        env::set_var("PORT", "8080");

        let cfg = ServerConfig::from_env_profiled("");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);

        clear_server_env();
    }

    #[test]
    fn profiled_env_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_server_env();

        env::set_var("PORT", "8080");
        env::set_var("PROD_PORT", "9090");

        let cfg = ServerConfig::from_env_profiled("PROD");
        assert_eq!(cfg.port, 9090);

        clear_server_env();
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_server_env();

        env::set_var("PORT", "not_a_number");

        let cfg = ServerConfig::from_env_profiled("");
        assert_eq!(cfg.port, 3000);

        clear_server_env();
    }

    #[test]
    fn empty_env_var_is_treated_as_unset() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_server_env();

        env::set_var("HOST", "");

        let cfg = ServerConfig::from_env_profiled("");
        assert_eq!(cfg.host, "0.0.0.0");

        clear_server_env();
    }
}
