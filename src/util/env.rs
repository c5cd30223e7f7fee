//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load .env exactly once; fall back to the project root when the current
/// working directory has none. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Parse an env var, falling back to `default` when unset or malformed.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    init_env();
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Boolean env flag accepting 1/true/yes/on and 0/false/no/off.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    std::env::var(key)
        .ok()
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

/// Auth0 Management API base URL, from AUTH0_BASE_URL or AUTH0_DOMAIN.
pub fn auth0_base_url() -> anyhow::Result<String> {
    init_env();
    if let Ok(url) = std::env::var("AUTH0_BASE_URL") {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let domain = env_req("AUTH0_DOMAIN")?;
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        Ok(domain.to_string())
    } else {
        Ok(format!("https://{domain}"))
    }
}

/// Bearer token for the Auth0 Management API.
pub fn auth0_mgmt_token() -> anyhow::Result<String> {
    env_req("AUTH0_MGMT_TOKEN")
}

/// WorkOS secret API key.
pub fn workos_api_key() -> anyhow::Result<String> {
    env_req("WORKOS_API_KEY")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_on_garbage() {
        std::env::set_var("IDPM_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse("IDPM_TEST_PARSE", 7u64), 7);
        std::env::set_var("IDPM_TEST_PARSE", "42");
        assert_eq!(env_parse("IDPM_TEST_PARSE", 7u64), 42);
        std::env::remove_var("IDPM_TEST_PARSE");
    }

    #[test]
    fn flags_accept_common_spellings() {
        std::env::set_var("IDPM_TEST_FLAG", "on");
        assert!(env_flag("IDPM_TEST_FLAG", false));
        std::env::set_var("IDPM_TEST_FLAG", "0");
        assert!(!env_flag("IDPM_TEST_FLAG", true));
        std::env::remove_var("IDPM_TEST_FLAG");
    }

    #[test]
    fn auth0_domain_gets_a_scheme() {
        std::env::remove_var("AUTH0_BASE_URL");
        std::env::set_var("AUTH0_DOMAIN", "tenant.eu.auth0.com/");
        assert_eq!(auth0_base_url().unwrap(), "https://tenant.eu.auth0.com");
        std::env::remove_var("AUTH0_DOMAIN");
    }
}
