//! Password cookie and cron bearer checks.
//!
//! With no `AUTH_PASSWORD` configured every request is allowed; with no
//! `CRON_SECRET` the cron route is open.

use sha2::{Digest, Sha256};
use shuttle_axum::axum::http::{header, HeaderMap};
use std::fmt::Write as _;

pub const AUTH_COOKIE: &str = "auth_token";
pub const COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

#[derive(Clone, Default)]
pub struct AuthConfig {
    password: Option<String>,
    cron_secret: Option<String>,
    secure_cookie: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<set>"))
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl AuthConfig {
    pub fn new(password: Option<String>, cron_secret: Option<String>) -> Self {
        Self {
            password: non_empty(password),
            cron_secret: non_empty(cron_secret),
            secure_cookie: false,
        }
    }

    /// `AUTH_PASSWORD`, `CRON_SECRET`; cookies are marked `Secure` outside
    /// local/dev Shuttle environments.
    pub fn from_env() -> Self {
        let mut cfg = Self::new(
            std::env::var("AUTH_PASSWORD").ok(),
            std::env::var("CRON_SECRET").ok(),
        );
        cfg.secure_cookie = !matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "" | "local" | "development" | "dev"
        );
        cfg
    }

    pub fn password_required(&self) -> bool {
        self.password.is_some()
    }

    /// Cookie value proving the password was entered.
    fn token(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"toolpulse-auth:");
        hasher.update(self.password.as_deref().unwrap_or_default().as_bytes());
        let mut out = String::with_capacity(64);
        for b in hasher.finalize().iter() {
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }

    pub fn check_password(&self, given: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(p) => given == Some(p.as_str()),
        }
    }

    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        if self.password.is_none() {
            return true;
        }
        cookie_value(headers, AUTH_COOKIE).is_some_and(|v| v == self.token())
    }

    pub fn cron_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = &self.cron_secret else {
            return true;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {secret}"))
    }

    pub fn login_cookie(&self) -> String {
        let mut c = format!(
            "{AUTH_COOKIE}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}",
            self.token()
        );
        if self.secure_cookie {
            c.push_str("; Secure");
        }
        c
    }

    pub fn logout_cookie(&self) -> String {
        format!("{AUTH_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_axum::axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.append(k.clone(), HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn open_without_password() {
        let auth = AuthConfig::new(None, Some("  ".into()));
        assert!(auth.is_authorized(&HeaderMap::new()));
        assert!(auth.cron_authorized(&HeaderMap::new()));
        assert!(auth.check_password(None));
    }

    #[test]
    fn cookie_must_carry_token() {
        let auth = AuthConfig::new(Some("hunter2".into()), None);
        assert!(!auth.is_authorized(&HeaderMap::new()));
        assert!(!auth.check_password(Some("nope")));
        assert!(auth.check_password(Some("hunter2")));

        let cookie = auth.login_cookie();
        let pair = cookie.split(';').next().unwrap();
        assert!(!pair.contains("hunter2"));
        let sent = format!("theme=dark; {pair}");
        let h = headers(&[(header::COOKIE, sent.as_str())]);
        assert!(auth.is_authorized(&h));

        let forged = headers(&[(header::COOKIE, "auth_token=authenticated")]);
        assert!(!auth.is_authorized(&forged));
    }

    #[test]
    fn cron_requires_bearer() {
        let auth = AuthConfig::new(None, Some("s3cret".into()));
        assert!(!auth.cron_authorized(&HeaderMap::new()));
        let h = headers(&[(header::AUTHORIZATION, "Bearer s3cret")]);
        assert!(auth.cron_authorized(&h));
        let h = headers(&[(header::AUTHORIZATION, "Bearer nope")]);
        assert!(!auth.cron_authorized(&h));
    }
}
