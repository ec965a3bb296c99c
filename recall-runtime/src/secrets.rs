//! Credentials are read from the environment and never written to the
//! config file.

use recall_providers::rest_store::RestSession;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const REST_API_KEY_ENV: &str = "DAILYRECALL_REST_API_KEY";
pub const REST_ACCESS_TOKEN_ENV: &str = "DAILYRECALL_ACCESS_TOKEN";
pub const REST_USER_ID_ENV: &str = "DAILYRECALL_USER_ID";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub gemini_api_key: Option<String>,
    pub rest_api_key: Option<String>,
    pub rest_access_token: Option<String>,
    pub rest_user_id: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = |v: &Option<String>| if v.is_some() { "[REDACTED]" } else { "None" };
        f.debug_struct("Secrets")
            .field("gemini_api_key", &present(&self.gemini_api_key))
            .field("rest_api_key", &present(&self.rest_api_key))
            .field("rest_access_token", &present(&self.rest_access_token))
            .field("rest_user_id", &self.rest_user_id)
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            gemini_api_key: get(GEMINI_API_KEY_ENV),
            rest_api_key: get(REST_API_KEY_ENV),
            rest_access_token: get(REST_ACCESS_TOKEN_ENV),
            rest_user_id: get(REST_USER_ID_ENV),
        }
    }

    /// The signed-in REST principal, if both token and user id are set.
    pub fn rest_session(&self) -> Option<RestSession> {
        Some(RestSession {
            access_token: self.rest_access_token.clone()?,
            user_id: self.rest_user_id.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn blank_values_are_missing() {
        let s = Secrets::from_lookup(lookup(&[(GEMINI_API_KEY_ENV, "  ")]));
        assert_eq!(s.gemini_api_key, None);
    }

    #[test]
    fn rest_session_needs_token_and_user() {
        let s = Secrets::from_lookup(lookup(&[(REST_ACCESS_TOKEN_ENV, "tok")]));
        assert!(s.rest_session().is_none());

        let s = Secrets::from_lookup(lookup(&[
            (REST_ACCESS_TOKEN_ENV, "tok"),
            (REST_USER_ID_ENV, "u1"),
        ]));
        assert_eq!(s.rest_session().unwrap().user_id, "u1");
    }

    #[test]
    fn debug_output_hides_keys() {
        let s = Secrets::from_lookup(lookup(&[(GEMINI_API_KEY_ENV, "super-secret")]));
        assert!(!format!("{s:?}").contains("super-secret"));
    }
}
