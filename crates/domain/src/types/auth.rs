//! Session credentials

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bearer credential pair held by the session store
///
/// `Debug` redacts both tokens so credentials never reach logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    /// Absent when the session cannot be renewed
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: Some(refresh_token.into()) }
    }

    /// Credential without a refresh token
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: None }
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("{}{}", crate::constants::BEARER_PREFIX, self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header_value() {
        assert_eq!(Credential::new("abc", "r").bearer(), "Bearer abc");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", Credential::new("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let parsed: Credential =
            serde_json::from_str(r#"{"accessToken":"a"}"#).expect("refresh token optional");
        assert_eq!(parsed, Credential::access_only("a"));

        let json = serde_json::to_value(Credential::new("a", "r")).expect("serialize");
        assert_eq!(json, serde_json::json!({"accessToken": "a", "refreshToken": "r"}));
    }
}
