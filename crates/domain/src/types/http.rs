//! Request verbs and the normalized response handed back to callers

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::impl_wire_name_conversions;

/// HTTP verbs the client issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl_wire_name_conversions!(HttpMethod {
    Get => "GET",
    Post => "POST",
    Put => "PUT",
    Patch => "PATCH",
    Delete => "DELETE",
});

impl HttpMethod {
    /// Whether a successful call changes server state
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// Successful response, body already decoded
///
/// `data` is the parsed JSON body; an empty body is `null` and a non-JSON
/// body is kept as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub data: serde_json::Value,
    pub status: u16,
    /// Header names are lower-cased
    pub headers: BTreeMap<String, String>,
}

impl NormalizedResponse {
    pub fn new(status: u16, data: serde_json::Value) -> Self {
        Self { data, status, headers: BTreeMap::new() }
    }

    /// Look up a header case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Decode the body into `T`
    ///
    /// `path` names the request in the error when the body does not match.
    pub fn json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        serde_json::from_value(self.data.clone()).map_err(|error| {
            ApiError::unknown(format!("Unexpected response body: {error}"), path)
                .with_details(self.data.clone())
        })
    }
}
