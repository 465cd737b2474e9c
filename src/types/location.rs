//! Location parsing: token and error extraction from a confirmation URL.
//!
//! The identity provider delivers tokens either as query parameters or as
//! fragment parameters on the confirmation link. Both must be checked;
//! the fragment is consulted only when the query carries no tokens. An
//! explicit `error`/`error_description` pair anywhere on the URL is terminal
//! for the confirmation attempt regardless of any tokens present.

use regex_lite::Regex;
use std::sync::OnceLock;
use url::form_urlencoded;

/// The pieces of a context's location this crate cares about.
///
/// Deliberately not a full URL type: the host application hands these over
/// from whatever routing layer it uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationParts {
    /// Path component, e.g. `/confirm-email`.
    pub path: String,
    /// Raw query string without the leading `?`, if any.
    pub query: Option<String>,
    /// Raw fragment without the leading `#`, if any.
    pub fragment: Option<String>,
}

impl LocationParts {
    /// Location with only a path.
    pub fn path_only(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            fragment: None,
        }
    }

    /// Location with a path and query string.
    pub fn with_query(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Some(query.into()),
            fragment: None,
        }
    }

    /// Location with a path and fragment.
    pub fn with_fragment(path: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            fragment: Some(fragment.into()),
        }
    }
}

/// What was found on a confirmation URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedTokens {
    /// Access token, if present.
    pub access_token: Option<String>,
    /// Refresh token, if present.
    pub refresh_token: Option<String>,
    /// Provider error code, if present.
    pub error: Option<String>,
    /// Human-readable provider error, if present.
    pub error_description: Option<String>,
}

impl ExtractedTokens {
    /// Both tokens of the pair are present.
    pub fn has_token_pair(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// The provider reported an explicit error.
    pub fn has_error(&self) -> bool {
        self.error.is_some() || self.error_description.is_some()
    }

    /// Best available error message for display.
    pub fn error_message(&self) -> Option<&str> {
        self.error_description.as_deref().or(self.error.as_deref())
    }
}

/// Extract tokens and/or an error pair from a location.
///
/// Query parameters win; fragment parameters are used only when the query
/// carried no tokens. Errors are collected from both parts — an error in the
/// fragment still poisons a token pair found in the query.
pub fn extract_tokens(location: &LocationParts) -> ExtractedTokens {
    let from_query = parse_params(location.query.as_deref());
    let from_fragment = parse_params(location.fragment.as_deref());

    let (access_token, refresh_token) = if from_query.access_token.is_some()
        || from_query.refresh_token.is_some()
    {
        (from_query.access_token, from_query.refresh_token)
    } else {
        (from_fragment.access_token, from_fragment.refresh_token)
    };

    ExtractedTokens {
        access_token,
        refresh_token,
        error: from_query.error.or(from_fragment.error),
        error_description: from_query
            .error_description
            .or(from_fragment.error_description),
    }
}

fn parse_params(raw: Option<&str>) -> ExtractedTokens {
    let mut out = ExtractedTokens::default();
    let Some(raw) = raw else {
        return out;
    };

    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "access_token" => out.access_token = Some(value.into_owned()),
            "refresh_token" => out.refresh_token = Some(value.into_owned()),
            "error" => out.error = Some(value.into_owned()),
            "error_description" => out.error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    out
}

/// Normalize a location path for comparison: collapse duplicate slashes and
/// strip a trailing slash (except for the root path).
pub fn normalize_path(path: &str) -> String {
    static SLASHES: OnceLock<Regex> = OnceLock::new();
    let slashes = SLASHES.get_or_init(|| Regex::new("/{2,}").unwrap());

    let collapsed = slashes.replace_all(path, "/");
    let trimmed = collapsed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
