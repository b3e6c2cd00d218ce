//! Credential checks and the warp filters that apply them
//!
//! Two independent schemes exist and each route picks one:
//! an access token compared by plain equality, accepted from the query
//! string, a header or a cookie; and HTTP Basic credentials compared in
//! constant time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rlserve_core::{AuthFailure, Result, ServeError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use warp::http::header::{HeaderMap, COOKIE};
use warp::{Filter, Rejection};

use crate::web::reject;

/// Expected secrets for both schemes
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    /// Query parameter, header and cookie name carrying the token
    pub api_key_name: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key_name", &self.api_key_name)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Token values found on each channel of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeyCandidates {
    pub query: Option<String>,
    pub header: Option<String>,
    pub cookie: Option<String>,
}

impl ApiKeyCandidates {
    /// Pull the named token out of the query, headers and cookies
    #[must_use]
    pub fn from_request(name: &str, query: &HashMap<String, String>, headers: &HeaderMap) -> Self {
        Self {
            query: query.get(name).cloned(),
            header: headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            cookie: headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .find_map(|cookies| find_cookie(cookies, name)),
        }
    }
}

fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Accept the first channel whose token equals `expected`
pub fn check_api_key(candidates: &ApiKeyCandidates, expected: &str) -> Result<String> {
    [&candidates.query, &candidates.header, &candidates.cookie]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.as_str() == expected)
        .cloned()
        .ok_or(ServeError::Unauthorized(AuthFailure::ApiKey))
}

/// Byte comparison whose running time depends only on the input lengths
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len_diff = a.len() ^ b.len();
    let byte_diff = a
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    len_diff == 0 && byte_diff == 0
}

/// Decode an `Authorization: Basic ...` header value
#[must_use]
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Check Basic credentials against the configured pair
pub fn verify_basic(header: Option<&str>, username: &str, password: &str) -> Result<()> {
    let (user, pass) = header
        .and_then(parse_basic)
        .ok_or(ServeError::Unauthorized(AuthFailure::Basic))?;

    // Evaluate both comparisons so timing does not reveal which one failed.
    let user_ok = constant_time_eq(user.as_bytes(), username.as_bytes());
    let pass_ok = constant_time_eq(pass.as_bytes(), password.as_bytes());
    if user_ok & pass_ok {
        Ok(())
    } else {
        Err(ServeError::Unauthorized(AuthFailure::Basic))
    }
}

/// Filter extracting the accepted access token, rejecting with 403
pub fn api_key(
    credentials: Arc<Credentials>,
) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::query::<HashMap<String, String>>()
        .and(warp::header::headers_cloned())
        .and_then(move |query: HashMap<String, String>, headers: HeaderMap| {
            let credentials = credentials.clone();
            async move {
                let candidates =
                    ApiKeyCandidates::from_request(&credentials.api_key_name, &query, &headers);
                check_api_key(&candidates, &credentials.api_key).map_err(|e| {
                    warn!("rejected request with invalid access token");
                    reject(e)
                })
            }
        })
}

/// Filter enforcing HTTP Basic credentials, rejecting with 401
pub fn basic_auth(
    credentials: Arc<Credentials>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let credentials = credentials.clone();
            async move {
                verify_basic(
                    header.as_deref(),
                    &credentials.username,
                    &credentials.password,
                )
                .map_err(|e| {
                    warn!("rejected request with invalid basic credentials");
                    reject(e)
                })
            }
        })
        .untuple_one()
}
