//! Xbox Live handshake: Microsoft account token -> user token -> XSTS token
//! for the update service, folded into one `Authorization` header value.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::{Config, CLIENT_ID, XBOX_LIVE_SCOPE};
use crate::error::{ArchiverError, Result};
use crate::msa::{PublicClient, TokenCache};

/// `XBL3.0 x={uhs};{token}`, valid for the rest of the run.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationHeader(String);

impl AuthorizationHeader {
  pub fn new(uhs: &str, token: &str) -> Self {
    AuthorizationHeader(format!("XBL3.0 x={};{}", uhs, token))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Debug for AuthorizationHeader {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("AuthorizationHeader(..)")
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenResponse {
  token: Option<String>,
  display_claims: Option<DisplayClaims>,
}

#[derive(Debug, Deserialize)]
struct DisplayClaims {
  #[serde(default)]
  xui: Vec<UserClaims>,
}

#[derive(Debug, Deserialize)]
struct UserClaims {
  uhs: Option<String>,
}

/// Error body of the Xbox token services, e.g. an account without an Xbox
/// profile.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxErrorResponse {
  #[serde(rename = "XErr")]
  xerr: Value,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  redirect: Option<String>,
}

fn post_json(http: &Client, url: &str, stage: &'static str, body: &Value) -> Result<(String, TokenResponse)> {
  let response = http.post(url).json(body).send()?;
  let status = response.status();
  let payload = response.text()?;
  if !status.is_success() {
    if let Ok(xerr) = serde_json::from_str::<XboxErrorResponse>(&payload) {
      let description = [xerr.message, xerr.redirect]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
      return Err(ArchiverError::AuthRejected {
        error: format!("XErr {}", xerr.xerr),
        description,
        correlation_id: String::new(),
      });
    }
    return Err(ArchiverError::HttpStatus {
      stage,
      status: status.as_u16(),
      body: payload,
    });
  }
  match serde_json::from_str::<TokenResponse>(&payload) {
    Ok(parsed) => Ok((payload, parsed)),
    Err(_) => Err(malformed(stage, payload)),
  }
}

fn malformed(stage: &'static str, payload: String) -> ArchiverError {
  error!("unexpected {} response: {}", stage, payload);
  ArchiverError::MalformedResponse { stage, payload }
}

/// Trades a Microsoft account access token for an Xbox Live user token.
pub fn authenticate_user(http: &Client, url: &str, msa_token: &str) -> Result<String> {
  let body = json!({
    "Properties": {
      "AuthMethod": "RPS",
      "SiteName": "user.auth.xboxlive.com",
      "RpsTicket": format!("d={}", msa_token)
    },
    "RelyingParty": "http://auth.xboxlive.com",
    "TokenType": "JWT"
  });
  let (payload, response) = post_json(http, url, "user authentication", &body)?;
  response.token.ok_or_else(|| malformed("user authentication", payload))
}

/// Trades a user token for an XSTS token scoped to the update service.
pub fn authorize_xsts(http: &Client, url: &str, user_token: &str) -> Result<AuthorizationHeader> {
  let body = json!({
    "Properties": {
      "SandboxId": "RETAIL",
      "UserTokens": [user_token]
    },
    "RelyingParty": "http://update.xboxlive.com",
    "TokenType": "JWT"
  });
  let (payload, response) = post_json(http, url, "XSTS authorization", &body)?;
  let uhs = response
    .display_claims
    .and_then(|claims| claims.xui.into_iter().next())
    .and_then(|claims| claims.uhs);
  match (uhs, response.token) {
    (Some(uhs), Some(token)) => Ok(AuthorizationHeader::new(&uhs, &token)),
    _ => Err(malformed("XSTS authorization", payload)),
  }
}

/// Gets a Microsoft account access token from the token cache, signing in
/// with a device code when the cache is empty and the run is interactive.
pub fn acquire_msa_token(config: &Config, http: &Client) -> Result<String> {
  let cache_path = config.token_cache_path();
  let cache = TokenCache::load(&cache_path)?;
  let mut app = PublicClient::new(CLIENT_ID, &config.endpoints.authority, cache, http.clone());
  if config.persist_changes {
    app = app.persist_cache_to(cache_path);
  }

  let scopes = vec![XBOX_LIVE_SCOPE.to_string()];
  let result = match app.accounts().first() {
    Some(account) => {
      debug!("acquiring token silently for {}", account.home_account_id);
      app.acquire_token_silent(&scopes, account)?
    }
    None if config.interactive => {
      info!("no cached account, starting device code sign-in");
      app.acquire_token_interactive(&scopes)?
    }
    None => return Err(ArchiverError::NoAccount),
  };
  let token = result.into_access_token()?;
  if config.interactive {
    debug!("access token {}...", token.chars().take(12).collect::<String>());
  }
  Ok(token)
}

/// Runs the whole handshake and returns the header for the packages service.
pub fn acquire_authorization_header(config: &Config, http: &Client) -> Result<AuthorizationHeader> {
  let msa_token = acquire_msa_token(config, http)?;
  let user_token = authenticate_user(http, &config.endpoints.user_authenticate, &msa_token)?;
  debug!("obtained Xbox Live user token");
  let header = authorize_xsts(http, &config.endpoints.xsts_authorize, &user_token)?;
  info!("obtained XSTS authorization");
  Ok(header)
}
