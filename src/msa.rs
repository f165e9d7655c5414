//! Microsoft account sign-in for a public client.
//!
//! The token cache is a JSON blob persisted between runs so that unattended
//! runs can redeem the refresh token left behind by one interactive sign-in.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ArchiverError, Result};

/// Scopes requested on top of the caller's, so that an id token and a
/// refresh token come back.
const RESERVED_SCOPES: &[&str] = &["openid", "profile", "offline_access"];
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Cached access tokens closer than this to expiry are refreshed.
const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
  pub home_account_id: String,
  #[serde(default)]
  pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedAccessToken {
  secret: String,
  scopes: Vec<String>,
  expires_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
  account: Account,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  access_token: Option<CachedAccessToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
  #[serde(default)]
  entries: Vec<CacheEntry>,
}

impl TokenCache {
  /// Reads the persisted cache; a missing file is an empty cache.
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      debug!("no token cache at {}", path.display());
      return Ok(TokenCache::default());
    }
    let blob = fs::read_to_string(path)?;
    Self::deserialize(&blob).map_err(|e| ArchiverError::Cache {
      path: path.display().to_string(),
      message: e.to_string(),
    })
  }

  pub fn deserialize(blob: &str) -> std::result::Result<Self, serde_json::Error> {
    if blob.trim().is_empty() {
      return Ok(TokenCache::default());
    }
    serde_json::from_str(blob)
  }

  pub fn serialize(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn accounts(&self) -> Vec<Account> {
    self.entries.iter().map(|entry| entry.account.clone()).collect()
  }

  fn entry(&self, account: &Account) -> Option<&CacheEntry> {
    self
      .entries
      .iter()
      .find(|entry| entry.account.home_account_id == account.home_account_id)
  }

  fn store(&mut self, account: Account, response: &TokenResult, scopes: &[String]) {
    let access_token = match (&response.access_token, response.expires_in) {
      (Some(secret), Some(expires_in)) => Some(CachedAccessToken {
        secret: secret.clone(),
        scopes: scopes.to_vec(),
        expires_on: Utc::now() + chrono::Duration::seconds(expires_in),
      }),
      _ => None,
    };
    match self
      .entries
      .iter_mut()
      .find(|entry| entry.account.home_account_id == account.home_account_id)
    {
      Some(entry) => {
        if account.username.is_some() {
          entry.account.username = account.username;
        }
        if response.refresh_token.is_some() {
          entry.refresh_token = response.refresh_token.clone();
        }
        entry.access_token = access_token;
      }
      None => self.entries.push(CacheEntry {
        account,
        refresh_token: response.refresh_token.clone(),
        access_token,
      }),
    }
  }
}

/// Outcome of a token request: either an access token or the provider's
/// error payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenResult {
  pub access_token: Option<String>,
  pub refresh_token: Option<String>,
  pub id_token: Option<String>,
  pub expires_in: Option<i64>,
  pub error: Option<String>,
  pub error_description: Option<String>,
  pub correlation_id: Option<String>,
}

impl TokenResult {
  fn failure(error: &str, description: &str) -> Self {
    TokenResult {
      error: Some(error.to_string()),
      error_description: Some(description.to_string()),
      ..Default::default()
    }
  }

  /// The access token, or an `AuthRejected` error carrying whatever the
  /// provider reported.
  pub fn into_access_token(self) -> Result<String> {
    match self.access_token {
      Some(token) => Ok(token),
      None => Err(ArchiverError::AuthRejected {
        error: self.error.unwrap_or_else(|| "unknown_error".to_string()),
        description: self.error_description.unwrap_or_default(),
        correlation_id: self.correlation_id.unwrap_or_default(),
      }),
    }
  }
}

#[derive(Debug, Deserialize)]
struct DeviceCode {
  device_code: String,
  message: String,
  expires_in: i64,
  #[serde(default = "default_poll_interval")]
  interval: u64,
}

fn default_poll_interval() -> u64 {
  5
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
  oid: Option<String>,
  tid: Option<String>,
  sub: Option<String>,
  preferred_username: Option<String>,
}

/// Public (secretless) client bound to one client id and authority, with the
/// token cache attached.
pub struct PublicClient {
  client_id: String,
  authority: String,
  cache: TokenCache,
  cache_path: Option<PathBuf>,
  http: Client,
}

impl PublicClient {
  pub fn new(client_id: &str, authority: &str, cache: TokenCache, http: Client) -> Self {
    PublicClient {
      client_id: client_id.to_string(),
      authority: authority.trim_end_matches('/').to_string(),
      cache,
      cache_path: None,
      http,
    }
  }

  /// Rewrites the cache at `path` after every successful token acquisition.
  pub fn persist_cache_to(mut self, path: impl Into<PathBuf>) -> Self {
    self.cache_path = Some(path.into());
    self
  }

  pub fn accounts(&self) -> Vec<Account> {
    self.cache.accounts()
  }

  fn token_endpoint(&self) -> String {
    format!("{}/oauth2/v2.0/token", self.authority)
  }

  fn device_code_endpoint(&self) -> String {
    format!("{}/oauth2/v2.0/devicecode", self.authority)
  }

  fn scope_param(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    all.extend(RESERVED_SCOPES.iter().copied());
    all.join(" ")
  }

  pub fn acquire_token_silent(&mut self, scopes: &[String], account: &Account) -> Result<TokenResult> {
    let Some(entry) = self.cache.entry(account) else {
      return Ok(TokenResult::failure(
        "no_account",
        "the account is not in the token cache",
      ));
    };

    if let Some(cached) = &entry.access_token {
      let covers_scopes = scopes.iter().all(|scope| cached.scopes.contains(scope));
      if covers_scopes && cached.expires_on > Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) {
        debug!("using cached access token, valid until {}", cached.expires_on);
        let secret = cached.secret.clone();
        self.write_cache()?;
        return Ok(TokenResult {
          access_token: Some(secret),
          ..Default::default()
        });
      }
    }

    let Some(refresh_token) = entry.refresh_token.clone() else {
      return Ok(TokenResult::failure(
        "interaction_required",
        "no refresh token cached for the account",
      ));
    };

    debug!("redeeming refresh token at {}", self.token_endpoint());
    let scope = Self::scope_param(scopes);
    let result = self.post_token(&[
      ("client_id", self.client_id.as_str()),
      ("grant_type", "refresh_token"),
      ("refresh_token", refresh_token.as_str()),
      ("scope", scope.as_str()),
    ])?;
    if result.access_token.is_some() {
      // rotated tokens stay with the cached account, whatever id the id token yields
      let mut refreshed = account.clone();
      if refreshed.username.is_none() {
        refreshed.username = account_from_id_token(result.id_token.as_deref()).and_then(|a| a.username);
      }
      self.cache.store(refreshed, &result, scopes);
      self.write_cache()?;
    }
    Ok(result)
  }

  /// Device-code sign-in: prints the provider's instructions and polls until
  /// the user completes them, declines, or the code expires.
  pub fn acquire_token_interactive(&mut self, scopes: &[String]) -> Result<TokenResult> {
    let scope = Self::scope_param(scopes);
    let response = self
      .http
      .post(self.device_code_endpoint())
      .form(&[("client_id", self.client_id.as_str()), ("scope", scope.as_str())])
      .send()?;
    let status = response.status();
    let payload = response.text()?;
    let device_code: DeviceCode = match serde_json::from_str(&payload) {
      Ok(device_code) => device_code,
      Err(_) => {
        // error payloads share the token endpoint's shape
        if let Ok(result) = serde_json::from_str::<TokenResult>(&payload) {
          if result.error.is_some() {
            return Ok(result);
          }
        }
        if !status.is_success() {
          return Err(ArchiverError::HttpStatus {
            stage: "device code",
            status: status.as_u16(),
            body: payload,
          });
        }
        return Err(ArchiverError::MalformedResponse {
          stage: "device code",
          payload,
        });
      }
    };
    eprintln!("{}", device_code.message);

    let deadline = Utc::now() + chrono::Duration::seconds(device_code.expires_in);
    let mut interval = device_code.interval;
    loop {
      thread::sleep(Duration::from_secs(interval));
      let result = self.post_token(&[
        ("client_id", self.client_id.as_str()),
        ("grant_type", DEVICE_CODE_GRANT),
        ("device_code", device_code.device_code.as_str()),
      ])?;
      match result.error.as_deref() {
        Some("authorization_pending") if Utc::now() < deadline => continue,
        Some("slow_down") if Utc::now() < deadline => {
          interval += 5;
          continue;
        }
        _ => {}
      }
      if result.access_token.is_some() {
        let account = account_from_id_token(result.id_token.as_deref()).unwrap_or_else(|| Account {
          home_account_id: format!("{}.{}", self.client_id, self.cache.entries.len()),
          username: None,
        });
        info!(
          "signed in as {}",
          account.username.as_deref().unwrap_or(&account.home_account_id)
        );
        self.cache.store(account, &result, scopes);
        self.write_cache()?;
      }
      return Ok(result);
    }
  }

  fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResult> {
    let response = self.http.post(self.token_endpoint()).form(form).send()?;
    let status = response.status();
    let payload = response.text()?;
    match serde_json::from_str::<TokenResult>(&payload) {
      Ok(result) if result.access_token.is_some() || result.error.is_some() => Ok(result),
      _ if !status.is_success() => Err(ArchiverError::HttpStatus {
        stage: "token",
        status: status.as_u16(),
        body: payload,
      }),
      _ => Err(ArchiverError::MalformedResponse {
        stage: "token",
        payload,
      }),
    }
  }

  fn write_cache(&self) -> Result<()> {
    if let Some(path) = &self.cache_path {
      fs::write(path, self.cache.serialize()?)?;
      debug!("token cache written to {}", path.display());
    }
    Ok(())
  }
}

/// Identifies the signed-in account from the id token's payload. The token
/// comes straight from the token endpoint, so its signature is not checked.
fn account_from_id_token(id_token: Option<&str>) -> Option<Account> {
  use base64::Engine;

  let payload = id_token?.split('.').nth(1)?;
  let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
    .decode(payload.trim_end_matches('='))
    .ok()?;
  let claims: IdTokenClaims = serde_json::from_slice(&decoded).ok()?;
  let home_account_id = match (claims.oid, claims.tid) {
    (Some(oid), Some(tid)) => format!("{}.{}", oid, tid),
    (Some(oid), None) => oid,
    (None, _) => claims.sub?,
  };
  Some(Account {
    home_account_id,
    username: claims.preferred_username,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use base64::Engine;
  use pretty_assertions::assert_eq;
  use tempfile::tempdir;

  fn id_token(claims: &str) -> String {
    let encode = |s: &str| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(s);
    format!("{}.{}.sig", encode(r#"{"alg":"none"}"#), encode(claims))
  }

  fn scopes() -> Vec<String> {
    vec!["XboxLive.signin".to_string()]
  }

  fn cache_with(entry: CacheEntry) -> TokenCache {
    TokenCache { entries: vec![entry] }
  }

  fn account() -> Account {
    Account {
      home_account_id: "oid.tid".to_string(),
      username: Some("player@example.com".to_string()),
    }
  }

  // Nothing listens here; tests using it must not reach the network.
  fn offline_client(cache: TokenCache) -> PublicClient {
    PublicClient::new("client", "http://127.0.0.1:9/consumers", cache, Client::new())
  }

  #[test]
  fn missing_cache_file_is_empty_cache() {
    let dir = tempdir().unwrap();
    let cache = TokenCache::load(&dir.path().join("token_cache.bin")).unwrap();
    assert!(cache.accounts().is_empty());
  }

  #[test]
  fn garbage_cache_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("token_cache.bin");
    fs::write(&path, "not json").unwrap();
    assert!(matches!(TokenCache::load(&path), Err(ArchiverError::Cache { .. })));
  }

  #[test]
  fn cache_survives_serialization() {
    let cache = cache_with(CacheEntry {
      account: account(),
      refresh_token: Some("refresh".to_string()),
      access_token: None,
    });
    let blob = cache.serialize().unwrap();
    assert_eq!(TokenCache::deserialize(&blob).unwrap(), cache);
  }

  #[test]
  fn silent_reuses_unexpired_access_token() {
    let cache = cache_with(CacheEntry {
      account: account(),
      refresh_token: None,
      access_token: Some(CachedAccessToken {
        secret: "cached-token".to_string(),
        scopes: scopes(),
        expires_on: Utc::now() + chrono::Duration::hours(1),
      }),
    });
    let mut client = offline_client(cache);
    let result = client.acquire_token_silent(&scopes(), &account()).unwrap();
    assert_eq!(result.access_token.as_deref(), Some("cached-token"));
  }

  #[test]
  fn silent_without_refresh_token_requires_interaction() {
    let cache = cache_with(CacheEntry {
      account: account(),
      refresh_token: None,
      access_token: Some(CachedAccessToken {
        secret: "stale".to_string(),
        scopes: scopes(),
        expires_on: Utc::now() - chrono::Duration::hours(1),
      }),
    });
    let mut client = offline_client(cache);
    let result = client.acquire_token_silent(&scopes(), &account()).unwrap();
    assert_eq!(result.access_token, None);
    assert_eq!(result.error.as_deref(), Some("interaction_required"));
  }

  #[test]
  fn missing_access_token_becomes_auth_rejected() {
    let result = TokenResult {
      error: Some("invalid_grant".to_string()),
      error_description: Some("expired".to_string()),
      correlation_id: Some("c0ffee".to_string()),
      ..Default::default()
    };
    match result.into_access_token() {
      Err(ArchiverError::AuthRejected {
        error,
        description,
        correlation_id,
      }) => {
        assert_eq!(error, "invalid_grant");
        assert_eq!(description, "expired");
        assert_eq!(correlation_id, "c0ffee");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn account_is_read_from_id_token() {
    let token = id_token(r#"{"oid":"o1","tid":"t1","preferred_username":"player@example.com"}"#);
    assert_eq!(
      account_from_id_token(Some(&token)),
      Some(Account {
        home_account_id: "o1.t1".to_string(),
        username: Some("player@example.com".to_string()),
      })
    );
    assert_eq!(account_from_id_token(Some("no-dots")), None);
    assert_eq!(account_from_id_token(None), None);
  }

  #[test]
  fn store_keeps_old_refresh_token_when_none_is_returned() {
    let mut cache = cache_with(CacheEntry {
      account: account(),
      refresh_token: Some("old".to_string()),
      access_token: None,
    });
    let response = TokenResult {
      access_token: Some("fresh".to_string()),
      expires_in: Some(3600),
      ..Default::default()
    };
    cache.store(account(), &response, &scopes());
    let entry = cache.entry(&account()).unwrap();
    assert_eq!(entry.refresh_token.as_deref(), Some("old"));
    assert_eq!(entry.access_token.as_ref().map(|t| t.secret.as_str()), Some("fresh"));
  }
}
