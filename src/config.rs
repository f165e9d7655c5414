//! Run configuration: which variants are tracked, where the services live,
//! and whether the run may prompt for sign-in or touch the disk and git.

use std::path::PathBuf;

use clap::Parser;

pub const URLS_FILEPATH: &str = "urls.json";
pub const URLS_MIN_FILEPATH: &str = "urls.min.json";
pub const TOKEN_CACHE_FILEPATH: &str = "token_cache.bin";

pub const CLIENT_ID: &str = "b3900558-4f9d-43ef-9db5-cfc7cb01874e";
pub const XBOX_LIVE_SCOPE: &str = "XboxLive.signin";
// The packages service rejects the default reqwest user agent.
pub const USER_AGENT: &str = "MinecraftBedrockArchiver/1.0";

/// A tracked product edition and the content id its packages are listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
  pub name: &'static str,
  pub content_id: &'static str,
}

pub const VARIANTS: &[Variant] = &[
  Variant {
    name: "release",
    content_id: "7792d9ce-355a-493c-afbd-768f4a77c3b0",
  },
  Variant {
    name: "preview",
    content_id: "98bd2335-9b01-4e4c-bd05-ccc01614078b",
  },
];

/// Base URLs of every remote service the run talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
  pub authority: String,
  pub user_authenticate: String,
  pub xsts_authorize: String,
  pub packages: String,
}

impl Default for Endpoints {
  fn default() -> Self {
    Self {
      authority: "https://login.microsoftonline.com/consumers".to_string(),
      user_authenticate: "https://user.auth.xboxlive.com/user/authenticate".to_string(),
      xsts_authorize: "https://xsts.auth.xboxlive.com/xsts/authorize".to_string(),
      packages: "https://packagespc.xboxlive.com".to_string(),
    }
  }
}

impl Endpoints {
  /// Points every service at one base URL, e.g. a local mock server.
  pub fn rooted_at(base_url: &str) -> Self {
    let base = base_url.trim_end_matches('/');
    Self {
      authority: format!("{}/consumers", base),
      user_authenticate: format!("{}/user/authenticate", base),
      xsts_authorize: format!("{}/xsts/authorize", base),
      packages: base.to_string(),
    }
  }

  pub fn base_package_url(&self, content_id: &str) -> String {
    format!("{}/GetBasePackage/{}", self.packages.trim_end_matches('/'), content_id)
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  /// Fall back to device-code sign-in when the cache holds no account.
  pub interactive: bool,
  /// Write the catalog and token cache, commit and push.
  pub persist_changes: bool,
  pub workdir: PathBuf,
  pub endpoints: Endpoints,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      interactive: false,
      persist_changes: true,
      workdir: PathBuf::from("."),
      endpoints: Endpoints::default(),
    }
  }
}

impl Config {
  pub fn urls_path(&self) -> PathBuf {
    self.workdir.join(URLS_FILEPATH)
  }

  pub fn urls_min_path(&self) -> PathBuf {
    self.workdir.join(URLS_MIN_FILEPATH)
  }

  pub fn token_cache_path(&self) -> PathBuf {
    self.workdir.join(TOKEN_CACHE_FILEPATH)
  }
}

#[derive(Parser, Debug)]
#[command(
  name = "archive_bedrock_urls",
  version,
  about = "Records download URLs of new Minecraft Bedrock packages into urls.json"
)]
pub struct Args {
  /// Sign in with a device code when no cached account exists
  #[arg(long, env = "ARCHIVER_INTERACTIVE")]
  pub interactive: bool,

  /// Do not write files, commit or push
  #[arg(long, env = "ARCHIVER_DRY_RUN")]
  pub dry_run: bool,

  /// Directory holding urls.json and the token cache (a git checkout)
  #[arg(long, env = "ARCHIVER_WORKDIR", default_value = ".")]
  pub workdir: PathBuf,

  /// Enable verbose logging
  #[arg(short, long)]
  pub verbose: bool,
}

impl From<Args> for Config {
  fn from(args: Args) -> Self {
    Self {
      interactive: args.interactive,
      persist_changes: !args.dry_run,
      workdir: args.workdir,
      endpoints: Endpoints::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_is_unattended_and_persistent() {
    let config = Config::default();
    assert!(!config.interactive);
    assert!(config.persist_changes);
    assert_eq!(config.urls_path(), PathBuf::from("./urls.json"));
  }

  #[test]
  fn dry_run_flag_disables_persistence() {
    let args = Args::parse_from(["archive_bedrock_urls", "--dry-run", "--interactive"]);
    let config = Config::from(args);
    assert!(config.interactive);
    assert!(!config.persist_changes);
  }

  #[test]
  fn package_url_is_templated_with_content_id() {
    let endpoints = Endpoints::default();
    assert_eq!(
      endpoints.base_package_url(VARIANTS[0].content_id),
      "https://packagespc.xboxlive.com/GetBasePackage/7792d9ce-355a-493c-afbd-768f4a77c3b0"
    );
  }

  #[test]
  fn rooted_endpoints_share_one_server() {
    let endpoints = Endpoints::rooted_at("http://127.0.0.1:8080/");
    assert_eq!(endpoints.authority, "http://127.0.0.1:8080/consumers");
    assert_eq!(endpoints.xsts_authorize, "http://127.0.0.1:8080/xsts/authorize");
    assert_eq!(endpoints.base_package_url("abc"), "http://127.0.0.1:8080/GetBasePackage/abc");
  }
}
