use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::Endpoints;
use crate::error::{ArchiverError, Result};
use crate::xbox::AuthorizationHeader;

pub const PACKAGE_EXTENSION: &str = ".msixvc";

/// One file of a base package listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageFile {
  pub file_name: String,
  #[serde(default)]
  pub cdn_root_paths: Vec<String>,
  pub relative_url: String,
}

impl PackageFile {
  /// One download URL per CDN mirror. The parts are joined as they come,
  /// the service already puts the slash on the relative side.
  pub fn urls(&self) -> Vec<String> {
    self
      .cdn_root_paths
      .iter()
      .map(|root| format!("{}{}", root, self.relative_url))
      .collect()
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BasePackage {
  package_files: Option<Vec<PackageFile>>,
}

/// Lists the installable package files of one content id.
pub fn fetch_package_files(
  http: &Client,
  endpoints: &Endpoints,
  content_id: &str,
  authorization: &AuthorizationHeader,
) -> Result<Vec<PackageFile>> {
  let url = endpoints.base_package_url(content_id);
  debug!("listing packages at {}", url);
  let response = http
    .get(&url)
    .header(reqwest::header::AUTHORIZATION, authorization.as_str())
    .send()?;
  let status = response.status();
  let payload = response.text()?;
  if !status.is_success() {
    return Err(ArchiverError::HttpStatus {
      stage: "package listing",
      status: status.as_u16(),
      body: payload,
    });
  }
  parse_package_listing(payload)
}

pub fn parse_package_listing(payload: String) -> Result<Vec<PackageFile>> {
  let files = match serde_json::from_str::<BasePackage>(&payload) {
    Ok(BasePackage {
      package_files: Some(files),
    }) => files,
    _ => {
      error!("unexpected package listing: {}", payload);
      return Err(ArchiverError::MalformedResponse {
        stage: "package listing",
        payload,
      });
    }
  };
  Ok(
    files
      .into_iter()
      .filter(|file| file.file_name.ends_with(PACKAGE_EXTENSION))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn keeps_only_package_archives() {
    let payload = r#"{
      "PackageFound": true,
      "PackageFiles": [
        {"FileName": "Minecraft_1.21.5001.0_x64.msixvc", "CdnRootPaths": ["http://a.cdn/", "http://b.cdn/"], "RelativeUrl": "pkg/file.msixvc"},
        {"FileName": "Minecraft_1.21.5001.0_x64.xsp", "CdnRootPaths": ["http://a.cdn/"], "RelativeUrl": "pkg/file.xsp"}
      ]
    }"#;
    let files = parse_package_listing(payload.to_string()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(
      files[0].urls(),
      vec!["http://a.cdn/pkg/file.msixvc", "http://b.cdn/pkg/file.msixvc"]
    );
  }

  #[test]
  fn missing_package_files_is_malformed() {
    let err = parse_package_listing(r#"{"PackageFound": false}"#.to_string()).unwrap_err();
    match err {
      ArchiverError::MalformedResponse { stage, payload } => {
        assert_eq!(stage, "package listing");
        assert!(payload.contains("PackageFound"));
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn urls_are_concatenated_without_normalization() {
    let file = PackageFile {
      file_name: "Minecraft_1.0.5.0_x64.msixvc".to_string(),
      cdn_root_paths: vec!["http://a.cdn".to_string()],
      relative_url: "path".to_string(),
    };
    assert_eq!(file.urls(), vec!["http://a.cdn".to_string() + "path"]);
  }
}
