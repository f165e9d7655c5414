use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ArchiverError, Result};

lazy_static! {
  static ref RAW_VERSION_REGEX: Regex = Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)(?:\.|$)").unwrap();
}

/// A normalized `major.minor.build.revision` version, as used for catalog keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(String);

impl Version {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Extracts the version out of a package file name such as
/// `Minecraft_1.2.31045.0_x64.msixvc`.
///
/// The store packs build and revision into the third segment of the raw
/// version, with the revision taking the last two digits: `31045` is build
/// `310`, revision `45`.
pub fn parse_version(file_name: &str) -> Result<Version> {
  let malformed = || ArchiverError::MalformedFilename {
    file_name: file_name.to_string(),
  };
  let raw_version = file_name.split('_').nth(1).ok_or_else(malformed)?;
  let cap = RAW_VERSION_REGEX.captures(raw_version).ok_or_else(malformed)?;
  let major = &cap[1];
  let minor = &cap[2];
  let combined = format!("{:0>2}", &cap[3]);

  let (build, revision) = combined.split_at(combined.len() - 2);
  let build = if build.is_empty() { "0" } else { build };
  let revision = match revision.trim_start_matches('0') {
    "" => "0",
    trimmed => trimmed,
  };
  Ok(Version(format!("{}.{}.{}.{}", major, minor, build, revision)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parsed(file_name: &str) -> String {
    parse_version(file_name).unwrap().to_string()
  }

  #[test]
  fn splits_combined_segment_into_build_and_revision() {
    assert_eq!(parsed("Minecraft_1.2.31045.0_x64.msixvc"), "1.2.310.45");
    assert_eq!(parsed("Microsoft.MinecraftUWP_1.21.4401.0_x64.msixvc"), "1.21.44.1");
  }

  #[test]
  fn pads_short_combined_segment() {
    assert_eq!(parsed("Minecraft_1.0.5.0_x64.msixvc"), "1.0.0.5");
    assert_eq!(parsed("Minecraft_1.0.0.0_x64.msixvc"), "1.0.0.0");
  }

  #[test]
  fn zero_revision_is_kept_as_zero() {
    assert_eq!(parsed("Minecraft_1.20.100.0_x64.msixvc"), "1.20.1.0");
    assert_eq!(parsed("Minecraft_1.20.7300.0_x64.msixvc"), "1.20.73.0");
  }

  #[test]
  fn raw_version_without_fourth_segment() {
    assert_eq!(parsed("Minecraft_1.21.5001_x64.msixvc"), "1.21.50.1");
  }

  #[test]
  fn rejects_malformed_names() {
    for name in [
      "Minecraft.msixvc",
      "Minecraft_1.2_x64.msixvc",
      "Minecraft_beta.2.3.0_x64.msixvc",
      "Minecraft_1.2.3a.0_x64.msixvc",
      "Minecraft_1.2.\u{0967}.0_x64.msixvc",
      "Minecraft_\u{0661}.2.31045.0_x64.msixvc",
    ] {
      assert!(
        matches!(parse_version(name), Err(ArchiverError::MalformedFilename { .. })),
        "{} should be rejected",
        name
      );
    }
  }
}
