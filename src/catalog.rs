use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{Config, VARIANTS};
use crate::error::{ArchiverError, Result};
use crate::version::Version;

/// variant -> version -> mirror URLs. Key order is that of the file it was
/// loaded from, with new keys appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
  variants: Map<String, Value>,
}

impl Default for Catalog {
  fn default() -> Self {
    let mut variants = Map::new();
    for variant in VARIANTS {
      variants.insert(variant.name.to_string(), Value::Object(Map::new()));
    }
    Catalog { variants }
  }
}

impl Catalog {
  /// Takes a parsed `urls.json` as is, only checking its shape.
  pub fn from_value(value: Value, origin: &str) -> Result<Self> {
    let malformed = |message: String| ArchiverError::MalformedCatalog {
      path: origin.to_string(),
      message,
    };
    let mut variants = match value {
      Value::Object(map) => map,
      other => return Err(malformed(format!("expected an object, found {}", other))),
    };
    for (variant, versions) in variants.iter() {
      let versions = versions
        .as_object()
        .ok_or_else(|| malformed(format!("variant {:?} is not an object", variant)))?;
      for (version, urls) in versions {
        let is_url_list = urls
          .as_array()
          .map(|urls| urls.iter().all(Value::is_string))
          .unwrap_or(false);
        if !is_url_list {
          return Err(malformed(format!(
            "{} {} is not a list of URLs",
            variant, version
          )));
        }
      }
    }
    for variant in VARIANTS {
      if !variants.contains_key(variant.name) {
        variants.insert(variant.name.to_string(), Value::Object(Map::new()));
      }
    }
    Ok(Catalog { variants })
  }

  pub fn contains(&self, variant: &str, version: &Version) -> bool {
    self
      .variants
      .get(variant)
      .and_then(Value::as_object)
      .map(|versions| versions.contains_key(version.as_str()))
      .unwrap_or(false)
  }

  /// Records the URLs of a new version. An existing entry is never
  /// replaced; returns whether the catalog changed.
  pub fn insert(&mut self, variant: &str, version: &Version, urls: Vec<String>) -> bool {
    let versions = self
      .variants
      .entry(variant.to_string())
      .or_insert_with(|| Value::Object(Map::new()));
    let Some(versions) = versions.as_object_mut() else {
      return false;
    };
    if versions.contains_key(version.as_str()) {
      return false;
    }
    let urls = urls.into_iter().map(Value::String).collect();
    versions.insert(version.to_string(), Value::Array(urls));
    true
  }

  pub fn urls(&self, variant: &str, version: &str) -> Option<Vec<&str>> {
    let urls = self.variants.get(variant)?.get(version)?.as_array()?;
    Some(urls.iter().filter_map(Value::as_str).collect())
  }

  pub fn version_count(&self, variant: &str) -> usize {
    self
      .variants
      .get(variant)
      .and_then(Value::as_object)
      .map(Map::len)
      .unwrap_or(0)
  }

  pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    serde::Serialize::serialize(&self.variants, &mut ser)?;
    Ok(buf)
  }

  pub fn to_compact_json(&self) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, SpacedFormatter);
    serde::Serialize::serialize(&self.variants, &mut ser)?;
    Ok(buf)
  }
}

/// Single-line JSON with `", "` and `": "` separators, the layout the
/// existing `urls.min.json` history was written in.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
  fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
    if first {
      Ok(())
    } else {
      writer.write_all(b", ")
    }
  }

  fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
    if first {
      Ok(())
    } else {
      writer.write_all(b", ")
    }
  }

  fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
    writer.write_all(b": ")
  }
}

/// The two catalog files: indented `urls.json` and the single-line mirror.
#[derive(Debug, Clone)]
pub struct CatalogStore {
  urls_path: PathBuf,
  urls_min_path: PathBuf,
}

impl CatalogStore {
  pub fn new(urls_path: impl Into<PathBuf>, urls_min_path: impl Into<PathBuf>) -> Self {
    CatalogStore {
      urls_path: urls_path.into(),
      urls_min_path: urls_min_path.into(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.urls_path(), config.urls_min_path())
  }

  pub fn urls_path(&self) -> &Path {
    &self.urls_path
  }

  pub fn urls_min_path(&self) -> &Path {
    &self.urls_min_path
  }

  pub fn load(&self) -> Result<Catalog> {
    if !self.urls_path.exists() {
      debug!("no catalog at {}, starting empty", self.urls_path.display());
      return Ok(Catalog::default());
    }
    let payload = fs::read(&self.urls_path)?;
    let value: Value = serde_json::from_slice(&payload)?;
    Catalog::from_value(value, &self.urls_path.display().to_string())
  }

  pub fn save(&self, catalog: &Catalog) -> Result<()> {
    fs::write(&self.urls_path, catalog.to_pretty_json()?)?;
    fs::write(&self.urls_min_path, catalog.to_compact_json()?)?;
    Ok(())
  }
}
