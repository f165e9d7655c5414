use tracing::info;

use crate::catalog::{Catalog, CatalogStore};
use crate::error::Result;
use crate::history::History;
use crate::packages::PackageFile;
use crate::version::{parse_version, Version};

/// A version added to the catalog during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
  pub variant: String,
  pub version: Version,
  pub url_count: usize,
}

/// Adds new versions to the catalog, saving and committing after each one,
/// and pushes once at the end if anything was committed.
pub struct ChangeRecorder<'a> {
  store: &'a CatalogStore,
  history: &'a mut dyn History,
  persist_changes: bool,
  recorded: Vec<Recorded>,
}

impl<'a> ChangeRecorder<'a> {
  pub fn new(store: &'a CatalogStore, history: &'a mut dyn History, persist_changes: bool) -> Self {
    ChangeRecorder {
      store,
      history,
      persist_changes,
      recorded: Vec::new(),
    }
  }

  /// Records every package of `variant` whose version the catalog lacks.
  /// Returns how many were new.
  pub fn record_packages(&mut self, catalog: &mut Catalog, variant: &str, packages: &[PackageFile]) -> Result<usize> {
    let mut added = 0;
    for package in packages {
      let version = parse_version(&package.file_name)?;
      info!("found {} {}", variant, version);
      if catalog.contains(variant, &version) {
        info!("already have {} {}, skipping", variant, version);
        continue;
      }

      let urls = package.urls();
      let url_count = urls.len();
      catalog.insert(variant, &version, urls);
      let message = format!("Add {} {}", variant, version);
      if self.persist_changes {
        self.store.save(catalog)?;
        self
          .history
          .commit(&[self.store.urls_path(), self.store.urls_min_path()], &message)?;
      } else {
        self.history.commit(&[], &message)?;
      }
      self.recorded.push(Recorded {
        variant: variant.to_string(),
        version,
        url_count,
      });
      added += 1;
    }
    Ok(added)
  }

  /// Pushes the accumulated commits, if any, and hands back what was added.
  pub fn finish(self) -> Result<Vec<Recorded>> {
    if !self.recorded.is_empty() {
      self.history.push()?;
    }
    Ok(self.recorded)
  }
}
