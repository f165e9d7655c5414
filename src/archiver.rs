use reqwest::blocking::Client;
use tracing::info;

use crate::catalog::CatalogStore;
use crate::config::{Config, USER_AGENT, VARIANTS};
use crate::error::Result;
use crate::history::History;
use crate::packages::fetch_package_files;
use crate::recorder::{ChangeRecorder, Recorded};
use crate::xbox::acquire_authorization_header;

pub fn http_client() -> Result<Client> {
  Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// One archiving pass: authenticate, list every tracked variant, record
/// what is new and push once. The first error ends the run.
pub fn run(config: &Config, http: &Client, history: &mut dyn History) -> Result<Vec<Recorded>> {
  let store = CatalogStore::from_config(config);
  let mut catalog = store.load()?;

  let authorization = acquire_authorization_header(config, http)?;

  let mut recorder = ChangeRecorder::new(&store, history, config.persist_changes);
  for variant in VARIANTS {
    let packages = fetch_package_files(http, &config.endpoints, variant.content_id, &authorization)?;
    info!("{} lists {} package files", variant.name, packages.len());
    recorder.record_packages(&mut catalog, variant.name, &packages)?;
  }
  let recorded = recorder.finish()?;
  info!("recorded {} new versions", recorded.len());
  Ok(recorded)
}
