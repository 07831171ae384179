//! Sites command implementation

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use vigil_engine::backend::fixture::FixtureFile;
use vigil_engine::housekeeping::Housekeeping;

#[derive(Args, Debug)]
pub struct SitesArgs {
    /// JSON fixture with rules
    #[arg(short, long)]
    pub fixture: PathBuf,
}

pub async fn run(args: SitesArgs) -> Result<()> {
    let (store, _) = FixtureFile::load(&args.fixture)?.into_parts();
    let sites = Housekeeping::new(Arc::new(store)).site_ids_with_alerts().await?;

    if sites.is_empty() {
        println!("No site has alerts.");
        return Ok(());
    }
    for site in sites {
        println!("{}", site);
    }
    Ok(())
}
