//! Sources command implementation

use anyhow::Result;

use super::{build_engine, load_config, GlobalOpts};
use crate::output::print_sources_table;

pub fn execute(opts: &GlobalOpts) -> Result<()> {
    let config = load_config(opts)?;
    let engine = build_engine(&config)?;
    print_sources_table(&engine.sources());
    Ok(())
}
