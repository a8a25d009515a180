//! Query command implementation

use anyhow::Result;
use logdeck_core::{Cursor, SortOrder};

use super::{build_engine, filter_spec, load_config, GlobalOpts};
use crate::cli::QueryArgs;
use crate::output::print_page;

pub fn execute(opts: &GlobalOpts, args: QueryArgs) -> Result<()> {
    let config = load_config(opts)?;
    let engine = build_engine(&config)?;

    let page_size = args.page_size.unwrap_or(config.default_page_size);
    let mut spec = filter_spec(&args.filter, page_size)?;

    let cursor = args.cursor.as_deref().map(Cursor::decode).transpose()?;
    let order = match (&args.order, &cursor) {
        (Some(order), _) => order.parse::<SortOrder>()?,
        (None, Some(cursor)) => cursor.order,
        (None, None) => SortOrder::Asc,
    };
    spec = spec.with_order(order);
    if let Some(cursor) = cursor {
        spec = spec.with_cursor(cursor);
    }

    let page = engine.execute(&spec)?;
    print_page(&page);
    Ok(())
}
