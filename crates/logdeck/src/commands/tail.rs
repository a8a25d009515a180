//! Tail command implementation

use anyhow::Result;
use logdeck_core::{Cursor, SortOrder};
use logdeck_query::StreamEvent;
use tracing::debug;

use super::{build_engine, filter_spec, load_config, GlobalOpts};
use crate::cli::TailArgs;
use crate::output::{print_entry, print_event};

pub async fn execute(opts: &GlobalOpts, args: TailArgs) -> Result<()> {
    let config = load_config(opts)?;
    let engine = build_engine(&config)?;
    let spec = filter_spec(&args.filter, config.max_page_size)?;

    // Backlog and live stream split at the same line boundaries, so nothing
    // is printed twice or skipped in between.
    let mut backlog = Cursor::new(SortOrder::Desc);
    let mut live = Cursor::new(SortOrder::Asc);
    for (id, end) in engine.line_ends() {
        backlog.set_offset(id.clone(), end);
        live.set_offset(id, end);
    }

    if args.lines > 0 {
        let recent = spec
            .clone()
            .with_page_size(args.lines.min(config.max_page_size))
            .with_order(SortOrder::Desc)
            .with_cursor(backlog);
        let page = engine.execute(&recent)?;
        for entry in page.entries.iter().rev() {
            print_entry(entry);
        }
    }

    let mut subscription = engine.subscribe(spec.with_cursor(live))?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            event = subscription.next() => match event {
                Some(StreamEvent::Entry(entry)) => print_entry(&entry),
                Some(event) => print_event(&event),
                None => break,
            }
        }
    }

    subscription.cancel();
    Ok(())
}
