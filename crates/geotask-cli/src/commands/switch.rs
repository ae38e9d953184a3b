use chrono::Utc;
use clap::Subcommand;
use geotask_core::SwitchId;
use serde_json::json;

use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum SwitchAction {
    /// List outstanding switch requests
    List,
    /// Answer a switch request
    Resolve {
        /// Switch request ID
        id: SwitchId,
        /// Start the candidate now
        #[arg(long, conflicts_with = "defer")]
        start: bool,
        /// Keep the candidate deferred
        #[arg(long)]
        defer: bool,
    },
}

pub async fn run(action: SwitchAction) -> CliResult {
    let mut ctx = Context::open()?;
    match action {
        SwitchAction::List => print_json(&ctx.scheduler.outstanding_switches())?,
        SwitchAction::Resolve { id, start, defer } => {
            if start == defer {
                return Err("pass exactly one of --start or --defer".into());
            }
            let started = ctx.scheduler.resolve_switch(id, start, Utc::now())?;
            ctx.save()?;
            print_json(&json!({ "switch_id": id, "started": started }))?;
        }
    }
    Ok(())
}
