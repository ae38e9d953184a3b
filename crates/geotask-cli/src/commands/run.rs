//! Long-lived owner loop fed from stdin.
//!
//! Each input line is either a notification-action payload
//! (`{"notificationId": 1, "geofenceIds": ["home"]}`) or an answer to a
//! switch request (`yes <id>` / `no <id>`). Events and switch requests are
//! printed to stdout as JSON lines. EOF or `quit` stops the loop and saves the
//! scheduler snapshot.

use std::collections::HashMap;

use geotask_core::trigger::decode_notification_action;
use geotask_core::{Runtime, SwitchId, SwitchResponder};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::context::{save_snapshot, CliResult, Context};

enum Input {
    Payload(String),
    Answer(SwitchId, bool),
    Quit,
    Blank,
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    if line == "quit" {
        return Input::Quit;
    }
    let answer = line
        .split_once(' ')
        .and_then(|(word, id)| Some((word, id.trim().parse::<SwitchId>().ok()?)));
    match answer {
        Some(("yes", id)) => Input::Answer(id, true),
        Some(("no", id)) => Input::Answer(id, false),
        _ => Input::Payload(line.to_string()),
    }
}

pub async fn run() -> CliResult {
    let ctx = Context::open()?;
    let db = ctx.db.clone();
    let (runtime, handle, mut decisions) = Runtime::new(ctx.scheduler, &ctx.config);
    let mut events = handle.events().subscribe();
    let owner = tokio::spawn(runtime.run());

    let mut responders: HashMap<SwitchId, SwitchResponder> = HashMap::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Input::Blank => {}
                    Input::Quit => break,
                    Input::Answer(id, start_now) => match responders.remove(&id) {
                        Some(responder) => {
                            if !responder.resolve(start_now) {
                                warn!(switch_id = id, "switch request already settled");
                            }
                        }
                        None => warn!(switch_id = id, "no outstanding switch request"),
                    },
                    Input::Payload(raw) => {
                        let Some(message) = decode_notification_action(&raw) else {
                            continue;
                        };
                        let outcomes = handle.trigger(message).await?;
                        println!("{}", json!({ "type": "trigger", "outcomes": outcomes }));
                    }
                }
            }
            Some(decision) = decisions.recv() => {
                println!("{}", json!({ "type": "switch_request", "request": decision.request }));
                responders.insert(decision.responder.id(), decision.responder);
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    drop(responders);
    let scheduler = owner.await?;
    save_snapshot(&db, &scheduler.snapshot())?;
    info!("scheduler state saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_answers_and_payloads() {
        assert!(matches!(parse_line("yes 3"), Input::Answer(3, true)));
        assert!(matches!(parse_line(" no 12 "), Input::Answer(12, false)));
        assert!(matches!(parse_line("quit"), Input::Quit));
        assert!(matches!(parse_line("   "), Input::Blank));
        assert!(matches!(parse_line("yes please"), Input::Payload(_)));
        assert!(matches!(
            parse_line(r#"{"notificationId":1,"geofenceIds":["home"]}"#),
            Input::Payload(_)
        ));
    }
}
