use std::io::BufRead;
use std::sync::Arc;

use clap::Args;
use coinroom_core::{
    ActivityBus, ActivityKind, Config, Event, Ledger, MemoryLedger, SessionHost, SessionSettings,
    TokioClock, UserId,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Args)]
pub struct RunArgs {
    #[arg(long)]
    user: UserId,
    /// Use an in-process ledger instead of the hosted one
    #[arg(long)]
    memory: bool,
    /// Starting balance of the in-process ledger
    #[arg(long, default_value_t = 0, requires = "memory")]
    balance: i64,
}

/// One line read from stdin.
enum Input {
    Interaction,
    /// `balance <n>` simulates a realtime push from the ledger.
    Balance(i64),
}

fn parse_line(line: &str) -> Input {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next().map(str::parse::<i64>)) {
        (Some("balance"), Some(Ok(value))) => Input::Balance(value),
        _ => Input::Interaction,
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let settings = SessionSettings::from(&config);
    let rt = super::runtime()?;

    if args.memory {
        let ledger = MemoryLedger::new().with_balance(&args.user, args.balance);
        rt.block_on(drive(Arc::new(ledger), args.user, settings))
    } else {
        let ledger = super::ledger::connect(&config)?;
        rt.block_on(drive(Arc::new(ledger), args.user, settings))
    }
}

async fn drive<L: Ledger + 'static>(
    ledger: Arc<L>,
    user: UserId,
    settings: SessionSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let bus = ActivityBus::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();
    let mut host = SessionHost::new(ledger, TokioClock::new(), settings)?.with_events(events_tx);
    host.sign_in(user, &bus).await?;

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if input_tx.send(parse_line(&line)).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            input = input_rx.recv() => match input {
                Some(Input::Interaction) => bus.emit(ActivityKind::Keyboard),
                Some(Input::Balance(value)) => {
                    if let Some(handle) = host.current() {
                        handle.push_balance(value);
                    }
                }
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
            Some(event) = events_rx.recv() => print_event(&event)?,
        }
    }

    let summary = host.sign_out().await;
    while let Ok(event) = events_rx.try_recv() {
        print_event(&event)?;
    }
    if let Some(summary) = summary {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

fn print_event(event: &Event) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_lines_become_pushes() {
        assert!(matches!(parse_line("balance 42"), Input::Balance(42)));
        assert!(matches!(parse_line("balance -3"), Input::Balance(-3)));
    }

    #[test]
    fn anything_else_is_an_interaction() {
        assert!(matches!(parse_line(""), Input::Interaction));
        assert!(matches!(parse_line("balance"), Input::Interaction));
        assert!(matches!(parse_line("balance lots"), Input::Interaction));
        assert!(matches!(parse_line("hello"), Input::Interaction));
    }
}
