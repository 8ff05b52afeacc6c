use clap::Subcommand;
use coinroom_core::ledger::credentials;
use coinroom_core::{Config, HttpLedger, Ledger, UserId};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Read a user's authoritative balance
    Balance {
        #[arg(long)]
        user: UserId,
    },
    /// Apply a signed delta and print the resulting balance
    Grant {
        #[arg(long)]
        user: UserId,
        /// Coins to add (negative to debit)
        #[arg(long, allow_hyphen_values = true)]
        amount: i64,
    },
}

/// Build the hosted ledger from config and stored credentials.
pub(crate) fn connect(config: &Config) -> Result<HttpLedger, Box<dyn std::error::Error>> {
    let key = credentials::api_key()?.ok_or_else(|| {
        format!(
            "no ledger api key; run `coinroom-cli auth set-key` or set {}",
            credentials::API_KEY_ENV
        )
    })?;
    Ok(HttpLedger::from_config(&config.ledger, key)?)
}

pub fn run(action: LedgerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let ledger = connect(&config)?;
    let rt = super::runtime()?;

    match action {
        LedgerAction::Balance { user } => {
            let balance = rt.block_on(ledger.fetch_balance(&user))?;
            println!("{balance}");
        }
        LedgerAction::Grant { user, amount } => {
            if amount == 0 {
                return Err("amount must not be zero".into());
            }
            let balance = rt.block_on(ledger.grant_coins(&user, amount))?;
            println!("{balance}");
        }
    }
    Ok(())
}
