use clap::Subcommand;
use coinroom_core::ledger::credentials;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the ledger API key in the OS keyring
    SetKey {
        /// API key issued by the hosted backend
        key: String,
    },
    /// Remove the stored API key
    Clear,
    /// Report whether an API key is available
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::SetKey { key } => {
            credentials::set_api_key(&key)?;
            println!("api key stored");
        }
        AuthAction::Clear => {
            credentials::clear_api_key()?;
            println!("api key removed");
        }
        AuthAction::Status => {
            let status = if std::env::var(credentials::API_KEY_ENV).is_ok_and(|k| !k.trim().is_empty()) {
                format!("configured (from {})", credentials::API_KEY_ENV)
            } else if credentials::api_key()?.is_some() {
                "configured".to_string()
            } else {
                "not configured".to_string()
            };
            println!("{status}");
        }
    }
    Ok(())
}
