pub mod auth;
pub mod config;
pub mod ledger;
pub mod run;
pub mod simulate;

/// Single-threaded runtime for commands that talk to the ledger.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}
