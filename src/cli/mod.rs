pub mod compare;
pub mod list;
pub mod remove;
pub mod sort;
pub mod sync;
pub mod upload;

use stager::config::Config;
use stager::core::{LogLine, StagerResult};
use stager::di::ServiceContainer;
use stager::handoff::{HandoffManager, HandoffOutcome};
use std::path::Path;

/// Load the config from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> StagerResult<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Build the engine with production services, syncing the ledger if enabled
pub async fn engine(config: &Config) -> StagerResult<HandoffManager> {
    let services = ServiceContainer::new(config)?;
    let handoff = HandoffManager::new(
        &config.layout()?,
        services,
        config.notification_sender.clone(),
    )?;
    if config.sync_on_startup {
        for entry in handoff.startup().await? {
            println!("  Recovered ledger entry {}@{}", entry.id, entry.version);
        }
    }
    Ok(handoff)
}

pub fn print_log(lines: &[LogLine]) {
    for line in lines {
        println!(
            "  {} {:<5} {}",
            line.at.format("%H:%M:%S"),
            line.level,
            line.message
        );
    }
}

pub fn print_outcome(outcome: &HandoffOutcome) {
    print_log(&outcome.log);
    match &outcome.error {
        None => {
            for entry in &outcome.entries {
                println!("✓ {}@{} ({:?})", entry.id, entry.version, outcome.operation);
            }
        }
        Some(error) => println!("❌ {}", error),
    }
}
