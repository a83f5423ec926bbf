use stager::config::Config;
use stager::core::StagerResult;
use stager::package::{EntryState, PackageManager};

pub async fn run(config: &Config, json: bool) -> StagerResult<()> {
    let manager = PackageManager::new(config.layout()?.main_ledger());
    let entries = manager.entries().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No packages.");
        return Ok(());
    }

    for entry in &entries {
        let state = match entry.state {
            EntryState::Valid => "valid",
            EntryState::Staged => "staged",
        };
        println!("{}@{} [{}]", entry.id, entry.version, state);
        for folder in &entry.content {
            println!("  ├─ {}", folder);
        }
        for zip in &entry.zips {
            println!("  └─ {}", zip);
        }
    }
    println!("\n{} package(s)", entries.len());
    Ok(())
}
