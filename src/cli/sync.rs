use stager::config::Config;
use stager::core::{StagerResult, SubmissionLog};
use stager::package::PackageManager;

pub async fn run(config: &Config) -> StagerResult<()> {
    let layout = config.layout()?;
    layout.ensure()?;
    let manager = PackageManager::new(layout.main_ledger());
    let synced = manager
        .sync_packages_file_to_package_manager_file(&SubmissionLog::new("cli-sync"))
        .await?;

    if synced.is_empty() {
        println!("✓ Ledger already matches the content packages file");
        return Ok(());
    }
    for entry in &synced {
        println!("  + {}@{} ({})", entry.id, entry.version, entry.content.join(", "));
    }
    println!("✓ Recovered {} ledger entries", synced.len());
    Ok(())
}
