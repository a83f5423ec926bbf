use stager::config::Config;
use stager::core::{StagerResult, SubmissionLog};
use stager::package::PackageManager;

pub async fn run(config: &Config) -> StagerResult<()> {
    let manager = PackageManager::new(config.layout()?.main_ledger());
    let folders = manager
        .sort_packages_file(&SubmissionLog::new("cli-sort"))
        .await?;
    for folder in &folders {
        println!("  {}", folder);
    }
    println!("✓ Sorted {} content folder(s)", folders.len());
    Ok(())
}
