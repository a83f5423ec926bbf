use super::{engine, print_outcome};
use stager::config::Config;
use stager::core::{StagerError, StagerResult};
use stager::package::VersionSelector;

pub async fn run(config: &Config, id: &str, version: Option<&str>, all: bool) -> StagerResult<()> {
    let selector = match (version, all) {
        (_, true) => VersionSelector::All,
        (Some(version), false) => VersionSelector::Exact(version.to_string()),
        (None, false) => {
            return Err(StagerError::Package("Pass --version or --all".to_string()))
        }
    };

    let handoff = engine(config).await?;
    let submission_id = handoff.remove_package(id, selector, "")?;
    let outcome = handoff.wait_for(&submission_id).await?;
    print_outcome(&outcome);

    match outcome.error {
        None => Ok(()),
        Some(error) => Err(StagerError::Package(error)),
    }
}
