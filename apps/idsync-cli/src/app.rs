//! Wiring of clients and orchestrator for one invocation.

use std::sync::Arc;

use idsync_directory::DirectoryClient;
use idsync_scim_client::{IdentityStoreClient, ScimClient};
use idsync_sync::{SyncOrchestrator, SyncReport};
use tracing::{info, warn};

use crate::error::{CliError, CliResult};
use crate::settings::Settings;

/// Build the source and target clients and the orchestrator over them.
pub fn build_orchestrator(settings: &Settings) -> CliResult<SyncOrchestrator> {
    let source = DirectoryClient::new(settings.directory_config())?;
    let target = ScimClient::new(
        &settings.scim.endpoint,
        settings.scim.access_token.clone(),
        settings.scim_timeout(),
    )?
    .with_retry_policy(settings.scim.retry.clone());
    let store = IdentityStoreClient::new(
        &settings.identity_store.endpoint,
        &settings.identity_store.identity_store_id,
        settings.identity_store_token(),
        settings.scim_timeout(),
    )?
    .with_retry_policy(settings.scim.retry.clone());

    Ok(SyncOrchestrator::new(
        Arc::new(source),
        Arc::new(target),
        Arc::new(store),
        settings.sync.clone(),
    ))
}

/// Run one sync pass and log its summary.
///
/// Skipped failures come back inside the report; see [`check_report`].
pub async fn execute(settings: &Settings) -> CliResult<SyncReport> {
    let orchestrator = build_orchestrator(settings)?;
    let report = orchestrator.run().await?;

    info!(
        dry_run = report.dry_run,
        users_created = report.users_created,
        users_updated = report.users_updated,
        users_deleted = report.users_deleted,
        groups_created = report.groups_created,
        groups_renamed = report.groups_renamed,
        groups_deleted = report.groups_deleted,
        members_added = report.members_added,
        members_removed = report.members_removed,
        "Sync summary"
    );
    for failure in &report.failures {
        warn!(stage = %failure.stage, entity = %failure.entity, error = %failure.error, "Skipped failure");
    }
    Ok(report)
}

/// Map a finished report to the process outcome.
pub fn check_report(report: &SyncReport) -> CliResult<()> {
    if report.has_failures() {
        return Err(CliError::PartialFailure(report.failures.len()));
    }
    Ok(())
}
