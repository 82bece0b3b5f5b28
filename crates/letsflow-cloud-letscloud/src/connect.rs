//! Gateway selection and connection check

use crate::client::LetsCloudGateway;
use crate::error::{LetsCloudError, Result};
use letsflow_cloud::{FakeGateway, Gateway};
use letsflow_config::Settings;
use std::sync::Arc;

/// Identifier fetched to prove the token works; it is not expected to exist.
const PROBE_INSTANCE_ID: &str = "test";

/// Build the gateway selected by `settings`.
///
/// The mock token yields an in-memory [`FakeGateway`]. Any other token is
/// validated, wrapped in a [`LetsCloudGateway`] and checked with one probe
/// request, where a not-found answer counts as success.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn Gateway>> {
    let token = settings.require_token()?;

    if token.is_mock() {
        tracing::info!("Using in-memory gateway (mock token)");
        return Ok(Arc::new(FakeGateway::new()));
    }

    let gateway = LetsCloudGateway::new(token.expose(), &settings.api_url, settings.http_timeout())?;
    probe(&gateway).await?;

    tracing::info!(api_url = %gateway.base_url(), "Connected to LetsCloud API");
    Ok(Arc::new(gateway))
}

/// Fetch a dummy instance; only a not-found answer proves the token.
pub async fn probe(gateway: &dyn Gateway) -> Result<()> {
    match gateway.get_instance(PROBE_INSTANCE_ID).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "LetsCloud connection check failed");
            Err(LetsCloudError::Probe(e))
        }
    }
}
