use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) const PAPER_SYNC_TOTAL: &str = "exam_paper_sync_total";
pub(crate) const VIOLATIONS_TOTAL: &str = "exam_violations_total";
pub(crate) const LOCKOUTS_TOTAL: &str = "exam_lockouts_total";
pub(crate) const SUBMISSIONS_TOTAL: &str = "exam_submissions_total";

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
