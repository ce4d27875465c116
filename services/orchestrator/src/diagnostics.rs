//! Best-effort log retrieval from a provisioned scale set.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use nodecheck_poll::{poll_until, Check, PollError};
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::{DiagnosticsTransport, VmssRef};
use crate::config::DiagnosticsConfig;
use crate::error::TransportError;
use crate::logs::{self, DIAGNOSTICS_DIR};

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("fetching logs: {0}")]
    Fetch(#[from] PollError<TransportError>),

    #[error("writing logs: {0}")]
    Io(#[from] std::io::Error),
}

/// What was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsReport {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub bytes: u64,
}

pub struct DiagnosticsExtractor {
    transport: Arc<dyn DiagnosticsTransport>,
    config: DiagnosticsConfig,
}

impl DiagnosticsExtractor {
    pub fn new(transport: Arc<dyn DiagnosticsTransport>, config: DiagnosticsConfig) -> Self {
        Self { transport, config }
    }

    /// Pull logs off `vmss` and write them under `scenario_dir/diagnostics`.
    ///
    /// The instance may refuse connections for a while after provisioning,
    /// so transport errors are retried until the fetch deadline.
    pub async fn extract(
        &self,
        vmss: &VmssRef,
        private_key: &[u8],
        scenario_dir: &std::path::Path,
    ) -> Result<DiagnosticsReport, DiagnosticsError> {
        let what = format!("diagnostics from {}", vmss.name);
        let transport = self.transport.as_ref();
        let artifacts = poll_until(&what, self.config.fetch, move || async move {
            match transport.fetch_logs(vmss, private_key).await {
                Ok(artifacts) => Check::Ready(artifacts),
                Err(e) => Check::Retry(e),
            }
        })
        .await?;

        let dir = scenario_dir.join(DIAGNOSTICS_DIR);
        let mut files = Vec::with_capacity(artifacts.len());
        let mut bytes = 0u64;
        let mut taken = HashSet::new();

        for artifact in &artifacts {
            let name = logs::unique_file_name(&artifact.name, &mut taken);
            let path = logs::write_file(&dir, &name, &artifact.contents).await?;
            bytes += artifact.contents.len() as u64;
            files.push(path);
        }

        if files.is_empty() {
            warn!(vmss = %vmss.name, "Instance returned no log files");
            tokio::fs::create_dir_all(&dir).await?;
        }

        info!(
            vmss = %vmss.name,
            files = files.len(),
            bytes,
            dir = %dir.display(),
            "Diagnostics extracted"
        );

        Ok(DiagnosticsReport { dir, files, bytes })
    }
}
