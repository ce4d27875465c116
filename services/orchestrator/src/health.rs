//! Functional acceptance check for a freshly joined node.
//!
//! 1. Wait for a node named after the scale set to report Ready.
//! 2. Schedule a probe pod onto it and wait for the pod to be Ready.
//! 3. Delete the pod and wait until it is gone.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nodecheck_poll::{poll_until, Check, PollError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::{MembershipClient, PodPhase, PodSpec};
use crate::config::HealthConfig;
use crate::error::KubeError;

/// Label used to pin the probe pod to the node under test.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("node for {vmss} never became ready: {source}")]
    NodeNotReady {
        vmss: String,
        #[source]
        source: PollError<KubeError>,
    },

    #[error("creating probe pod {pod}: {source}")]
    ProbePodCreate {
        pod: String,
        #[source]
        source: KubeError,
    },

    #[error("probe pod {pod} never became ready: {source}")]
    ProbePodNotReady {
        pod: String,
        #[source]
        source: PollError<KubeError>,
    },

    #[error("deleting probe pod {pod}: {source}")]
    ProbePodDelete {
        pod: String,
        #[source]
        source: KubeError,
    },

    #[error("probe pod {pod} was never removed: {source}")]
    ProbePodNotDeleted {
        pod: String,
        #[source]
        source: PollError<KubeError>,
    },
}

impl HealthError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            HealthError::NodeNotReady { .. } => "node_not_ready",
            HealthError::ProbePodCreate { .. } => "probe_pod_create_failed",
            HealthError::ProbePodNotReady { .. } => "probe_pod_not_ready",
            HealthError::ProbePodDelete { .. } => "probe_pod_delete_failed",
            HealthError::ProbePodNotDeleted { .. } => "probe_pod_not_deleted",
        }
    }
}

/// Every condition that held. Only built when all three did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    pub node_name: String,
    pub node_ready_at: DateTime<Utc>,
    pub pod_ready: bool,
    pub pod_deleted: bool,
}

/// Name of the probe pod scheduled onto `node`.
pub fn probe_pod_name(node: &str) -> String {
    format!("{node}-probe")
}

pub struct HealthValidator {
    kube: Arc<dyn MembershipClient>,
    config: HealthConfig,
}

impl HealthValidator {
    pub fn new(kube: Arc<dyn MembershipClient>, config: HealthConfig) -> Self {
        Self { kube, config }
    }

    pub async fn validate(&self, vmss_name: &str) -> Result<HealthCheckResult, HealthError> {
        let (node_name, node_ready_at) = self.wait_for_node(vmss_name).await?;
        info!(vmss = vmss_name, node = %node_name, "Node is ready");

        let pod = self.probe_pod(&node_name);
        self.kube
            .create_pod(&pod)
            .await
            .map_err(|source| HealthError::ProbePodCreate {
                pod: pod.name.clone(),
                source,
            })?;

        if let Err(e) = self.wait_for_pod_ready(&pod).await {
            // Leave the node clean even though the check failed.
            if let Err(delete) = self.kube.delete_pod(&pod.namespace, &pod.name).await {
                warn!(pod = %pod.name, error = %delete, "Failed to delete probe pod after failed check");
            }
            return Err(e);
        }
        info!(pod = %pod.name, "Probe pod is ready");

        self.kube
            .delete_pod(&pod.namespace, &pod.name)
            .await
            .map_err(|source| HealthError::ProbePodDelete {
                pod: pod.name.clone(),
                source,
            })?;
        self.wait_for_pod_gone(&pod).await?;
        info!(pod = %pod.name, "Probe pod deleted");

        Ok(HealthCheckResult {
            node_name,
            node_ready_at,
            pod_ready: true,
            pod_deleted: true,
        })
    }

    async fn wait_for_node(&self, vmss_name: &str) -> Result<(String, DateTime<Utc>), HealthError> {
        let kube = self.kube.as_ref();
        let what = format!("node of {vmss_name} to be ready");

        poll_until(&what, self.config.node_ready, move || async move {
            let nodes = match kube.list_nodes().await {
                Ok(nodes) => nodes,
                Err(e) => return Check::Retry(e),
            };
            match nodes
                .into_iter()
                .find(|n| n.name.starts_with(vmss_name) && n.ready)
            {
                Some(node) => Check::Ready((node.name, Utc::now())),
                None => Check::Pending,
            }
        })
        .await
        .map_err(|source| HealthError::NodeNotReady {
            vmss: vmss_name.to_string(),
            source,
        })
    }

    async fn wait_for_pod_ready(&self, pod: &PodSpec) -> Result<(), HealthError> {
        let kube = self.kube.as_ref();
        let what = format!("probe pod {} to be ready", pod.name);

        poll_until(&what, self.config.pod_ready, move || async move {
            match kube.get_pod(&pod.namespace, &pod.name).await {
                Ok(Some(status)) if status.phase == PodPhase::Failed => Check::Abort(
                    KubeError::UnexpectedState(format!("pod {} failed", pod.name)),
                ),
                Ok(Some(status)) if status.ready => Check::Ready(()),
                Ok(_) => Check::Pending,
                Err(e) => Check::Retry(e),
            }
        })
        .await
        .map_err(|source| HealthError::ProbePodNotReady {
            pod: pod.name.clone(),
            source,
        })
    }

    async fn wait_for_pod_gone(&self, pod: &PodSpec) -> Result<(), HealthError> {
        let kube = self.kube.as_ref();
        let what = format!("probe pod {} to be deleted", pod.name);

        poll_until(&what, self.config.pod_deleted, move || async move {
            match kube.get_pod(&pod.namespace, &pod.name).await {
                Ok(None) => Check::Ready(()),
                Ok(Some(_)) => Check::Pending,
                Err(e) => Check::Retry(e),
            }
        })
        .await
        .map_err(|source| HealthError::ProbePodNotDeleted {
            pod: pod.name.clone(),
            source,
        })
    }

    fn probe_pod(&self, node: &str) -> PodSpec {
        PodSpec {
            name: probe_pod_name(node),
            namespace: self.config.namespace.clone(),
            image: self.config.probe_image.clone(),
            node_selector: BTreeMap::from([(HOSTNAME_LABEL.to_string(), node.to_string())]),
        }
    }
}
