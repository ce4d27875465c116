//! Provisioning lifecycle of the transient scale set.
//!
//! ```text
//! Created ──> Provisioning ──┬──> Succeeded ─────────────────┐
//!                            ├──> ExpectedProvisioningError ─┼──> Cleaned
//!                            └──> FatalError ────────────────┘
//! ```
//!
//! The [`VmssGuard`] is armed before the create call is submitted and is
//! released exactly once when the scope returns, whatever the outcome.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clients::{CloudClient, VmssModel, VmssRef, VmssSpec};
use crate::error::CloudError;

/// Lifecycle state of one provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvisionState {
    Created,
    Provisioning,
    Succeeded,
    ExpectedProvisioningError,
    FatalError,
    Cleaned,
}

impl ProvisionState {
    pub fn can_transition_to(self, next: ProvisionState) -> bool {
        use ProvisionState::*;
        matches!(
            (self, next),
            (Created, Provisioning)
                | (Provisioning, Succeeded)
                | (Provisioning, ExpectedProvisioningError)
                | (Provisioning, FatalError)
                | (Succeeded, Cleaned)
                | (ExpectedProvisioningError, Cleaned)
                | (FatalError, Cleaned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProvisionState::Cleaned)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid provision transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ProvisionState,
    pub to: ProvisionState,
}

/// Ordered record of the states one resource went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    history: Vec<ProvisionState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![ProvisionState::Created],
        }
    }

    pub fn current(&self) -> ProvisionState {
        *self
            .history
            .last()
            .unwrap_or(&ProvisionState::Created)
    }

    pub fn advance(&mut self, next: ProvisionState) -> Result<(), InvalidTransition> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }
        self.history.push(next);
        Ok(())
    }

    pub fn history(&self) -> &[ProvisionState] {
        &self.history
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Classified result of the create operation.
#[derive(Debug, Clone)]
pub enum ProvisioningOutcome {
    Succeeded(VmssModel),

    /// The resource exists but its bootstrap extension failed; logs are
    /// still retrievable.
    ExpectedProvisioningError { instance: VmssRef, error: CloudError },

    /// Anything else. The resource may not exist.
    FatalError(CloudError),
}

impl ProvisioningOutcome {
    pub fn classify(instance: &VmssRef, result: Result<VmssModel, CloudError>) -> Self {
        match result {
            Ok(model) => ProvisioningOutcome::Succeeded(model),
            Err(error) if error.is_extension_provisioning_error() => {
                ProvisioningOutcome::ExpectedProvisioningError {
                    instance: instance.clone(),
                    error,
                }
            }
            Err(error) => ProvisioningOutcome::FatalError(error),
        }
    }

    pub fn state(&self) -> ProvisionState {
        match self {
            ProvisioningOutcome::Succeeded(_) => ProvisionState::Succeeded,
            ProvisioningOutcome::ExpectedProvisioningError { .. } => {
                ProvisionState::ExpectedProvisioningError
            }
            ProvisioningOutcome::FatalError(_) => ProvisionState::FatalError,
        }
    }

    /// Whether diagnostics can be pulled from the resource.
    pub fn allows_diagnostics(&self) -> bool {
        !matches!(self, ProvisioningOutcome::FatalError(_))
    }
}

/// Deletes the scale set when released, or on drop if never released.
pub struct VmssGuard {
    cloud: Arc<dyn CloudClient>,
    target: VmssRef,
    released: bool,
}

impl VmssGuard {
    pub fn arm(cloud: Arc<dyn CloudClient>, target: VmssRef) -> Self {
        debug!(vmss = %target.name, "Cleanup registered");
        Self {
            cloud,
            target,
            released: false,
        }
    }

    pub fn target(&self) -> &VmssRef {
        &self.target
    }

    /// Delete the scale set and wait for the deletion to finish.
    pub async fn release(mut self) {
        self.released = true;
        delete_vmss(self.cloud.as_ref(), &self.target).await;
    }
}

impl Drop for VmssGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(vmss = %self.target.name, "Cleanup guard dropped unreleased, deleting in background");
                let cloud = Arc::clone(&self.cloud);
                let target = self.target.clone();
                handle.spawn(async move {
                    delete_vmss(cloud.as_ref(), &target).await;
                });
            }
            Err(_) => {
                error!(vmss = %self.target.name, id = %self.target.id, "No runtime to delete scale set, it must be removed by hand");
            }
        }
    }
}

/// Deletion errors are logged, never returned.
async fn delete_vmss(cloud: &dyn CloudClient, target: &VmssRef) {
    info!(vmss = %target.name, resource_group = %target.resource_group, "Deleting scale set");

    let operation = match cloud.delete_vmss(target).await {
        Ok(operation) => operation,
        Err(e) => {
            warn!(vmss = %target.name, error = %e, "Failed to delete scale set");
            return;
        }
    };

    match cloud.poll_delete(&operation).await {
        Ok(()) => info!(vmss = %target.name, "Finished deleting scale set"),
        Err(e) => warn!(vmss = %target.name, error = %e, "Failed polling scale set deletion"),
    }
}

/// Result of a provisioning scope.
#[derive(Debug)]
pub struct Provisioned<T> {
    pub value: T,
    pub states: Vec<ProvisionState>,
}

/// Drives one scale set through its lifecycle.
pub struct Provisioner {
    cloud: Arc<dyn CloudClient>,
}

impl Provisioner {
    pub fn new(cloud: Arc<dyn CloudClient>) -> Self {
        Self { cloud }
    }

    /// Create the scale set, classify the outcome, run `body` with it, then
    /// delete the scale set.
    ///
    /// Deletion runs after `body` completes, errors, or panics. A panic is
    /// resumed once deletion has finished.
    pub async fn scoped<F, Fut, T>(&self, spec: VmssSpec, target: VmssRef, body: F) -> Provisioned<T>
    where
        F: FnOnce(ProvisioningOutcome) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut lifecycle = Lifecycle::new();
        let guard = VmssGuard::arm(Arc::clone(&self.cloud), target.clone());

        self.advance(&mut lifecycle, &target, ProvisionState::Provisioning);
        let result = self.create_and_wait(&spec).await;
        let outcome = ProvisioningOutcome::classify(&target, result);

        match &outcome {
            ProvisioningOutcome::Succeeded(model) => {
                info!(vmss = %target.name, id = %model.id, "Scale set provisioned");
            }
            ProvisioningOutcome::ExpectedProvisioningError { error, .. } => {
                warn!(vmss = %target.name, error = %error, "Bootstrap extension failed, logs will still be extracted");
            }
            ProvisioningOutcome::FatalError(error) => {
                error!(vmss = %target.name, error = %error, "Unrecoverable error while creating scale set");
            }
        }
        self.advance(&mut lifecycle, &target, outcome.state());

        let value = AssertUnwindSafe(body(outcome)).catch_unwind().await;

        guard.release().await;
        self.advance(&mut lifecycle, &target, ProvisionState::Cleaned);

        match value {
            Ok(value) => Provisioned {
                value,
                states: lifecycle.history().to_vec(),
            },
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn create_and_wait(&self, spec: &VmssSpec) -> Result<VmssModel, CloudError> {
        info!(vmss = %spec.name, sku = %spec.sku, resource_group = %spec.resource_group, "Creating scale set");
        let operation = self.cloud.create_vmss(spec).await?;
        self.cloud.poll_until_done(&operation).await
    }

    fn advance(&self, lifecycle: &mut Lifecycle, target: &VmssRef, next: ProvisionState) {
        match lifecycle.advance(next) {
            Ok(()) => debug!(vmss = %target.name, state = ?next, "Provision state"),
            Err(e) => error!(vmss = %target.name, error = %e, "Provision state machine violated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EXTENSION_PROVISIONING_ERROR_CODE;
    use nodecheck_id::VmssName;
    use rstest::rstest;

    fn target() -> VmssRef {
        VmssRef::new("sub", "MC_rg", VmssName::parse("abtestabcd").unwrap())
    }

    #[rstest]
    #[case(ProvisionState::Created, ProvisionState::Provisioning, true)]
    #[case(ProvisionState::Provisioning, ProvisionState::FatalError, true)]
    #[case(ProvisionState::ExpectedProvisioningError, ProvisionState::Cleaned, true)]
    #[case(ProvisionState::Created, ProvisionState::Succeeded, false)]
    #[case(ProvisionState::Created, ProvisionState::Cleaned, false)]
    #[case(ProvisionState::Cleaned, ProvisionState::Provisioning, false)]
    #[case(ProvisionState::Succeeded, ProvisionState::FatalError, false)]
    fn test_transitions(
        #[case] from: ProvisionState,
        #[case] to: ProvisionState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_lifecycle_rejects_skips() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.advance(ProvisionState::Succeeded).unwrap_err();
        assert_eq!(err.from, ProvisionState::Created);
        lifecycle.advance(ProvisionState::Provisioning).unwrap();
        lifecycle.advance(ProvisionState::Succeeded).unwrap();
        lifecycle.advance(ProvisionState::Cleaned).unwrap();
        assert!(lifecycle.current().is_terminal());
        assert_eq!(lifecycle.history().len(), 4);
    }

    #[test]
    fn test_classify() {
        let model = VmssModel {
            id: target().id,
            name: target().name,
            provisioning_state: "Succeeded".to_string(),
        };
        let ok = ProvisioningOutcome::classify(&target(), Ok(model));
        assert_eq!(ok.state(), ProvisionState::Succeeded);

        let cse = ProvisioningOutcome::classify(
            &target(),
            Err(CloudError::api(200, EXTENSION_PROVISIONING_ERROR_CODE, "exit status=50")),
        );
        assert_eq!(cse.state(), ProvisionState::ExpectedProvisioningError);
        assert!(cse.allows_diagnostics());

        let quota = ProvisioningOutcome::classify(
            &target(),
            Err(CloudError::api(409, "OperationNotAllowed", "quota exceeded")),
        );
        assert_eq!(quota.state(), ProvisionState::FatalError);
        assert!(!quota.allows_diagnostics());

        let transport = ProvisioningOutcome::classify(&target(), Err(CloudError::transport("eof")));
        assert_eq!(transport.state(), ProvisionState::FatalError);
    }
}
