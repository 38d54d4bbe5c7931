//! Stack controller
//!
//! Templates are compared as documents, not strings, so reformatting a
//! template does not trigger an update. A template that cannot be parsed is
//! treated as drift and resubmitted; the provider reports the actual error.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use provider_sync_core::{
    Adapter, CallContext, Condition, ConnectionDetails, Created, DiffError, DiffErrorPolicy,
    Differ, Lifecycle, Patch, Reconciler,
};

use crate::client::ClientError;
use crate::crd::{Stack, StackObservation, StackParameters};
use crate::services::cloudformation::{
    self, non_empty_parameters, StackApi, StackDescription, StackTemplate, DELETE_COMPLETE,
};

use super::{region, run_managed, ControllerContext};

/// A stack together with its current template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackState {
    pub stack: StackDescription,
    pub template_body: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StackChange {
    /// Resubmit template and parameters
    Update,
}

pub struct StackAdapter {
    api: Arc<dyn StackApi>,
    default_region: String,
}

impl StackAdapter {
    pub fn new(api: Arc<dyn StackApi>, default_region: &str) -> Self {
        Self {
            api,
            default_region: default_region.to_string(),
        }
    }

    fn region<'a>(&'a self, params: &'a StackParameters) -> &'a str {
        region(params.region.as_deref(), &self.default_region)
    }
}

#[async_trait]
impl Adapter for StackAdapter {
    const KIND: &'static str = "Stack";

    type Parameters = StackParameters;
    type State = StackState;
    type Change = StackChange;
    type Error = ClientError;

    /// Deleted stacks stay visible for a while; they count as absent
    async fn describe(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &StackParameters,
    ) -> Result<Vec<StackState>, ClientError> {
        let region = self.region(params);
        let stacks = self.api.describe_stacks(region, external_name).await?;

        let mut states = Vec::with_capacity(stacks.len());
        for stack in stacks {
            if stack.stack_status == DELETE_COMPLETE {
                continue;
            }
            let template_body = self.api.get_template(region, &stack.stack_id).await?;
            states.push(StackState {
                stack,
                template_body,
            });
        }
        Ok(states)
    }

    async fn create(
        &self,
        _ctx: &CallContext,
        params: &StackParameters,
    ) -> Result<Created, ClientError> {
        let template = StackTemplate::new(&params.template_body, &params.parameters);
        let stack_id = self
            .api
            .create_stack(self.region(params), &params.stack_name, &template)
            .await?;
        Ok(Created::new(stack_id))
    }

    async fn apply_change(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &StackParameters,
        change: &StackChange,
    ) -> Result<(), ClientError> {
        match change {
            StackChange::Update => {
                let template = StackTemplate::new(&params.template_body, &params.parameters);
                self.api
                    .update_stack(self.region(params), external_name, &template)
                    .await
            }
        }
    }

    async fn delete(
        &self,
        _ctx: &CallContext,
        external_name: &str,
        params: &StackParameters,
    ) -> Result<(), ClientError> {
        self.api
            .delete_stack(self.region(params), external_name)
            .await
    }

    fn is_not_found(&self, err: &ClientError) -> bool {
        cloudformation::is_stack_not_found(err)
    }

    fn is_tolerable(&self, _change: &StackChange, err: &ClientError) -> bool {
        cloudformation::is_no_op_update(err)
    }
}

/// Parse a JSON or YAML template
fn parse_template(body: &str) -> Result<serde_yaml::Value, DiffError> {
    serde_json::from_str(body)
        .or_else(|_| serde_yaml::from_str(body))
        .map_err(|e| DiffError::new(format!("cannot parse template: {e}")))
}

fn in_progress(status: &str) -> bool {
    status.ends_with("_IN_PROGRESS")
}

pub struct StackDiffer;

impl Differ for StackDiffer {
    type Parameters = StackParameters;
    type State = StackState;
    type Observation = StackObservation;
    type Change = StackChange;

    const ERROR_POLICY: DiffErrorPolicy = DiffErrorPolicy::NotConverged;

    fn late_initialize(&self, _desired: &mut StackParameters, _observed: &StackState) {}

    /// A stack with an operation in flight cannot be updated and counts as
    /// up to date until the operation settles
    fn is_up_to_date(
        &self,
        desired: &StackParameters,
        observed: &StackState,
    ) -> Result<bool, DiffError> {
        if in_progress(&observed.stack.stack_status) {
            return Ok(true);
        }

        let desired_parameters: BTreeMap<String, String> = non_empty_parameters(&desired.parameters)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if observed.stack.parameter_map() != desired_parameters {
            return Ok(false);
        }

        Ok(parse_template(&desired.template_body)? == parse_template(&observed.template_body)?)
    }

    fn patch(&self, observed: &StackState, desired: &StackParameters) -> Patch<StackChange> {
        match self.is_up_to_date(desired, observed) {
            Ok(true) => Patch::new(),
            _ => vec![StackChange::Update].into(),
        }
    }

    fn observation(&self, observed: &StackState) -> StackObservation {
        StackObservation {
            stack_id: observed.stack.stack_id.clone(),
            stack_status: observed.stack.stack_status.clone(),
            stack_status_reason: observed.stack.stack_status_reason.clone(),
            outputs: observed.stack.output_map(),
        }
    }

    fn readiness(&self, observed: &StackState, _up_to_date: bool) -> Option<Condition> {
        match observed.stack.stack_status.as_str() {
            "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "UPDATE_ROLLBACK_COMPLETE" => {
                Some(Condition::available())
            }
            "CREATE_IN_PROGRESS" => Some(Condition::creating()),
            "DELETE_IN_PROGRESS" => Some(Condition::deleting()),
            status if in_progress(status) => None,
            _ => Some(Condition::unavailable()),
        }
    }

    /// Stack outputs, keyed by output name
    fn connection_details(&self, observed: &StackState) -> ConnectionDetails {
        observed
            .stack
            .outputs
            .iter()
            .map(|o| (o.output_key.clone(), o.output_value.clone().into_bytes()))
            .collect()
    }
}

pub fn reconciler(api: Arc<dyn StackApi>, default_region: &str) -> Reconciler<Stack> {
    Reconciler::new(Arc::new(Lifecycle::new(
        StackAdapter::new(api, default_region),
        StackDiffer,
    )))
}

/// Start the Stack controller
pub async fn run(shared: Arc<ControllerContext>, api: Arc<dyn StackApi>) {
    let reconciler = reconciler(api, &shared.config.region);
    run_managed::<Stack>(shared, reconciler).await;
}
