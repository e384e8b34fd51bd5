//! Per-reconciler condition reporting.
//!
//! A reporter owns exactly one condition type, `<owner>/<reconciler>Valid`,
//! and applies it with the field manager `<owner>/<reconciler>` so writers
//! of different types never touch each other's entries. Every report is
//! compared against the live object, so a recreated or emptied object gets
//! its condition back on the next reconcile.

use super::conditions::{find_condition, now, set_condition};
use crate::handler::SyncState;
use crds::{CONDITION_FALSE, CONDITION_TRUE, Condition};
use lb_client::{ClientError, ConditionWriter};
use std::sync::Arc;
use tracing::debug;

const REASON_CONFIG_ERROR: &str = "ConfigError";

pub struct ConditionReporter {
    writer: Arc<dyn ConditionWriter>,
    object: String,
    condition_type: String,
    field_manager: String,
}

impl ConditionReporter {
    pub fn new(writer: Arc<dyn ConditionWriter>, object: impl Into<String>, owner: &str, reconciler: &str) -> Self {
        Self {
            writer,
            object: object.into(),
            condition_type: format!("{owner}/{reconciler}Valid"),
            field_manager: format!("{owner}/{reconciler}"),
        }
    }

    pub fn condition_type(&self) -> &str {
        &self.condition_type
    }

    /// Reports a handler outcome.
    pub async fn report(&self, state: SyncState) -> Result<(), ClientError> {
        let status = if state.is_healthy() {
            CONDITION_TRUE
        } else {
            CONDITION_FALSE
        };
        self.apply(Condition::new(&self.condition_type, status, state.to_string(), ""))
            .await
    }

    /// Reports a configuration error with its message.
    pub async fn report_error(&self, message: &str) -> Result<(), ClientError> {
        self.apply(Condition::new(
            &self.condition_type,
            CONDITION_FALSE,
            REASON_CONFIG_ERROR,
            message,
        ))
        .await
    }

    async fn apply(&self, desired: Condition) -> Result<(), ClientError> {
        let live = self
            .writer
            .get(&self.object)
            .await?
            .and_then(|state| state.status)
            .and_then(|status| find_condition(&status.conditions, &self.condition_type).cloned());

        let mut conditions: Vec<Condition> = live.into_iter().collect();
        if !set_condition(&mut conditions, desired, &now()) {
            debug!("Condition {} unchanged, skipping write", self.condition_type);
            return Ok(());
        }

        self.writer.ensure_exists(&self.object).await?;
        self.writer
            .apply_conditions(&self.object, &self.field_manager, conditions)
            .await
    }
}
