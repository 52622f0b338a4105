//! Dollar-cost averaging.
//!
//! Swaps a fixed amount every `interval_secs`, up to `max_executions`
//! times, then deactivates. Counters only advance after a successful
//! submission, so a failed swap is retried on the next eligible tick.

use alloy_primitives::{Address, U256};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{elapsed_at_least, ExecutionOutcome, StrategyContext};
use crate::types::SentinelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcaParams {
    pub token_in: Address,
    pub token_out: Address,
    /// Amount of `token_in` swapped per execution.
    pub amount: U256,
    pub interval_secs: u64,
    pub max_executions: u32,
}

#[derive(Debug, Clone)]
pub struct DcaStrategy {
    id: u64,
    active: bool,
    params: DcaParams,
    executions_done: u32,
    last_execution: DateTime<Utc>,
}

impl DcaStrategy {
    /// The first execution becomes due one interval after `created_at`.
    pub fn new(id: u64, params: DcaParams, created_at: DateTime<Utc>) -> Result<Self, SentinelError> {
        if params.max_executions == 0 {
            return Err(SentinelError::InvalidStrategy {
                strategy_id: id,
                message: "max_executions must be positive".into(),
            });
        }
        if params.amount.is_zero() {
            return Err(SentinelError::InvalidStrategy {
                strategy_id: id,
                message: "amount must be positive".into(),
            });
        }
        Ok(Self {
            id,
            active: true,
            params,
            executions_done: 0,
            last_execution: created_at,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn params(&self) -> &DcaParams {
        &self.params
    }

    pub fn executions_done(&self) -> u32 {
        self.executions_done
    }

    pub fn last_execution(&self) -> DateTime<Utc> {
        self.last_execution
    }

    pub fn should_execute(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.executions_done < self.params.max_executions
            && elapsed_at_least(self.last_execution, now, self.params.interval_secs)
    }

    pub async fn execute(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> Result<ExecutionOutcome> {
        info!(
            strategy_id = self.id,
            token_in = %self.params.token_in,
            token_out = %self.params.token_out,
            amount = %self.params.amount,
            "Executing DCA"
        );

        let tx_hash = ctx
            .swap(self.params.token_in, self.params.token_out, self.params.amount)
            .await?;

        self.executions_done += 1;
        self.last_execution = now;
        if self.executions_done >= self.params.max_executions {
            self.active = false;
            info!(
                strategy_id = self.id,
                executions = self.params.max_executions,
                "DCA completed all executions"
            );
        }

        Ok(ExecutionOutcome::Swapped {
            chain_id: ctx.chain_id,
            token_in: self.params.token_in,
            token_out: self.params.token_out,
            amount: self.params.amount,
            tx_hash,
        })
    }

    pub(super) fn restore(&mut self, active: bool, executions_done: u32, last_execution: DateTime<Utc>) {
        self.executions_done = executions_done.min(self.params.max_executions);
        self.last_execution = last_execution;
        self.active = self.active && active && self.executions_done < self.params.max_executions;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
