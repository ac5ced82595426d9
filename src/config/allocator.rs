use std::time::Duration;

use crate::allocator::WorkItemId;
use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Default pause between selection attempts when no agent is free.
pub const DEFAULT_WAIT_SECS: u64 = 2;

/// Allocation policy and default batch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Pause between selection attempts when no agent is available.
    pub wait_interval: Duration,
    /// Maximum number of selection attempts per work item. `0` retries forever.
    pub max_attempts: u32,
    /// Work items processed by `assign` when none are given on the command line.
    pub work_item_ids: Vec<WorkItemId>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            wait_interval: Duration::from_secs(DEFAULT_WAIT_SECS),
            max_attempts: 0,
            work_item_ids: Vec::new(),
        }
    }
}

impl AllocatorConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let wait_secs: u64 = parse_optional_env("AGENT_WAIT_SECONDS", DEFAULT_WAIT_SECS)?;
        let max_attempts: u32 = parse_optional_env("AGENT_WAIT_MAX_ATTEMPTS", 0)?;
        let work_item_ids = optional_env("WORK_ITEM_IDS")?
            .map(|csv| parse_work_item_ids(&csv))
            .unwrap_or_default();

        Ok(Self {
            wait_interval: Duration::from_secs(wait_secs),
            max_attempts,
            work_item_ids,
        })
    }
}

/// Split a comma-separated identifier list, trimming whitespace and
/// dropping empty entries. Numeric and alphanumeric ids are both kept
/// verbatim.
pub fn parse_work_item_ids(csv: &str) -> Vec<WorkItemId> {
    csv.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(WorkItemId::from)
        .collect()
}
