//! Persisted entities: work items, agents and session records.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque work item key. Upstream lists mix numeric and alphanumeric ids,
/// so both are carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(String);

impl WorkItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for WorkItemId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for WorkItemId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.trim()))
    }
}

/// Generates `Display`/`FromStr` over the lowercase names stored in the
/// status columns.
macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    )),
                }
            }
        }
    };
}

status_enum! {
    /// Lifecycle of a work item. The allocator only ever writes `Pending`.
    WorkItemStatus {
        Unassigned => "unassigned",
        Pending => "pending",
        Assigned => "assigned",
        Failed => "failed",
    }
}

status_enum! {
    AgentStatus {
        Active => "active",
        Inactive => "inactive",
    }
}

status_enum! {
    SessionStatus {
        Pending => "pending",
    }
}

/// A unit of work awaiting an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub status: WorkItemStatus,
    pub assigned_agent_id: Option<Uuid>,
}

/// A worker that services one work item at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub id: Uuid,
    pub display_name: String,
    pub status: AgentStatus,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub last_assignment_at: Option<DateTime<Utc>>,
}

/// Fields needed to register an agent.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub display_name: String,
    pub status: AgentStatus,
    /// Defaults to now; set explicitly to control FIFO order.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAgent {
    pub fn active(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            status: AgentStatus::Active,
            created_at: None,
        }
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at.trunc_subsecs(6));
        self
    }

    pub fn inactive(mut self) -> Self {
        self.status = AgentStatus::Inactive;
        self
    }
}

/// The persisted pairing of one work item with one reserved agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub work_item_id: WorkItemId,
    pub agent_id: Uuid,
    pub agent_display_name: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Current time at the precision both stores persist (microseconds).
pub fn store_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Generate a fresh session ("room") identifier.
pub fn new_session_id() -> String {
    format!("room-{}", Uuid::new_v4())
}
