//! Narrow read interfaces to the application registry.
//!
//! Reports reach session, user, tool, function, property, datasource and
//! component state only through these traits. Each collaborator is optional;
//! a report that needs one that is not wired in fails with a descriptive
//! error instead of rendering partial data.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheRegistry;
use crate::error::{Result, StatusError};

/// One open usage session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSession {
    pub id: String,
    pub server: String,
    pub user_id: String,
    #[serde(default)]
    pub ip_address: String,
    pub started: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

pub trait SessionDirectory: Send + Sync {
    /// Distinct users active within the last `window_seconds`.
    fn active_user_count(&self, window_seconds: u64) -> usize;
    /// Open sessions keyed by server instance id.
    fn open_sessions_by_server(&self) -> BTreeMap<String, Vec<UsageSession>>;
}

pub trait UserDirectory: Send + Sync {
    /// Display id of `user_id`, or `None` when the user is not defined.
    fn display_id(&self, user_id: &str) -> Option<String>;
}

/// Registered tool and its configuration layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub registered_config: BTreeMap<String, String>,
    pub mutable_config: BTreeMap<String, String>,
    pub final_config: BTreeMap<String, String>,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
}

pub trait ToolRegistry: Send + Sync {
    fn tool_ids(&self) -> Vec<String>;
    fn tool(&self, id: &str) -> Option<ToolInfo>;
}

pub trait FunctionRegistry: Send + Sync {
    fn registered_functions(&self) -> Vec<String>;
}

pub trait PropertyStore: Send + Sync {
    fn raw_properties(&self) -> BTreeMap<String, String>;
}

/// Connection counts of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub active: i64,
    pub idle: i64,
}

pub trait DataSourcePool: Send + Sync {
    /// Name of the pool implementation.
    fn implementation(&self) -> String;
    /// `None` when the implementation does not expose counts.
    fn connection_counts(&self) -> Option<ConnectionCounts>;
}

pub trait ComponentRegistry: Send + Sync {
    fn registered_interfaces(&self) -> Vec<String>;
}

/// Wiring of every collaborator a report may need.
#[derive(Clone, Default)]
pub struct AppRegistry {
    pub sessions: Option<Arc<dyn SessionDirectory>>,
    pub users: Option<Arc<dyn UserDirectory>>,
    pub tools: Option<Arc<dyn ToolRegistry>>,
    pub functions: Option<Arc<dyn FunctionRegistry>>,
    pub properties: Option<Arc<dyn PropertyStore>>,
    pub datasource: Option<Arc<dyn DataSourcePool>>,
    pub components: Option<Arc<dyn ComponentRegistry>>,
    pub caches: Option<Arc<dyn CacheRegistry>>,
}

impl AppRegistry {
    pub fn sessions(&self) -> Result<&dyn SessionDirectory> {
        self.sessions
            .as_deref()
            .ok_or(StatusError::MissingCollaborator("SessionManager"))
    }

    pub fn users(&self) -> Result<&dyn UserDirectory> {
        self.users
            .as_deref()
            .ok_or(StatusError::MissingCollaborator("UserDirectoryService"))
    }

    pub fn tools(&self) -> Result<&dyn ToolRegistry> {
        self.tools
            .as_deref()
            .ok_or(StatusError::MissingCollaborator("ToolManager"))
    }

    pub fn functions(&self) -> Result<&dyn FunctionRegistry> {
        self.functions
            .as_deref()
            .ok_or(StatusError::MissingCollaborator("FunctionManager"))
    }

    pub fn properties(&self) -> Result<&dyn PropertyStore> {
        self.properties
            .as_deref()
            .ok_or(StatusError::MissingCollaborator("ApplicationProperties"))
    }

    pub fn datasource(&self) -> Result<&dyn DataSourcePool> {
        self.datasource.as_deref().ok_or(StatusError::NoDataSource)
    }

    pub fn components(&self) -> Result<&dyn ComponentRegistry> {
        self.components
            .as_deref()
            .ok_or(StatusError::MissingCollaborator("ComponentManager"))
    }

    pub fn caches(&self) -> Option<&dyn CacheRegistry> {
        self.caches.as_deref()
    }
}
