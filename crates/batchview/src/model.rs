//! Batch resource models and their presentation.
//!
//! Every resource deserializes from the service's camelCase JSON, keeps
//! fields it doesn't model in `extra`, and knows how to render itself as a
//! table row or a detail listing and which fields it can be sorted by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::Tabled;

use batchview_core::{CacheRegistry, CacheSource, Entity, ListSortConfig, composite_key};

use crate::cli::{ResourceKind, ScopeArgs};
use crate::error::CliError;
use crate::output;

// ── Scope ───────────────────────────────────────────────────────────

/// Parent resources a listing or lookup is scoped to.
///
/// Only the parents relevant to the kind are kept, so two scopes for the
/// same parent always fingerprint the same.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl Scope {
    /// Validate the scope flags for `kind`.
    pub fn for_kind(kind: ResourceKind, args: &ScopeArgs) -> Result<Self, CliError> {
        let required = |value: &Option<String>, flag: &str| {
            value.clone().ok_or_else(|| CliError::Validation {
                field: format!("--{flag}"),
                reason: format!("{kind} are listed per {flag}; pass --{flag} <ID>"),
            })
        };
        match kind {
            ResourceKind::Pools | ResourceKind::Jobs | ResourceKind::Certificates => Ok(Self::default()),
            ResourceKind::Tasks => Ok(Self {
                job: Some(required(&args.job, "job")?),
                ..Self::default()
            }),
            ResourceKind::NodeFiles => Ok(Self {
                pool: Some(required(&args.pool, "pool")?),
                node: Some(required(&args.node, "node")?),
                ..Self::default()
            }),
        }
    }

    /// `job` for tasks, `pool/node` for node files, empty when unscoped.
    pub fn path(&self) -> String {
        [&self.job, &self.pool, &self.node]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Params of a single-resource lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityParams {
    pub scope: Scope,
    pub key: String,
}

/// Params that carry a [`Scope`].
pub trait Scoped {
    fn scope(&self) -> &Scope;
}

impl Scoped for Scope {
    fn scope(&self) -> &Scope {
        self
    }
}

impl Scoped for EntityParams {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

// ── Resource trait ──────────────────────────────────────────────────

/// A resource kind the CLI can list and show.
pub trait Resource: Entity {
    const KIND: ResourceKind;

    type Row: Tabled + for<'a> From<&'a Self>;

    /// Identifier printed in plain output.
    fn display_id(&self) -> String {
        self.cache_key()
    }

    /// Cache key addressed by a `get` argument.
    fn key_from_arg(key: &str, _algorithm: &str) -> String {
        key.to_owned()
    }

    /// Key/value listing for single-item table output.
    fn detail(&self) -> String;

    /// Fields `--sort` accepts.
    fn sort_config() -> ListSortConfig<Self>;

    /// The cache this kind lives in: one per parent for scoped kinds.
    fn cache<P>(registry: &CacheRegistry) -> CacheSource<P, Self>
    where
        P: Scoped + Send + Sync + 'static,
    {
        if Self::KIND.is_scoped() {
            registry
                .targeted_cache::<P, Self>(|params: &P| params.scope().path())
                .into()
        } else {
            registry.data_cache::<Self>().into()
        }
    }
}

fn fmt_time(time: Option<&DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ── Pool ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub vm_size: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub allocation_state: String,
    #[serde(default)]
    pub current_dedicated_nodes: u32,
    #[serde(default)]
    pub target_dedicated_nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Pool {
    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Tabled)]
pub struct PoolRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "VM Size")]
    vm_size: String,
    #[tabled(rename = "Nodes")]
    nodes: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Pool> for PoolRow {
    fn from(p: &Pool) -> Self {
        Self {
            id: p.id.clone(),
            state: p.state.clone(),
            vm_size: p.vm_size.clone(),
            nodes: format!("{}/{}", p.current_dedicated_nodes, p.target_dedicated_nodes),
            created: fmt_time(p.creation_time.as_ref()),
        }
    }
}

impl Resource for Pool {
    const KIND: ResourceKind = ResourceKind::Pools;
    type Row = PoolRow;

    fn detail(&self) -> String {
        output::detail(&[
            ("ID", self.id.clone()),
            ("Name", self.display_name.clone().unwrap_or_default()),
            ("State", self.state.clone()),
            ("Allocation", self.allocation_state.clone()),
            ("VM Size", self.vm_size.clone()),
            ("Dedicated nodes", format!("{} (target {})", self.current_dedicated_nodes, self.target_dedicated_nodes)),
            ("Created", fmt_time(self.creation_time.as_ref())),
        ])
    }

    fn sort_config() -> ListSortConfig<Self> {
        ListSortConfig::new()
            .by_key("id", |p: &Pool| p.id.clone())
            .by_key("state", |p: &Pool| p.state.clone())
            .by_key("vmSize", |p: &Pool| p.vm_size.clone())
            .by_key("currentDedicatedNodes", |p: &Pool| p.current_dedicated_nodes)
            .by_key("targetDedicatedNodes", |p: &Pool| p.target_dedicated_nodes)
            .by_key("creationTime", |p: &Pool| p.creation_time)
    }
}

// ── Job ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_info: Option<PoolInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    fn pool_id(&self) -> String {
        self.pool_info
            .as_ref()
            .and_then(|info| info.pool_id.clone())
            .unwrap_or_default()
    }
}

impl Entity for Job {
    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Tabled)]
pub struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Pool")]
    pool: String,
    #[tabled(rename = "Priority")]
    priority: i32,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Job> for JobRow {
    fn from(j: &Job) -> Self {
        Self {
            id: j.id.clone(),
            state: j.state.clone(),
            pool: j.pool_id(),
            priority: j.priority,
            created: fmt_time(j.creation_time.as_ref()),
        }
    }
}

impl Resource for Job {
    const KIND: ResourceKind = ResourceKind::Jobs;
    type Row = JobRow;

    fn detail(&self) -> String {
        output::detail(&[
            ("ID", self.id.clone()),
            ("Name", self.display_name.clone().unwrap_or_default()),
            ("State", self.state.clone()),
            ("Pool", self.pool_id()),
            ("Priority", self.priority.to_string()),
            ("Created", fmt_time(self.creation_time.as_ref())),
        ])
    }

    fn sort_config() -> ListSortConfig<Self> {
        ListSortConfig::new()
            .by_key("id", |j: &Job| j.id.clone())
            .by_key("state", |j: &Job| j.state.clone())
            .by_key("priority", |j: &Job| j.priority)
            .by_key("creationTime", |j: &Job| j.creation_time)
    }
}

// ── Task ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub command_line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_info: Option<TaskExecutionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    fn exit_code(&self) -> Option<i32> {
        self.execution_info.as_ref().and_then(|info| info.exit_code)
    }
}

impl Entity for Task {
    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Tabled)]
pub struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Exit")]
    exit_code: String,
    #[tabled(rename = "Command")]
    command: String,
}

impl From<&Task> for TaskRow {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.clone(),
            state: t.state.clone(),
            exit_code: fmt_opt(t.exit_code()),
            command: t.command_line.clone(),
        }
    }
}

impl Resource for Task {
    const KIND: ResourceKind = ResourceKind::Tasks;
    type Row = TaskRow;

    fn detail(&self) -> String {
        output::detail(&[
            ("ID", self.id.clone()),
            ("Name", self.display_name.clone().unwrap_or_default()),
            ("State", self.state.clone()),
            ("Command", self.command_line.clone()),
            ("Exit code", fmt_opt(self.exit_code())),
            (
                "Retries",
                fmt_opt(self.execution_info.as_ref().map(|info| info.retry_count)),
            ),
            ("Created", fmt_time(self.creation_time.as_ref())),
        ])
    }

    fn sort_config() -> ListSortConfig<Self> {
        ListSortConfig::new()
            .by_key("id", |t: &Task| t.id.clone())
            .by_key("state", |t: &Task| t.state.clone())
            .by_key("exitCode", Task::exit_code)
            .by_key("creationTime", |t: &Task| t.creation_time)
    }
}

// ── Certificate ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub thumbprint: String,
    pub thumbprint_algorithm: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_transition_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Certificate {
    fn cache_key(&self) -> String {
        composite_key([&self.thumbprint_algorithm, &self.thumbprint])
    }
}

#[derive(Tabled)]
pub struct CertificateRow {
    #[tabled(rename = "Thumbprint")]
    thumbprint: String,
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Changed")]
    changed: String,
}

impl From<&Certificate> for CertificateRow {
    fn from(c: &Certificate) -> Self {
        Self {
            thumbprint: c.thumbprint.clone(),
            algorithm: c.thumbprint_algorithm.clone(),
            state: c.state.clone(),
            changed: fmt_time(c.state_transition_time.as_ref()),
        }
    }
}

impl Resource for Certificate {
    const KIND: ResourceKind = ResourceKind::Certificates;
    type Row = CertificateRow;

    fn display_id(&self) -> String {
        self.thumbprint.clone()
    }

    fn key_from_arg(key: &str, algorithm: &str) -> String {
        composite_key([algorithm, key])
    }

    fn detail(&self) -> String {
        output::detail(&[
            ("Thumbprint", self.thumbprint.clone()),
            ("Algorithm", self.thumbprint_algorithm.clone()),
            ("State", self.state.clone()),
            ("Changed", fmt_time(self.state_transition_time.as_ref())),
        ])
    }

    fn sort_config() -> ListSortConfig<Self> {
        ListSortConfig::new()
            .by_key("thumbprint", |c: &Certificate| c.thumbprint.clone())
            .by_key("state", |c: &Certificate| c.state.clone())
            .by_key("stateTransitionTime", |c: &Certificate| c.state_transition_time)
    }
}

// ── Node file ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FileProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeFile {
    fn size(&self) -> Option<u64> {
        self.properties.as_ref().and_then(|p| p.content_length)
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.properties.as_ref().and_then(|p| p.last_modified)
    }
}

impl Entity for NodeFile {
    fn cache_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Tabled)]
pub struct NodeFileRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

impl From<&NodeFile> for NodeFileRow {
    fn from(f: &NodeFile) -> Self {
        Self {
            name: if f.is_directory {
                format!("{}/", f.name)
            } else {
                f.name.clone()
            },
            size: fmt_opt(f.size()),
            modified: fmt_time(f.last_modified().as_ref()),
        }
    }
}

impl Resource for NodeFile {
    const KIND: ResourceKind = ResourceKind::NodeFiles;
    type Row = NodeFileRow;

    fn detail(&self) -> String {
        output::detail(&[
            ("Name", self.name.clone()),
            ("Directory", self.is_directory.to_string()),
            ("Size", fmt_opt(self.size())),
            ("Modified", fmt_time(self.last_modified().as_ref())),
            ("URL", self.url.clone().unwrap_or_default()),
        ])
    }

    fn sort_config() -> ListSortConfig<Self> {
        ListSortConfig::new()
            .by_key("name", |f: &NodeFile| f.name.clone())
            .by_key("size", NodeFile::size)
            .by_key("lastModified", NodeFile::last_modified)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn certificates_are_keyed_by_algorithm_and_thumbprint() {
        let cert: Certificate = serde_json::from_value(json!({
            "thumbprint": "0A1B",
            "thumbprintAlgorithm": "sha1",
            "state": "active",
        }))
        .unwrap();

        assert_eq!(cert.cache_key(), Certificate::key_from_arg("0A1B", "sha1"));
        assert_ne!(cert.cache_key(), Certificate::key_from_arg("0A1B", "sha256"));
        assert_eq!(cert.display_id(), "0A1B");
    }

    #[test]
    fn unmodelled_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "pool-a",
            "vmSize": "standard_d2",
            "enableAutoScale": true,
            "creationTime": "2024-03-01T10:00:00Z",
        });
        let pool: Pool = serde_json::from_value(raw).unwrap();

        assert_eq!(pool.extra.get("enableAutoScale"), Some(&json!(true)));
        let back = serde_json::to_value(&pool).unwrap();
        assert_eq!(back["enableAutoScale"], json!(true));
        assert_eq!(back["vmSize"], json!("standard_d2"));
    }

    #[test]
    fn scope_requires_parent_flags() {
        let err = Scope::for_kind(ResourceKind::Tasks, &ScopeArgs::default()).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "--job"));

        let args = ScopeArgs {
            job: Some("ignored".into()),
            pool: Some("pool-a".into()),
            node: Some("tvm-1".into()),
        };
        let scope = Scope::for_kind(ResourceKind::NodeFiles, &args).unwrap();
        assert_eq!(scope.path(), "pool-a/tvm-1");
        assert_eq!(Scope::for_kind(ResourceKind::Pools, &args).unwrap().path(), "");
    }

    #[test]
    fn sort_keys_use_wire_field_names() {
        assert!(Pool::sort_config().keys().any(|k| k == "targetDedicatedNodes"));
        assert!(Task::sort_config().contains("exitCode"));
        assert!(NodeFile::sort_config().contains("lastModified"));
    }
}
