//! JSON fixture backend.
//!
//! Stands in for the batch service: records are read once from a fixture
//! file and served page by page through the engine's fetch contracts. The
//! continuation token is the offset of the next page.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use batchview_core::{CoreError, EntitySource, FetchOptions, ListOptions, PageSource, RawPage};

use crate::cli::ResourceKind;
use crate::error::CliError;
use crate::model::{EntityParams, Resource, Scope};

/// Page size when neither the request nor the config sets one.
const DEFAULT_PAGE_SIZE: usize = 100;

const BAD_REQUEST: u16 = 400;

/// On-disk fixture layout. Tasks are grouped by job id, node files by
/// `pool/node`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub pools: Vec<Value>,
    #[serde(default)]
    pub jobs: Vec<Value>,
    #[serde(default)]
    pub certificates: Vec<Value>,
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub node_files: BTreeMap<String, Vec<Value>>,
}

pub struct FixtureBackend {
    fixture: Fixture,
}

impl FixtureBackend {
    pub fn new(fixture: Fixture) -> Self {
        Self { fixture }
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let fixture_err = |reason: String| CliError::Fixture {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| fixture_err(e.to_string()))?;
        let fixture: Fixture = serde_json::from_str(&raw).map_err(|e| fixture_err(e.to_string()))?;
        debug!(
            path = %path.display(),
            pools = fixture.pools.len(),
            jobs = fixture.jobs.len(),
            certificates = fixture.certificates.len(),
            "loaded fixture"
        );
        Ok(Self::new(fixture))
    }

    fn records(&self, kind: ResourceKind, scope: &Scope) -> Result<&[Value], CoreError> {
        match kind {
            ResourceKind::Pools => Ok(&self.fixture.pools),
            ResourceKind::Jobs => Ok(&self.fixture.jobs),
            ResourceKind::Certificates => Ok(&self.fixture.certificates),
            ResourceKind::Tasks => {
                let job = scope.path();
                self.fixture
                    .tasks
                    .get(&job)
                    .map(Vec::as_slice)
                    .ok_or_else(|| CoreError::not_found(format!("job '{job}' not found")))
            }
            ResourceKind::NodeFiles => {
                let node = scope.path();
                self.fixture
                    .node_files
                    .get(&node)
                    .map(Vec::as_slice)
                    .ok_or_else(|| CoreError::not_found(format!("node '{node}' not found")))
            }
        }
    }

    /// Whether the parent `scope` points at exists.
    pub fn has_scope(&self, kind: ResourceKind, scope: &Scope) -> bool {
        self.records(kind, scope).is_ok()
    }

    /// One page of `kind` under `scope`, filtered by `options.filter`.
    pub fn page(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        options: &ListOptions,
        next_link: Option<&str>,
    ) -> Result<RawPage, CoreError> {
        let offset = match next_link {
            None => 0,
            Some(link) => link.parse::<usize>().map_err(|_| CoreError::Server {
                status: BAD_REQUEST,
                code: Some("InvalidContinuationToken".into()),
                message: format!("invalid continuation token '{link}'"),
            })?,
        };
        let filter = options.filter.as_deref().map(parse_filter).transpose()?;
        let size = options
            .page_size
            .and_then(|s| usize::try_from(s).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let matching: Vec<&Value> = self
            .records(kind, scope)?
            .iter()
            .filter(|record| filter.as_ref().is_none_or(|f| f.matches(record)))
            .collect();
        let items: Vec<Value> = matching
            .iter()
            .skip(offset)
            .take(size)
            .map(|r| (*r).clone())
            .collect();
        let next = offset + items.len();
        let next_link = (next < matching.len()).then(|| next.to_string());

        debug!(%kind, scope = %scope.path(), offset, returned = items.len(), total = matching.len(), "served page");
        Ok(RawPage::new(items, next_link))
    }

    /// The record of `R` under `scope` whose cache key is `key`.
    pub fn get<R: Resource>(&self, scope: &Scope, key: &str) -> Result<Value, CoreError> {
        self.records(R::KIND, scope)?
            .iter()
            .find(|raw| {
                serde_json::from_value::<R>((*raw).clone()).is_ok_and(|item| item.cache_key() == key)
            })
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("{} '{key}' not found", R::KIND.singular())))
    }

    pub fn page_source(self: &Arc<Self>, kind: ResourceKind) -> impl PageSource<Scope> + use<> {
        let backend = Arc::clone(self);
        move |scope: Scope, options: ListOptions, next_link: Option<String>| {
            let page = backend.page(kind, &scope, &options, next_link.as_deref());
            async move { page }
        }
    }

    pub fn entity_source<R: Resource>(self: &Arc<Self>) -> impl EntitySource<EntityParams> + use<R> {
        let backend = Arc::clone(self);
        move |params: EntityParams, _options: FetchOptions| {
            let record = backend.get::<R>(&params.scope, &params.key);
            async move { record }
        }
    }
}

// ── Filter ──────────────────────────────────────────────────────────

/// `field=value`, where `field` may be a dotted path into the record.
#[derive(Debug, PartialEq, Eq)]
struct Filter {
    pointer: String,
    value: String,
}

impl Filter {
    fn matches(&self, record: &Value) -> bool {
        match record.pointer(&self.pointer) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

fn parse_filter(expr: &str) -> Result<Filter, CoreError> {
    let invalid = || CoreError::Server {
        status: BAD_REQUEST,
        code: Some("InvalidFilter".into()),
        message: format!("invalid filter '{expr}', expected field=value"),
    };
    let (field, value) = expr.split_once('=').ok_or_else(invalid)?;
    let field = field.trim();
    if field.is_empty() {
        return Err(invalid());
    }
    Ok(Filter {
        pointer: format!("/{}", field.replace('.', "/")),
        value: value.trim().to_owned(),
    })
}
