//! Command dispatch: bridges CLI args -> engine views -> output formatting.

pub mod config_cmd;
pub mod get;
pub mod list;

use std::sync::Arc;

use clap::ValueEnum;

use batchview_config::Config;
use batchview_core::CacheRegistry;

use crate::backend::FixtureBackend;
use crate::cli::{ColorMode, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Everything a resource command needs, resolved once per invocation.
pub struct Context {
    pub config: Config,
    pub backend: Arc<FixtureBackend>,
    pub registry: CacheRegistry,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Context {
    /// Resolve flags against the loaded config and open the fixture.
    pub fn new(global: &GlobalOpts, config: Config, config_path: &std::path::Path) -> Result<Self, CliError> {
        let output = match global.output {
            Some(format) => format,
            None => parse_value::<OutputFormat>("defaults.output", &config.defaults.output)?,
        };
        let color = match global.color {
            Some(mode) => mode,
            None => parse_value::<ColorMode>("defaults.color", &config.defaults.color)?,
        };
        let fixture = global
            .fixture
            .clone()
            .or_else(|| config.fixture.clone())
            .ok_or_else(|| CliError::NoFixture {
                path: config_path.display().to_string(),
            })?;

        let backend = Arc::new(FixtureBackend::load(&fixture)?);
        let registry = CacheRegistry::new(config.engine.clone());
        Ok(Self {
            config,
            backend,
            registry,
            output,
            color: output::should_color(color),
            quiet: global.quiet,
        })
    }
}

fn parse_value<V: ValueEnum>(field: &str, raw: &str) -> Result<V, CliError> {
    V::from_str(raw, true).map_err(|reason| CliError::Validation {
        field: field.into(),
        reason,
    })
}

/// Dispatch a resource command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    let result = match cmd {
        Command::List(args) => list::handle(args, ctx).await,
        Command::Get(args) => get::handle(args, ctx).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    };
    ctx.registry.dispose_all();
    result
}
