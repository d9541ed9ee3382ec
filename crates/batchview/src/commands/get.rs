//! `get` handler: entity view -> output.

use tracing::debug;

use batchview_core::{CoreError, EntityGetter, EntityView};

use crate::cli::{GetArgs, ResourceKind};
use crate::error::CliError;
use crate::model::{Certificate, EntityParams, Job, NodeFile, Pool, Resource, Scope, Task};
use crate::output;

use super::Context;

pub async fn handle(args: GetArgs, ctx: &Context) -> Result<(), CliError> {
    match args.kind {
        ResourceKind::Pools => get::<Pool>(&args, ctx).await,
        ResourceKind::Jobs => get::<Job>(&args, ctx).await,
        ResourceKind::Tasks => get::<Task>(&args, ctx).await,
        ResourceKind::Certificates => get::<Certificate>(&args, ctx).await,
        ResourceKind::NodeFiles => get::<NodeFile>(&args, ctx).await,
    }
}

async fn get<R: Resource>(args: &GetArgs, ctx: &Context) -> Result<(), CliError> {
    let scope = Scope::for_kind(R::KIND, &args.scope)?;
    let getter = EntityGetter::new(
        R::cache::<EntityParams>(&ctx.registry),
        |params: &EntityParams| params.key.clone(),
        ctx.backend.entity_source::<R>(),
    )
    .with_config(&ctx.config.engine);

    let params = EntityParams {
        scope: scope.clone(),
        key: R::key_from_arg(&args.key, &args.algorithm),
    };
    let view = EntityView::new(getter).with_params(params);
    let fetched = view.fetch().await;
    debug!(kind = %R::KIND, state = %*view.state().current(), "fetched");
    view.dispose();

    let item = fetched.map_err(|err| not_found_or(err, args, &scope, ctx))?;
    let out = output::render_single(ctx.output, &*item, R::detail, R::display_id)?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}

/// A 404 for an existing parent means the resource itself is missing.
fn not_found_or(err: CoreError, args: &GetArgs, scope: &Scope, ctx: &Context) -> CliError {
    if err.is_not_found() && ctx.backend.has_scope(args.kind, scope) {
        return CliError::NotFound {
            resource_type: args.kind.singular().into(),
            identifier: args.key.clone(),
            list_command: list_command(args.kind, scope),
        };
    }
    err.into()
}

fn list_command(kind: ResourceKind, scope: &Scope) -> String {
    let mut command = kind.to_string();
    for (flag, value) in [("job", &scope.job), ("pool", &scope.pool), ("node", &scope.node)] {
        if let Some(value) = value {
            command.push_str(&format!(" --{flag} {value}"));
        }
    }
    command
}
