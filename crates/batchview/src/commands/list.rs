//! `list` handler: list view -> provider -> presenter -> output.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use batchview_core::{
    ListDataPresenter, ListDataProvider, ListGetter, ListOptions, ListView, SortDirection,
    SortingStatus,
};

use crate::cli::{ListArgs, ResourceKind};
use crate::error::CliError;
use crate::model::{Certificate, Job, NodeFile, Pool, Resource, Scope, Task};
use crate::output;

use super::Context;

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ListArgs, ctx: &Context) -> Result<(), CliError> {
    match args.kind {
        ResourceKind::Pools => list::<Pool>(&args, ctx).await,
        ResourceKind::Jobs => list::<Job>(&args, ctx).await,
        ResourceKind::Tasks => list::<Task>(&args, ctx).await,
        ResourceKind::Certificates => list::<Certificate>(&args, ctx).await,
        ResourceKind::NodeFiles => list::<NodeFile>(&args, ctx).await,
    }
}

async fn list<R: Resource>(args: &ListArgs, ctx: &Context) -> Result<(), CliError> {
    let scope = Scope::for_kind(R::KIND, &args.scope)?;
    let sort_config = R::sort_config();
    if let Some(key) = args.sort.as_deref() {
        if !sort_config.contains(key) {
            return Err(CliError::Validation {
                field: "--sort".into(),
                reason: format!(
                    "unknown sort key '{key}' for {}; expected one of: {}",
                    R::KIND,
                    sort_config.keys().collect::<Vec<_>>().join(", ")
                ),
            });
        }
    }

    let engine = &ctx.config.engine;
    let getter = ListGetter::new(R::cache::<Scope>(&ctx.registry), ctx.backend.page_source(R::KIND))
        .with_config(engine);
    let view = Arc::new(ListView::new(getter, scope, list_options(args, ctx)));
    let provider = Arc::new(ListDataProvider::with_source(Arc::clone(&view))?);
    let presenter = ListDataPresenter::new(Arc::clone(&provider), sort_config, engine)?;

    if let Some(key) = args.sort.as_deref() {
        let direction = if args.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        presenter.sort_by(Some(key), Some(direction))?;
    }

    let loaded = if args.all {
        load_all(&presenter, R::KIND, ctx.quiet).await
    } else {
        load_pages(&view, args.pages).await.map(|()| presenter.update())
    };

    let items = presenter.current();
    let sorting = *presenter.sorting_status().current();
    let has_more = *view.has_more().current();
    presenter.dispose();
    provider.dispose();
    view.dispose();
    loaded?;

    debug!(kind = %R::KIND, count = items.len(), has_more, %sorting, "listed");

    let out = output::render_list(
        ctx.output,
        items.as_slice(),
        |item| R::Row::from(&**item),
        |item| item.display_id(),
    )?;
    output::print_output(&out, ctx.quiet);

    if sorting == SortingStatus::Partial {
        output::warn(
            &format!(
                "only the {} loaded {} are sorted; pass --all to sort the whole collection",
                items.len(),
                R::KIND
            ),
            ctx.color,
            ctx.quiet,
        );
    } else if has_more {
        output::hint(
            &format!("More {} available; pass --all or --pages to load them.", R::KIND),
            ctx.color,
            ctx.quiet,
        );
    }
    Ok(())
}

fn list_options(args: &ListArgs, ctx: &Context) -> ListOptions {
    let page_size = args
        .page_size
        .or(ctx.config.engine.page_size)
        .unwrap_or(ctx.config.defaults.page_size);
    let mut options = ListOptions::new().with_page_size(page_size);
    if let Some(filter) = &args.filter {
        options = options.with_filter(filter.clone());
    }
    if let Some(limit) = args.limit {
        options = options.with_max_items(limit);
    }
    options
}

// ── Loading ─────────────────────────────────────────────────────────

async fn load_pages<R: Resource>(view: &ListView<Scope, R>, pages: u32) -> Result<(), CliError> {
    for _ in 0..pages {
        view.fetch_next().await?;
        if !*view.has_more().current() {
            break;
        }
    }
    Ok(())
}

/// Drain every page behind a spinner, then sort the complete list.
async fn load_all<R: Resource>(
    presenter: &ListDataPresenter<R>,
    kind: ResourceKind,
    quiet: bool,
) -> Result<(), CliError> {
    let spinner = spinner(kind, quiet);
    let mut progress = presenter.provider().items();
    let fetch = presenter.fetch_all_and_sort();
    tokio::pin!(fetch);

    let result = loop {
        tokio::select! {
            result = &mut fetch => break result,
            Some(items) = progress.changed() => {
                spinner.set_message(format!("Loaded {} {kind}", items.len()));
            }
        }
    };
    spinner.finish_and_clear();
    result.map_err(CliError::from)
}

fn spinner(kind: ResourceKind, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(format!("Loading {kind}"));
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
