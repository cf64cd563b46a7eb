use crate::backend::DemoBackend;
use crate::config::Config;
use anyhow::Result;
use chrono::Utc;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use playback_cache::{InvalidationEvent, QueryCache, SyncInvalidationHook};
use playback_core::{BoundingBox, Coordinates, Interval, QueryError, QueryParams, Resolution};
use playback_executor::{CachedQueryExecutor, QueryBackend, QueryRequest, QueryResponse};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEFAULT_TOP_USERS: usize = 10;
const MAX_TOP_USERS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryKind {
    /// Playback locations inside a bounding box (west, south, east, north)
    Viewport,
    /// Playback locations within radius_km of lat/lon
    Nearby,
    /// Playback counts per grid cell at a resolution (6-8)
    Hexagons,
    /// Playback counts per time bucket (hour, day, week, month)
    Trends,
    /// Most active users
    Users,
}

impl QueryKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            QueryKind::Viewport => "SpatialViewport",
            QueryKind::Nearby => "SpatialNearby",
            QueryKind::Hexagons => "SpatialHexagons",
            QueryKind::Trends => "AnalyticsTrends",
            QueryKind::Users => "AnalyticsTopUsers",
        }
    }
}

/// Backend, cache and executor wired together for one CLI run
pub struct App {
    pub backend: Arc<DemoBackend>,
    pub cache: Option<Arc<QueryCache>>,
    pub executor: Arc<CachedQueryExecutor>,
    shutdown: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(config: &Config, records: usize, latency: Duration) -> Self {
        let backend = Arc::new(
            DemoBackend::generate(records, Utc::now())
                .with_spatial(config.spatial_enabled)
                .with_latency(latency),
        );
        let cache = config
            .enabled
            .then(|| Arc::new(QueryCache::new(config.cache_config())));

        let shutdown = CancellationToken::new();
        let sweeper = cache.as_ref().and_then(|cache| {
            cache
                .config()
                .sweep_interval
                .map(|interval| cache.spawn_sweeper(interval, shutdown.child_token()))
        });

        let mut executor = CachedQueryExecutor::new(
            Some(Arc::clone(&backend) as Arc<dyn QueryBackend>),
            cache.clone(),
        );
        if config.single_flight {
            executor = executor.with_single_flight();
        }

        tracing::debug!(
            records,
            cache = cache.is_some(),
            single_flight = config.single_flight,
            spatial = config.spatial_enabled,
            "Demo backend ready"
        );

        Self {
            backend,
            cache,
            executor: Arc::new(executor),
            shutdown,
            sweeper,
        }
    }

    pub fn sync_hook(&self) -> SyncInvalidationHook {
        SyncInvalidationHook::new(self.cache.clone())
    }

    pub async fn run(
        &self,
        kind: QueryKind,
        params: &QueryParams,
    ) -> Result<QueryResponse, QueryError> {
        run_query(&self.executor, &self.backend, kind, params).await
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Some(sweeper) = self.sweeper {
            let _ = sweeper.await;
        }
    }
}

/// Dispatch one query through the executor. Spatial parameters are
/// validated here, before the executor sees the request.
pub async fn run_query(
    executor: &CachedQueryExecutor,
    backend: &Arc<DemoBackend>,
    kind: QueryKind,
    params: &QueryParams,
) -> Result<QueryResponse, QueryError> {
    let request = QueryRequest::new(params.clone());
    let backend = Arc::clone(backend);
    let prefix = kind.prefix();

    match kind {
        QueryKind::Viewport => {
            let bbox = BoundingBox::from_params(params)?;
            executor
                .execute_spatial(
                    &request,
                    prefix,
                    &bbox,
                    bbox,
                    move |ctx, filter, bbox| async move {
                        backend.round_trip(&ctx).await?;
                        Ok(backend.viewport(&filter, &bbox))
                    },
                )
                .await
        }
        QueryKind::Nearby => {
            let center = Coordinates::from_params(params, true)?;
            executor
                .execute_spatial(
                    &request,
                    prefix,
                    &center,
                    center,
                    move |ctx, filter, center| async move {
                        backend.round_trip(&ctx).await?;
                        Ok(backend.nearby(&filter, &center))
                    },
                )
                .await
        }
        QueryKind::Hexagons => {
            let resolution = Resolution::from_params(params, Resolution::default().value())?;
            executor
                .execute_spatial(
                    &request,
                    prefix,
                    &resolution,
                    resolution,
                    move |ctx, filter, resolution| async move {
                        backend.round_trip(&ctx).await?;
                        Ok(backend.grid_cells(&filter, resolution))
                    },
                )
                .await
        }
        QueryKind::Trends => {
            let interval = Interval::from_params(params, Interval::Day)?;
            executor
                .execute_with_param(
                    &request,
                    prefix,
                    interval,
                    move |ctx, filter, interval| async move {
                        backend.round_trip(&ctx).await?;
                        Ok(backend.trends(&filter, interval))
                    },
                )
                .await
        }
        QueryKind::Users => {
            let limit = parse_top_users(params)?;
            executor
                .execute_with_param(
                    &request,
                    prefix,
                    limit,
                    move |ctx, filter, limit| async move {
                        backend.round_trip(&ctx).await?;
                        Ok(backend.top_users(&filter, limit))
                    },
                )
                .await
        }
    }
}

fn parse_top_users(params: &QueryParams) -> Result<usize, QueryError> {
    let Some(raw) = params.get("limit") else {
        return Ok(DEFAULT_TOP_USERS);
    };
    match raw.parse::<usize>() {
        Ok(limit) if (1..=MAX_TOP_USERS).contains(&limit) => Ok(limit),
        _ => Err(QueryError::validation(format!(
            "invalid limit '{}' (must be 1 to {})",
            raw, MAX_TOP_USERS
        ))),
    }
}

/// Parse `name=value` pairs given on the command line
pub fn parse_params(pairs: &[String]) -> Result<QueryParams> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Expected name=value, got '{}'", pair))
        })
        .collect()
}

pub async fn execute_query(
    app: &App,
    kind: QueryKind,
    params: &QueryParams,
    repeat: usize,
) -> Result<()> {
    println!(
        "{} Running {} {} time(s)...",
        "→".bright_blue(),
        kind.prefix().bright_cyan(),
        repeat
    );

    let mut last = None;
    for _ in 0..repeat.max(1) {
        match app.run(kind, params).await {
            Ok(response) => {
                print_outcome(kind.prefix(), params, &response);
                last = Some(response);
            }
            Err(err) => {
                print_error(&err)?;
                return Ok(());
            }
        }
    }

    if let Some(response) = last {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}

/// End-to-end walk through caching, isolation, invalidation and, when
/// enabled, single-flight collapsing of concurrent misses
pub async fn run_demo(app: &App, concurrent: usize) -> Result<()> {
    let viewport = QueryParams::new()
        .with("west", "-76")
        .with("south", "39")
        .with("east", "-73")
        .with("north", "41.5")
        .with("days", "30");
    let alice = viewport.clone().with("users", "alice");
    let bob = viewport.clone().with("users", "bob");

    section("Read-through caching");
    for params in [&alice, &alice, &bob] {
        let response = app.run(QueryKind::Viewport, params).await?;
        print_outcome(QueryKind::Viewport.prefix(), params, &response);
    }

    section("Same filter, different parameter");
    for interval in ["day", "week", "day"] {
        let params = QueryParams::new().with("days", "90").with("interval", interval);
        let response = app.run(QueryKind::Trends, &params).await?;
        print_outcome(QueryKind::Trends.prefix(), &params, &response);
    }

    section("Rejected requests");
    for (kind, params) in [
        (QueryKind::Viewport, alice.clone().with("days", "0")),
        (QueryKind::Hexagons, QueryParams::new().with("resolution", "12")),
        (QueryKind::Nearby, QueryParams::new().with("lat", "40.7").with("lon", "-74")),
    ] {
        match app.run(kind, &params).await {
            Ok(response) => print_outcome(kind.prefix(), &params, &response),
            Err(err) => print_error(&err)?,
        }
    }

    if concurrent > 1 {
        section("Concurrent identical requests");
        let before = app.backend.executions();
        let params = QueryParams::new().with("limit", "3");
        let mut handles = Vec::with_capacity(concurrent);
        for _ in 0..concurrent {
            let executor = Arc::clone(&app.executor);
            let backend = Arc::clone(&app.backend);
            let params = params.clone();
            handles.push(tokio::spawn(async move {
                run_query(&executor, &backend, QueryKind::Users, &params).await
            }));
        }
        let mut cached = 0;
        for handle in handles {
            if handle.await??.is_cached() {
                cached += 1;
            }
        }
        println!(
            "  {} requests, {} served from cache, {} backend execution(s)",
            concurrent,
            cached.to_string().bright_green(),
            (app.backend.executions() - before).to_string().bright_yellow()
        );
    }

    section("Sync completion");
    let (tx, rx) = mpsc::channel(8);
    let listener_cancel = CancellationToken::new();
    let listener = tokio::spawn(app.sync_hook().run(rx, listener_cancel.clone()));
    tx.send(InvalidationEvent::sync_completed(42, app.backend.len() as u64))
        .await?;
    drop(tx);
    listener.await?;
    println!("  {} sync of 42 new records applied", "✓".bright_green());

    let response = app.run(QueryKind::Viewport, &alice).await?;
    print_outcome(QueryKind::Viewport.prefix(), &alice, &response);

    print_cache_stats(app);
    Ok(())
}

pub fn print_cache_stats(app: &App) {
    println!();
    println!("{}", "Query Cache Statistics".bright_yellow().bold());
    println!();

    let Some(cache) = &app.cache else {
        println!("  {}", "Cache not configured, every query ran".bright_black());
        println!("  Backend executions: {}", app.backend.executions());
        return;
    };
    let stats = cache.snapshot();

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Metric").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Green),
    ]);

    table.add_row(vec![
        "Enabled",
        if cache.is_enabled() { "Yes" } else { "No" },
    ]);
    table.add_row(vec!["TTL", &format!("{}s", cache.config().ttl.as_secs())]);
    table.add_row(vec!["Entries", &stats.entry_count.to_string()]);
    table.add_row(vec!["Total Requests", &(stats.hits + stats.misses).to_string()]);
    table.add_row(vec!["Hits", &stats.hits.to_string()]);
    table.add_row(vec!["Misses", &stats.misses.to_string()]);
    table.add_row(vec!["Hit Rate", &format!("{:.1}%", stats.hit_rate * 100.0)]);
    table.add_row(vec!["Insertions", &stats.insertions.to_string()]);
    table.add_row(vec!["Expirations", &stats.expirations.to_string()]);
    table.add_row(vec!["Clears", &stats.clears.to_string()]);
    table.add_row(vec![
        "Backend Executions",
        &app.backend.executions().to_string(),
    ]);

    println!("{}", table);
}

pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file: {:?}", path);
    }
    Config::default().save(path)?;
    println!(
        "{} Wrote default configuration to {:?}",
        "✓".bright_green(),
        path
    );
    Ok(())
}

fn section(title: &str) {
    println!();
    println!("{}", title.bright_yellow().bold());
}

fn print_outcome(prefix: &str, params: &QueryParams, response: &QueryResponse) {
    let outcome = if response.is_cached() {
        "HIT ".bright_green()
    } else {
        "MISS".yellow()
    };
    let rows = response
        .data
        .as_array()
        .map_or(1, |rows| rows.len());
    let users = params.get("users").unwrap_or("*");

    println!(
        "  {} {:<18} users={:<6} {:>4}ms  {} row(s)",
        outcome,
        prefix,
        users,
        response.metadata.query_time_ms,
        rows
    );
}

fn print_error(err: &QueryError) -> Result<()> {
    // rejected before the cache or backend were touched
    let label = if err.is_precondition() {
        "SKIP".bright_magenta()
    } else {
        "ERR ".bright_red()
    };
    println!(
        "  {} {} {}",
        label,
        err.status_code(),
        serde_json::to_string(&err.to_response())?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(config: Config) -> App {
        App::new(&config, 300, Duration::from_millis(2))
    }

    fn east_coast() -> QueryParams {
        QueryParams::new()
            .with("west", "-76")
            .with("south", "39")
            .with("east", "-73")
            .with("north", "41.5")
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(&["users=alice,bob".into(), "days= 7".into()]).unwrap();
        assert_eq!(params.get("users"), Some("alice,bob"));
        assert_eq!(params.get("days"), Some("7"));
        assert!(parse_params(&["oops".into()]).is_err());
    }

    #[tokio::test]
    async fn test_viewport_cached_per_user() {
        let app = app(Config::default());
        let alice = east_coast().with("users", "alice");

        assert!(!app.run(QueryKind::Viewport, &alice).await.unwrap().is_cached());
        assert!(app.run(QueryKind::Viewport, &alice).await.unwrap().is_cached());
        let bob = east_coast().with("users", "bob");
        assert!(!app.run(QueryKind::Viewport, &bob).await.unwrap().is_cached());
        assert_eq!(app.backend.executions(), 2);

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_spatial_disabled() {
        let app = app(Config {
            spatial_enabled: false,
            ..Config::default()
        });

        let err = app.run(QueryKind::Viewport, &east_coast()).await.unwrap_err();
        assert_eq!(err.code(), "EXTENSION_UNAVAILABLE");

        let trends = app
            .run(QueryKind::Trends, &QueryParams::new().with("interval", "week"))
            .await
            .unwrap();
        assert!(!trends.is_cached());
        assert_eq!(app.backend.executions(), 1);
    }

    #[tokio::test]
    async fn test_bad_spatial_params_rejected_before_backend() {
        let app = app(Config::default());
        let params = QueryParams::new().with("resolution", "12");
        let err = app.run(QueryKind::Hexagons, &params).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let err = app
            .run(QueryKind::Users, &QueryParams::new().with("limit", "0"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(app.backend.executions(), 0);
    }

    #[tokio::test]
    async fn test_no_cache_runs_every_time() {
        let app = app(Config {
            enabled: false,
            ..Config::default()
        });
        let params = QueryParams::new().with("interval", "day");
        for _ in 0..3 {
            assert!(!app.run(QueryKind::Trends, &params).await.unwrap().is_cached());
        }
        assert_eq!(app.backend.executions(), 3);
        // no cache to clear
        app.sync_hook().handle(&InvalidationEvent::ManualClear);
    }

    #[tokio::test]
    async fn test_sync_hook_clears_app_cache() {
        let app = app(Config::default());
        let params = QueryParams::new().with("limit", "2");

        app.run(QueryKind::Users, &params).await.unwrap();
        app.sync_hook().on_sync_completed(1, 301);
        assert!(!app.run(QueryKind::Users, &params).await.unwrap().is_cached());
        assert_eq!(app.backend.executions(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_demo_runs_with_single_flight_and_sweeper() {
        let app = app(Config {
            single_flight: true,
            sweep_interval_secs: Some(1),
            ..Config::default()
        });
        run_demo(&app, 6).await.unwrap();
        app.shutdown().await;
    }
}
