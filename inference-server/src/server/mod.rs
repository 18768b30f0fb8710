use {
    std::{net::SocketAddr, sync::Arc},
    tracing::{info, error},
    config::Config,
    anyhow::{Result, Context as _},
    prometheus::Registry,
    crate::{
        context::{Context, ClassificationScheduler},
        handlers::rest::rest_router,
        models::{load_model, executor::ClassifierExecutor},
        scheduling::{SchedulerConfig, SchedulerMetrics},
    },
    self::metrics::{MetricsConfig, ServiceMetrics, collect_metrics},
};

pub mod metrics;

pub async fn run_server(config: &Config) -> Result<()> {
    let registry = Registry::new_custom(Some("serving".to_owned()), None)?;
    let service_metrics = ServiceMetrics::new(&registry)?;

    let loaded = load_model(config);
    service_metrics.record_model_load_time(loaded.load_time);

    let scheduler_config = SchedulerConfig::from_config(config)?;
    let scheduler = Arc::new(ClassificationScheduler::new(scheduler_config, SchedulerMetrics::new(&registry)?));
    scheduler.start(ClassifierExecutor::new(loaded.model.clone()))?;

    let context = Arc::new(Context::new(
        scheduler.clone(),
        Some(loaded.model),
        service_metrics,
        registry,
    ));

    let metrics_collector = tokio::spawn({
        let scheduler = scheduler.clone();
        let metrics_config = MetricsConfig::from_config(config);
        async move { collect_metrics(metrics_config, &scheduler).await }
    });

    let served = run_axum_server(config, context).await;

    metrics_collector.abort();
    scheduler.stop().await;

    served
}

pub async fn run_axum_server(config: &Config, context: Arc<Context>) -> Result<()> {
    let host = config.get_string("server.host").unwrap_or("0.0.0.0".to_owned());
    let port = config.get_int("server.port").unwrap_or(8000);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;

    info!("starting axum server on {:?}", addr);

    axum::Server::try_bind(&addr)?
        .serve(rest_router(context).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {:?}", err);
        std::future::pending::<()>().await;
    }

    info!("shutdown signal received");
}
