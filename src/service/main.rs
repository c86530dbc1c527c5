use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard::acl::ApiKeyAuthorizer;
use shipyard::config::ServiceConfig;
use shipyard::http::http_router;
use shipyard::persistence::relational::{
    ApiKeyRelationalPersistence, PublishHistoryRelationalPersistence,
    PublishStatusRelationalPersistence, ResourceRelationalPersistence,
    TemplateRelationalPersistence,
};
use shipyard::publish::PublishOrchestrator;
use shipyard::services::{
    PublishHistoryService, PublishStatusService, ResourceService, TemplateService,
};
use shipyard_kube_gateway::{ClusterRegistry, KubeGatewayFactory};

const SERVICE_NAME: &str = "shipyard-api";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env()?;

    let jaeger_layer = if config.jaeger_enabled {
        let tracer = opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name(SERVICE_NAME)
            .install_simple()?;

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(jaeger_layer)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::warn!("rustls crypto provider was already installed");
    }

    let db = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?,
    );

    sqlx::migrate!().run(&*db).await?;

    let registry = ClusterRegistry::load(&config.clusters_config).await?;
    tracing::info!(
        "loaded {} clusters from {}",
        registry.clusters.len(),
        config.clusters_config.display()
    );

    let template_service = Arc::new(TemplateService {
        persistence: Box::new(TemplateRelationalPersistence {
            db: Arc::clone(&db),
        }),
    });

    let publish_status_service = Arc::new(PublishStatusService {
        persistence: Box::new(PublishStatusRelationalPersistence {
            db: Arc::clone(&db),
        }),
    });

    let publish_history_service = Arc::new(PublishHistoryService {
        persistence: Box::new(PublishHistoryRelationalPersistence {
            db: Arc::clone(&db),
        }),
    });

    let resource_service = Arc::new(ResourceService {
        persistence: Box::new(ResourceRelationalPersistence {
            db: Arc::clone(&db),
        }),
    });

    let authorizer = Arc::new(ApiKeyAuthorizer {
        persistence: Box::new(ApiKeyRelationalPersistence {
            db: Arc::clone(&db),
        }),
    });

    let orchestrator = Arc::new(PublishOrchestrator::new(
        template_service,
        publish_status_service,
        publish_history_service,
        resource_service,
        Arc::new(KubeGatewayFactory::new(registry)),
        authorizer,
        config.publish_concurrency,
    ));

    let router = http_router(orchestrator).layer(TraceLayer::new_for_http());

    tracing::info!("http api listening on {}", config.endpoint);

    let served = axum::Server::bind(&config.endpoint)
        .serve(router.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {err}");
            }
        })
        .await;

    tracing::info!("http api stopped");

    // flush spans still buffered for jaeger
    if config.jaeger_enabled {
        opentelemetry::global::shutdown_tracer_provider();
    }

    served?;

    Ok(())
}
