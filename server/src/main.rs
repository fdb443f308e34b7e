mod auth;
mod email;
mod error;
mod prompt;
mod rate_limiters;
mod routes;
mod server_config;
mod state;
#[cfg(test)]
mod testing;
mod util;

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use auth::{AuthStateStore, CredentialProvider, TokenStore};
use axum::{extract::FromRef, Router};
use email::client::{GraphMailbox, MailboxGateway};
use mimalloc::MiMalloc;
use prompt::{AzureOpenAiClient, ClassificationEngine};
use rate_limiters::RateLimiters;
use routes::AppRouter;
use server_config::{cfg, default_polling_interval, scheduler_auto_start, OAuthConfig};
use state::{reconciler::ReconcilerSettings, CycleDriver, InboxReconciler, ProcessingStore};
use tokio::{signal, task::JoinHandle};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
struct ServerState {
    http_client: HttpClient,
    oauth: Arc<OAuthConfig>,
    token_store: TokenStore,
    auth_states: AuthStateStore,
    engine: ClassificationEngine,
    mailbox: Arc<dyn MailboxGateway>,
    reconciler: InboxReconciler,
    driver: CycleDriver,
    rate_limiters: RateLimiters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(cfg.graph.request_timeout())
        .build()?;

    let token_store = TokenStore::new();
    let auth_states = AuthStateStore::new(cfg.oauth.state_ttl_secs);
    let rate_limiters = RateLimiters::from_env();

    let inference = cfg.inference.clone().map(|credentials| {
        AzureOpenAiClient::new(
            http_client.clone(),
            rate_limiters.clone(),
            credentials,
            cfg.model.clone(),
        )
    });
    let engine = ClassificationEngine::new(inference);

    let credentials: Arc<dyn CredentialProvider> = Arc::new(token_store.clone());
    let mailbox: Arc<dyn MailboxGateway> = Arc::new(GraphMailbox::new(
        http_client.clone(),
        credentials,
        &cfg.graph.base_url,
        cfg.graph.request_timeout(),
    )?);

    let reconciler = InboxReconciler::new(
        mailbox.clone(),
        Arc::new(engine.clone()),
        ProcessingStore::new(),
        ReconcilerSettings::from(&cfg.settings),
    );
    let driver = CycleDriver::new(reconciler.clone(), default_polling_interval());

    let state = ServerState {
        http_client,
        oauth: Arc::new(cfg.oauth.clone()),
        token_store,
        auth_states,
        engine,
        mailbox,
        reconciler,
        driver,
        rate_limiters,
    };

    let router = AppRouter::create(state.clone());

    let mut scheduler = JobScheduler::new().await?;
    {
        // Expire abandoned login attempts
        let auth_states = state.auth_states.clone();
        scheduler
            .add(Job::new_repeated(
                Duration::from_secs(3 * 60),
                move |_uuid, _lock| {
                    let removed = state::tasks::sweep_auth_states(&auth_states);
                    if removed > 0 {
                        tracing::debug!("Removed {} expired login states", removed);
                    }
                },
            )?)
            .await?;

        // Keep the access token ahead of expiry so scheduled cycles can run
        let http_client = state.http_client.clone();
        let oauth = state.oauth.clone();
        let token_store = state.token_store.clone();
        scheduler
            .add(Job::new_repeated_async(
                Duration::from_secs(5 * 60),
                move |uuid, _lock| {
                    let http_client = http_client.clone();
                    let oauth = oauth.clone();
                    let token_store = token_store.clone();
                    Box::pin(async move {
                        match state::tasks::refresh_token_if_needed(
                            &http_client,
                            &oauth,
                            &token_store,
                        )
                        .await
                        {
                            Ok(outcome) => {
                                tracing::debug!("Token refresh job {}: {:?}", uuid, outcome)
                            }
                            Err(e) => tracing::error!("Token refresh job {} failed: {:?}", uuid, e),
                        }
                    })
                },
            )?)
            .await?;
    }

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    match scheduler.start().await {
        Ok(_) => tracing::info!("Background jobs started"),
        Err(e) => tracing::error!("Failed to start background jobs: {:?}", e),
    }

    if scheduler_auto_start() {
        let interval = state.driver.default_interval();
        match state.driver.start(interval) {
            Ok(_) => tracing::info!("Cycle driver started, processing every {}s", interval),
            Err(e) => tracing::error!("Failed to start cycle driver: {}", e),
        }
    } else {
        tracing::info!("Cycle driver auto start disabled, use POST /scheduler/start");
    }

    let server_handle = run_server(router, scheduler, state.driver.clone());
    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {:?}", e);
    }

    Ok(())
}

async fn shutdown_signal(mut scheduler: JobScheduler, driver: CycleDriver) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    driver.stop();
    if let Err(e) = scheduler.shutdown().await {
        tracing::error!("Failed to shut down scheduler: {:?}", e);
    }
    tracing::info!("Cleanups done, shutting down");
}

fn run_server(router: Router, scheduler: JobScheduler, driver: CycleDriver) -> JoinHandle<()> {
    tokio::spawn(async move {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);
        tracing::info!("{}", *cfg);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to bind {}: {}", addr, e);
                return;
            }
        };
        tracing::info!("Mailsort server running on http://{}", addr);

        if let Err(e) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(scheduler, driver))
        .await
        {
            tracing::error!("Server error: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::{test_server_state, ScriptedMailbox};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_server_serves_health_over_tcp() {
        let state = test_server_state(Arc::new(ScriptedMailbox::new(vec![])), "http://127.0.0.1:9");
        let router = AppRouter::create(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");

        let _ = shutdown_tx.send(());
        server.await.unwrap();
    }
}
