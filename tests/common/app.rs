use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::broadcast;

use ufam_hub_backend::config::{AuthConfig, Config, RateLimitConfig, ServerConfig, WorkerConfig};
use ufam_hub_backend::logging::LogConfig;
use ufam_hub_backend::routes::build_router;
use ufam_hub_backend::services::clock::FixedClock;
use ufam_hub_backend::srs::SchedulerConfig;
use ufam_hub_backend::state::AppState;
use ufam_hub_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub clock: Arc<FixedClock>,
    _temp_dir: TempDir,
}

/// Builds the config directly instead of through `set_var`, so parallel
/// tests do not race on the process environment.
fn test_config(sled_path: String, limits: RateLimitConfig) -> Config {
    Config {
        server: ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            cors_origin: "http://localhost:5173".to_string(),
            trust_proxy: false,
        },
        log: LogConfig::default(),
        sled_path,
        auth: AuthConfig {
            jwt_secret: format!("integration-test-jwt-secret-{}", uuid::Uuid::new_v4()),
            token_ttl_hours: 24,
        },
        rate_limit: limits,
        worker: WorkerConfig { is_leader: false },
        srs: SchedulerConfig::default(),
    }
}

async fn spawn_with_limits(limits: RateLimitConfig) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("ufam-hub-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string(), limits);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let clock = Arc::new(FixedClock::new(Utc::now()));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::with_clock(store, &config, shutdown_tx, clock.clone());

    TestApp {
        app: build_router(state.clone()),
        state,
        config,
        clock,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_server() -> TestApp {
    spawn_test_server_with_limits(10_000, 10_000).await
}

/// Per-client budgets for `/api` and for `/api/reviews`, over a 60 s window.
pub async fn spawn_test_server_with_limits(api_max: u64, reviews_max: u64) -> TestApp {
    spawn_with_limits(RateLimitConfig {
        window_secs: 60,
        api_max_requests: api_max,
        review_max_requests: reviews_max,
    })
    .await
}
