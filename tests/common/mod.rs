#![allow(dead_code)]

use pfss::{
    config::AppConfig,
    db,
    models::{actor::Actor, user::RegisterRequest},
    state::AppState,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const ROOT_PASSWORD: &str = "root-password";
pub const PUBLIC_URL: &str = "http://pfss.test";

pub struct TestApp {
    pub state: AppState,
    pub cfg: AppConfig,
    // Keeps the blob directory alive for the duration of the test.
    pub storage: TempDir,
}

pub async fn setup() -> TestApp {
    let storage = TempDir::new().unwrap();
    let cfg = AppConfig {
        host: "127.0.0.1".into(),
        port: 8080,
        storage_dir: storage.path().to_string_lossy().into_owned(),
        database_url: "sqlite::memory:".into(),
        jwt_secret: "integration-secret".into(),
        jwt_ttl_hours: 1,
        root_password: ROOT_PASSWORD.into(),
        public_url: PUBLIC_URL.into(),
        max_upload_bytes: 1024 * 1024,
    };

    let pool = db::connect(&cfg.database_url, 1).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    db::bootstrap_root(&pool, &cfg.root_password).await.unwrap();

    let state = AppState::new(Arc::new(pool), &cfg);
    TestApp {
        state,
        cfg,
        storage,
    }
}

impl TestApp {
    pub async fn register(&self, username: &str) -> Actor {
        let (user, _) = self
            .state
            .auth
            .register(
                None,
                RegisterRequest {
                    username: username.into(),
                    password: "password123".into(),
                    is_root: false,
                },
            )
            .await
            .unwrap();
        self.state.users.resolve_actor(user.id).await.unwrap()
    }

    pub async fn root(&self) -> Actor {
        let (user, _) = self
            .state
            .auth
            .login(pfss::models::user::LoginRequest {
                username: db::ROOT_USERNAME.into(),
                password: ROOT_PASSWORD.into(),
            })
            .await
            .unwrap();
        self.state.users.resolve_actor(user.id).await.unwrap()
    }
}
