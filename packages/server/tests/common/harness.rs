//! Test harness for integration testing.
//!
//! `TestHarness` wires the full dependency container over the in-memory
//! store; every test gets its own store, bus and sessions. `PgHarness` runs
//! the Postgres store against a shared testcontainers database (Docker).

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bubble_core::common::GroupId;
use bubble_core::domains::groups::models::{Group, Member, NewGroup, TargetSize};
use bubble_core::kernel::{InMemoryCandidateStore, PgCandidateStore, ServerDeps};
use bubble_core::server::build_app;
use serde_json::Value;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use tower::ServiceExt;

use super::EventRecorder;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// In-memory harness
// =============================================================================

pub struct TestHarness {
    pub deps: ServerDeps,
    /// Same store as `deps.store`, with its test controls.
    pub store: InMemoryCandidateStore,
    pub events: EventRecorder,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {
        self.events.detach();
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(InMemoryCandidateStore::new())
    }

    pub fn with_store(store: InMemoryCandidateStore) -> Self {
        init_tracing();
        let deps = ServerDeps::new(Arc::new(store.clone()), None, 20);
        let events = EventRecorder::attach(&deps.bus);
        Self {
            deps,
            store,
            events,
        }
    }

    /// A group created already at its target size.
    pub async fn complete_group(&self, name: &str, size: TargetSize) -> Group {
        let founders = (0..size.get())
            .map(|i| Member::new(format!("{}-{}", name, i)))
            .collect();
        self.deps
            .formation
            .create_group(NewGroup::new(name, size, founders))
            .await
            .expect("create complete group")
    }

    /// A group with one founder, still forming.
    pub async fn forming_group(&self, name: &str, size: TargetSize) -> Group {
        self.deps
            .formation
            .create_group(NewGroup::new(
                name,
                size,
                vec![Member::new(format!("{}-0", name))],
            ))
            .await
            .expect("create forming group")
    }

    /// Walk every candidate page for `group_id`.
    pub async fn all_candidates(&self, group_id: GroupId, page_size: usize) -> Vec<GroupId> {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .deps
                .candidates
                .fetch_candidates(group_id, page_size, cursor.as_ref())
                .await
                .expect("fetch candidates");
            seen.extend(page.candidates.iter().map(|g| g.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return seen,
            }
        }
    }

    pub fn router(&self) -> Router {
        build_app(self.deps.clone(), &[])
    }

    /// Send one request through the router and decode the JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

// =============================================================================
// Postgres harness
// =============================================================================

/// Shared Postgres container; started and migrated once per test binary.
struct SharedPostgres {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_POSTGRES: OnceCell<SharedPostgres> = OnceCell::const_new();

impl SharedPostgres {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_POSTGRES
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared Postgres")
            })
            .await
    }
}

pub struct PgHarness {
    pub db_pool: PgPool,
    pub store: PgCandidateStore,
}

impl AsyncTestContext for PgHarness {
    async fn setup() -> Self {
        let infra = SharedPostgres::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .expect("Failed to connect to test database");
        Self {
            store: PgCandidateStore::new(db_pool.clone()),
            db_pool,
        }
    }
}
