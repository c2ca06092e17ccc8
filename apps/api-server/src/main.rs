//! api-server: HTTP API for the shopping list workspace.
//!
//! Exposes list, product and site endpoints and supports:
//! - Storage: In-memory, SQLite (file) with the `sqlite` feature, or the hosted
//!   Firestore database with the `firestore` feature.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string) for the web client.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # against Firestore (or its emulator via FIRESTORE_EMULATOR_HOST)
//! STORAGE_PROVIDER=firestore FIRESTORE_PROJECT_ID=my-project \
//!   cargo run -p api-server --features firestore
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use domain::adapters::memory_repo::{InMemoryShoppingRepo, InMemorySiteRepo};
use domain::service::ShoppingService;
use domain::{
    Clock, CoreError, DocumentId, NewProduct, NewSite, Product, ProductInput, ShoppingList,
    ShoppingListRepository, Site, SiteRepository,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local repo abstraction over the storage backends (feature-gated).
enum RepoKind {
    Memory {
        lists: InMemoryShoppingRepo,
        sites: InMemorySiteRepo,
    },
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
    #[cfg(feature = "firestore")]
    Firestore(firestore_adapter::FirestoreRepo),
}

#[derive(Clone)]
struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory {
                lists: InMemoryShoppingRepo::new(),
                sites: InMemorySiteRepo::new(),
            }),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(cfg: &config::Config) -> Result<Self, CoreError> {
        let repo = match &cfg.db_path {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                sqlite_adapter::SqliteRepo::new(path)?
            }
            None => sqlite_adapter::SqliteRepo::from_env()?,
        };
        info!(lists = sqlite_adapter::count_lists(&repo)?, "sqlite storage ready");
        Ok(Self {
            kind: Arc::new(RepoKind::Sqlite(repo)),
        })
    }

    #[cfg(feature = "firestore")]
    fn firestore(cfg: &config::Config) -> Result<Self, CoreError> {
        let mut fs_cfg = firestore_adapter::FirestoreConfig::from_env()?;
        if let Some(project) = &cfg.firestore_project_id {
            fs_cfg.project_id = project.clone();
        }
        info!(
            project = %fs_cfg.project_id,
            emulator = fs_cfg.emulator_host.is_some(),
            "firestore storage ready"
        );
        Ok(Self {
            kind: Arc::new(RepoKind::Firestore(firestore_adapter::FirestoreRepo::new(
                fs_cfg,
            )?)),
        })
    }

    fn lists(&self) -> &dyn ShoppingListRepository {
        match &*self.kind {
            RepoKind::Memory { lists, .. } => lists,
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r,
            #[cfg(feature = "firestore")]
            RepoKind::Firestore(r) => r,
        }
    }

    fn sites(&self) -> &dyn SiteRepository {
        match &*self.kind {
            RepoKind::Memory { sites, .. } => sites,
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r,
            #[cfg(feature = "firestore")]
            RepoKind::Firestore(r) => r,
        }
    }
}

impl ShoppingListRepository for AnyRepo {
    fn latest_list(&self) -> Result<Option<ShoppingList>, CoreError> {
        self.lists().latest_list()
    }

    fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError> {
        self.lists().recent_lists(limit)
    }

    fn get_list(&self, id: &DocumentId) -> Result<Option<ShoppingList>, CoreError> {
        self.lists().get_list(id)
    }

    fn create_list(&self, list: ShoppingList) -> Result<(), CoreError> {
        self.lists().create_list(list)
    }

    fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError> {
        self.lists().list_products(list_id)
    }

    fn get_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<Option<Product>, CoreError> {
        self.lists().get_product(list_id, product_id)
    }

    fn insert_product(
        &self,
        list_id: &DocumentId,
        product: NewProduct,
    ) -> Result<Product, CoreError> {
        self.lists().insert_product(list_id, product)
    }

    fn update_product(&self, list_id: &DocumentId, product: &Product) -> Result<(), CoreError> {
        self.lists().update_product(list_id, product)
    }

    fn set_purchased(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
        purchased: bool,
    ) -> Result<(), CoreError> {
        self.lists().set_purchased(list_id, product_id, purchased)
    }

    fn delete_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<(), CoreError> {
        self.lists().delete_product(list_id, product_id)
    }
}

impl SiteRepository for AnyRepo {
    fn insert_site(&self, site: NewSite) -> Result<Site, CoreError> {
        self.sites().insert_site(site)
    }

    fn list_sites(&self) -> Result<Vec<Site>, CoreError> {
        self.sites().list_sites()
    }
}

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}

type Service = ShoppingService<AnyRepo, AnyRepo, StdClock>;

#[derive(Clone)]
struct AppState {
    svc: Arc<Service>,
    default_list_id: DocumentId,
}

impl AppState {
    fn new(repo: AnyRepo, default_list_id: DocumentId) -> Self {
        Self {
            svc: Arc::new(ShoppingService::new(repo.clone(), repo, StdClock)),
            default_list_id,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_ephemeral();

    let repo = build_repo(&cfg);
    let state = AppState::new(repo, cfg.default_list_id.clone());

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, default_list = %cfg.default_list_id, "api-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo(cfg: &config::Config) -> AnyRepo {
    info!(
        provider = ?cfg.storage_provider,
        db_path = ?cfg.db_path,
        project = ?cfg.firestore_project_id,
        "selecting storage"
    );
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => match AnyRepo::sqlite(cfg) {
            Ok(r) => r,
            Err(e) => {
                error!(err = %e, "failed to init SqliteRepo; falling back to memory");
                AnyRepo::memory()
            }
        },
        // Remote storage failing at startup is fatal; silently serving an
        // empty in-memory list would hide the user's data.
        #[cfg(feature = "firestore")]
        config::StorageProvider::Firestore => match AnyRepo::firestore(cfg) {
            Ok(r) => r,
            Err(e) => {
                error!(err = %e, "failed to init FirestoreRepo");
                std::process::exit(1);
            }
        },
        _ => AnyRepo::memory(),
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/lists", get(list_lists))
        // `latest` is a reserved list id: reads resolve the newest list and
        // writes are refused with `invalid_id`.
        .route(
            "/api/lists/latest/products",
            get(latest_products).post(reserved_list),
        )
        .route(
            "/api/lists/:list_id/products",
            get(list_products).post(upsert_product),
        )
        .route(
            "/api/lists/:list_id/products/:product_id",
            delete(delete_product),
        )
        .route(
            "/api/lists/:list_id/products/:product_id/purchase",
            post(mark_purchased),
        )
        .route("/api/products", post(upsert_default_product))
        .route("/api/products/:product_id", delete(delete_default_product))
        .route(
            "/api/products/:product_id/purchase",
            post(mark_default_purchased),
        )
        .route("/api/sites", get(list_sites).post(create_site))
}

#[derive(Deserialize)]
struct ProductReq {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    site: Option<String>,
    // Signed so negative values reach validation instead of failing decode.
    #[serde(default)]
    quantity: Option<i64>,
    #[serde(default)]
    purchased: bool,
}

#[derive(Deserialize)]
struct SiteReq {
    name: String,
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ProductOut {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u32>,
    purchased: bool,
}

impl From<Product> for ProductOut {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.as_str().to_string(),
            name: p.name,
            site: p.site,
            quantity: p.quantity,
            purchased: p.purchased,
        }
    }
}

#[derive(Serialize)]
struct ProductsOut {
    products: Vec<ProductOut>,
}

#[derive(Serialize)]
struct ListOut {
    id: String,
    registered_at: String,
}

#[derive(Serialize)]
struct ListsOut {
    lists: Vec<ListOut>,
}

#[derive(Serialize)]
struct SiteOut {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct SitesOut {
    sites: Vec<SiteOut>,
}

#[derive(Serialize)]
struct IdOut {
    id: String,
}

/// Map a domain error to an HTTP response. Storage failures are logged here.
fn error_response(op: &'static str, e: CoreError) -> Response {
    match e {
        CoreError::NotFound => {
            (StatusCode::NOT_FOUND, Json(http_common::json_err("not_found"))).into_response()
        }
        CoreError::InvalidId(_) => (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message("invalid_id", &e.to_string())),
        )
            .into_response(),
        CoreError::InvalidName(_) | CoreError::InvalidQuantity => (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "invalid_request",
                &e.to_string(),
            )),
        )
            .into_response(),
        CoreError::AlreadyExists => {
            (StatusCode::CONFLICT, Json(http_common::json_err("conflict"))).into_response()
        }
        CoreError::ProductPurchased => {
            (StatusCode::CONFLICT, Json(http_common::json_err("purchased"))).into_response()
        }
        CoreError::Repository(_) => {
            error!(op, err = ?e, "storage error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(http_common::json_error_with_message("internal", "server error")),
            )
                .into_response()
        }
    }
}

fn parse_id(raw: String) -> Result<DocumentId, Response> {
    DocumentId::new(raw).map_err(|e| {
        warn!(err = %e, "bad id in path");
        error_response("parse_id", e)
    })
}

const LATEST_LIST: &str = "latest";

fn reserved_list_error() -> CoreError {
    CoreError::InvalidId(format!("'{LATEST_LIST}' is reserved for the newest list"))
}

fn parse_list_id(raw: String) -> Result<DocumentId, Response> {
    if raw == LATEST_LIST {
        warn!("reserved list id in path");
        return Err(error_response("parse_list_id", reserved_list_error()));
    }
    parse_id(raw)
}

/// Turn axum's body rejections into the JSON error shape used everywhere else.
fn body_rejection(rej: JsonRejection) -> Response {
    let message = rej.body_text();
    warn!(status = %rej.status(), err = %message, "rejected request body");
    (
        StatusCode::BAD_REQUEST,
        Json(http_common::json_error_with_message(
            "invalid_request",
            &message,
        )),
    )
        .into_response()
}

async fn reserved_list() -> Response {
    error_response("reserved_list", reserved_list_error())
}

async fn healthz() -> &'static str {
    "OK"
}

async fn list_lists(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    let limit = http_common::clamp_limit(q.limit, 20, 100);
    match state.svc.recent_lists(limit) {
        Ok(lists) => {
            let lists = lists
                .into_iter()
                .map(|l| ListOut {
                    id: l.id.as_str().to_string(),
                    registered_at: http_common::system_time_to_rfc3339(l.registered_at),
                })
                .collect();
            (StatusCode::OK, Json(ListsOut { lists })).into_response()
        }
        Err(e) => error_response("list_lists", e),
    }
}

async fn latest_products(State(state): State<AppState>) -> Response {
    match state.svc.latest_products() {
        Ok(products) => {
            info!(count = products.len(), "latest list loaded");
            products_response(products)
        }
        Err(e) => error_response("latest_products", e),
    }
}

async fn list_products(State(state): State<AppState>, Path(list_id): Path<String>) -> Response {
    let list_id = match parse_list_id(list_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.svc.list_products(&list_id) {
        Ok(products) => products_response(products),
        Err(e) => error_response("list_products", e),
    }
}

fn products_response(products: Vec<Product>) -> Response {
    let products = products.into_iter().map(ProductOut::from).collect();
    (StatusCode::OK, Json(ProductsOut { products })).into_response()
}

async fn upsert_product(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    body: Result<Json<ProductReq>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(b)) => b,
        Err(rej) => return body_rejection(rej),
    };
    match parse_list_id(list_id) {
        Ok(list_id) => upsert_impl(&state, &list_id, body),
        Err(resp) => resp,
    }
}

async fn upsert_default_product(
    State(state): State<AppState>,
    body: Result<Json<ProductReq>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => upsert_impl(&state, &state.default_list_id, body),
        Err(rej) => body_rejection(rej),
    }
}

fn upsert_impl(state: &AppState, list_id: &DocumentId, body: ProductReq) -> Response {
    // An empty id from the client means "new product".
    let id = match body.id.filter(|s| !s.is_empty()) {
        Some(raw) => match parse_id(raw) {
            Ok(id) => Some(id),
            Err(resp) => return resp,
        },
        None => None,
    };
    let quantity = match body.quantity.map(u32::try_from).transpose() {
        Ok(q) => q,
        Err(_) => return error_response("upsert_product", CoreError::InvalidQuantity),
    };
    let input = ProductInput {
        id,
        name: body.name,
        site: body.site,
        quantity,
        purchased: body.purchased,
    };
    match state.svc.upsert_product(list_id, input) {
        Ok(res) => {
            let status = if res.created {
                info!(list_id = %list_id, product_id = %res.id, "product added");
                StatusCode::CREATED
            } else {
                info!(list_id = %list_id, product_id = %res.id, "product updated");
                StatusCode::OK
            };
            let out = IdOut {
                id: res.id.as_str().to_string(),
            };
            (status, Json(out)).into_response()
        }
        Err(e) => error_response("upsert_product", e),
    }
}

async fn mark_purchased(
    State(state): State<AppState>,
    Path((list_id, product_id)): Path<(String, String)>,
) -> Response {
    match (parse_list_id(list_id), parse_id(product_id)) {
        (Ok(l), Ok(p)) => purchase_impl(&state, &l, &p),
        (Err(resp), _) | (_, Err(resp)) => resp,
    }
}

async fn mark_default_purchased(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Response {
    match parse_id(product_id) {
        Ok(p) => purchase_impl(&state, &state.default_list_id, &p),
        Err(resp) => resp,
    }
}

fn purchase_impl(state: &AppState, list_id: &DocumentId, product_id: &DocumentId) -> Response {
    match state.svc.mark_purchased(list_id, product_id) {
        Ok(true) => {
            info!(list_id = %list_id, product_id = %product_id, "product purchased");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => {
            warn!(list_id = %list_id, product_id = %product_id, "purchase: product not found");
            error_response("mark_purchased", CoreError::NotFound)
        }
        Err(e) => error_response("mark_purchased", e),
    }
}

async fn delete_product(
    State(state): State<AppState>,
    Path((list_id, product_id)): Path<(String, String)>,
) -> Response {
    match (parse_list_id(list_id), parse_id(product_id)) {
        (Ok(l), Ok(p)) => delete_impl(&state, &l, &p),
        (Err(resp), _) | (_, Err(resp)) => resp,
    }
}

async fn delete_default_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Response {
    match parse_id(product_id) {
        Ok(p) => delete_impl(&state, &state.default_list_id, &p),
        Err(resp) => resp,
    }
}

fn delete_impl(state: &AppState, list_id: &DocumentId, product_id: &DocumentId) -> Response {
    match state.svc.delete_product(list_id, product_id) {
        Ok(true) => {
            info!(list_id = %list_id, product_id = %product_id, "product deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => {
            warn!(list_id = %list_id, product_id = %product_id, "delete: product not found");
            error_response("delete_product", CoreError::NotFound)
        }
        Err(e) => error_response("delete_product", e),
    }
}

async fn list_sites(State(state): State<AppState>) -> Response {
    match state.svc.sites() {
        Ok(sites) => {
            let sites = sites
                .into_iter()
                .map(|s| SiteOut {
                    id: s.id.as_str().to_string(),
                    name: s.name,
                })
                .collect();
            (StatusCode::OK, Json(SitesOut { sites })).into_response()
        }
        Err(e) => error_response("list_sites", e),
    }
}

async fn create_site(
    State(state): State<AppState>,
    body: Result<Json<SiteReq>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(b)) => b,
        Err(rej) => return body_rejection(rej),
    };
    match state.svc.add_site(NewSite { name: body.name }) {
        Ok(id) => {
            info!(site_id = %id, "site added");
            (
                StatusCode::CREATED,
                Json(IdOut {
                    id: id.as_str().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response("create_site", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(AnyRepo::memory(), DocumentId::new("primeralista").unwrap());
        routes().with_state(state)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                req = req.header("content-type", "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let resp = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn latest_products_empty_then_filled() {
        let router = app();
        let (status, body) = send(&router, "GET", "/api/lists/latest/products", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["products"], serde_json::json!([]));

        let (status, created) = send(
            &router,
            "POST",
            "/api/products",
            Some(r#"{"name":"Milk","site":"Market","quantity":2}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, body) = send(&router, "GET", "/api/lists/latest/products", None).await;
        assert_eq!(body["products"][0]["id"], id.as_str());
        assert_eq!(body["products"][0]["name"], "Milk");
        assert_eq!(body["products"][0]["purchased"], false);

        let (_, lists) = send(&router, "GET", "/api/lists", None).await;
        assert_eq!(lists["lists"][0]["id"], "primeralista");
    }

    #[tokio::test]
    async fn edit_purchase_and_delete_flow() {
        let router = app();
        let (_, created) = send(
            &router,
            "POST",
            "/api/lists/weekly/products",
            Some(r#"{"id":"","name":"Bread"}"#),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let edit = format!(r#"{{"id":"{id}","name":"Rye bread"}}"#);
        let (status, _) = send(&router, "POST", "/api/lists/weekly/products", Some(&edit)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&router, "GET", "/api/lists/weekly/products", None).await;
        assert_eq!(body["products"][0]["name"], "Rye bread");

        let purchase = format!("/api/lists/weekly/products/{id}/purchase");
        let (status, _) = send(&router, "POST", &purchase, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let item = format!("/api/lists/weekly/products/{id}");
        let (status, body) = send(&router, "DELETE", &item, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "purchased");
    }

    #[tokio::test]
    async fn delete_pending_product_on_default_list() {
        let router = app();
        let (_, created) = send(&router, "POST", "/api/products", Some(r#"{"name":"Soap"}"#)).await;
        let id = created["id"].as_str().unwrap().to_string();

        let item = format!("/api/products/{id}");
        let (status, _) = send(&router, "DELETE", &item, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&router, "DELETE", &item, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn missing_products_and_bad_input() {
        let router = app();
        let (status, _) = send(&router, "POST", "/api/products/ghost/purchase", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &router,
            "POST",
            "/api/products",
            Some(r#"{"id":"ghost","name":"Tea"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&router, "POST", "/api/products", Some(r#"{"name":"  "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");

        let (status, body) = send(&router, "GET", "/api/lists/a%2Fb/products", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_id");
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let router = app();
        for body in [r#"{"site":"x"}"#, "not json", r#"{"name":"Tea","quantity":"two"}"#] {
            let (status, json) = send(&router, "POST", "/api/products", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(json["error"]["code"], "invalid_request", "body: {body}");
            assert!(json["error"]["message"].is_string());
        }

        let (status, json) = send(&router, "POST", "/api/sites", Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn negative_and_zero_quantities_are_rejected() {
        let router = app();
        for body in [r#"{"name":"Tea","quantity":-1}"#, r#"{"name":"Tea","quantity":0}"#] {
            let (status, json) = send(&router, "POST", "/api/products", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(json["error"]["code"], "invalid_request");
            assert_eq!(json["error"]["message"], "quantity must be at least 1");
        }
        let (_, json) = send(&router, "GET", "/api/lists", None).await;
        assert_eq!(json["lists"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn latest_is_reserved_as_a_list_id() {
        let router = app();
        let (status, json) = send(
            &router,
            "POST",
            "/api/lists/latest/products",
            Some(r#"{"name":"Tea"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_id");

        let (status, _) = send(&router, "DELETE", "/api/lists/latest/products/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) =
            send(&router, "POST", "/api/lists/latest/products/abc/purchase", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sites_create_and_list() {
        let router = app();
        let (status, body) = send(&router, "GET", "/api/sites", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sites"], serde_json::json!([]));

        let (status, created) = send(&router, "POST", "/api/sites", Some(r#"{"name":"Bakery"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(&router, "GET", "/api/sites", None).await;
        assert_eq!(body["sites"][0]["id"], created["id"]);
        assert_eq!(body["sites"][0]["name"], "Bakery");
    }

    #[tokio::test]
    async fn healthz_ok() {
        let router = app();
        let resp = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
