use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::error::{BlockingError, InternalError};
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use allomap_core::{Error, ProjectionRequest, ProjectionService};
use allomap_storage::DatasetStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Serialize)]
struct Banner {
    message: &'static str,
    endpoints: Vec<&'static str>,
}

#[derive(Serialize)]
struct InvalidateResponse {
    result: bool,
    removed: usize,
}

/// The three standalone HTTP services
pub struct RestApi;

impl RestApi {
    /// Front door: health check, banner, and the projection routes
    pub async fn start_router(
        service: Arc<ProjectionService>,
        host: String,
        port: u16,
    ) -> std::io::Result<()> {
        HttpServer::new(move || {
            App::new()
                .wrap(cors())
                .app_data(web::Data::new(service.clone()))
                .configure(router_routes)
        })
        .bind((host.as_str(), port))?
        .run()
        .await
    }

    pub async fn start_reference(
        store: Arc<DatasetStore>,
        host: String,
        port: u16,
    ) -> std::io::Result<()> {
        HttpServer::new(move || {
            App::new()
                .wrap(cors())
                .app_data(web::Data::new(store.clone()))
                .configure(reference_routes)
        })
        .bind((host.as_str(), port))?
        .run()
        .await
    }

    pub async fn start_projection(
        service: Arc<ProjectionService>,
        host: String,
        port: u16,
    ) -> std::io::Result<()> {
        HttpServer::new(move || {
            App::new()
                .wrap(cors())
                .app_data(web::Data::new(service.clone()))
                .route("/health", web::get().to(health))
                .configure(projection_routes)
        })
        .bind((host.as_str(), port))?
        .run()
        .await
    }
}

fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600)
}

/// Malformed JSON bodies answer with the same `{"error": ...}` shape as
/// every other failure
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = serde_json::json!({ "error": err.to_string() });
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

/// Routes served by the router process; expects `Data<Arc<ProjectionService>>`
pub fn router_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/", web::get().to(home))
        .configure(projection_routes);
}

/// Projection routes; expects `Data<Arc<ProjectionService>>`
pub fn projection_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/api/tsne/cache", web::get().to(cache_stats))
        .route("/api/tsne/{city}", web::post().to(generate_tsne))
        .route("/api/tsne/{city}/cache", web::delete().to(invalidate_cache));
}

/// Reference-data routes; expects `Data<Arc<DatasetStore>>`
pub fn reference_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/api/reference-data/{city}", web::get().to(reference_data));
}

fn error_response(err: &Error) -> HttpResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    HttpResponse::build(status).json(serde_json::json!({
        "error": err.to_string()
    }))
}

fn blocking_failure(err: BlockingError) -> HttpResponse {
    error!("Blocking task failed: {}", err);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": err.to_string()
    }))
}

async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}

async fn home() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(Banner {
        message: "T-SNE API is running",
        endpoints: vec!["/api/tsne/<city>"],
    }))
}

async fn reference_data(
    store: web::Data<Arc<DatasetStore>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let city = path.into_inner();
    let store = store.get_ref().clone();

    match web::block(move || store.load(&city)).await {
        Ok(Ok(records)) => Ok(HttpResponse::Ok().json(records)),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(blocking_failure(e)),
    }
}

async fn generate_tsne(
    service: web::Data<Arc<ProjectionService>>,
    path: web::Path<String>,
    req: web::Json<ProjectionRequest>,
) -> ActixResult<HttpResponse> {
    let city = path.into_inner();
    let service = service.get_ref().clone();
    let request = req.into_inner();

    match web::block(move || service.project(&city, &request)).await {
        Ok(Ok(response)) => Ok(HttpResponse::Ok().json(response.as_ref())),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(blocking_failure(e)),
    }
}

async fn cache_stats(service: web::Data<Arc<ProjectionService>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.stats()))
}

async fn invalidate_cache(
    service: web::Data<Arc<ProjectionService>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let city = path.into_inner();
    let removed = service.invalidate_city(&city);
    Ok(HttpResponse::Ok().json(InvalidateResponse {
        result: true,
        removed,
    }))
}
