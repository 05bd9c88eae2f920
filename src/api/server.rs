use crate::Error;
use crate::api::ErrorBody;
use crate::api::Health;
use crate::api::QueryRequest;
use crate::search::Analyzer;
use crate::search::Executor;
use actix_cors::Cors;
use actix_web::App;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::middleware::Logger;
use actix_web::web;

/// Everything a request handler needs: the deterministic analyzer and the
/// hybrid executor with its capability handles.
pub struct AppState {
    pub analyzer: Analyzer,
    pub executor: Executor,
}

pub struct Server;

impl Server {
    pub async fn run(
        state: AppState,
        bind: &str,
        cors_origin: Option<String>,
    ) -> Result<(), std::io::Error> {
        let state = web::Data::new(state);
        log::info!("starting HTTP server on {}", bind);
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::new("%r %s %b bytes %D ms"))
                .wrap(cors(cors_origin.as_deref()))
                .app_data(state.clone())
                .route("/health", web::get().to(health))
                .route("/query", web::post().to(query))
        })
        .bind(bind)?
        .run()
        .await
    }
}

/// The query surface is read-only JSON over two routes, so browsers only
/// ever need GET/POST with a JSON body. `CHESSMATE_CORS_ORIGIN` pins the
/// allowed origin; without it, any origin may read.
fn cors(origin: Option<&str>) -> Cors {
    let cors = match origin {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    };
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_header(actix_web::http::header::CONTENT_TYPE)
        .max_age(3600)
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(Health::ok())
}

async fn query(state: web::Data<AppState>, req: web::Json<QueryRequest>) -> impl Responder {
    if req.question.trim().is_empty() {
        return HttpResponse::BadRequest().json(ErrorBody::new("question must not be empty"));
    }
    let plan = match state.analyzer.analyse(&req.question) {
        Ok(plan) => plan,
        Err(e) => return HttpResponse::BadRequest().json(ErrorBody::new(e.to_string())),
    };
    match state.executor.run(plan).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e @ Error::Unavailable(_)) => {
            HttpResponse::ServiceUnavailable().json(ErrorBody::new(e.to_string()))
        }
        Err(e) => HttpResponse::InternalServerError().json(ErrorBody::new(e.to_string())),
    }
}
