use std::time::{Duration, Instant};

use actix_files::{Files, NamedFile};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::Deserialize;

use running_graph::chart::{self, FrontendVariables, Timestamps};
use running_graph::models::{LineError, Observation};
use running_graph::selection::Window;
use running_graph::{theme, time, StoreError, TimetableStore, TrainId};

use crate::state::AppState;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(("Content-Type", "text/plain"))
            .body(self.to_string())
    }
}

impl From<LineError> for ApiError {
    fn from(e: LineError) -> Self {
        match e {
            LineError::UnknownLine(_) => Self::NotFound(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownTrain(_) | StoreError::UnknownStop { .. } => Self::NotFound(e.to_string()),
            StoreError::StaleProjection(_) | StoreError::Poisoned => Self::Internal(e.to_string()),
        }
    }
}

/// Artificial latency for testing slow clients
async fn delay(state: &AppState) {
    if state.settings.response_delay_ms > 0 {
        actix_web::rt::time::sleep(Duration::from_millis(state.settings.response_delay_ms)).await;
    }
}

#[actix_web::get("/lines/")]
async fn line_ids(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/plain"))
        .body(state.lines.ids().join("\n"))
}

#[actix_web::get("/lines/info")]
async fn line_info(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut infos = Vec::new();
    for id in state.lines.ids() {
        infos.push(state.lines.get(&id)?.info());
    }
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/plain"))
        .body(infos.join("\n\n\n")))
}

#[actix_web::get("/lines/{id}.json")]
async fn line_json(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    delay(&state).await;
    let line = state.lines.get(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(chart::line_json(&line)))
}

#[actix_web::get("/predict")]
async fn predict(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let worker = state.clone();
    let report = web::block(move || worker.project())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/plain"))
        .body(format!(
            "done ({:.6}s)\nprojected: {}\nfailed: {}\nincomplete stops: {}\n",
            started.elapsed().as_secs_f64(),
            report.projected.len(),
            report.failed.len(),
            report.issues.len()
        )))
}

#[derive(Debug, Deserialize)]
struct GraphQuery {
    starttime: i64,
    endtime: i64,
    startpos: Option<f64>,
    endpos: Option<f64>,
}

fn query_time(timestamp: i64) -> Result<chrono::NaiveTime, ApiError> {
    time::timestamp_to_time(timestamp).ok_or_else(|| ApiError::BadRequest(format!("invalid timestamp {timestamp}")))
}

#[actix_web::get("/graphdata/{line}.json")]
async fn graph_data(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<GraphQuery>,
) -> Result<HttpResponse, ApiError> {
    delay(&state).await;
    let line = state.lines.get(&path.into_inner())?;
    let window = Window::new(query_time(query.starttime)?, query_time(query.endtime)?)
        .with_positions(query.startpos.unwrap_or(0.0), query.endpos.unwrap_or(1.0));

    let day_start = state.settings.operating_day_start;
    let data = state.store.read(|timetable| chart::graph_data(timetable, &line, &window, day_start))?;
    Ok(HttpResponse::Ok().json(data))
}

#[actix_web::get("/time")]
async fn time_plain(state: web::Data<AppState>) -> impl Responder {
    let reading = state.clock.now();
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/plain"))
        .body(format!(
            "state: {}\ntime:  {}",
            reading.state.as_str(),
            reading.timestamp.format("%F %T")
        ))
}

#[actix_web::get("/clock.json")]
async fn clock_json(state: web::Data<AppState>) -> impl Responder {
    delay(&state).await;
    let reading = state.clock.now();
    HttpResponse::Ok().json(serde_json::json!({
        "state": reading.state,
        "time": Timestamps::new(state.settings.operating_day_start).of(reading.time()),
        "timestr": reading.timestamp.format("%F %T").to_string(),
    }))
}

#[actix_web::get("/_variables.js")]
async fn variables_js(state: web::Data<AppState>) -> impl Responder {
    let settings = &state.settings;
    let variables = FrontendVariables {
        script_root: "",
        default_viewconfig: &settings.default_viewconfig,
        lines: state.lines.names(),
        refresh_interval_secs: settings.refresh_interval_secs,
        day_start: settings.operating_day_start,
        timetable_url_template: &settings.timetable_url_template,
    };
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/javascript"))
        .body(variables.script())
}

#[actix_web::get("/_style.css")]
async fn style_css(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/css"))
        .body(theme::stylesheet(&state.settings.train_color_maps))
}

#[actix_web::post("/trains/{id}/stops/{position}/observation")]
async fn observation(
    state: web::Data<AppState>,
    path: web::Path<(TrainId, u32)>,
    body: web::Json<Observation>,
) -> Result<HttpResponse, ApiError> {
    let (train, position) = path.into_inner();
    state.store.record_observation(train, position, body.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

#[actix_web::get("/")]
async fn index(state: web::Data<AppState>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open(state.settings.frontend_dir.join("index.html"))?)
}

#[actix_web::get("/favicon.ico")]
async fn favicon(state: web::Data<AppState>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open(state.settings.frontend_dir.join("favicon.ico"))?)
}

pub fn configure(cfg: &mut web::ServiceConfig, frontend_dir: &std::path::Path) {
    cfg.service(line_ids)
        .service(line_info)
        .service(line_json)
        .service(predict)
        .service(graph_data)
        .service(time_plain)
        .service(clock_json)
        .service(variables_js)
        .service(style_css)
        .service(observation)
        .service(index)
        .service(favicon)
        .service(Files::new("/frontend", frontend_dir));
}
