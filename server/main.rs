mod routes;
mod state;

use std::env;
use std::path::PathBuf;

use actix_web::{middleware, web, App, HttpServer};

use crate::state::AppState;

/// Project all active trains at a fixed interval until the server stops
fn spawn_recompute(state: web::Data<AppState>) {
    let Some(period) = state.settings.recompute_interval() else {
        log::info!("periodic projection disabled");
        return;
    };

    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(period);
        loop {
            interval.tick().await;
            let worker = state.clone();
            match web::block(move || worker.project()).await {
                Ok(Ok(report)) => log::debug!(
                    "periodic projection: {} projected, {} failed",
                    report.projected.len(),
                    report.failed.len()
                ),
                Ok(Err(e)) => log::error!("periodic projection failed: {e}"),
                Err(e) => log::error!("periodic projection aborted: {e}"),
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let settings_path = env::args_os().nth(1).map(PathBuf::from);
    let state = match AppState::load(settings_path.as_deref()) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("startup failed: {e}");
            return Err(std::io::Error::other(e));
        }
    };

    let address = (state.settings.bind_address.clone(), state.settings.port);
    let frontend_dir = state.settings.frontend_dir.clone();
    log::info!("starting server on {}:{}", address.0, address.1);

    spawn_recompute(state.clone());

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .configure(|cfg| routes::configure(cfg, &frontend_dir))
    })
    .bind(address)?
    .run()
    .await
}
