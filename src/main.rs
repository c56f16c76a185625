use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, get, middleware, web::Data};
use clap::Parser;
use operator::{
    self,
    config::Settings,
    scheduler_controller::{State, run_scheduler},
    telemetry,
};

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    telemetry::init(settings.log_format).await;

    // Initiatilize Kubernetes controller state
    let state = State::default();
    let scheduler_ctrl = run_scheduler(state.clone(), settings.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
    })
    .bind(&settings.bind)?
    .shutdown_timeout(5);

    // Both runtimes implement graceful shutdown, so poll until both are done
    let (_, server_result) = tokio::join!(scheduler_ctrl, server.run());
    server_result?;
    Ok(())
}
