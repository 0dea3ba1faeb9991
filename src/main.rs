#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use crumbgate::{
    handlers::{health, hello},
    session::{SessionConfig, SessionMiddleware},
    settings::CrumbgateSettings,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env and initializes the logger
    let settings = CrumbgateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let session_config = SessionConfig::from_settings(&settings);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(settings.clone()))
            .wrap(SessionMiddleware::new(&session_config))
            .wrap(Logger::default())
            .route("/", web::get().to(hello))
            .route("/ping", web::get().to(health))
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &CrumbgateSettings) {
    println!("Starting crumbgate session demo on http://{bind_address}");
    println!("Session backend: stateless encrypted cookies");
    println!();
    println!("Endpoints:");
    println!("  GET  /     - Demo endpoint (basic auth bootstraps a session cookie)");
    println!("  GET  /ping - Health check");
    println!();
    println!(
        "Cookie scope: domain={} path={} max_age={}s refresh_threshold={}s",
        settings.session.cookie_domain,
        settings.session.cookie_path,
        settings.session.max_age_seconds,
        settings.session.refresh_threshold_seconds
    );
}
