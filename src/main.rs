use actix_web::{web, App, HttpServer, middleware::Logger};
use dotenv::dotenv;
use reqwest::Client;
use std::io;
use std::time::Duration;
use log::info;
use actix_governor::{Governor, GovernorConfigBuilder};

mod config;
mod error;
mod google_places;
mod logging;
mod openai;
mod page;
mod recommend;
mod routes;
mod utils;

use config::Config;

fn startup_error(message: String) -> io::Error {
    eprintln!("{}", message);
    io::Error::new(io::ErrorKind::Other, message)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();

    let config = Config::from_env().map_err(|e| startup_error(format!("Failed to load configuration: {}", e)))?;

    logging::setup_logging(&config.log_file, logging::parse_level(&config.log_level))
        .map_err(|e| startup_error(format!("Failed to set up logging: {}", e)))?;

    info!(
        "Configuration: {}",
        serde_json::to_string_pretty(&config.masked_summary()).unwrap_or_default()
    );

    let client = Client::builder()
        .user_agent(utils::USER_AGENT)
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| startup_error(format!("Failed to build HTTP client: {}", e)))?;

    let governor_config = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_second)
        .burst_size(config.rate_limit_burst)
        .finish()
        .ok_or_else(|| startup_error("Rate limit settings must be greater than zero".to_string()))?;

    let bind_address = config.bind_address.clone();
    info!("Starting Dinewise server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Governor::new(&governor_config))
            .app_data(web::Data::new(client.clone()))
            .app_data(web::Data::new(config.clone()))
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
