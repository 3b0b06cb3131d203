use clap::Parser;
use meridian_server::{demo, telemetry, ServerConfig, WfsServer};

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();
    telemetry::init_logging();

    let service_config = config.service_config();
    // Legacy axis-order coercion is process-wide; set it before the first
    // CRS is parsed.
    meridian_core::crs::configure_legacy_axes(
        service_config.force_xy_epsg_4326,
        service_config.force_xy_old_crs,
    );

    let state = demo::demo_state(service_config, config.base_url());
    let server = WfsServer::new(state);
    if let Err(error) = server.run(config.listen_addr).await {
        eprintln!("server error: {error}");
        std::process::exit(1);
    }
}
