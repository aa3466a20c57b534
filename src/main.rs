use clap::Parser;
use sessiongate::cli::{
    Args, build_config, init_logging, load_jwt_secret, load_providers, open_database,
};
use sessiongate::jwt::JwtConfig;
use sessiongate::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    // Refuse to serve if signing or the entropy source is broken
    if let Err(e) = JwtConfig::new(jwt_secret.as_bytes()).self_check() {
        error!(error = %e, "Credential self-check failed");
        std::process::exit(1);
    }

    let Some(providers) = load_providers(args.providers_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let config = build_config(&args, db, jwt_secret, providers);
    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
