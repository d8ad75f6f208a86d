use clap::Parser;
use rampart::app::App;
use rampart::cli::Args;
use rampart::config::Config;
use rampart::logging::setup_logging;
use tracing::info;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are
    // never silently dropped.
    let config = Config::from_env().expect("Failed to load config");
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting rampart"
    );

    let app = App::new(config)
        .await
        .expect("Failed to initialize application");

    app.run().await.expect("Server exited with error");
}
