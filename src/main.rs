use clap::Parser;
use dotenv::dotenv;
use env_logger::Env;
use handy_sync::{cli::Cli, config::Config, session};
use log::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let result = match Config::from_env() {
        Ok(config) => session::run(cli, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
