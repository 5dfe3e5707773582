use dotenvy::dotenv;
use log::info;
use webhook_server::{
    cli::{parse_command_line_args, run_once},
    config::ServerConfig,
    server::run_server,
};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();

    match parse_command_line_args() {
        Some(command) => {
            let code = run_once(command, &config).await;
            if code != 0 {
                std::process::exit(code);
            }
        },
        None => {
            info!("🚀️ Starting server on {}:{}", config.host, config.port);
            match run_server(config).await {
                Ok(_) => println!("Bye!"),
                Err(e) => eprintln!("{e}"),
            }
        },
    }
}
