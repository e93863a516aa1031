use mailer_common::email::senders::{MockSender, SmtpRelay};
use mailer_common::email::EmailSender;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use flexi_logger::{
    Age, Cleanup, Criterion, Duplicate, FileSpec, LogSpecification, Logger, Naming, WriteMode,
};

use crate::middleware::CorsMiddleware;
use crate::services::api::RouteLimiters;

mod env;
mod handlers;
mod middleware;
mod services;
mod utils;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut port: Option<u16> = None;
    let mut env_file_path: Option<String> = None;

    let mut args = std::env::args();

    // Eat the first argument, which is the relative path to the executable
    args.next();

    while let Some(arg) = args.next() {
        match arg.to_lowercase().as_str() {
            "--port" => {
                let port_str = {
                    let next_arg = args.next();

                    match next_arg {
                        Some(s) => s,
                        None => {
                            eprintln!("ERROR: --port option specified but no port was given");
                            std::process::exit(1);
                        }
                    }
                };

                port = {
                    let port_result = port_str.parse::<u16>();

                    match port_result {
                        Ok(p) => Some(p),
                        Err(_) => {
                            eprintln!("ERROR: Incorrect format for port. Integer expected");
                            std::process::exit(1);
                        }
                    }
                };

                continue;
            }
            "--env-file" => {
                env_file_path = {
                    let next_arg = args.next();

                    match next_arg {
                        Some(p) => Some(p),
                        None => {
                            eprintln!(
                                "ERROR: --env-file option specified but no file path was given",
                            );
                            std::process::exit(1);
                        }
                    }
                };

                continue;
            }
            a => {
                eprintln!("ERROR: Invalid argument: {}", &a);
                std::process::exit(1);
            }
        }
    }

    let env_file_path = env_file_path.unwrap_or(String::from(".env"));
    if let Err(e) = env::load_dotenv_if_dev(&env_file_path) {
        eprintln!("ERROR: Failed to load '{env_file_path}': {e}");
        std::process::exit(1);
    }

    let conf = match env::Config::from_env(port) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let log_spec = LogSpecification::parse(&conf.log_level).unwrap_or_else(|_| {
        eprintln!(
            "WARNING: Invalid log level '{}'. Falling back to 'info'",
            conf.log_level
        );
        LogSpecification::info()
    });

    let logger = Logger::with(log_spec)
        .write_mode(WriteMode::Async)
        .format(|writer, now, record| {
            write!(
                writer,
                "{:5} | {} | {}:{} | {}",
                record.level(),
                now.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
                record.module_path().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .use_utc();

    let logger = match &conf.log_dir {
        Some(log_dir) => logger
            .log_to_file(FileSpec::default().directory(log_dir))
            .rotate(
                Criterion::Age(Age::Day),
                Naming::Timestamps,
                Cleanup::KeepLogAndCompressedFiles(60, 365),
            )
            .cleanup_in_background_thread(true)
            .duplicate_to_stdout(Duplicate::All),
        None => logger.log_to_stdout(),
    };

    let _logger = match logger.start() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("ERROR: Failed to start logger: {e}");
            std::process::exit(1);
        }
    };

    let email_sender: EmailSender = if conf.email_enabled {
        log::info!(
            "Relaying email through {}:{} (tls: {})",
            conf.smtp_host,
            conf.smtp_port,
            conf.smtp_tls,
        );

        Box::new(SmtpRelay::with_credentials(
            conf.email_from_address.clone(),
            &conf.email_password,
            &conf.smtp_host,
            conf.smtp_port,
            conf.smtp_tls,
        ))
    } else {
        log::info!("Emails are disabled. Using mock sender.");
        Box::new(MockSender::new())
    };

    let listen_address = conf.listen_address();
    let actix_workers = conf.actix_worker_count;
    let cors = CorsMiddleware::new(&conf.cors_allowed_origins);

    // Created once so every worker shares the same limiter tables
    let limiters = RouteLimiters::new(conf.limiter_warn_every_over_limit);

    let conf = Data::new(conf);
    let email_sender = Data::new(email_sender);

    log::info!("Listening on {listen_address}");

    HttpServer::new(move || {
        let limiters = limiters.clone();

        App::new()
            .app_data(conf.clone())
            .app_data(email_sender.clone())
            .configure(|cfg| services::api::configure(cfg, limiters))
            .configure(services::web::configure)
            .wrap(cors.clone())
            .wrap(actix_web::middleware::Logger::default())
    })
    .workers(actix_workers)
    .bind(listen_address)?
    .run()
    .await?;

    Ok(())
}
