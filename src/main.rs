use kaspa_addrindexd::{
    addrindexd::AddrIndexD,
    config::Config,
    db::{missing_tables, DbPool, PgLedger},
    processing::RequestProcessor,
    resolver::{IndexResolver, JoinResolver, Resolvers},
};

use std::{env, path::PathBuf, process, str::FromStr, sync::Arc};

use daemonize_simple::Daemonize;
use tokio::{
    io::{self, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder as RuntimeBuilder,
};

// No need for complex argument parsing: we only ever accept one, "--conf".
fn parse_args(args: Vec<String>) -> Option<PathBuf> {
    if args.len() == 1 {
        return None;
    }

    if args.len() != 3 {
        eprintln!("Unknown arguments '{:?}'.", args);
        eprintln!("Only '--conf <configuration file path>' is supported.");
        process::exit(1);
    }

    Some(PathBuf::from(args[2].to_owned()))
}

// This creates the log file automagically if it doesn't exist, and logs on stdout
// if None is given
fn setup_logger(
    log_file: Option<&str>,
    log_level: log::LevelFilter,
) -> Result<(), fern::InitError> {
    let dispatcher = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log_level);

    if let Some(log_file) = log_file {
        dispatcher.chain(fern::log_file(log_file)?).apply()?;
    } else {
        dispatcher.chain(std::io::stdout()).apply()?;
    }

    Ok(())
}

// Process all requests from this connection
async fn connection_handler(stream: TcpStream, processor: Arc<RequestProcessor>) {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        match processor.read_req(&mut reader, &mut writer).await {
            Ok(true) => {
                log::trace!("Finished processing a single request from {:?}", peer);
            }
            Ok(false) => {
                log::trace!("Socket closed for {:?}", peer);
                break;
            }
            Err(e) => {
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                ) {
                    log::trace!("Socket closed for {:?}", peer);
                } else {
                    log::error!(
                        "Error while processing request from {:?}: '{}' ('{:?}')",
                        peer,
                        e,
                        e
                    );
                }
                break;
            }
        }
    }
}

async fn tokio_main(addrindexd: AddrIndexD) -> Result<(), Box<dyn std::error::Error>> {
    let pool = DbPool::new(
        addrindexd.postgres_config,
        addrindexd.max_connections,
        addrindexd.query_timeout,
    )?;

    // We never write to the ledger tables, but there is no point in starting without them.
    let missing = missing_tables(&pool).await?;
    if !missing.is_empty() {
        return Err(format!("Missing ledger tables: {}", missing.join(", ")).into());
    }

    let ledger = Arc::new(PgLedger::new(pool));
    let resolvers = Resolvers::new(
        Arc::new(JoinResolver::new(ledger.clone())),
        Arc::new(IndexResolver::new(ledger.clone(), ledger)),
        addrindexd.consistency,
    );
    let processor = Arc::new(RequestProcessor::new(
        resolvers,
        addrindexd.network_prefix,
    ));

    let listener = TcpListener::bind(addrindexd.listen).await?;
    log::info!("Listening on {}", addrindexd.listen);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::trace!("Got a new connection from '{}'", peer);
                let processor = processor.clone();
                tokio::spawn(async move { connection_handler(stream, processor).await });
            }
            Err(e) => {
                log::error!("Accepting new connection: '{}'", e);
            }
        }
    }
}

fn main() {
    #[cfg(not(target_os = "linux"))]
    {
        // FIXME: All Unix should be fine?
        eprintln!("Only Linux is supported for now.");
        process::exit(1);
    }

    let args = env::args().collect();
    let conf_file = parse_args(args);
    let config = Config::from_file(conf_file).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        process::exit(1);
    });
    let log_level = if let Some(ref level) = &config.log_level {
        log::LevelFilter::from_str(level.as_str()).unwrap_or_else(|e| {
            eprintln!("Invalid log level: {}", e);
            process::exit(1);
        })
    } else {
        log::LevelFilter::Info
    };
    let addrindexd = AddrIndexD::from_config(config).unwrap_or_else(|e| {
        eprintln!("Error creating global state: {}", e);
        process::exit(1);
    });

    let log_file = addrindexd.log_file();
    let log_output = if addrindexd.daemon {
        Some(log_file.to_str().expect("Valid unicode"))
    } else {
        None
    };
    setup_logger(log_output, log_level).unwrap_or_else(|e| {
        eprintln!("Error setting up logger: {}", e);
        process::exit(1);
    });

    log::info!(
        "Started kaspa_addrindexd on {} (default consistency: {}, {} database connections max)",
        addrindexd.listen,
        addrindexd.consistency,
        addrindexd.max_connections
    );

    if addrindexd.daemon {
        let daemon = Daemonize {
            pid_file: Some(addrindexd.pid_file()),
            ..Daemonize::default()
        };
        daemon.doit().unwrap_or_else(|e| {
            eprintln!("Error daemonizing: {}", e);
            process::exit(1);
        });
    }

    // After daemonizing: threads do not survive a fork
    let rt = RuntimeBuilder::new_multi_thread()
        .enable_all()
        .thread_name("kaspa_addrindexd_worker")
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Creating tokio runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(tokio_main(addrindexd)).unwrap_or_else(|e| {
        log::error!("Error in event loop: {}", e);
        process::exit(1);
    });
}
