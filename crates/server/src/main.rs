use std::env;
use std::process::ExitCode;

use http::{Request, StatusCode};
use plexer::{Server, ServerConfig, ServerError, init_logging};
use plexer_http::endpoint::{PathEndpoint, PathSet, endpoint_fn, get};
use plexer_http::protocol::response::text_response_for;
use plexer_net::{BoxError, ConnectionContext};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match env::args_os().nth(1) {
        Some(path) => match ServerConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("plexerd: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    match serve(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("plexerd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &ServerConfig) -> Result<(), ServerError> {
    init_logging(config.log_level()?)?;

    let server = Server::builder().config(config)?.root_endpoint(demo_tree()).build()?;
    info!(local_endpoint = ?server.local_endpoint().ok(), max_connections = config.max_connections, "plexerd ready");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(cause = %e, "can't listen for ctrl-c, shutting down");
            }
        })
        .await
}

fn demo_tree() -> PathSet {
    PathSet::new()
        .route(PathEndpoint::exact(
            "/",
            get(endpoint_fn(|_context, request: Request<String>| async move {
                Ok::<_, BoxError>(text_response_for(&request, StatusCode::OK, "Hello World!\r\n"))
            })),
        ))
        .route(PathEndpoint::exact(
            "/whoami",
            get(endpoint_fn(|context: ConnectionContext, request: Request<String>| async move {
                let body = match context.credentials() {
                    Some(credentials) => format!("{credentials}\r\n"),
                    None => format!("peer {:?}\r\n", context.peer()),
                };
                Ok::<_, BoxError>(text_response_for(&request, StatusCode::OK, body))
            })),
        ))
}
