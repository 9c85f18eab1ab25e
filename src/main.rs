use clap::Parser;
use mcpchat::clients::ollama::OllamaClient;
use mcpchat::config::discover_provider_paths;
use mcpchat::{ClientConfig, Orchestrator, ToolRegistry};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, RwLock};

/// Chat with a local model that can call MCP capability providers
#[derive(Parser, Debug)]
#[command(
    name = "mcpchat",
    version,
    about = "Chat with a local model that can call MCP capability providers",
    long_about = "mcpchat launches one or more MCP provider scripts, tells the model which \
                  capabilities they offer and runs the model's tool calls against them.\n\n\
                  Examples:\n  \
                  mcpchat packages/weather/build/index.js\n  \
                  mcpchat packages/ 8080\n  \
                  mcpchat server.py --model qwen2.5:7b --no-http"
)]
struct Args {
    #[arg(
        value_name = "PROVIDER_PATH",
        help = "Provider script (.js or .py) or a directory of <name>/build/index.js bundles"
    )]
    provider_path: PathBuf,

    #[arg(value_name = "PORT", help = "HTTP port (overrides MCPCHAT_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Model identifier (overrides OLLAMA_MODEL)")]
    model: Option<String>,

    #[arg(long, value_name = "URL", help = "Ollama base URL (overrides OLLAMA_API_URL)")]
    ollama_url: Option<String>,

    #[arg(long, help = "Do not start the HTTP server")]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    mcpchat::init_logger();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(model) = args.model {
        config.ollama_model = model;
    }
    if let Some(url) = args.ollama_url {
        config.ollama_api_url = url;
    }

    let mut registry = ToolRegistry::new();
    for path in discover_provider_paths(&args.provider_path)? {
        if let Err(e) = registry.connect(&path, &config).await {
            log::error!("Failed to connect to {}: {}", path.display(), e);
        }
    }
    if registry.provider_count() == 0 {
        log::warn!("No capability providers connected; continuing without tools");
    }
    let registry = Arc::new(RwLock::new(registry));

    let client = OllamaClient::new(&config.ollama_api_url, &config.ollama_model)?
        .with_timeout(config.request_timeout);
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(client), registry.clone()).await);

    let mut updates = orchestrator.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(response) = updates.recv().await {
            log::info!("Response updated ({} chars)", response.len());
        }
    });

    let (stop_http, http_stopped) = oneshot::channel::<()>();
    let server = if args.no_http {
        None
    } else {
        start_http(orchestrator.clone(), config.http_port, http_stopped).await
    };

    println!("MCP Client Started with model: {}", config.ollama_model);
    println!("Type your queries or 'quit' to exit.");
    run_interactive(&orchestrator).await;

    let _ = stop_http.send(());
    if let Some(server) = server {
        if let Err(e) = server.await {
            log::error!("HTTP server task failed: {}", e);
        }
    }
    watcher.abort();
    registry.write().await.shutdown().await;
    Ok(())
}

#[cfg(feature = "http-server")]
async fn start_http(
    orchestrator: Arc<Orchestrator>,
    port: u16,
    stopped: oneshot::Receiver<()>,
) -> Option<tokio::task::JoinHandle<()>> {
    let listener = match mcpchat::http_server::bind(port).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind HTTP port {}: {}", port, e);
            return None;
        }
    };
    Some(tokio::spawn(async move {
        let shutdown = async {
            let _ = stopped.await;
        };
        if let Err(e) = mcpchat::http_server::serve(listener, orchestrator, shutdown).await {
            log::error!("HTTP server error: {}", e);
        }
    }))
}

#[cfg(not(feature = "http-server"))]
async fn start_http(
    _orchestrator: Arc<Orchestrator>,
    _port: u16,
    _stopped: oneshot::Receiver<()>,
) -> Option<tokio::task::JoinHandle<()>> {
    log::warn!("Built without the http-server feature; HTTP interface disabled");
    None
}

/// Read queries from stdin until `quit`, end of input or Ctrl-C.
async fn run_interactive(orchestrator: &Orchestrator) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuery: ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read from stdin: {}", e);
                break;
            }
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }
        if query == "/reset" {
            orchestrator.reset().await;
            println!("Conversation cleared.");
            continue;
        }

        let response = orchestrator.process_query(query).await;
        println!("\n{}", response);
    }
}
