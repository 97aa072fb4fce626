use anyhow::Result;
use clap::{Parser, Subcommand};
use omnisearch_mcp::config::{self, Settings};
use omnisearch_mcp::registry::ToolRegistry;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "omnisearch")]
#[command(
    about = "Multi-provider search, extraction and AI answers (MCP stdio server)",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for MCP clients).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Spawn a child `omnisearch mcp-stdio` and call `list_tools` (no network, no keys).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Logs go to stderr; stdout belongs to the MCP transport.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(config::LOG_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_registry(settings: &Settings) -> Result<ToolRegistry> {
    let client = omnisearch_local::build_client()?;
    Ok(ToolRegistry::from_settings(client, settings))
}

#[cfg(feature = "stdio")]
mod mcp {
    use super::*;
    use omnisearch_core::{ProviderError, SearchParams, UrlInput};
    use omnisearch_local::{UnifiedEnhancementParams, UnifiedProcessingParams, UnifiedSearchParams};
    use rmcp::{
        handler::server::router::tool::ToolRouter as RmcpToolRouter,
        handler::server::wrapper::Parameters,
        model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
        tool, tool_handler, tool_router,
        transport::stdio,
        ErrorData as McpError, ServiceExt,
    };
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const SCHEMA_VERSION: u64 = 1;

    #[path = "envelope.rs"]
    mod envelope;
    use envelope::*;

    fn tool_result(payload: serde_json::Value) -> CallToolResult {
        let mut r = CallToolResult::structured(payload.clone());
        r.content = vec![Content::text(payload.to_string())];
        r
    }

    #[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
    pub(crate) struct WebSearchArgs {
        /// Search query. Operators such as site:, filetype:, "exact phrase" and -term work.
        #[serde(default)]
        query: Option<String>,
        /// Which search backend to use (see omnisearch_meta for configured ones).
        #[serde(default)]
        provider: Option<String>,
        /// Maximum number of results (1-50; tavily and brave cap at 20).
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        include_domains: Option<Vec<String>>,
        #[serde(default)]
        exclude_domains: Option<Vec<String>>,
    }

    #[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
    pub(crate) struct AiSearchArgs {
        /// Question to answer.
        #[serde(default)]
        query: Option<String>,
        /// Answer engine: perplexity or kagi_fastgpt.
        #[serde(default)]
        provider: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
    #[serde(untagged)]
    pub(crate) enum UrlArg {
        One(String),
        Many(Vec<String>),
    }

    #[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
    pub(crate) struct WebExtractArgs {
        /// A single URL or a list of URLs.
        #[serde(default)]
        url: Option<UrlArg>,
        /// Alias for a list of URLs; wins over `url` when non-empty.
        #[serde(default)]
        urls: Option<Vec<String>>,
        /// extract, scrape, crawl, structured, read or summarize.
        #[serde(default)]
        mode: Option<String>,
        /// basic or advanced.
        #[serde(default)]
        extract_depth: Option<String>,
    }

    impl WebExtractArgs {
        fn url_input(&self) -> Result<UrlInput, ProviderError> {
            if let Some(us) = self.urls.as_ref().filter(|us| !us.is_empty()) {
                return Ok(UrlInput::Many(us.clone()));
            }
            match &self.url {
                Some(UrlArg::One(u)) => Ok(UrlInput::One(u.clone())),
                Some(UrlArg::Many(us)) => Ok(UrlInput::Many(us.clone())),
                None => Err(ProviderError::invalid_input("url is required", "web_extract")),
            }
        }
    }

    #[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
    pub(crate) struct EnhanceArgs {
        /// Text to fact-check or enrich.
        #[serde(default)]
        content: Option<String>,
        /// fact_check or enrich.
        #[serde(default)]
        mode: Option<String>,
    }

    #[derive(Clone)]
    pub(crate) struct OmnisearchMcp {
        tool_router: RmcpToolRouter<Self>,
        registry: Arc<ToolRegistry>,
        configured: BTreeMap<&'static str, bool>,
    }

    #[tool_router]
    impl OmnisearchMcp {
        pub(crate) fn new(registry: Arc<ToolRegistry>, settings: &Settings) -> Self {
            Self {
                tool_router: Self::tool_router(),
                registry,
                configured: settings.configured_map(),
            }
        }

        #[tool(description = "Search the web through one configured provider (tavily, brave, kagi, exa)")]
        async fn web_search(
            &self,
            params: Parameters<Option<WebSearchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let args = params.0.unwrap_or_default();
            let request = serde_json::to_value(&args).unwrap_or_default();
            let req = UnifiedSearchParams {
                provider: args.provider,
                params: SearchParams {
                    query: args.query.unwrap_or_default(),
                    limit: args.limit,
                    include_domains: args.include_domains,
                    exclude_domains: args.exclude_domains,
                },
            };
            let out = self.registry.web_search().search(&req).await;
            Ok(tool_result(envelope(
                "web_search",
                request,
                out,
                t0.elapsed().as_millis(),
            )))
        }

        #[tool(description = "Ask an AI answer engine (perplexity, kagi_fastgpt); the answer comes first, then citations")]
        async fn ai_search(
            &self,
            params: Parameters<Option<AiSearchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let args = params.0.unwrap_or_default();
            let request = serde_json::to_value(&args).unwrap_or_default();
            let req = UnifiedSearchParams {
                provider: args.provider,
                params: SearchParams {
                    query: args.query.unwrap_or_default(),
                    ..SearchParams::default()
                },
            };
            let out = self.registry.ai_search().search(&req).await;
            Ok(tool_result(envelope(
                "ai_search",
                request,
                out,
                t0.elapsed().as_millis(),
            )))
        }

        #[tool(description = "Extract, scrape, crawl, summarize or read one or more URLs (mode selects the backend)")]
        async fn web_extract(
            &self,
            params: Parameters<Option<WebExtractArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let args = params.0.unwrap_or_default();
            let request = serde_json::to_value(&args).unwrap_or_default();
            let out = match args.url_input() {
                Ok(url) => {
                    let req = UnifiedProcessingParams {
                        mode: args.mode,
                        url,
                        extract_depth: args.extract_depth,
                    };
                    self.registry.web_extract().process_content(&req).await
                }
                Err(e) => Err(e),
            };
            Ok(tool_result(envelope(
                "web_extract",
                request,
                out,
                t0.elapsed().as_millis(),
            )))
        }

        #[tool(description = "Fact-check (fact_check) or enrich with related web/news results (enrich)")]
        async fn enhance_content(
            &self,
            params: Parameters<Option<EnhanceArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let args = params.0.unwrap_or_default();
            let content = args.content.unwrap_or_default();
            let request = serde_json::json!({
                "mode": args.mode,
                "content_chars": content.chars().count(),
            });
            let req = UnifiedEnhancementParams {
                mode: args.mode,
                content,
            };
            let out = self.registry.enhance_content().enhance_content(&req).await;
            Ok(tool_result(envelope(
                "enhance_content",
                request,
                out,
                t0.elapsed().as_millis(),
            )))
        }

        #[tool(description = "Report omnisearch configuration, providers and routes (no secrets)")]
        async fn omnisearch_meta(&self) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let mut payload = serde_json::json!({
                "ok": true,
                "name": "omnisearch",
                "version": env!("CARGO_PKG_VERSION"),
                "configured": { "providers": self.configured },
                "providers": self.registry.providers(),
                "routes": self.registry.routes(),
            });
            add_envelope_fields(
                &mut payload,
                "omnisearch_meta",
                serde_json::Value::Null,
                t0.elapsed().as_millis(),
            );
            Ok(tool_result(payload))
        }
    }

    #[tool_handler]
    impl rmcp::ServerHandler for OmnisearchMcp {
        fn get_info(&self) -> ServerInfo {
            ServerInfo {
                instructions: Some(
                    "Multi-provider web search, AI answers, content extraction and enhancement. Call omnisearch_meta to see which providers are configured; outputs are JSON and schema-versioned."
                        .to_string(),
                ),
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                ..Default::default()
            }
        }
    }

    pub(crate) async fn serve_stdio(
        registry: ToolRegistry,
        settings: &Settings,
    ) -> Result<(), McpError> {
        let svc = OmnisearchMcp::new(Arc::new(registry), settings);
        let running = svc
            .serve(stdio())
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        running
            .waiting()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(())
    }

}

fn doctor_text(payload: &serde_json::Value) {
    let ok = payload["ok"].as_bool().unwrap_or(false);
    println!("omnisearch {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
    if let Some(m) = payload["configured"]["providers"].as_object() {
        let parts: Vec<String> = m
            .iter()
            .map(|(k, v)| format!("{k}={}", v.as_bool().unwrap_or(false)))
            .collect();
        println!("providers: {}", parts.join(" "));
    }
    println!("checks:");
    if let Some(arr) = payload["checks"].as_array() {
        for c in arr {
            let name = c["name"].as_str().unwrap_or("?");
            if c["skipped"].as_bool().unwrap_or(false) {
                println!("- {name}: skipped");
            } else {
                let ok = c["ok"].as_bool().unwrap_or(false);
                println!("- {name}: {}", if ok { "ok" } else { "fail" });
            }
        }
    }
}

async fn doctor(
    args: DoctorCmd,
    settings: &Settings,
    env_file: Option<std::io::Result<usize>>,
) -> Result<()> {
    let t0 = std::time::Instant::now();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    checks.push(match &env_file {
        None => serde_json::json!({
            "name": "env_file",
            "ok": true,
            "skipped": true,
            "message": format!("{} not set", config::ENV_FILE_VAR),
            "hint": "",
        }),
        Some(Ok(n)) => serde_json::json!({
            "name": "env_file",
            "ok": true,
            "skipped": false,
            "message": format!("env file loaded ({n} new variables)"),
            "hint": "",
        }),
        Some(Err(e)) => serde_json::json!({
            "name": "env_file",
            "ok": false,
            "skipped": false,
            "message": format!("env file could not be read: {e}"),
            "hint": format!("Point {} at a readable KEY=VALUE file.", config::ENV_FILE_VAR),
        }),
    });

    let any_configured = settings.configured_map().values().any(|v| *v);
    let (message, hint) = if any_configured {
        ("at least one provider key is set", "")
    } else {
        (
            "no provider keys are set",
            "Set at least one key, e.g. TAVILY_API_KEY or OMNISEARCH_TAVILY_API_KEY.",
        )
    };
    checks.push(serde_json::json!({
        "name": "providers_configured",
        "ok": any_configured,
        "skipped": false,
        "message": message,
        "hint": hint,
    }));

    let (tools, client_ok) = match build_registry(settings) {
        Ok(r) => (serde_json::json!(r.routes()), true),
        Err(e) => {
            tracing::warn!(error = %e, "http client construction failed");
            (serde_json::Value::Null, false)
        }
    };
    let (message, hint) = if client_ok {
        ("http client built", "")
    } else {
        (
            "http client could not be built",
            "TLS or proxy configuration is broken in this environment.",
        )
    };
    checks.push(serde_json::json!({
        "name": "http_client",
        "ok": client_ok,
        "skipped": false,
        "message": message,
        "hint": hint,
    }));

    let mut stdio_ok: Option<bool> = None;
    let mut stdio_tool_count: Option<usize> = None;
    let mut stdio_error: Option<serde_json::Value> = None;
    let mut stdio_elapsed_ms: Option<u128> = None;

    #[cfg(feature = "stdio")]
    if args.check_stdio {
        use rmcp::service::ServiceExt;
        use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
        use tokio::process::Command;

        let exe =
            std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("omnisearch"));
        let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
            cmd.args(["mcp-stdio"]);
            for vendor in config::Vendor::ALL {
                for var in vendor.key_vars() {
                    cmd.env_remove(var);
                }
            }
            cmd.env_remove(config::ENV_FILE_VAR);
            cmd.env(config::LOG_VAR, "error");
        }))?;

        let service = ().serve(child).await?;
        let check_t0 = std::time::Instant::now();
        let res = tokio::time::timeout(
            std::time::Duration::from_millis(args.timeout_ms),
            service.list_tools(Default::default()),
        )
        .await;
        stdio_elapsed_ms = Some(check_t0.elapsed().as_millis());
        match res {
            Ok(Ok(tools)) => {
                stdio_ok = Some(true);
                stdio_tool_count = Some(tools.tools.len());
            }
            Ok(Err(e)) => {
                stdio_ok = Some(false);
                stdio_error = Some(serde_json::json!({
                    "code": "handshake_failed",
                    "message": e.to_string(),
                    "hint": "The child closed the stdio transport early. Make sure nothing prints to stdout in mcp-stdio mode.",
                }));
            }
            Err(_elapsed) => {
                stdio_ok = Some(false);
                stdio_error = Some(serde_json::json!({
                    "code": "timeout",
                    "message": format!("stdio handshake timed out after {}ms", args.timeout_ms),
                    "hint": "The child did not answer list_tools in time.",
                }));
            }
        }
        let _ = service.cancel().await;
    }

    #[cfg(not(feature = "stdio"))]
    if args.check_stdio {
        stdio_ok = Some(false);
    }

    checks.push(serde_json::json!({
        "name": "mcp_stdio_handshake",
        "ok": if args.check_stdio { stdio_ok.unwrap_or(false) } else { true },
        "skipped": !args.check_stdio,
        "message": if !args.check_stdio {
            "stdio MCP handshake skipped"
        } else if stdio_ok.unwrap_or(false) {
            "stdio MCP handshake succeeded"
        } else {
            "stdio MCP handshake failed"
        },
        "hint": if !args.check_stdio || stdio_ok.unwrap_or(false) {
            ""
        } else if cfg!(feature = "stdio") {
            "Check that the MCP client launches this `omnisearch` binary with args [\"mcp-stdio\"]."
        } else {
            "`mcp-stdio` requires building with feature `stdio`."
        },
        "tool_count": stdio_tool_count,
        "elapsed_ms": stdio_elapsed_ms,
        "error": stdio_error,
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "omnisearch",
        "version": env!("CARGO_PKG_VERSION"),
        "features": { "stdio": cfg!(feature = "stdio") },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "providers": settings.configured_map(),
            "timeout_ms": settings.timeout_ms,
            "max_retries": settings.max_retries,
        },
        "tools": tools,
        "checks": checks,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => doctor_text(&payload),
        _ => println!("{payload}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = config::load_env_file_from_env();
    let cli = Cli::parse();
    init_tracing();
    if let Some(Err(e)) = &env_file {
        tracing::warn!(error = %e, var = config::ENV_FILE_VAR, "env file not loaded");
    }
    let settings = Settings::from_env();

    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            let registry = build_registry(&settings)?;
            mcp::serve_stdio(registry, &settings)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Doctor(args) => doctor(args, &settings, env_file).await?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "omnisearch",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("omnisearch {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
