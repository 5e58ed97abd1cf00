use anyhow::Result;
use clap::Parser;
use console::style;
use dotenv::dotenv;
use std::path::PathBuf;

use salesagent::capabilities::Capability;
use salesagent::lifecycle::{self, InitOptions};
use salesagent::models::agent::RunOptions;
use salesagent::sales_data::{FetchSalesData, SalesData};
use salesagent::service::http::{HttpAgentsService, ServiceConfig};
use salesagent::session::{OutputSink, SessionDriver, TurnOutcome};
use salesagent::toolbox::ToolRegistry;

mod config;
mod input;
mod render;

use config::Config;
use input::UserInput;
use render::ConsoleSink;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Instructions template under shared/instructions
    #[arg(long, default_value = "function_calling.txt")]
    instructions: String,

    /// Path to the sales database (defaults to shared/database/sales.db)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Upload the product datasheet into a vector store and attach the
    /// file-search capability
    #[arg(long)]
    with_file_search: bool,

    /// Attach the remote code-interpreter capability
    #[arg(long)]
    with_code_interpreter: bool,

    /// Upload the font bundle for multilingual chart rendering (implies
    /// --with-code-interpreter)
    #[arg(long)]
    with_fonts: bool,

    /// Attach web grounding through the BING_CONNECTION_NAME connection
    #[arg(long)]
    with_web_grounding: bool,
}

impl Cli {
    fn capabilities(&self, config: &Config) -> Result<Vec<Capability>> {
        let mut capabilities = vec![Capability::Functions];
        if self.with_file_search {
            capabilities.push(Capability::FileSearch {
                files: vec![config.datasheet_path()],
                store_name: "Product Information Vector Store".to_string(),
            });
        }
        if self.with_code_interpreter || self.with_fonts {
            capabilities.push(Capability::CodeInterpreter {
                font_file: self.with_fonts.then(|| config.fonts_path()),
            });
        }
        if self.with_web_grounding {
            let connection_name = config
                .bing_connection_name
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BING_CONNECTION_NAME must be set for --with-web-grounding"))?;
            capabilities.push(Capability::WebGrounding { connection_name });
        }
        Ok(capabilities)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let database_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config.database_path());
    let sales_data = SalesData::open(&database_path)?;
    let schema_description = sales_data.schema_description()?;

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FetchSalesData::new(sales_data)));

    let service = HttpAgentsService::new(ServiceConfig {
        endpoint: config.endpoint.clone(),
        api_key: config.api_key.clone(),
    })?;

    let init_options = InitOptions {
        agent_name: "Sales Analysis Agent".to_string(),
        model: config.model.clone(),
        instructions_file: Some(config.instructions_path(&cli.instructions)),
        capabilities: cli.capabilities(&config)?,
        temperature: Some(config.temperature),
        top_p: Some(config.top_p),
    };

    println!("Creating agent...");
    let resources =
        match lifecycle::initialize(&service, &registry, &schema_description, &init_options).await
        {
            Ok(resources) => resources,
            Err(e) => {
                println!("{}", style(format!("Initialization failed: {e:#}")).red());
                println!("Exiting...");
                return Ok(());
            }
        };
    println!("Created agent, ID: {}", resources.agent.id);
    println!("Created thread, ID: {}", resources.thread.id);

    let run_options = RunOptions {
        max_completion_tokens: Some(config.max_completion_tokens),
        max_prompt_tokens: Some(config.max_prompt_tokens),
        temperature: Some(config.temperature),
        top_p: Some(config.top_p),
    };
    let driver = SessionDriver::new(&service, &registry, run_options, config.files_dir());
    let mut sink = ConsoleSink::new();

    let mut retain = false;
    loop {
        match input::read_input()? {
            UserInput::AskAgain => continue,
            UserInput::Exit => break,
            UserInput::Save => {
                retain = true;
                break;
            }
            UserInput::Message(content) => {
                tokio::select! {
                    result = driver.run_turn(&mut sink, &resources, &content) => {
                        match result {
                            Ok(TurnOutcome::Completed { .. }) => {}
                            Ok(TurnOutcome::Failed { message }) => {
                                sink.error(&format!("The run failed: {message}"));
                            }
                            Err(e) => {
                                sink.error(&format!("An error occurred posting the message: {e:#}"));
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        // Abort the in-flight exchange; cleanup still runs below.
                        sink.error("Interrupted, abandoning the current turn.");
                        break;
                    }
                }
            }
        }
    }

    if retain {
        sink.notice("The agent has not been deleted, so you can continue experimenting with it.");
        sink.notice(&format!(
            "Agent ID: {} (thread ID: {})",
            resources.agent.id, resources.thread.id
        ));
    } else {
        lifecycle::cleanup(&service, Some(resources)).await;
        sink.notice("The agent resources have been cleaned up.");
    }

    Ok(())
}
