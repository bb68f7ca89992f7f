use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forge_core::{
    apps::AppsClient,
    chat::{ChatClient, DEFAULT_PROVIDER, Terminal},
    config::Config,
    containers::{ContainerClient, DEFAULT_FRAMEWORK},
    http_client::HttpClient,
};

#[derive(Parser)]
#[command(author, version, about = "forge backend CLI", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend origin, overrides the config file
    #[arg(long, global = true, env = "FORGE_BASE_URL")]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a chat reply (prints deltas live)
    Chat {
        #[arg(long, default_value = DEFAULT_PROVIDER)]
        provider: String,
        #[arg(short, long, help = "Message from the user")]
        message: String,
    },
    /// List LLM providers known to the backend
    Providers,
    /// Generate an app from a description
    GenerateApp {
        #[arg(short, long)]
        description: String,
        #[arg(long, default_value = DEFAULT_FRAMEWORK)]
        framework: String,
        #[arg(long, default_value = DEFAULT_PROVIDER)]
        provider: String,
    },
    /// App records
    #[command(subcommand)]
    Apps(AppsCmd),
    /// Sandbox container lifecycle
    #[command(subcommand)]
    Container(ContainerCmd),
}

#[derive(Subcommand)]
enum AppsCmd {
    List,
    Get { app_id: String },
    Delete { app_id: String },
    Deploy {
        app_id: String,
        #[arg(long, default_value = "web")]
        platform: String,
    },
    Build {
        app_id: String,
        #[arg(long, default_value = "android")]
        platform: String,
        #[arg(long, default_value = "debug")]
        build_type: String,
    },
    Analytics { app_id: String },
    Templates,
    FromTemplate {
        template_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = DEFAULT_FRAMEWORK)]
        framework: String,
    },
}

#[derive(Subcommand)]
enum ContainerCmd {
    Create {
        app_id: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(long, default_value = DEFAULT_FRAMEWORK)]
        framework: String,
        /// Block until the container is running
        #[arg(long)]
        wait: bool,
    },
    Status { app_id: String },
    Logs { app_id: String },
    Exec {
        app_id: String,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    Delete { app_id: String },
    List,
    /// Poll until the container is running or the attempt budget runs out
    Wait { app_id: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(base) = cli.base_url {
        cfg.api.base_url = base;
    }

    let http = HttpClient::new(&cfg.http)?;
    let base = cfg.api.base_url.clone();

    match cli.command {
        Commands::Chat { provider, message } => {
            if !cfg.is_known_provider(&provider) {
                tracing::warn!("llm.provider" = %provider, "provider not in configured list");
            }
            let chat = ChatClient::new(http, base);
            let session = chat
                .stream_chat_message(
                    &message,
                    &provider,
                    |delta| {
                        print!("{delta}");
                        io::stdout().flush().ok();
                    },
                    || println!(),
                    |err| eprintln!("[error: {err}]"),
                )
                .await;
            if let Terminal::Failed(msg) = session.terminal() {
                anyhow::bail!("chat stream failed: {msg}");
            }
        }
        Commands::Providers => {
            let list = ChatClient::new(http, base).providers().await?;
            for p in list.providers {
                let mark = if p.available { "+" } else { "-" };
                println!("{mark} {:<10} {}", p.id, p.name);
            }
        }
        Commands::GenerateApp {
            description,
            framework,
            provider,
        } => {
            let app = ChatClient::new(http, base)
                .generate_app(&description, &framework, &provider)
                .await?;
            println!("{} ({}) -> {} files", app.id, app.name, app.files.len());
        }
        Commands::Apps(cmd) => run_apps(AppsClient::new(http, base), cmd).await?,
        Commands::Container(cmd) => {
            let client = ContainerClient::new(http, base, cfg.poll.retry_policy());
            run_container(client, cmd).await?
        }
    }

    Ok(())
}

async fn run_apps(apps: AppsClient, cmd: AppsCmd) -> anyhow::Result<()> {
    match cmd {
        AppsCmd::List => {
            for app in apps.list_apps().await?.apps {
                println!(
                    "{:<24} {:<14} {}",
                    app.id,
                    app.status.as_deref().unwrap_or("-"),
                    app.name
                );
            }
        }
        AppsCmd::Get { app_id } => print_json(&apps.get_app(&app_id).await?)?,
        AppsCmd::Delete { app_id } => print_json(&apps.delete_app(&app_id).await?)?,
        AppsCmd::Deploy { app_id, platform } => {
            print_json(&apps.deploy_app(&app_id, &platform).await?)?
        }
        AppsCmd::Build {
            app_id,
            platform,
            build_type,
        } => print_json(&apps.build_app(&app_id, &platform, &build_type).await?)?,
        AppsCmd::Analytics { app_id } => print_json(&apps.app_analytics(&app_id).await?)?,
        AppsCmd::Templates => {
            for t in apps.templates().await?.templates {
                println!("{:<16} {}", t.id, t.name);
            }
        }
        AppsCmd::FromTemplate {
            template_id,
            name,
            framework,
        } => print_json(
            &apps
                .create_from_template(&template_id, &name, &framework)
                .await?,
        )?,
    }
    Ok(())
}

async fn run_container(client: ContainerClient, cmd: ContainerCmd) -> anyhow::Result<()> {
    match cmd {
        ContainerCmd::Create {
            app_id,
            description,
            framework,
            wait,
        } => {
            let created = client
                .create_container(&app_id, &description, &framework)
                .await?;
            print_json(&created)?;
            if wait {
                let ready = client.wait_for_container(&app_id).await?;
                print_json(&ready.record(&app_id))?;
            }
        }
        ContainerCmd::Status { app_id } => print_json(&client.container_status(&app_id).await?)?,
        ContainerCmd::Logs { app_id } => print!("{}", client.container_logs(&app_id).await?.logs),
        ContainerCmd::Exec { app_id, command } => {
            let out = client.execute_command(&app_id, &command.join(" ")).await?;
            print!("{}", out.output);
            if let Some(code) = out.exit_code.filter(|c| *c != 0) {
                anyhow::bail!("command exited with {code}");
            }
        }
        ContainerCmd::Delete { app_id } => print_json(&client.delete_container(&app_id).await?)?,
        ContainerCmd::List => {
            for c in client.list_containers().await?.containers {
                println!("{:<24} {:?}", c.app_id, c.status);
            }
        }
        ContainerCmd::Wait { app_id } => {
            let ready = client.wait_for_container(&app_id).await?;
            print_json(&ready.record(&app_id))?;
        }
    }
    Ok(())
}
