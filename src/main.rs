use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use rust_hub_chat::config::{self, AppConfig};
use rust_hub_chat::network::{ChatClient, SignalRConnector};
use rust_hub_chat::storage::HistoryService;
use rust_hub_chat::ui::{ChatApp, ConnectForm};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "rust_hub_chat",
    version,
    about = "Private and broadcast chat over a realtime hub"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Server base URL, shared by the hub and the history API
    #[arg(long, env = config::BASE_URL_ENV, value_name = "URL")]
    base_url: Option<String>,
    /// Pre-fill the user name on the connect form
    #[arg(long)]
    user: Option<String>,
    /// Pre-fill the private chat recipient
    #[arg(long, conflicts_with = "broadcast")]
    recipient: Option<String>,
    /// Start with the broadcast room selected
    #[arg(long)]
    broadcast: bool,
    /// Write the effective config back to --config and exit
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn connect_form(&self) -> ConnectForm {
        ConnectForm {
            user_name: self.user.clone().unwrap_or_default(),
            recipient: self.recipient.clone().unwrap_or_default(),
            broadcast: self.broadcast,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config)
        .with_base_url(cli.base_url.clone())
        .validate()?;
    log::info!("Using chat server {}", app_config.base_url);

    if cli.save_config {
        config::save_config(&cli.config, &app_config)?;
        log::info!("Config written to {}", cli.config);
        return Ok(());
    }

    run_client(app_config, cli.connect_form()).await
}

async fn run_client(app_config: AppConfig, form: ConnectForm) -> Result<(), Box<dyn Error>> {
    let history = Arc::new(HistoryService::from_config(&app_config)?);
    let connector = Arc::new(SignalRConnector::from_config(&app_config)?);

    // UI -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    // Network task chạy ngầm
    let echo = app_config.echo_sent_messages;
    let send_timeout = app_config.invocation_timeout();
    tokio::spawn(async move {
        ChatClient::new(connector, history, event_tx)
            .with_echo_sent_messages(echo)
            .with_send_timeout(send_timeout)
            .run(cmd_rx)
            .await;
    });

    // UI chạy trên main thread
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);
    let mut form = Some(form);

    eframe::run_native(
        "Rust Hub Chat",
        options,
        Box::new(move |cc| {
            let (Some(event_receiver), Some(form)) = (event_rx.take(), form.take()) else {
                return Err("ChatApp should only be initialized once".into());
            };
            Ok(Box::new(ChatApp::new(cc, cmd_tx.clone(), event_receiver, form)))
        }),
    )?;
    Ok(())
}
