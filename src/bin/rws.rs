//! RWS - command line access to an ABB controller
//!
//! Thin wrapper over the `abb_rws` library for inspecting and poking a
//! controller from a terminal.

use abb_rws::{
    Cycle, Priority, RobotWebServices, RwsClient, RwsConfig, RwsError, SignalAddress, SubscriptionRequest,
    SubscriptionResource,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/controller.yaml";

#[derive(Parser)]
#[command(name = "rws")]
#[command(about = "ABB Robot Web Services client")]
#[command(version)]
struct Args {
    /// Path to the controller configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the controller base URL
    #[arg(long)]
    url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Controller, operation mode, execution state and speed ratio
    Status,
    /// List RAPID tasks
    Tasks,
    /// Select motion tasks and start RAPID execution
    Start {
        /// asis, once or forever
        #[arg(long, default_value = "asis")]
        cycle: Cycle,
        /// Motion tasks to run; defaults to the configured task
        tasks: Vec<String>,
    },
    /// Stop RAPID execution
    Stop,
    /// Switch motors on or off
    Motors { state: MotorsArg },
    /// Read or write IO signals
    Io {
        #[command(subcommand)]
        action: IoAction,
    },
    /// Read or write RAPID persistent variables
    Var {
        #[command(subcommand)]
        action: VarAction,
    },
    /// Print the event log
    Elog {
        #[arg(long, default_value_t = 0)]
        domain: u32,
        /// Only print the newest N entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Controller file service
    File {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Get or set the speed ratio
    Speed { value: Option<u8> },
    /// Print subscription notifications until interrupted
    Subscribe {
        /// Signal names (bare or network/unit/name)
        #[arg(long)]
        signal: Vec<String>,
        /// Persistent variables in task/name form
        #[arg(long)]
        var: Vec<String>,
        #[arg(long)]
        elog: bool,
        #[arg(long)]
        execution: bool,
        #[arg(long)]
        controller: bool,
        #[arg(long)]
        opmode: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MotorsArg {
    On,
    Off,
}

#[derive(Subcommand)]
enum IoAction {
    Get {
        signal: String,
        #[arg(long)]
        analog: bool,
    },
    Set {
        signal: String,
        value: String,
        #[arg(long)]
        analog: bool,
    },
}

#[derive(Subcommand)]
enum VarAction {
    /// List persistent variables
    List {
        /// Limit to one task; all tasks otherwise
        #[arg(long)]
        task: Option<String>,
    },
    Get {
        name: String,
        #[arg(long)]
        task: Option<String>,
    },
    Set {
        name: String,
        value: String,
        #[arg(long)]
        task: Option<String>,
    },
}

#[derive(Subcommand)]
enum FileAction {
    Ls { directory: String },
    Get { directory: String, filename: String },
    Put { directory: String, filename: String, local: String },
    Rm { directory: String, filename: String },
}

impl Args {
    fn load_config(&self) -> Result<RwsConfig> {
        let explicit = self
            .config
            .clone()
            .or_else(|| std::env::var("RWS_CONFIG").ok());
        let mut config = match explicit {
            Some(path) => RwsConfig::load_from_path(&path).with_context(|| format!("Failed to load config {}", path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => RwsConfig::load_from_path(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG_PATH))?,
            None => {
                info!("No configuration file, using built-in defaults");
                RwsConfig::default()
            }
        };
        if let Some(url) = &self.url {
            config.controller.base_url = url.clone();
        }
        Ok(config)
    }
}

/// `network/unit/name` or a bare signal name.
fn parse_signal(raw: &str) -> Result<SignalAddress> {
    let parts: Vec<&str> = raw.split('/').collect();
    match parts.as_slice() {
        [name] => Ok(SignalAddress::bare(*name)),
        [network, unit, name] => Ok(SignalAddress::qualified(*network, *unit, *name)),
        _ => bail!("Signal must be NAME or NETWORK/UNIT/NAME, got '{}'", raw),
    }
}

fn parse_digital(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => bail!("Digital value must be 0 or 1, got '{}'", raw),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: &Args, client: &RwsClient) -> Result<()> {
    let default_task = client.defaults().task().to_string();

    match &args.command {
        Command::Status => {
            let execution = client.get_execution_state().await?;
            println!("controller: {}", client.get_controller_state().await?);
            println!("opmode:     {}", client.get_operation_mode().await?);
            println!("execution:  {} ({})", execution.ctrlexecstate, execution.cycle);
            println!("speed:      {}%", client.get_speed_ratio().await?);
        }
        Command::Tasks => print_json(&client.get_tasks().await?)?,
        Command::Start { cycle, tasks } => {
            let selected: Vec<&str> = if tasks.is_empty() {
                vec![default_task.as_str()]
            } else {
                tasks.iter().map(String::as_str).collect()
            };
            client.start(*cycle, &selected).await?;
            info!("Started {} ({})", selected.join(", "), cycle.as_str());
        }
        Command::Stop => client.stop().await?,
        Command::Motors { state } => match state {
            MotorsArg::On => client.set_motors_on().await?,
            MotorsArg::Off => client.set_motors_off().await?,
        },
        Command::Io { action } => match action {
            IoAction::Get { signal, analog } => {
                let address = parse_signal(signal)?;
                if *analog {
                    println!("{}", client.get_analog_io(&address).await?);
                } else {
                    println!("{}", client.get_digital_io(&address).await?);
                }
            }
            IoAction::Set { signal, value, analog } => {
                let address = parse_signal(signal)?;
                if *analog {
                    let value: f64 = value.parse().with_context(|| format!("'{}' is not a number", value))?;
                    client.set_analog_io(&address, value).await?;
                } else {
                    client.set_digital_io(&address, parse_digital(value)?).await?;
                }
            }
        },
        Command::Var { action } => match action {
            VarAction::List { task } => print_json(&client.get_rapid_variables(task.as_deref()).await?)?,
            VarAction::Get { name, task } => {
                let task = task.as_deref().unwrap_or(&default_task);
                println!("{}", client.get_rapid_variable(task, name).await?);
            }
            VarAction::Set { name, value, task } => {
                let task = task.as_deref().unwrap_or(&default_task);
                client.set_rapid_variable(task, name, value).await?;
            }
        },
        Command::Elog { domain, limit } => {
            let mut entries = client.read_event_log(*domain).await?;
            entries.sort_by_key(|e| std::cmp::Reverse(e.seqnum));
            if let Some(limit) = limit {
                entries.truncate(*limit);
            }
            print_json(&entries)?;
        }
        Command::File { action } => match action {
            FileAction::Ls { directory } => {
                for name in client.list_files(directory).await? {
                    println!("{}", name);
                }
            }
            FileAction::Get { directory, filename } => match client.read_file(directory, filename).await? {
                Some(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
                None => bail!("{}/{} does not exist", directory, filename),
            },
            FileAction::Put {
                directory,
                filename,
                local,
            } => {
                let contents = tokio::fs::read(local)
                    .await
                    .with_context(|| format!("Failed to read {}", local))?;
                client.upload_file(directory, filename, &contents).await?;
            }
            FileAction::Rm { directory, filename } => client.delete_file(directory, filename).await?,
        },
        Command::Speed { value } => match value {
            Some(value) => client.set_speed_ratio(*value).await?,
            None => println!("{}", client.get_speed_ratio().await?),
        },
        Command::Subscribe {
            signal,
            var,
            elog,
            execution,
            controller,
            opmode,
        } => {
            let mut requests = Vec::new();
            for raw in signal {
                requests.push(SubscriptionRequest::new(
                    SubscriptionResource::Signal(parse_signal(raw)?),
                    Priority::High,
                )?);
            }
            for raw in var {
                let (task, name) = raw.split_once('/').unwrap_or((default_task.as_str(), raw.as_str()));
                requests.push(SubscriptionRequest::new(
                    SubscriptionResource::PersVar {
                        task: task.to_string(),
                        name: name.to_string(),
                    },
                    Priority::High,
                )?);
            }
            let flags = [
                (*elog, SubscriptionResource::Elog { domain: 0 }),
                (*execution, SubscriptionResource::ExecutionState),
                (*controller, SubscriptionResource::ControllerState),
                (*opmode, SubscriptionResource::OperationalMode),
            ];
            for (enabled, resource) in flags {
                if enabled {
                    requests.push(SubscriptionRequest::new(resource, Priority::Medium)?);
                }
            }
            if requests.is_empty() {
                bail!("Nothing to subscribe to; pass --signal, --var, --elog, --execution, --controller or --opmode");
            }

            let mut subscription = client.subscribe(requests).await?;
            info!("Subscribed, press Ctrl+C to stop");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Closing subscription");
                        subscription.close().await;
                        break;
                    }
                    next = subscription.next() => match next {
                        Some(Ok(notification)) => println!("[{}] {:?}", notification.index, notification.event),
                        Some(Err(e)) => return Err::<(), _>(e).context("Subscription failed"),
                        None => {
                            warn!("Subscription ended");
                            break;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    let client = RwsClient::from_config(&config).context("Failed to create RWS client")?;

    let result = run(&args, &client).await;
    if let Err(e) = client.logout().await {
        warn!("Logout failed: {}", e);
    }

    if let Err(e) = &result {
        if let Some(RwsError::MastershipDenied(reason)) = e.downcast_ref::<RwsError>() {
            eprintln!("Mastership is held by another client ({}); try again later", reason);
            std::process::exit(2);
        }
    }
    result
}
