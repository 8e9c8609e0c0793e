mod repl;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use peril::prelude::*;
use repl::Command;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// peril - a war game played over RabbitMQ
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// AMQP URL of the broker
    #[arg(long, env = "PERIL_BROKER_URL", default_value = peril::DEFAULT_BROKER_URL)]
    broker_url: String,

    /// Unacknowledged deliveries allowed per subscription (at least 1)
    #[arg(
        long,
        env = "PERIL_PREFETCH",
        default_value_t = default_prefetch(),
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    prefetch: u16,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Control the game and collect its logs
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Join as a player and read commands from stdin
    Client {
        /// Name other players see
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Subcommand, Debug)]
enum ServerAction {
    /// Pause the game for every player
    Pause,
    /// Resume the game for every player
    Resume,
    /// Consume game logs until Ctrl-C
    Logs {
        /// Append logs to this file instead of printing them
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// How often the REPL checks that its subscriptions are still alive.
const HEALTH_CHECK: Duration = Duration::from_secs(1);

fn default_prefetch() -> u16 {
    PerilConfig::default().prefetch
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = PerilConfig::default()
        .with_broker_url(args.broker_url)
        .with_prefetch(args.prefetch);

    tracing::info!(url = %config.broker_url, "connecting to broker");
    let conn = AmqpConnection::connect(&config.broker_url)
        .await
        .with_context(|| format!("could not connect to {}", config.broker_url))?;

    match args.role {
        Role::Server { action } => run_server(conn, config, action).await,
        Role::Client { username } => run_client(conn, config, username).await,
    }
}

async fn run_server(
    conn: AmqpConnection,
    config: PerilConfig,
    action: ServerAction,
) -> anyhow::Result<()> {
    let mut server = PerilServer::start(conn, config).await?;

    match action {
        ServerAction::Pause => {
            server.pause().await?;
            println!("Game paused");
        }
        ServerAction::Resume => {
            server.resume().await?;
            println!("Game resumed");
        }
        ServerAction::Logs { file } => {
            match file {
                Some(path) => server.consume_logs(FileSink::new(path)).await?,
                None => server.consume_logs(TracingSink).await?,
            }
            println!("Consuming game logs, press Ctrl-C to stop");
            let mut health = tokio::time::interval(HEALTH_CHECK);
            loop {
                tokio::select! {
                    _ = health.tick() => {
                        if !server.is_consuming() {
                            bail!("lost the game log subscription, is the broker still up?");
                        }
                    }
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        break;
                    }
                }
            }
        }
    }

    server.shutdown().await?;
    Ok(())
}

async fn run_client(
    conn: AmqpConnection,
    config: PerilConfig,
    username: String,
) -> anyhow::Result<()> {
    let mut client = PerilClient::join(conn, username, &config).await?;
    println!("Welcome to Peril, {}!", client.username());
    repl::print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut health = tokio::time::interval(HEALTH_CHECK);
    loop {
        tokio::select! {
            _ = health.tick() => {
                if !client.is_consuming() {
                    bail!("lost a game subscription, is the broker still up?");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(err) = execute(&client, command).await {
                            println!("{err}");
                        }
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            Some(report) = client.war_reports().recv() => print_report(&report),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("I hate this game! (╯°□°)╯︵ ┻━┻");
    client.shutdown().await?;
    Ok(())
}

async fn execute<C: Connection>(
    client: &PerilClient<C>,
    command: Command,
) -> Result<(), PerilError> {
    match command {
        Command::Spawn { location, rank } => {
            let unit = client.spawn(location, rank).await;
            println!("Spawned a(n) {} in {} with id {}", unit.rank, unit.location, unit.id);
        }
        Command::Move { location, ids } => {
            let mv = client.move_units(location, &ids).await?;
            println!("Moved {} unit(s) to {}", mv.units.len(), mv.to_location);
        }
        Command::Status => print_status(&client.status().await),
        Command::Spam(count) => {
            client.spam(count).await?;
            println!("Published {count} malicious logs");
        }
        Command::Help => repl::print_help(),
        Command::Quit => {}
    }
    Ok(())
}

fn print_status(status: &Status) {
    if status.paused {
        println!("The game is paused.");
    } else {
        println!("The game is not paused.");
    }
    println!("You are {}, and you have {} units.", status.username, status.units.len());
    for unit in &status.units {
        println!("* {}: {}, {}", unit.id, unit.location, unit.rank);
    }
}

fn print_report(report: &WarReport) {
    match report.outcome {
        WarOutcome::YouWon | WarOutcome::OpponentWon | WarOutcome::Draw => {
            if let Some(message) = report.log_message() {
                println!("{message}");
            }
            if !report.units_lost.is_empty() {
                println!("You lost {} unit(s)", report.units_lost.len());
            }
        }
        WarOutcome::NotInvolved | WarOutcome::NoUnits => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefetch_must_be_positive() {
        let parse = |prefetch: &str| {
            Args::try_parse_from(["peril", "--prefetch", prefetch, "client", "-u", "alice"])
        };
        assert_eq!(parse("3").unwrap().prefetch, 3);
        assert!(parse("0").is_err());
    }

    #[test]
    fn test_server_logs_to_file() {
        let args = Args::try_parse_from(["peril", "server", "logs", "--file", "game.log"]).unwrap();
        assert!(matches!(
            args.role,
            Role::Server {
                action: ServerAction::Logs { file: Some(_) }
            }
        ));
    }
}
