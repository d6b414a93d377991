#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use arbiter_server::config;
use arbiter_server::game::GameRegistry;
use arbiter_server::lobby::directory::InMemoryLobbyList;
use arbiter_server::lobby::LobbyRegistry;
use arbiter_server::logging;
use arbiter_server::matchmaker::Matchmaker;
use arbiter_server::store::InMemoryStore;
use arbiter_server::websocket::{create_router, AppState};

/// Arbiter -- authoritative real-time game server for a chess platform
#[derive(Parser, Debug)]
#[command(name = "arbiter-server")]
#[command(about = "Authoritative real-time chess game server: rooms, lobbies, matchmaking")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code defaults.
    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    if cli.validate_config {
        println!("Configuration validation passed");
        println!();
        println!("Configuration summary:");
        println!("  Port: {}", cfg.port);
        println!("  Public base URL: {}", cfg.public_base_url);
        println!("  Spectator cap: {}", cfg.game.max_spectators);
        println!("  Queue TTL: {}s", cfg.matchmaking.queue_ttl_secs);
        println!("  Lobby timeout: {}s", cfg.lobby.waiting_timeout_secs);
        return Ok(());
    }

    logging::init_with_config(&cfg.logging);

    let port: u16 = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting Arbiter server");

    let store = Arc::new(InMemoryStore::new());
    let lobby_list = Arc::new(InMemoryLobbyList::new());
    let games = GameRegistry::new(cfg.clone(), store.clone(), lobby_list.clone());
    let lobbies = LobbyRegistry::new(
        cfg.clone(),
        store.clone(),
        lobby_list.clone(),
        games.clone(),
    );
    let matchmaker = Matchmaker::spawn(cfg.clone(), store.clone(), games.clone());

    let state = AppState {
        config: cfg.clone(),
        games,
        lobbies,
        matchmaker,
    };
    let router = create_router(state, &cfg.cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.cors_origins,
        "Server started - game rooms: /game/{{id}}/ws, matchmaking: /matchmaking/queue/join"
    );

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn default_no_flags() {
        let cli = Cli::try_parse_from(["arbiter-server"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn validate_config_flags() {
        let cli = Cli::try_parse_from(["arbiter-server", "--validate-config"]).unwrap();
        assert!(cli.validate_config);
        let cli = Cli::try_parse_from(["arbiter-server", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn validate_and_print_conflict() {
        let result =
            Cli::try_parse_from(["arbiter-server", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }
}
