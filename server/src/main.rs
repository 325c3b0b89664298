use clap::Parser;
use log::{debug, info, warn};
use server::bridge::TableAffinity;
use server::runtime::ProcessServices;
use server::table::TableRegistry;
use shared::{channels, FanoutEvent};

/// Main-method of the application.
/// Parses command-line arguments, wires the process services, and hosts the
/// tables served by this realtime process.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Index of this process within the realtime fleet
        #[clap(long, default_value = "0")]
        process_id: u32,
        /// Total number of realtime processes in the fleet
        #[clap(long, default_value = "1")]
        process_count: u32,
        /// Number of tables to host at boot
        #[clap(short, long, default_value = "1")]
        tables: u32,
        /// Skip stats and rating updates for these tables
        #[clap(long)]
        unrated: bool,
        /// Test mode: single-team matches and a short countdown
        #[clap(long)]
        test_mode: bool,
    }

    env_logger::init();
    let args = Args::parse();

    let mut services = ProcessServices::in_memory(args.test_mode);
    services.affinity = TableAffinity::new(args.process_id, args.process_count);
    if args.process_count > 1 {
        // The in-memory bridge only spans this process; a multi-process
        // fleet needs a broker-backed bridge behind the same channel names.
        warn!("in-memory fan-out bridge does not reach the other {} process(es)",
            args.process_count - 1);
    }

    spawn_game_over_forwarder(&services);

    let mut registry = TableRegistry::new();
    for _ in 0..args.tables {
        let handle = registry.create_table(!args.unrated, &services);
        if !services.affinity.owns(handle.table_id()) {
            info!(
                "table {} is owned by process {}",
                handle.table_id(),
                services.affinity.owner_of(handle.table_id())
            );
        }
    }
    info!(
        "hosting {} table(s) as process {}/{}",
        registry.len(),
        args.process_id,
        args.process_count
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Example transport-edge subscriber: looks up each result's reachable
/// connections and forwards the payload without re-deriving any state.
fn spawn_game_over_forwarder(services: &ProcessServices) {
    let mut receiver = services.bridge.subscribe(channels::GAME_OVER);
    let presence = services.presence.clone();
    tokio::spawn(async move {
        while let Ok(bytes) = receiver.recv().await {
            let Ok(FanoutEvent::GameOver(payload)) =
                FanoutEvent::decode(channels::GAME_OVER, &bytes)
            else {
                continue;
            };
            for result in &payload.results {
                for connection in presence.connections(result.player_id) {
                    debug!(
                        "forwarding game-over for player {} to {}",
                        result.player_id, connection
                    );
                }
            }
        }
    });
}
