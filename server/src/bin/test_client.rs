use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use rand::seq::SliceRandom;
use shared::{ClientPacket, Direction, ServerPacket};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless bot that plays against a running server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Admin command to send once after joining (spawnFood, resetGame, kickAll)
    #[arg(long)]
    admin: Option<String>,

    /// Stop after this many updates
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (ws_stream, _) = connect_async(args.server.as_str()).await?;
    info!("Connected to {}", args.server);

    let (mut sender, mut receiver) = ws_stream.split();
    let mut rng = rand::thread_rng();
    let mut player_id: Option<String> = None;
    let mut updates: u64 = 0;

    while let Some(frame) = receiver.next().await {
        let text = match frame? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(frame) => {
                info!("Server closed the connection: {:?}", frame);
                break;
            }
            _ => continue,
        };

        let packet = match ServerPacket::from_json(&text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Unreadable packet: {}", e);
                continue;
            }
        };

        let reply = match packet {
            ServerPacket::Init { player_id: id } => {
                info!("Joined as {}", id);
                player_id = Some(id);
                args.admin.clone().map(|command| ClientPacket::Admin {
                    command: Some(command),
                })
            }
            ServerPacket::Dead => {
                info!("Died, restarting");
                Some(ClientPacket::Restart)
            }
            ServerPacket::AdminMsg { message } => {
                info!("Admin: {}", message);
                None
            }
            ServerPacket::Update { snakes, food, .. } => {
                updates += 1;
                if let Some(limit) = args.ticks {
                    if updates >= limit {
                        break;
                    }
                }

                let length = player_id
                    .as_ref()
                    .and_then(|id| snakes.get(id))
                    .map(|snake| snake.len())
                    .unwrap_or(0);
                if updates % 25 == 0 {
                    info!(
                        "Update {}: {} snakes, {} food, own length {}",
                        updates,
                        snakes.len(),
                        food.len(),
                        length
                    );
                }

                // Turn now and then so the bot does not just run into a wall
                if updates % 5 == 0 {
                    Direction::ALL.choose(&mut rng).map(|dir| ClientPacket::Direction {
                        dir: dir.to_string(),
                    })
                } else {
                    None
                }
            }
        };

        if let Some(packet) = reply {
            sender.send(Message::text(packet.to_json()?)).await?;
        }
    }

    // The server may already have dropped the socket
    let _ = sender.close().await;
    Ok(())
}
