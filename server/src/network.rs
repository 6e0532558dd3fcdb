//! Server network layer: WebSocket connections and the fixed-rate game loop

use crate::client_manager::{ClientManager, Outbound, OUTBOUND_QUEUE_CAPACITY};
use crate::commands;
use crate::game::{ConnectionId, GameState, TickReport};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode_client_command, ClientCommand, ProtocolError, ServerPacket, TICK_INTERVAL_MS};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close reason sent to every connection when the server stops.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Events sent from connection tasks to the game loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        conn: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Outbound>,
    },
    Command {
        conn: ConnectionId,
        command: ClientCommand,
    },
    Disconnected {
        conn: ConnectionId,
    },
    Shutdown,
}

/// Messages produced by the game loop for delivery to connections
#[derive(Debug, Clone)]
pub enum GameMessage {
    SendPacket {
        packet: ServerPacket,
        conn: ConnectionId,
    },
    BroadcastPacket {
        packet: ServerPacket,
        exclude: Option<ConnectionId>,
    },
    CloseConnections {
        conns: Vec<ConnectionId>,
        reason: String,
    },
}

/// Turns a finished tick into death notices and the world broadcast.
///
/// The broadcast is skipped when nobody is listening.
pub fn tick_messages(report: TickReport, has_clients: bool) -> Vec<GameMessage> {
    let mut messages: Vec<GameMessage> = report
        .dead
        .into_iter()
        .filter_map(|(_, conn)| conn)
        .map(|conn| GameMessage::SendPacket {
            packet: ServerPacket::Dead,
            conn,
        })
        .collect();

    if has_clients {
        messages.push(GameMessage::BroadcastPacket {
            packet: report.snapshot,
            exclude: None,
        });
    }

    messages
}

/// Cloneable handle for talking to a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    events: mpsc::UnboundedSender<NetworkEvent>,
}

impl ServerHandle {
    /// Asks the game loop to close every connection and return.
    pub fn shutdown(&self) {
        if self.events.send(NetworkEvent::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating networking and game simulation
///
/// A single task owns the world and the connection registry. Connection
/// events and ticks are handled one at a time, so a tick always sees a
/// consistent world.
pub struct Server {
    listener: TcpListener,
    clients: ClientManager,
    game_state: GameState,
    tick_duration: Duration,

    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: ClientManager::new(),
            game_state: GameState::new(),
            tick_duration: Duration::from_millis(TICK_INTERVAL_MS),
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            events: self.event_tx.clone(),
        }
    }

    /// Runs the game loop until [`ServerHandle::shutdown`] is called.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            mut clients,
            mut game_state,
            tick_duration,
            event_tx,
            mut event_rx,
        } = self;

        let acceptor = spawn_acceptor(listener, event_tx);

        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        tick_interval.tick().await;

        info!("Game loop started ({}ms per tick)", tick_duration.as_millis());

        let mut game_loop = GameLoop {
            clients: &mut clients,
            game_state: &mut game_state,
        };

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(NetworkEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(event) => game_loop.handle_event(event),
                    }
                },

                _ = tick_interval.tick() => game_loop.run_tick(),
            }
        }

        acceptor.abort();
        clients.close_all(SHUTDOWN_REASON);
        Ok(())
    }
}

/// Borrowed view of the state the game loop mutates.
struct GameLoop<'a> {
    clients: &'a mut ClientManager,
    game_state: &'a mut GameState,
}

impl GameLoop<'_> {
    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected { conn, addr, sender } => {
                self.clients.add_client(conn, addr, sender);
                let messages = commands::handle_open(self.game_state, conn);
                self.dispatch(messages);
            }
            NetworkEvent::Command { conn, command } => {
                let messages = commands::process_command(self.game_state, conn, command);
                self.dispatch(messages);
            }
            NetworkEvent::Disconnected { conn } => {
                self.drop_connection(conn);
            }
            NetworkEvent::Shutdown => {}
        }
    }

    fn run_tick(&mut self) {
        let report = self.game_state.step();
        let tick = report.tick;

        if tick % 50 == 0 && !self.clients.is_empty() {
            debug!(
                "Tick {}: {} connections, {} snakes, {} food",
                tick,
                self.clients.len(),
                self.game_state.snake_count(),
                self.game_state.food().len()
            );
        }

        let messages = tick_messages(report, !self.clients.is_empty());
        self.dispatch(messages);
    }

    fn dispatch(&mut self, messages: Vec<GameMessage>) {
        for message in messages {
            match message {
                GameMessage::SendPacket { packet, conn } => {
                    let text = match encode(&packet) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode packet for connection {}: {}", conn, e);
                            continue;
                        }
                    };
                    if !self.clients.send(conn, text) {
                        self.drop_connection(conn);
                    }
                }
                GameMessage::BroadcastPacket { packet, exclude } => {
                    let text = match encode(&packet) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode broadcast: {}", e);
                            continue;
                        }
                    };
                    for conn in self.clients.broadcast(&text, exclude) {
                        self.drop_connection(conn);
                    }
                }
                GameMessage::CloseConnections { conns, reason } => {
                    for conn in conns {
                        self.clients.close(conn, &reason);
                    }
                }
            }
        }
    }

    /// Treats a connection as closed, whether or not it is still registered.
    fn drop_connection(&mut self, conn: ConnectionId) {
        self.clients.remove_client(&conn);
        commands::handle_close(self.game_state, conn);
    }
}

fn encode(packet: &ServerPacket) -> Result<String, ServerError> {
    Ok(packet.to_json()?)
}

/// Spawns task that accepts TCP connections and hands each to its own task
fn spawn_acceptor(
    listener: TcpListener,
    events: mpsc::UnboundedSender<NetworkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next_id: ConnectionId = 1;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let conn = next_id;
                    next_id += 1;
                    let events = events.clone();

                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, addr, conn, &events).await {
                            warn!("Connection {} from {} failed: {}", conn, addr, e);
                        }
                        // Removal is idempotent, so this is safe after a kick too
                        let _ = events.send(NetworkEvent::Disconnected { conn });
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

/// Pumps frames between one WebSocket and the game loop until either side
/// closes.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnectionId,
    events: &mpsc::UnboundedSender<NetworkEvent>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

    if events
        .send(NetworkEvent::Connected {
            conn,
            addr,
            sender: outbound_tx,
        })
        .is_err()
    {
        return Ok(());
    }

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => text.to_owned(),
                        Err(_) => {
                            debug!("Ignoring non-UTF-8 frame from connection {}", conn);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };

                match decode_client_command(&text) {
                    Ok(command) => {
                        if events.send(NetworkEvent::Command { conn, command }).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Ignoring message from connection {}: {}", conn, e),
                }
            },

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Text(text)) => ws_sender.send(Message::text(text)).await?,
                    Some(Outbound::Close(reason)) => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.into(),
                        };
                        ws_sender.send(Message::Close(Some(frame))).await?;
                        break;
                    }
                    None => break,
                }
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Direction, Point, Snake};

    #[test]
    fn test_tick_messages_notify_dead_players() {
        let mut state = GameState::with_seed(1);
        let player_id = state.add_player(3);
        state.insert_snake(Snake::from_cells(
            &player_id,
            Point::new(49, 10),
            [],
            Direction::Right,
        ));

        let messages = tick_messages(state.step(), true);

        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            GameMessage::SendPacket { packet: ServerPacket::Dead, conn: 3 }
        ));
        match &messages[1] {
            GameMessage::BroadcastPacket {
                packet: ServerPacket::Update { snakes, .. },
                exclude: None,
            } => assert!(snakes.is_empty()),
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_tick_messages_without_clients() {
        let mut state = GameState::with_seed(1);
        let messages = tick_messages(state.step(), false);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_dispatch_drops_stopped_connections() {
        let mut clients = ClientManager::new();
        let mut game_state = GameState::with_seed(1);
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        let mut game_loop = GameLoop {
            clients: &mut clients,
            game_state: &mut game_state,
        };
        game_loop.handle_event(NetworkEvent::Connected {
            conn: 1,
            addr,
            sender: tx,
        });
        assert_eq!(game_loop.game_state.player_count(), 1);

        // Writer task gone: the next broadcast treats the connection as closed
        drop(rx);
        game_loop.run_tick();

        assert!(game_loop.clients.is_empty());
        assert_eq!(game_loop.game_state.player_count(), 0);
        assert_eq!(game_loop.game_state.snake_count(), 0);
    }

    #[test]
    fn test_dispatch_drops_stalled_connections() {
        let mut clients = ClientManager::new();
        let mut game_state = GameState::with_seed(1);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        let mut game_loop = GameLoop {
            clients: &mut clients,
            game_state: &mut game_state,
        };
        game_loop.handle_event(NetworkEvent::Connected {
            conn: 1,
            addr,
            sender: tx,
        });

        // The reader never drains; once its queue is full it is dropped
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            game_loop.run_tick();
        }

        assert!(game_loop.clients.is_empty());
        assert_eq!(game_loop.game_state.player_count(), 0);

        let mut queued = 0;
        while rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, OUTBOUND_QUEUE_CAPACITY);
    }

    #[test]
    fn test_open_command_and_close_events() {
        let mut clients = ClientManager::new();
        let mut game_state = GameState::with_seed(1);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        let mut game_loop = GameLoop {
            clients: &mut clients,
            game_state: &mut game_state,
        };
        game_loop.handle_event(NetworkEvent::Connected {
            conn: 1,
            addr,
            sender: tx,
        });

        let init = match rx.try_recv().unwrap() {
            Outbound::Text(text) => ServerPacket::from_json(&text).unwrap(),
            other => panic!("Unexpected frame {:?}", other),
        };
        assert!(matches!(init, ServerPacket::Init { .. }));

        game_loop.handle_event(NetworkEvent::Command {
            conn: 1,
            command: ClientCommand::Admin(shared::AdminCommand::KickAll),
        });
        let reply = match rx.try_recv().unwrap() {
            Outbound::Text(text) => ServerPacket::from_json(&text).unwrap(),
            other => panic!("Unexpected frame {:?}", other),
        };
        assert_eq!(reply, ServerPacket::admin_msg("All players kicked!"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close(commands::KICK_REASON.to_string())
        );
        assert!(game_loop.clients.is_empty());

        // The connection task reports the close afterwards
        game_loop.handle_event(NetworkEvent::Disconnected { conn: 1 });
        assert_eq!(game_loop.game_state.player_count(), 0);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        tokio_test::block_on(async {
            let server = Server::bind("127.0.0.1:0").await.unwrap();
            let handle = server.handle();
            handle.shutdown();
            tokio_test::assert_ok!(server.run().await);

            // Shutting down a stopped server only logs
            handle.shutdown();
        });
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::from(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        ));
        assert_eq!(err.to_string(), "io error: address in use");
    }
}
