//! Routing of connection events and player commands into the world.
//!
//! Each handler applies one event to the [`GameState`] and returns the
//! messages the transport should deliver as a result. Commands from a
//! connection with no registered player are dropped, which covers the race
//! between a command and a disconnect or kick.

use crate::game::{ConnectionId, GameState};
use crate::network::GameMessage;
use log::debug;
use shared::{AdminCommand, ClientCommand, ServerPacket};

/// Close reason sent to every connection on kick-all.
pub const KICK_REASON: &str = "Kicked by admin.";

/// Registers a freshly opened connection and greets it with its player id.
pub fn handle_open(state: &mut GameState, conn: ConnectionId) -> Vec<GameMessage> {
    let player_id = state.add_player(conn);
    vec![GameMessage::SendPacket {
        packet: ServerPacket::Init { player_id },
        conn,
    }]
}

/// Forgets a closed connection. Safe to call more than once.
pub fn handle_close(state: &mut GameState, conn: ConnectionId) {
    state.remove_player(conn);
}

/// Applies one decoded command from `conn`.
pub fn process_command(
    state: &mut GameState,
    conn: ConnectionId,
    command: ClientCommand,
) -> Vec<GameMessage> {
    let Some(player_id) = state.player_for(conn).cloned() else {
        debug!("Ignoring {:?} from unregistered connection {}", command, conn);
        return Vec::new();
    };

    match command {
        ClientCommand::SetDirection(direction) => {
            state.set_direction(&player_id, direction);
            Vec::new()
        }
        ClientCommand::Restart => {
            state.restart(&player_id);
            Vec::new()
        }
        ClientCommand::Admin(admin) => {
            state.grant_admin_if_first(&player_id);
            process_admin_command(state, conn, admin)
        }
    }
}

fn process_admin_command(
    state: &mut GameState,
    conn: ConnectionId,
    command: AdminCommand,
) -> Vec<GameMessage> {
    let reply = |message: &str| GameMessage::SendPacket {
        packet: ServerPacket::admin_msg(message),
        conn,
    };

    match command {
        AdminCommand::SpawnFood => {
            state.add_food();
            vec![reply("Food spawned!")]
        }
        AdminCommand::ResetGame => {
            state.reset_game();
            vec![reply("Game reset!")]
        }
        AdminCommand::KickAll => {
            let conns = state.kick_all();
            vec![
                reply("All players kicked!"),
                GameMessage::CloseConnections {
                    conns,
                    reason: KICK_REASON.to_string(),
                },
            ]
        }
        AdminCommand::Other(other) => {
            debug!("Unknown admin command {:?} from connection {}", other, conn);
            Vec::new()
        }
    }
}
