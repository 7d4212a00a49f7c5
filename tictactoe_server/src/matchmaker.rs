// Match coordinator: turns a creator and a joiner into a `Game`.
//
// Runs on the joiner's handler thread. The creator's thread is parked in the
// lobby, so its link is free to use here. The creator has not been read from
// since it asked for a new game, so a liveness probe goes out first; a creator
// that vanished while waiting fails here instead of mid-game.

use std::sync::Arc;

use log::info;

use tictactoe_protocol::Mark;

use crate::error::PairingFailed;
use crate::game::Game;
use crate::session::Session;

/// Payload of the probe sent to the creator before setup.
pub const PROBE_TOKEN: &str = "ping";

/// Bind `creator` (X) and `joiner` (O) to each other and deliver match setup
/// to both. On failure both are unbound again and no game exists.
pub fn pair(creator: Arc<Session>, joiner: Arc<Session>) -> Result<Game, PairingFailed> {
    creator.enter_match(&joiner, Mark::X);
    joiner.enter_match(&creator, Mark::O);

    let setup = creator
        .probe(PROBE_TOKEN)
        .and_then(|()| creator.begin_match_handshake(joiner.id(), Mark::X, joiner.id()))
        .map_err(|cause| PairingFailed {
            player: creator.id(),
            cause,
        })
        .and_then(|()| {
            joiner
                .begin_match_handshake(creator.id(), Mark::O, creator.id())
                .map_err(|cause| PairingFailed {
                    player: joiner.id(),
                    cause,
                })
        });

    if let Err(failed) = setup {
        creator.leave_match();
        joiner.leave_match();
        info!("{failed}");
        return Err(failed);
    }

    info!(
        "player {} is matched with player {}",
        creator.id(),
        joiner.id()
    );
    Ok(Game::new(creator, joiner))
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tictactoe_protocol::{PlayerId, Tag};

    use super::*;
    use crate::error::ConnectionLost;
    use crate::session::OPPONENT_LOST_MESSAGE;
    use crate::test_support::connected_session;

    #[test]
    fn alice_and_bob_receive_mirrored_setup() {
        let (alice, alice_peer) = connected_session(1, "alice");
        let (bob, mut bob_peer) = connected_session(2, "bob");

        // Alice's client has to answer the probe, so it runs on its own
        // thread; bob's confirmations can be written ahead.
        let alice_client = thread::spawn(move || {
            let mut peer = alice_peer;
            let opponent = peer.expect_integer(Tag::Assigned);
            peer.send(Tag::Confirm, "1");
            let role = peer.expect(Tag::Role);
            peer.send(Tag::Confirm, "2");
            let peer_id = peer.expect_integer(Tag::Integer);
            peer.send(Tag::Confirm, "3");
            (opponent, role, peer_id)
        });
        for step in ["1", "2", "3"] {
            bob_peer.send(Tag::Confirm, step);
        }

        let game = pair(Arc::clone(&alice), Arc::clone(&bob)).unwrap();
        assert_eq!(alice_client.join().unwrap(), (2, "X".to_string(), 2));
        assert_eq!(bob_peer.expect_integer(Tag::Assigned), 1);
        assert_eq!(bob_peer.expect(Tag::Role), "O");
        assert_eq!(bob_peer.expect_integer(Tag::Integer), 1);

        assert_eq!(alice.role(), Some(Mark::X));
        assert_eq!(bob.role(), Some(Mark::O));
        assert_eq!(alice.opponent().map(|o| o.id()), Some(PlayerId(2)));
        assert_eq!(bob.opponent().map(|o| o.id()), Some(PlayerId(1)));
        assert!(!alice.is_waiting() && !bob.is_waiting());
        drop(game);
    }

    #[test]
    fn vanished_creator_fails_pairing_and_tells_joiner() {
        let (alice, alice_peer) = connected_session(1, "alice");
        let (bob, mut bob_peer) = connected_session(2, "bob");
        drop(alice_peer);

        let failed = match pair(Arc::clone(&alice), Arc::clone(&bob)) {
            Err(failed) => failed,
            Ok(_) => panic!("pairing with a closed creator must fail"),
        };
        assert_eq!(failed.player, PlayerId(1));
        assert!(matches!(failed.cause, ConnectionLost::TransportLost(_)));

        assert_eq!(bob_peer.expect_quit(), OPPONENT_LOST_MESSAGE);
        assert!(bob.is_waiting());
        assert!(bob.opponent().is_none());
        assert!(bob.lost_cause().is_none());
    }
}
