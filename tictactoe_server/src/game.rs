// Game engine: board, win detection, and the alternating-turn exchange.
//
// `Board` is nine cells, each empty or holding a `Mark`. Cells only ever go
// from empty to marked. `Board::evaluate` checks the eight winning triples for
// one mark in a fixed scan order (the three horizontal lines first, then the
// verticals, then both diagonals) and reports the first hit, so two
// simultaneous lines always resolve the same way.
//
// `Game` owns the two paired sessions and drives them from the joiner's
// handler thread. Each turn:
//   1. board to both players, 2. `CY` to the mover and `CN` to the waiter,
//   3. read the mover's cell and relay it to the waiter before looking at it,
//   4. mark the cell if it is empty (an occupied cell is silently ignored),
//   5. evaluate for the mover only; on a terminal result send the final
//      board, the outcome, and for a win the path, else pass the turn.
// The turn passes even when the move was ignored. Seat one always moves
// first.
//
// Any send or receive failure aborts the game. The failing session's lost
// path has already told the survivor; the engine just records which seat was
// lost and unbinds both players.

use std::sync::Arc;

use log::{debug, info};

use tictactoe_protocol::{Mark, PlayerId, Tag, TurnSignal};

use crate::error::ConnectionLost;
use crate::session::Session;

/// The eight winning lines, in scan order.
pub const WINNING_TRIPLES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Wire form of a winning triple, e.g. `"048"`.
pub fn path_to_wire(path: [usize; 3]) -> String {
    path.iter().map(|cell| cell.to_string()).collect()
}

/// Result of evaluating the board for one mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Draw,
    Win([usize; 3]),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [Option<Mark>; 9],
}

impl Board {
    pub const CELLS: usize = 9;

    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the nine-character wire form. Space is empty.
    pub fn from_wire(s: &str) -> Option<Self> {
        let mut board = Board::new();
        let mut count = 0;
        for (index, c) in s.chars().enumerate() {
            if index >= Self::CELLS {
                return None;
            }
            if c != ' ' {
                board.cells[index] = Some(Mark::from_char(c)?);
            }
            count += 1;
        }
        (count == Self::CELLS).then_some(board)
    }

    pub fn to_wire(&self) -> String {
        self.cells
            .iter()
            .map(|cell| cell.map_or(' ', Mark::as_char))
            .collect()
    }

    pub fn cell(&self, index: usize) -> Option<Mark> {
        self.cells.get(index).copied().flatten()
    }

    /// Mark an empty cell. Returns false, leaving the board untouched, if the
    /// cell is taken or out of range.
    pub fn place(&mut self, index: usize, mark: Mark) -> bool {
        match self.cells.get_mut(index) {
            Some(cell @ None) => {
                *cell = Some(mark);
                true
            }
            _ => false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn evaluate(&self, mark: Mark) -> Verdict {
        let owned = |triple: &[usize; 3]| triple.iter().all(|&i| self.cells[i] == Some(mark));
        if let Some(triple) = WINNING_TRIPLES.iter().find(|t| owned(t)) {
            return Verdict::Win(*triple);
        }
        if self.is_full() {
            Verdict::Draw
        } else {
            Verdict::Continue
        }
    }
}

/// Which side of the pairing. Seat one is the listing creator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub fn other(self) -> Self {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    fn index(self) -> usize {
        match self {
            Seat::One => 0,
            Seat::Two => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    AwaitingMove(Seat),
    Draw,
    Win { winner: Seat, path: [usize; 3] },
    Aborted { lost: Seat },
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameState::AwaitingMove(_))
    }
}

/// How a finished game ended, in player terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameOutcome {
    Draw,
    Win {
        winner: PlayerId,
        loser: PlayerId,
        path: [usize; 3],
    },
    Aborted {
        lost: PlayerId,
        cause: ConnectionLost,
    },
}

pub struct Game {
    players: [Arc<Session>; 2],
    marks: [Mark; 2],
    board: Board,
    state: GameState,
    turns: u32,
}

impl Game {
    /// Start a game between two sessions the match coordinator has already
    /// bound to each other. Marks come from the sessions' assigned roles.
    pub(crate) fn new(one: Arc<Session>, two: Arc<Session>) -> Self {
        let mark_one = one.role().unwrap_or(Mark::X);
        let mark_two = two.role().unwrap_or(mark_one.opponent());
        Self {
            players: [one, two],
            marks: [mark_one, mark_two],
            board: Board::new(),
            state: GameState::AwaitingMove(Seat::One),
            turns: 0,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn player(&self, seat: Seat) -> &Arc<Session> {
        &self.players[seat.index()]
    }

    /// Play turns until a terminal state, then unbind both players.
    pub fn run(mut self) -> GameOutcome {
        info!(
            "game started: player {} ({}) vs player {} ({})",
            self.player(Seat::One).id(),
            self.marks[0],
            self.player(Seat::Two).id(),
            self.marks[1],
        );
        let mut seat = Seat::One;
        let outcome = loop {
            match self.play_turn(seat) {
                Ok(GameState::AwaitingMove(next)) => {
                    self.state = GameState::AwaitingMove(next);
                    seat = next;
                }
                Ok(GameState::Win { winner, path }) => {
                    self.state = GameState::Win { winner, path };
                    break GameOutcome::Win {
                        winner: self.player(winner).id(),
                        loser: self.player(winner.other()).id(),
                        path,
                    };
                }
                Ok(state) => {
                    self.state = state;
                    break GameOutcome::Draw;
                }
                Err((lost, cause)) => {
                    self.state = GameState::Aborted { lost };
                    break GameOutcome::Aborted {
                        lost: self.player(lost).id(),
                        cause,
                    };
                }
            }
        };
        for player in &self.players {
            player.leave_match();
        }
        info!("game over after {} turns: {outcome:?}", self.turns);
        outcome
    }

    /// One turn for `seat`. Returns the next state, or the seat whose
    /// connection failed.
    fn play_turn(&mut self, seat: Seat) -> Result<GameState, (Seat, ConnectionLost)> {
        let waiting = seat.other();
        let mark = self.marks[seat.index()];

        self.broadcast_board()?;
        self.send(seat, Tag::Command, TurnSignal::YourTurn.as_str())?;
        self.send(waiting, Tag::Command, TurnSignal::Wait.as_str())?;

        let mover = Arc::clone(self.player(seat));
        let cell = mover
            .receive_integer(Tag::Move)
            .map_err(|cause| (seat, cause))?;
        self.send(waiting, Tag::Integer, &cell.to_string())?;
        self.turns += 1;

        let index = match usize::try_from(cell) {
            Ok(cell @ 1..=9) => cell - 1,
            _ => {
                let cause = mover.fail(ConnectionLost::ProtocolViolation(format!(
                    "move {cell} is outside 1-9"
                )));
                return Err((seat, cause));
            }
        };
        if self.board.place(index, mark) {
            debug!("player {} placed {mark} at {cell}", mover.id());
        } else {
            debug!(
                "player {} tried occupied cell {cell}; turn passes anyway",
                mover.id()
            );
        }

        match self.board.evaluate(mark) {
            Verdict::Continue => Ok(GameState::AwaitingMove(waiting)),
            Verdict::Draw => {
                self.broadcast_board()?;
                self.send(seat, Tag::Command, TurnSignal::Draw.as_str())?;
                self.send(waiting, Tag::Command, TurnSignal::Draw.as_str())?;
                Ok(GameState::Draw)
            }
            Verdict::Win(path) => {
                self.broadcast_board()?;
                self.send(seat, Tag::Command, TurnSignal::Win.as_str())?;
                self.send(waiting, Tag::Command, TurnSignal::Loss.as_str())?;
                mover.record_win();
                self.player(waiting).record_loss();
                let wire_path = path_to_wire(path);
                self.send(seat, Tag::Path, &wire_path)?;
                self.send(waiting, Tag::Path, &wire_path)?;
                Ok(GameState::Win { winner: seat, path })
            }
        }
    }

    fn broadcast_board(&self) -> Result<(), (Seat, ConnectionLost)> {
        let board = self.board.to_wire();
        let mover = match self.state {
            GameState::AwaitingMove(seat) => seat,
            _ => Seat::One,
        };
        self.send(mover, Tag::Board, &board)?;
        self.send(mover.other(), Tag::Board, &board)
    }

    fn send(&self, seat: Seat, tag: Tag, payload: &str) -> Result<(), (Seat, ConnectionLost)> {
        self.player(seat)
            .send(tag, payload)
            .map_err(|cause| (seat, cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OPPONENT_LOST_MESSAGE;
    use crate::test_support::{ScriptedPeer, connected_session};

    fn board(s: &str) -> Board {
        Board::from_wire(s).unwrap()
    }

    /// Two sessions bound as creator (X) and joiner (O), plus their clients.
    fn paired() -> (Game, ScriptedPeer, ScriptedPeer) {
        let (alice, alice_peer) = connected_session(1, "alice");
        let (bob, bob_peer) = connected_session(2, "bob");
        alice.enter_match(&bob, Mark::X);
        bob.enter_match(&alice, Mark::O);
        (Game::new(alice, bob), alice_peer, bob_peer)
    }

    #[test]
    fn every_triple_wins_for_its_owner() {
        for triple in WINNING_TRIPLES {
            let mut b = Board::new();
            for cell in triple {
                assert!(b.place(cell, Mark::O));
            }
            assert_eq!(b.evaluate(Mark::O), Verdict::Win(triple));
            assert_eq!(b.evaluate(Mark::X), Verdict::Continue);
        }
    }

    #[test]
    fn top_row_wins_with_path_012() {
        let b = board("XXX      ");
        assert_eq!(b.evaluate(Mark::X), Verdict::Win([0, 1, 2]));
        assert_eq!(path_to_wire([0, 1, 2]), "012");
    }

    #[test]
    fn earlier_triple_in_scan_order_is_reported() {
        // Both the top line and the left line are complete.
        let b = board("XXXX  X  ");
        assert_eq!(b.evaluate(Mark::X), Verdict::Win([0, 1, 2]));
        // Left line and main diagonal: the vertical comes first.
        let b = board("X  XX XOX");
        assert_eq!(b.evaluate(Mark::X), Verdict::Win([0, 3, 6]));
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let b = board("XOXXOOOXX");
        assert!(b.is_full());
        assert_eq!(b.evaluate(Mark::X), Verdict::Draw);
        assert_eq!(b.evaluate(Mark::O), Verdict::Draw);
    }

    #[test]
    fn alternating_full_board_is_a_win_for_x_on_the_diagonal() {
        // "XOXOXOXOX" is full but X owns 0,4,8, so the scan reports a win.
        let b = board("XOXOXOXOX");
        assert_eq!(b.evaluate(Mark::X), Verdict::Win([0, 4, 8]));
        assert_eq!(b.evaluate(Mark::O), Verdict::Draw);
    }

    #[test]
    fn placed_cells_never_change() {
        let mut b = Board::new();
        assert!(b.place(4, Mark::X));
        assert!(!b.place(4, Mark::O));
        assert!(!b.place(9, Mark::O));
        assert_eq!(b.cell(4), Some(Mark::X));
        assert_eq!(b.to_wire(), "    X    ");
    }

    #[test]
    fn wire_form_requires_nine_valid_cells() {
        assert!(Board::from_wire("XO").is_none());
        assert!(Board::from_wire("XO?      ").is_none());
        assert!(Board::from_wire("          ").is_none());
        assert_eq!(board("         "), Board::new());
    }

    #[test]
    fn creator_moves_first_and_turns_alternate() {
        let (game, mut alice, mut bob) = paired();
        // X: 1, 2, 3 (top line); O: 4, 5.
        for cell in ["1", "2", "3"] {
            alice.send(Tag::Move, cell);
        }
        for cell in ["4", "5"] {
            bob.send(Tag::Move, cell);
        }

        let outcome = game.run();
        assert_eq!(
            outcome,
            GameOutcome::Win {
                winner: PlayerId(1),
                loser: PlayerId(2),
                path: [0, 1, 2],
            }
        );

        let expected_alice = ["Y", "N", "Y", "N", "Y"];
        let expected_bob = ["N", "Y", "N", "Y", "N"];
        for (turn, (a, b)) in expected_alice.iter().zip(expected_bob).enumerate() {
            let (_, command) = alice.expect_turn();
            assert_eq!(command, *a, "alice turn {turn}");
            if *a == "N" {
                alice.expect_integer(Tag::Integer);
            }
            let (_, command) = bob.expect_turn();
            assert_eq!(command, b, "bob turn {turn}");
            if b == "N" {
                bob.expect_integer(Tag::Integer);
            }
        }

        assert_eq!(alice.expect_turn(), ("XXXOO    ".into(), "W".into()));
        assert_eq!(alice.expect(Tag::Path), "012");
        assert_eq!(bob.expect_turn(), ("XXXOO    ".into(), "L".into()));
        assert_eq!(bob.expect(Tag::Path), "012");
    }

    #[test]
    fn occupied_cell_is_relayed_ignored_and_still_passes_the_turn() {
        let (game, mut alice, mut bob) = paired();
        // X takes 5, O tries 5 again, then X: 1, 9 for the diagonal.
        alice.send(Tag::Move, "5");
        bob.send(Tag::Move, "5");
        alice.send(Tag::Move, "1");
        bob.send(Tag::Move, "2");
        alice.send(Tag::Move, "9");

        let players = [Arc::clone(game.player(Seat::One)), Arc::clone(game.player(Seat::Two))];
        let outcome = game.run();
        assert!(matches!(outcome, GameOutcome::Win { winner: PlayerId(1), path: [0, 4, 8], .. }));

        // Turn 1: alice moves 5.
        assert_eq!(alice.expect_turn(), ("         ".into(), "Y".into()));
        assert_eq!(bob.expect_turn(), ("         ".into(), "N".into()));
        assert_eq!(bob.expect_integer(Tag::Integer), 5);

        // Turn 2: bob repeats 5; alice still sees it relayed.
        assert_eq!(alice.expect_turn(), ("    X    ".into(), "N".into()));
        assert_eq!(alice.expect_integer(Tag::Integer), 5);
        assert_eq!(bob.expect_turn(), ("    X    ".into(), "Y".into()));

        // Turn 3: board unchanged by the ignored move, and it is alice's turn.
        assert_eq!(alice.expect_turn(), ("    X    ".into(), "Y".into()));
        assert_eq!(bob.expect_turn(), ("    X    ".into(), "N".into()));

        assert_eq!(players[0].wins(), 1);
        assert_eq!(players[1].losses(), 1);
        assert!(players[0].opponent().is_none());
        assert!(players[1].is_waiting());
    }

    #[test]
    fn full_board_ends_in_draw_for_both() {
        let (game, mut alice, mut bob) = paired();
        // Final board: X O X / X O O / O X X
        for cell in ["1", "3", "4", "8", "9"] {
            alice.send(Tag::Move, cell);
        }
        for cell in ["2", "5", "6", "7"] {
            bob.send(Tag::Move, cell);
        }

        assert_eq!(game.run(), GameOutcome::Draw);

        for _ in 0..9 {
            let (_, command) = alice.expect_turn();
            if command == "N" {
                alice.expect_integer(Tag::Integer);
            }
        }
        assert_eq!(alice.expect_turn(), ("XOXXOOOXX".into(), "D".into()));
    }

    #[test]
    fn mover_disconnect_aborts_and_notifies_survivor() {
        let (game, alice, mut bob) = paired();
        let bob_session = Arc::clone(game.player(Seat::Two));
        drop(alice);

        let outcome = game.run();
        match outcome {
            GameOutcome::Aborted { lost, .. } => assert_eq!(lost, PlayerId(1)),
            other => panic!("expected Aborted, got {other:?}"),
        }

        // Bob may or may not have seen the first board before the abort,
        // but the last thing he gets is the quit notice.
        let reason = loop {
            match bob.next_frame() {
                Ok(_) => continue,
                Err(reason) => break reason,
            }
        };
        assert_eq!(reason, OPPONENT_LOST_MESSAGE);
        assert!(bob_session.lost_cause().is_none());
        assert!(bob_session.is_waiting());
    }

    #[test]
    fn out_of_range_move_is_a_protocol_violation() {
        let (game, mut alice, _bob) = paired();
        alice.send(Tag::Move, "10");
        match game.run() {
            GameOutcome::Aborted { lost, cause } => {
                assert_eq!(lost, PlayerId(1));
                assert!(matches!(cause, ConnectionLost::ProtocolViolation(_)));
            }
            other => panic!("expected Aborted, got {other:?}"),
        }
    }
}
