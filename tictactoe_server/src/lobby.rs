// Lobby registry: the process-wide shared state.
//
// One `Mutex<LobbyState>` guards the roster, the listing sequence, the chat
// log, and both id counters. Every operation takes the lock once, so
// create/join/chat are linearizable against each other and snapshots never
// see a torn listing.
//
// Listing lifecycle:
//   Open      created by `create_listing`, visible in `snapshot`
//   Matched   claimed by `join_listing`; hidden from the snapshot
//   Finished  the claim was released after pairing started
// The creator's handler thread parks in `wait_for_match` on the
// `listing_closed` condvar until its listing reaches Finished (the game is
// over), or the optional wait timeout expires while it is still Open.
// `ClaimedListing` releases the listing on drop: back to Open if pairing
// never began, otherwise Finished. Either way waiters are woken.
//
// The roster holds `Weak<Session>` so a handler thread that exits without
// deregistering never keeps a dead session alive.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use log::{debug, info};

use tictactoe_protocol::{
    ListingId, ListingRecord, PlayerId, WAITING_FOR_PLAYER, encode_listing_block,
};

use crate::config::ServerConfig;
use crate::error::{ConnectionLost, JoinError, RegisterError};
use crate::lock;
use crate::session::{Link, Session, validate_name};

/// Reply to a chat read when nobody has said anything yet.
pub const EMPTY_CHAT: &str = " ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingStatus {
    Open,
    Matched,
    Finished,
}

/// A lobby slot, from creation until its game is over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameListing {
    pub id: ListingId,
    pub player_one: String,
    pub player_one_id: PlayerId,
    /// Filled in by a successful join.
    pub player_two: Option<(String, PlayerId)>,
    pub status: ListingStatus,
}

impl GameListing {
    /// The row shown to browsing clients.
    pub fn record(&self) -> ListingRecord {
        let (player_two, player_two_id) = match &self.player_two {
            Some((name, id)) => (name.clone(), Some(*id)),
            None => (WAITING_FOR_PLAYER.to_string(), None),
        };
        ListingRecord {
            id: self.id,
            player_one: self.player_one.clone(),
            player_one_id: self.player_one_id,
            player_two,
            player_two_id,
        }
    }
}

#[derive(Default)]
struct LobbyState {
    roster: BTreeMap<PlayerId, Weak<Session>>,
    listings: Vec<GameListing>,
    chat: Vec<String>,
    last_player_id: u32,
    last_listing_id: u32,
}

impl LobbyState {
    fn position(&self, id: ListingId) -> Option<usize> {
        self.listings.iter().position(|l| l.id == id)
    }

    fn live_sessions(&self) -> impl Iterator<Item = Arc<Session>> + '_ {
        self.roster.values().filter_map(Weak::upgrade)
    }
}

pub struct Lobby {
    state: Mutex<LobbyState>,
    listing_closed: Condvar,
    listing_block_max: usize,
    wait_timeout: Option<Duration>,
}

impl Lobby {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: Mutex::new(LobbyState::default()),
            listing_closed: Condvar::new(),
            listing_block_max: config.listing_block_max,
            wait_timeout: config.listing_wait_timeout(),
        }
    }

    /// Register a client under the next player id and add it to the roster.
    pub fn register(&self, name: &str, link: Link) -> Result<Arc<Session>, RegisterError> {
        let name = validate_name(name)?;
        let mut state = lock(&self.state);
        let id = PlayerId(state.last_player_id + 1);
        let session = Arc::new(Session::register(id, &name, link)?);
        state.last_player_id = id.0;
        state.roster.insert(id, Arc::downgrade(&session));
        Ok(session)
    }

    /// Drop a player from the roster and discard any listing of theirs that
    /// nobody has joined yet.
    pub fn deregister(&self, id: PlayerId) {
        let mut state = lock(&self.state);
        state.roster.remove(&id);
        let before = state.listings.len();
        state
            .listings
            .retain(|l| !(l.player_one_id == id && l.status == ListingStatus::Open));
        let discarded = before - state.listings.len();
        drop(state);
        if discarded > 0 {
            info!("discarded {discarded} open listing(s) of departed player {id}");
            self.listing_closed.notify_all();
        }
        info!("player {id} left the lobby");
    }

    pub fn session(&self, id: PlayerId) -> Option<Arc<Session>> {
        lock(&self.state).roster.get(&id).and_then(Weak::upgrade)
    }

    pub fn roster_len(&self) -> usize {
        lock(&self.state).live_sessions().count()
    }

    /// Every listing still open for joining, in creation order.
    pub fn snapshot(&self) -> Vec<ListingRecord> {
        lock(&self.state)
            .listings
            .iter()
            .filter(|l| l.status == ListingStatus::Open)
            .map(GameListing::record)
            .collect()
    }

    /// The snapshot as the block sent to browsing clients.
    pub fn snapshot_block(&self) -> String {
        encode_listing_block(&self.snapshot(), self.listing_block_max)
    }

    /// Look up a listing in any state.
    pub fn listing(&self, id: ListingId) -> Option<GameListing> {
        let state = lock(&self.state);
        state.position(id).map(|i| state.listings[i].clone())
    }

    /// Open a listing with `creator` in the first slot.
    pub fn create_listing(&self, creator: &Session) -> GameListing {
        let mut state = lock(&self.state);
        state.last_listing_id += 1;
        let listing = GameListing {
            id: ListingId(state.last_listing_id),
            player_one: creator.name().to_string(),
            player_one_id: creator.id(),
            player_two: None,
            status: ListingStatus::Open,
        };
        state.listings.push(listing.clone());
        creator.set_waiting(false);
        info!(
            "player {} opened listing {}; waiting for an opponent",
            creator.id(),
            listing.id
        );
        listing
    }

    /// Park the creator's thread until its listing's game is over.
    ///
    /// Returns the creator's own lost cause if its connection failed during
    /// the game, or `WaitExpired` if the configured timeout ran out before
    /// anyone joined (the listing is discarded in that case).
    pub fn wait_for_match(
        &self,
        listing: ListingId,
        creator: &Session,
    ) -> Result<(), ConnectionLost> {
        let deadline = self.wait_timeout.map(|t| (t, Instant::now() + t));
        let mut state = lock(&self.state);
        let result = loop {
            let Some(index) = state.position(listing) else {
                break Ok(());
            };
            let status = state.listings[index].status;
            match status {
                ListingStatus::Finished => {
                    state.listings.remove(index);
                    break Ok(());
                }
                ListingStatus::Open => match deadline {
                    Some((timeout, at)) => {
                        let now = Instant::now();
                        if now >= at {
                            state.listings.remove(index);
                            info!("listing {listing} expired with no opponent");
                            break Err(ConnectionLost::WaitExpired(timeout));
                        }
                        state = self.wait_on(state, Some(at - now));
                    }
                    None => state = self.wait_on(state, None),
                },
                ListingStatus::Matched => state = self.wait_on(state, None),
            }
        };
        drop(state);
        creator.set_waiting(true);
        match creator.lost_cause() {
            Some(cause) => Err(cause),
            None => result,
        }
    }

    /// Claim an open listing for `joiner`.
    ///
    /// Fails without touching the lobby if the listing does not exist, its
    /// creator is gone, or someone else already claimed it.
    pub fn join_listing(
        &self,
        id: ListingId,
        joiner: &Arc<Session>,
    ) -> Result<ClaimedListing<'_>, JoinError> {
        let mut state = lock(&self.state);
        let index = state.position(id).ok_or(JoinError::GameNotFound)?;
        let listing = &state.listings[index];
        match listing.status {
            ListingStatus::Open => {}
            ListingStatus::Matched => return Err(JoinError::GameFull),
            ListingStatus::Finished => return Err(JoinError::GameNotFound),
        }
        let creator = state
            .roster
            .get(&listing.player_one_id)
            .and_then(Weak::upgrade)
            .filter(|c| c.id() != joiner.id() && c.lost_cause().is_none())
            .ok_or(JoinError::GameNotFound)?;

        let listing = &mut state.listings[index];
        listing.status = ListingStatus::Matched;
        listing.player_two = Some((joiner.name().to_string(), joiner.id()));
        info!("player {} claimed listing {id}", joiner.id());
        Ok(ClaimedListing {
            lobby: self,
            listing: id,
            creator,
            pairing_started: false,
        })
    }

    /// Append `"name: text"` to the chat log.
    pub fn append_chat(&self, sender: &str, text: &str) {
        debug!("chat from {sender}: {text}");
        lock(&self.state).chat.push(format!("{sender}: {text}\n"));
    }

    /// The whole chat log as one block.
    pub fn read_chat(&self) -> String {
        let state = lock(&self.state);
        if state.chat.is_empty() {
            EMPTY_CHAT.to_string()
        } else {
            state.chat.concat()
        }
    }

    /// One line per registered player, in registration order.
    pub fn compute_stats(&self) -> String {
        lock(&self.state)
            .live_sessions()
            .map(|s| {
                format!(
                    "{} has won {} games and lost {} games\n",
                    s.name(),
                    s.wins(),
                    s.losses()
                )
            })
            .collect()
    }

    fn wait_on<'a>(
        &self,
        guard: MutexGuard<'a, LobbyState>,
        timeout: Option<Duration>,
    ) -> MutexGuard<'a, LobbyState> {
        match timeout {
            Some(timeout) => {
                self.listing_closed
                    .wait_timeout(guard, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .listing_closed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn release_listing(&self, id: ListingId, reopen: bool) {
        let mut state = lock(&self.state);
        if let Some(index) = state.position(id) {
            let listing = &mut state.listings[index];
            if reopen {
                listing.status = ListingStatus::Open;
                listing.player_two = None;
                info!("listing {id} reopened");
            } else {
                listing.status = ListingStatus::Finished;
                debug!("listing {id} finished");
            }
        }
        drop(state);
        self.listing_closed.notify_all();
    }
}

/// A listing claimed by a joiner. Hold it for the whole pairing and game;
/// dropping it wakes the creator.
pub struct ClaimedListing<'a> {
    lobby: &'a Lobby,
    listing: ListingId,
    creator: Arc<Session>,
    pairing_started: bool,
}

impl ClaimedListing<'_> {
    pub fn id(&self) -> ListingId {
        self.listing
    }

    pub fn creator(&self) -> &Arc<Session> {
        &self.creator
    }

    /// Past this point the listing is closed on release instead of reopened.
    pub fn begin_pairing(&mut self) {
        self.pairing_started = true;
    }
}

impl Drop for ClaimedListing<'_> {
    fn drop(&mut self) {
        self.lobby
            .release_listing(self.listing, !self.pairing_started);
    }
}
