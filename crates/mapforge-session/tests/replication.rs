//! Replication-protocol tests: host and joiner sessions wired directly
//! through their directives, no sockets involved.
//!
//! The harness plays the engine's role: it resolves each directive's
//! `Recipient` against a set of simulated connections and feeds the
//! encoded packet to the session on the other end, until every queue is
//! quiescent. TCP's per-link FIFO ordering is modeled by the delivery
//! queue itself.

use std::collections::BTreeMap;

use mapforge_deck::DeckDefinition;
use mapforge_protocol::{
    LineSegment, Message, PlayerId, Point, Recipient, Rect, RejectReason,
    StateId, MIME_PNG, PROTOCOL_VERSION,
};
use mapforge_session::{
    Directive, Role, Session, SessionConfig, SessionEvent, PNG_SIGNATURE,
};
use mapforge_transport::ConnectionId;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Joiner {
    session: Session,
    /// This joiner's connection as the host sees it.
    conn_at_host: ConnectionId,
    /// The host link as this joiner sees it.
    host_link: ConnectionId,
    connected: bool,
    // Keeps the per-session asset root alive.
    _data_root: tempfile::TempDir,
}

struct TestNet {
    host: Session,
    joiners: Vec<Joiner>,
    _host_root: tempfile::TempDir,
}

enum Hop {
    ToHost { origin: ConnectionId, bytes: Vec<u8> },
    ToJoiner { index: usize, bytes: Vec<u8> },
    HostCloses { conn: ConnectionId },
}

fn config(name: &str, password: &str, root: &tempfile::TempDir) -> SessionConfig {
    SessionConfig {
        display_name: name.to_string(),
        character_name: format!("Sir {name}"),
        password: password.to_string(),
        data_root: root.path().to_path_buf(),
    }
}

impl TestNet {
    /// A hosting session with `joiners` players fully joined.
    fn new(password: &str, joiners: usize) -> Self {
        let host_root = tempfile::tempdir().unwrap();
        let mut host = Session::new(config("Host", password, &host_root));
        host.begin_hosting();
        let mut net = Self { host, joiners: Vec::new(), _host_root: host_root };
        for i in 0..joiners {
            net.join_player(&format!("Player{}", i + 1), password);
        }
        net
    }

    /// Connects one more joiner through the real handshake.
    fn join_player(&mut self, name: &str, password: &str) -> usize {
        let index = self.joiners.len();
        let root = tempfile::tempdir().unwrap();
        let mut session = Session::new(config(name, password, &root));
        let conn_at_host = ConnectionId::new(100 + index as u64);
        let host_link = ConnectionId::new(9000 + index as u64);
        let join = session.begin_join(host_link);
        self.joiners.push(Joiner {
            session,
            conn_at_host,
            host_link,
            connected: true,
            _data_root: root,
        });
        let hops = self.route_joiner(index, join);
        self.run(hops);
        index
    }

    fn route_host(&self, directives: Vec<Directive>) -> Vec<Hop> {
        let mut hops = Vec::new();
        for directive in directives {
            match directive {
                Directive::Send(recipient, message) => {
                    let bytes = message.encode();
                    for (index, joiner) in self.joiners.iter().enumerate() {
                        if !joiner.connected {
                            continue;
                        }
                        let included = match recipient {
                            Recipient::All => true,
                            Recipient::AllExcept(conn) => {
                                joiner.conn_at_host != conn
                            }
                            Recipient::Peer(conn) => joiner.conn_at_host == conn,
                        };
                        if included {
                            hops.push(Hop::ToJoiner { index, bytes: bytes.clone() });
                        }
                    }
                }
                Directive::Close(conn) => hops.push(Hop::HostCloses { conn }),
            }
        }
        hops
    }

    fn route_joiner(&self, index: usize, directives: Vec<Directive>) -> Vec<Hop> {
        let origin = self.joiners[index].conn_at_host;
        let host_link = self.joiners[index].host_link;
        directives
            .into_iter()
            .filter_map(|directive| match directive {
                Directive::Send(Recipient::Peer(conn), message)
                    if conn == host_link =>
                {
                    Some(Hop::ToHost { origin, bytes: message.encode() })
                }
                other => panic!("joiner produced unexpected directive {other:?}"),
            })
            .collect()
    }

    /// Delivers hops until the network is quiescent.
    fn run(&mut self, initial: Vec<Hop>) {
        let mut queue = std::collections::VecDeque::from(initial);
        while let Some(hop) = queue.pop_front() {
            match hop {
                Hop::ToHost { origin, bytes } => {
                    let out = self.host.handle_packet(origin, &bytes);
                    queue.extend(self.route_host(out));
                }
                Hop::ToJoiner { index, bytes } => {
                    if !self.joiners[index].connected {
                        continue;
                    }
                    let host_link = self.joiners[index].host_link;
                    let out = self.joiners[index]
                        .session
                        .handle_packet(host_link, &bytes);
                    queue.extend(self.route_joiner(index, out));
                }
                Hop::HostCloses { conn } => {
                    if let Some(joiner) = self
                        .joiners
                        .iter_mut()
                        .find(|j| j.conn_at_host == conn)
                    {
                        joiner.connected = false;
                        let host_link = joiner.host_link;
                        joiner.session.handle_connection_dropped(host_link);
                    }
                }
            }
        }
    }

    /// Runs a local operation on the host and propagates it.
    fn host_op(&mut self, f: impl FnOnce(&mut Session) -> Vec<Directive>) {
        let directives = f(&mut self.host);
        let hops = self.route_host(directives);
        self.run(hops);
    }

    /// Runs a local operation on a joiner and propagates it.
    fn joiner_op(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Session) -> Vec<Directive>,
    ) {
        let directives = f(&mut self.joiners[index].session);
        let hops = self.route_joiner(index, directives);
        self.run(hops);
    }

    /// Simulates a joiner's connection dying.
    fn drop_joiner(&mut self, index: usize) {
        self.joiners[index].connected = false;
        let conn = self.joiners[index].conn_at_host;
        let directives = self.host.handle_connection_dropped(conn);
        let hops = self.route_host(directives);
        self.run(hops);
    }
}

fn line(y: i32) -> LineSegment {
    LineSegment::new(Point::new(0, y), Point::new(100, y), 0xFF000000)
}

fn tarot(cards: usize) -> DeckDefinition {
    let body: String = (0..cards)
        .map(|i| format!(r#"<card name="Card{i}" art="cards/c{i}.png"/>"#))
        .collect();
    DeckDefinition::parse(&format!("<deck>{body}</deck>")).unwrap()
}

// ---------------------------------------------------------------------------
// Join handshake
// ---------------------------------------------------------------------------

#[test]
fn test_join_handshake_assigns_ids_and_replays_state() {
    let mut net = TestNet::new("mellon", 0);

    // State accumulated before anyone joins.
    net.host_op(|s| s.draw_lines(vec![line(0), line(10)]));
    net.host_op(|s| {
        let pog = s.create_pog("pogs/goblin.png", 1, Point::new(64, 64));
        s.add_pog(pog, true)
    });
    net.host_op(|s| s.set_grid_mode(mapforge_protocol::GridMode::Hex));
    net.host_op(|s| s.create_deck("Tarot", &tarot(3)).unwrap());

    let idx = net.join_player("Aran", "mellon");
    let joiner = &mut net.joiners[idx];

    assert_eq!(joiner.session.local_player_id(), PlayerId(1));
    assert!(matches!(
        joiner.session.role(),
        Role::Joined { login_complete: true, .. }
    ));
    assert_eq!(joiner.session.map().lines(), net.host.map().lines());
    assert_eq!(joiner.session.map().pog_count(), 1);
    assert_eq!(joiner.session.map().grid(), net.host.map().grid());
    assert_eq!(joiner.session.deck_names(), net.host.deck_names());

    // Everything before LoginComplete was bulk state: no change events.
    let events = joiner.session.take_events();
    assert!(events.contains(&SessionEvent::LoginComplete));
    assert!(
        !events.iter().any(|e| matches!(e, SessionEvent::MapChanged)),
        "bulk replay must not fire change notifications, got {events:?}"
    );
}

#[test]
fn test_rejected_join_mutates_nothing() {
    // Property 6: a wrong password or version leaves the host's roster
    // and replicated state completely unchanged.
    let mut net = TestNet::new("mellon", 1);
    net.host_op(|s| s.draw_lines(vec![line(0)]));
    let lines_before = net.host.map().lines().to_vec();
    let roster_before = net.host.roster().len();

    // Wrong password.
    let idx = net.join_player("Sneak", "wrong");
    assert!(matches!(net.joiners[idx].session.role(), Role::Disconnected));
    let events = net.joiners[idx].session.take_events();
    assert!(events.contains(&SessionEvent::JoinRejected {
        reason: RejectReason::BadPassword
    }));

    // Wrong protocol version, hand-crafted.
    let bad_version = Message::Join {
        protocol_version: PROTOCOL_VERSION + 1,
        password: "mellon".into(),
        display_name: "Relic".into(),
        character_name: "Relic".into(),
        host_flag: false,
    };
    let origin = ConnectionId::new(777);
    let out = net.host.handle_packet(origin, &bad_version.encode());
    assert!(out.contains(&Directive::Send(
        Recipient::Peer(origin),
        Message::Reject { reason: RejectReason::VersionMismatch }
    )));
    assert!(out.contains(&Directive::Close(origin)));

    assert_eq!(net.host.roster().len(), roster_before);
    assert_eq!(net.host.map().lines(), lines_before.as_slice());
}

// ---------------------------------------------------------------------------
// Ordering and provisional reconciliation
// ---------------------------------------------------------------------------

#[test]
fn test_state_ids_are_strictly_increasing_in_host_order() {
    // Property 1: state ids observed by any joiner strictly increase and
    // match the host's issuance order.
    let mut net = TestNet::new("", 2);

    net.joiner_op(0, |s| s.draw_lines(vec![line(0)]));
    net.host_op(|s| s.draw_lines(vec![line(10)]));
    net.joiner_op(1, |s| s.draw_lines(vec![line(20)]));
    net.joiner_op(0, |s| s.erase(Rect::new(0, -5, 10, 10), false, 0));

    let host_ids = net.host.draw_history().stamped_ids();
    assert_eq!(
        host_ids,
        vec![StateId(1), StateId(2), StateId(3), StateId(4)],
        "host mints a strictly increasing sequence"
    );
    for joiner in &net.joiners {
        assert_eq!(
            joiner.session.draw_history().stamped_ids(),
            host_ids,
            "every joiner observes the host's issuance order"
        );
        assert_eq!(joiner.session.map().lines(), net.host.map().lines());
    }
}

#[test]
fn test_joiner_optimistic_draw_is_not_duplicated_by_echo() {
    let mut net = TestNet::new("", 1);

    net.joiner_op(0, |s| s.draw_lines(vec![line(0)]));

    let joiner = &net.joiners[0].session;
    assert_eq!(joiner.map().lines().len(), 1, "echo replaced the provisional");
    assert_eq!(joiner.draw_history().pending_count(), 0);
    assert_eq!(joiner.map().lines(), net.host.map().lines());
}

#[test]
fn test_undo_by_state_id_propagates_to_all_nodes() {
    let mut net = TestNet::new("", 2);
    net.host_op(|s| s.draw_lines(vec![line(0)]));
    let id = net.host.draw_history().stamped_ids()[0];

    net.joiner_op(0, |s| s.undo(id));
    assert!(net.host.map().lines().is_empty());
    for joiner in &net.joiners {
        assert!(joiner.session.map().lines().is_empty());
    }

    net.joiner_op(1, |s| s.redo(id));
    assert_eq!(net.host.map().lines().len(), 1);
    for joiner in &net.joiners {
        assert_eq!(joiner.session.map().lines().len(), 1);
    }
}

// ---------------------------------------------------------------------------
// Pog replication
// ---------------------------------------------------------------------------

#[test]
fn test_pog_mutations_converge_across_nodes() {
    let mut net = TestNet::new("", 2);

    net.host_op(|s| {
        let pog = s.create_pog("pogs/goblin.png", 1, Point::new(0, 0));
        s.add_pog(pog, true)
    });
    let id = net.host.map().pogs_in_draw_order()[0].id;

    net.joiner_op(0, |s| s.move_pog(id, Point::new(128, 64)));
    net.joiner_op(1, |s| s.rotate_pog(id, 90.0));
    net.host_op(|s| s.lock_pog(id, true));
    // A locked pog refuses the move everywhere.
    net.joiner_op(0, |s| s.move_pog(id, Point::new(999, 999)));

    for session in std::iter::once(&net.host)
        .chain(net.joiners.iter().map(|j| &j.session))
    {
        let pog = session.map().pog(id).expect("pog replicated");
        assert_eq!(pog.position, Point::new(128, 64));
        assert_eq!(pog.angle, 90.0);
        assert!(pog.locked);
    }
}

#[test]
fn test_departed_player_cards_are_cleaned_up() {
    let mut net = TestNet::new("", 2);
    net.host_op(|s| s.create_deck("Tarot", &tarot(3)).unwrap());
    net.joiner_op(0, |s| s.draw_cards("Tarot", 2));
    assert_eq!(net.joiners[0].session.held_cards().len(), 2);

    net.drop_joiner(0);

    assert_eq!(net.host.roster().len(), 2, "host and one remaining joiner");
    // The departed hand went back to the discard pile.
    net.host_op(|s| {
        s.shuffle_deck("Tarot", mapforge_deck::ShuffleScope::Discards).unwrap()
    });
    net.host_op(|s| s.draw_cards("Tarot", 3));
    assert_eq!(net.host.held_cards().len(), 3);

    // The survivor heard about the departure.
    let events = net.joiners[1].session.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Chat { body } if body.contains("left the session")
    )));
}

// ---------------------------------------------------------------------------
// Deck subsystem end to end
// ---------------------------------------------------------------------------

#[test]
fn test_draw_beyond_supply_yields_remainder_and_notice() {
    // Property 7: joiner requests draw(Tarot, 3) with only 2 remaining;
    // they receive exactly 2 cards and an out-of-cards notice is
    // broadcast.
    let mut net = TestNet::new("", 2);
    net.host_op(|s| s.create_deck("Tarot", &tarot(2)).unwrap());
    for joiner in &mut net.joiners {
        joiner.session.take_events();
    }

    net.joiner_op(0, |s| s.draw_cards("Tarot", 3));

    assert_eq!(net.joiners[0].session.held_cards().len(), 2);
    assert_eq!(
        net.joiners[0].session.private_map().pog_count(),
        2,
        "cards with art materialize on the private layer"
    );

    let notice = |events: &[SessionEvent]| {
        events.iter().any(|e| matches!(
            e,
            SessionEvent::Chat { body } if body.contains("out of cards")
        ))
    };
    let events0 = net.joiners[0].session.take_events();
    let events1 = net.joiners[1].session.take_events();
    let host_events = net.host.take_events();
    assert!(notice(&events0), "requester sees the notice");
    assert!(notice(&events1), "bystander sees the broadcast notice");
    assert!(notice(&host_events), "host sees its own notice");
}

#[test]
fn test_deck_destruction_recalls_cards_everywhere() {
    let mut net = TestNet::new("", 1);
    net.host_op(|s| s.create_deck("Tarot", &tarot(3)).unwrap());
    net.joiner_op(0, |s| s.draw_cards("Tarot", 2));
    assert_eq!(net.joiners[0].session.held_cards().len(), 2);
    assert_eq!(net.joiners[0].session.private_map().pog_count(), 2);

    net.host_op(|s| s.destroy_deck("Tarot").unwrap());

    let joiner = &net.joiners[0].session;
    assert!(joiner.held_cards().is_empty(), "held cards recalled");
    assert_eq!(joiner.private_map().pog_count(), 0, "card pogs removed");
    assert!(joiner.deck_names().is_empty(), "name list updated");
}

#[test]
fn test_draw_racing_deck_destruction_is_silent() {
    let mut net = TestNet::new("", 1);
    net.host_op(|s| s.create_deck("Tarot", &tarot(3)).unwrap());

    // The request references the deck, but by the time it reaches the
    // host the deck is gone. Hand-deliver to stage the race.
    let request = Message::DeckDraw { deck_name: "Tarot".into(), count: 1 };
    net.host.destroy_deck("Tarot").unwrap();
    let conn = net.joiners[0].conn_at_host;
    let out = net.host.handle_packet(conn, &request.encode());

    assert!(out.is_empty(), "orphaned draw resolves as a silent no-op");
}

// ---------------------------------------------------------------------------
// Asset transfer
// ---------------------------------------------------------------------------

fn png() -> Vec<u8> {
    let mut data = PNG_SIGNATURE.to_vec();
    data.extend_from_slice(b"imagedata");
    data
}

#[test]
fn test_missing_asset_requested_exactly_once() {
    // Property 2: N references to the same missing filename produce one
    // request packet on the wire.
    let mut net = TestNet::new("", 1);

    // Hand-built pogs sharing a filename the joiner does not have.
    let add = |n: u32| {
        Message::AddPog {
            public: true,
            pog: mapforge_protocol::Pog {
                id: mapforge_protocol::PogId::compose(PlayerId(0), 50 + n),
                sort_order: u64::from(n),
                position: Point::new(0, 0),
                filename: "pogs/shared.png".to_string(),
                face_size: 1,
                angle: 0.0,
                scale: 1.0,
                flip_horizontal: false,
                flip_vertical: false,
                locked: false,
                tinted: false,
                name: String::new(),
                attributes: BTreeMap::new(),
                card: None,
            },
        }
    };

    let joiner = &mut net.joiners[0];
    let first = joiner.session.handle_packet(joiner.host_link, &add(0).encode());
    let second = joiner.session.handle_packet(joiner.host_link, &add(1).encode());

    let requests = |out: &[Directive]| {
        out.iter()
            .filter(|d| {
                matches!(d, Directive::Send(_, Message::PngRequest { .. }))
            })
            .count()
    };
    assert_eq!(requests(&first), 1, "first reference requests the file");
    assert_eq!(requests(&second), 0, "second reference is coalesced");
}

#[test]
fn test_pending_requesters_fan_out_on_one_delivery() {
    // Property 3: three peers request a file the host lacks; one upload
    // serves all three.
    let mut net = TestNet::new("", 3);
    let conns: Vec<ConnectionId> =
        net.joiners.iter().map(|j| j.conn_at_host).collect();

    let request = Message::PngRequest { filename: "pogs/shared.png".into() };
    for conn in &conns[..2] {
        let out = net.host.handle_packet(*conn, &request.encode());
        assert!(out.is_empty(), "host lacks the file; request parked");
    }
    let out = net.host.handle_packet(conns[2], &request.encode());
    assert!(out.is_empty());

    // The third joiner uploads the file.
    let upload = Message::File {
        mime: MIME_PNG.into(),
        filename: "pogs/shared.png".into(),
        data: png(),
    };
    let out = net.host.handle_packet(conns[2], &upload.encode());

    let served: Vec<ConnectionId> = out
        .iter()
        .filter_map(|d| match d {
            Directive::Send(Recipient::Peer(conn), Message::File { .. }) => {
                Some(*conn)
            }
            _ => None,
        })
        .collect();
    assert_eq!(served, conns, "every pending requester served in one pass");
}

#[test]
fn test_invalid_asset_payload_is_rejected() {
    let mut net = TestNet::new("", 1);
    let conn = net.joiners[0].conn_at_host;

    let upload = Message::File {
        mime: MIME_PNG.into(),
        filename: "pogs/evil.png".into(),
        data: b"not a png at all".to_vec(),
    };
    let out = net.host.handle_packet(conn, &upload.encode());
    assert!(out.is_empty(), "rejected transfer produces nothing");
}

// ---------------------------------------------------------------------------
// Save / load / map push
// ---------------------------------------------------------------------------

#[test]
fn test_saved_map_replays_identically_and_pushes_to_joiners() {
    // Property 5 at the session level, plus the mid-session map push.
    let mut net = TestNet::new("", 1);
    net.host_op(|s| s.draw_lines(vec![line(0), line(10)]));
    net.host_op(|s| s.erase(Rect::new(20, -5, 10, 30), false, 0));
    net.host_op(|s| {
        let pog = s.create_pog("pogs/goblin.png", 2, Point::new(32, 32));
        s.add_pog(pog, true)
    });
    net.host_op(|s| s.set_grid_mode(mapforge_protocol::GridMode::Square));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.mfm");
    net.host.save_map(&path).unwrap();

    let lines_before = net.host.map().lines().to_vec();

    // Wipe the host's surface, then load the save back and push it.
    net.host_op(|s| {
        let ids = vec![s.map().pogs_in_draw_order()[0].id];
        s.remove_pogs(ids)
    });
    net.host_op(|s| s.load_map(&path).unwrap());

    assert_eq!(net.host.map().lines(), lines_before.as_slice());
    assert_eq!(net.host.map().pog_count(), 1);

    // The joiner received the pushed blob and replayed it to the same
    // state through the same decoder.
    let joiner = &net.joiners[0].session;
    assert_eq!(joiner.map().lines(), lines_before.as_slice());
    assert_eq!(joiner.map().pog_count(), 1);
    assert_eq!(joiner.map().grid(), mapforge_protocol::GridMode::Square);
}
