//! End-to-end rule scenarios driven through the public surface only.

use std::sync::{Arc, Mutex};

use hanabi_core::bot::Bot;
use hanabi_core::config::Rules;
use hanabi_core::game::{Result, Server};
use hanabi_core::model::{Card, CardIndices, Color, Move, Value};

fn card(color: Color, value: Value) -> Card {
    Card::new(color, value)
}

#[derive(Default)]
struct EventLog {
    color_hints: Vec<(usize, usize, Color, Vec<usize>)>,
    active_cards: Vec<Card>,
    partner_first_hand: Option<Vec<Card>>,
}

/// Observes everything into a shared log; only moves when explicitly asked.
#[derive(Clone)]
struct Recorder {
    me: usize,
    log: Arc<Mutex<EventLog>>,
}

impl Recorder {
    fn new(me: usize, log: Arc<Mutex<EventLog>>) -> Self {
        Self { me, log }
    }
}

impl Bot for Recorder {
    fn observe_before_move(&mut self, server: &Server) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.partner_first_hand.is_none() && self.me == 0 {
            let partner = (self.me + 1) % server.num_players();
            log.partner_first_hand = Some(server.hand_of_player(partner)?.to_vec());
        }
        Ok(())
    }

    fn make_move(&mut self, server: &mut Server) -> Result<()> {
        server.please_play(0)
    }

    fn observe_before_discard(&mut self, server: &Server, _: usize, _: usize) -> Result<()> {
        self.log.lock().unwrap().active_cards.push(server.active_card()?);
        Ok(())
    }

    fn observe_before_play(&mut self, server: &Server, _: usize, _: usize) -> Result<()> {
        self.log.lock().unwrap().active_cards.push(server.active_card()?);
        Ok(())
    }

    fn observe_color_hint(
        &mut self,
        server: &Server,
        from: usize,
        to: usize,
        color: Color,
        card_indices: CardIndices,
    ) -> Result<()> {
        assert!(server.active_card().is_err(), "no active card during hints");
        self.log
            .lock()
            .unwrap()
            .color_hints
            .push((from, to, color, card_indices.iter().collect()));
        Ok(())
    }

    fn observe_value_hint(
        &mut self,
        _: &Server,
        _: usize,
        _: usize,
        _: Value,
        _: CardIndices,
    ) -> Result<()> {
        Ok(())
    }

    fn observe_after_move(&mut self, server: &Server) -> Result<()> {
        assert!(server.active_card().is_err(), "active card window closed");
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Bot> {
        Box::new(self.clone())
    }

    fn set_permissive(&mut self, _permissive: bool) {}
}

fn recorder_pair(log: &Arc<Mutex<EventLog>>) -> Vec<Box<dyn Bot>> {
    vec![
        Box::new(Recorder::new(0, log.clone())),
        Box::new(Recorder::new(1, log.clone())),
    ]
}

/// A two-player table with injected hands and a filler deck.
fn rigged_server(hand0: Vec<Card>, hand1: Vec<Card>, deck: Vec<Card>) -> Server {
    let mut server = Server::new(2, Rules::default());
    server.set_hand(0, hand0);
    server.set_hand(1, hand1);
    server.set_deck(deck);
    server
}

fn filler_deck(len: usize) -> Vec<Card> {
    vec![card(Color::Green, Value::One); len]
}

#[test]
fn color_hint_reports_exactly_the_matching_slots() {
    let hand1 = vec![
        card(Color::Red, Value::One),
        card(Color::Orange, Value::One),
        card(Color::Red, Value::Three),
        card(Color::Blue, Value::Two),
        card(Color::Red, Value::Five),
    ];
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut server = rigged_server(filler_deck(5), hand1, filler_deck(10));
    let mut bots = recorder_pair(&log);

    server
        .execute_move(
            Move::HintColor {
                color: Color::Red,
                to: 1,
            },
            &mut bots,
        )
        .expect("hint executes");

    assert_eq!(server.hint_stones_remaining(), 7);
    let log = log.lock().unwrap();
    assert_eq!(log.color_hints.len(), 2, "both observers were notified");
    for (from, to, color, slots) in &log.color_hints {
        assert_eq!((*from, *to), (0, 1));
        assert_eq!(*color, Color::Red);
        assert_eq!(slots, &vec![0, 2, 4]);
    }
}

#[test]
fn completing_a_pile_regains_a_hint_stone() {
    let hand0 = vec![
        card(Color::Red, Value::One),
        card(Color::Red, Value::Two),
        card(Color::Red, Value::Three),
        card(Color::Red, Value::Four),
        card(Color::Red, Value::Five),
    ];
    let hand1 = vec![card(Color::Blue, Value::One); 5];
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut server = rigged_server(hand0, hand1, filler_deck(20));
    let mut bots = recorder_pair(&log);

    for _ in 0..4 {
        server
            .execute_move(Move::Play(0), &mut bots)
            .expect("ascending red plays succeed");
    }
    assert_eq!(server.pile_of(Color::Red).size(), 4);

    // burn all eight hint stones
    for _ in 0..8 {
        server
            .execute_move(
                Move::HintColor {
                    color: Color::Blue,
                    to: 1,
                },
                &mut bots,
            )
            .expect("hint stones available");
    }
    assert_eq!(server.hint_stones_remaining(), 0);

    server
        .execute_move(Move::Play(0), &mut bots)
        .expect("the red five plays");
    assert_eq!(server.pile_of(Color::Red).size(), 5);
    assert_eq!(server.hint_stones_remaining(), 1);
    assert_eq!(server.mulligans_remaining(), 3);
}

#[test]
fn failed_play_discards_the_card_and_costs_a_mulligan() {
    let hand0 = vec![card(Color::Red, Value::Two); 5];
    let hand1 = vec![card(Color::Blue, Value::One); 5];
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut server = rigged_server(hand0, hand1, filler_deck(10));
    let mut bots = recorder_pair(&log);

    server
        .execute_move(Move::Play(0), &mut bots)
        .expect("the move itself is legal");

    assert_eq!(server.pile_of(Color::Red).size(), 0);
    assert_eq!(server.mulligans_remaining(), 2);
    assert_eq!(server.discards(), &[card(Color::Red, Value::Two)]);
    // replacement drawn; hand back to five cards
    assert_eq!(server.size_of_hand_of_player(0).unwrap(), 5);
}

#[test]
fn play_with_an_empty_deck_shrinks_the_hand() {
    let hand0 = vec![card(Color::Red, Value::One); 4];
    let hand1 = vec![card(Color::Blue, Value::One); 4];
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut server = rigged_server(hand0, hand1, Vec::new());
    let mut bots = recorder_pair(&log);

    server
        .execute_move(Move::Play(0), &mut bots)
        .expect("play executes");
    assert_eq!(server.size_of_hand_of_player(0).unwrap(), 3);
    assert_eq!(server.final_countdown(), 0);
    server.advance_active_player();
    assert_eq!(server.final_countdown(), 1);
}

#[test]
fn active_card_is_visible_to_every_observer_during_plays() {
    let hand0 = vec![card(Color::Yellow, Value::One); 5];
    let hand1 = vec![card(Color::Blue, Value::One); 5];
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut server = rigged_server(hand0, hand1, filler_deck(5));
    let mut bots = recorder_pair(&log);

    server
        .execute_move(Move::Play(0), &mut bots)
        .expect("play executes");
    assert_eq!(
        log.lock().unwrap().active_cards,
        vec![card(Color::Yellow, Value::One); 2]
    );
}

/// A minimal deterministic policy: discard the oldest card when allowed,
/// otherwise hint the partner's oldest card value.
#[derive(Clone)]
struct DiscardBot {
    me: usize,
    log: Arc<Mutex<EventLog>>,
}

impl Bot for DiscardBot {
    fn observe_before_move(&mut self, server: &Server) -> Result<()> {
        // conservation: everything not played, discarded, or in a visible
        // hand is either in the deck or in my own hand
        let unseen = server.deck_composition(Some(self.me))?.total();
        assert_eq!(
            unseen,
            server.cards_remaining_in_deck() + server.size_of_hand_of_player(self.me)?
        );

        let mut log = self.log.lock().unwrap();
        if log.partner_first_hand.is_none() && self.me == 0 {
            log.partner_first_hand = Some(server.hand_of_player(1)?.to_vec());
        }
        Ok(())
    }

    fn make_move(&mut self, server: &mut Server) -> Result<()> {
        if server.discarding_is_allowed() {
            server.please_discard(0)
        } else {
            let partner = (self.me + 1) % server.num_players();
            let value = server.hand_of_player(partner)?[0].value;
            server.please_give_value_hint(partner, value)
        }
    }

    fn observe_before_discard(&mut self, _: &Server, _: usize, _: usize) -> Result<()> {
        Ok(())
    }

    fn observe_before_play(&mut self, _: &Server, _: usize, _: usize) -> Result<()> {
        Ok(())
    }

    fn observe_color_hint(
        &mut self,
        _: &Server,
        _: usize,
        _: usize,
        _: Color,
        _: CardIndices,
    ) -> Result<()> {
        Ok(())
    }

    fn observe_value_hint(
        &mut self,
        _: &Server,
        _: usize,
        _: usize,
        _: Value,
        _: CardIndices,
    ) -> Result<()> {
        Ok(())
    }

    fn observe_after_move(&mut self, _: &Server) -> Result<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Bot> {
        Box::new(self.clone())
    }

    fn set_permissive(&mut self, _permissive: bool) {}
}

fn discard_pair(log: &Arc<Mutex<EventLog>>) -> Vec<Box<dyn Bot>> {
    vec![
        Box::new(DiscardBot {
            me: 0,
            log: log.clone(),
        }),
        Box::new(DiscardBot {
            me: 1,
            log: log.clone(),
        }),
    ]
}

#[test]
fn same_seed_replays_identically() {
    let run = |seed: u64| -> (usize, String) {
        let log = Arc::new(Mutex::new(EventLog::default()));
        let mut server = Server::new(2, Rules::default());
        server.seed(seed);
        let mut bots = discard_pair(&log);
        let score = server.run_game(&mut bots, None).expect("game completes");
        (score, server.discards_as_string())
    };

    let (score_a, discards_a) = run(42);
    let (score_b, discards_b) = run(42);
    assert_eq!(score_a, score_b);
    assert_eq!(discards_a, discards_b);

    let (_, discards_c) = run(43);
    assert_ne!(discards_a, discards_c, "different seeds deal differently");
}

#[test]
fn stacked_deck_deals_top_first() {
    // the unshuffled full deck is a legal stack in a known order
    let deck = hanabi_core::model::full_deck();

    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut server = Server::new(2, Rules::default());
    let mut bots = discard_pair(&log);
    server
        .run_game(&mut bots, Some(&deck))
        .expect("stacked game completes");

    // player 1 was dealt stacked cards 5..10, in draw order
    assert_eq!(
        log.lock().unwrap().partner_first_hand.as_deref(),
        Some(&deck[5..10])
    );
}
