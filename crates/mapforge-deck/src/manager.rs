//! The deck manager: the host's registry of live decks.
//!
//! Tracks every deck by name and every card the host has issued to a
//! player, so deck destruction and full-recall shuffles can account for
//! cards that are currently in someone's hand.
//!
//! # Error posture
//!
//! Gameplay requests can race deck lifecycle operations: a joiner's draw
//! may arrive after the host destroyed the deck. Such races resolve as
//! soft no-ops (`None` / zero counts), never as errors; the only
//! `DeckError`s come from [`create`](DeckManager::create).

use std::collections::{BTreeMap, HashMap};

use mapforge_protocol::{Card, PlayerId};

use crate::{Deck, DeckDefinition, DeckError};

/// How much of a deck a shuffle touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleScope {
    /// Recall every issued card, merge the discard pile, reshuffle all.
    All,
    /// Shuffle only the discard pile back into the draw pile.
    Discards,
}

/// Result of a draw request.
#[derive(Debug, Clone)]
pub struct DrawOutcome {
    /// The cards actually drawn — at most the deck's remaining supply.
    pub cards: Vec<Card>,
    /// `true` when the request could not be filled completely.
    pub exhausted: bool,
}

/// Host-side registry of decks and issued cards.
///
/// Joiners never construct one; their view of the deck subsystem is the
/// broadcast deck-name list plus the cards in their own hand.
pub struct DeckManager {
    /// Live decks, keyed by name. `BTreeMap` keeps the broadcast name
    /// list in a stable order.
    decks: BTreeMap<String, Deck>,
    /// Cards currently in players' hands, keyed by the player they were
    /// issued to.
    issued: HashMap<PlayerId, Vec<Card>>,
}

impl DeckManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            decks: BTreeMap::new(),
            issued: HashMap::new(),
        }
    }

    /// Instantiates a definition as a new deck.
    ///
    /// # Errors
    /// Returns [`DeckError::AlreadyExists`] if the name is taken.
    pub fn create(
        &mut self,
        deck_name: &str,
        definition: &DeckDefinition,
    ) -> Result<(), DeckError> {
        if self.decks.contains_key(deck_name) {
            return Err(DeckError::AlreadyExists(deck_name.to_string()));
        }
        let deck = Deck::from_definition(deck_name, definition);
        tracing::info!(deck = deck_name, cards = deck.remaining(), "deck created");
        self.decks.insert(deck_name.to_string(), deck);
        Ok(())
    }

    /// Removes a deck. Issued cards of that deck vanish with it.
    ///
    /// Returns `false` if no such deck existed (soft no-op).
    pub fn destroy(&mut self, deck_name: &str) -> bool {
        if self.decks.remove(deck_name).is_none() {
            return false;
        }
        for hand in self.issued.values_mut() {
            hand.retain(|card| card.deck_name != deck_name);
        }
        tracing::info!(deck = deck_name, "deck destroyed");
        true
    }

    /// Whether a deck with this name exists.
    pub fn contains(&self, deck_name: &str) -> bool {
        self.decks.contains_key(deck_name)
    }

    /// The current deck-name list, in broadcast order.
    pub fn deck_names(&self) -> Vec<String> {
        self.decks.keys().cloned().collect()
    }

    /// Cards left in a deck's draw pile.
    pub fn remaining(&self, deck_name: &str) -> Option<usize> {
        self.decks.get(deck_name).map(Deck::remaining)
    }

    /// The cards currently issued to a player.
    pub fn issued_to(&self, player: PlayerId) -> &[Card] {
        self.issued.get(&player).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pulls every issued card of a deck back into its discard pile.
    ///
    /// Returns how many cards were recalled. The caller broadcasts the
    /// recall so joiners drop their copies.
    pub fn recall_all(&mut self, deck_name: &str) -> usize {
        let Some(deck) = self.decks.get_mut(deck_name) else {
            return 0;
        };
        let mut recalled = 0;
        for hand in self.issued.values_mut() {
            let mut kept = Vec::with_capacity(hand.len());
            for card in hand.drain(..) {
                if card.deck_name == deck_name {
                    deck.discard(card);
                    recalled += 1;
                } else {
                    kept.push(card);
                }
            }
            *hand = kept;
        }
        recalled
    }

    /// Shuffles a deck. With [`ShuffleScope::All`] every issued card is
    /// recalled first; the return value is that recall count so the caller
    /// knows whether to broadcast one.
    ///
    /// Returns `None` if no such deck exists (soft no-op).
    pub fn shuffle(
        &mut self,
        deck_name: &str,
        scope: ShuffleScope,
    ) -> Option<usize> {
        if !self.decks.contains_key(deck_name) {
            return None;
        }
        let recalled = match scope {
            ShuffleScope::All => {
                let recalled = self.recall_all(deck_name);
                self.decks
                    .get_mut(deck_name)
                    .expect("checked above")
                    .shuffle_all();
                recalled
            }
            ShuffleScope::Discards => {
                self.decks
                    .get_mut(deck_name)
                    .expect("checked above")
                    .shuffle_discards_in();
                0
            }
        };
        tracing::debug!(deck = deck_name, ?scope, recalled, "deck shuffled");
        Some(recalled)
    }

    /// Draws up to `count` cards for a player and records them as issued.
    ///
    /// - Unknown deck (destruction race): `None`, a silent no-op.
    /// - `count <= 0`: an empty, non-exhausted outcome — declining
    ///   gracefully rather than erroring.
    /// - Short supply: every remaining card, with `exhausted` set.
    pub fn draw(
        &mut self,
        player: PlayerId,
        deck_name: &str,
        count: i32,
    ) -> Option<DrawOutcome> {
        let deck = self.decks.get_mut(deck_name)?;
        if count <= 0 {
            return Some(DrawOutcome { cards: Vec::new(), exhausted: false });
        }
        let requested = count as usize;
        let cards = deck.draw(requested);
        let exhausted = cards.len() < requested;
        if exhausted {
            tracing::info!(
                deck = deck_name,
                %player,
                requested,
                supplied = cards.len(),
                "deck out of cards"
            );
        }
        self.issued.entry(player).or_default().extend(cards.iter().cloned());
        Some(DrawOutcome { cards, exhausted })
    }

    /// Returns cards to their decks' discard piles and clears them from
    /// the player's issued record.
    ///
    /// Cards of vanished decks (destruction race) are silently dropped.
    /// Returns how many cards reached a discard pile.
    pub fn discard(&mut self, player: PlayerId, cards: &[Card]) -> usize {
        let mut discarded = 0;
        for card in cards {
            if let Some(hand) = self.issued.get_mut(&player) {
                if let Some(pos) = hand.iter().position(|held| held == card) {
                    hand.remove(pos);
                }
            }
            if let Some(deck) = self.decks.get_mut(&card.deck_name) {
                deck.discard(card.clone());
                discarded += 1;
            } else {
                tracing::debug!(
                    deck = %card.deck_name,
                    card = %card.card_name,
                    "discard for vanished deck dropped"
                );
            }
        }
        discarded
    }

    /// Discards a departing player's whole hand. Returns the cards so the
    /// caller can clean up any pogs backed by them.
    pub fn discard_all_from(&mut self, player: PlayerId) -> Vec<Card> {
        let hand = self.issued.remove(&player).unwrap_or_default();
        for card in &hand {
            if let Some(deck) = self.decks.get_mut(&card.deck_name) {
                deck.discard(card.clone());
            }
        }
        hand
    }
}

impl Default for DeckManager {
    fn default() -> Self {
        Self::new()
    }
}
