//! One live deck: a shuffled draw pile plus a discard pile.
//!
//! Only the host ever holds one of these. Joiners know decks by name only
//! (the placeholder rule); everything they do to a deck goes through the
//! host as a request.

use mapforge_protocol::Card;
use rand::seq::SliceRandom;

use crate::DeckDefinition;

/// A named deck of card instances. The top of the draw pile is the end of
/// the vector.
#[derive(Debug, Clone)]
pub struct Deck {
    name: String,
    draw_pile: Vec<Card>,
    discard_pile: Vec<Card>,
}

impl Deck {
    /// Instantiates a definition into a freshly shuffled deck.
    pub fn from_definition(name: &str, definition: &DeckDefinition) -> Self {
        let mut draw_pile = Vec::with_capacity(definition.total_cards());
        for card_type in &definition.cards {
            for _ in 0..card_type.quantity {
                draw_pile.push(Card {
                    deck_name: name.to_string(),
                    card_name: card_type.name.clone(),
                    art_file: card_type.art_file.clone(),
                    description: card_type.description.clone(),
                });
            }
        }
        draw_pile.shuffle(&mut rand::rng());
        Self {
            name: name.to_string(),
            draw_pile,
            discard_pile: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cards left in the draw pile.
    pub fn remaining(&self) -> usize {
        self.draw_pile.len()
    }

    /// Cards in the discard pile.
    pub fn discarded(&self) -> usize {
        self.discard_pile.len()
    }

    /// Draws up to `count` cards. Never errors and never oversupplies:
    /// with `remaining < count` you get exactly `remaining` cards and the
    /// pile sits at zero.
    pub fn draw(&mut self, count: usize) -> Vec<Card> {
        let take = count.min(self.draw_pile.len());
        self.draw_pile.split_off(self.draw_pile.len() - take)
    }

    /// Puts a card on the discard pile.
    pub fn discard(&mut self, card: Card) {
        self.discard_pile.push(card);
    }

    /// Shuffles the discard pile back under the draw pile.
    pub fn shuffle_discards_in(&mut self) {
        let mut recovered = std::mem::take(&mut self.discard_pile);
        recovered.shuffle(&mut rand::rng());
        // Returned cards go under the existing pile so cards already on
        // top keep their position.
        recovered.extend(self.draw_pile.drain(..));
        self.draw_pile = recovered;
    }

    /// Merges the discard pile in and reshuffles everything.
    pub fn shuffle_all(&mut self) {
        self.draw_pile.append(&mut self.discard_pile);
        self.draw_pile.shuffle(&mut rand::rng());
    }
}
