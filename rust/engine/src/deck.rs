use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::cards::{full_deck, Card, Variant};
use crate::errors::GameError;

/// A shuffled deck that travels with the hand state.
///
/// The RNG is only used at construction; afterwards the deck is plain data so
/// it can be persisted and restored between actions. Cards are drawn from the
/// front, burned cards are kept aside so every card stays accounted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    variant: Variant,
    cards: Vec<Card>,
    position: usize,
    #[serde(default)]
    burned: Vec<Card>,
}

impl Deck {
    /// Shuffles with ChaCha20 seeded from the operating system, so clients
    /// cannot predict the order.
    pub fn new_shuffled(variant: Variant) -> Self {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::shuffled_with(variant, &mut rng)
    }

    pub fn new_with_seed(variant: Variant, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        Self::shuffled_with(variant, &mut rng)
    }

    /// A deck in the given order, top card first. Used to stage exact deals.
    pub fn stacked(variant: Variant, cards: Vec<Card>) -> Self {
        Self {
            variant,
            cards,
            position: 0,
            burned: Vec::new(),
        }
    }

    fn shuffled_with(variant: Variant, rng: &mut ChaCha20Rng) -> Self {
        let mut cards = full_deck(variant);
        cards.shuffle(rng);
        Self::stacked(variant, cards)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn draw(&mut self) -> Option<Card> {
        let c = self.cards.get(self.position).copied()?;
        self.position += 1;
        Some(c)
    }

    pub fn draw_many(&mut self, n: usize) -> Result<Vec<Card>, GameError> {
        if n > self.remaining() {
            return Err(GameError::DeckExhausted {
                requested: n,
                remaining: self.remaining(),
            });
        }
        Ok((0..n).filter_map(|_| self.draw()).collect())
    }

    /// Moves the top card to the burn pile.
    pub fn burn(&mut self) -> Result<(), GameError> {
        let c = self.draw().ok_or(GameError::DeckExhausted {
            requested: 1,
            remaining: 0,
        })?;
        self.burned.push(c);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }

    pub fn remaining_cards(&self) -> &[Card] {
        &self.cards[self.position.min(self.cards.len())..]
    }

    pub fn burned(&self) -> &[Card] {
        &self.burned
    }
}
