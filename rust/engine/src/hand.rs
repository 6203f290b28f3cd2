use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Suit, ALL_SUITS};
use crate::errors::GameError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::HighCard => "high card",
            Category::OnePair => "one pair",
            Category::TwoPair => "two pair",
            Category::ThreeOfAKind => "three of a kind",
            Category::Straight => "straight",
            Category::Flush => "flush",
            Category::FullHouse => "full house",
            Category::FourOfAKind => "four of a kind",
            Category::StraightFlush => "straight flush",
        }
    }
}

/// The best five-card hand found in a 5 to 7 card holding.
///
/// Ordering and equality only look at `category` and `kickers`; two holdings
/// that tie here split the pot even if `best_cards` differ by suit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandStrength {
    pub category: Category,
    // tie-break ranks, most significant first, zero padded
    pub kickers: [u8; 5],
    pub best_cards: Vec<Card>,
}

impl HandStrength {
    fn new(category: Category, ranks: &[u8], best_cards: Vec<Card>) -> Self {
        let mut kickers = [0u8; 5];
        for (slot, &r) in kickers.iter_mut().zip(ranks) {
            *slot = r;
        }
        Self {
            category,
            kickers,
            best_cards,
        }
    }

    /// Packs category and kickers into one comparable integer.
    pub fn value(&self) -> u32 {
        self.kickers
            .iter()
            .fold(self.category as u32, |acc, &k| (acc << 4) | u32::from(k))
    }
}

impl PartialEq for HandStrength {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.kickers == other.kickers
    }
}

impl Eq for HandStrength {}

impl PartialOrd for HandStrength {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HandStrength {
    fn cmp(&self, other: &Self) -> Ordering {
        self.category
            .cmp(&other.category)
            .then_with(|| self.kickers.cmp(&other.kickers))
    }
}

impl fmt::Display for HandStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category.name())?;
        for (i, c) in self.best_cards.iter().enumerate() {
            let sep = if i == 0 { " (" } else { " " };
            write!(f, "{sep}{c}")?;
        }
        if !self.best_cards.is_empty() {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Evaluates the best five-card poker hand among 5 to 7 cards.
pub fn evaluate(cards: &[Card]) -> Result<HandStrength, GameError> {
    if !(5..=7).contains(&cards.len()) {
        return Err(GameError::InvalidHandSize(cards.len()));
    }

    let mut sorted = cards.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let mut rank_counts = [0u8; 15]; // 2..14 used
    let mut rank_mask: u16 = 0;
    let mut suit_masks = [0u16; 4];
    for c in &sorted {
        let r = c.rank.value();
        rank_counts[r as usize] += 1;
        rank_mask |= 1 << r;
        suit_masks[suit_index(c.suit)] |= 1 << r;
    }

    let flush_suit = ALL_SUITS
        .iter()
        .copied()
        .find(|&s| suit_masks[suit_index(s)].count_ones() >= 5);

    if let Some(suit) = flush_suit {
        if let Some(high) = straight_high(suit_masks[suit_index(suit)]) {
            let best = straight_cards(&sorted, high, Some(suit));
            return Ok(HandStrength::new(Category::StraightFlush, &[high], best));
        }
    }

    let groups = rank_groups(&rank_counts);
    let (top_rank, top_count) = groups[0];
    let second = groups.get(1).copied();

    if top_count == 4 {
        let kicker = others(&groups, &[top_rank], 1);
        let best = pick(&sorted, &[(top_rank, 4), (kicker[0], 1)], None);
        return Ok(HandStrength::new(
            Category::FourOfAKind,
            &[top_rank, kicker[0]],
            best,
        ));
    }

    if let Some((pair_rank, pair_count)) = second {
        if top_count == 3 && pair_count >= 2 {
            let best = pick(&sorted, &[(top_rank, 3), (pair_rank, 2)], None);
            return Ok(HandStrength::new(
                Category::FullHouse,
                &[top_rank, pair_rank],
                best,
            ));
        }
    }

    if let Some(suit) = flush_suit {
        let ranks = top_ranks_in_mask(suit_masks[suit_index(suit)], 5);
        let spec: Vec<(u8, usize)> = ranks.iter().map(|&r| (r, 1)).collect();
        let best = pick(&sorted, &spec, Some(suit));
        return Ok(HandStrength::new(Category::Flush, &ranks, best));
    }

    if let Some(high) = straight_high(rank_mask) {
        let best = straight_cards(&sorted, high, None);
        return Ok(HandStrength::new(Category::Straight, &[high], best));
    }

    if top_count == 3 {
        let kickers = others(&groups, &[top_rank], 2);
        let mut spec = vec![(top_rank, 3)];
        spec.extend(kickers.iter().map(|&r| (r, 1)));
        let mut ranks = vec![top_rank];
        ranks.extend(&kickers);
        return Ok(HandStrength::new(
            Category::ThreeOfAKind,
            &ranks,
            pick(&sorted, &spec, None),
        ));
    }

    if let Some((low_pair, 2)) = second {
        if top_count == 2 {
            // a third pair still only counts as a kicker
            let kicker = others(&groups, &[top_rank, low_pair], 1);
            let best = pick(
                &sorted,
                &[(top_rank, 2), (low_pair, 2), (kicker[0], 1)],
                None,
            );
            return Ok(HandStrength::new(
                Category::TwoPair,
                &[top_rank, low_pair, kicker[0]],
                best,
            ));
        }
    }

    if top_count == 2 {
        let kickers = others(&groups, &[top_rank], 3);
        let mut spec = vec![(top_rank, 2)];
        spec.extend(kickers.iter().map(|&r| (r, 1)));
        let mut ranks = vec![top_rank];
        ranks.extend(&kickers);
        return Ok(HandStrength::new(
            Category::OnePair,
            &ranks,
            pick(&sorted, &spec, None),
        ));
    }

    let highs = others(&groups, &[], 5);
    let spec: Vec<(u8, usize)> = highs.iter().map(|&r| (r, 1)).collect();
    Ok(HandStrength::new(
        Category::HighCard,
        &highs,
        pick(&sorted, &spec, None),
    ))
}

fn suit_index(s: Suit) -> usize {
    match s {
        Suit::Clubs => 0,
        Suit::Diamonds => 1,
        Suit::Hearts => 2,
        Suit::Spades => 3,
    }
}

/// (rank, count) pairs ordered by count, then rank, both descending.
fn rank_groups(rank_counts: &[u8; 15]) -> Vec<(u8, u8)> {
    let mut groups: Vec<(u8, u8)> = (2..=14u8)
        .filter(|&r| rank_counts[r as usize] > 0)
        .map(|r| (r, rank_counts[r as usize]))
        .collect();
    groups.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    groups
}

fn others(groups: &[(u8, u8)], exclude: &[u8], n: usize) -> Vec<u8> {
    let mut ranks: Vec<u8> = groups
        .iter()
        .map(|&(r, _)| r)
        .filter(|r| !exclude.contains(r))
        .collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));
    ranks.truncate(n);
    ranks
}

fn top_ranks_in_mask(mask: u16, n: usize) -> Vec<u8> {
    (2..=14u8)
        .rev()
        .filter(|&r| mask & (1 << r) != 0)
        .take(n)
        .collect()
}

fn straight_high(mask: u16) -> Option<u8> {
    let mut m = mask;
    // Ace also plays low
    if m & (1 << 14) != 0 {
        m |= 1 << 1;
    }
    (5..=14u8).rev().find(|&high| {
        let window = 0b1_1111u16 << (high - 4);
        m & window == window
    })
}

fn straight_cards(sorted: &[Card], high: u8, suit: Option<Suit>) -> Vec<Card> {
    let spec: Vec<(u8, usize)> = (0..5u8)
        .map(|i| {
            let r = high - i;
            (if r == 1 { 14 } else { r }, 1)
        })
        .collect();
    pick(sorted, &spec, suit)
}

fn pick(sorted: &[Card], spec: &[(u8, usize)], suit: Option<Suit>) -> Vec<Card> {
    let mut best = Vec::with_capacity(5);
    for &(rank, count) in spec {
        best.extend(
            sorted
                .iter()
                .filter(|c| c.rank.value() == rank && suit.is_none_or(|s| c.suit == s))
                .take(count)
                .copied(),
        );
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank as R, Suit as S};

    fn c(r: R, s: S) -> Card {
        Card::new(r, s)
    }

    #[test]
    fn wheel_is_five_high_straight() {
        let hs = evaluate(&[
            c(R::Ace, S::Clubs),
            c(R::Two, S::Hearts),
            c(R::Three, S::Spades),
            c(R::Four, S::Diamonds),
            c(R::Five, S::Clubs),
            c(R::King, S::Hearts),
        ])
        .unwrap();
        assert_eq!(hs.category, Category::Straight);
        assert_eq!(hs.kickers[0], 5);
        assert!(hs.best_cards.contains(&c(R::Ace, S::Clubs)));
        assert!(!hs.best_cards.contains(&c(R::King, S::Hearts)));
    }

    #[test]
    fn third_pair_plays_as_two_pair_kicker() {
        let hs = evaluate(&[
            c(R::King, S::Clubs),
            c(R::King, S::Hearts),
            c(R::Nine, S::Spades),
            c(R::Nine, S::Diamonds),
            c(R::Queen, S::Clubs),
            c(R::Queen, S::Hearts),
            c(R::Two, S::Spades),
        ])
        .unwrap();
        assert_eq!(hs.category, Category::TwoPair);
        assert_eq!(hs.kickers, [13, 12, 9, 0, 0]);
        assert_eq!(hs.best_cards.len(), 5);
    }

    #[test]
    fn two_trips_make_a_full_house() {
        let hs = evaluate(&[
            c(R::Four, S::Clubs),
            c(R::Four, S::Hearts),
            c(R::Four, S::Spades),
            c(R::Jack, S::Diamonds),
            c(R::Jack, S::Clubs),
            c(R::Jack, S::Hearts),
            c(R::Two, S::Spades),
        ])
        .unwrap();
        assert_eq!(hs.category, Category::FullHouse);
        assert_eq!(&hs.kickers[..2], &[11, 4]);
    }

    #[test]
    fn rejects_too_few_or_too_many_cards() {
        let four = [
            c(R::Two, S::Clubs),
            c(R::Three, S::Clubs),
            c(R::Four, S::Clubs),
            c(R::Five, S::Clubs),
        ];
        assert_eq!(evaluate(&four), Err(GameError::InvalidHandSize(4)));
    }

    #[test]
    fn value_orders_like_strength() {
        let flush = evaluate(&[
            c(R::Two, S::Hearts),
            c(R::Seven, S::Hearts),
            c(R::Jack, S::Hearts),
            c(R::Queen, S::Hearts),
            c(R::Nine, S::Hearts),
        ])
        .unwrap();
        let straight = evaluate(&[
            c(R::Ten, S::Hearts),
            c(R::Jack, S::Clubs),
            c(R::Queen, S::Hearts),
            c(R::King, S::Spades),
            c(R::Ace, S::Diamonds),
        ])
        .unwrap();
        assert!(flush > straight);
        assert!(flush.value() > straight.value());
    }

    #[test]
    fn display_names_category_and_cards() {
        let hs = evaluate(&[
            c(R::Ace, S::Spades),
            c(R::Ace, S::Hearts),
            c(R::Nine, S::Clubs),
            c(R::Five, S::Diamonds),
            c(R::Two, S::Clubs),
        ])
        .unwrap();
        assert_eq!(hs.to_string(), "one pair (A♠ A♥ 9♣ 5♦ 2♣)");
    }
}
