use proptest::prelude::*;
use proptest::sample::subsequence;

use cardroom_engine::cards::{full_deck, Card, Variant};
use cardroom_engine::hand::{evaluate, HandStrength};

fn seven_cards() -> impl Strategy<Value = Vec<Card>> {
    subsequence(full_deck(Variant::Holdem), 7).prop_shuffle()
}

fn brute_force_best(cards: &[Card]) -> HandStrength {
    let n = cards.len();
    let mut best: Option<HandStrength> = None;
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                for d in c + 1..n {
                    for e in d + 1..n {
                        let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let hs = evaluate(&five).unwrap();
                        if best.as_ref().is_none_or(|cur| hs > *cur) {
                            best = Some(hs);
                        }
                    }
                }
            }
        }
    }
    best.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The seven-card evaluation equals the best of all 21 five-card subsets.
    #[test]
    fn best_subset_matches_brute_force(cards in seven_cards()) {
        let fast = evaluate(&cards).unwrap();
        let slow = brute_force_best(&cards);
        prop_assert_eq!(&fast, &slow, "cards {:?}", cards);
        prop_assert_eq!(fast.best_cards.len(), 5);
        for card in &fast.best_cards {
            prop_assert!(cards.contains(card));
        }
    }

    /// A higher category always wins, and the packed value agrees with Ord.
    #[test]
    fn category_dominates_and_value_agrees(a in seven_cards(), b in seven_cards()) {
        let ha = evaluate(&a).unwrap();
        let hb = evaluate(&b).unwrap();
        if ha.category != hb.category {
            prop_assert_eq!(ha.cmp(&hb), ha.category.cmp(&hb.category));
        }
        prop_assert_eq!(ha.cmp(&hb), ha.value().cmp(&hb.value()));
    }

    #[test]
    fn comparison_is_transitive(a in seven_cards(), b in seven_cards(), c in seven_cards()) {
        let mut hands = [
            evaluate(&a).unwrap(),
            evaluate(&b).unwrap(),
            evaluate(&c).unwrap(),
        ];
        hands.sort();
        prop_assert!(hands[0] <= hands[1]);
        prop_assert!(hands[1] <= hands[2]);
        prop_assert!(hands[0] <= hands[2]);
    }

    /// Card order does not matter.
    #[test]
    fn evaluation_ignores_input_order(cards in seven_cards()) {
        let mut reversed = cards.clone();
        reversed.reverse();
        prop_assert_eq!(evaluate(&cards).unwrap(), evaluate(&reversed).unwrap());
    }
}
