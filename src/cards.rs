//! Deck generation for the memory-matching game.

use rand::Rng;

use crate::types::Card;

const SUITS: [&str; 4] = ["heart", "diamond", "club", "spade"];
const RANKS: [&str; 13] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "jack", "queen", "king",
];

/// Face label of the `index`-th pair. Wraps once the 52 faces run out.
fn pair_value(index: usize) -> String {
    let suit = SUITS[(index / RANKS.len()) % SUITS.len()];
    let rank = RANKS[index % RANKS.len()];
    format!("/assets/images/cards/{suit}_{rank}.png")
}

/// Builds `num_pairs` pairs and shuffles them with the thread-local RNG.
pub fn generate_cards(num_pairs: usize) -> Vec<Card> {
    generate_cards_with(num_pairs, &mut rand::rng())
}

/// Same as [`generate_cards`] with a caller-supplied RNG.
pub fn generate_cards_with<R: Rng>(num_pairs: usize, rng: &mut R) -> Vec<Card> {
    let mut cards = Vec::with_capacity(num_pairs * 2);
    for i in 0..num_pairs {
        let value = pair_value(i);
        let id = (i * 2) as u32;
        cards.push(Card {
            id,
            value: value.clone(),
        });
        cards.push(Card { id: id + 1, value });
    }

    shuffle(&mut cards, rng);
    cards
}

/// Fisher-Yates, walking from the end.
fn shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}
