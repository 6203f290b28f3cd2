//! # cardroom-engine: card game rules
//!
//! Pure, deterministic rules for the two games a cardroom table can run:
//! Texas Hold'em and two-player Blot. Nothing here locks, sleeps or moves
//! money; the `cardroom_tables` crate owns those concerns and drives these
//! functions under a per-room lock.
//!
//! ## Core Modules
//!
//! - [`cards`] - Suits, ranks, cards and the two deck variants
//! - [`deck`] - Serializable ChaCha20-shuffled deck with burns
//! - [`hand`] - Best five-card hand evaluation
//! - [`player`] - Per-hand poker player state
//! - [`rules`] - Betting actions and their validation
//! - [`poker`] - Hold'em hand state machine and settlement
//! - [`blot`] - Blot trump negotiation, tricks and scoring
//! - [`history`] - Hand records and the JSONL hand logger
//! - [`errors`] - Error types for both games
//!
//! ## Quick Start
//!
//! ```rust
//! use cardroom_engine::cards::{Card, Rank, Suit};
//! use cardroom_engine::hand::{evaluate, Category};
//!
//! let cards = [
//!     Card::new(Rank::Ace, Suit::Hearts),
//!     Card::new(Rank::King, Suit::Hearts),
//!     Card::new(Rank::Queen, Suit::Hearts),
//!     Card::new(Rank::Jack, Suit::Hearts),
//!     Card::new(Rank::Ten, Suit::Hearts),
//!     Card::new(Rank::Two, Suit::Clubs),
//!     Card::new(Rank::Three, Suit::Diamonds),
//! ];
//!
//! let strength = evaluate(&cards).unwrap();
//! assert_eq!(strength.category, Category::StraightFlush);
//! ```
//!
//! ## Reproducible deals
//!
//! ```rust
//! use cardroom_engine::cards::Variant;
//! use cardroom_engine::deck::Deck;
//!
//! let a = Deck::new_with_seed(Variant::Blot, 42);
//! let b = Deck::new_with_seed(Variant::Blot, 42);
//! assert_eq!(a, b);
//! assert_eq!(a.remaining(), 24);
//! ```

pub mod blot;
pub mod cards;
pub mod deck;
pub mod errors;
pub mod hand;
pub mod history;
pub mod player;
pub mod poker;
pub mod rules;

pub type RoomId = u64;
