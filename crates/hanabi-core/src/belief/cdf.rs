//! PDF/CDF forms of a hand distribution, for constant-time-ish sampling and
//! for the public-to-private reweighting joint search needs.

use rand::Rng;
use rayon::prelude::*;

use crate::belief::dist::HandDist;
use crate::game::error::{Result, ServerError};
use crate::model::{Card, DeckComposition, Hand, NUM_COLORS, NUM_VALUES};
use crate::pool;

/// Parallel `hands[]` / `probs[]` arrays. As a PDF, `probs` carries raw
/// weights; after [`pdf_to_cdf`] it is the normalized inclusive prefix sum,
/// ending exactly at 1.0.
#[derive(Debug, Clone, Default)]
pub struct HandDistCdf {
    pub hands: Vec<Hand>,
    pub probs: Vec<f64>,
}

impl HandDistCdf {
    pub fn len(&self) -> usize {
        self.hands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }
}

pub fn populate_pdf(dist: &HandDist) -> HandDistCdf {
    let mut pdf = HandDistCdf {
        hands: Vec::with_capacity(dist.len()),
        probs: Vec::with_capacity(dist.len()),
    };
    for (hand, val) in dist {
        pdf.hands.push(hand.clone());
        pdf.probs.push(val.prob);
    }
    pdf
}

/// Converts raw weights into the normalized inclusive prefix sum in place.
pub fn pdf_to_cdf(pdf: &mut HandDistCdf) -> Result<()> {
    let total: f64 = pdf.probs.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(ServerError::EmptyDistribution);
    }
    let mut accum = 0.0;
    for prob in pdf.probs.iter_mut() {
        accum += *prob;
        *prob = accum / total;
    }
    if let Some(last) = pdf.probs.last_mut() {
        *last = 1.0;
    }
    Ok(())
}

pub fn populate_cdf(dist: &HandDist) -> Result<HandDistCdf> {
    let mut cdf = populate_pdf(dist);
    pdf_to_cdf(&mut cdf)?;
    Ok(cdf)
}

/// Draws u in [0, 1) and takes the hand at the first CDF entry above u.
/// Zero-weight entries share their predecessor's prefix value and are never
/// selected.
pub fn sample_from_cdf<'a, R: Rng + ?Sized>(cdf: &'a HandDistCdf, rng: &mut R) -> &'a Hand {
    debug_assert!(!cdf.is_empty());
    let u: f64 = rng.gen();
    let index = cdf.probs.partition_point(|&prob| prob <= u);
    &cdf.hands[index.min(cdf.hands.len() - 1)]
}

/// Reweights a public PDF into the observer's private PDF given the
/// partner's concrete hand: each hand's weight is multiplied by
/// `P(draw hand | deck minus partner hand) / P(draw hand | public deck)`,
/// both computed as products of remaining counts without replacement.
/// Returns the number of hands left with positive weight.
pub fn reweight_private(
    pdf: &mut HandDistCdf,
    partner_hand: &[Card],
    public_deck: &DeckComposition,
    num_threads: usize,
) -> usize {
    if pdf.is_empty() {
        return 0;
    }
    let counts = public_deck.as_counts();
    let chunk = pool::chunk_size(pdf.probs.len(), num_threads);
    let hands = &pdf.hands;
    pool::install(|| {
        pdf.probs
            .par_chunks_mut(chunk)
            .enumerate()
            .map(|(chunk_index, probs_chunk)| {
                let mut fast_deck: [i32; NUM_COLORS * NUM_VALUES] =
                    counts.map(|count| count as i32);
                let mut alive = 0usize;
                for (offset, prob) in probs_chunk.iter_mut().enumerate() {
                    let hand = &hands[chunk_index * chunk + offset];

                    let mut old_prior = 1.0;
                    for &card in hand {
                        old_prior *= fast_deck[card.index()] as f64;
                        fast_deck[card.index()] -= 1;
                    }
                    for &card in hand {
                        fast_deck[card.index()] += 1;
                    }
                    debug_assert!(old_prior > 0.0);

                    for &card in partner_hand {
                        fast_deck[card.index()] -= 1;
                    }
                    let mut new_prior = 1.0;
                    for &card in hand {
                        new_prior *= fast_deck[card.index()] as f64;
                        fast_deck[card.index()] -= 1;
                    }
                    for &card in hand {
                        fast_deck[card.index()] += 1;
                    }
                    for &card in partner_hand {
                        fast_deck[card.index()] += 1;
                    }

                    *prob = if new_prior > 0.0 && old_prior > 0.0 {
                        *prob * new_prior / old_prior
                    } else {
                        0.0
                    };
                    if *prob > 0.0 {
                        alive += 1;
                    }
                }
                alive
            })
            .sum()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::dist::{DistVal, HandDist};
    use crate::model::{Card, Color, Value};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hand(cards: &[(Color, Value)]) -> Vec<Card> {
        cards
            .iter()
            .map(|&(color, value)| Card::new(color, value))
            .collect()
    }

    fn tiny_dist() -> HandDist {
        let mut dist = HandDist::new();
        dist.insert(
            hand(&[(Color::Red, Value::One)]),
            DistVal::new(1.0, Vec::new()),
        );
        dist.insert(
            hand(&[(Color::Red, Value::Two)]),
            DistVal::new(3.0, Vec::new()),
        );
        dist.insert(
            hand(&[(Color::Blue, Value::Five)]),
            DistVal::new(0.0, Vec::new()),
        );
        dist
    }

    #[test]
    fn cdf_is_monotone_and_ends_at_one() {
        let cdf = populate_cdf(&tiny_dist()).expect("positive mass");
        assert_eq!(cdf.len(), 3);
        for pair in cdf.probs.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(*cdf.probs.last().unwrap(), 1.0);
    }

    #[test]
    fn empty_mass_is_rejected() {
        let mut dist = HandDist::new();
        dist.insert(
            hand(&[(Color::Red, Value::One)]),
            DistVal::new(0.0, Vec::new()),
        );
        assert!(populate_cdf(&dist).is_err());
    }

    #[test]
    fn sampling_respects_weights_and_skips_zeros() {
        let cdf = populate_cdf(&tiny_dist()).expect("positive mass");
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut counts = [0usize; 3];
        for _ in 0..4000 {
            let sampled = sample_from_cdf(&cdf, &mut rng);
            let index = cdf.hands.iter().position(|h| h == sampled).unwrap();
            counts[index] += 1;
        }
        assert_eq!(counts[2], 0, "zero-weight hand must never be drawn");
        assert!(counts[1] > 2 * counts[0], "3:1 weights should show in draws");
        assert_eq!(counts[0] + counts[1], 4000);
    }

    #[test]
    fn private_reweighting_drops_exhausted_hands() {
        // Public deck: one 5b, two 2r. Partner actually holds the 5b, so the
        // observer cannot.
        let mut deck = DeckComposition::empty();
        deck.add(Card::new(Color::Blue, Value::Five));
        deck.add(Card::new(Color::Red, Value::Two));
        deck.add(Card::new(Color::Red, Value::Two));

        let mut pdf = HandDistCdf {
            hands: vec![
                hand(&[(Color::Blue, Value::Five)]),
                hand(&[(Color::Red, Value::Two)]),
            ],
            probs: vec![1.0, 2.0],
        };
        let partner = hand(&[(Color::Blue, Value::Five)]);
        let alive = reweight_private(&mut pdf, &partner, &deck, 4);
        assert_eq!(alive, 1);
        assert_eq!(pdf.probs[0], 0.0);
        // two 2r remain of two: prior ratio 2/2 = 1
        assert!((pdf.probs[1] - 2.0).abs() < 1e-12);
    }
}
