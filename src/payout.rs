use crate::api::{Amount, UserPubKey};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub participant: UserPubKey,
    pub amount: Amount,
}

/// `floor(total_pool * stake / winning_pool)`.
///
/// The product is taken in 128 bits so it can't overflow, and flooring means
/// the payouts of one prediction never add up to more than `total_pool`. The
/// remainder stays with the ledger.
pub fn calculate_payout(stake: Amount, winning_pool: Amount, total_pool: Amount) -> Amount {
    if winning_pool == 0 {
        return 0;
    }
    let share = u128::from(total_pool) * u128::from(stake) / u128::from(winning_pool);
    // stake <= winning_pool, so share <= total_pool
    Amount::try_from(share).unwrap_or(total_pool).min(total_pool)
}

/// Payout multiplier `total_pool / pool` rounded to four places.
pub fn calculate_odds(pool: Amount, total_pool: Amount) -> Option<Decimal> {
    if pool == 0 {
        return None;
    }
    Some((Decimal::from(total_pool) / Decimal::from(pool)).round_dp(4))
}

/// Lazily yields one payout per winning stake. Zero stakes are skipped.
#[derive(Debug, Clone)]
pub struct PayoutSchedule<I> {
    stakes: I,
    winning_pool: Amount,
    total_pool: Amount,
}
impl<I> PayoutSchedule<I>
where
    I: Iterator<Item = (UserPubKey, Amount)>,
{
    pub fn new(
        stakes: impl IntoIterator<IntoIter = I, Item = (UserPubKey, Amount)>,
        winning_pool: Amount,
        total_pool: Amount,
    ) -> Self {
        Self {
            stakes: stakes.into_iter(),
            winning_pool,
            total_pool,
        }
    }
}
impl<I> Iterator for PayoutSchedule<I>
where
    I: Iterator<Item = (UserPubKey, Amount)>,
{
    type Item = Payout;

    fn next(&mut self) -> Option<Payout> {
        if self.winning_pool == 0 {
            return None;
        }
        for (participant, stake) in self.stakes.by_ref() {
            if stake == 0 {
                continue;
            }
            return Some(Payout {
                participant,
                amount: calculate_payout(stake, self.winning_pool, self.total_pool),
            });
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;
    use secp256k1::{generate_keypair, rand};

    const ETHER: Amount = 1_000_000_000_000_000_000;

    #[test]
    fn single_winner_takes_the_pool() {
        // A:1 (user1), B:2 (user2), B:3 (user3)
        assert_eq!(calculate_payout(1, 1, 6), 6);
    }

    #[test]
    fn winners_share_in_proportion() {
        assert_eq!(calculate_payout(2, 5, 6), 2);
        assert_eq!(calculate_payout(3, 5, 6), 3);
        // in 18 decimal units user2 gets 40% and user3 60% of the pool
        assert_eq!(calculate_payout(2 * ETHER, 5 * ETHER, 6 * ETHER), 2_400_000_000_000_000_000);
        assert_eq!(calculate_payout(3 * ETHER, 5 * ETHER, 6 * ETHER), 3_600_000_000_000_000_000);
    }

    #[test]
    fn large_amounts_do_not_overflow() {
        let total = Amount::MAX;
        assert_eq!(calculate_payout(Amount::MAX, Amount::MAX, total), total);
        assert_eq!(calculate_payout(1, 2, total), total / 2);
    }

    #[test]
    fn nobody_on_the_winning_side_pays_nothing() {
        assert_eq!(calculate_payout(0, 0, 100), 0);
        let (_, u1) = generate_keypair(&mut rand::thread_rng());
        assert_eq!(PayoutSchedule::new(vec![(u1, 0)], 0, 100).count(), 0);
    }

    #[test]
    fn schedule_pays_each_winner_once_and_never_more_than_the_pool() {
        let stakes: Vec<(UserPubKey, Amount)> = [7, 0, 13, 1, 29]
            .into_iter()
            .map(|stake| (generate_keypair(&mut rand::thread_rng()).1, stake))
            .collect();
        let winning_pool: Amount = stakes.iter().map(|(_, stake)| stake).sum();
        let total_pool = winning_pool + 1_003;

        let payouts: Vec<Payout> =
            PayoutSchedule::new(stakes.clone(), winning_pool, total_pool).collect();
        assert_eq!(payouts.len(), 4);
        for payout in &payouts {
            let (_, stake) = stakes
                .iter()
                .find(|(user, _)| *user == payout.participant)
                .unwrap();
            assert_eq!(
                payout.amount,
                (total_pool as u128 * *stake as u128 / winning_pool as u128) as Amount
            );
        }
        let paid: Amount = payouts.iter().map(|payout| payout.amount).sum();
        assert!(paid <= total_pool);
        assert!(total_pool - paid < payouts.len() as Amount);
    }

    #[test]
    fn odds() {
        assert_eq!(calculate_odds(1, 6), Some(dec!(6)));
        assert_eq!(calculate_odds(5, 6), Some(dec!(1.2)));
        assert_eq!(calculate_odds(3, 10), Some(dec!(3.3333)));
        assert_eq!(calculate_odds(0, 6), None);
    }
}
