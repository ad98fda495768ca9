//! Search for a babel box that swaps one of the sender's tokens for the fee
//!
//! Many wallets run this search at the same time against the same boxes.
//! Always taking the best priced box would make most of them race for one
//! input, so the choice is randomized over all boxes within a price window.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use wallet_core::{BabelFeeConfig, NanoErg, NodeError, TokenAmount, TokenId};

use crate::box_state::{BabelFeeBoxState, RawBabelBox};

/// Pages of unspent boxes sitting at the babel contract of a token
#[async_trait]
pub trait BabelBoxSource: Send + Sync {
    async fn babel_boxes(
        &self,
        token_id: &TokenId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawBabelBox>, NodeError>;
}

/// A token balance of the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldToken {
    pub token_id: TokenId,
    pub amount: u64,
    pub name: Option<String>,
    pub decimals: u8,
}

impl HeldToken {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.token_id.short().to_string())
    }
}

/// The swap chosen to pay the fee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BabelSwapData {
    pub token_to_swap: TokenAmount,
    pub babel_box: RawBabelBox,
    pub babel_amount_nano_erg: NanoErg,
    pub price_per_token: u64,
}

/// What the user could change to make a babel swap possible
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BabelHint {
    /// Sending less of the token would leave enough to pay the fee
    ReduceAmount {
        token_id: TokenId,
        name: String,
        needed: String,
    },
    /// The whole balance is not enough
    NeedAmount {
        token_id: TokenId,
        name: String,
        needed: String,
        balance: String,
    },
}

impl fmt::Display for BabelHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReduceAmount { name, needed, .. } => write!(
                f,
                "Send less {}: {} {} are needed to pay the fee",
                name, needed, name
            ),
            Self::NeedAmount {
                name,
                needed,
                balance,
                ..
            } => write!(
                f,
                "{} {} are needed to pay the fee, but only {} are held",
                needed, name, balance
            ),
        }
    }
}

fn describe_hints(hints: &[BabelHint]) -> String {
    if hints.is_empty() {
        return "No babel fee box found for any of your tokens".to_string();
    }
    let lines: Vec<String> = hints.iter().map(|h| format!("- {}", h)).collect();
    format!(
        "No usable babel fee box found. Possible options:\n{}",
        lines.join("\n")
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BabelFeeError {
    #[error("{}", describe_hints(.hints))]
    NoBoxFound { hints: Vec<BabelHint> },

    #[error("Fee amount must be positive")]
    InvalidFee,
}

impl BabelFeeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoBoxFound { .. } => "babel_box_not_found",
            Self::InvalidFee => "invalid_fee",
        }
    }
}

/// Format a raw token amount with its decimals, trailing zeros dropped
pub fn format_token_amount(raw: u64, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = format!("{:0>width$}", raw, width = decimals as usize + 1);
    let (int, frac) = digits.split_at(digits.len() - decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int.to_string()
    } else {
        format!("{}.{}", int, frac)
    }
}

/// A parsed babel box together with its raw data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BabelCandidate {
    pub state: BabelFeeBoxState,
    pub raw: RawBabelBox,
}

/// Token order for the search: tokens being sent first, with their summed
/// send amount, then all other held tokens shuffled
pub fn search_order<R: Rng + ?Sized>(
    tokens_to_send: &[TokenAmount],
    held: &[HeldToken],
    rng: &mut R,
) -> Vec<(TokenId, u64)> {
    let mut order: Vec<(TokenId, u64)> = Vec::new();
    for token in tokens_to_send {
        match order.iter_mut().find(|(id, _)| *id == token.token_id) {
            Some((_, amount)) => *amount = amount.saturating_add(token.amount),
            None => order.push((token.token_id.clone(), token.amount)),
        }
    }

    let mut others: Vec<(TokenId, u64)> = held
        .iter()
        .filter(|h| !order.iter().any(|(id, _)| *id == h.token_id))
        .map(|h| (h.token_id.clone(), 0))
        .collect();
    others.shuffle(rng);
    order.extend(others);
    order
}

/// Price acceptance factor in `[1.0, 2.0)`; 1.0 half of the time
pub fn draw_price_factor<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..2.0f64).max(1.0)
}

/// Sort by price, best first, and keep the boxes payable from `available`
/// when there are any. Returns whether the preferred subset was used.
pub fn rank_candidates(
    mut candidates: Vec<BabelCandidate>,
    fee: NanoErg,
    available: u64,
) -> (Vec<BabelCandidate>, bool) {
    candidates.sort_by(|a, b| b.state.price_per_token.cmp(&a.state.price_per_token));
    if available == 0 {
        return (candidates, false);
    }
    let preferred: Vec<BabelCandidate> = candidates
        .iter()
        .filter(|c| c.state.tokens_to_sell_for(fee) <= available)
        .cloned()
        .collect();
    if preferred.is_empty() {
        (candidates, false)
    } else {
        (preferred, true)
    }
}

/// Boxes of a best-first ranking priced at least `best / factor`
pub fn accepted_boxes(ranked: &[BabelCandidate], factor: f64) -> &[BabelCandidate] {
    let Some(best) = ranked.first() else {
        return ranked;
    };
    let best_price = best.state.price_per_token as f64;
    let count = ranked
        .iter()
        .take_while(|c| c.state.price_per_token as f64 * factor >= best_price)
        .count();
    &ranked[..count]
}

/// Finds babel boxes through a [`BabelBoxSource`]
pub struct BabelFeeFinder {
    source: Arc<dyn BabelBoxSource>,
    config: BabelFeeConfig,
}

impl BabelFeeFinder {
    pub fn new(source: Arc<dyn BabelBoxSource>, config: BabelFeeConfig) -> Self {
        Self { source, config }
    }

    /// Find a box paying `fee` nanoERG for one of the `held` tokens.
    ///
    /// `tokens_to_send` are the token amounts the transaction already moves;
    /// those tokens are tried first and only their remaining balance counts
    /// as available.
    pub async fn find_babel_box<R: Rng + Send + ?Sized>(
        &self,
        tokens_to_send: &[TokenAmount],
        held: &[HeldToken],
        fee: NanoErg,
        rng: &mut R,
    ) -> Result<BabelSwapData, BabelFeeError> {
        if fee == 0 {
            return Err(BabelFeeError::InvalidFee);
        }

        let mut hints = Vec::new();
        for (token_id, to_send) in search_order(tokens_to_send, held, rng) {
            let Some(holding) = held.iter().find(|h| h.token_id == token_id) else {
                continue;
            };
            if holding.amount <= 1 {
                tracing::debug!(token_id = %token_id, "Skipping token, balance too small for babel fee");
                continue;
            }
            let available = holding.amount.saturating_sub(to_send);

            tracing::debug!(
                token_id = %token_id,
                name = %holding.display_name(),
                available,
                "Checking for babel fee boxes"
            );
            let candidates = match self.load_candidates(&token_id, fee).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(token_id = %token_id, error = %e, "Failed to load babel boxes");
                    continue;
                }
            };
            if candidates.is_empty() {
                continue;
            }

            let total = candidates.len();
            let (ranked, preferred) = rank_candidates(candidates, fee, available);
            let factor = draw_price_factor(rng);
            let accepted = accepted_boxes(&ranked, factor);
            tracing::debug!(
                token_id = %token_id,
                total,
                preferred,
                accepted = accepted.len(),
                factor,
                "Babel boxes ranked"
            );

            let Some(chosen) = accepted.choose(rng) else {
                continue;
            };
            let needed = chosen.state.tokens_to_sell_for(fee);

            if needed <= available {
                tracing::info!(
                    token_id = %token_id,
                    box_id = %chosen.raw.box_id,
                    price = chosen.state.price_per_token,
                    needed,
                    "Babel fee box selected"
                );
                return Ok(BabelSwapData {
                    token_to_swap: TokenAmount::new(token_id, needed),
                    babel_box: chosen.raw.clone(),
                    babel_amount_nano_erg: fee,
                    price_per_token: chosen.state.price_per_token,
                });
            }

            let name = holding.display_name();
            let needed_fmt = format_token_amount(needed, holding.decimals);
            hints.push(if needed <= holding.amount {
                BabelHint::ReduceAmount {
                    token_id,
                    name,
                    needed: needed_fmt,
                }
            } else {
                BabelHint::NeedAmount {
                    token_id,
                    name,
                    needed: needed_fmt,
                    balance: format_token_amount(holding.amount, holding.decimals),
                }
            });
        }

        Err(BabelFeeError::NoBoxFound { hints })
    }

    /// Page through the babel contract of `token_id`, keeping boxes that can
    /// pay `fee`. Stops at an empty or short page, after `max_price_pages`
    /// once something usable was found, and always after `max_pages`.
    async fn load_candidates(
        &self,
        token_id: &TokenId,
        fee: NanoErg,
    ) -> Result<Vec<BabelCandidate>, NodeError> {
        let page_size = self.config.page_size.max(1);
        let mut found = Vec::new();
        let mut page: u32 = 0;

        while page < self.config.max_pages {
            if !found.is_empty() && page >= self.config.max_price_pages {
                break;
            }

            let boxes = self
                .source
                .babel_boxes(token_id, u64::from(page) * page_size, page_size)
                .await?;
            let last_page = (boxes.len() as u64) < page_size;

            for raw in boxes {
                match BabelFeeBoxState::parse(&raw, token_id) {
                    Ok(state) if state.value_available_to_buy >= fee => {
                        found.push(BabelCandidate { state, raw })
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(box_id = %raw.box_id, error = %e, "Skipping unparseable babel box");
                    }
                }
            }

            page += 1;
            if last_page {
                break;
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use wallet_core::BoxId;

    const FEE: NanoErg = 1_100_000;

    fn token(n: u8) -> TokenId {
        TokenId::new(format!("{:02x}", n).repeat(32))
    }

    fn held(n: u8, amount: u64) -> HeldToken {
        HeldToken {
            token_id: token(n),
            amount,
            name: Some(format!("T{}", n)),
            decimals: 0,
        }
    }

    fn babel_box(n: u8, id: &str, price: i64, value: NanoErg) -> RawBabelBox {
        RawBabelBox {
            box_id: BoxId::new(id),
            value,
            price_register: Some(price),
            tokens: vec![TokenAmount::new(token(n), 10)],
            bytes: vec![],
        }
    }

    fn candidate(id: &str, price: u64) -> BabelCandidate {
        BabelCandidate {
            state: BabelFeeBoxState {
                token_id: token(1),
                price_per_token: price,
                value_available_to_buy: 10 * FEE,
            },
            raw: babel_box(1, id, price as i64, 11 * FEE),
        }
    }

    #[derive(Default)]
    struct FakeSource {
        boxes: HashMap<TokenId, Vec<RawBabelBox>>,
        failing: HashSet<TokenId>,
        /// Every page is full of unusable boxes, forever
        endless_junk: bool,
        queries: Mutex<Vec<(TokenId, u64)>>,
    }

    #[async_trait]
    impl BabelBoxSource for FakeSource {
        async fn babel_boxes(
            &self,
            token_id: &TokenId,
            offset: u64,
            limit: u64,
        ) -> Result<Vec<RawBabelBox>, NodeError> {
            self.queries
                .lock()
                .unwrap()
                .push((token_id.clone(), offset));
            if self.failing.contains(token_id) {
                return Err(NodeError::Unreachable {
                    url: "http://node".into(),
                });
            }
            if self.endless_junk {
                return Ok((0..limit)
                    .map(|i| RawBabelBox {
                        box_id: BoxId::new(format!("junk{}", offset + i)),
                        value: 500,
                        price_register: None,
                        tokens: vec![],
                        bytes: vec![],
                    })
                    .collect());
            }
            let all = self.boxes.get(token_id).cloned().unwrap_or_default();
            Ok(all
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }
    }

    fn finder(source: FakeSource, config: BabelFeeConfig) -> (BabelFeeFinder, Arc<FakeSource>) {
        let source = Arc::new(source);
        (BabelFeeFinder::new(source.clone(), config), source)
    }

    fn config(page_size: u64) -> BabelFeeConfig {
        BabelFeeConfig {
            page_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_price_window_by_factor() {
        let ranked = vec![candidate("a", 100), candidate("b", 90)];
        assert_eq!(accepted_boxes(&ranked, 1.0).len(), 1);
        assert_eq!(accepted_boxes(&ranked, 1.0)[0].raw.box_id.as_str(), "a");
        assert_eq!(accepted_boxes(&ranked, 2.0).len(), 2);
        assert!(accepted_boxes(&[], 1.5).is_empty());
    }

    #[test]
    fn test_price_window_fractional_factor() {
        // 100 / 1.5 = 66.67, so 66 falls outside and 67 inside
        let ranked = vec![candidate("a", 100), candidate("b", 66)];
        let accepted = accepted_boxes(&ranked, 1.5);
        assert_eq!(accepted.len(), 1);
        assert!(accepted
            .iter()
            .all(|c| c.state.price_per_token as f64 >= 100.0 / 1.5));

        let ranked = vec![candidate("a", 100), candidate("b", 67)];
        assert_eq!(accepted_boxes(&ranked, 1.5).len(), 2);
    }

    #[test]
    fn test_factor_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let f = draw_price_factor(&mut rng);
            assert!((1.0..2.0).contains(&f));
        }
    }

    #[test]
    fn test_rank_prefers_affordable_boxes() {
        // fee 1_100_000 needs 11_000 tokens at 100, 110_000 tokens at 10
        let candidates = vec![candidate("cheap", 10), candidate("best", 100)];
        let (ranked, preferred) = rank_candidates(candidates.clone(), FEE, 20_000);
        assert!(preferred);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].raw.box_id.as_str(), "best");

        let (ranked, preferred) = rank_candidates(candidates.clone(), FEE, 5);
        assert!(!preferred);
        assert_eq!(ranked[0].raw.box_id.as_str(), "best");
        assert_eq!(ranked.len(), 2);

        let (_, preferred) = rank_candidates(candidates, FEE, 0);
        assert!(!preferred);
    }

    #[test]
    fn test_search_order_puts_sent_tokens_first() {
        let mut rng = StdRng::seed_from_u64(1);
        let sending = vec![
            TokenAmount::new(token(3), 5),
            TokenAmount::new(token(3), 7),
        ];
        let held = vec![held(1, 10), held(2, 10), held(3, 100), held(4, 10)];
        let order = search_order(&sending, &held, &mut rng);

        assert_eq!(order[0], (token(3), 12));
        assert_eq!(order.len(), 4);
        let rest: HashSet<TokenId> = order[1..].iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(rest, [token(1), token(2), token(4)].into_iter().collect());
        assert!(order[1..].iter().all(|(_, amount)| *amount == 0));
    }

    #[test]
    fn test_format_token_amount() {
        assert_eq!(format_token_amount(12345, 0), "12345");
        assert_eq!(format_token_amount(12345, 2), "123.45");
        assert_eq!(format_token_amount(12300, 2), "123");
        assert_eq!(format_token_amount(5, 3), "0.005");
    }

    #[tokio::test]
    async fn test_singleton_always_chosen() {
        let mut boxes = HashMap::new();
        boxes.insert(token(1), vec![babel_box(1, "only", 100, 20 * FEE)]);
        let (finder, _) = finder(
            FakeSource {
                boxes,
                ..Default::default()
            },
            config(50),
        );

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let swap = finder
                .find_babel_box(&[], &[held(1, 1_000_000)], FEE, &mut rng)
                .await
                .unwrap();
            assert_eq!(swap.babel_box.box_id.as_str(), "only");
            assert_eq!(swap.token_to_swap, TokenAmount::new(token(1), 11_000));
            assert_eq!(swap.babel_amount_nano_erg, FEE);
        }
    }

    #[tokio::test]
    async fn test_chosen_price_within_window() {
        let mut boxes = HashMap::new();
        boxes.insert(
            token(1),
            vec![
                babel_box(1, "p40", 40, 20 * FEE),
                babel_box(1, "p100", 100, 20 * FEE),
                babel_box(1, "p10", 10, 20 * FEE),
                babel_box(1, "p90", 90, 20 * FEE),
                babel_box(1, "p60", 60, 20 * FEE),
            ],
        );
        let (finder, _) = finder(
            FakeSource {
                boxes,
                ..Default::default()
            },
            config(50),
        );

        let mut seen = HashSet::new();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let swap = finder
                .find_babel_box(&[], &[held(1, u64::MAX / 2)], FEE, &mut rng)
                .await
                .unwrap();
            assert!(swap.price_per_token > 50 && swap.price_per_token <= 100);
            seen.insert(swap.price_per_token);
        }
        assert!(seen.contains(&100));
        assert!(seen.len() > 1);
    }

    #[tokio::test]
    async fn test_small_boxes_filtered() {
        let mut boxes = HashMap::new();
        boxes.insert(
            token(1),
            vec![
                babel_box(1, "tiny", 1000, FEE),
                babel_box(1, "ok", 10, FEE + 1_000_000),
            ],
        );
        let (finder, _) = finder(
            FakeSource {
                boxes,
                ..Default::default()
            },
            config(50),
        );
        let mut rng = StdRng::seed_from_u64(3);
        let swap = finder
            .find_babel_box(&[], &[held(1, 1_000_000)], FEE, &mut rng)
            .await
            .unwrap();
        assert_eq!(swap.babel_box.box_id.as_str(), "ok");
    }

    #[tokio::test]
    async fn test_nft_never_used() {
        let mut boxes = HashMap::new();
        boxes.insert(token(1), vec![babel_box(1, "nft-box", 1, 20 * FEE)]);
        let (finder, source) = finder(
            FakeSource {
                boxes,
                ..Default::default()
            },
            config(50),
        );
        let mut rng = StdRng::seed_from_u64(0);
        let err = finder
            .find_babel_box(&[], &[held(1, 1)], FEE, &mut rng)
            .await
            .unwrap_err();
        assert_eq!(err, BabelFeeError::NoBoxFound { hints: vec![] });
        assert!(source.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_endless_junk_terminates() {
        let (finder, source) = finder(
            FakeSource {
                endless_junk: true,
                ..Default::default()
            },
            BabelFeeConfig {
                page_size: 10,
                max_price_pages: 2,
                max_pages: 7,
                contract_template: None,
            },
        );
        let mut rng = StdRng::seed_from_u64(0);
        let err = finder
            .find_babel_box(&[], &[held(1, 100), held(2, 100)], FEE, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, BabelFeeError::NoBoxFound { .. }));
        assert_eq!(source.queries.lock().unwrap().len(), 14);
    }

    #[tokio::test]
    async fn test_price_search_stops_after_match() {
        let boxes: Vec<RawBabelBox> = (0..100)
            .map(|i| babel_box(1, &format!("b{}", i), 10 + i, 20 * FEE))
            .collect();
        let mut map = HashMap::new();
        map.insert(token(1), boxes);
        let (finder, source) = finder(
            FakeSource {
                boxes: map,
                ..Default::default()
            },
            BabelFeeConfig {
                page_size: 10,
                max_price_pages: 3,
                max_pages: 20,
                contract_template: None,
            },
        );
        let mut rng = StdRng::seed_from_u64(0);
        finder
            .find_babel_box(&[], &[held(1, 1_000_000)], FEE, &mut rng)
            .await
            .unwrap();
        let offsets: Vec<u64> = source
            .queries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, offset)| *offset)
            .collect();
        assert_eq!(offsets, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_failed_token_query_moves_on() {
        let mut boxes = HashMap::new();
        boxes.insert(token(2), vec![babel_box(2, "two", 100, 20 * FEE)]);
        let (finder, _) = finder(
            FakeSource {
                boxes,
                failing: [token(1)].into_iter().collect(),
                ..Default::default()
            },
            config(50),
        );
        let mut rng = StdRng::seed_from_u64(0);
        let swap = finder
            .find_babel_box(
                &[TokenAmount::new(token(1), 1)],
                &[held(1, 1_000_000), held(2, 1_000_000)],
                FEE,
                &mut rng,
            )
            .await
            .unwrap();
        assert_eq!(swap.token_to_swap.token_id, token(2));
    }

    #[tokio::test]
    async fn test_hints_when_balance_is_committed_or_short() {
        // 11_000 tokens needed at price 100
        let mut boxes = HashMap::new();
        boxes.insert(token(1), vec![babel_box(1, "one", 100, 20 * FEE)]);
        boxes.insert(token(2), vec![babel_box(2, "two", 100, 20 * FEE)]);
        let (finder, _) = finder(
            FakeSource {
                boxes,
                ..Default::default()
            },
            config(50),
        );
        let mut rng = StdRng::seed_from_u64(9);
        let err = finder
            .find_babel_box(
                &[TokenAmount::new(token(1), 15_000)],
                &[held(1, 20_000), held(2, 5_000)],
                FEE,
                &mut rng,
            )
            .await
            .unwrap_err();

        let BabelFeeError::NoBoxFound { hints } = &err else {
            panic!("unexpected error {:?}", err);
        };
        assert_eq!(
            hints[0],
            BabelHint::ReduceAmount {
                token_id: token(1),
                name: "T1".into(),
                needed: "11000".into(),
            }
        );
        assert_eq!(
            hints[1],
            BabelHint::NeedAmount {
                token_id: token(2),
                name: "T2".into(),
                needed: "11000".into(),
                balance: "5000".into(),
            }
        );
        assert!(err.to_string().contains("Send less T1"));
    }
}
