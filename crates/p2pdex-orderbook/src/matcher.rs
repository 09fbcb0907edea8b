//! Scan-and-reserve matcher.
//!
//! Pairs a tick against the opposite side of the book in price-time
//! priority and reserves the matched quantity on both ticks and on the
//! local order before moving to the next candidate:
//!
//! ```text
//! match_tick(book, orders, tick, now) -> Vec<Match>
//! ```
//!
//! The whole scan runs under `&mut OrderBook`, so no other match attempt
//! can observe a half-reserved tick.
//!
//! ## Locality
//!
//! Only pairs with exactly one local side are matched: the node proposes
//! trades for its own orders against peers' ticks. Own-vs-own pairs (self
//! trade) and peer-vs-peer pairs are skipped. The matched price is always
//! the resting candidate's price.

use p2pdex_types::{OrderId, OrderSide, Price, Quantity, Result, Tick, Timestamp};

use crate::OrderBook;

/// The local order store as the matcher sees it.
///
/// Implemented by the node's order manager so the matcher can reserve on
/// the underlying order in the same critical section as the tick.
pub trait LocalOrders {
    /// Whether `order_id` is one of the local trader's orders.
    fn is_local(&self, order_id: &OrderId) -> bool;

    /// Reserve `quantity` on a local order. A failure makes the matcher skip
    /// the candidate.
    fn reserve(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()>;
}

/// One reserved pairing of a local order with a peer's tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub local_order_id: OrderId,
    pub local_side: OrderSide,
    pub remote_order_id: OrderId,
    /// The resting (candidate) tick's price.
    pub price: Price,
    pub quantity: Quantity,
}

/// Match the tick for `order_id` against the opposite side of the book.
///
/// Candidates are scanned best price first, earliest timestamp first within
/// a price. Each compatible candidate is reserved for
/// `min(remaining(tick), remaining(candidate))` until the tick is exhausted.
/// A candidate whose reservation fails is rolled back and skipped.
pub fn match_tick<L: LocalOrders>(
    book: &mut OrderBook,
    orders: &mut L,
    order_id: &OrderId,
    now: Timestamp,
) -> Vec<Match> {
    let Some(tick) = book.get(order_id) else {
        return Vec::new();
    };
    if !tick.is_valid(now) {
        return Vec::new();
    }
    let side = tick.side();
    let limit = tick.price();
    let tick_is_local = orders.is_local(order_id);

    // Snapshot the candidates in priority order; reservations below only
    // shrink their remaining quantity.
    let candidates: Vec<(OrderId, Price)> = book
        .ticks(side.opposite())
        .take_while(|c| side.accepts(limit, c.price()))
        .filter(|c| c.is_valid(now))
        .filter(|c| c.order_id().trader_id != order_id.trader_id)
        .filter(|c| orders.is_local(&c.order_id()) != tick_is_local)
        .map(|c| (c.order_id(), c.price()))
        .collect();

    let mut matches = Vec::new();
    for (candidate_id, price) in candidates {
        let own_remaining = match book.get(order_id) {
            Some(t) => t.remaining(),
            None => break,
        };
        if own_remaining.is_zero() {
            break;
        }
        let Some(candidate_remaining) = book.get(&candidate_id).map(|c| c.remaining()) else {
            continue;
        };
        let quantity = own_remaining.min(candidate_remaining);
        if quantity.is_zero() {
            continue;
        }

        let (local_order_id, remote_order_id) = if tick_is_local {
            (*order_id, candidate_id)
        } else {
            (candidate_id, *order_id)
        };

        if let Err(e) = reserve_pair(book, orders, local_order_id, remote_order_id, quantity) {
            tracing::debug!(
                local = %local_order_id,
                remote = %remote_order_id,
                qty = %quantity,
                error = %e,
                "Candidate skipped: reservation failed"
            );
            continue;
        }

        tracing::debug!(
            local = %local_order_id,
            remote = %remote_order_id,
            price = %price,
            qty = %quantity,
            "Matched and reserved"
        );
        matches.push(Match {
            local_order_id,
            local_side: if tick_is_local { side } else { side.opposite() },
            remote_order_id,
            price,
            quantity,
        });
    }
    matches
}

/// Run [`match_tick`] for every valid local tick, best first on each side.
pub fn match_all<L: LocalOrders>(
    book: &mut OrderBook,
    orders: &mut L,
    now: Timestamp,
) -> Vec<Match> {
    let local: Vec<OrderId> = book
        .ticks(OrderSide::Bid)
        .chain(book.ticks(OrderSide::Ask))
        .filter(|t| t.is_valid(now) && orders.is_local(&t.order_id()))
        .map(Tick::order_id)
        .collect();

    local
        .iter()
        .flat_map(|id| match_tick(book, orders, id, now))
        .collect()
}

/// Reserve `quantity` on both ticks and the local order, or on none.
fn reserve_pair<L: LocalOrders>(
    book: &mut OrderBook,
    orders: &mut L,
    local: OrderId,
    remote: OrderId,
    quantity: Quantity,
) -> Result<()> {
    book.reserve(&local, quantity)?;
    if let Err(e) = book.reserve(&remote, quantity) {
        roll_back(book, &local, quantity);
        return Err(e);
    }
    if let Err(e) = orders.reserve(&local, quantity) {
        roll_back(book, &remote, quantity);
        roll_back(book, &local, quantity);
        return Err(e);
    }
    Ok(())
}

/// Undo a tick reservation made earlier in the same scan. It cannot fail
/// unless the book's accounting is already broken.
fn roll_back(book: &mut OrderBook, order_id: &OrderId, quantity: Quantity) {
    let undone = book.release(order_id, quantity);
    if let Err(e) = &undone {
        tracing::error!(order = %order_id, qty = %quantity, error = %e, "Matcher rollback failed");
    }
    debug_assert!(undone.is_ok(), "rollback of {order_id} failed");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use p2pdex_types::*;
    use proptest::prelude::*;

    use super::*;

    /// Orders owned by one trader, with real reservation accounting.
    struct Locals {
        trader: TraderId,
        orders: HashMap<OrderId, Order>,
        fail_reserve: bool,
    }

    impl Locals {
        fn new() -> Self {
            Self {
                trader: TraderId::random(),
                orders: HashMap::new(),
                fail_reserve: false,
            }
        }

        fn place(&mut self, n: u64, side: OrderSide, price_mil: i64, qty_mil: i64) -> Tick {
            let id = OrderId::new(self.trader, OrderNumber(n));
            let order = Order::dummy_for(id, side, price_mil, qty_mil);
            let tick = Tick::from_order(&order);
            self.orders.insert(id, order);
            tick
        }
    }

    impl LocalOrders for Locals {
        fn is_local(&self, order_id: &OrderId) -> bool {
            self.orders.contains_key(order_id)
        }

        fn reserve(&mut self, order_id: &OrderId, quantity: Quantity) -> Result<()> {
            if self.fail_reserve {
                return Err(DexError::OrderNotValid(*order_id));
            }
            self.orders
                .get_mut(order_id)
                .ok_or(DexError::OrderNotFound(*order_id))?
                .reserve_quantity(quantity)
        }
    }

    fn q(mil: i64) -> Quantity {
        Quantity::from_mil(mil).unwrap()
    }

    fn peer_tick(side: OrderSide, price_mil: i64, timeout: Timeout, at: Timestamp) -> Tick {
        Tick::new(
            OrderId::new(TraderId::random(), OrderNumber(1)),
            side,
            Price::from_mil(price_mil).unwrap(),
            q(5_000),
            timeout,
            at,
        )
    }

    #[test]
    fn ask_then_bid_matches_at_resting_price() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();

        // A peer's ask rests; our bid arrives.
        let ask = Tick::dummy(OrderSide::Ask, 10_000, 5_000);
        let ask_id = ask.order_id();
        book.insert(ask);
        let bid = locals.place(1, OrderSide::Bid, 12_000, 3_000);
        let bid_id = bid.order_id();
        book.insert(bid);

        let matches = match_tick(&mut book, &mut locals, &bid_id, Timestamp::now());
        assert_eq!(matches.len(), 1);
        let m = matches[0];
        assert_eq!(m.quantity, q(3_000));
        assert_eq!(m.price.mil(), 10_000);
        assert_eq!(m.local_order_id, bid_id);
        assert_eq!(m.remote_order_id, ask_id);
        assert_eq!(book.get(&ask_id).unwrap().remaining(), q(2_000));
        assert!(book.get(&bid_id).unwrap().is_reserved());
        assert_eq!(locals.orders[&bid_id].reserved_quantity(), q(3_000));
    }

    #[test]
    fn remote_tick_against_local_resting_order() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let ask = locals.place(1, OrderSide::Ask, 10_000, 5_000);
        let ask_id = ask.order_id();
        book.insert(ask);

        let bid = Tick::dummy(OrderSide::Bid, 12_000, 3_000);
        let bid_id = bid.order_id();
        book.insert(bid);

        let matches = match_tick(&mut book, &mut locals, &bid_id, Timestamp::now());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].local_order_id, ask_id);
        assert_eq!(matches[0].local_side, OrderSide::Ask);
        assert_eq!(matches[0].price.mil(), 10_000);
        assert_eq!(locals.orders[&ask_id].available_quantity(), q(2_000));
    }

    #[test]
    fn no_candidates_tick_rests() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let bid = locals.place(1, OrderSide::Bid, 9_000, 3_000);
        let bid_id = bid.order_id();
        book.insert(bid);
        book.insert(Tick::dummy(OrderSide::Ask, 10_000, 5_000));

        assert!(match_tick(&mut book, &mut locals, &bid_id, Timestamp::now()).is_empty());
        assert!(book.get(&bid_id).unwrap().is_valid(Timestamp::now()));
    }

    #[test]
    fn equal_price_is_compatible() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        book.insert(Tick::dummy(OrderSide::Ask, 10_000, 1_000));
        let bid = locals.place(1, OrderSide::Bid, 10_000, 1_000);
        let bid_id = bid.order_id();
        book.insert(bid);

        let matches = match_tick(&mut book, &mut locals, &bid_id, Timestamp::now());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].quantity, q(1_000));
    }

    #[test]
    fn walks_candidates_best_price_first() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let cheap = Tick::dummy(OrderSide::Ask, 9_000, 1_000);
        let cheap_id = cheap.order_id();
        let dear = Tick::dummy(OrderSide::Ask, 10_000, 5_000);
        let dear_id = dear.order_id();
        book.insert(dear);
        book.insert(cheap);
        book.insert(Tick::dummy(OrderSide::Ask, 13_000, 5_000));

        let bid = locals.place(1, OrderSide::Bid, 12_000, 3_000);
        let bid_id = bid.order_id();
        book.insert(bid);

        let matches = match_tick(&mut book, &mut locals, &bid_id, Timestamp::now());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].remote_order_id, cheap_id);
        assert_eq!(matches[0].quantity, q(1_000));
        assert_eq!(matches[1].remote_order_id, dear_id);
        assert_eq!(matches[1].quantity, q(2_000));
    }

    #[test]
    fn ties_broken_by_timestamp() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let now = Timestamp::now();
        let late = peer_tick(OrderSide::Ask, 10_000, Timeout::from_secs(3600), now);
        let early = peer_tick(
            OrderSide::Ask,
            10_000,
            Timeout::from_secs(3600),
            Timestamp::from_millis(now.as_millis() - 10),
        );
        let early_id = early.order_id();
        book.insert(late);
        book.insert(early);

        let bid = locals.place(1, OrderSide::Bid, 10_000, 1_000);
        let bid_id = bid.order_id();
        book.insert(bid);

        let matches = match_tick(&mut book, &mut locals, &bid_id, Timestamp::now());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].remote_order_id, early_id);
    }

    #[test]
    fn self_trade_and_peer_pairs_skipped() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        // Own ask and own bid cross: never matched.
        book.insert(locals.place(1, OrderSide::Ask, 10_000, 1_000));
        let bid = locals.place(2, OrderSide::Bid, 12_000, 1_000);
        let bid_id = bid.order_id();
        book.insert(bid);
        assert!(match_tick(&mut book, &mut locals, &bid_id, Timestamp::now()).is_empty());

        // Two peers cross: not ours to propose.
        book.insert(Tick::dummy(OrderSide::Ask, 20_000, 1_000));
        let peer_bid = Tick::dummy(OrderSide::Bid, 25_000, 1_000);
        let peer_bid_id = peer_bid.order_id();
        book.insert(peer_bid);
        assert!(match_tick(&mut book, &mut locals, &peer_bid_id, Timestamp::now()).is_empty());
    }

    #[test]
    fn failed_local_reservation_rolls_back_and_skips() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let ask = Tick::dummy(OrderSide::Ask, 10_000, 5_000);
        let ask_id = ask.order_id();
        book.insert(ask);
        let bid = locals.place(1, OrderSide::Bid, 12_000, 3_000);
        let bid_id = bid.order_id();
        book.insert(bid);

        locals.fail_reserve = true;
        assert!(match_tick(&mut book, &mut locals, &bid_id, Timestamp::now()).is_empty());
        assert_eq!(book.get(&ask_id).unwrap().reserved_quantity(), Quantity::ZERO);
        assert_eq!(book.get(&bid_id).unwrap().reserved_quantity(), Quantity::ZERO);
    }

    #[test]
    fn expired_candidates_ignored() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let stale = peer_tick(OrderSide::Ask, 10_000, Timeout::IMMEDIATE, Timestamp::now());
        book.insert(stale);
        let bid = locals.place(1, OrderSide::Bid, 12_000, 3_000);
        let bid_id = bid.order_id();
        book.insert(bid);
        assert!(match_tick(&mut book, &mut locals, &bid_id, Timestamp::now()).is_empty());
    }

    #[test]
    fn contested_remainder_reserved_once() {
        let mut book = OrderBook::new();
        let mut locals = Locals::new();
        let ask = Tick::dummy(OrderSide::Ask, 10_000, 4_000);
        let ask_id = ask.order_id();
        book.insert(ask);
        let b1 = locals.place(1, OrderSide::Bid, 12_000, 3_000);
        let b1_id = b1.order_id();
        let b2 = locals.place(2, OrderSide::Bid, 12_000, 3_000);
        let b2_id = b2.order_id();
        book.insert(b1);
        book.insert(b2);

        let now = Timestamp::now();
        let first = match_tick(&mut book, &mut locals, &b1_id, now);
        let second = match_tick(&mut book, &mut locals, &b2_id, now);
        assert_eq!(first[0].quantity, q(3_000));
        assert_eq!(second[0].quantity, q(1_000));
        assert!(book.get(&ask_id).unwrap().is_reserved());
        assert!(match_all(&mut book, &mut locals, now).is_empty());
    }

    proptest! {
        #[test]
        fn never_crosses_and_never_oversells(
            asks in proptest::collection::vec((1i64..50, 1i64..20), 1..8),
            bid_price in 1i64..50,
            bid_qty in 1i64..60,
        ) {
            let mut book = OrderBook::new();
            let mut locals = Locals::new();
            let mut ask_qty = HashMap::new();
            for (price, qty) in &asks {
                let tick = Tick::dummy(OrderSide::Ask, price * 1_000, qty * 1_000);
                ask_qty.insert(tick.order_id(), (price * 1_000, q(qty * 1_000)));
                book.insert(tick);
            }
            let bid = locals.place(1, OrderSide::Bid, bid_price * 1_000, bid_qty * 1_000);
            let bid_id = bid.order_id();
            book.insert(bid);

            let matches = match_tick(&mut book, &mut locals, &bid_id, Timestamp::now());
            let mut total = Quantity::ZERO;
            for m in &matches {
                let (ask_price, qty) = ask_qty[&m.remote_order_id];
                prop_assert!(ask_price <= bid_price * 1_000);
                prop_assert_eq!(m.price.mil(), ask_price);
                prop_assert!(m.quantity <= qty);
                total = total.checked_add(m.quantity).unwrap();
            }
            prop_assert!(total <= q(bid_qty * 1_000));
            prop_assert_eq!(locals.orders[&bid_id].reserved_quantity(), total);
        }
    }
}
