//! End-to-end tests: several nodes over an in-memory overlay.
//!
//! Every message goes through the wire codec on its way between nodes, and
//! all nodes share one manually driven clock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use p2pdex_node::{Clock, ManualClock, MarketNode, NegotiationState, Transport};
use p2pdex_settlement::TransactionState;
use p2pdex_types::*;

struct Envelope {
    from: TraderId,
    to: Option<TraderId>,
    payload: Vec<u8>,
}

type Wire = Arc<Mutex<VecDeque<Envelope>>>;

struct HubTransport {
    me: TraderId,
    wire: Wire,
}

impl Transport for HubTransport {
    fn send(&self, to: &TraderId, payload: Vec<u8>) {
        self.wire.lock().push_back(Envelope {
            from: self.me,
            to: Some(*to),
            payload,
        });
    }

    fn broadcast(&self, payload: Vec<u8>) {
        self.wire.lock().push_back(Envelope {
            from: self.me,
            to: None,
            payload,
        });
    }
}

type Node = MarketNode<HubTransport, Arc<ManualClock>>;

/// Nodes `1..=n`, trader IDs `[i; 32]`.
struct Cluster {
    clock: Arc<ManualClock>,
    wire: Wire,
    nodes: Vec<Arc<Node>>,
}

impl Cluster {
    fn new(n: u8) -> Self {
        Self::with_config(n, |_| {})
    }

    fn with_config(n: u8, tweak: impl Fn(&mut NodeConfig)) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000_000)));
        let wire: Wire = Arc::default();
        let nodes = (1..=n)
            .map(|i| {
                let mut config = NodeConfig::new(TraderId([i; 32]));
                tweak(&mut config);
                let transport = HubTransport {
                    me: config.trader,
                    wire: Arc::clone(&wire),
                };
                Arc::new(MarketNode::new(&config, transport, Arc::clone(&clock)).unwrap())
            })
            .collect();
        Self { clock, wire, nodes }
    }

    fn node(&self, i: usize) -> &Arc<Node> {
        &self.nodes[i]
    }

    /// Deliver one envelope. Returns `false` once the wire is empty.
    fn step(&self) -> bool {
        let Some(env) = self.wire.lock().pop_front() else {
            return false;
        };
        for node in &self.nodes {
            let me = node.trader();
            if me == env.from || env.to.is_some_and(|to| to != me) {
                continue;
            }
            let _ = node.on_receive(&env.payload);
        }
        true
    }

    fn pump(&self) {
        for _ in 0..10_000 {
            if !self.step() {
                return;
            }
        }
        panic!("overlay did not go quiet");
    }

    /// The overlay loses every gossip message in flight.
    fn drop_gossip(&self) {
        self.wire.lock().retain(|env| env.to.is_some());
    }

    fn in_flight(&self) -> Vec<Message> {
        self.wire
            .lock()
            .iter()
            .map(|env| p2pdex_wire::decode(&env.payload).unwrap())
            .collect()
    }

    fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    fn verify_all(&self) {
        for node in &self.nodes {
            node.verify_reservations().unwrap();
        }
    }
}

fn p(mil: i64) -> Price {
    Price::from_mil(mil).unwrap()
}

fn q(mil: i64) -> Quantity {
    Quantity::from_mil(mil).unwrap()
}

fn address() -> BitcoinAddress {
    BitcoinAddress::new("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh").unwrap()
}

/// A rests an ask of 5 at 10, B bids 3 at 12; returns the shared
/// transaction ID once both sides have started it.
fn start_trade(c: &Cluster) -> (OrderId, OrderId, TransactionId) {
    let ask = c
        .node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();
    let bid = c
        .node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();

    let txs = c.node(0).transactions();
    assert_eq!(txs.len(), 1);
    let tx = txs[0].id();
    assert!(c.node(1).transaction(&tx).is_some());
    (ask, bid, tx)
}

#[test]
fn bid_proposes_once_at_resting_ask_price() {
    let c = Cluster::new(2);
    let ask = c
        .node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60))
        .unwrap();
    c.pump();
    let bid = c
        .node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(60))
        .unwrap();

    let proposals: Vec<TradeProposal> = c
        .in_flight()
        .into_iter()
        .filter_map(|m| match m {
            Message::ProposedTrade(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].quantity, q(3_000));
    assert_eq!(proposals[0].price, p(10_000));
    assert_eq!(proposals[0].order_id(), bid);
    assert_eq!(proposals[0].recipient_order_id, ask);
    assert_eq!(c.node(1).tick(&ask).unwrap().remaining(), q(2_000));
}

#[test]
fn full_trade_settles_on_both_nodes() {
    let c = Cluster::new(2);
    let (ask, bid, tx) = start_trade(&c);

    c.node(1)
        .submit_multi_chain_payment(tx, address(), q(3_000), q(30_000))
        .unwrap();
    c.pump();
    c.node(0).submit_bitcoin_payment(tx, q(3_000)).unwrap();
    c.pump();

    for node in &c.nodes {
        let t = node.transaction(&tx).unwrap();
        assert_eq!(t.state(), TransactionState::Completed);
        assert!(t.end_claimed_by_peer());
    }
    let a = c.node(0).transaction(&tx).unwrap();
    let b = c.node(1).transaction(&tx).unwrap();
    assert_eq!(
        p2pdex_settlement::settlement_digest(&a),
        p2pdex_settlement::settlement_digest(&b)
    );

    let ask_order = c.node(0).order(&ask).unwrap();
    assert_eq!(ask_order.traded_quantity(), q(3_000));
    assert_eq!(ask_order.available_quantity(), q(2_000));
    assert!(c.node(1).order(&bid).unwrap().is_filled());
    assert_eq!(c.node(1).tick(&ask).unwrap().remaining(), q(2_000));
    c.verify_all();
}

#[test]
fn acceptance_survives_proposer_order_expiry() {
    let c = Cluster::new(2);
    let ask = c
        .node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();
    let bid = c
        .node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(2))
        .unwrap();
    c.drop_gossip();

    // The proposal reaches A and A accepts.
    assert!(c.step());
    assert_eq!(c.node(0).inspect(|s| s.negotiations().hold_count()), 1);

    // B's order expires before the acceptance arrives.
    c.advance(Duration::from_secs(5));
    let report = c.node(1).sweep().unwrap();
    assert_eq!(report.expired_orders, vec![bid]);
    assert_eq!(report.expired_proposals, 0);

    c.pump();
    let txs = c.node(1).transactions();
    assert_eq!(txs.len(), 1);
    let tx = txs[0].id();
    assert!(c.node(0).transaction(&tx).is_some());

    c.node(1)
        .submit_multi_chain_payment(tx, address(), q(3_000), q(30_000))
        .unwrap();
    c.node(0).submit_bitcoin_payment(tx, q(3_000)).unwrap();
    c.pump();

    for node in &c.nodes {
        let t = node.transaction(&tx).unwrap();
        assert_eq!(t.state(), TransactionState::Completed);
        assert!(t.end_claimed_by_peer());
    }
    assert_eq!(c.node(1).order(&bid).unwrap().traded_quantity(), q(3_000));
    assert_eq!(c.node(0).order(&ask).unwrap().traded_quantity(), q(3_000));
    c.verify_all();
}

#[test]
fn concurrent_bids_never_oversell_a_tick() {
    let c = Cluster::new(2);
    let ask = c
        .node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();

    let b = c.node(1);
    std::thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                b.place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
                    .unwrap();
            });
        }
    });
    assert_eq!(b.tick(&ask).unwrap().remaining(), Quantity::ZERO);

    let mut proposed: Vec<Quantity> = c
        .in_flight()
        .into_iter()
        .filter_map(|m| match m {
            Message::ProposedTrade(p) => Some(p.quantity),
            _ => None,
        })
        .collect();
    proposed.sort();
    assert_eq!(proposed, vec![q(2_000), q(3_000)]);

    c.drop_gossip();
    c.pump();
    let mut settled: Vec<Quantity> = c
        .node(0)
        .transactions()
        .iter()
        .map(|t| t.terms.quantity)
        .collect();
    settled.sort();
    assert_eq!(settled, vec![q(2_000), q(3_000)]);
    assert_eq!(c.node(0).order(&ask).unwrap().available_quantity(), Quantity::ZERO);
    c.verify_all();
}

#[test]
fn half_paid_transaction_aborts_at_deadline() {
    let c = Cluster::new(2);
    let (ask, bid, tx) = start_trade(&c);

    c.node(1)
        .submit_multi_chain_payment(tx, address(), q(3_000), q(30_000))
        .unwrap();
    c.pump();
    assert_eq!(
        c.node(0).transaction(&tx).unwrap().state(),
        TransactionState::PartiallyPaid
    );

    let timeout = NegotiationConfig::default().transaction_timeout().as_millis();
    c.advance(Duration::from_millis(timeout));
    for node in &c.nodes {
        let report = node.sweep().unwrap();
        assert_eq!(report.aborted_transactions, vec![tx]);
        assert_eq!(report.proposals_sent, 1);
        assert_eq!(node.transaction(&tx).unwrap().state(), TransactionState::Aborted);
    }
    assert_eq!(c.node(0).order(&ask).unwrap().traded_quantity(), Quantity::ZERO);
    assert_eq!(c.node(1).order(&bid).unwrap().traded_quantity(), Quantity::ZERO);

    // Both views of the counter-party's tick are whole again, so the freed
    // quantity is proposed in full once more.
    let proposed: Vec<Quantity> = c
        .in_flight()
        .into_iter()
        .filter_map(|m| match m {
            Message::ProposedTrade(p) => Some(p.quantity),
            _ => None,
        })
        .collect();
    assert_eq!(proposed, vec![q(3_000), q(3_000)]);
    assert_eq!(c.node(1).tick(&ask).unwrap().remaining(), q(2_000));

    // A late payment cannot revive it.
    assert!(matches!(
        c.node(0).submit_bitcoin_payment(tx, q(3_000)),
        Err(DexError::TransactionClosed(_))
    ));
    c.verify_all();
}

#[test]
fn redelivered_payment_counts_once() {
    let c = Cluster::new(2);
    let (_, _, tx) = start_trade(&c);

    c.node(1)
        .submit_multi_chain_payment(tx, address(), q(3_000), q(30_000))
        .unwrap();
    let payload = c.wire.lock().front().unwrap().payload.clone();
    c.pump();
    c.node(0).on_receive(&payload).unwrap();
    c.node(0).on_receive(&payload).unwrap();

    let t = c.node(0).transaction(&tx).unwrap();
    assert_eq!(t.state(), TransactionState::PartiallyPaid);
    assert!(t.bitcoin_payment().is_none());
}

#[test]
fn malformed_payloads_change_nothing() {
    let c = Cluster::new(2);
    let ask = c
        .node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(60))
        .unwrap();
    let payload = c.wire.lock().front().unwrap().payload.clone();

    let b = c.node(1);
    assert!(b.on_receive(&payload[..payload.len() / 2]).is_err());
    assert!(b.on_receive(b"").is_err());
    assert!(b.tick(&ask).is_none());

    b.on_receive(&payload).unwrap();
    assert!(b.tick(&ask).is_some());
}

#[test]
fn decline_moves_on_to_next_best_ask() {
    let c = Cluster::new(3);
    let stale = c
        .node(0)
        .place_order(OrderSide::Ask, p(9_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    let fresh = c
        .node(2)
        .place_order(OrderSide::Ask, p(10_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();
    c.node(0).cancel_order(&stale).unwrap();

    let bid = c
        .node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    c.drop_gossip();
    c.pump();

    assert!(c.node(1).tick(&stale).is_none());
    let txs = c.node(1).transactions();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].terms.local_order_id, bid);
    assert_eq!(txs[0].terms.remote_order_id, fresh);
    assert_eq!(txs[0].terms.price, p(10_000));
    assert!(c.node(0).transactions().is_empty());
    c.verify_all();
}

#[test]
fn short_acceptor_counters_with_what_is_left() {
    let c = Cluster::new(3);
    let ask = c
        .node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();

    // Node 3 takes 3 of the 5 without node 2 hearing about it.
    c.node(2)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    c.drop_gossip();
    assert!(c.step());
    c.drop_gossip();
    c.pump();
    assert_eq!(c.node(0).order(&ask).unwrap().available_quantity(), q(2_000));
    assert_eq!(c.node(1).tick(&ask).unwrap().remaining(), q(5_000));

    let bid = c
        .node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    let proposal = c
        .in_flight()
        .into_iter()
        .find_map(|m| match m {
            Message::ProposedTrade(p) => Some(p.message_id),
            _ => None,
        })
        .unwrap();
    c.drop_gossip();
    c.pump();

    assert_eq!(
        c.node(1).negotiation_state(&proposal),
        Some(NegotiationState::CounterProposed)
    );
    let txs = c.node(1).transactions();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].terms.local_order_id, bid);
    assert_eq!(txs[0].terms.quantity, q(2_000));
    assert_eq!(txs[0].terms.price, p(10_000));
    assert_eq!(c.node(0).transactions().len(), 2);
    assert_eq!(c.node(0).order(&ask).unwrap().available_quantity(), Quantity::ZERO);
    assert_eq!(c.node(1).order(&bid).unwrap().available_quantity(), q(1_000));
    c.verify_all();
}

#[test]
fn cancelled_proposal_is_recorded() {
    let c = Cluster::new(2);
    c.node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();
    let bid = c
        .node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    let proposal = c
        .in_flight()
        .into_iter()
        .find_map(|m| match m {
            Message::ProposedTrade(p) => Some(p.message_id),
            _ => None,
        })
        .unwrap();
    c.node(1).cancel_order(&bid).unwrap();
    assert_eq!(
        c.node(1).negotiation_state(&proposal),
        Some(NegotiationState::Cancelled)
    );
    assert_eq!(c.node(1).pending_count(), 0);
    c.verify_all();
}

#[tokio::test]
async fn sweeper_task_expires_unanswered_proposals() {
    let c = Cluster::with_config(2, |config| config.sweep_interval_ms = 5);
    c.node(0)
        .place_order(OrderSide::Ask, p(10_000), q(5_000), Timeout::from_secs(3_600))
        .unwrap();
    c.pump();
    c.node(1)
        .place_order(OrderSide::Bid, p(12_000), q(3_000), Timeout::from_secs(3_600))
        .unwrap();
    let proposal = c
        .in_flight()
        .into_iter()
        .find_map(|m| match m {
            Message::ProposedTrade(p) => Some(p.message_id),
            _ => None,
        })
        .unwrap();
    // The proposal is lost.
    c.wire.lock().clear();

    let timeout = NegotiationConfig::default().proposal_timeout().as_millis();
    c.advance(Duration::from_millis(timeout));
    assert!(c.clock.now() >= Timestamp::from_millis(1_000_000 + timeout));

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let sweeper = c.node(1).spawn_sweeper(shutdown);
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.send(true).unwrap();
    sweeper.await.unwrap();

    assert_eq!(
        c.node(1).negotiation_state(&proposal),
        Some(NegotiationState::TimedOut)
    );
    c.verify_all();
}
