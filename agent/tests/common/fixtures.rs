//! Test fixtures and data
//!
//! Node identities, queue names and encoded records shared by the tests.

use shared::{encode_record, LogEvent, NodeIdentity};

pub struct TestFixtures;

impl TestFixtures {
    pub const ORDERS_QUEUE: &'static str = "orders";
    pub const INSTANCE: &'static str = "test";

    pub const NODE_A: &'static str = "10.0.0.1:4545";
    pub const NODE_B: &'static str = "10.0.0.2:4545";
    pub const NODE_C: &'static str = "10.0.0.3:4545";
    pub const NODE_DEFAULT: &'static str = "10.0.0.9:4545";

    pub fn node(input: &str) -> NodeIdentity {
        NodeIdentity::parse(input).expect("valid test node")
    }

    pub fn node_a() -> NodeIdentity {
        Self::node(Self::NODE_A)
    }

    pub fn node_b() -> NodeIdentity {
        Self::node(Self::NODE_B)
    }

    pub fn node_c() -> NodeIdentity {
        Self::node(Self::NODE_C)
    }

    pub fn node_default() -> NodeIdentity {
        Self::node(Self::NODE_DEFAULT)
    }

    /// Queue payload for one record
    pub fn record(business: &str, body: &str) -> Vec<u8> {
        encode_record(business, &LogEvent::new(body)).expect("encodable record")
    }
}
