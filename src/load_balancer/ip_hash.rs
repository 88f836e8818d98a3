//! Client-address affinity strategy.

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::Strategy;
use crate::load_balancer::{
    instance::ServiceInstance, round_robin::RoundRobin, SelectionContext, Selector,
};

/// IP hash selector.
///
/// The hash is the plain sum of the address octets, so distinct clients
/// collide often (e.g. 10.0.0.2 and 10.0.1.1). Without a client address
/// the selector falls back to round robin.
#[derive(Debug, Default)]
pub struct IpHash {
    fallback: RoundRobin,
}

impl IpHash {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sum of the address octets (all 16 for IPv6).
pub fn octet_sum(ip: IpAddr) -> usize {
    match ip {
        IpAddr::V4(v4) => v4.octets().iter().map(|o| *o as usize).sum(),
        IpAddr::V6(v6) => v6.octets().iter().map(|o| *o as usize).sum(),
    }
}

impl Selector for IpHash {
    fn select(
        &self,
        healthy: &[Arc<ServiceInstance>],
        context: &SelectionContext,
    ) -> Option<Arc<ServiceInstance>> {
        if healthy.is_empty() {
            return None;
        }

        match context.client_ip {
            Some(ip) => Some(healthy[octet_sum(ip) % healthy.len()].clone()),
            None => self.fallback.select(healthy, context),
        }
    }

    fn strategy(&self) -> Strategy {
        Strategy::IpHash
    }
}
