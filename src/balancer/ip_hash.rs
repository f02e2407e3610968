//! IP-hash selection.
//!
//! Hashes the client IP with 32-bit FNV-1a and indexes into the eligible
//! set, so a given client sticks to one backend for as long as the
//! eligible set is stable. Falls back to least-connections when the
//! client IP is unobtainable.

use std::sync::Arc;

use crate::balancer::backend::Backend;
use crate::balancer::least_conn;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a over arbitrary bytes.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

pub(crate) fn select(eligible: &[&Arc<Backend>], client_ip: Option<&str>) -> Option<Arc<Backend>> {
    let ip = match client_ip {
        Some(ip) if !ip.is_empty() => ip,
        _ => return least_conn::select(eligible),
    };

    let index = fnv1a_32(ip.as_bytes()) as usize % eligible.len();
    Some(eligible[index].clone())
}
