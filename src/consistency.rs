//! Local vs remote counter comparison
//!
//! After a live period is committed, the cumulative DAG and transaction
//! counters of the checkpoint are compared with the node's own statistics.
//! A disagreement is reported but never stops the indexer.

use crate::records::FinalizationData;
use crate::rpc::ChainClient;
use crate::types::ChainStats;
use serde::Serialize;

/// One counter that differs between the index and the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub counter: &'static str,
    pub local: u64,
    pub remote: u64,
}

/// Compare the checkpoint with the node's statistics.
///
/// Returns `None` when the two refer to different periods (the node moved
/// on in between), otherwise the list of differing counters, empty when
/// everything agrees.
pub fn compare(local: &FinalizationData, remote: &ChainStats) -> Option<Vec<Mismatch>> {
    if local.period != remote.period {
        return None;
    }
    let counters = [
        ("dag_count", local.dag_count, remote.dag_count),
        ("trx_count", local.trx_count, remote.trx_count),
    ];
    Some(
        counters
            .into_iter()
            .filter(|(_, local, remote)| local != remote)
            .map(|(counter, local, remote)| Mismatch { counter, local, remote })
            .collect(),
    )
}

/// Fetch the node's statistics and log any disagreement with `local`.
///
/// Returns the mismatches found; fetch failures are logged and yield an
/// empty list.
pub async fn check<C: ChainClient + ?Sized>(client: &C, local: &FinalizationData) -> Vec<Mismatch> {
    let remote = match client.get_chain_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(period = local.period, "Consistency check skipped: {:#}", e);
            return Vec::new();
        }
    };

    let Some(mismatches) = compare(local, &remote) else {
        tracing::debug!(
            local = local.period,
            remote = remote.period,
            "Consistency check skipped: periods differ"
        );
        return Vec::new();
    };
    for m in &mismatches {
        tracing::warn!(
            period = local.period,
            counter = m.counter,
            local = m.local,
            remote = m.remote,
            "Consistency check: counter mismatch"
        );
    }
    mismatches
}
