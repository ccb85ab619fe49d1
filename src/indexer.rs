//! Indexer state machine
//!
//! Connects to the node, makes sure the index belongs to the node's chain
//! (seeding or reseeding it from genesis when needed), catches up in bulk
//! through the [`SyncQueue`] and then follows new heads one period at a
//! time. Any non-fatal error ends the run; [`Indexer::run_forever`] starts
//! a new one after a fixed delay.

use crate::block::BlockContext;
use crate::config::IndexerConfig;
use crate::consistency;
use crate::error::IndexError;
use crate::genesis;
use crate::ledger::Ledger;
use crate::rpc::ChainClient;
use crate::store::Storage;
use crate::sync_queue::SyncQueue;
use crate::types::{BlockData, ChainConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Periods between two sync progress messages.
const PROGRESS_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    Disconnected,
    Initializing,
    CatchingUp,
    Live,
}

/// What to do with a head announced by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadAction {
    /// Already indexed
    Stale,
    /// Directly follows the checkpoint
    Next,
    /// Leaves a gap that must be synced first
    Ahead,
}

pub fn classify_head(checkpoint: u64, head: u64) -> HeadAction {
    if head <= checkpoint {
        HeadAction::Stale
    } else if head == checkpoint + 1 {
        HeadAction::Next
    } else {
        HeadAction::Ahead
    }
}

/// Per-run state, rebuilt from storage on every connection.
struct Session {
    chain: ChainConfig,
    ledger: Ledger,
    consistency_check_available: bool,
}

pub struct Indexer<C: ChainClient> {
    storage: Storage,
    config: IndexerConfig,
    client: Arc<C>,
    state: IndexerState,
}

impl<C: ChainClient> Indexer<C> {
    pub fn new(storage: Storage, config: IndexerConfig, client: Arc<C>) -> Self {
        Self {
            storage,
            config,
            client,
            state: IndexerState::Disconnected,
        }
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    /// Run until a fatal error occurs, restarting after every other one.
    pub async fn run_forever(&mut self) -> Result<(), IndexError> {
        loop {
            match self.run().await {
                Ok(()) => info!("Head subscription ended, reconnecting"),
                Err(e) if e.is_fatal() => {
                    tracing::error!("Fatal indexer error: {}", e);
                    self.state = IndexerState::Disconnected;
                    return Err(e);
                }
                Err(e) => warn!(
                    "Indexer run failed: {}, restarting in {:?}",
                    e, self.config.retry_interval
                ),
            }
            self.state = IndexerState::Disconnected;
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    /// One connection lifetime: connect, initialize, catch up, follow heads.
    ///
    /// Returns `Ok(())` when the node closes the head subscription.
    pub async fn run(&mut self) -> Result<(), IndexError> {
        self.state = IndexerState::Disconnected;
        self.connect().await?;

        self.state = IndexerState::Initializing;
        let mut session = self.initialize().await?;

        self.state = IndexerState::CatchingUp;
        self.catch_up(&mut session).await?;

        self.state = IndexerState::Live;
        self.follow_heads(&mut session).await
    }

    /// Query the node's protocol version, retrying until it answers.
    async fn connect(&self) -> Result<(), IndexError> {
        let version = loop {
            match self.client.get_version().await {
                Ok(version) => break version,
                Err(e) => {
                    warn!(
                        "Failed to connect to node: {:#}, retrying in {:?}",
                        e, self.config.retry_interval
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        };
        if version < self.config.min_protocol_version {
            return Err(IndexError::UnsupportedVersion {
                version,
                minimum: self.config.min_protocol_version,
            });
        }
        info!(version, "Connected to node");
        Ok(())
    }

    async fn initialize(&self) -> Result<Session, IndexError> {
        let genesis_block = self
            .client
            .get_block_by_number(0)
            .await
            .map_err(IndexError::Chain)?;
        let remote_hash = genesis_block.period.hash;
        let genesis = self.client.get_genesis().await.map_err(IndexError::Chain)?;

        match self.storage.genesis_hash()? {
            Some(stored) if stored == remote_hash => {
                debug!(hash = %remote_hash, "Genesis hash matches")
            }
            stored => {
                if let Some(stored) = stored {
                    warn!(
                        stored = %stored,
                        remote = %remote_hash,
                        "Genesis hash changed, wiping index"
                    );
                    self.storage.clean()?;
                }
                genesis::seed(
                    &self.storage,
                    &mut Ledger::new(),
                    &self.config,
                    &genesis,
                    remote_hash,
                )?;
            }
        }

        let consistency_check_available = match self.client.get_chain_stats().await {
            Ok(_) => true,
            Err(e) => {
                info!("Chain statistics unavailable, consistency checks disabled: {:#}", e);
                false
            }
        };
        let ledger = Ledger::from_accounts(self.storage.get_accounts()?);
        info!(
            accounts = ledger.len(),
            checkpoint = self.checkpoint()?,
            "Index initialized"
        );

        Ok(Session {
            chain: genesis.chain_config(),
            ledger,
            consistency_check_available,
        })
    }

    fn checkpoint(&self) -> Result<u64, IndexError> {
        Ok(self
            .storage
            .get_finalization_data()?
            .unwrap_or_default()
            .period)
    }

    async fn catch_up(&self, session: &mut Session) -> Result<(), IndexError> {
        loop {
            let start = self.checkpoint()? + 1;
            let latest = self
                .client
                .get_latest_period()
                .await
                .map_err(IndexError::Chain)?;
            if latest.saturating_sub(start) < self.config.live_sync_threshold {
                debug!(start, latest, "Caught up");
                return Ok(());
            }
            self.sync(session, start, latest).await?;
        }
    }

    /// Apply every period of `[start, end)` in order.
    async fn sync(&self, session: &mut Session, start: u64, end: u64) -> Result<(), IndexError> {
        info!(start, end, "Syncing periods");
        let mut queue = SyncQueue::spawn(
            start,
            end,
            self.config.sync_queue_limit,
            self.client.clone(),
            self.config.fetch_backoff,
        );
        while let Some(block) = queue.pop_next().await {
            let number = block.period.number;
            let (dags, trxs) = self.apply(session, &block)?;
            if number % PROGRESS_INTERVAL == 0 {
                info!(period = number, dags, trxs, end, "Syncing: block applied");
            } else {
                debug!(period = number, dags, trxs, "Block applied");
            }
        }
        Ok(())
    }

    fn apply(&self, session: &mut Session, block: &BlockData) -> Result<(u64, u64), IndexError> {
        BlockContext::new(&self.storage, &mut session.ledger, &self.config, session.chain)?
            .process(block)
    }

    async fn follow_heads(&self, session: &mut Session) -> Result<(), IndexError> {
        let mut subscription = self
            .client
            .subscribe_new_heads()
            .await
            .map_err(IndexError::Chain)?;
        info!("Following new heads");

        let mut errors_open = true;
        loop {
            tokio::select! {
                head = subscription.heads.recv() => {
                    let Some(head) = head else {
                        return Ok(());
                    };
                    self.on_head(session, head.number).await?;
                }
                error = subscription.errors.recv(), if errors_open => match error {
                    Some(e) => return Err(IndexError::Chain(e.context("Head subscription failed"))),
                    None => errors_open = false,
                },
            }
        }
    }

    async fn on_head(&self, session: &mut Session, number: u64) -> Result<(), IndexError> {
        let checkpoint = self.checkpoint()?;
        match classify_head(checkpoint, number) {
            HeadAction::Stale => {
                debug!(period = number, checkpoint, "Ignoring stale head");
                return Ok(());
            }
            HeadAction::Next => {
                let block = self
                    .client
                    .get_block_by_number(number)
                    .await
                    .map_err(IndexError::Chain)?;
                let (dags, trxs) = self.apply(session, &block)?;
                info!(period = number, dags, trxs, "Live: block applied");
            }
            HeadAction::Ahead => self.sync(session, checkpoint + 1, number + 1).await?,
        }

        if session.consistency_check_available {
            if let Some(local) = self.storage.get_finalization_data()? {
                consistency::check(self.client.as_ref(), &local).await;
            }
        }
        Ok(())
    }
}
