//! Confirms proposed states against the root published by the ledger

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ctree::{Address, State};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::LedgerClient;
use crate::provider::StateProvider;
use crate::state::StateHolder;

pub struct Reconciler {
    ledger: Arc<dyn LedgerClient>,
    provider: Arc<dyn StateProvider>,
    holder: Arc<StateHolder>,
    interval: Duration,
    timeout: Duration,
}

/// Outcome of one confirmation attempt
#[derive(Debug, PartialEq, Eq)]
enum Attempt {
    Confirmed,
    Unconfirmed,
    /// Older than the confirmed state; dropped
    Stale,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        provider: Arc<dyn StateProvider>,
        holder: Arc<StateHolder>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            provider,
            holder,
            interval,
            timeout,
        }
    }

    /// Runs until `cancel` fires.
    ///
    /// The latest proposal replaces any earlier unconfirmed one. The watched
    /// address is kept across confirmations.
    pub async fn run(
        self,
        mut states: mpsc::Receiver<State>,
        mut addresses: mpsc::Receiver<Address>,
        cancel: CancellationToken,
    ) {
        info!(interval = ?self.interval, "reconciler: started");

        let mut address: Option<Address> = None;
        let mut pending: Option<State> = None;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(a) = addresses.recv() => {
                    info!(address = %a, "reconciler: watching address");
                    address = Some(a);
                }
                Some(s) = states.recv() => {
                    info!(version = s.version, "reconciler: pending state");
                    pending = Some(s);
                }
                _ = ticker.tick() => {
                    if let (Some(addr), Some(candidate)) = (address.as_ref(), pending.as_ref()) {
                        match self.attempt(addr, candidate).await {
                            Ok(Attempt::Unconfirmed) => {}
                            Ok(Attempt::Confirmed | Attempt::Stale) => pending = None,
                            Err(e) => warn!("reconciler: {e:#}"),
                        }
                    }
                }
            }
        }

        info!("reconciler: stopped");
    }

    async fn attempt(&self, address: &Address, candidate: &State) -> Result<Attempt> {
        let current = self.holder.confirmed();
        if candidate.version < current.version {
            warn!(
                candidate = candidate.version,
                confirmed = current.version,
                "reconciler: dropping stale pending state"
            );
            return Ok(Attempt::Stale);
        }

        let root = tokio::time::timeout(self.timeout, self.ledger.merkle_root(address))
            .await
            .context("ledger query timed out")?
            .context("could not get merkle root")?;

        if root != candidate.root.hash {
            debug!(
                version = candidate.version,
                ledger_root = %hex::encode(root),
                "reconciler: root not published yet"
            );
            return Ok(Attempt::Unconfirmed);
        }

        let mut confirmed = candidate.clone();
        confirmed.address = Some(*address);

        self.provider
            .save(&confirmed)
            .await
            .context("could not persist state")?;

        let version = confirmed.version;
        if let Err(stale) = self.holder.set_confirmed(confirmed) {
            warn!("reconciler: {stale}");
            return Ok(Attempt::Stale);
        }

        info!(version, "reconciler: committed state");
        Ok(Attempt::Confirmed)
    }
}
