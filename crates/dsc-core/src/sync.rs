use crate::error::DscError;
use crate::ledger::LedgerClient;
use crate::types::{AccountSnapshot, HealthFactor, Position, TokenBalances, TokenId};
use alloy_primitives::{Address, U256};
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default period of the background poll.
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(10);

/// Keeps an immutable snapshot of one account's position in step with the ledger.
///
/// Passes never overlap. A caller that asks for a sync while a pass is running
/// waits for it, then either reuses the result of a pass that started after its
/// request or runs one more pass. Each pass replaces the snapshot as a whole, so
/// readers never observe values from two different passes.
pub struct AccountSynchronizer {
    ledger: Arc<dyn LedgerClient>,
    account: Address,
    display_tokens: Vec<TokenId>,
    snapshot: watch::Sender<Arc<AccountSnapshot>>,
    pass_lock: Mutex<()>,
    requested: AtomicU64,
    covered: AtomicU64,
}

impl AccountSynchronizer {
    pub fn new(ledger: Arc<dyn LedgerClient>, account: Address, display_tokens: Vec<TokenId>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(AccountSnapshot::empty(account)));
        Self {
            ledger,
            account,
            display_tokens,
            snapshot,
            pass_lock: Mutex::new(()),
            requested: AtomicU64::new(0),
            covered: AtomicU64::new(0),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Last good snapshot.
    pub fn snapshot(&self) -> Arc<AccountSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AccountSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Refresh the snapshot and return it.
    ///
    /// Never fails: a pass that hits a ledger error is logged and the previous
    /// snapshot stays in place until the next pass succeeds.
    pub async fn sync(&self) -> Arc<AccountSnapshot> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _pass = self.pass_lock.lock().await;

        if self.covered.load(Ordering::SeqCst) >= ticket {
            tracing::trace!(account = %self.account, ticket, "Sync coalesced into completed pass");
            return self.snapshot();
        }

        // Everything requested up to here is answered by this pass.
        let upto = self.requested.load(Ordering::SeqCst);
        let previous = self.snapshot();

        match self.fetch(&previous).await {
            Ok(next) => {
                tracing::debug!(
                    account = %self.account,
                    pass = next.pass,
                    tokens = next.collateral_tokens.len(),
                    "Account synchronized"
                );
                self.snapshot.send_replace(Arc::new(next));
            }
            Err(e) => {
                tracing::warn!(
                    account = %self.account,
                    pass = previous.pass + 1,
                    error = %e,
                    "Sync failed, keeping last snapshot"
                );
            }
        }

        self.covered.store(upto, Ordering::SeqCst);
        self.snapshot()
    }

    async fn fetch(&self, previous: &AccountSnapshot) -> Result<AccountSnapshot, DscError> {
        let ledger = self.ledger.as_ref();
        let account = self.account;

        let (info, raw_health_factor, accepted) = tokio::try_join!(
            ledger.account_information(account),
            ledger.health_factor(account),
            ledger.collateral_tokens(),
        )?;

        let deposited = try_join_all(
            accepted
                .iter()
                .map(|token| ledger.collateral_balance(account, *token)),
        )
        .await?;
        let collateral_balances: TokenBalances = accepted.iter().copied().zip(deposited).collect();

        let debt_token_balance = ledger.balance_of(ledger.debt_token(), account).await?;

        let wallet_tokens: BTreeSet<TokenId> = accepted
            .iter()
            .chain(self.display_tokens.iter())
            .copied()
            .collect();
        let reads = join_all(
            wallet_tokens
                .iter()
                .map(|token| async move { (*token, ledger.balance_of(*token, account).await) }),
        )
        .await;

        let mut wallet_balances = TokenBalances::new();
        for (token, read) in reads {
            let amount = match read {
                Ok(amount) => amount,
                Err(e) => {
                    let fallback = if self.display_tokens.contains(&token) {
                        previous.wallet_balances.recorded(&token).unwrap_or(U256::ZERO)
                    } else {
                        U256::ZERO
                    };
                    tracing::warn!(
                        account = %account,
                        token = %token,
                        error = %e,
                        "Wallet balance read failed"
                    );
                    fallback
                }
            };
            wallet_balances.insert(token, amount);
        }

        Ok(AccountSnapshot {
            account,
            position: Position {
                total_debt_minted: info.total_debt_minted,
                collateral_value_in_quote: info.collateral_value_in_quote,
                health_factor: HealthFactor::from_raw(raw_health_factor),
                collateral_balances,
            },
            wallet_balances,
            debt_token_balance,
            collateral_tokens: accepted,
            pass: previous.pass + 1,
            synced_at: Some(Utc::now()),
        })
    }

    /// Start the periodic poll. The first tick fires one `period` from now.
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> SyncTask {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let synchronizer = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        synchronizer.sync().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!(account = %synchronizer.account, "Periodic sync stopped");
        });

        SyncTask {
            shutdown: shutdown_tx,
            handle: Some(handle),
        }
    }
}

/// Handle to the background poll; dropping it aborts the task.
pub struct SyncTask {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SyncTask {
    /// Stop polling, letting an in-flight pass finish first.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Periodic sync task ended abnormally");
            }
        }
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{token, ScriptedLedger};
    use crate::types::HealthStatus;
    use crate::units::pow10;

    fn user() -> Address {
        Address::from([0x11; 20])
    }

    #[tokio::test]
    async fn zero_debt_reports_infinite_health_factor() {
        let ledger = Arc::new(ScriptedLedger::new());
        let weth = token(0xaa);
        ledger.accept_collateral(weth);
        ledger.set_collateral(weth, pow10(18));

        let sync = AccountSynchronizer::new(ledger, user(), vec![]);
        let snapshot = sync.sync().await;

        assert!(snapshot.position.health_factor.is_infinite());
        assert_eq!(snapshot.position.health_factor.status(), HealthStatus::NoDebt);
        assert_eq!(snapshot.position.collateral_balance(&weth), pow10(18));
        assert_eq!(snapshot.pass, 1);
    }

    #[tokio::test]
    async fn failed_pass_keeps_previous_snapshot() {
        let ledger = Arc::new(ScriptedLedger::new());
        let weth = token(0xaa);
        ledger.accept_collateral(weth);
        ledger.set_wallet(weth, U256::from(7u8));

        let sync = AccountSynchronizer::new(ledger.clone(), user(), vec![]);
        let first = sync.sync().await;

        ledger.fail_views(true);
        let second = sync.sync().await;

        assert_eq!(second, first);
        assert_eq!(second.wallet_balances.get(&weth), U256::from(7u8));

        ledger.fail_views(false);
        assert_eq!(sync.sync().await.pass, 2);
    }

    #[tokio::test]
    async fn display_token_keeps_previous_balance_on_read_error() {
        let ledger = Arc::new(ScriptedLedger::new());
        let accepted = token(0xaa);
        let display = token(0xbb);
        ledger.accept_collateral(accepted);
        ledger.set_wallet(accepted, U256::from(3u8));
        ledger.set_wallet(display, U256::from(5u8));

        let sync = AccountSynchronizer::new(ledger.clone(), user(), vec![display]);
        sync.sync().await;

        ledger.fail_balance_of(display);
        ledger.fail_balance_of(accepted);
        let snapshot = sync.sync().await;

        assert_eq!(snapshot.wallet_balances.get(&display), U256::from(5u8));
        assert_eq!(snapshot.wallet_balances.get(&accepted), U256::ZERO);
    }

    #[tokio::test]
    async fn display_token_without_history_reads_zero_on_error() {
        let ledger = Arc::new(ScriptedLedger::new());
        let display = token(0xbb);
        ledger.fail_balance_of(display);

        let sync = AccountSynchronizer::new(ledger, user(), vec![display]);
        let snapshot = sync.sync().await;

        assert_eq!(snapshot.wallet_balances.recorded(&display), Some(U256::ZERO));
    }

    #[tokio::test]
    async fn every_accepted_token_has_a_collateral_entry() {
        let ledger = Arc::new(ScriptedLedger::new());
        let weth = token(0xaa);
        let wbtc = token(0xbb);
        ledger.accept_collateral(weth);
        ledger.accept_collateral(wbtc);

        let sync = AccountSynchronizer::new(ledger, user(), vec![]);
        let snapshot = sync.sync().await;

        assert_eq!(snapshot.position.collateral_balances.recorded(&wbtc), Some(U256::ZERO));
        assert_eq!(snapshot.collateral_tokens, vec![weth, wbtc]);
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sync = Arc::new(AccountSynchronizer::new(ledger.clone(), user(), vec![]));

        let gate = ledger.hold_views();
        let first = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.sync().await }
        });
        ledger.wait_for_held_view().await;

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let sync = Arc::clone(&sync);
                tokio::spawn(async move { sync.sync().await })
            })
            .collect();
        tokio::task::yield_now().await;
        gate.release();

        first.await.unwrap();
        for waiter in waiters {
            waiter.await.unwrap();
        }

        // One pass for the first caller, one shared by everyone who queued behind it.
        assert_eq!(sync.snapshot().pass, 2);
        assert_eq!(ledger.count("account_information"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_polls_until_stopped() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sync = Arc::new(AccountSynchronizer::new(ledger.clone(), user(), vec![]));

        let task = sync.spawn_periodic(DEFAULT_SYNC_PERIOD);
        tokio::time::sleep(Duration::from_secs(25)).await;
        task.stop().await;

        let passes = sync.snapshot().pass;
        assert_eq!(passes, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sync.snapshot().pass, passes);
    }
}
