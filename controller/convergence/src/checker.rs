use crate::{fanout, SnapshotProbe};
use parking_lot::Mutex;
use std::{net::IpAddr, sync::Arc, time::Duration};

/// Decides whether every gateway replica serves an expected snapshot.
#[derive(Clone, Debug)]
pub struct ConvergenceChecker<P> {
    probe: Arc<P>,
}

/// Probe results for a single check.
#[derive(Debug, Default)]
struct Tally {
    in_sync: usize,
    out_of_sync: usize,
}

// === impl ConvergenceChecker ===

impl<P> ConvergenceChecker<P>
where
    P: SnapshotProbe + Send + Sync + 'static,
{
    pub fn new(probe: P) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    /// Probes every replica concurrently and returns true only if all of them
    /// report `expected` before `timeout` elapses.
    ///
    /// An empty replica set is never converged. Replica failures are logged
    /// and count against convergence; the returned error is reserved and is
    /// currently always `Ok`.
    pub async fn check_convergence(
        &self,
        replicas: &[IpAddr],
        expected: &str,
        timeout: Duration,
    ) -> anyhow::Result<bool> {
        if replicas.is_empty() {
            tracing::debug!("no gateway replicas to check");
            return Ok(false);
        }

        let probes = replicas.iter().map(|&replica| {
            let probe = self.probe.clone();
            let expected = expected.to_string();
            async move {
                match probe.snapshot_id(replica).await {
                    Ok(id) if id.as_bytes() == expected.as_bytes() => true,
                    Ok(id) => {
                        tracing::warn!(%replica, current = ?id, %expected, "gateway is serving a different snapshot");
                        false
                    }
                    Err(error) => {
                        tracing::warn!(%replica, %error, "failed to get the gateway's current snapshot");
                        false
                    }
                }
            }
        });

        let tally = Arc::new(Mutex::new(Tally::default()));
        let completion = {
            let tally = tally.clone();
            fanout::run(probes, timeout, move |in_sync| {
                let mut tally = tally.lock();
                if in_sync {
                    tally.in_sync += 1;
                } else {
                    tally.out_of_sync += 1;
                }
            })
            .await
        };

        if !completion.all_completed() {
            tracing::info!(
                replicas = replicas.len(),
                outstanding = completion.outstanding(),
                ?timeout,
                "timed out waiting for gateway replicas"
            );
            return Ok(false);
        }

        let tally = tally.lock();
        tracing::debug!(in_sync = tally.in_sync, out_of_sync = tally.out_of_sync, %expected, "checked gateway snapshots");
        Ok(tally.in_sync == replicas.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProbeError;
    use http::{HeaderValue, StatusCode};
    use std::collections::HashMap;
    use tokio::time;

    enum Reply {
        Snapshot(&'static str, Duration),
        Fail(StatusCode),
    }

    struct FakeProbe(HashMap<IpAddr, Reply>);

    #[async_trait::async_trait]
    impl SnapshotProbe for FakeProbe {
        async fn snapshot_id(&self, replica: IpAddr) -> Result<HeaderValue, ProbeError> {
            match self.0.get(&replica) {
                Some(Reply::Snapshot(id, delay)) => {
                    time::sleep(*delay).await;
                    Ok(HeaderValue::from_static(*id))
                }
                Some(Reply::Fail(status)) => Err(ProbeError::Status(*status)),
                None => Err(ProbeError::Timeout(Duration::ZERO)),
            }
        }
    }

    fn ip(n: u8) -> IpAddr {
        [10, 0, 0, n].into()
    }

    fn checker(replies: Vec<(u8, Reply)>) -> ConvergenceChecker<FakeProbe> {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
        ConvergenceChecker::new(FakeProbe(
            replies.into_iter().map(|(n, r)| (ip(n), r)).collect(),
        ))
    }

    const FAST: Duration = Duration::from_millis(10);
    const TIMEOUT: Duration = Duration::from_secs(3);

    #[tokio::test(start_paused = true)]
    async fn no_replicas_is_not_converged() {
        let checker = checker(vec![]);
        assert!(!checker.check_convergence(&[], "1", TIMEOUT).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn all_replicas_in_sync() {
        let checker = checker(vec![
            (1, Reply::Snapshot("snap-2", FAST)),
            (2, Reply::Snapshot("snap-2", Duration::from_secs(1))),
            (3, Reply::Snapshot("snap-2", FAST)),
        ]);
        let converged = checker
            .check_convergence(&[ip(1), ip(2), ip(3)], "snap-2", TIMEOUT)
            .await
            .unwrap();
        assert!(converged);
    }

    #[tokio::test(start_paused = true)]
    async fn one_stale_replica_is_not_converged() {
        let checker = checker(vec![
            (1, Reply::Snapshot("snap-2", FAST)),
            (2, Reply::Snapshot("snap-1", FAST)),
        ]);
        let converged = checker
            .check_convergence(&[ip(1), ip(2)], "snap-2", TIMEOUT)
            .await
            .unwrap();
        assert!(!converged);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_replica_is_not_converged() {
        let checker = checker(vec![
            (1, Reply::Snapshot("snap-2", FAST)),
            (2, Reply::Fail(StatusCode::SERVICE_UNAVAILABLE)),
        ]);
        let converged = checker
            .check_convergence(&[ip(1), ip(2)], "snap-2", TIMEOUT)
            .await
            .unwrap();
        assert!(!converged);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_replica_is_not_converged_even_if_others_agree() {
        let checker = checker(vec![
            (1, Reply::Snapshot("snap-2", FAST)),
            (2, Reply::Snapshot("snap-2", FAST)),
            (3, Reply::Snapshot("snap-2", Duration::from_secs(10))),
        ]);
        let converged = checker
            .check_convergence(&[ip(1), ip(2), ip(3)], "snap-2", TIMEOUT)
            .await
            .unwrap();
        assert!(!converged);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_ids_compare_exactly() {
        let checker = checker(vec![(1, Reply::Snapshot("Snap-2", FAST))]);
        let converged = checker
            .check_convergence(&[ip(1)], "snap-2", TIMEOUT)
            .await
            .unwrap();
        assert!(!converged);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_checks_do_not_share_state() {
        let checker = checker(vec![
            (1, Reply::Snapshot("snap-2", Duration::from_millis(500))),
            (2, Reply::Snapshot("snap-1", FAST)),
        ]);
        let (ips_a, ips_b) = ([ip(1)], [ip(2)]);
        let (a, b) = tokio::join!(
            checker.check_convergence(&ips_a, "snap-2", TIMEOUT),
            checker.check_convergence(&ips_b, "snap-2", TIMEOUT),
        );
        assert!(a.unwrap());
        assert!(!b.unwrap());
    }
}
