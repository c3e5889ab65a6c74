use crate::{
    convergence::{ConvergenceChecker, HttpProbe, PodReplicas, PROBE_PORT},
    generator::{IngressTranslator, SplitFailurePolicy},
    index::{Index, Lookup},
    k8s, LogOnly, Reconciler,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use std::time::Duration;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "kourier", about = "Routes Knative ingresses through Kourier gateways")]
pub struct Args {
    #[clap(long, default_value = "kourier=info,warn", env = "KOURIER_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Namespace in which gateway replicas run.
    #[clap(long, default_value = "kourier-system", env = "KOURIER_GATEWAY_NAMESPACE")]
    gateway_namespace: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// Attaches external authorization context to virtual hosts.
    #[clap(long, env = "KOURIER_EXTAUTHZ")]
    ext_authz: bool,

    /// What to do when a split's backend cannot be resolved: `skip` it or
    /// fail its ingress with `abort-rule`.
    #[clap(long, default_value = "skip")]
    split_failure_policy: SplitFailurePolicy,

    #[clap(long, default_value_t = PROBE_PORT)]
    probe_port: u16,

    /// Timeout for each gateway snapshot request.
    #[clap(long, default_value = "2000")]
    probe_timeout_ms: u64,

    /// Deadline for all gateways to report the published snapshot.
    #[clap(long, default_value = "3000")]
    sync_timeout_ms: u64,

    #[clap(long, default_value = "10")]
    requeue_interval_secs: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("probe timeout ({probe:?}) must be shorter than the sync timeout ({sync:?})")]
    ProbeTimeout { probe: Duration, sync: Duration },

    #[error("requeue interval must not be zero")]
    RequeueInterval,
}

/// Timeouts validated against each other.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Timeouts {
    probe: Duration,
    sync: Duration,
    requeue: Duration,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Timeouts {
            probe: probe_timeout,
            sync: sync_timeout,
            requeue,
        } = self.timeouts()?;

        let Self {
            log_level,
            log_format,
            client,
            admin,
            gateway_namespace,
            cluster_domain,
            ext_authz,
            split_failure_policy,
            probe_port,
            ..
        } = self;

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder())
            .with_client(client)
            .build()
            .await?;

        let index = Index::shared();

        // Spawn resource watches.

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), ingresses).instrument(info_span!("ingresses")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );

        let endpoints = runtime.watch_all::<k8s::Endpoints>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), endpoints)
                .instrument(info_span!("endpoints")),
        );

        let secrets = runtime.watch_all::<k8s::Secret>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), secrets).instrument(info_span!("secrets")),
        );

        let translator = IngressTranslator::new(Lookup::new(index.clone()), cluster_domain)
            .with_split_failure_policy(split_failure_policy);
        let reconciler = Reconciler::new(
            translator,
            LogOnly::default(),
            PodReplicas::new(runtime.client()),
            ConvergenceChecker::new(HttpProbe::new(probe_port, probe_timeout)),
            gateway_namespace,
            sync_timeout,
        )
        .with_ext_authz(ext_authz);

        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            reconciler
                .run(index, requeue, async move {
                    // Nothing needs draining.
                    drop(shutdown.signaled().await);
                })
                .instrument(info_span!("reconciler")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn timeouts(&self) -> Result<Timeouts, ConfigError> {
        let probe = Duration::from_millis(self.probe_timeout_ms);
        let sync = Duration::from_millis(self.sync_timeout_ms);
        if probe >= sync {
            return Err(ConfigError::ProbeTimeout { probe, sync });
        }
        let requeue = Duration::from_secs(self.requeue_interval_secs);
        if requeue.is_zero() {
            return Err(ConfigError::RequeueInterval);
        }
        Ok(Timeouts {
            probe,
            sync,
            requeue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kourier").chain(args.iter().copied()))
            .expect("arguments must parse")
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.gateway_namespace, "kourier-system");
        assert_eq!(args.cluster_domain, "cluster.local");
        assert!(!args.ext_authz);
        assert_eq!(args.split_failure_policy, SplitFailurePolicy::SkipAndContinue);
        assert_eq!(args.probe_port, 8081);
        assert_eq!(
            args.timeouts(),
            Ok(Timeouts {
                probe: Duration::from_secs(2),
                sync: Duration::from_secs(3),
                requeue: Duration::from_secs(10),
            })
        );
    }

    #[test]
    fn split_failure_policy_flag() {
        let args = parse(&["--split-failure-policy", "abort-rule", "--ext-authz"]);
        assert_eq!(args.split_failure_policy, SplitFailurePolicy::AbortRule);
        assert!(args.ext_authz);
        assert!(Args::try_parse_from(["kourier", "--split-failure-policy", "retry"]).is_err());
    }

    #[test]
    fn probe_timeout_must_be_shorter_than_sync_timeout() {
        let args = parse(&["--probe-timeout-ms", "3000", "--sync-timeout-ms", "3000"]);
        assert_eq!(
            args.timeouts(),
            Err(ConfigError::ProbeTimeout {
                probe: Duration::from_secs(3),
                sync: Duration::from_secs(3),
            })
        );

        let args = parse(&["--requeue-interval-secs", "0"]);
        assert_eq!(args.timeouts(), Err(ConfigError::RequeueInterval));
    }
}
