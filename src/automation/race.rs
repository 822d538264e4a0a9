// src/automation/race.rs
//! Signal racing: several independently bounded probes, first answer wins.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

pub struct Probe<'a, T> {
    pub name: &'static str,
    pub limit: Duration,
    pub signal: BoxFuture<'a, Option<T>>,
}

impl<'a, T> Probe<'a, T> {
    pub fn new(name: &'static str, limit: Duration, signal: BoxFuture<'a, Option<T>>) -> Self {
        Self { name, limit, signal }
    }
}

/// Resolve with the first probe that reports a signal. A probe that times out
/// or reports nothing drops out; `None` once every probe has.
pub async fn first_signal<T>(probes: Vec<Probe<'_, T>>) -> Option<T> {
    let mut pending: FuturesUnordered<_> = probes
        .into_iter()
        .map(|probe| async move {
            let seen = timeout(probe.limit, probe.signal).await.ok().flatten();
            (probe.name, seen)
        })
        .collect();

    while let Some((name, seen)) = pending.next().await {
        match seen {
            Some(signal) => {
                debug!("Signal '{}' won the race", name);
                return Some(signal);
            }
            None => debug!("Signal '{}' absent", name),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::time::sleep;

    fn after(delay: Duration, value: Option<&'static str>) -> BoxFuture<'static, Option<&'static str>> {
        async move {
            sleep(delay).await;
            value
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_signal_wins() {
        let winner = first_signal(vec![
            Probe::new("slow", Duration::from_secs(10), after(Duration::from_secs(5), Some("slow"))),
            Probe::new("fast", Duration::from_secs(10), after(Duration::from_secs(1), Some("fast"))),
        ])
        .await;
        assert_eq!(winner, Some("fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn each_probe_has_its_own_limit() {
        // "short" would answer first but is cut off by its own, shorter limit.
        let winner = first_signal(vec![
            Probe::new("short", Duration::from_secs(1), after(Duration::from_secs(2), Some("short"))),
            Probe::new("long", Duration::from_secs(10), after(Duration::from_secs(3), Some("long"))),
        ])
        .await;
        assert_eq!(winner, Some("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_seen_is_none() {
        let winner = first_signal(vec![
            Probe::new("a", Duration::from_secs(1), after(Duration::from_secs(5), Some("a"))),
            Probe::new("b", Duration::from_secs(5), after(Duration::from_secs(1), None)),
        ])
        .await;
        assert_eq!(winner, None);
    }
}
