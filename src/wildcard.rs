// src/wildcard.rs
use crate::resolver::{resolve_addresses, Lookup};
use crate::types::WildcardProfile;
use futures::future::join_all;
use log::{debug, info};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

const PROBE_LABEL_LEN: usize = 20;

/// Detects zones that answer for arbitrary names.
#[derive(Clone)]
pub struct WildcardDetector {
    lookup: Arc<dyn Lookup>,
    probes: usize,
}

impl WildcardDetector {
    pub fn new(lookup: Arc<dyn Lookup>, probes: usize) -> Self {
        Self {
            lookup,
            probes: probes.max(2),
        }
    }

    /// Resolves a few random names under `domain`.
    ///
    /// The zone is a wildcard when at least two probes answer and two of the answers
    /// share an address; the union of all probe answers is recorded. A probe that
    /// fails to resolve counts as evidence against wildcarding.
    pub async fn detect(&self, domain: &str) -> WildcardProfile {
        let probes: Vec<String> = (0..self.probes)
            .map(|_| format!("{}.{}", random_label(), domain))
            .collect();

        let answers: Vec<BTreeSet<IpAddr>> = join_all(
            probes
                .iter()
                .map(|probe| resolve_addresses(self.lookup.as_ref(), probe)),
        )
        .await
        .into_iter()
        .filter(|addresses| !addresses.is_empty())
        .collect();

        debug!("{}: {}/{} wildcard probes resolved", domain, answers.len(), self.probes);

        let overlapping = answers.iter().enumerate().any(|(i, a)| {
            answers[i + 1..].iter().any(|b| !a.is_disjoint(b))
        });

        if !overlapping {
            return WildcardProfile::none();
        }

        let wildcard_addresses: BTreeSet<IpAddr> = answers.into_iter().flatten().collect();
        info!(
            "Wildcard DNS detected for {} -> {}",
            domain,
            wildcard_addresses
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        WildcardProfile {
            is_wildcard: true,
            wildcard_addresses,
        }
    }
}

fn random_label() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PROBE_LABEL_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}
