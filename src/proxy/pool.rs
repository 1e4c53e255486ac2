//! Per-account proxy groups with round-robin rotation

use crate::account::Credential;
use crate::error::Error;
use crate::logger;
use crate::proxy::models::ProxyEndpoint;
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// How the proxy list is split between accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributionMode {
    /// Equal contiguous slices, the last account takes the remainder
    #[default]
    Even,
    /// Operator-chosen count per account
    Manual,
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionMode::Even => write!(f, "even"),
            DistributionMode::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for DistributionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "even" | "1" => Ok(DistributionMode::Even),
            "manual" | "2" => Ok(DistributionMode::Manual),
            other => Err(format!("unknown distribution mode: {}", other)),
        }
    }
}

/// Why a manual allocation request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BelowMinimum,
    ExceedsAvailable { requested: usize, available: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BelowMinimum => write!(f, "at least one proxy must be assigned"),
            Rejection::ExceedsAvailable {
                requested,
                available,
            } => write!(
                f,
                "requested {} proxies but only {} are available",
                requested, available
            ),
        }
    }
}

/// Validate a manual allocation request against what is left
pub fn check_request(requested: usize, available: usize) -> std::result::Result<usize, Rejection> {
    if requested < 1 {
        return Err(Rejection::BelowMinimum);
    }
    if requested > available {
        return Err(Rejection::ExceedsAvailable {
            requested,
            available,
        });
    }
    Ok(requested)
}

/// Supplies per-account proxy counts in manual mode
pub trait AllocationSource {
    /// Requested count for account `index`, `None` once no more answers
    /// can be produced
    fn request(&mut self, index: usize, total: usize, available: usize) -> Option<usize>;

    /// Called when a request was refused and is about to be asked again
    fn rejected(&mut self, _index: usize, _reason: Rejection) {}
}

/// Source used when the mode never prompts
pub struct NoAllocation;

impl AllocationSource for NoAllocation {
    fn request(&mut self, _index: usize, _total: usize, _available: usize) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Default)]
struct ProxyGroup {
    endpoints: Vec<ProxyEndpoint>,
    cursor: usize,
}

/// Proxy list partitioned into disjoint per-account groups
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    total: usize,
    order: Vec<Credential>,
    groups: HashMap<Credential, ProxyGroup>,
}

impl ProxyPool {
    /// Build the groups for `accounts` from `proxies`
    pub fn partition(
        accounts: &[Credential],
        proxies: Vec<ProxyEndpoint>,
        mode: DistributionMode,
        source: &mut dyn AllocationSource,
    ) -> Result<Self> {
        if accounts.is_empty() {
            return Err(Error::Configuration("no accounts to assign proxies to".to_string()));
        }
        let proxies = dedup(proxies);
        if proxies.is_empty() {
            return Err(Error::Configuration(
                "proxy use is enabled but the proxy list is empty".to_string(),
            ));
        }

        let slices = match mode {
            DistributionMode::Even => even_slices(accounts.len(), &proxies),
            DistributionMode::Manual => manual_slices(accounts.len(), &proxies, source)?,
        };

        let mut groups = HashMap::with_capacity(accounts.len());
        for (account, endpoints) in accounts.iter().zip(slices) {
            groups.insert(account.clone(), ProxyGroup { endpoints, cursor: 0 });
        }

        Ok(Self {
            total: proxies.len(),
            order: accounts.to_vec(),
            groups,
        })
    }

    /// Endpoint at the account's cursor, advancing the cursor
    pub fn next(&mut self, account: &Credential) -> Option<ProxyEndpoint> {
        let group = self.groups.get_mut(account)?;
        if group.endpoints.is_empty() {
            return None;
        }
        let endpoint = group.endpoints[group.cursor].clone();
        group.cursor = (group.cursor + 1) % group.endpoints.len();
        Some(endpoint)
    }

    pub fn group(&self, account: &Credential) -> Option<&[ProxyEndpoint]> {
        self.groups.get(account).map(|g| g.endpoints.as_slice())
    }

    /// Every account with its group, in account order
    pub fn assignments(&self) -> Vec<(&Credential, &[ProxyEndpoint])> {
        self.order
            .iter()
            .map(|a| (a, self.group(a).unwrap_or(&[])))
            .collect()
    }

    /// Group sizes in account order
    pub fn group_sizes(&self) -> Vec<usize> {
        self.assignments()
            .into_iter()
            .map(|(_, group)| group.len())
            .collect()
    }

    /// Number of distinct proxies the pool was built from
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn unassigned(&self) -> usize {
        self.total - self.group_sizes().iter().sum::<usize>()
    }
}

fn dedup(proxies: Vec<ProxyEndpoint>) -> Vec<ProxyEndpoint> {
    let mut seen = HashSet::new();
    let before = proxies.len();
    let unique: Vec<_> = proxies.into_iter().filter(|p| seen.insert(p.clone())).collect();
    if unique.len() < before {
        logger::warning(format!("Dropped {} duplicate proxies", before - unique.len()));
    }
    unique
}

fn even_slices(accounts: usize, proxies: &[ProxyEndpoint]) -> Vec<Vec<ProxyEndpoint>> {
    let per_account = proxies.len() / accounts;
    if per_account == 0 {
        logger::warning(format!(
            "Only {} proxies for {} accounts; earlier accounts run without a proxy",
            proxies.len(),
            accounts
        ));
    }
    (0..accounts)
        .map(|i| {
            let start = i * per_account;
            let end = if i == accounts - 1 {
                proxies.len()
            } else {
                start + per_account
            };
            proxies[start..end].to_vec()
        })
        .collect()
}

fn manual_slices(
    accounts: usize,
    proxies: &[ProxyEndpoint],
    source: &mut dyn AllocationSource,
) -> Result<Vec<Vec<ProxyEndpoint>>> {
    let mut claimed = 0;
    let mut slices = Vec::with_capacity(accounts);

    for index in 0..accounts {
        let count = loop {
            let available = proxies.len() - claimed;
            let requested = source.request(index, proxies.len(), available).ok_or_else(|| {
                Error::Configuration(format!("no proxy count supplied for token {}", index + 1))
            })?;
            match check_request(requested, available) {
                Ok(count) => break count,
                Err(reason) => {
                    logger::error(format!("Invalid count for token {}: {}", index + 1, reason));
                    source.rejected(index, reason);
                }
            }
        };
        slices.push(proxies[claimed..claimed + count].to_vec());
        claimed += count;
    }

    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyScheme;
    use std::collections::VecDeque;

    fn accounts(n: usize) -> Vec<Credential> {
        (0..n).map(|i| Credential::new(format!("token-{}", i)).unwrap()).collect()
    }

    fn proxies(n: usize) -> Vec<ProxyEndpoint> {
        (0..n)
            .map(|i| ProxyEndpoint::new(ProxyScheme::Http, format!("10.0.0.{}", i + 1), 8080))
            .collect()
    }

    struct Scripted {
        answers: VecDeque<usize>,
        rejections: Vec<(usize, Rejection)>,
    }

    impl Scripted {
        fn new(answers: &[usize]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                rejections: Vec::new(),
            }
        }
    }

    impl AllocationSource for Scripted {
        fn request(&mut self, _index: usize, _total: usize, _available: usize) -> Option<usize> {
            self.answers.pop_front()
        }

        fn rejected(&mut self, index: usize, reason: Rejection) {
            self.rejections.push((index, reason));
        }
    }

    #[test]
    fn test_even_three_by_nine() {
        let accts = accounts(3);
        let pool =
            ProxyPool::partition(&accts, proxies(9), DistributionMode::Even, &mut NoAllocation)
                .unwrap();
        assert_eq!(pool.group_sizes(), vec![3, 3, 3]);
        assert_eq!(pool.group(&accts[1]).unwrap()[0].host, "10.0.0.4");
        assert_eq!(pool.unassigned(), 0);
    }

    #[test]
    fn test_even_last_account_takes_remainder() {
        let pool = ProxyPool::partition(
            &accounts(3),
            proxies(11),
            DistributionMode::Even,
            &mut NoAllocation,
        )
        .unwrap();
        assert_eq!(pool.group_sizes(), vec![3, 3, 5]);
    }

    #[test]
    fn test_even_partition_is_disjoint_and_complete() {
        for n_accounts in 1..=6 {
            for n_proxies in n_accounts..=20 {
                let accts = accounts(n_accounts);
                let pool = ProxyPool::partition(
                    &accts,
                    proxies(n_proxies),
                    DistributionMode::Even,
                    &mut NoAllocation,
                )
                .unwrap();

                let sizes = pool.group_sizes();
                assert_eq!(sizes.iter().sum::<usize>(), n_proxies);
                assert!(sizes.iter().all(|&s| s > 0));

                let mut seen = HashSet::new();
                for account in &accts {
                    for endpoint in pool.group(account).unwrap() {
                        assert!(seen.insert(endpoint.clone()), "endpoint assigned twice");
                    }
                }
            }
        }
    }

    #[test]
    fn test_even_with_fewer_proxies_than_accounts() {
        let pool = ProxyPool::partition(
            &accounts(3),
            proxies(2),
            DistributionMode::Even,
            &mut NoAllocation,
        )
        .unwrap();
        assert_eq!(pool.group_sizes(), vec![0, 0, 2]);
    }

    #[test]
    fn test_empty_inputs_are_configuration_errors() {
        let err = ProxyPool::partition(
            &accounts(2),
            Vec::new(),
            DistributionMode::Even,
            &mut NoAllocation,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err =
            ProxyPool::partition(&[], proxies(3), DistributionMode::Even, &mut NoAllocation)
                .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_duplicate_proxies_are_dropped() {
        let mut list = proxies(3);
        list.push(list[0].clone());
        let pool =
            ProxyPool::partition(&accounts(1), list, DistributionMode::Even, &mut NoAllocation)
                .unwrap();
        assert_eq!(pool.total(), 3);
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let accts = accounts(2);
        let mut pool =
            ProxyPool::partition(&accts, proxies(6), DistributionMode::Even, &mut NoAllocation)
                .unwrap();

        let hosts: Vec<String> = (0..7).map(|_| pool.next(&accts[1]).unwrap().host).collect();
        assert_eq!(
            hosts,
            vec!["10.0.0.4", "10.0.0.5", "10.0.0.6", "10.0.0.4", "10.0.0.5", "10.0.0.6", "10.0.0.4"]
        );
        // the other account's cursor is untouched
        assert_eq!(pool.next(&accts[0]).unwrap().host, "10.0.0.1");
    }

    #[test]
    fn test_round_robin_fairness() {
        let accts = accounts(1);
        let group_size = 4;
        for k in 0..30 {
            let mut pool = ProxyPool::partition(
                &accts,
                proxies(group_size),
                DistributionMode::Even,
                &mut NoAllocation,
            )
            .unwrap();
            let mut counts: HashMap<String, usize> = HashMap::new();
            for _ in 0..k {
                *counts.entry(pool.next(&accts[0]).unwrap().host).or_default() += 1;
            }
            for endpoint in proxies(group_size) {
                let c = counts.get(&endpoint.host).copied().unwrap_or(0);
                assert!(c == k / group_size || c == (k + group_size - 1) / group_size);
            }
        }
    }

    #[test]
    fn test_next_without_group() {
        let accts = accounts(3);
        let mut pool =
            ProxyPool::partition(&accts, proxies(2), DistributionMode::Even, &mut NoAllocation)
                .unwrap();
        assert!(pool.next(&accts[0]).is_none());
        assert!(pool.next(&Credential::new("stranger").unwrap()).is_none());
        assert!(ProxyPool::default().next(&accts[2]).is_none());
    }

    #[test]
    fn test_manual_assigns_first_unclaimed() {
        let accts = accounts(3);
        let mut source = Scripted::new(&[2, 3, 4]);
        let pool =
            ProxyPool::partition(&accts, proxies(10), DistributionMode::Manual, &mut source)
                .unwrap();
        assert_eq!(pool.group_sizes(), vec![2, 3, 4]);
        assert_eq!(pool.group(&accts[1]).unwrap()[0].host, "10.0.0.3");
        assert_eq!(pool.group(&accts[2]).unwrap()[0].host, "10.0.0.6");
        assert_eq!(pool.unassigned(), 1);
        assert!(source.rejections.is_empty());
    }

    #[test]
    fn test_manual_zero_request_is_rejected_and_reprompted() {
        let accts = accounts(3);
        let mut source = Scripted::new(&[2, 7, 0]);
        let err = ProxyPool::partition(&accts, proxies(9), DistributionMode::Manual, &mut source)
            .unwrap_err();

        assert_eq!(source.rejections, vec![(2, Rejection::BelowMinimum)]);
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_manual_excess_request_is_reprompted() {
        let accts = accounts(2);
        let mut source = Scripted::new(&[5, 0, 6, 4]);
        let pool = ProxyPool::partition(&accts, proxies(9), DistributionMode::Manual, &mut source)
            .unwrap();

        assert_eq!(pool.group_sizes(), vec![5, 4]);
        assert_eq!(
            source.rejections,
            vec![
                (1, Rejection::BelowMinimum),
                (
                    1,
                    Rejection::ExceedsAvailable {
                        requested: 6,
                        available: 4
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_check_request() {
        assert_eq!(check_request(3, 3), Ok(3));
        assert_eq!(check_request(0, 3), Err(Rejection::BelowMinimum));
        assert!(matches!(
            check_request(4, 3),
            Err(Rejection::ExceedsAvailable { .. })
        ));
    }

    #[test]
    fn test_distribution_mode_from_str() {
        assert_eq!("even".parse::<DistributionMode>().unwrap(), DistributionMode::Even);
        assert_eq!("2".parse::<DistributionMode>().unwrap(), DistributionMode::Manual);
        assert!("random".parse::<DistributionMode>().is_err());
    }
}
