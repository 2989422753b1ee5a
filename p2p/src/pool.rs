//! Peer address pool.
//!
//! Keeps track of candidate peer addresses, along with their connection history,
//! and hands out the next address to dial. Addresses that were never tried are
//! preferred, followed by addresses with fewer failures, then by addresses that
//! were tried least recently. Remaining ties are broken by insertion order.
//!
//! An address handed out by [`AddressPool::next_address`] is *in use* until it is
//! released, either explicitly or by recording a failure. Addresses in use are
//! never handed out twice.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::{fs, io, net};

use log::*;
use microserde::json::Value;
use thiserror::Error;

use lightsync_common::p2p::peer::{KnownAddress, Source};
use lightsync_net::{Clock, SystemClock};

/// No address is available to dial.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no peer address available")]
pub struct NoAddressAvailable;

/// A pool of peer addresses.
#[derive(Debug)]
pub struct AddressPool<C = SystemClock> {
    /// Known addresses, in insertion order.
    addrs: Vec<KnownAddress>,
    /// Index of every address in `addrs`.
    index: HashMap<net::SocketAddr, usize>,
    /// Addresses handed out and not released yet.
    in_use: HashSet<net::SocketAddr>,
    clock: C,
}

impl Default for AddressPool {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> AddressPool<C> {
    /// Create an empty pool.
    pub fn new(clock: C) -> Self {
        Self {
            addrs: Vec::new(),
            index: HashMap::new(),
            in_use: HashSet::new(),
            clock,
        }
    }

    /// Number of known addresses.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Iterate over known addresses, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KnownAddress> {
        self.addrs.iter()
    }

    /// Get a known address.
    pub fn get(&self, addr: &net::SocketAddr) -> Option<&KnownAddress> {
        self.index.get(addr).map(|ix| &self.addrs[*ix])
    }

    /// Whether the address is currently handed out.
    pub fn is_in_use(&self, addr: &net::SocketAddr) -> bool {
        self.in_use.contains(addr)
    }

    /// Add an address to the pool. Returns `false` if it was already known, in
    /// which case its history is kept.
    pub fn insert(&mut self, addr: net::SocketAddr, source: Source) -> bool {
        if self.index.contains_key(&addr) {
            return false;
        }
        self.index.insert(addr, self.addrs.len());
        self.addrs.push(KnownAddress::new(addr, source));

        true
    }

    /// Add addresses to the pool. Returns the number of new addresses.
    pub fn extend(
        &mut self,
        addrs: impl IntoIterator<Item = net::SocketAddr>,
        source: Source,
    ) -> usize {
        addrs
            .into_iter()
            .filter(|addr| self.insert(*addr, source))
            .count()
    }

    /// Resolve seed hostnames and add the resulting addresses. Seeds that fail to
    /// resolve are skipped. Errors only if no address at all was added.
    pub fn seed<S: net::ToSocketAddrs + std::fmt::Debug>(
        &mut self,
        seeds: impl IntoIterator<Item = S>,
    ) -> io::Result<usize> {
        let mut added = 0;
        let mut error = None;

        for seed in seeds {
            match seed.to_socket_addrs() {
                Ok(addrs) => {
                    let n = self.extend(addrs, Source::Dns);

                    debug!(target: "p2p", "Seed {:?} resolved to {} new address(es)", seed, n);
                    added += n;
                }
                Err(err) => {
                    warn!(target: "p2p", "Failed to resolve seed {:?}: {}", seed, err);
                    error = Some(err);
                }
            }
        }
        match error {
            Some(err) if added == 0 => Err(err),
            _ => Ok(added),
        }
    }

    /// Hand out the next address to dial. The address is in use until released.
    pub fn next_address(&mut self) -> Result<net::SocketAddr, NoAddressAvailable> {
        let (ix, _) = self
            .addrs
            .iter()
            .enumerate()
            .filter(|(_, ka)| !self.in_use.contains(&ka.addr))
            .min_by_key(|(ix, ka)| (ka.is_tried(), ka.failure_count, ka.last_attempt, *ix))
            .ok_or(NoAddressAvailable)?;

        let ka = &mut self.addrs[ix];

        ka.last_attempt = Some(self.clock.local_time());
        self.in_use.insert(ka.addr);

        Ok(ka.addr)
    }

    /// Record a successful connection. The address stays in use. Unknown addresses
    /// are added.
    pub fn mark_success(&mut self, addr: &net::SocketAddr) {
        let now = self.clock.local_time();
        let ka = self.entry(addr);

        ka.success_count = ka.success_count.saturating_add(1);
        ka.last_success = Some(now);
    }

    /// Record a failed connection attempt and release the address. Unknown
    /// addresses are added.
    pub fn mark_failure(&mut self, addr: &net::SocketAddr) {
        let now = self.clock.local_time();
        let ka = self.entry(addr);

        ka.failure_count = ka.failure_count.saturating_add(1);
        ka.last_attempt.get_or_insert(now);

        self.in_use.remove(addr);
    }

    /// Make an address available again.
    pub fn release(&mut self, addr: &net::SocketAddr) {
        self.in_use.remove(addr);
    }

    /// Load addresses from a JSON file. Addresses already known are skipped.
    /// A missing file is treated as empty.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> io::Result<usize> {
        let s = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let val = microserde::json::from_str(&s)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;
        let Value::Array(ary) = val else {
            return Err(io::ErrorKind::InvalidData.into());
        };
        let mut added = 0;

        for v in ary {
            let ka = KnownAddress::from_json(v)
                .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;

            if self.index.contains_key(&ka.addr) {
                continue;
            }
            self.index.insert(ka.addr, self.addrs.len());
            self.addrs.push(ka);
            added += 1;
        }
        Ok(added)
    }

    /// Save all addresses to a JSON file, replacing its contents.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        use io::Write;

        let list: microserde::json::Array = self.addrs.iter().map(|a| a.to_json()).collect();
        let s = microserde::json::to_string(&Value::Array(list));
        let mut file = fs::File::create(path)?;

        file.write_all(s.as_bytes())?;
        file.sync_data()?;

        Ok(())
    }

    fn entry(&mut self, addr: &net::SocketAddr) -> &mut KnownAddress {
        if !self.index.contains_key(addr) {
            self.insert(*addr, Source::Imported);
        }
        let ix = self.index[addr];

        &mut self.addrs[ix]
    }
}
