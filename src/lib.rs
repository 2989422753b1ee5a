//! Lightsync is a peer-to-peer synchronization engine for Bitcoin SPV light-clients.
//!
//! The project is broken down into the following crates:
//!
//! * [`p2p`]: the peer group, peer protocol and address pool
//! * [`net`]: the transport boundary, and time
//! * [`common`]: common types used by all crates, eg. messages and blocks
//!
//! The [`p2p`] crate is intended to be the entry point for most users of the
//! library, and is a good place to start, to see how everything fits together.

#[cfg(feature = "lightsync-common")]
pub use lightsync_common as common;
#[cfg(feature = "lightsync-net")]
pub use lightsync_net as net;
#[cfg(feature = "lightsync-p2p")]
pub use lightsync_p2p as p2p;

#[cfg(test)]
#[cfg(feature = "lightsync-test")]
pub use lightsync_test as test;
