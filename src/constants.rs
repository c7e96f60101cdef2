//! Fixed-size budget and wire constants for the frame transport core.
//!
//! Everything here is a compile-time constant so the hot send/receive path
//! never has to consult configuration at runtime, matching spec.md's
//! "no dynamic memory allocation on the hot path" non-goal.

/// Number of frame-index slots in a port's buffer bank (`EC_MAXBUF`).
pub const EC_MAXBUF: usize = 16;

/// Maximum size of a captured/transmitted Ethernet frame (`EC_MAXECATFRAME`).
pub const EC_MAXECATFRAME: usize = 1518;

/// Size of an Ethernet header: 2 x 6 byte MAC + 2 byte ethertype.
pub const ETH_HEADER_SIZE: usize = 14;

/// EtherCAT ethertype, network byte order when placed on the wire.
pub const ETH_P_ECAT: u16 = 0x88A4;

/// Partial-retry timeout used inside redundancy recovery, in microseconds
/// (`EC_TIMEOUTRET`).
pub const EC_TIMEOUTRET: u64 = 2000;

/// Second word of the primary route's private source-MAC identifier.
pub const RX_PRIM: u16 = 0x0101;

/// Second word of the secondary route's private source-MAC identifier.
pub const RX_SEC: u16 = 0x0202;

/// First and third words of the primary/secondary source-MAC identifiers.
///
/// These are conventional but arbitrary, per spec.md §6: only the second
/// word (`RX_PRIM`/`RX_SEC`) is ever read back by this core.
pub const PRIMARY_MAC: [u16; 3] = [0x0101, RX_PRIM, 0x0101];
pub const SECONDARY_MAC: [u16; 3] = [0x0202, RX_SEC, 0x0202];

/// Destination MAC used on every transmitted frame: broadcast.
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];
