//! The port context: transmit/receive buffer banks, the frame-index
//! allocator, and NIC attachment (spec.md §3, §4.2, §4.6).
//!
//! Locking follows spec.md §5 in spirit but consolidates the original's
//! implicit per-field locking into three named [`Mutex`]s with
//! non-overlapping critical sections, so no two of them are ever held at
//! once (every function here copies the bytes it needs out of one lock
//! before taking the next, rather than nesting guards) — see DESIGN.md
//! for the full mapping from the three named locks in spec.md §5 to
//! `index`, `tx`, and the per-stack `primary_rx`/`secondary_rx`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::bufstat::BufStat;
use crate::constants::{EC_MAXBUF, EC_MAXECATFRAME, ETH_HEADER_SIZE, PRIMARY_MAC, RX_PRIM, RX_SEC, SECONDARY_MAC};
use crate::error::SetupError;
use crate::frame::write_ethernet_header;
use crate::link::{LinkConfig, RawLink};
use crate::stack::Direction;

#[cfg(target_os = "linux")]
use crate::link::PacketSocket;

/// Allocator and slot-state bookkeeping, guarded by a single lock
/// (`getindex_mutex` in spec.md §5). Both stacks' states live here so
/// `get_index`/`set_buf_stat` commit to both under one critical section,
/// matching "the allocator atomically sets both to Alloc" (spec.md §3).
struct IndexState {
    primary: [BufStat; EC_MAXBUF],
    secondary: [BufStat; EC_MAXBUF],
    lastidx: usize,
}

impl IndexState {
    fn new() -> Self {
        Self {
            primary: [BufStat::Empty; EC_MAXBUF],
            secondary: [BufStat::Empty; EC_MAXBUF],
            lastidx: EC_MAXBUF - 1,
        }
    }

    fn stat_mut(&mut self, dir: Direction) -> &mut [BufStat; EC_MAXBUF] {
        match dir {
            Direction::Primary => &mut self.primary,
            Direction::Secondary => &mut self.secondary,
        }
    }
}

/// The shared transmit buffer bank (`txbuf`/`txbuflength`/`txbuf2` in
/// spec.md §3), guarded by one lock. The original only guards `txbuf2`
/// (its per-index `txbuf` writes happen under the composition layer's own
/// discipline, outside any EtherCAT-core lock); Rust requires a lock
/// around every mutation of shared state, so this one lock is a
/// conservative superset of the original's `tx_mutex`.
pub(crate) struct TxBank {
    pub(crate) buf: Box<[[u8; EC_MAXECATFRAME]; EC_MAXBUF]>,
    pub(crate) len: [usize; EC_MAXBUF],
    pub(crate) buf2: [u8; EC_MAXECATFRAME],
    pub(crate) len2: usize,
}

impl TxBank {
    fn new() -> Self {
        let mut bank = Self {
            buf: Box::new([[0u8; EC_MAXECATFRAME]; EC_MAXBUF]),
            len: [0; EC_MAXBUF],
            buf2: [0u8; EC_MAXECATFRAME],
            len2: ETH_HEADER_SIZE,
        };
        for slot in bank.buf.iter_mut() {
            write_ethernet_header(slot, PRIMARY_MAC);
        }
        write_ethernet_header(&mut bank.buf2, PRIMARY_MAC);
        bank
    }
}

/// One stack's receive side: payload storage, routing-tag memory, a
/// scratch capture buffer, and the link endpoint it reads from. `None`
/// until [`Port::setup_nic`] opens the corresponding interface.
pub(crate) struct RxBank {
    pub(crate) rx: Box<[[u8; EC_MAXECATFRAME]; EC_MAXBUF]>,
    pub(crate) rxlen: [usize; EC_MAXBUF],
    pub(crate) rxsa: [u16; EC_MAXBUF],
    pub(crate) tempbuf: [u8; EC_MAXECATFRAME],
    pub(crate) link: Box<dyn RawLink>,
}

impl RxBank {
    fn new(link: Box<dyn RawLink>) -> Self {
        Self {
            rx: Box::new([[0u8; EC_MAXECATFRAME]; EC_MAXBUF]),
            rxlen: [0; EC_MAXBUF],
            rxsa: [0; EC_MAXBUF],
            tempbuf: [0u8; EC_MAXECATFRAME],
            link,
        }
    }
}

/// Long-lived transport context: one or two NIC endpoints, their buffer
/// banks, and the frame-index allocator (spec.md §3's "port context").
pub struct Port {
    pub(crate) index: Mutex<IndexState>,
    pub(crate) tx: Mutex<TxBank>,
    pub(crate) primary_rx: Mutex<Option<RxBank>>,
    pub(crate) secondary_rx: Mutex<Option<RxBank>>,
    redport_allocated: AtomicBool,
    redundant: AtomicBool,
}

impl Default for Port {
    fn default() -> Self {
        Self::new()
    }
}

impl Port {
    /// A port with no redundant second interface allocated.
    pub fn new() -> Self {
        Self {
            index: Mutex::new(IndexState::new()),
            tx: Mutex::new(TxBank::new()),
            primary_rx: Mutex::new(None),
            secondary_rx: Mutex::new(None),
            redport_allocated: AtomicBool::new(false),
            redundant: AtomicBool::new(false),
        }
    }

    /// A port with capacity for a secondary interface pre-allocated, the
    /// equivalent of the original's caller-supplied `redport` struct
    /// (spec.md §4.6: "`secondary == true`: require a pre-allocated
    /// `redport`"). `setup_nic(_, true, _)` fails with
    /// [`SetupError::MissingRedPort`] without this having been called.
    pub fn new_redundant() -> Self {
        let port = Self::new();
        port.redport_allocated.store(true, Ordering::SeqCst);
        port
    }

    pub fn is_redundant(&self) -> bool {
        self.redundant.load(Ordering::SeqCst)
    }

    /// Open a raw link on `ifname` and wire it into the primary or
    /// secondary stack (spec.md §4.6). Pre-fills the Ethernet header of
    /// every transmit slot (and the dummy `txbuf2`) with the broadcast
    /// destination and the appropriate route identifier, and marks every
    /// slot `Empty`.
    pub fn setup_nic(&self, ifname: &str, secondary: bool, config: LinkConfig) -> Result<(), SetupError> {
        if secondary && !self.redport_allocated.load(Ordering::SeqCst) {
            log::error!("setup_nic(secondary=true) called without a pre-allocated redport");
            return Err(SetupError::MissingRedPort);
        }

        let link = open_link(ifname, config, secondary)?;
        self.wire_link(link, secondary, ifname);
        Ok(())
    }

    /// Wire a test [`crate::mock::MockLink`] (or any other [`RawLink`]) into
    /// the primary or secondary stack without opening a real NIC, for tests
    /// that need to script arrivals and drops (spec.md §8's testable
    /// properties). Bypasses the `redport_allocated` check `setup_nic`
    /// applies to real secondary attachment, since a test constructs
    /// exactly the topology it wants.
    pub fn attach_test_link(&self, dir: Direction, link: Box<dyn RawLink>) {
        let secondary = !dir.is_primary();
        self.wire_link(link, secondary, "test");
    }

    fn wire_link(&self, link: Box<dyn RawLink>, secondary: bool, ifname: &str) {
        let bank = RxBank::new(link);

        {
            let mut index = self.index.lock().unwrap();
            let stat = index.stat_mut(if secondary { Direction::Secondary } else { Direction::Primary });
            *stat = [BufStat::Empty; EC_MAXBUF];
        }

        if secondary {
            {
                let mut tx = self.tx.lock().unwrap();
                write_ethernet_header(&mut tx.buf2, SECONDARY_MAC);
            }
            *self.secondary_rx.lock().unwrap() = Some(bank);
            self.redundant.store(true, Ordering::SeqCst);
            log::info!("secondary EtherCAT link {ifname} attached, redundant mode active");
        } else {
            {
                let mut tx = self.tx.lock().unwrap();
                for slot in tx.buf.iter_mut() {
                    write_ethernet_header(slot, PRIMARY_MAC);
                }
                write_ethernet_header(&mut tx.buf2, PRIMARY_MAC);
            }
            *self.primary_rx.lock().unwrap() = Some(bank);
            log::info!("primary EtherCAT link {ifname} attached");
        }
    }

    /// Close both endpoints, if open. Dropping the [`RxBank`] drops its
    /// link, which closes the underlying socket.
    pub fn close_nic(&self) {
        self.primary_rx.lock().unwrap().take();
        self.secondary_rx.lock().unwrap().take();
        self.redundant.store(false, Ordering::SeqCst);
    }

    /// Write an already-composed EtherCAT payload (header onward,
    /// including its own frame-index byte) into transmit slot `idx`,
    /// appended after the slot's pre-filled Ethernet header. This is the
    /// hand-off point from the datagram-composition layer, which is out
    /// of scope here (spec.md §1).
    pub fn set_tx_payload(&self, idx: usize, payload: &[u8]) {
        let mut tx = self.tx.lock().unwrap();
        let end = (ETH_HEADER_SIZE + payload.len()).min(EC_MAXECATFRAME);
        let copy_len = end - ETH_HEADER_SIZE;
        tx.buf[idx][ETH_HEADER_SIZE..end].copy_from_slice(&payload[..copy_len]);
        tx.len[idx] = end;
    }

    /// Write the payload of the dummy "broadcast read" frame sent on the
    /// secondary interface during redundancy recovery (spec.md §4.3
    /// "Transmit with redundancy echo"). Composed once, like any other
    /// static cyclic command, by the out-of-scope datagram layer.
    pub fn set_dummy_payload(&self, payload: &[u8]) {
        let mut tx = self.tx.lock().unwrap();
        let end = (ETH_HEADER_SIZE + payload.len()).min(EC_MAXECATFRAME);
        let copy_len = end - ETH_HEADER_SIZE;
        tx.buf2[ETH_HEADER_SIZE..end].copy_from_slice(&payload[..copy_len]);
        tx.len2 = end;
    }

    /// Reserve a frame-index slot (spec.md §4.2). Probes from
    /// `(lastidx + 1) mod N` for an `Empty` slot on the primary stack and
    /// commits to the probed index regardless of whether one was found
    /// (Open Question (a) in spec.md §9 — kept verbatim, logged instead
    /// of silently overwriting).
    pub fn get_index(&self) -> usize {
        let mut index = self.index.lock().unwrap();
        let start = (index.lastidx + 1) % EC_MAXBUF;
        let mut chosen = start;
        let mut found = false;
        for offset in 0..EC_MAXBUF {
            let i = (start + offset) % EC_MAXBUF;
            if index.primary[i] == BufStat::Empty {
                chosen = i;
                found = true;
                break;
            }
        }
        if !found {
            log::warn!(
                "get_index: no Empty slot found after probing {EC_MAXBUF} indices, reusing index {chosen}"
            );
        }
        index.primary[chosen] = BufStat::Alloc;
        index.secondary[chosen] = BufStat::Alloc;
        index.lastidx = chosen;
        chosen
    }

    /// Set the state of `idx` on both stacks (spec.md §4.2).
    pub fn set_buf_stat(&self, idx: usize, state: BufStat) {
        let mut index = self.index.lock().unwrap();
        index.primary[idx] = state;
        index.secondary[idx] = state;
    }

    pub(crate) fn buf_stat(&self, idx: usize, dir: Direction) -> BufStat {
        let index = self.index.lock().unwrap();
        match dir {
            Direction::Primary => index.primary[idx],
            Direction::Secondary => index.secondary[idx],
        }
    }

    pub(crate) fn set_stat_one(&self, idx: usize, dir: Direction, state: BufStat) {
        let mut index = self.index.lock().unwrap();
        index.stat_mut(dir)[idx] = state;
    }

    /// Copy out the stored receive payload for `idx` on the given stack,
    /// for inspection by callers and tests. Empty if nothing has been
    /// stored there (or the stack is not attached).
    pub fn rx_payload(&self, idx: usize, dir: Direction) -> Vec<u8> {
        let bank = match dir {
            Direction::Primary => self.primary_rx.lock().unwrap(),
            Direction::Secondary => self.secondary_rx.lock().unwrap(),
        };
        match bank.as_ref() {
            Some(bank) => bank.rx[idx][..bank.rxlen[idx]].to_vec(),
            None => Vec::new(),
        }
    }

    /// The routing tag (source MAC second word) last observed for `idx`
    /// on the given stack. Meaningful only when that slot's state is
    /// `Rcvd` or `Complete` (spec.md §3).
    pub fn rx_source_word(&self, idx: usize, dir: Direction) -> u16 {
        let bank = match dir {
            Direction::Primary => self.primary_rx.lock().unwrap(),
            Direction::Secondary => self.secondary_rx.lock().unwrap(),
        };
        bank.as_ref().map(|bank| bank.rxsa[idx]).unwrap_or(0)
    }
}

fn open_link(ifname: &str, config: LinkConfig, secondary: bool) -> Result<Box<dyn RawLink>, SetupError> {
    let (primary_word0, secondary_word0) = (RX_PRIM, RX_SEC);
    let _ = secondary;
    #[cfg(target_os = "linux")]
    {
        let socket = PacketSocket::open(ifname, config, primary_word0, secondary_word0)?;
        Ok(Box::new(socket))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (ifname, config, primary_word0, secondary_word0);
        Err(SetupError::NoCaptureDevice(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "raw EtherCAT capture is only implemented for Linux",
        )))
    }
}
