//! Non-blocking send, non-blocking receive, and the blocking wait built on
//! top of it (spec.md §4.3).
//!
//! Every function here takes the bytes it needs out of one `Port` lock
//! before touching the next (see `src/port.rs`'s module doc) so no two of
//! `Port`'s internal mutexes are ever held at the same time.

use std::io;

use crate::bufstat::BufStat;
use crate::constants::{EC_MAXBUF, EC_MAXECATFRAME, ETH_HEADER_SIZE, ETH_P_ECAT, RX_PRIM, RX_SEC};
use crate::frame::{ethercat_index, ethercat_length, ethertype, read_wkc_at, set_ethercat_index, set_source_word1, source_word1, Wkc};
use crate::port::Port;
use crate::stack::Direction;
use crate::timer::Timer;

/// The number of payload bytes to copy out of a capture for slot `i`:
/// `txbuflength[i] - ETH_HEADER_SIZE`, per spec.md §4.3 ("copy payload
/// ... for exactly txbuflength[idx] − ethernet_header_size bytes") and
/// `ecx_inframe`'s verbatim `(*stack->txbuflength)[idx] - ETH_HEADERSIZE`
/// — the length of the *outstanding request*, not of whatever happened
/// to arrive on the wire. Clamped to the scratch buffer's capacity so a
/// corrupted `txbuflength` can't drive an out-of-bounds copy.
fn tx_payload_len(port: &Port, i: usize) -> usize {
    let tx = port.tx.lock().unwrap();
    tx.len[i]
        .saturating_sub(ETH_HEADER_SIZE)
        .min(EC_MAXECATFRAME - ETH_HEADER_SIZE)
}

fn send_via(port: &Port, dir: Direction, frame: &[u8]) -> io::Result<usize> {
    let bank = match dir {
        Direction::Primary => port.primary_rx.lock().unwrap(),
        Direction::Secondary => port.secondary_rx.lock().unwrap(),
    };
    match bank.as_ref() {
        Some(bank) => bank.link.send(frame),
        None => Err(io::Error::new(io::ErrorKind::NotConnected, "link not attached")),
    }
}

/// Write slot `idx`'s transmit buffer to the socket for `dir`, and mark
/// the slot `Tx` on that stack. Returns bytes written, or a negative
/// value on failure (spec.md §4.3, §6).
pub fn out_frame(port: &Port, idx: usize, dir: Direction) -> isize {
    let mut local = [0u8; EC_MAXECATFRAME];
    let len = {
        let tx = port.tx.lock().unwrap();
        let len = tx.len[idx];
        local[..len].copy_from_slice(&tx.buf[idx][..len]);
        len
    };
    match send_via(port, dir, &local[..len]) {
        Ok(n) => {
            port.set_stat_one(idx, dir, BufStat::Tx);
            n as isize
        }
        Err(e) => {
            log::debug!("out_frame({idx}, {dir:?}) failed: {e}");
            -1
        }
    }
}

/// Transmit with the redundancy echo (spec.md §4.3): always send the
/// primary slot after stamping its source-MAC second word with the
/// primary route identifier; if redundant, additionally send the dummy
/// broadcast-read frame on the secondary interface, stamped with `idx`
/// and the secondary route identifier.
pub fn out_frame_red(port: &Port, idx: usize) -> isize {
    {
        let mut tx = port.tx.lock().unwrap();
        set_source_word1(&mut tx.buf[idx], RX_PRIM);
    }
    let primary_result = out_frame(port, idx, Direction::Primary);

    if port.is_redundant() {
        let mut local = [0u8; EC_MAXECATFRAME];
        let len = {
            let mut tx = port.tx.lock().unwrap();
            set_source_word1(&mut tx.buf2, RX_SEC);
            if tx.len2 >= ETH_HEADER_SIZE + 4 {
                set_ethercat_index(&mut tx.buf2[ETH_HEADER_SIZE..], idx as u8);
            }
            let len = tx.len2;
            local[..len].copy_from_slice(&tx.buf2[..len]);
            len
        };
        match send_via(port, Direction::Secondary, &local[..len]) {
            Ok(_) => port.set_stat_one(idx, Direction::Secondary, BufStat::Tx),
            Err(e) => log::debug!("secondary dummy transmit failed: {e}"),
        }
    }

    primary_result
}

fn wkc_from_payload(payload: &[u8]) -> Wkc {
    if payload.is_empty() {
        return Wkc::OtherFrame;
    }
    let offset = ethercat_length(payload) as usize;
    match read_wkc_at(payload, offset) {
        Some(wkc) => Wkc::Value(wkc),
        None => Wkc::OtherFrame,
    }
}

/// Non-blocking receive for slot `idx` on stack `dir` (spec.md §4.3).
///
/// If the slot was already parked as `Rcvd` by an earlier call that was
/// waiting on a different index, delivers it immediately without
/// touching the socket. Otherwise pulls at most one frame off the wire:
/// a frame matching `idx` completes the slot and returns its working
/// counter; a frame for a different in-range index is parked in its own
/// slot as `Rcvd`; anything else (no frame, wrong ethertype, out-of-range
/// index) is reported as `NoFrame`/`OtherFrame` without touching slot
/// state.
pub fn in_frame(port: &Port, idx: usize, dir: Direction) -> Wkc {
    if port.buf_stat(idx, dir) == BufStat::Rcvd {
        port.set_stat_one(idx, dir, BufStat::Complete);
        return wkc_from_payload(&port.rx_payload(idx, dir));
    }

    let mut bank_guard = match dir {
        Direction::Primary => port.primary_rx.lock().unwrap(),
        Direction::Secondary => port.secondary_rx.lock().unwrap(),
    };
    let bank = match bank_guard.as_mut() {
        Some(bank) => bank,
        None => return Wkc::NoFrame,
    };

    let len = match bank.link.recv(&mut bank.tempbuf) {
        Ok(Some(len)) => len,
        Ok(None) => return Wkc::NoFrame,
        Err(e) => {
            log::debug!("in_frame recv error: {e}");
            return Wkc::NoFrame;
        }
    };
    if len < ETH_HEADER_SIZE {
        return Wkc::OtherFrame;
    }
    let frame = &bank.tempbuf[..len];
    if ethertype(frame) != ETH_P_ECAT {
        log::trace!("dropped frame with unexpected ethertype (filter should have excluded this)");
        return Wkc::OtherFrame;
    }
    let source_word = source_word1(frame);
    if len == ETH_HEADER_SIZE {
        return Wkc::OtherFrame;
    }
    let idxf = usize::from(ethercat_index(&bank.tempbuf[ETH_HEADER_SIZE..len]));

    if idxf == idx {
        let copy_len = tx_payload_len(port, idx);
        bank.rx[idx][..copy_len].copy_from_slice(&bank.tempbuf[ETH_HEADER_SIZE..ETH_HEADER_SIZE + copy_len]);
        bank.rxlen[idx] = copy_len;
        bank.rxsa[idx] = source_word;
        let payload = bank.rx[idx][..copy_len].to_vec();
        drop(bank_guard);
        port.set_stat_one(idx, dir, BufStat::Complete);
        wkc_from_payload(&payload)
    } else if idxf < EC_MAXBUF {
        let copy_len = tx_payload_len(port, idxf);
        bank.rx[idxf][..copy_len].copy_from_slice(&bank.tempbuf[ETH_HEADER_SIZE..ETH_HEADER_SIZE + copy_len]);
        bank.rxlen[idxf] = copy_len;
        bank.rxsa[idxf] = source_word;
        drop(bank_guard);
        port.set_stat_one(idxf, dir, BufStat::Rcvd);
        Wkc::OtherFrame
    } else {
        log::warn!("received frame with out-of-range index {idxf}");
        Wkc::OtherFrame
    }
}

/// Poll `in_frame` on the primary stack until a working counter arrives
/// or `timeout_us` elapses, at which point the slot is reset to `Empty`
/// on both stacks (spec.md §4.3).
pub fn wait_in_frame(port: &Port, idx: usize, timeout_us: u64) -> Wkc {
    let timer = Timer::start(timeout_us);
    loop {
        let result = in_frame(port, idx, Direction::Primary);
        if result.is_frame() {
            return result;
        }
        if timer.expired() {
            port.set_buf_stat(idx, BufStat::Empty);
            return Wkc::NoFrame;
        }
        std::thread::yield_now();
    }
}
