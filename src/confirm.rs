//! Send-and-confirm retry loop (spec.md §4.5).

use crate::bufstat::BufStat;
use crate::constants::EC_TIMEOUTRET;
use crate::engine::out_frame_red;
use crate::frame::Wkc;
use crate::port::Port;
use crate::redundancy::wait_in_frame_red;
use crate::timer::Timer;

/// Transmit `idx` (with the redundancy echo) and wait for its working
/// counter, retransmitting on every partial timeout until `timeout_us`
/// elapses overall. On final timeout the slot is reset to `Empty`.
pub fn src_confirm(port: &Port, idx: usize, timeout_us: u64) -> Wkc {
    let outer = Timer::start(timeout_us);
    loop {
        out_frame_red(port, idx);
        let inner_timeout = timeout_us.min(EC_TIMEOUTRET);
        let result = wait_in_frame_red(port, idx, inner_timeout);
        if result.is_frame() {
            return result;
        }
        if outer.expired() {
            log::debug!("src_confirm({idx}) timed out after {timeout_us}us");
            port.set_buf_stat(idx, BufStat::Empty);
            return Wkc::NoFrame;
        }
    }
}
