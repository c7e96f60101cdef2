//! Process-wide compatibility façade (spec.md §9 "Global/process-wide
//! state"), mirroring the original's `#ifdef EC_VER1` block of `ec_*`
//! wrappers that bind every `ecx_*` call to one default context. New code
//! should prefer the explicit [`crate::port::Port`]-taking API; this
//! module exists only for callers ported from code that assumed a single
//! global master instance.

use std::sync::OnceLock;

use crate::bufstat::BufStat;
use crate::engine;
use crate::frame::Wkc;
use crate::link::LinkConfig;
use crate::port::Port;
use crate::stack::Direction;

static DEFAULT_PORT: OnceLock<Port> = OnceLock::new();

/// The process-wide default port. Always allocated with redundancy
/// capacity, matching the original's unconditional static `redport`
/// struct — whether it is ever attached to a second interface is
/// decided at `setup_nic` time, not at allocation time.
fn default_port() -> &'static Port {
    DEFAULT_PORT.get_or_init(Port::new_redundant)
}

pub fn setup_nic(ifname: &str, secondary: bool, config: LinkConfig) -> i32 {
    match default_port().setup_nic(ifname, secondary, config) {
        Ok(()) => 1,
        Err(e) => {
            log::error!("setup_nic({ifname:?}) failed: {e}");
            0
        }
    }
}

pub fn close_nic() -> i32 {
    default_port().close_nic();
    0
}

pub fn get_index() -> usize {
    default_port().get_index()
}

pub fn set_buf_stat(idx: usize, state: BufStat) {
    default_port().set_buf_stat(idx, state);
}

pub fn out_frame(idx: usize, dir: Direction) -> isize {
    engine::out_frame(default_port(), idx, dir)
}

pub fn out_frame_red(idx: usize) -> isize {
    engine::out_frame_red(default_port(), idx)
}

pub fn in_frame(idx: usize, dir: Direction) -> Wkc {
    engine::in_frame(default_port(), idx, dir)
}

pub fn wait_in_frame(idx: usize, timeout_us: u64) -> Wkc {
    engine::wait_in_frame(default_port(), idx, timeout_us)
}

pub fn src_confirm(idx: usize, timeout_us: u64) -> Wkc {
    crate::confirm::src_confirm(default_port(), idx, timeout_us)
}
