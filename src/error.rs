//! The one error type this crate ever returns.
//!
//! Per spec.md §7, only link-setup failures are allowed to propagate as
//! `Result`s; everything downstream of a successfully opened link reports
//! outcomes through [`crate::frame::Wkc`] instead.

use std::io;

/// Fatal failure while attaching a [`crate::port::Port`] to a NIC.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// No capture-capable raw socket could be opened at all.
    #[error("could not open a raw EtherCAT capture socket: {0}")]
    NoCaptureDevice(#[source] io::Error),

    /// The raw socket could not be bound to the requested interface.
    #[error("could not bind interface {ifname:?} to the capture socket: {source}")]
    BindInterface {
        ifname: String,
        #[source]
        source: io::Error,
    },

    /// The interface name does not fit in the kernel's `ifreq` buffer.
    #[error("interface name {ifname:?} is longer than IFNAMSIZ ({max} bytes)")]
    InterfaceNameTooLong { ifname: String, max: usize },

    /// Installing the ethertype/direction classic-BPF filter failed.
    #[error("could not install the EtherCAT capture filter: {0}")]
    FilterInstall(#[source] io::Error),

    /// A socket option required for correct capture behavior could not be set.
    #[error("could not configure capture socket option {name}: {source}")]
    ConfigureSocket {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// `setup_nic(secondary = true)` was called on a [`crate::port::Port`]
    /// that was not constructed with [`crate::port::Port::new_redundant`].
    #[error("secondary NIC setup requested but no redundant port is allocated")]
    MissingRedPort,
}
