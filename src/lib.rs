//! **rearrange**: walk through every open window and put it somewhere new
//! with the mouse.
//!
//! Each eligible window is shown as a ghost rectangle that follows the
//! pointer.  A click places it, a second click sizes it, and the window is
//! moved (and optionally sent to another workspace) before the next one comes
//! up.  Window and monitor edges act as magnets along the way.
//!
//! # Architecture
//!
//! The crate is organised around two core traits:
//!
//! * [`traits::PlatformBackend`] abstracts the native window system so the
//!   interaction logic is not coupled to X11, Win32 or macOS.
//! * [`traits::CommandSource`] abstracts the transport that delivers pointer
//!   and keyboard events (a Unix socket, stdin, …).
//!
//! [`controller::Controller`] is the state machine between them.  It reads
//! windows from a [`collection::WindowsCollection`], snaps ghosts with
//! [`snapping::SnappingIndex`] and publishes
//! [`traits::DisplayState`] snapshots for whatever draws the overlay.
//! Concrete backends live in [`backend`] and transports in [`ipc`].

pub mod backend;
pub mod collection;
pub mod command;
pub mod config;
pub mod controller;
pub mod eligibility;
pub mod geometry;
pub mod ipc;
pub mod model;
pub mod persist;
pub mod snapping;
pub mod traits;
