//! In-process worker links.
//!
//! Connects a worker straight to a [`LeaderHub`] without a socket. Used by
//! tests and by embedders that run leader and workers in one runtime.

use super::{LeaderHub, WorkerLink};

/// Attach `worker` to `hub` and return its end of the channel.
#[must_use]
pub fn connect(hub: &LeaderHub, worker: &str) -> WorkerLink {
    let attachment = hub.attach(worker);
    WorkerLink {
        inbound: attachment.rx,
        reporter: hub.status_reporter(),
    }
}
