//! Built-in security test modules for sectoolbox.
//!
//! Each module implements [`sectoolbox_core::SecurityTest`] and is added to the runner's catalog by
//! [`register_builtin`]. Registration order is menu order.
//!
//! | name                  | what it does                                                  |
//! |-----------------------|---------------------------------------------------------------|
//! | `cookie-verification` | Secure/HttpOnly/SameSite audit of pasted or fetched cookies    |
//! | `header-check`        | missing hardening headers and version disclosure               |
//! | `tcp-reachability`    | single TCP connect with latency                                |
//! | `tcp-burst`           | concurrent TCP connects with failure counts and percentiles    |
//! | `intruder`            | concurrent HTTP requests with status counts and percentiles    |

mod burst;
pub mod cookies;
pub mod headers;
mod http;
pub mod intruder;
pub mod tcp;

use sectoolbox_core::CandidateSet;

pub use cookies::CookieVerification;
pub use burst::LatencyStats;
pub use headers::HeaderCheck;
pub use intruder::Intruder;
pub use tcp::{TcpBurst, TcpReachability};

/// Add every built-in module to `set`.
pub fn register_builtin(set: &mut CandidateSet) {
    set.register_instance(concat!(module_path!(), "::cookies"), CookieVerification)
        .register_instance(concat!(module_path!(), "::headers"), HeaderCheck)
        .register_instance(concat!(module_path!(), "::tcp::reachability"), TcpReachability)
        .register_instance(concat!(module_path!(), "::tcp::burst"), TcpBurst)
        .register_instance(concat!(module_path!(), "::intruder"), Intruder);
}
