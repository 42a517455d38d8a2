//! Containment for panics raised by test module code.
//!
//! Module code (constructors, contract methods and `run`) is called through [`contain`]. Besides
//! catching the unwind, `contain` marks the current thread so the process panic hook does not hand
//! the raw message to the default printer. The hook logs the panic through `tracing` instead, with
//! every secret registered for the thread replaced by [`REDACTED`].
//!
//! Panics on threads outside a `contain` call go to whatever hook was installed before.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::OnceLock;

use crate::resolver::REDACTED;

thread_local! {
    /// Secrets of the module call running on this thread, `None` outside [`contain`].
    static CONTAINED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

static HOOK: OnceLock<()> = OnceLock::new();

/// Install the containment hook once per process, chaining to the previous hook.
pub fn install_hook() {
    HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !log_contained(info) {
                previous(info);
            }
        }));
    });
}

/// Log a panic from a contained call. Returns `false` when the thread is not inside one.
fn log_contained(info: &PanicHookInfo<'_>) -> bool {
    CONTAINED.with(|cell| {
        let Ok(scope) = cell.try_borrow() else {
            return false;
        };
        let Some(secrets) = scope.as_ref() else {
            return false;
        };
        let reason = redact(&panic_reason(info.payload()), secrets.iter().map(String::as_str));
        let thread = std::thread::current();
        tracing::error!(
            thread = thread.name().unwrap_or("<unnamed>"),
            location = %info.location().map(ToString::to_string).unwrap_or_default(),
            reason = %reason,
            "module code panicked"
        );
        true
    })
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Replace every secret in `message` with the redaction marker.
pub(crate) fn redact<'a>(message: &str, secrets: impl IntoIterator<Item = &'a str>) -> String {
    let mut secrets: Vec<&str> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
    // longest first, so a secret that contains another is replaced whole
    secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
    secrets
        .into_iter()
        .fold(message.to_string(), |acc, secret| acc.replace(secret, REDACTED))
}

/// Run module code, turning a panic into its (unredacted) reason.
///
/// `secrets` are scrubbed from what the hook logs. Callers redact the returned reason themselves.
pub(crate) fn contain<T>(secrets: Vec<String>, f: impl FnOnce() -> T) -> Result<T, String> {
    install_hook();
    let outer = CONTAINED.with(|cell| cell.replace(Some(secrets)));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CONTAINED.with(|cell| cell.replace(outer));
    result.map_err(|payload| panic_reason(payload.as_ref()))
}
