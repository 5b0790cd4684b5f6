//! Blocking window tree walk.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use idelens_common::error::IdelensResult;
use idelens_platform_core::{NativeWindow, WindowSource};
use tokio::sync::mpsc::UnboundedSender;

/// One walked window with its pre-order position.
pub(crate) type Walked = IdelensResult<(usize, NativeWindow)>;

/// Walk top-level windows and their descendants in pre-order, streaming each
/// window to `tx` as soon as it is read.
///
/// Stops when `stop` is set or the receiver is gone. Hidden windows are sent
/// (so the caller can count them) but not descended into unless
/// `include_hidden` is set. A failure to list the top level is sent as the
/// only item; a failure to list one window's children is logged and skipped.
pub(crate) fn walk(
    source: &dyn WindowSource,
    stop: &AtomicBool,
    include_hidden: bool,
    tx: &UnboundedSender<Walked>,
) {
    let top = match source.top_level_windows() {
        Ok(top) => top,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };

    let mut stack: Vec<NativeWindow> = top.into_iter().rev().collect();
    let mut seen = HashSet::new();
    let mut order = 0usize;

    while let Some(native) = stack.pop() {
        if stop.load(Ordering::Relaxed) {
            tracing::debug!(walked = order, "Window walk stopped early");
            return;
        }
        if native.handle.is_null() || !seen.insert(native.handle) {
            continue;
        }

        let descend = native.visible || include_hidden;
        let handle = native.handle;
        if tx.send(Ok((order, native))).is_err() {
            return;
        }
        order += 1;

        if descend {
            match source.child_windows(handle) {
                Ok(children) => stack.extend(children.into_iter().rev()),
                Err(e) => {
                    tracing::debug!(window = %handle, error = %e, "Could not list child windows");
                }
            }
        }
    }
}
