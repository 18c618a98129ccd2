//! Process-wide panic capture.

use std::any::Any;
use std::cell::Cell;
use std::panic::PanicHookInfo;
use std::sync::Weak;

use crate::collector::Collector;
use crate::report::{CaptureOptions, RawError, Severity};

thread_local! {
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Chain a hook in front of the current one that reports panics to
/// `collector`. The previous hook always runs afterwards.
///
/// Hooks cannot be uninstalled; once the collector is gone or destroyed the
/// hook only forwards.
pub(crate) fn install_panic_hook(collector: Weak<Collector>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        report_panic(&collector, info);
        previous(info);
    }));
}

fn report_panic(collector: &Weak<Collector>, info: &PanicHookInfo<'_>) {
    // A panic while reporting a panic must not recurse.
    if REPORTING.with(Cell::get) {
        return;
    }
    if info.location().is_some_and(|l| is_own_source(l.file())) {
        return;
    }
    let Some(collector) = collector.upgrade() else {
        return;
    };
    REPORTING.with(|flag| flag.set(true));

    let message = panic_message(info.payload());
    let mut raw = RawError::message(message.clone());
    let mut options = CaptureOptions::new()
        .severity(Severity::High)
        .data("source", "panic");

    if let Some(location) = info.location() {
        raw = raw.with_stack(format!("{message}\n    at {location}"));
        options = options
            .data("file", location.file())
            .data("line", location.line())
            .data("column", location.column());
    }
    if let Some(thread) = std::thread::current().name() {
        options = options.data("thread", thread);
    }

    collector.capture_error(raw, options);
    REPORTING.with(|flag| flag.set(false));
}

/// Whether a source path lies inside this crate's library sources, either in
/// the workspace or unpacked from a registry as `lantern-telemetry-<version>`.
fn is_own_source(file: &str) -> bool {
    let file = file.replace('\\', "/");
    let segments: Vec<&str> = file.split('/').collect();
    segments
        .windows(2)
        .any(|pair| pair[1] == "src" && is_crate_dir(pair[0]))
}

fn is_crate_dir(segment: &str) -> bool {
    ["lantern-telemetry", "lantern_telemetry"].iter().any(|name| {
        segment.strip_prefix(name).is_some_and(|rest| {
            rest.is_empty()
                || rest
                    .strip_prefix('-')
                    .is_some_and(|version| version.starts_with(|c: char| c.is_ascii_digit()))
        })
    })
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}
