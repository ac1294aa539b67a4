#![cfg(feature = "metrics")]
//! Tests for the metrics recorded while serving a connection.
//!
//! These use `metrics_util::debugging::DebuggingRecorder` installed as a
//! thread-local recorder, so the adapter is driven synchronously inside a
//! runtime context that never polls the application.

mod common;

use rstest::rstest;
use wsbridge::{ERRORS_TOTAL, EVENTS_PROCESSED};
use wsbridge_testing::{
    CounterSnapshot,
    Harness,
    debugging_recorder_setup,
    text_frame,
    upgrade_request,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

#[test]
fn inbound_events_and_codec_errors_are_counted() {
    let (snapshotter, debug_recorder) = debugging_recorder_setup();
    let rt = runtime();
    let _entered = rt.enter();

    metrics::with_local_recorder(&debug_recorder, || {
        let (app, _recording) = common::recorder();
        let harness = Harness::new(app);
        let mut input = upgrade_request("/", &[]);
        input.extend(text_frame("hi"));
        harness.feed(input);
        harness.feed(b"bogus\n");
    });

    let counters = CounterSnapshot::take(&snapshotter);
    assert_eq!(
        counters.total(EVENTS_PROCESSED, Some(("direction", "inbound"))),
        3,
        "connect, receive and disconnect"
    );
    assert_eq!(counters.total(ERRORS_TOTAL, Some(("kind", "codec"))), 1);
    assert_eq!(counters.total(ERRORS_TOTAL, Some(("kind", "contract"))), 0);
}

#[rstest]
#[case(1)]
#[case(3)]
fn error_kinds_are_labelled(#[case] expected: u64) {
    let (snapshotter, debug_recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&debug_recorder, || {
        (0..expected).for_each(|_| wsbridge::metrics::inc_errors(wsbridge::metrics::ErrorKind::Contract));
        wsbridge::metrics::inc_errors(wsbridge::metrics::ErrorKind::Codec);
    });

    let counters = CounterSnapshot::take(&snapshotter);
    assert_eq!(counters.total(ERRORS_TOTAL, Some(("kind", "contract"))), expected);
    assert_eq!(counters.total(ERRORS_TOTAL, Some(("kind", "codec"))), 1);
    assert_eq!(counters.total(ERRORS_TOTAL, None), expected + 1);
}
