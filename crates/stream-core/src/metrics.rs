//! Stream instrumentation.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! application installs a recorder.

use metrics::counter;

/// Metric names.
pub mod names {
    pub const FRAMES_RECEIVED: &str = "iotstream_frames_received_total";
    pub const FRAME_BYTES: &str = "iotstream_frame_bytes_total";
    pub const DECODE_ERRORS: &str = "iotstream_decode_errors_total";
    pub const EVENTS_DISPATCHED: &str = "iotstream_events_dispatched_total";
    pub const RECONNECTS: &str = "iotstream_reconnects_total";
    pub const SUBSCRIPTIONS_SENT: &str = "iotstream_subscriptions_sent_total";
    pub const EXTSYNC_RESPONSES: &str = "iotstream_extsync_responses_total";
}

/// Describe every metric to the installed recorder.
pub fn init_metrics() {
    metrics::describe_counter!(names::FRAMES_RECEIVED, "Frames received on the socket");
    metrics::describe_counter!(names::FRAME_BYTES, "Bytes received on the socket");
    metrics::describe_counter!(names::DECODE_ERRORS, "Frames or events that failed to decode");
    metrics::describe_counter!(
        names::EVENTS_DISPATCHED,
        "Events dispatched to listeners, by event kind"
    );
    metrics::describe_counter!(names::RECONNECTS, "Reconnect attempts scheduled");
    metrics::describe_counter!(
        names::SUBSCRIPTIONS_SENT,
        "Subscription frames sent, by method"
    );
    metrics::describe_counter!(
        names::EXTSYNC_RESPONSES,
        "External sync responses sent, by status code"
    );
}

pub fn record_frame(bytes: usize) {
    counter!(names::FRAMES_RECEIVED).increment(1);
    counter!(names::FRAME_BYTES).increment(bytes as u64);
}

pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS).increment(1);
}

pub fn record_event(kind: &str) {
    counter!(names::EVENTS_DISPATCHED, "kind" => kind.to_string()).increment(1);
}

pub fn record_reconnect() {
    counter!(names::RECONNECTS).increment(1);
}

pub fn record_subscription(method: &str) {
    counter!(names::SUBSCRIPTIONS_SENT, "method" => method.to_string()).increment(1);
}

pub fn record_extsync_response(code: u16) {
    counter!(names::EXTSYNC_RESPONSES, "code" => code.to_string()).increment(1);
}
