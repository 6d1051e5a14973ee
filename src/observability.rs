use biometrics::{Collector, Counter, Moments};

pub(crate) static BACKEND_REQUESTS: Counter = Counter::new("genie.backend.requests");
pub(crate) static BACKEND_REQUEST_ERRORS: Counter = Counter::new("genie.backend.request_errors");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("genie.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("genie.stream.errors");
pub(crate) static STREAM_TTFB: Moments = Moments::new("genie.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("genie.stream.duration_seconds");

pub(crate) static CHAT_TURNS: Counter = Counter::new("genie.chat.turns");
pub(crate) static CHAT_TURN_FAILURES: Counter = Counter::new("genie.chat.turn_failures");
pub(crate) static CHAT_CLEARS: Counter = Counter::new("genie.chat.clears");

pub(crate) static EXPORT_FILES: Counter = Counter::new("genie.export.files");
pub(crate) static EXPORT_ERRORS: Counter = Counter::new("genie.export.errors");
pub(crate) static NOTIFY_SENT: Counter = Counter::new("genie.notify.sent");
pub(crate) static NOTIFY_ERRORS: Counter = Counter::new("genie.notify.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&BACKEND_REQUESTS);
    collector.register_counter(&BACKEND_REQUEST_ERRORS);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_TURN_FAILURES);
    collector.register_counter(&CHAT_CLEARS);

    collector.register_counter(&EXPORT_FILES);
    collector.register_counter(&EXPORT_ERRORS);
    collector.register_counter(&NOTIFY_SENT);
    collector.register_counter(&NOTIFY_ERRORS);
}
