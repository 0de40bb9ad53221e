// ABOUTME: Fan-out dispatch for fanlog: submit one record to several destinations in parallel and time them.
// ABOUTME: Defines the destination trait, the dispatcher, timing sinks, and concrete destinations.

pub mod dispatcher;
pub mod jsonl;
pub mod log_writer;
pub mod testing;
pub mod timing;
pub mod writer;

pub use dispatcher::{DispatchError, FanOutDispatcher};
pub use jsonl::JsonlWriter;
pub use log_writer::ErrorLogWriter;
pub use timing::{CsvTimingSink, SinkError, TimingRecord, TimingSink, format_duration};
pub use writer::{Destination, RecordWriter, WriteError, WriterRole};
