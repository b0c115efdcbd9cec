//! Client library for the Stampede log server. Opens an XML log stream over
//! TCP and writes records in the wire format the server frames on.

mod log_client;

pub use log_client::{Level, LogClient, LogRecord};
