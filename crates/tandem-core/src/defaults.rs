//! Process-wide default settings.
//!
//! Every connection starts from the same defaults, so seeding them is not
//! journaled. Only later changes need to travel to peers.

use crate::value::SettingValue;

/// Version string advertised by the session.
pub const VERSION: &str = "0.7.4";

/// Bytes read at a time when copying.
pub const BLOCKSIZE: i64 = 32768;

/// Bytes requested per read by buffered connection readers.
pub const CONN_BUFSIZE: i64 = 4096;

/// Seconds between state checkpoints.
pub const CHECKPOINT_INTERVAL: i64 = 20;

/// Aborted backups younger than this many seconds are resumed.
pub const RESUME_WINDOW: i64 = 7200;

/// Files matching this case-insensitive expression are stored uncompressed.
pub const NO_COMPRESSION_REGEXP: &str = "(?i).*\\.(gz|z|bz|bz2|tgz|zip|rpm|deb|\
    jpg|gif|png|jp2|mp3|ogg|avi|wmv|mpeg|mpg|rm|mov)$";

/// Name of the setting holding [`NO_COMPRESSION_REGEXP`] as text.
pub const NO_COMPRESSION_SOURCE: &str = "no_compression_regexp_string";

/// Name under which the compiled no-compression matcher is installed.
pub const NO_COMPRESSION_PATTERN: &str = "no_compression_regexp";

/// Returns the default `(name, value)` pairs in seeding order.
pub fn defaults() -> Vec<(&'static str, SettingValue)> {
    vec![
        ("version", SettingValue::from(VERSION)),
        ("blocksize", SettingValue::from(BLOCKSIZE)),
        ("conn_bufsize", SettingValue::from(CONN_BUFSIZE)),
        ("change_mirror_perms", SettingValue::from(true)),
        ("change_source_perms", SettingValue::from(false)),
        ("preserve_atime", SettingValue::from(false)),
        ("connection_number", SettingValue::from(0)),
        ("checkpoint_interval", SettingValue::from(CHECKPOINT_INTERVAL)),
        ("resume_window", SettingValue::from(RESUME_WINDOW)),
        ("time_separator", SettingValue::from(":")),
        ("quoting_enabled", SettingValue::from(false)),
        ("chars_to_quote", SettingValue::from("")),
        ("quoting_char", SettingValue::from(";")),
        ("parsable_output", SettingValue::from(false)),
        ("preserve_hardlinks", SettingValue::from(true)),
        ("compression", SettingValue::from(true)),
        (
            NO_COMPRESSION_SOURCE,
            SettingValue::from(NO_COMPRESSION_REGEXP),
        ),
    ]
}
