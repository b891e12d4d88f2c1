//! Log line formatting.
//!
//! Lines go to standard error as `LEVEL: message`. When priority
//! tagging is on, each line is prefixed with the `<N>` severity tag
//! that syslog collectors and systemd-journald understand; the default
//! is to tag exactly when stderr is not a terminal. Debug mode adds the
//! `file:line:` of the call site.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

struct Priority {
    tag: bool,
    locations: bool,
}

/// RFC 3164 severity for a tracing level.
fn severity(level: Level) -> u8 {
    if level == Level::ERROR {
        3
    } else if level == Level::WARN {
        4
    } else if level == Level::INFO {
        6
    } else {
        7
    }
}

fn label(level: Level) -> &'static str {
    if level == Level::ERROR {
        "ERR"
    } else if level == Level::WARN {
        "WARNING"
    } else if level == Level::INFO {
        "INFO"
    } else {
        "DEBUG"
    }
}

impl<S, N> FormatEvent<S, N> for Priority
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        if self.tag {
            write!(writer, "<{}>", severity(*meta.level()))?;
        }
        write!(writer, "{}: ", label(*meta.level()))?;
        if self.locations
            && let (Some(file), Some(line)) = (meta.file(), meta.line())
        {
            write!(writer, "{}:{}: ", file, line)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber.
pub fn init(debug: bool, syslog: bool, stderr: bool) {
    let tag = syslog || (!stderr && !atty::is(atty::Stream::Stderr));
    let default_level = if debug { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(std::io::stderr)
        .event_format(Priority {
            tag,
            locations: debug,
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_map() {
        assert_eq!(severity(Level::ERROR), 3);
        assert_eq!(severity(Level::WARN), 4);
        assert_eq!(severity(Level::INFO), 6);
        assert_eq!(severity(Level::DEBUG), 7);
        assert_eq!(severity(Level::TRACE), 7);
    }

    #[test]
    fn test_labels() {
        assert_eq!(label(Level::ERROR), "ERR");
        assert_eq!(label(Level::WARN), "WARNING");
        assert_eq!(label(Level::DEBUG), "DEBUG");
        assert_eq!(label(Level::TRACE), "DEBUG");
    }
}
