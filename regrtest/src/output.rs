// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{Args, ValueEnum};
use owo_colors::{OwoColorize, Style, style};
use std::{ffi::OsString, fmt, sync::Once};
use supports_color::Stream;
use tracing::{Event, Level, Subscriber, level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log filter, in `tracing_subscriber::filter::Targets` syntax.
pub(crate) const REGRTEST_LOG_ENV: &str = "REGRTEST_LOG";

/// Events logged to this target are printed without an `error:`/`warning:` heading.
pub(crate) const NO_HEADING_TARGET: &str = "regrtest::no_heading";

pub(crate) mod clap_styles {
    use clap::builder::{
        Styles,
        styling::{AnsiColor, Effects},
    };

    pub(crate) const fn style() -> Styles {
        let bold = Effects::BOLD;
        Styles::styled()
            .header(AnsiColor::Yellow.on_default().effects(bold))
            .usage(AnsiColor::Yellow.on_default().effects(bold))
            .literal(AnsiColor::Green.on_default().effects(bold))
            .placeholder(AnsiColor::Green.on_default())
            .error(AnsiColor::Red.on_default().effects(bold))
    }
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Run units verbosely in worker processes
    #[arg(long, short, global = true, env = "REGRTEST_VERBOSE")]
    pub(crate) verbose: bool,

    /// Only print units that didn't pass, and the final result
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub(crate) quiet: bool,

    /// When to use colors in output
    #[arg(
        long,
        value_enum,
        default_value_t,
        global = true,
        value_name = "WHEN",
        env = "REGRTEST_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    pub(crate) fn init(self) -> OutputContext {
        init_logger(self.color.should_colorize(Stream::Stderr));
        OutputContext {
            verbose: self.verbose,
            quiet: self.quiet,
            color: self.color,
        }
    }
}

/// Output settings, initialized once at startup.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns styles for the progress and summary output on stdout.
    pub(crate) fn stdout_styles(&self) -> ReportStyles {
        if self.color.should_colorize(Stream::Stdout) {
            ReportStyles::colorized()
        } else {
            ReportStyles::default()
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub(crate) enum Color {
    /// Use colors if the stream is a terminal that supports them
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

fn init_logger(colorize: bool) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let (targets, invalid) = parse_log_targets(std::env::var_os(REGRTEST_LOG_ENV));
        let layer = tracing_subscriber::fmt::layer()
            .event_format(HeadingFormatter { colorize })
            .with_writer(std::io::stderr)
            .with_filter(targets);
        tracing_subscriber::registry().with(layer).init();

        if let Some(invalid) = invalid {
            warn!("ignoring invalid {REGRTEST_LOG_ENV} value `{invalid}`, using `info`");
        }
    });
}

/// Parses the log filter. Returns the filter, and the input if it was invalid.
///
/// An unset or empty value means `info`.
fn parse_log_targets(value: Option<OsString>) -> (Targets, Option<String>) {
    let default = Targets::new().with_default(LevelFilter::INFO);
    let value = match value {
        Some(value) if !value.is_empty() => value.to_string_lossy().into_owned(),
        _ => return (default, None),
    };
    match value.parse() {
        Ok(targets) => (targets, None),
        Err(_) => (default, Some(value)),
    }
}

/// Formats events as `<level>: <message>`, like compiler diagnostics.
struct HeadingFormatter {
    colorize: bool,
}

impl HeadingFormatter {
    fn heading(&self, level: Level) -> (&'static str, Style) {
        let (name, color_style) = match level {
            Level::ERROR => ("error", style().red().bold()),
            Level::WARN => ("warning", style().yellow().bold()),
            Level::INFO => ("info", style().bold()),
            Level::DEBUG => ("debug", style().bold()),
            Level::TRACE => ("trace", style().dimmed()),
        };
        (name, if self.colorize { color_style } else { Style::new() })
    }
}

impl<S, N> FormatEvent<S, N> for HeadingFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != NO_HEADING_TARGET {
            let (name, heading_style) = self.heading(*metadata.level());
            write!(writer, "{}: ", name.style(heading_style))?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Styles for progress and summary output.
#[derive(Clone, Debug, Default)]
pub(crate) struct ReportStyles {
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) skip: Style,
    pub(crate) count: Style,
    pub(crate) heading: Style,
}

impl ReportStyles {
    fn colorized() -> Self {
        Self {
            pass: style().green().bold(),
            fail: style().red().bold(),
            skip: style().yellow().bold(),
            count: style().bold(),
            heading: style().bold(),
        }
    }
}
