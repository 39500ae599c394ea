//! Subscriber construction

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{Format, LogConfig};
use crate::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Parse the filter directive of `config`
pub(crate) fn make_filter(config: &LogConfig) -> LogResult<EnvFilter> {
    EnvFilter::try_new(&config.level).map_err(|e| LogError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })
}

fn make_fmt_layer(config: &LogConfig) -> BoxedLayer {
    let base = fmt::layer()
        .with_ansi(config.ansi)
        .with_target(config.target)
        .with_file(config.source)
        .with_line_number(config.source)
        .with_writer(std::io::stderr);

    match (config.format, config.time) {
        (Format::Pretty, true) => base.pretty().boxed(),
        (Format::Pretty, false) => base.pretty().without_time().boxed(),
        (Format::Compact, true) => base.compact().boxed(),
        (Format::Compact, false) => base.compact().without_time().boxed(),
        (Format::Json, true) => base
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .boxed(),
        (Format::Json, false) => base
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .without_time()
            .boxed(),
    }
}

/// Install the global subscriber described by `config`
pub(crate) fn install(config: &LogConfig) -> LogResult<()> {
    let filter = make_filter(config)?;
    Registry::default()
        .with(make_fmt_layer(config))
        .with(filter)
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}
