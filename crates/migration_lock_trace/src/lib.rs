#![warn(missing_docs)]
//! # Structured logging for the migration lock coordinator
//!
//! Every crate in this workspace logs through [`tracing`]. This crate only
//! decides where those events go and how they look.
//!
//! ## Filtering
//! ```bash
//! RUST_LOG='migration_lock[handle{action="enable"}]=debug' migration-lock --config site.yaml
//! ```
//! Shows all events that are:
//! - In the `migration_lock` crate
//! - Inside a span called `handle`
//! - Where that span has a field `action` equal to `enable`
//! - At least debug level
//!
//! Without `RUST_LOG` the coordinator crates log at `info` and everything
//! else at `warn`. Set `CUSTOM_FILTER` to replace the filter entirely.
//!
//! ## Json
//! `--structured Json` writes one JSON object per event to stderr:
//! ```json
//! {"time":"2024-03-03T08:07:05.910Z","level":"INFO","target":"migration_lock::control","file":"crates/migration_lock/src/control.rs","line":105,"fields":{"message":"lock armed","unlock_at":1700000000,"result":true},"spans":[{"name":"handle","target":"migration_lock::control","fields":"action=\"enable\""}]}
//! ```

use tracing::Subscriber;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        format::{DefaultFields, Format},
        MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

use derive_more::Display;
use std::str::FromStr;

use fmt::FormatEvent;

mod fmt;

pub use tracing;

#[derive(Debug, Clone, Default, Display, PartialEq, Eq)]
/// Sets the kind of structured logging output you want
pub enum Output {
    /// More compact version of [`Output::Log`]
    Compact,
    /// Outputs everything as json
    Json,
    /// Regular logging (default)
    #[default]
    Log,
    /// No logging to console
    None,
}

/// ParseError is a String
pub type ParseError = String;

impl FromStr for Output {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Json" => Ok(Output::Json),
            "Log" => Ok(Output::Log),
            "Compact" => Ok(Output::Compact),
            "None" => Ok(Output::None),
            _ => Err("Could not parse log output type".into()),
        }
    }
}

/// Run logging in a unit test.
///
/// RUST_LOG must be set or this is a no-op.
/// Safe to call from several tests in the same binary.
pub fn test_run() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }

    // Only the first test to get here installs the subscriber.
    let _ = init_fmt(Output::Log);
}

/// Build the canonical filter based on env
pub fn standard_filter() -> Result<EnvFilter, errors::TracingError> {
    let mut filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new("warn")
            .add_directive("migration_lock=info".parse()?)
            .add_directive("migration_lock_sqlite=info".parse()?)
            .add_directive("migration_lock_server=info".parse()?),
    };
    if std::env::var("CUSTOM_FILTER").is_ok() {
        EnvFilter::try_from_env("CUSTOM_FILTER")
            .map_err(|e| eprintln!("Failed to parse CUSTOM_FILTER {:?}", e))
            .map(|f| {
                filter = f;
            })
            .ok();
    }
    Ok(filter)
}

/// Return a layer directly, for times when you need more control over the
/// produced subscriber
pub fn standard_layer_unfiltered<W, S>(
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, Format, W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    S: Subscriber + Send + Sync + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::Layer::default()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
}

/// Same as [`standard_layer_unfiltered`] with [`standard_filter`] applied.
pub fn standard_layer<W, S>(writer: W) -> Result<impl Layer<S>, errors::TracingError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    S: Subscriber + Send + Sync + for<'span> LookupSpan<'span>,
{
    let filter = standard_filter()?;

    Ok(standard_layer_unfiltered(writer).with_filter(filter))
}

/// This checks RUST_LOG for a filter but doesn't complain if there is none or it doesn't parse.
/// It then checks for CUSTOM_FILTER which if set will output an error if it doesn't parse.
pub fn init_fmt(output: Output) -> Result<(), errors::TracingError> {
    init_fmt_with_opts(output, std::io::stderr)
}

fn init_fmt_with_opts<W>(output: Output, writer: W) -> Result<(), errors::TracingError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = standard_filter()?;

    match output {
        Output::Json => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .event_format(FormatEvent)
                    .with_filter(filter),
            )
            .try_init()?,

        Output::Log => Registry::default().with(standard_layer(writer)?).try_init()?,

        Output::Compact => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .compact()
                    .with_filter(filter),
            )
            .try_init()?,

        Output::None => (),
    };
    Ok(())
}

pub mod errors {
    //! Error in the tracing/logging framework

    use thiserror::Error;

    /// Error in the tracing/logging framework
    #[allow(missing_docs)] // should be self-explanatory
    #[derive(Error, Debug)]
    pub enum TracingError {
        #[error(transparent)]
        SetGlobal(#[from] tracing_subscriber::util::TryInitError),
        #[error(transparent)]
        BadDirective(#[from] tracing_subscriber::filter::ParseError),
    }
}
