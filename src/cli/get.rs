//! Get subcommand: print one coerced value.

use crate::config::{Config, format_duration};
use clap::{Args, ValueEnum};
use std::collections::BTreeMap;

/// Type to coerce the value to before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CoerceAs {
    #[default]
    String,
    Int,
    Float,
    Bool,
    Duration,
    List,
    Map,
}

/// Arguments for the get subcommand
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Dot-delimited key, e.g. database.host
    pub key: String,

    /// Coercion applied before printing
    #[arg(long = "as", value_enum, default_value_t = CoerceAs::String)]
    pub coerce: CoerceAs,
}

/// Coerced textual form of `key`, or `None` if the key is absent.
///
/// Failed coercions print the type's zero value, matching what a typed getter
/// with a zero default would return.
pub fn render(config: &Config, args: &GetArgs) -> Option<String> {
    let value = config.get(&args.key)?;
    let text = match args.coerce {
        CoerceAs::String => value.as_string(),
        CoerceAs::Int => value.as_i64(0).to_string(),
        CoerceAs::Float => value.as_f64(0.0).to_string(),
        CoerceAs::Bool => value.as_bool(false).to_string(),
        CoerceAs::Duration => format_duration(value.as_duration(Default::default())),
        CoerceAs::List => value.as_string_slice(Vec::new()).join("\n"),
        CoerceAs::Map => value
            .as_string_map(Default::default())
            .into_iter()
            .collect::<BTreeMap<_, _>>()
            .into_iter()
            .map(|(k, v)| format!("{k} = {v}"))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    Some(text)
}
