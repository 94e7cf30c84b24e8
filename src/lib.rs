pub mod cli;
pub mod coverage;
pub mod errors;
pub mod external_tools;
pub mod federator;
pub mod intervals;
pub mod modifications;
pub mod peptide;
pub mod pipeline;
pub mod query;
pub mod range_index;
pub mod sequence_store;
pub mod table;
mod utils;
pub mod writer;

use cli::{AnnotationQueryArgs, PositionArgs};
use errors::Result;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

pub fn run_position(args: PositionArgs) -> Result<()> {
    pipeline::run_position(&args)
}

pub fn run_annotation_query(args: AnnotationQueryArgs) -> Result<()> {
    pipeline::run_annotation_query(&args)
}
