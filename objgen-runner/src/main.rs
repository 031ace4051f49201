//! Command line entry point of the object generator.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    objgen_runner::cli::execute()
}
