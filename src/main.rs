//! # sample-curate CLI
//!
//! Command-line interface for sample curation.
//!
//! ## Usage
//! ```bash
//! sample-curate curate --verbose
//! sample-curate curate --output json
//! sample-curate diff a.png b.png
//! ```

mod cli;

use sample_curation::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    cli::run()
}
