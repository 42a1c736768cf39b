//! # nolossia CLI
//!
//! Command-line interface for merging photo libraries.
//!
//! ## Usage
//! ```bash
//! nolossia plan ~/Pictures --dest ~/Library/Photos
//! nolossia merge ~/Pictures --dest ~/Library/Photos
//! ```

mod cli;

use nolossia::Result;

fn main() -> Result<()> {
    nolossia::init_tracing();
    cli::run()
}
