// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CLI entry point for the attribution developer tools.

use anyhow::Result;
use attrib_cli::cli::entrypoint;

fn main() -> Result<()> {
    entrypoint()
}
