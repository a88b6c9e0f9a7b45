// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::env;
use std::path::Path;

// Use the "built" crate to generate some useful build-time information,
// including the git hash and compiler version.
fn write_built() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();
    built::write_built_file_with_opts(
        Some(Path::new(&manifest_dir)),
        &Path::new(&out_dir).join("built.rs"),
    )
    .expect("Failed to acquire build-time information");
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    write_built();
}
